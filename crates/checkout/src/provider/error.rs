use thiserror::Error;

/// Errors raised by a payment provider client.
///
/// Messages carry what the provider said for diagnostics; the access token
/// never appears in them.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The client was constructed without an access token.
    #[error("Payment provider access token is not set")]
    MissingCredential,

    /// The request never produced a response (connect, timeout, TLS).
    #[error("Payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Payment provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider API base URL cannot carry request paths.
    #[error("Invalid payment provider URL: {0}")]
    InvalidBaseUrl(String),

    /// The payment id contains characters a provider id never has.
    #[error("Invalid payment id: {0:?}")]
    InvalidPaymentId(String),

    /// The payment id is unknown to the provider.
    #[error("Payment {0} not found at provider")]
    PaymentNotFound(String),

    /// The provider's response body could not be understood.
    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
}
