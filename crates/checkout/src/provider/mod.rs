//! Payment provider contract and its implementations.

pub mod error;
pub mod memory;
pub mod mercadopago;
pub mod types;

use async_trait::async_trait;

pub use error::ProviderError;
pub use memory::InMemoryPaymentProvider;
pub use mercadopago::{MercadoPagoClient, MercadoPagoConfig};
pub use types::{
    BackUrls, Payment, PaymentItem, PaymentStatus, Preference, PreferenceItem, PreferenceRequest,
    is_valid_payment_id,
};

/// Operations the checkout workflow needs from the payment provider.
///
/// Instances are constructed once at startup with a validated credential
/// and shared by the preference service and the webhook receiver.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a redirectable payment preference.
    async fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> Result<Preference, ProviderError>;

    /// Fetches the authoritative state of a payment.
    async fn get_payment(&self, payment_id: &str) -> Result<Payment, ProviderError>;
}
