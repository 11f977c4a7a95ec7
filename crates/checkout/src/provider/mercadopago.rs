//! Mercado Pago REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;

use super::{
    Payment, PaymentProvider, Preference, PreferenceRequest, ProviderError, is_valid_payment_id,
};

/// Default production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.mercadopago.com";

const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`MercadoPagoClient`].
#[derive(Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub api_base_url: String,
    pub timeout: Duration,
}

impl MercadoPagoConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            api_base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoConfig")
            .field("access_token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Payment provider client for the Mercado Pago API.
///
/// The credential is checked once here; a constructed client is always
/// usable and is shared behind an `Arc` by the services that need it.
#[derive(Clone)]
pub struct MercadoPagoClient {
    http: Client,
    base_url: Url,
    access_token: String,
}

impl MercadoPagoClient {
    /// Builds a client, rejecting an empty access token or an unusable
    /// base URL.
    pub fn new(config: MercadoPagoConfig) -> Result<Self, ProviderError> {
        let access_token = config.access_token.trim().to_string();
        if access_token.is_empty() {
            return Err(ProviderError::MissingCredential);
        }

        let base_url = Url::parse(config.api_base_url.trim())
            .map_err(|e| ProviderError::InvalidBaseUrl(format!("{}: {e}", config.api_base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidBaseUrl(config.api_base_url));
        }

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    /// Appends `segments` to the base URL. Each segment is percent-encoded,
    /// so none of them can introduce `/`, `?` or `#`.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Turns a non-success response into an [`ProviderError::Api`] carrying
    /// the provider's own message.
    async fn api_error(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());
        ProviderError::Api { status, message }
    }
}

impl std::fmt::Debug for MercadoPagoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoClient {
    #[tracing::instrument(skip(self, request), fields(external_reference = %request.external_reference))]
    async fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> Result<Preference, ProviderError> {
        let response = self
            .http
            .post(self.url(&["checkout", "preferences"]))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &request.external_reference)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        response
            .json::<Preference>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    #[tracing::instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<Payment, ProviderError> {
        if !is_valid_payment_id(payment_id) {
            return Err(ProviderError::InvalidPaymentId(payment_id.to_string()));
        }

        let response = self
            .http
            .get(self.url(&["v1", "payments", payment_id]))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::PaymentNotFound(payment_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        response
            .json::<Payment>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}
