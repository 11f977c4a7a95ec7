//! Payment preference (checkout session) creation.

use std::sync::Arc;

use chrono::Utc;
use domain::{CartLineItem, Money};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CheckoutError;
use crate::provider::types::{required_amount, required_quantity};
use crate::provider::{BackUrls, PaymentProvider, PreferenceItem, PreferenceRequest};

/// Path the provider posts notifications to, relative to the base URL.
pub const NOTIFICATION_PATH: &str = "/api/webhooks/mercadopago";

/// A cart line as submitted by the storefront: `{id, name, quantity, price}`
/// with the price in currency units. Quantity and price may arrive as JSON
/// numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "required_quantity")]
    pub quantity: i64,
    #[serde(deserialize_with = "required_amount")]
    pub price: f64,
}

impl From<&CartLineItem> for CheckoutItem {
    fn from(line: &CartLineItem) -> Self {
        Self {
            id: line.product_id.to_string(),
            name: line.name.clone(),
            quantity: i64::from(line.quantity),
            price: line.unit_price.as_units(),
        }
    }
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
    pub external_reference: String,
}

/// Static settings used to build preferences.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Public base URL of the storefront, used for back and notification URLs.
    pub base_url: String,
    /// Namespace prefix of external references.
    pub reference_prefix: String,
    pub currency_id: String,
}

impl CheckoutSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_reference_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reference_prefix = prefix.into();
        self
    }

    pub fn back_urls(&self) -> BackUrls {
        BackUrls {
            success: format!("{}/checkout/success", self.base_url),
            failure: format!("{}/checkout/failure", self.base_url),
            pending: format!("{}/checkout/pending", self.base_url),
        }
    }

    pub fn notification_url(&self) -> String {
        format!("{}{NOTIFICATION_PATH}", self.base_url)
    }

    /// Generates a reference unique per checkout attempt:
    /// `{prefix}-{unix millis}-{random}`. The random tail keeps two attempts
    /// in the same millisecond apart.
    pub fn new_external_reference(&self) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            self.reference_prefix,
            Utc::now().timestamp_millis(),
            &nonce[..12]
        )
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            reference_prefix: "impres-loja".to_string(),
            currency_id: "BRL".to_string(),
        }
    }
}

/// Validates a submitted cart into line items.
pub fn validate_items(items: &[CheckoutItem]) -> Result<Vec<CartLineItem>, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::Validation(
            "Cart items are required.".to_string(),
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let quantity = u32::try_from(item.quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    CheckoutError::Validation(format!(
                        "items[{index}]: quantity must be a positive integer, got {}",
                        item.quantity
                    ))
                })?;
            let price = Money::from_units(item.price)
                .filter(|p| !p.is_negative())
                .ok_or_else(|| {
                    CheckoutError::Validation(format!(
                        "items[{index}]: price must be a non-negative number, got {}",
                        item.price
                    ))
                })?;
            CartLineItem::new(item.id.trim(), item.name.clone(), price, quantity)
                .map_err(|e| CheckoutError::Validation(format!("items[{index}]: {e}")))
        })
        .collect()
}

/// Creates provider-hosted checkout sessions from cart snapshots.
///
/// Nothing is persisted locally: the session lives with the provider until
/// its notification arrives at the webhook.
pub struct PreferenceService<P: PaymentProvider> {
    provider: Option<Arc<P>>,
    settings: CheckoutSettings,
}

impl<P: PaymentProvider> PreferenceService<P> {
    /// Creates the service. `None` means no provider credential was
    /// configured; every request then fails with
    /// [`CheckoutError::NotConfigured`].
    pub fn new(provider: Option<Arc<P>>, settings: CheckoutSettings) -> Self {
        Self { provider, settings }
    }

    /// Whether a provider credential was configured.
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Creates a checkout session for the given cart lines.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_checkout_session(
        &self,
        items: &[CheckoutItem],
    ) -> Result<CheckoutSession, CheckoutError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            tracing::error!("payment provider access token is not configured");
            CheckoutError::NotConfigured
        })?;

        let lines = validate_items(items)?;
        let external_reference = self.settings.new_external_reference();

        let request = PreferenceRequest {
            items: lines
                .iter()
                .map(|line| PreferenceItem {
                    id: line.product_id.to_string(),
                    title: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price.as_units(),
                    currency_id: self.settings.currency_id.clone(),
                })
                .collect(),
            back_urls: self.settings.back_urls(),
            auto_return: "approved".to_string(),
            notification_url: self.settings.notification_url(),
            external_reference: external_reference.clone(),
        };

        let preference = provider.create_preference(request).await.map_err(|e| {
            metrics::counter!("checkout_sessions_failed_total").increment(1);
            tracing::error!(error = %e, %external_reference, "failed to create payment preference");
            CheckoutError::Upstream(e)
        })?;

        metrics::counter!("checkout_sessions_total").increment(1);
        tracing::info!(
            preference_id = %preference.id,
            %external_reference,
            "checkout session created"
        );

        Ok(CheckoutSession {
            session_id: preference.id,
            redirect_url: preference.init_point,
            external_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryPaymentProvider;

    fn item(id: &str, quantity: i64, price: f64) -> CheckoutItem {
        CheckoutItem {
            id: id.to_string(),
            name: format!("Product {id}"),
            quantity,
            price,
        }
    }

    fn service(provider: &InMemoryPaymentProvider) -> PreferenceService<InMemoryPaymentProvider> {
        PreferenceService::new(
            Some(Arc::new(provider.clone())),
            CheckoutSettings::new("https://shop.example/"),
        )
    }

    #[tokio::test]
    async fn creates_session_with_back_and_notification_urls() {
        let provider = InMemoryPaymentProvider::new();
        let session = service(&provider)
            .create_checkout_session(&[item("p1", 2, 100.0)])
            .await
            .unwrap();

        assert_eq!(session.session_id, "PREF-0001");
        assert!(session.redirect_url.contains("PREF-0001"));

        let preferences = provider.preferences();
        let sent = &preferences[0];
        assert_eq!(sent.back_urls.success, "https://shop.example/checkout/success");
        assert_eq!(sent.back_urls.failure, "https://shop.example/checkout/failure");
        assert_eq!(sent.back_urls.pending, "https://shop.example/checkout/pending");
        assert_eq!(
            sent.notification_url,
            "https://shop.example/api/webhooks/mercadopago"
        );
        assert_eq!(sent.auto_return, "approved");
        assert_eq!(sent.external_reference, session.external_reference);
        assert_eq!(sent.items[0].quantity, 2);
        assert_eq!(sent.items[0].unit_price, 100.0);
        assert_eq!(sent.items[0].currency_id, "BRL");
    }

    #[tokio::test]
    async fn empty_cart_fails_without_provider_call() {
        let provider = InMemoryPaymentProvider::new();
        let result = service(&provider).create_checkout_session(&[]).await;

        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        assert_eq!(provider.create_calls(), 0);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_validation_and_io() {
        let service: PreferenceService<InMemoryPaymentProvider> =
            PreferenceService::new(None, CheckoutSettings::default());

        let result = service.create_checkout_session(&[]).await;
        assert!(matches!(result, Err(CheckoutError::NotConfigured)));
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_error() {
        let provider = InMemoryPaymentProvider::new();
        provider.set_fail_on_create(true);

        let result = service(&provider)
            .create_checkout_session(&[item("p1", 1, 10.0)])
            .await;

        match result {
            Err(CheckoutError::Upstream(e)) => assert!(e.to_string().contains("invalid preference")),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_items_are_rejected() {
        assert!(validate_items(&[item("p1", 0, 10.0)]).is_err());
        assert!(validate_items(&[item("p1", -1, 10.0)]).is_err());
        assert!(validate_items(&[item("p1", 1, -0.5)]).is_err());
        assert!(validate_items(&[item("p1", 1, f64::NAN)]).is_err());
        assert!(validate_items(&[item(" ", 1, 10.0)]).is_err());
        assert!(validate_items(&[item("p1", i64::from(u32::MAX) + 1, 10.0)]).is_err());
    }

    #[test]
    fn free_items_are_allowed() {
        let lines = validate_items(&[item("p1", 1, 0.0)]).unwrap();
        assert!(lines[0].unit_price.is_zero());
    }

    #[test]
    fn external_references_are_unique_and_namespaced() {
        let settings = CheckoutSettings::default().with_reference_prefix("shop");
        let a = settings.new_external_reference();
        let b = settings.new_external_reference();

        assert!(a.starts_with("shop-"));
        assert_ne!(a, b);
    }

    #[test]
    fn cart_lines_convert_to_checkout_items() {
        let line = CartLineItem::new("p1", "Mug", Money::from_cents(1990), 2).unwrap();
        let item = CheckoutItem::from(&line);
        assert_eq!(item.id, "p1");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.price, 19.9);
    }

    #[test]
    fn items_accept_numeric_strings() {
        let item: CheckoutItem = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Mug",
            "quantity": "2",
            "price": "19.90"
        }))
        .unwrap();
        assert_eq!(item.quantity, 2);
        assert_eq!(item.price, 19.9);

        let item: CheckoutItem =
            serde_json::from_value(serde_json::json!({ "id": "p1", "quantity": 3, "price": 5 }))
                .unwrap();
        assert_eq!(item.quantity, 3);
        assert_eq!(item.price, 5.0);
    }

    #[test]
    fn unreadable_quantity_or_price_fails_to_parse() {
        for body in [
            serde_json::json!({ "id": "p1", "quantity": "two", "price": 1 }),
            serde_json::json!({ "id": "p1", "quantity": 1.5, "price": 1 }),
            serde_json::json!({ "id": "p1", "quantity": 1, "price": "free" }),
            serde_json::json!({ "id": "p1", "quantity": null, "price": 1 }),
            serde_json::json!({ "id": "p1", "price": 1 }),
        ] {
            assert!(serde_json::from_value::<CheckoutItem>(body.clone()).is_err(), "{body}");
        }
    }
}
