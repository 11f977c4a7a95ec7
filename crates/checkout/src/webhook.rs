//! Payment provider notification handling.

use std::sync::Arc;

use serde::Deserialize;
use store::{CatalogStore, PaymentId};

use crate::error::WebhookError;
use crate::fulfillment::{FulfillmentService, Reconciliation};
use crate::provider::{PaymentProvider, PaymentStatus, is_valid_payment_id, types::lenient_id};

/// Event type that carries payment status changes.
pub const PAYMENT_EVENT: &str = "payment";

/// Notification body posted by the provider: `{type, data: {id}}`.
///
/// Only used to decide what to fetch; its contents are never trusted as the
/// payment state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notification {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationData {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
}

impl Notification {
    /// Builds a payment notification, as the provider would send it.
    pub fn payment(payment_id: impl Into<String>) -> Self {
        Self {
            kind: Some(PAYMENT_EVENT.to_string()),
            action: None,
            data: Some(NotificationData {
                id: Some(payment_id.into()),
            }),
        }
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.id.as_deref())
    }
}

/// What the receiver did with a notification. Every variant is
/// acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Not a payment event.
    Ignored { kind: String },
    /// The payment exists but is not approved; nothing was written.
    NotApproved {
        payment_id: String,
        status: PaymentStatus,
    },
    /// The payment was approved and reconciled.
    Reconciled(Reconciliation),
}

/// Entry point for provider notifications.
///
/// Notifications are handled independently and may arrive concurrently or
/// more than once; all coordination happens in the store.
pub struct WebhookReceiver<S: CatalogStore, P: PaymentProvider> {
    provider: Option<Arc<P>>,
    fulfillment: FulfillmentService<S>,
}

impl<S: CatalogStore, P: PaymentProvider> WebhookReceiver<S, P> {
    /// Creates the receiver. `None` means no provider credential was
    /// configured; payment events then fail with
    /// [`WebhookError::NotConfigured`].
    pub fn new(provider: Option<Arc<P>>, fulfillment: FulfillmentService<S>) -> Self {
        Self {
            provider,
            fulfillment,
        }
    }

    /// Handles one notification.
    ///
    /// Returns an error only when a payment event could not be processed,
    /// so the provider redelivers exactly those.
    #[tracing::instrument(skip(self, notification), fields(kind = %notification.kind()))]
    pub async fn handle_notification(
        &self,
        notification: &Notification,
    ) -> Result<WebhookOutcome, WebhookError> {
        metrics::counter!("webhook_notifications_total", "type" => notification.kind().to_string())
            .increment(1);

        if notification.kind() != PAYMENT_EVENT {
            tracing::debug!("ignoring non-payment notification");
            return Ok(WebhookOutcome::Ignored {
                kind: notification.kind().to_string(),
            });
        }

        let provider = self.provider.as_ref().ok_or(WebhookError::NotConfigured)?;
        let requested_id = notification
            .payment_id()
            .ok_or(WebhookError::MissingPaymentId)?;
        if !is_valid_payment_id(requested_id) {
            tracing::warn!(payment_id = requested_id, "rejecting malformed payment id");
            return Err(WebhookError::InvalidPaymentId(requested_id.to_string()));
        }

        tracing::info!(payment_id = requested_id, "received payment notification");

        let payment = provider.get_payment(requested_id).await?;

        if payment.status != PaymentStatus::Approved {
            tracing::info!(
                payment_id = %payment.id,
                status = %payment.status,
                "payment is not approved, no action taken"
            );
            return Ok(WebhookOutcome::NotApproved {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        tracing::info!(payment_id = %payment.id, "payment approved, reconciling");

        let reconciliation = self
            .fulfillment
            .reconcile_approved_payment(
                &PaymentId::new(payment.id.clone()),
                payment.items(),
                payment.external_reference.as_deref(),
            )
            .await?;

        Ok(WebhookOutcome::Reconciled(reconciliation))
    }
}
