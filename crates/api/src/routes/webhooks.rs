//! Payment provider webhooks.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use checkout::{Notification, PaymentProvider, WebhookOutcome};
use serde::Serialize;
use store::CatalogStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// POST /api/webhooks/mercadopago
///
/// Answers 200 for everything that was handled or deliberately ignored, so
/// the provider only redelivers notifications that actually failed.
pub async fn mercadopago<S, P>(
    State(state): State<Arc<AppState<S, P>>>,
    payload: Result<Json<Notification>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError>
where
    S: CatalogStore + 'static,
    P: PaymentProvider + 'static,
{
    let Json(notification) = payload?;
    let outcome = state.webhooks.handle_notification(&notification).await?;

    match &outcome {
        WebhookOutcome::Ignored { kind } => tracing::debug!(%kind, "notification ignored"),
        WebhookOutcome::NotApproved { payment_id, status } => {
            tracing::debug!(%payment_id, %status, "payment not approved")
        }
        WebhookOutcome::Reconciled(reconciliation) => tracing::debug!(
            order_id = ?reconciliation.order().map(|o| o.id),
            "payment reconciled"
        ),
    }

    Ok(Json(WebhookAck { status: "received" }))
}
