//! Checkout session creation.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use checkout::{CheckoutError, CheckoutItem, PaymentProvider};
use serde::{Deserialize, Serialize};
use store::CatalogStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Option<Vec<CheckoutItem>>,
}

/// The storefront redirects the buyer to `init_point`.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub id: String,
    pub init_point: String,
}

/// POST /api/checkout
pub async fn create<S, P>(
    State(state): State<Arc<AppState<S, P>>>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError>
where
    S: CatalogStore + 'static,
    P: PaymentProvider + 'static,
{
    // An unconfigured deployment answers 503 whatever the body looks like
    if !state.preferences.is_configured() {
        return Err(CheckoutError::NotConfigured.into());
    }

    let Json(request) = payload?;
    let items = request.items.unwrap_or_default();
    let session = state.preferences.create_checkout_session(&items).await?;

    Ok(Json(CheckoutResponse {
        id: session.session_id,
        init_point: session.redirect_url,
    }))
}
