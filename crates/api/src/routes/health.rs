//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::PaymentProvider;
use serde::Serialize;
use store::CatalogStore;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// False when no payment provider credential is configured.
    pub checkout_enabled: bool,
}

/// GET /health
pub async fn check<S, P>(State(state): State<Arc<AppState<S, P>>>) -> Json<HealthResponse>
where
    S: CatalogStore + 'static,
    P: PaymentProvider + 'static,
{
    Json(HealthResponse {
        status: "ok",
        checkout_enabled: state.preferences.is_configured(),
    })
}
