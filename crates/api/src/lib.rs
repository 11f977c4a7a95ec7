//! HTTP API server for the storefront checkout.
//!
//! Exposes checkout session creation and the payment provider webhook,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CheckoutSettings, FulfillmentService, MercadoPagoClient, MercadoPagoConfig, PaymentProvider,
    PreferenceService, ProviderError, RetryPolicy, WebhookReceiver,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CatalogStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CatalogStore, P: PaymentProvider> {
    pub preferences: PreferenceService<P>,
    pub webhooks: WebhookReceiver<S, P>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, P>(state: Arc<AppState<S, P>>, metrics_handle: PrometheusHandle) -> Router
where
    S: CatalogStore + 'static,
    P: PaymentProvider + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, P>))
        .route("/api/checkout", post(routes::checkout::create::<S, P>))
        .route(
            "/api/webhooks/mercadopago",
            post(routes::webhooks::mercadopago::<S, P>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the checkout services around a store and an optional provider.
///
/// `provider == None` leaves checkout disabled: the endpoints answer 503
/// for anything that needs the provider.
pub fn create_state<S, P>(store: S, provider: Option<Arc<P>>, config: &Config) -> Arc<AppState<S, P>>
where
    S: CatalogStore,
    P: PaymentProvider,
{
    let settings = CheckoutSettings::new(config.base_url.clone())
        .with_reference_prefix(config.reference_prefix.clone());
    let retry = RetryPolicy::default().with_max_attempts(config.fulfillment_max_attempts);

    Arc::new(AppState {
        preferences: PreferenceService::new(provider.clone(), settings),
        webhooks: WebhookReceiver::new(provider, FulfillmentService::with_retry_policy(store, retry)),
    })
}

/// Builds the Mercado Pago client if an access token is configured.
pub fn create_provider(config: &Config) -> Result<Option<Arc<MercadoPagoClient>>, ProviderError> {
    let Some(token) = config.mercado_pago_access_token.as_deref() else {
        return Ok(None);
    };

    let client = MercadoPagoClient::new(
        MercadoPagoConfig::new(token)
            .with_api_base_url(config.mercado_pago_api_url.clone())
            .with_timeout(config.provider_timeout.max(Duration::from_millis(1))),
    )?;
    Ok(Some(Arc::new(client)))
}
