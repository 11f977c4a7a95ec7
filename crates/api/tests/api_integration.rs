//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{InMemoryPaymentProvider, Payment, PaymentItem, PaymentStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{CatalogStoreExt, InMemoryCatalogStore, Money, Product, ProductId};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    store: InMemoryCatalogStore,
    provider: InMemoryPaymentProvider,
}

impl TestApp {
    async fn new() -> Self {
        let store = InMemoryCatalogStore::with_products([
            Product::new("p1", "Caneca", Money::from_cents(10000), 5),
            Product::new("p2", "Camiseta", Money::from_cents(5990), 1),
        ])
        .await;
        let provider = InMemoryPaymentProvider::new();
        let config = Config {
            base_url: "https://loja.example".to_string(),
            ..Config::default()
        };
        let state = api::create_state(store.clone(), Some(Arc::new(provider.clone())), &config);
        let router = api::create_app(state, get_metrics_handle());

        Self {
            router,
            store,
            provider,
        }
    }

    fn unconfigured() -> axum::Router {
        let state = api::create_state::<_, InMemoryPaymentProvider>(
            InMemoryCatalogStore::new(),
            None,
            &Config::default(),
        );
        api::create_app(state, get_metrics_handle())
    }

    async fn stock(&self, id: &str) -> u32 {
        self.store
            .stock_of(&ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
    }
}

async fn post_json(router: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(router, uri, body.to_string()).await
}

async fn post_raw(router: &axum::Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checkout_enabled"], true);
}

#[tokio::test]
async fn test_checkout_returns_preference() {
    let app = TestApp::new().await;

    let (status, json) = post_json(
        &app.router,
        "/api/checkout",
        json!({ "items": [{ "id": "p1", "name": "Caneca", "quantity": 2, "price": 100.0 }] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "PREF-0001");
    assert!(json["init_point"].as_str().unwrap().contains("PREF-0001"));

    let preferences = app.provider.preferences();
    assert_eq!(
        preferences[0].notification_url,
        "https://loja.example/api/webhooks/mercadopago"
    );
}

#[tokio::test]
async fn test_checkout_accepts_numeric_strings() {
    let app = TestApp::new().await;

    let (status, json) = post_json(
        &app.router,
        "/api/checkout",
        json!({ "items": [{ "id": "p1", "name": "Caneca", "quantity": "2", "price": "19.90" }] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "PREF-0001");
    let preferences = app.provider.preferences();
    assert_eq!(preferences[0].items[0].quantity, 2);
    assert_eq!(preferences[0].items[0].unit_price, 19.9);
}

#[tokio::test]
async fn test_checkout_empty_cart_is_bad_request() {
    let app = TestApp::new().await;

    let (status, json) = post_json(&app.router, "/api/checkout", json!({ "items": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cart items are required.");

    let (status, _) = post_json(&app.router, "/api/checkout", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.provider.create_calls(), 0);
}

#[tokio::test]
async fn test_checkout_malformed_body_is_bad_request() {
    let app = TestApp::new().await;

    let (status, json) = post_raw(&app.router, "/api/checkout", "{not json".to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_checkout_without_credential_is_unavailable() {
    let router = TestApp::unconfigured();

    let (status, json) = post_json(
        &router,
        "/api/checkout",
        json!({ "items": [{ "id": "p1", "name": "Caneca", "quantity": 1, "price": 10.0 }] }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Payment service is not configured.");

    // Checked before the body is even looked at
    let (status, _) = post_raw(&router, "/api/checkout", "garbage".to_string()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_checkout_provider_failure_is_internal_error() {
    let app = TestApp::new().await;
    app.provider.set_fail_on_create(true);

    let (status, json) = post_json(
        &app.router,
        "/api/checkout",
        json!({ "items": [{ "id": "p1", "name": "Caneca", "quantity": 1, "price": 10.0 }] }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to create payment preference.");
    assert!(json["details"].as_str().unwrap().contains("invalid preference"));
}

#[tokio::test]
async fn test_webhook_approved_payment_decrements_stock_once() {
    let app = TestApp::new().await;
    app.provider.insert_payment(Payment::new(
        "123",
        PaymentStatus::Approved,
        vec![PaymentItem::new("p1", "Caneca", 2)],
    ));

    for _ in 0..2 {
        let (status, json) = post_json(
            &app.router,
            "/api/webhooks/mercadopago",
            json!({ "type": "payment", "action": "payment.updated", "data": { "id": 123 } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "received");
    }

    assert_eq!(app.stock("p1").await, 3);
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_webhook_insufficient_stock_is_internal_error() {
    let app = TestApp::new().await;
    app.provider.insert_payment(Payment::new(
        "124",
        PaymentStatus::Approved,
        vec![PaymentItem::new("p2", "Camiseta", 3)],
    ));

    let (status, json) = post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "payment", "data": { "id": "124" } }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Webhook processing failed.");
    assert!(json["details"].as_str().unwrap().contains("Camiseta"));
    assert_eq!(app.stock("p2").await, 1);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_webhook_merchant_order_is_acknowledged() {
    let app = TestApp::new().await;

    let (status, json) = post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "merchant_order", "data": { "id": "9" } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "received");
    assert_eq!(app.provider.get_calls(), 0);
    assert_eq!(app.store.committed_writes(), 0);
}

#[tokio::test]
async fn test_webhook_pending_payment_is_acknowledged() {
    let app = TestApp::new().await;
    app.provider.insert_payment(Payment::new(
        "125",
        PaymentStatus::Pending,
        vec![PaymentItem::new("p1", "Caneca", 1)],
    ));

    let (status, _) = post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "payment", "data": { "id": "125" } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock("p1").await, 5);
}

#[tokio::test]
async fn test_webhook_missing_payment_id_is_bad_request() {
    let app = TestApp::new().await;

    let (status, _) = post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "payment", "data": {} }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_path_like_payment_id_is_bad_request() {
    let app = TestApp::new().await;

    let (status, json) = post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "payment", "data": { "id": "../../users/me" } }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid payment id"));
    assert_eq!(app.provider.get_calls(), 0);
}

#[tokio::test]
async fn test_webhook_unknown_payment_is_internal_error() {
    let app = TestApp::new().await;

    let (status, json) = post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "payment", "data": { "id": "does-not-exist" } }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["details"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_webhook_without_credential() {
    let router = TestApp::unconfigured();

    let (status, _) = post_json(
        &router,
        "/api/webhooks/mercadopago",
        json!({ "type": "payment", "data": { "id": "1" } }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post_json(
        &router,
        "/api/webhooks/mercadopago",
        json!({ "type": "plan", "data": { "id": "1" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;

    post_json(
        &app.router,
        "/api/webhooks/mercadopago",
        json!({ "type": "merchant_order" }),
    )
    .await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("webhook_notifications_total"));
}
