use checkout::{
    FulfillmentService, InMemoryPaymentProvider, Notification, Payment, PaymentItem,
    PaymentStatus, WebhookReceiver,
};
use criterion::{Criterion, criterion_group, criterion_main};
use std::sync::Arc;
use store::{InMemoryCatalogStore, Money, PaymentId, Product};

fn catalog() -> Vec<Product> {
    (0..10)
        .map(|i| {
            Product::new(
                format!("SKU-{i}"),
                format!("Bench product {i}"),
                Money::from_cents(1000 + i),
                u32::MAX,
            )
        })
        .collect()
}

fn bench_reconcile_single_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(InMemoryCatalogStore::with_products(catalog()));
    let service = FulfillmentService::new(store);
    let items = [PaymentItem::new("SKU-0", "Bench product 0", 1)];
    let mut n = 0u64;

    c.bench_function("checkout/reconcile_single_item", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                service
                    .reconcile_approved_payment(&PaymentId::from(n), &items, None)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reconcile_ten_items(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(InMemoryCatalogStore::with_products(catalog()));
    let service = FulfillmentService::new(store);
    let items: Vec<_> = (0..10)
        .map(|i| PaymentItem::new(format!("SKU-{i}"), "item", 1))
        .collect();
    let mut n = 0u64;

    c.bench_function("checkout/reconcile_ten_items", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                service
                    .reconcile_approved_payment(&PaymentId::from(n), &items, None)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_duplicate_delivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(InMemoryCatalogStore::with_products(catalog()));
    let provider = InMemoryPaymentProvider::new();
    provider.insert_payment(Payment::new(
        "1",
        PaymentStatus::Approved,
        vec![PaymentItem::new("SKU-1", "item", 1)],
    ));
    let receiver = WebhookReceiver::new(Some(Arc::new(provider)), FulfillmentService::new(store));
    let notification = Notification::payment("1");
    rt.block_on(receiver.handle_notification(&notification))
        .unwrap();

    c.bench_function("checkout/webhook_duplicate_delivery", |b| {
        b.iter(|| {
            rt.block_on(receiver.handle_notification(&notification))
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_reconcile_single_item,
    bench_reconcile_ten_items,
    bench_duplicate_delivery
);
criterion_main!(benches);
