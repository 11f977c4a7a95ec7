//! Checkout-to-fulfillment reconciliation.
//!
//! The workflow spans three steps:
//! 1. Cart snapshot → payment preference with the provider ([`PreferenceService`])
//! 2. Asynchronous payment notification from the provider ([`WebhookReceiver`])
//! 3. Atomic stock decrement + order creation ([`FulfillmentService`])
//!
//! Only a re-fetched, approved payment ever mutates stock, and each payment
//! produces at most one order no matter how often it is delivered.

pub mod error;
pub mod fulfillment;
pub mod preference;
pub mod provider;
pub mod retry;
pub mod webhook;

pub use error::{CheckoutError, FulfillmentError, WebhookError};
pub use fulfillment::{FulfillmentService, Reconciliation};
pub use preference::{CheckoutItem, CheckoutSession, CheckoutSettings, PreferenceService};
pub use provider::{
    BackUrls, InMemoryPaymentProvider, MercadoPagoClient, MercadoPagoConfig, Payment,
    PaymentItem, PaymentProvider, PaymentStatus, Preference, PreferenceItem, PreferenceRequest,
    ProviderError,
};
pub use retry::RetryPolicy;
pub use webhook::{Notification, NotificationData, WebhookOutcome, WebhookReceiver};
