//! In-memory payment provider for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Payment, PaymentProvider, Preference, PreferenceRequest, ProviderError};

#[derive(Debug, Default)]
struct InMemoryProviderState {
    preferences: Vec<PreferenceRequest>,
    payments: HashMap<String, Payment>,
    create_calls: usize,
    get_calls: usize,
    fail_on_create: bool,
    fail_on_get: bool,
}

/// In-memory payment provider.
///
/// Records every preference it is asked to create and serves payments that
/// were registered with [`InMemoryPaymentProvider::insert_payment`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProvider {
    state: Arc<RwLock<InMemoryProviderState>>,
}

impl InMemoryPaymentProvider {
    /// Creates a new in-memory payment provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a payment served by `get_payment`.
    pub fn insert_payment(&self, payment: Payment) {
        self.state
            .write()
            .unwrap()
            .payments
            .insert(payment.id.clone(), payment);
    }

    /// Configures the provider to fail preference creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the provider to fail payment lookups.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.state.write().unwrap().fail_on_get = fail;
    }

    /// Number of `create_preference` calls, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.state.read().unwrap().create_calls
    }

    /// Number of `get_payment` calls, including failed ones.
    pub fn get_calls(&self) -> usize {
        self.state.read().unwrap().get_calls
    }

    /// Preferences created so far, oldest first.
    pub fn preferences(&self) -> Vec<PreferenceRequest> {
        self.state.read().unwrap().preferences.clone()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> Result<Preference, ProviderError> {
        let mut state = self.state.write().unwrap();
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(ProviderError::Api {
                status: 400,
                message: "invalid preference".to_string(),
            });
        }

        state.preferences.push(request);
        let id = format!("PREF-{:04}", state.preferences.len());
        Ok(Preference {
            init_point: format!("https://checkout.example/redirect?pref_id={id}"),
            id,
            sandbox_init_point: None,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, ProviderError> {
        let mut state = self.state.write().unwrap();
        state.get_calls += 1;

        if state.fail_on_get {
            return Err(ProviderError::Api {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        state
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| ProviderError::PaymentNotFound(payment_id.to_string()))
    }
}
