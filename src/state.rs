use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::dispatch::DispatchCoordinator;
use crate::engine::fare::FareCalculator;
use crate::engine::payments::PaymentDesk;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::providers::{PaymentProvider, RouteProvider};
use crate::store::memory::InMemoryStore;
use crate::store::StoreHandle;

pub struct AppState {
    pub store: StoreHandle,
    pub dispatch: Arc<DispatchCoordinator>,
    pub payments: Arc<PaymentDesk>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: &Config,
        routes: Arc<dyn RouteProvider>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Result<Self, AppError> {
        let store: StoreHandle = Arc::new(InMemoryStore::new());
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();

        let dispatch = Arc::new(DispatchCoordinator::new(
            store.clone(),
            FareCalculator::new(config.fare_config())?,
            routes,
            events_tx,
            metrics.clone(),
            config.dispatch_settings(),
        ));
        let payments = Arc::new(PaymentDesk::new(
            dispatch.clone(),
            payment_provider,
            config.provider_timeout(),
            config.advance_percent,
        ));

        Ok(Self {
            store,
            dispatch,
            payments,
            metrics,
        })
    }
}
