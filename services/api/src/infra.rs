use flat_registry::config::AppConfig;
use flat_registry::notifications::{DrainTracker, LogNotifier, NotificationDispatcher};
use flat_registry::records::{FlatService, HouseService, InMemoryRecordStore, RecordsState};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Services wired against one shared in-memory store.
pub(crate) struct Registry {
    pub(crate) records: RecordsState,
    pub(crate) drain: DrainTracker,
}

impl Registry {
    pub(crate) fn in_memory(config: &AppConfig) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let drain = DrainTracker::new();
        let notifier = Arc::new(LogNotifier::new(config.notifications.simulated_latency));
        let dispatcher = NotificationDispatcher::new(store.clone(), notifier, drain.clone());

        let records = RecordsState {
            flats: FlatService::new(store.clone(), dispatcher),
            houses: HouseService::new(store),
            request_timeout: config.moderation.request_timeout,
        };

        Self { records, drain }
    }
}
