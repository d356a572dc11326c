use crate::config::{AppConfig, TrackerConfig};
use crate::workflows::cases::SnapshotStore;
use crate::workflows::forecast::{CaseEstimator, EstimateError};
use crate::workflows::sampling::{FetchConfig, UscisStatusClient};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) config: Arc<AppConfig>,
}

pub(crate) fn fetch_config(tracker: &TrackerConfig) -> FetchConfig {
    FetchConfig {
        proxy_pool: tracker.proxy_pool.clone(),
        rotate_every: tracker.rotate_every,
        ..FetchConfig::default()
    }
}

pub(crate) fn build_estimator(tracker: &TrackerConfig) -> Result<CaseEstimator, EstimateError> {
    let store = SnapshotStore::new(tracker.snapshot_dir.clone());
    let gateway = UscisStatusClient::connect(fetch_config(tracker))?;
    Ok(CaseEstimator::new(store, Box::new(gateway)))
}
