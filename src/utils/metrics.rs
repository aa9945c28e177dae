use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct NetworkMetrics {
    pub registrations: u64,
    pub lookups: u64,
    pub downloads_served: u64,
    pub bytes_served: u64,
    pub fetches_completed: u64,
    pub bytes_fetched: u64,
    pub integrity_failures: u64,
    pub refresh_failures: u64,
    pub uptime: Duration,
    pub start_time: Instant,
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self {
            registrations: 0,
            lookups: 0,
            downloads_served: 0,
            bytes_served: 0,
            fetches_completed: 0,
            bytes_fetched: 0,
            integrity_failures: 0,
            refresh_failures: 0,
            uptime: Duration::new(0, 0),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Display for NetworkMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "uptime={:.0?} registrations={} lookups={} served={} ({} bytes) fetched={} ({} bytes) integrity_failures={} refresh_failures={}",
            self.uptime,
            self.registrations,
            self.lookups,
            self.downloads_served,
            self.bytes_served,
            self.fetches_completed,
            self.bytes_fetched,
            self.integrity_failures,
            self.refresh_failures
        )
    }
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<NetworkMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_registration(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.registrations += 1;
    }

    pub async fn record_lookup(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.lookups += 1;
    }

    pub async fn record_download_served(&self, bytes: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.downloads_served += 1;
        metrics.bytes_served += bytes;
    }

    pub async fn record_fetch_completed(&self, bytes: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.fetches_completed += 1;
        metrics.bytes_fetched += bytes;
    }

    pub async fn record_integrity_failure(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.integrity_failures += 1;
    }

    pub async fn record_refresh_failure(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.refresh_failures += 1;
    }

    pub async fn get_metrics(&self) -> NetworkMetrics {
        let mut metrics = self.metrics.read().await.clone();
        metrics.uptime = metrics.start_time.elapsed();
        metrics
    }
}
