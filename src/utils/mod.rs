pub mod error;
pub mod logger;
pub mod metrics;
pub mod retry;

pub use error::{P2PError, Result};
pub use logger::setup_logging;
pub use metrics::{MetricsCollector, NetworkMetrics};
pub use retry::{RetryConfig, retry_with_backoff};
