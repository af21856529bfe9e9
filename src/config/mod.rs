//! Configuration loading from TOML files.

mod logging;
mod metrics;
mod pool;
mod settings;

pub use logging::{LogFormat, LoggingConfig};
pub use metrics::{HistogramKind, MetricsConfig, ReportFormat};
pub use pool::{ConsumerConfig, PayloadKind, PoolConfig, ProducerConfig, RunConfig};
pub use settings::{BrokerConfig, Config};
