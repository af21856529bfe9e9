use std::time::Duration;

use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors reported by messaging clients.
///
/// Cancellation is kept apart from every other failure so that a clean
/// shutdown is never counted as a failed operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("client is closed")]
    Closed,

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("ack failed: {0}")]
    Ack(String),

    #[error("flush failed: {0}")]
    Flush(String),
}

impl ClientError {
    /// True when the error reflects a cancelled operation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Returned by [`RateLimiter::wait`](crate::ratelimit::RateLimiter::wait) when
/// the caller's token fires before a permit is available.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait cancelled")]
pub struct Cancelled;

/// Pool lifecycle and invariant errors.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("pool is already running")]
    AlreadyRunning,

    #[error("pool has been stopped and its workers closed")]
    Closed,

    #[error("cannot remove worker: pool must retain at least one worker (current: {count})")]
    LastWorker { count: usize },

    #[error("failed to create worker {worker_id}: {source}")]
    Factory {
        worker_id: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("shutdown incomplete: {} timed out, {} failed", timed_out.len(), failed.len())]
    Shutdown {
        /// Ids of workers whose task did not finish within the timeout.
        timed_out: Vec<usize>,
        /// Worker ids paired with the reason they failed to stop cleanly.
        failed: Vec<(usize, String)>,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("metrics error: {0}")]
    Metrics(String),
}

pub type Result<T> = std::result::Result<T, Error>;
