use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ConsumerWorker, ProducerWorker, Worker};
use crate::client::{ConsumerConnector, ProducerConnector};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::error::Result;
use crate::metrics::MetricsCollector;

/// Everything a factory needs to build one worker.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Ordinal id, unique within the pool.
    pub id: usize,
    pub metrics: Arc<MetricsCollector>,
    /// Initial per-worker rate. `None` means unlimited.
    pub rate_share: Option<f64>,
    pub warmup: Duration,
    pub duration: Option<Duration>,
}

/// Builds workers for a pool.
///
/// Implemented for any `Fn(WorkerContext) -> impl Future<Output = Result<Arc<dyn Worker>>>`.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn create(&self, ctx: WorkerContext) -> Result<Arc<dyn Worker>>;
}

#[async_trait]
impl<F, Fut> WorkerFactory for F
where
    F: Fn(WorkerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Arc<dyn Worker>>> + Send + 'static,
{
    async fn create(&self, ctx: WorkerContext) -> Result<Arc<dyn Worker>> {
        self(ctx).await
    }
}

/// Connects one producer client per worker.
pub struct ProducerFactory {
    connector: Arc<dyn ProducerConnector>,
    config: ProducerConfig,
}

impl ProducerFactory {
    pub fn new(connector: Arc<dyn ProducerConnector>, config: ProducerConfig) -> Self {
        Self { connector, config }
    }
}

#[async_trait]
impl WorkerFactory for ProducerFactory {
    async fn create(&self, ctx: WorkerContext) -> Result<Arc<dyn Worker>> {
        let client = self.connector.connect_producer(ctx.id).await?;
        Ok(Arc::new(ProducerWorker::new(ctx, client, &self.config)))
    }
}

/// Connects one consumer client per worker.
pub struct ConsumerFactory {
    connector: Arc<dyn ConsumerConnector>,
    config: ConsumerConfig,
}

impl ConsumerFactory {
    pub fn new(connector: Arc<dyn ConsumerConnector>, config: ConsumerConfig) -> Self {
        Self { connector, config }
    }
}

#[async_trait]
impl WorkerFactory for ConsumerFactory {
    async fn create(&self, ctx: WorkerContext) -> Result<Arc<dyn Worker>> {
        let client = self.connector.connect_consumer(ctx.id).await?;
        Ok(Arc::new(ConsumerWorker::new(ctx, client, &self.config)))
    }
}
