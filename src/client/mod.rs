//! Messaging client boundary.
//!
//! Workers drive an external broker through these traits and never see the
//! wire protocol. A connector creates one client per worker; clients must
//! tolerate `close` while an operation is in flight.

mod memory;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

pub use memory::{MemoryBroker, MemoryConsumer, MemoryMessage, MemoryProducer};

/// Broker-assigned identifier of a sent message.
pub type MessageId = u64;

/// A received message.
pub trait Message: Send + Sync + std::fmt::Debug {
    fn payload(&self) -> &[u8];
}

#[async_trait]
pub trait ProducerClient: Send + Sync {
    /// Send one payload. Returns [`ClientError::Cancelled`] if `cancel`
    /// fires before the send completes.
    async fn send(
        &self,
        cancel: &CancellationToken,
        payload: Vec<u8>,
    ) -> Result<MessageId, ClientError>;

    /// Push any buffered sends to the broker.
    async fn flush(&self) -> Result<(), ClientError>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ConsumerClient: Send + Sync {
    /// Wait for the next message. Blocks until one arrives or `cancel` fires.
    async fn receive(&self, cancel: &CancellationToken)
        -> Result<Box<dyn Message>, ClientError>;

    async fn ack(&self, message: &dyn Message) -> Result<(), ClientError>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Creates producer clients, one per worker.
#[async_trait]
pub trait ProducerConnector: Send + Sync {
    async fn connect_producer(
        &self,
        worker_id: usize,
    ) -> Result<Box<dyn ProducerClient>, ClientError>;
}

/// Creates consumer clients, one per worker.
#[async_trait]
pub trait ConsumerConnector: Send + Sync {
    async fn connect_consumer(
        &self,
        worker_id: usize,
    ) -> Result<Box<dyn ConsumerClient>, ClientError>;
}
