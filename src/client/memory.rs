//! In-process loopback broker.
//!
//! A bounded FIFO shared by every client created from the same
//! [`MemoryBroker`]. Used by the `run` command when no external broker is
//! wired in, and by end-to-end tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    ConsumerClient, ConsumerConnector, Message, MessageId, ProducerClient, ProducerConnector,
};
use crate::error::ClientError;

#[derive(Debug)]
struct Shared {
    queue: Mutex<VecDeque<MemoryMessage>>,
    capacity: usize,
    available: Notify,
    next_id: AtomicU64,
    acked: AtomicU64,
}

/// Bounded in-memory queue acting as both producer and consumer connector.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                capacity: capacity.max(1),
                available: Notify::new(),
                next_id: AtomicU64::new(0),
                acked: AtomicU64::new(0),
            }),
        }
    }

    /// Messages currently queued.
    pub fn depth(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Messages accepted since creation.
    pub fn published(&self) -> u64 {
        self.shared.next_id.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> u64 {
        self.shared.acked.load(Ordering::Relaxed)
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryMessage {
    id: MessageId,
    payload: Vec<u8>,
}

impl MemoryMessage {
    pub fn id(&self) -> MessageId {
        self.id
    }
}

impl Message for MemoryMessage {
    fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Debug)]
pub struct MemoryProducer {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

#[async_trait]
impl ProducerClient for MemoryProducer {
    async fn send(
        &self,
        cancel: &CancellationToken,
        payload: Vec<u8>,
    ) -> Result<MessageId, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }

        let id = {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity {
                return Err(ClientError::Send(format!(
                    "queue full ({} messages)",
                    self.shared.capacity
                )));
            }
            let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            queue.push_back(MemoryMessage { id, payload });
            id
        };
        self.shared.available.notify_one();
        Ok(id)
    }

    async fn flush(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("memory producer closed");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

#[async_trait]
impl ConsumerClient for MemoryConsumer {
    async fn receive(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Message>, ClientError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(ClientError::Closed);
            }

            // Register interest before checking the queue so a push between
            // the check and the await is not missed.
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.shared.queue.lock().pop_front() {
                return Ok(Box::new(message));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    async fn ack(&self, _message: &dyn Message) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        self.shared.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Wake blocked receivers so they observe the closed flag.
            self.shared.available.notify_waiters();
            debug!("memory consumer closed");
        }
        Ok(())
    }
}

#[async_trait]
impl ProducerConnector for MemoryBroker {
    async fn connect_producer(
        &self,
        _worker_id: usize,
    ) -> Result<Box<dyn ProducerClient>, ClientError> {
        Ok(Box::new(self.producer()))
    }
}

#[async_trait]
impl ConsumerConnector for MemoryBroker {
    async fn connect_consumer(
        &self,
        _worker_id: usize,
    ) -> Result<Box<dyn ConsumerClient>, ClientError> {
        Ok(Box::new(self.consumer()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_then_receive_round_trips_in_order() {
        let broker = MemoryBroker::new(10);
        let producer = broker.producer();
        let consumer = broker.consumer();
        let cancel = CancellationToken::new();

        let first = producer.send(&cancel, b"a".to_vec()).await.unwrap();
        let second = producer.send(&cancel, b"b".to_vec()).await.unwrap();
        assert!(first < second);

        assert_eq!(consumer.receive(&cancel).await.unwrap().payload(), b"a");
        let msg = consumer.receive(&cancel).await.unwrap();
        assert_eq!(msg.payload(), b"b");
        consumer.ack(msg.as_ref()).await.unwrap();
        assert_eq!(broker.acked(), 1);
        assert_eq!(broker.depth(), 0);
    }

    #[tokio::test]
    async fn full_queue_fails_send() {
        let broker = MemoryBroker::new(1);
        let producer = broker.producer();
        let cancel = CancellationToken::new();
        producer.send(&cancel, vec![0]).await.unwrap();
        let err = producer.send(&cancel, vec![1]).await.unwrap_err();
        assert!(matches!(err, ClientError::Send(_)));
        assert_eq!(broker.published(), 1);
    }

    #[tokio::test]
    async fn receive_blocks_until_cancelled() {
        let broker = MemoryBroker::new(1);
        let consumer = broker.consumer();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = consumer.receive(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn receive_wakes_on_send() {
        let broker = MemoryBroker::new(4);
        let consumer = broker.consumer();
        let producer = broker.producer();
        let cancel = CancellationToken::new();

        let pending = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.receive(&cancel).await.map(|m| m.payload().to_vec()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.send(&cancel, b"late".to_vec()).await.unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"late");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_operations() {
        let broker = MemoryBroker::new(4);
        let producer = broker.producer();
        let cancel = CancellationToken::new();
        producer.close().await.unwrap();
        producer.close().await.unwrap();
        assert_eq!(
            producer.send(&cancel, vec![1]).await.unwrap_err(),
            ClientError::Closed
        );
        assert_eq!(producer.flush().await.unwrap_err(), ClientError::Closed);
    }

    #[tokio::test]
    async fn close_wakes_blocked_receiver() {
        let broker = MemoryBroker::new(4);
        let consumer = Arc::new(broker.consumer());
        let cancel = CancellationToken::new();

        let pending = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            let cancel = cancel.clone();
            async move { consumer.receive(&cancel).await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        consumer.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), ClientError::Closed);
    }
}
