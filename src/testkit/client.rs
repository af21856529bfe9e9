//! Mock messaging clients.
//!
//! - [`MockProducer`]: accepts every send (or fails every Nth), optionally
//!   after a delay. Best for: producer loop, batching and stop behavior.
//! - [`MockConsumer`]: serves a fixed number of messages, then blocks until
//!   cancelled. Best for: consumer loop, ack failures and idle timeouts.
//! - [`FailingConnector`]: refuses every connection. Best for: factory
//!   error propagation.
//!
//! Each mock exposes a [`CallCounts`] handle so tests can assert on calls
//! after the client has been moved into a worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::{
    ConsumerClient, ConsumerConnector, Message, MessageId, ProducerClient, ProducerConnector,
};
use crate::error::ClientError;

/// Shared call counters for a mock client.
#[derive(Debug, Default)]
pub struct CallCounts {
    sends: AtomicU64,
    send_attempts: AtomicU64,
    flushes: AtomicU64,
    closes: AtomicU64,
    receives: AtomicU64,
    acks: AtomicU64,
}

impl CallCounts {
    /// Successful sends.
    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn send_attempts(&self) -> u64 {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Messages handed out by `receive`.
    pub fn receives(&self) -> u64 {
        self.receives.load(Ordering::SeqCst)
    }

    /// Successful acks.
    pub fn acks(&self) -> u64 {
        self.acks.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// MockProducer
// ---------------------------------------------------------------------------

pub struct MockProducer {
    counts: Arc<CallCounts>,
    fail_every: u64,
    delay: Duration,
    closed: AtomicBool,
}

impl MockProducer {
    pub fn new() -> Self {
        Self {
            counts: Arc::new(CallCounts::default()),
            fail_every: 0,
            delay: Duration::ZERO,
            closed: AtomicBool::new(false),
        }
    }

    /// Fail every `n`th send attempt with [`ClientError::Send`].
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    /// Take `delay` per send. Cancellation interrupts the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Share counters with other mocks (e.g. all producers in a pool).
    pub fn with_counts(mut self, counts: Arc<CallCounts>) -> Self {
        self.counts = counts;
        self
    }

    pub fn handle(&self) -> Arc<CallCounts> {
        Arc::clone(&self.counts)
    }
}

impl Default for MockProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProducerClient for MockProducer {
    async fn send(
        &self,
        cancel: &CancellationToken,
        _payload: Vec<u8>,
    ) -> Result<MessageId, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let attempt = self.counts.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && attempt % self.fail_every == 0 {
            return Err(ClientError::Send("injected failure".into()));
        }
        self.counts.sends.fetch_add(1, Ordering::SeqCst);
        Ok(attempt)
    }

    async fn flush(&self) -> Result<(), ClientError> {
        self.counts.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockConsumer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MockMessage(Vec<u8>);

impl Message for MockMessage {
    fn payload(&self) -> &[u8] {
        &self.0
    }
}

pub struct MockConsumer {
    counts: Arc<CallCounts>,
    remaining: AtomicU64,
    message_size: usize,
    fail_acks: bool,
    ack_delay: Duration,
    closed: AtomicBool,
}

impl MockConsumer {
    /// Serve `count` messages of `size` bytes, then block until cancelled.
    pub fn with_messages(count: u64, size: usize) -> Self {
        Self {
            counts: Arc::new(CallCounts::default()),
            remaining: AtomicU64::new(count),
            message_size: size,
            fail_acks: false,
            ack_delay: Duration::ZERO,
            closed: AtomicBool::new(false),
        }
    }

    /// A consumer whose receive always blocks until cancelled.
    pub fn empty() -> Self {
        Self::with_messages(0, 0)
    }

    /// Fail every ack with [`ClientError::Ack`].
    pub fn fail_acks(mut self) -> Self {
        self.fail_acks = true;
        self
    }

    /// Hold every ack for `delay`. An ack that outlives `close` fails with
    /// [`ClientError::Closed`].
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    pub fn handle(&self) -> Arc<CallCounts> {
        Arc::clone(&self.counts)
    }

    fn take_one(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ConsumerClient for MockConsumer {
    async fn receive(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Message>, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        if self.take_one() {
            self.counts.receives.fetch_add(1, Ordering::SeqCst);
            return Ok(Box::new(MockMessage(vec![0; self.message_size])));
        }
        cancel.cancelled().await;
        Err(ClientError::Cancelled)
    }

    async fn ack(&self, _message: &dyn Message) -> Result<(), ClientError> {
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(ClientError::Closed);
            }
        }
        if self.fail_acks {
            return Err(ClientError::Ack("injected failure".into()));
        }
        self.counts.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

/// Connector producing [`MockProducer`]s that share one set of counters.
#[derive(Default)]
pub struct MockConnector {
    counts: Arc<CallCounts>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<CallCounts> {
        Arc::clone(&self.counts)
    }
}

#[async_trait]
impl ProducerConnector for MockConnector {
    async fn connect_producer(
        &self,
        _worker_id: usize,
    ) -> Result<Box<dyn ProducerClient>, ClientError> {
        Ok(Box::new(MockProducer::new().with_counts(self.handle())))
    }
}

/// Connector that refuses every connection.
pub struct FailingConnector;

#[async_trait]
impl ProducerConnector for FailingConnector {
    async fn connect_producer(
        &self,
        worker_id: usize,
    ) -> Result<Box<dyn ProducerClient>, ClientError> {
        Err(ClientError::Connect(format!("refused worker {worker_id}")))
    }
}

#[async_trait]
impl ConsumerConnector for FailingConnector {
    async fn connect_consumer(
        &self,
        worker_id: usize,
    ) -> Result<Box<dyn ConsumerClient>, ClientError> {
        Err(ClientError::Connect(format!("refused worker {worker_id}")))
    }
}
