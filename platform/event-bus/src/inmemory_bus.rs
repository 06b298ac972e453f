//! In-memory implementation of the EventBus trait for testing and development

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Acker, BusError, BusMessage, BusResult, Delivery, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// EventBus implementation backed by an in-process broker
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Cross-service tests that wire several services to one broker
///
/// Each queue keeps a FIFO list of ready messages and the set of messages
/// handed out but not yet settled. Subscribers on the same queue compete for
/// messages. A nak, a dropped connection or a delivery dropped unsettled puts
/// the message back at the head of its queue with its delivery count preserved.
///
/// Clones share the same connection. Use [`InMemoryBus::connection`] to open
/// a second client against the same broker.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Queues are durable: publishing before anyone subscribes is fine
/// bus.publish("user.events", b"hello".to_vec()).await?;
///
/// let mut stream = bus.subscribe("user.events").await?;
/// let delivery = stream.next().await.unwrap();
/// assert_eq!(delivery.message.payload, b"hello");
/// delivery.ack().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    broker: Arc<Broker>,
    conn: Arc<Connection>,
    retry: RetryConfig,
}

struct Broker {
    state: Mutex<BrokerState>,
    notify: Notify,
    next_conn_id: AtomicU64,
}

struct BrokerState {
    available: bool,
    /// Bumped on every outage; connections opened before it are dead
    generation: u64,
    next_seq: u64,
    queues: HashMap<String, Queue>,
}

#[derive(Default)]
struct Queue {
    ready: VecDeque<Stored>,
    unacked: HashMap<u64, Unacked>,
}

#[derive(Clone)]
struct Stored {
    seq: u64,
    payload: Vec<u8>,
    deliveries: u32,
}

struct Unacked {
    conn_id: u64,
    stored: Stored,
}

struct Connection {
    id: u64,
    /// Generation this connection was established in, if connected
    generation: Mutex<Option<u64>>,
    closed: AtomicBool,
}

impl Broker {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connection {
    fn new(id: u64) -> Self {
        Self {
            id,
            generation: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn generation(&self) -> Option<u64> {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_generation(&self, generation: Option<u64>) {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) = generation;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Queue {
    /// Move unsettled messages matching `pred` back to the head, oldest first.
    fn requeue_where(&mut self, pred: impl Fn(&Unacked) -> bool) {
        let mut seqs: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| pred(u))
            .map(|(seq, _)| *seq)
            .collect();
        seqs.sort_unstable();

        for seq in seqs.into_iter().rev() {
            if let Some(unacked) = self.unacked.remove(&seq) {
                self.ready.push_front(unacked.stored);
            }
        }
    }
}

enum Next {
    Deliver(Delivery),
    Wait,
    End,
}

impl InMemoryBus {
    /// Create a new broker and a client connected to it, with the default
    /// connect budget (5 attempts, 5s apart)
    pub fn new() -> Self {
        Self::with_retry_config(RetryConfig::connect_default())
    }

    /// Create a new broker whose client retries connects per `retry`
    pub fn with_retry_config(retry: RetryConfig) -> Self {
        let broker = Arc::new(Broker {
            state: Mutex::new(BrokerState {
                available: true,
                generation: 0,
                next_seq: 0,
                queues: HashMap::new(),
            }),
            notify: Notify::new(),
            next_conn_id: AtomicU64::new(1),
        });
        Self {
            conn: Arc::new(Connection::new(0)),
            broker,
            retry,
        }
    }

    /// Open a separate client against the same broker
    pub fn connection(&self) -> Self {
        let id = self.broker.next_conn_id.fetch_add(1, Ordering::SeqCst);
        Self {
            broker: self.broker.clone(),
            conn: Arc::new(Connection::new(id)),
            retry: self.retry.clone(),
        }
    }

    /// Simulate the broker going down (`false`) or coming back (`true`).
    ///
    /// Going down drops every connection: live subscription streams end and
    /// their unsettled messages return to the head of their queues. Queue
    /// contents survive.
    pub fn set_available(&self, available: bool) {
        {
            let mut state = self.broker.lock();
            if state.available && !available {
                state.generation += 1;
                for queue in state.queues.values_mut() {
                    queue.requeue_where(|_| true);
                }
            }
            state.available = available;
        }
        self.broker.notify.notify_waiters();
    }

    /// Messages in `queue` not yet acknowledged, ready or in flight
    pub fn depth(&self, queue: &str) -> usize {
        self.broker
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len() + q.unacked.len())
            .unwrap_or(0)
    }

    /// Payloads waiting in `queue`, head first
    pub fn ready_payloads(&self, queue: &str) -> Vec<Vec<u8>> {
        self.broker
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|s| s.payload.clone()).collect())
            .unwrap_or_default()
    }

    fn try_connect(&self) -> BusResult<()> {
        if self.conn.is_closed() {
            return Err(BusError::Closed);
        }
        let state = self.broker.lock();
        if !state.available {
            return Err(BusError::ConnectionError("broker unavailable".to_string()));
        }
        self.conn.set_generation(Some(state.generation));
        Ok(())
    }

    /// Generation of the live connection, connecting first if needed
    async fn ensure_connected(&self) -> BusResult<u64> {
        if self.conn.is_closed() {
            return Err(BusError::Closed);
        }
        if let Some(generation) = self.live_generation() {
            return Ok(generation);
        }
        self.connect().await?;
        self.live_generation()
            .ok_or_else(|| BusError::ConnectionError("connection lost while connecting".to_string()))
    }

    fn live_generation(&self) -> Option<u64> {
        let generation = self.conn.generation()?;
        let state = self.broker.lock();
        (state.available && state.generation == generation).then_some(generation)
    }

    fn next_delivery(broker: &Arc<Broker>, conn: &Arc<Connection>, queue: &str, generation: u64) -> Next {
        if conn.is_closed() {
            return Next::End;
        }
        let mut state = broker.lock();
        if !state.available || state.generation != generation {
            return Next::End;
        }
        let q = state.queues.entry(queue.to_string()).or_default();
        let Some(mut stored) = q.ready.pop_front() else {
            return Next::Wait;
        };
        stored.deliveries += 1;

        let message = BusMessage::new(queue.to_string(), stored.payload.clone())
            .with_delivery_count(stored.deliveries);
        let acker = MemoryAcker {
            broker: broker.clone(),
            queue: queue.to_string(),
            seq: stored.seq,
            deliveries: stored.deliveries,
            generation,
        };
        q.unacked.insert(
            stored.seq,
            Unacked {
                conn_id: conn.id,
                stored,
            },
        );

        Next::Deliver(Delivery::new(message, Box::new(acker)))
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn connect(&self) -> BusResult<()> {
        if self.conn.is_closed() {
            return Err(BusError::Closed);
        }
        if self.live_generation().is_some() {
            return Ok(());
        }
        retry_with_backoff(
            || async move { self.try_connect() },
            &self.retry,
            "inmemory_bus_connect",
        )
        .await
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> BusResult<()> {
        self.ensure_connected().await?;
        {
            let mut state = self.broker.lock();
            if !state.available {
                return Err(BusError::PublishError("broker unavailable".to_string()));
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .ready
                .push_back(Stored {
                    seq,
                    payload,
                    deliveries: 0,
                });
        }
        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> BusResult<BoxStream<'static, Delivery>> {
        let generation = self.ensure_connected().await?;
        self.broker
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default();

        let broker = self.broker.clone();
        let conn = self.conn.clone();
        let queue = queue.to_string();

        let stream = async_stream::stream! {
            loop {
                // Registered before checking so a publish in between still wakes us
                let notified = broker.notify.notified();
                match Self::next_delivery(&broker, &conn, &queue, generation) {
                    Next::Deliver(delivery) => yield delivery,
                    Next::Wait => notified.await,
                    Next::End => break,
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn close(&self) -> BusResult<()> {
        if self.conn.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.conn.set_generation(None);
        {
            let mut state = self.broker.lock();
            let conn_id = self.conn.id;
            for queue in state.queues.values_mut() {
                queue.requeue_where(|u| u.conn_id == conn_id);
            }
        }
        self.broker.notify.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.conn.is_closed() && self.live_generation().is_some()
    }
}

/// Settles one delivery. Dropping it unsettled puts the message back.
struct MemoryAcker {
    broker: Arc<Broker>,
    queue: String,
    seq: u64,
    /// Delivery count at hand-out; a later redelivery of `seq` has a higher one
    deliveries: u32,
    generation: u64,
}

impl MemoryAcker {
    fn take(&self) -> BusResult<(MutexGuard<'_, BrokerState>, Stored)> {
        let mut state = self.broker.lock();
        if state.generation != self.generation {
            return Err(BusError::AckError(
                "connection lost, message already requeued".to_string(),
            ));
        }
        let stored = state
            .queues
            .get_mut(&self.queue)
            .filter(|q| {
                q.unacked
                    .get(&self.seq)
                    .is_some_and(|u| u.stored.deliveries == self.deliveries)
            })
            .and_then(|q| q.unacked.remove(&self.seq))
            .map(|u| u.stored)
            .ok_or_else(|| BusError::AckError("delivery already settled".to_string()))?;
        Ok((state, stored))
    }

    fn requeue(&self) -> BusResult<()> {
        {
            let (mut state, stored) = self.take()?;
            state
                .queues
                .entry(self.queue.clone())
                .or_default()
                .ready
                .push_front(stored);
        }
        self.broker.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> BusResult<()> {
        self.take().map(|_| ())
    }

    async fn nak(&self) -> BusResult<()> {
        self.requeue()
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        // Fails when the delivery was already settled or requeued elsewhere
        if self.requeue().is_ok() {
            tracing::debug!(queue = %self.queue, seq = self.seq, "Unsettled delivery dropped, requeued");
        }
    }
}

/// Connect budget for tests that expect connects to give up quickly
#[cfg(test)]
pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig::fixed(3, std::time::Duration::from_millis(10))
}
