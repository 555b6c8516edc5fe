use std::time::{Duration, Instant};

use clusterscope_config::HubConfig;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::metrics::{MetricPoint, RingBuffer, SourceTag};

/// Messages pushed to subscribers, serialised as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HubMessage {
    Snapshot { points: Vec<MetricPoint> },
    Point { point: MetricPoint },
    Status { source: SourceTag, message: String },
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<HubMessage>,
    dropped: u64,
    overflowing_since: Option<Instant>,
}

struct HubState {
    ring: RingBuffer<MetricPoint>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    closed: bool,
}

/// Per-context ring buffer plus fan-out to subscribers.
///
/// Appending and dispatching happen under one lock, so a subscriber's snapshot
/// and the points that follow it never overlap or leave a gap. Sends never
/// block: a full queue drops that message for that subscriber only, and a
/// subscriber that stays full for longer than the grace period is removed.
pub struct MetricsHub {
    state: Mutex<HubState>,
    queue_depth: usize,
    overflow_grace: Duration,
}

/// Receiving half handed to one subscriber. `None` from [`recv`](Self::recv) means the hub dropped it.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<HubMessage>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<HubMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HubMessage> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberStats {
    pub id: u64,
    pub dropped: u64,
    pub overflowing: bool,
}

impl MetricsHub {
    pub fn new(ring_size: usize, config: &HubConfig) -> Self {
        Self {
            state: Mutex::new(HubState {
                ring: RingBuffer::new(ring_size),
                subscribers: Vec::new(),
                next_id: 1,
                closed: false,
            }),
            queue_depth: config.queue_depth.max(1),
            overflow_grace: config.overflow_grace(),
        }
    }

    /// Registers a subscriber whose first message is the current snapshot.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        if state.closed {
            return Subscription { id, rx };
        }

        // a fresh channel always has room for the snapshot
        let _ = tx.try_send(HubMessage::Snapshot { points: state.ring.snapshot() });
        state.subscribers.push(Subscriber { id, tx, dropped: 0, overflowing_since: None });
        debug!(subscriber = id, total = state.subscribers.len(), "Hub subscriber added");

        Subscription { id, rx }
    }

    pub fn publish(&self, point: MetricPoint) {
        self.publish_at(point, Instant::now());
    }

    pub(crate) fn publish_at(&self, point: MetricPoint, now: Instant) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.ring.push(point.clone());
        self.dispatch(&mut state, HubMessage::Point { point }, now);
    }

    /// Out-of-band advisory; not recorded in the ring.
    pub fn publish_status(&self, source: SourceTag, message: impl Into<String>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        self.dispatch(&mut state, HubMessage::Status { source, message: message.into() }, Instant::now());
    }

    pub fn snapshot(&self) -> Vec<MetricPoint> {
        self.state.lock().ring.snapshot()
    }

    pub fn latest(&self) -> Option<MetricPoint> {
        self.state.lock().ring.latest()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn stats(&self) -> Vec<SubscriberStats> {
        self.state
            .lock()
            .subscribers
            .iter()
            .map(|s| SubscriberStats { id: s.id, dropped: s.dropped, overflowing: s.overflowing_since.is_some() })
            .collect()
    }

    /// Drops every subscriber and rejects further publishes. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn dispatch(&self, state: &mut HubState, message: HubMessage, now: Instant) {
        let grace = self.overflow_grace;
        state.subscribers.retain_mut(|sub| match sub.tx.try_send(message.clone()) {
            Ok(()) => {
                sub.overflowing_since = None;
                true
            }
            Err(TrySendError::Full(_)) => {
                sub.dropped += 1;
                let since = *sub.overflowing_since.get_or_insert(now);
                if now.duration_since(since) >= grace {
                    warn!(subscriber = sub.id, dropped = sub.dropped, "Hub subscriber stalled, disconnecting");
                    false
                } else {
                    true
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = sub.id, "Hub subscriber gone");
                false
            }
        });
    }
}
