// store/feed.rs
//
// Ordered stream of committed mutation events. Sequence numbers are assigned
// while the committing transaction still holds the table write guard, so feed
// order always matches commit order. A bounded retention ring serves replays;
// the live tail is an unbounded channel so appending never blocks on a slow
// consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::chatmodel::Message;
use crate::models::jobmodel::{Bid, Job};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobCreated,
    JobStatusChanged,
    BidCreated,
    BidDecided,
    MessageCreated,
    MessageRead,
}

impl EventKind {
    pub fn to_str(&self) -> &str {
        match self {
            EventKind::JobCreated => "job_created",
            EventKind::JobStatusChanged => "job_status_changed",
            EventKind::BidCreated => "bid_created",
            EventKind::BidDecided => "bid_decided",
            EventKind::MessageCreated => "message_created",
            EventKind::MessageRead => "message_read",
        }
    }
}

/// Post-mutation snapshot of the affected row. Bid events carry the owning
/// job's requester and the bidder's user id so routing needs no store lookups.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    Job(Job),
    Bid {
        bid: Bid,
        job_owner_id: Uuid,
        bidder_user_id: Uuid,
    },
    Message(Message),
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreEvent {
    pub seq: u64,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl StoreEvent {
    /// User ids with a stake in the affected entity: the job owner, the
    /// bidder's owning user, or the two ends of a message.
    pub fn participants(&self) -> Vec<Uuid> {
        match &self.payload {
            EventPayload::Job(job) => vec![job.user_id],
            EventPayload::Bid {
                job_owner_id,
                bidder_user_id,
                ..
            } => {
                if job_owner_id == bidder_user_id {
                    vec![*job_owner_id]
                } else {
                    vec![*job_owner_id, *bidder_user_id]
                }
            }
            EventPayload::Message(msg) => {
                if msg.sender_id == msg.receiver_id {
                    vec![msg.sender_id]
                } else {
                    vec![msg.sender_id, msg.receiver_id]
                }
            }
        }
    }
}

/// Outcome of a cursor replay request.
#[derive(Debug)]
pub enum Replay {
    /// Every event after the cursor, in order.
    Events(Vec<Arc<StoreEvent>>),
    /// The cursor fell behind retention; the subscriber must resync.
    Gap,
}

struct FeedInner {
    next_seq: u64,
    buffer: VecDeque<Arc<StoreEvent>>,
}

pub struct ChangeFeed {
    inner: Mutex<FeedInner>,
    retention: usize,
    tail_tx: mpsc::UnboundedSender<Arc<StoreEvent>>,
    tail_rx: Mutex<Option<mpsc::UnboundedReceiver<Arc<StoreEvent>>>>,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("retention", &self.retention)
            .finish()
    }
}

impl ChangeFeed {
    pub fn new(retention: usize) -> Self {
        let (tail_tx, tail_rx) = mpsc::unbounded_channel();
        ChangeFeed {
            inner: Mutex::new(FeedInner {
                next_seq: 1,
                buffer: VecDeque::new(),
            }),
            retention,
            tail_tx,
            tail_rx: Mutex::new(Some(tail_rx)),
        }
    }

    /// Append one committed event. Must be called while the store still holds
    /// its table write guard so sequence order matches commit order.
    pub fn append(&self, kind: EventKind, payload: EventPayload) -> Arc<StoreEvent> {
        let mut inner = self.inner.lock().unwrap();
        let event = Arc::new(StoreEvent {
            seq: inner.next_seq,
            kind,
            payload,
            occurred_at: Utc::now(),
        });
        inner.next_seq += 1;
        inner.buffer.push_back(event.clone());
        while inner.buffer.len() > self.retention {
            inner.buffer.pop_front();
        }
        // The dispatcher may not be running (tests, shutdown); that is fine.
        let _ = self.tail_tx.send(event.clone());
        event
    }

    /// Highest sequence number assigned so far; 0 when nothing has committed.
    pub fn current_seq(&self) -> u64 {
        self.inner.lock().unwrap().next_seq - 1
    }

    /// Everything after `last_seen`, or `Gap` when the suffix is no longer
    /// retained.
    pub fn replay_after(&self, last_seen: u64) -> Replay {
        let inner = self.inner.lock().unwrap();
        let latest = inner.next_seq - 1;
        if last_seen >= latest {
            return Replay::Events(Vec::new());
        }
        match inner.buffer.front() {
            Some(oldest) if oldest.seq <= last_seen + 1 => Replay::Events(
                inner
                    .buffer
                    .iter()
                    .filter(|e| e.seq > last_seen)
                    .cloned()
                    .collect(),
            ),
            _ => Replay::Gap,
        }
    }

    /// The single live tail, consumed by the dispatcher. Subsequent calls
    /// return `None`.
    pub fn take_tail(&self) -> Option<mpsc::UnboundedReceiver<Arc<StoreEvent>>> {
        self.tail_rx.lock().unwrap().take()
    }
}
