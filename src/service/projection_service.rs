// service/projection_service.rs
//
// Incrementally maintained read views, one instance per connected viewer.
// Derived strictly from the change feed: applying the same ordered event
// sequence to an empty projection always yields the same view, and applying
// an event twice (same sequence number) is a no-op.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::chatmodel::Message;
use crate::models::jobmodel::{Bid, BidStatus, Job};
use crate::store::feed::{EventKind, EventPayload, StoreEvent};
use crate::store::store::ViewerSnapshot;

/// Nested bid line of a job-board row; carries the bidder's owning user so
/// clients (and the dispatcher) never need a join.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BidSummary {
    pub id: Uuid,
    pub job_id: Uuid,
    pub business_id: Uuid,
    pub bidder_user_id: Uuid,
    pub amount: BigDecimal,
    pub proposal: String,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

impl BidSummary {
    pub fn from_bid(bid: &Bid, bidder_user_id: Uuid) -> Self {
        BidSummary {
            id: bid.id,
            job_id: bid.job_id,
            business_id: bid.business_id,
            bidder_user_id,
            amount: bid.amount.clone(),
            proposal: bid.proposal.clone(),
            status: bid.status,
            created_at: bid.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobBoardRow {
    pub job: Job,
    pub bids: Vec<BidSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThreadSummary {
    pub counterparty_id: Uuid,
    pub last_message: Message,
    pub unread_count: u32,
}

/// What gets pushed to a subscribed client. Upserts carry whole rows, so a
/// delta stream is safe to re-apply and a replayed suffix converges without
/// a dedicated repair type.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewDelta {
    JobUpserted {
        row: JobBoardRow,
    },
    BidPatched {
        job_id: Uuid,
        bid: BidSummary,
    },
    ThreadUpserted {
        thread: ThreadSummary,
    },
    Resync {
        board: Vec<JobBoardRow>,
        threads: Vec<ThreadSummary>,
    },
}

/// Job listings, newest first, bids patched in place. A bid that arrives
/// before its job is parked and merged once the job materializes.
#[derive(Debug, Default)]
struct JobBoardProjection {
    rows: HashMap<Uuid, JobBoardRow>,
    order: BTreeMap<(Reverse<DateTime<Utc>>, Reverse<Uuid>), Uuid>,
    parked_bids: HashMap<Uuid, Vec<BidSummary>>,
}

impl JobBoardProjection {
    fn upsert_job(&mut self, job: Job) -> JobBoardRow {
        let key = (Reverse(job.created_at), Reverse(job.id));
        let job_id = job.id;

        let row = match self.rows.get_mut(&job_id) {
            Some(row) => {
                row.job = job;
                row.clone()
            }
            None => {
                let mut bids = self.parked_bids.remove(&job_id).unwrap_or_default();
                sort_bids(&mut bids);
                let row = JobBoardRow { job, bids };
                self.rows.insert(job_id, row.clone());
                self.order.insert(key, job_id);
                row
            }
        };
        row
    }

    /// Patch the owning row's bid list only; the rest of the board is never
    /// touched. Returns None when the job is unknown and the bid was parked.
    fn patch_bid(&mut self, job_id: Uuid, bid: BidSummary) -> Option<JobBoardRow> {
        match self.rows.get_mut(&job_id) {
            Some(row) => {
                upsert_bid(&mut row.bids, bid);
                Some(row.clone())
            }
            None => {
                let parked = self.parked_bids.entry(job_id).or_default();
                upsert_bid(parked, bid);
                None
            }
        }
    }

    fn missing_jobs(&self) -> Vec<Uuid> {
        self.parked_bids.keys().copied().collect()
    }

    fn snapshot(&self) -> Vec<JobBoardRow> {
        self.order
            .values()
            .filter_map(|id| self.rows.get(id).cloned())
            .collect()
    }
}

fn sort_bids(bids: &mut [BidSummary]) {
    bids.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

fn upsert_bid(bids: &mut Vec<BidSummary>, bid: BidSummary) {
    match bids.iter_mut().find(|b| b.id == bid.id) {
        Some(existing) => *existing = bid,
        None => {
            bids.push(bid);
            sort_bids(bids);
        }
    }
}

#[derive(Debug)]
struct ThreadState {
    last_message: Message,
    // Feed seq of the event that set last_message; breaks created_at ties.
    last_seq: u64,
    unread: HashSet<Uuid>,
}

impl ThreadState {
    fn summary(&self, counterparty_id: Uuid) -> ThreadSummary {
        ThreadSummary {
            counterparty_id,
            last_message: self.last_message.clone(),
            unread_count: self.unread.len() as u32,
        }
    }
}

/// One row per counterparty, deduplicated from the raw message stream.
/// Unread state is a set of message ids, so duplicate delivery can never
/// skew the count and decrements floor at zero structurally.
#[derive(Debug, Default)]
struct ChatThreadProjection {
    threads: HashMap<Uuid, ThreadState>,
}

impl ChatThreadProjection {
    fn apply_message_created(&mut self, viewer_id: Uuid, msg: &Message, seq: u64) -> ThreadSummary {
        let counterparty = msg.counterparty(viewer_id);
        let state = self
            .threads
            .entry(counterparty)
            .or_insert_with(|| ThreadState {
                last_message: msg.clone(),
                last_seq: seq,
                unread: HashSet::new(),
            });

        if (msg.created_at, seq) >= (state.last_message.created_at, state.last_seq) {
            state.last_message = msg.clone();
            state.last_seq = seq;
        }
        if msg.receiver_id == viewer_id && !msg.read {
            state.unread.insert(msg.id);
        }

        state.summary(counterparty)
    }

    fn apply_message_read(
        &mut self,
        viewer_id: Uuid,
        msg: &Message,
        seq: u64,
    ) -> Option<ThreadSummary> {
        let counterparty = msg.counterparty(viewer_id);
        match self.threads.get_mut(&counterparty) {
            Some(state) => {
                state.unread.remove(&msg.id);
                if state.last_message.id == msg.id {
                    state.last_message.read = true;
                }
                Some(state.summary(counterparty))
            }
            None => {
                // Read receipt for a pair we have not seen yet; materialize
                // the thread from the event's snapshot.
                let state = ThreadState {
                    last_message: msg.clone(),
                    last_seq: seq,
                    unread: HashSet::new(),
                };
                let summary = state.summary(counterparty);
                self.threads.insert(counterparty, state);
                Some(summary)
            }
        }
    }

    fn snapshot(&self) -> Vec<ThreadSummary> {
        let mut threads: Vec<(&Uuid, &ThreadState)> = self.threads.iter().collect();
        threads.sort_by(|a, b| {
            (b.1.last_message.created_at, b.1.last_seq)
                .cmp(&(a.1.last_message.created_at, a.1.last_seq))
        });
        threads
            .into_iter()
            .map(|(id, state)| state.summary(*id))
            .collect()
    }
}

#[derive(Debug)]
pub struct ViewerProjection {
    viewer_id: Uuid,
    last_applied_seq: u64,
    board: JobBoardProjection,
    threads: ChatThreadProjection,
}

impl ViewerProjection {
    pub fn new(viewer_id: Uuid) -> Self {
        ViewerProjection {
            viewer_id,
            last_applied_seq: 0,
            board: JobBoardProjection::default(),
            threads: ChatThreadProjection::default(),
        }
    }

    /// Build from a consistent store snapshot. `last_applied_seq` is the
    /// snapshot's feed position for a fresh subscription, or the client's
    /// cursor when the caller is about to replay a suffix on top.
    pub fn from_snapshot(
        viewer_id: Uuid,
        snapshot: &ViewerSnapshot,
        last_applied_seq: u64,
    ) -> Self {
        let mut projection = ViewerProjection::new(viewer_id);
        projection.last_applied_seq = last_applied_seq;

        for (job, bids) in &snapshot.jobs {
            projection.board.upsert_job(job.clone());
            for (bid, bidder_user_id) in bids {
                projection
                    .board
                    .patch_bid(bid.job_id, BidSummary::from_bid(bid, *bidder_user_id));
            }
        }
        // Insertion order is the tie-break for equal timestamps, so folding
        // the messages in order reproduces exactly what live application
        // would have built.
        for (index, msg) in snapshot.messages.iter().enumerate() {
            projection
                .threads
                .apply_message_created(viewer_id, msg, index as u64);
        }

        projection
    }

    /// Apply one feed event. Duplicate delivery (seq already applied) is a
    /// no-op; events for entities the viewer has no stake in produce no
    /// deltas but still advance the cursor.
    pub fn apply(&mut self, event: &StoreEvent) -> Vec<ViewDelta> {
        if event.seq <= self.last_applied_seq {
            return Vec::new();
        }
        self.last_applied_seq = event.seq;

        match (&event.kind, &event.payload) {
            (
                EventKind::JobCreated | EventKind::JobStatusChanged,
                EventPayload::Job(job),
            ) => {
                let row = self.board.upsert_job(job.clone());
                vec![ViewDelta::JobUpserted { row }]
            }

            (
                EventKind::BidCreated | EventKind::BidDecided,
                EventPayload::Bid {
                    bid,
                    bidder_user_id,
                    ..
                },
            ) => {
                let summary = BidSummary::from_bid(bid, *bidder_user_id);
                match self.board.patch_bid(bid.job_id, summary.clone()) {
                    Some(_) => vec![ViewDelta::BidPatched {
                        job_id: bid.job_id,
                        bid: summary,
                    }],
                    // Unknown job: parked for backfill, nothing to push yet.
                    None => Vec::new(),
                }
            }

            (EventKind::MessageCreated, EventPayload::Message(msg)) => {
                if !msg.involves(self.viewer_id) {
                    return Vec::new();
                }
                let thread = self
                    .threads
                    .apply_message_created(self.viewer_id, msg, event.seq);
                vec![ViewDelta::ThreadUpserted { thread }]
            }

            (EventKind::MessageRead, EventPayload::Message(msg)) => {
                if !msg.involves(self.viewer_id) {
                    return Vec::new();
                }
                self.threads
                    .apply_message_read(self.viewer_id, msg, event.seq)
                    .map(|thread| ViewDelta::ThreadUpserted { thread })
                    .into_iter()
                    .collect()
            }

            (kind, _) => {
                tracing::warn!(
                    "event {} has mismatched kind {:?} and payload; skipped",
                    event.seq,
                    kind
                );
                Vec::new()
            }
        }
    }

    /// Jobs referenced by parked bids, awaiting a targeted refetch.
    pub fn missing_jobs(&self) -> Vec<Uuid> {
        self.board.missing_jobs()
    }

    /// Feed a refetched job to the board; merges any parked bids.
    pub fn backfill_job(&mut self, job: Job) -> Option<ViewDelta> {
        if self.board.rows.contains_key(&job.id) || !self.board.parked_bids.contains_key(&job.id) {
            return None;
        }
        let row = self.board.upsert_job(job);
        Some(ViewDelta::JobUpserted { row })
    }

    pub fn snapshot_board(&self) -> Vec<JobBoardRow> {
        self.board.snapshot()
    }

    pub fn snapshot_threads(&self) -> Vec<ThreadSummary> {
        self.threads.snapshot()
    }

    pub fn resync_delta(&self) -> ViewDelta {
        ViewDelta::Resync {
            board: self.snapshot_board(),
            threads: self.snapshot_threads(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::jobmodel::{BidStatus, JobStatus};
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn job(owner: Uuid, created_at: DateTime<Utc>) -> Job {
        Job {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "Paint the hallway".to_string(),
            description: "Two coats, eggshell white".to_string(),
            budget: BigDecimal::from(100),
            category: "painting".to_string(),
            location: "Springfield".to_string(),
            status: JobStatus::Open,
            created_at,
        }
    }

    fn bid(job_id: Uuid, amount: i32) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            job_id,
            business_id: Uuid::new_v4(),
            amount: BigDecimal::from(amount),
            proposal: "Ready this week".to_string(),
            status: BidStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn message(sender: Uuid, receiver: Uuid, content: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content: content.to_string(),
            read: false,
            created_at: at,
        }
    }

    fn event(seq: u64, kind: EventKind, payload: EventPayload) -> StoreEvent {
        StoreEvent {
            seq,
            kind,
            payload,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_event_application_is_a_no_op() {
        let owner = Uuid::new_v4();
        let mut projection = ViewerProjection::new(owner);

        let job = job(owner, Utc::now());
        let created = event(1, EventKind::JobCreated, EventPayload::Job(job.clone()));

        let first = projection.apply(&created);
        assert_eq!(first.len(), 1);
        let board_after_first = projection.snapshot_board();

        let second = projection.apply(&created);
        assert!(second.is_empty());
        assert_eq!(projection.snapshot_board(), board_after_first);
    }

    #[test]
    fn bid_events_patch_only_the_owning_row() {
        let owner = Uuid::new_v4();
        let bidder = Uuid::new_v4();
        let mut projection = ViewerProjection::new(owner);

        let now = Utc::now();
        let job_a = job(owner, now);
        let job_b = job(owner, now + Duration::seconds(1));
        projection.apply(&event(1, EventKind::JobCreated, EventPayload::Job(job_a.clone())));
        projection.apply(&event(2, EventKind::JobCreated, EventPayload::Job(job_b.clone())));

        let bid_a = bid(job_a.id, 90);
        let deltas = projection.apply(&event(
            3,
            EventKind::BidCreated,
            EventPayload::Bid {
                bid: bid_a.clone(),
                job_owner_id: owner,
                bidder_user_id: bidder,
            },
        ));
        assert!(matches!(deltas.as_slice(), [ViewDelta::BidPatched { job_id, .. }] if *job_id == job_a.id));

        let board = projection.snapshot_board();
        // Newest first: job_b leads, untouched by the patch.
        assert_eq!(board[0].job.id, job_b.id);
        assert!(board[0].bids.is_empty());
        assert_eq!(board[1].bids.len(), 1);
        assert_eq!(board[1].bids[0].id, bid_a.id);
    }

    #[test]
    fn bid_before_job_is_parked_then_backfilled() {
        let owner = Uuid::new_v4();
        let bidder = Uuid::new_v4();
        let mut projection = ViewerProjection::new(owner);

        let job = job(owner, Utc::now());
        let bid = bid(job.id, 85);

        let deltas = projection.apply(&event(
            5,
            EventKind::BidCreated,
            EventPayload::Bid {
                bid: bid.clone(),
                job_owner_id: owner,
                bidder_user_id: bidder,
            },
        ));
        assert!(deltas.is_empty());
        assert_eq!(projection.missing_jobs(), vec![job.id]);

        let delta = projection.backfill_job(job.clone());
        match delta {
            Some(ViewDelta::JobUpserted { row }) => {
                assert_eq!(row.job.id, job.id);
                assert_eq!(row.bids.len(), 1);
                assert_eq!(row.bids[0].id, bid.id);
            }
            other => panic!("expected a backfill upsert, got {:?}", other),
        }
        assert!(projection.missing_jobs().is_empty());
    }

    #[test]
    fn chat_thread_tracks_last_message_and_unread() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut projection = ViewerProjection::new(alice);

        let t0 = Utc::now();
        let hi = message(alice, bob, "hi", t0);
        let hello = message(bob, alice, "hello", t0 + Duration::seconds(1));

        projection.apply(&event(
            1,
            EventKind::MessageCreated,
            EventPayload::Message(hi),
        ));
        let deltas = projection.apply(&event(
            2,
            EventKind::MessageCreated,
            EventPayload::Message(hello.clone()),
        ));

        match deltas.as_slice() {
            [ViewDelta::ThreadUpserted { thread }] => {
                assert_eq!(thread.counterparty_id, bob);
                assert_eq!(thread.last_message.content, "hello");
                assert_eq!(thread.unread_count, 1);
            }
            other => panic!("expected one thread upsert, got {:?}", other),
        }

        let mut read = hello;
        read.read = true;
        let deltas = projection.apply(&event(
            3,
            EventKind::MessageRead,
            EventPayload::Message(read),
        ));
        match deltas.as_slice() {
            [ViewDelta::ThreadUpserted { thread }] => {
                assert_eq!(thread.unread_count, 0);
                assert!(thread.last_message.read);
            }
            other => panic!("expected one thread upsert, got {:?}", other),
        }
    }

    #[test]
    fn identical_timestamps_break_ties_by_sequence_number() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut projection = ViewerProjection::new(alice);

        let t0 = Utc::now();
        let first = message(bob, alice, "first", t0);
        let second = message(bob, alice, "second", t0);

        projection.apply(&event(
            1,
            EventKind::MessageCreated,
            EventPayload::Message(first),
        ));
        projection.apply(&event(
            2,
            EventKind::MessageCreated,
            EventPayload::Message(second),
        ));

        let threads = projection.snapshot_threads();
        assert_eq!(threads[0].last_message.content, "second");
        assert_eq!(threads[0].unread_count, 2);
    }

    #[test]
    fn replayed_suffix_converges_to_the_in_order_view() {
        let owner = Uuid::new_v4();
        let bidder = Uuid::new_v4();
        let counterparty = Uuid::new_v4();

        let now = Utc::now();
        let job_row = job(owner, now);
        let bid_row = bid(job_row.id, 75);
        let msg = message(counterparty, owner, "when can you start?", now);

        let events = vec![
            event(1, EventKind::JobCreated, EventPayload::Job(job_row.clone())),
            event(
                2,
                EventKind::BidCreated,
                EventPayload::Bid {
                    bid: bid_row.clone(),
                    job_owner_id: owner,
                    bidder_user_id: bidder,
                },
            ),
            event(3, EventKind::MessageCreated, EventPayload::Message(msg)),
        ];

        let mut in_order = ViewerProjection::new(owner);
        for e in &events {
            in_order.apply(e);
        }

        // Same sequence with a replayed prefix: events 1..=3, then 2 and 3
        // delivered again after a reconnect.
        let mut with_replay = ViewerProjection::new(owner);
        for e in &events {
            with_replay.apply(e);
        }
        with_replay.last_applied_seq = 1; // client cursor after the gap
        for e in &events[1..] {
            with_replay.apply(e);
        }

        assert_eq!(in_order.snapshot_board(), with_replay.snapshot_board());
        assert_eq!(in_order.snapshot_threads(), with_replay.snapshot_threads());
    }
}
