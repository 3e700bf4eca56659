// service/dispatch_service.rs
//
// Fans change-feed events out to the per-viewer projections of connected
// clients. Delivery never blocks the feed: every subscriber has a bounded
// queue written with try_send only; a full queue flags the subscriber for a
// forced resync, a closed one is detached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::service::error::ServiceError;
use crate::service::projection_service::{ViewDelta, ViewerProjection};
use crate::store::feed::{Replay, StoreEvent};
use crate::store::jobstore::JobStoreExt;
use crate::store::store::StoreClient;

/// One live client connection.
pub struct Subscription {
    pub viewer_id: Uuid,
    pub conn_id: Uuid,
    pub receiver: mpsc::Receiver<ViewDelta>,
}

struct Subscriber {
    conn_id: Uuid,
    viewer_id: Uuid,
    tx: mpsc::Sender<ViewDelta>,
    projection: Mutex<ViewerProjection>,
    resync_pending: AtomicBool,
}

pub struct DispatchService {
    store: Arc<StoreClient>,
    registry: DashMap<Uuid, Vec<Arc<Subscriber>>>,
    queue_capacity: usize,
}

impl DispatchService {
    /// Take the feed tail and start the delivery loop.
    pub fn start(store: Arc<StoreClient>, queue_capacity: usize) -> Arc<Self> {
        let service = Arc::new(DispatchService {
            store: store.clone(),
            registry: DashMap::new(),
            queue_capacity,
        });

        match store.feed().take_tail() {
            Some(mut tail) => {
                let svc = service.clone();
                tokio::spawn(async move {
                    while let Some(event) = tail.recv().await {
                        svc.deliver(&event).await;
                    }
                    tracing::debug!("change feed tail closed; dispatcher stopping");
                });
            }
            None => {
                tracing::warn!("change feed tail already taken; dispatcher will see no live events");
            }
        }

        service
    }

    /// Register a viewer connection. With a cursor, the retained suffix is
    /// replayed as ordinary deltas; without one (or past retention) the
    /// projection is seeded from a store snapshot and a `Resync` delta is
    /// queued first.
    pub async fn subscribe(&self, viewer_id: Uuid, last_seen: Option<u64>) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.queue_capacity);
        let subscriber = Arc::new(Subscriber {
            conn_id: Uuid::new_v4(),
            viewer_id,
            tx,
            projection: Mutex::new(ViewerProjection::new(viewer_id)),
            resync_pending: AtomicBool::new(false),
        });

        // Register before seeding so no commit can fall between the snapshot
        // and the registration; duplicate application is idempotent anyway.
        self.registry
            .entry(viewer_id)
            .or_default()
            .push(subscriber.clone());

        match last_seen {
            Some(cursor) => match self.store.feed().replay_after(cursor) {
                Replay::Events(events) => {
                    let snapshot = self.store.viewer_snapshot(viewer_id).await;
                    let mut projection = subscriber.projection.lock().await;
                    *projection = ViewerProjection::from_snapshot(viewer_id, &snapshot, cursor);
                    let mut deltas = Vec::new();
                    for event in &events {
                        deltas.extend(projection.apply(event));
                    }
                    drop(projection);

                    for delta in deltas {
                        if subscriber.tx.try_send(delta).is_err() {
                            subscriber.resync_pending.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                    tracing::debug!("viewer {} resumed from seq {}", viewer_id, cursor);
                }
                Replay::Gap => {
                    tracing::info!(
                        "viewer {} cursor {}: {}",
                        viewer_id,
                        cursor,
                        ServiceError::FeedGap
                    );
                    self.seed_with_resync(&subscriber).await;
                }
            },
            None => self.seed_with_resync(&subscriber).await,
        }

        Subscription {
            viewer_id,
            conn_id: subscriber.conn_id,
            receiver,
        }
    }

    pub fn unsubscribe(&self, viewer_id: Uuid, conn_id: Uuid) {
        if let Some(mut subscribers) = self.registry.get_mut(&viewer_id) {
            subscribers.retain(|s| s.conn_id != conn_id);
        }
        self.registry.remove_if(&viewer_id, |_, v| v.is_empty());
    }

    pub fn active_connections(&self, viewer_id: Uuid) -> usize {
        self.registry
            .get(&viewer_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Rebuild a subscriber's projection from a fresh store snapshot and
    /// queue the full-state delta.
    async fn seed_with_resync(&self, subscriber: &Arc<Subscriber>) {
        let snapshot = self.store.viewer_snapshot(subscriber.viewer_id).await;
        let seq = snapshot.seq;
        let mut projection = subscriber.projection.lock().await;
        *projection = ViewerProjection::from_snapshot(subscriber.viewer_id, &snapshot, seq);
        let resync = projection.resync_delta();
        drop(projection);

        if subscriber.tx.try_send(resync).is_ok() {
            subscriber.resync_pending.store(false, Ordering::Relaxed);
        } else {
            subscriber.resync_pending.store(true, Ordering::Relaxed);
        }
    }

    async fn deliver(&self, event: &Arc<StoreEvent>) {
        let participants = event.participants();
        tracing::debug!(
            "dispatching event {} ({}) to {} participant(s)",
            event.seq,
            event.kind.to_str(),
            participants.len()
        );

        for viewer_id in participants {
            let subscribers: Vec<Arc<Subscriber>> = match self.registry.get(&viewer_id) {
                Some(subs) => subs.value().clone(),
                None => continue,
            };

            for subscriber in subscribers {
                if subscriber.tx.is_closed() {
                    self.unsubscribe(viewer_id, subscriber.conn_id);
                    tracing::debug!(
                        "viewer {} connection {} closed; detached",
                        viewer_id,
                        subscriber.conn_id
                    );
                    continue;
                }

                if subscriber.resync_pending.load(Ordering::Relaxed) {
                    // Only rebuild once the client has drained some room;
                    // until then the projection stays flagged, not fed.
                    if subscriber.tx.capacity() > 0 {
                        self.seed_with_resync(&subscriber).await;
                    }
                    continue;
                }

                let mut projection = subscriber.projection.lock().await;
                let mut deltas = projection.apply(event);
                // Targeted refetch for bids that referenced a job the
                // projection has not seen.
                for job_id in projection.missing_jobs() {
                    if let Some(job) = self.store.get_job(job_id).await {
                        if let Some(delta) = projection.backfill_job(job) {
                            deltas.push(delta);
                        }
                    }
                }
                drop(projection);

                for delta in deltas {
                    match subscriber.tx.try_send(delta) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(
                                "viewer {} connection {} queue overflow; forcing resync",
                                viewer_id,
                                subscriber.conn_id
                            );
                            subscriber.resync_pending.store(true, Ordering::Relaxed);
                            break;
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            self.unsubscribe(viewer_id, subscriber.conn_id);
                            break;
                        }
                    }
                }
            }
        }
    }
}
