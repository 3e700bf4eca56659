// store/store.rs
//
// Authoritative state for the five entity tables. One write guard scope is
// one transaction: every multi-row mutation happens under a single guard and
// appends its feed events before the guard drops, so readers never observe a
// partially applied transaction and feed order matches commit order.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::chatmodel::Message;
use crate::models::jobmodel::{Bid, Job};
use crate::models::usermodel::{BusinessProfile, User};

use super::feed::ChangeFeed;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} {1} not found")]
    RowNotFound(&'static str, Uuid),

    #[error("{0} already exists: {1}")]
    DuplicateRow(&'static str, String),
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub users: HashMap<Uuid, User>,
    pub businesses: HashMap<Uuid, BusinessProfile>,
    pub jobs: HashMap<Uuid, Job>,
    pub bids: HashMap<Uuid, Bid>,
    // Append-only; index order doubles as the insertion tie-break for
    // last-message selection. Only the read flag is ever mutated.
    pub messages: Vec<Message>,
}

pub struct StoreClient {
    pub(crate) tables: RwLock<Tables>,
    feed: ChangeFeed,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("feed", &self.feed)
            .finish()
    }
}

/// Consistent read of everything a viewer's projection is built from: the
/// jobs the viewer participates in (each bid paired with its bidder's user
/// id), the viewer's messages in insertion order, and the feed position the
/// snapshot corresponds to.
#[derive(Debug)]
pub struct ViewerSnapshot {
    pub jobs: Vec<(Job, Vec<(Bid, Uuid)>)>,
    pub messages: Vec<Message>,
    pub seq: u64,
}

impl StoreClient {
    pub fn new(feed_retention: usize) -> Self {
        StoreClient {
            tables: RwLock::new(Tables::default()),
            feed: ChangeFeed::new(feed_retention),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Snapshot taken under a single read guard. Appends only happen under
    /// the write guard, so the captured feed position exactly matches the
    /// table state.
    pub async fn viewer_snapshot(&self, viewer_id: Uuid) -> ViewerSnapshot {
        let tables = self.tables.read().await;

        let bidder_user = |business_id: &Uuid| -> Option<Uuid> {
            tables.businesses.get(business_id).map(|b| b.user_id)
        };

        let mut jobs: Vec<(Job, Vec<(Bid, Uuid)>)> = tables
            .jobs
            .values()
            .filter_map(|job| {
                let mut bids: Vec<(Bid, Uuid)> = tables
                    .bids
                    .values()
                    .filter(|b| b.job_id == job.id)
                    .filter_map(|b| bidder_user(&b.business_id).map(|u| (b.clone(), u)))
                    .collect();
                bids.sort_by(|a, b| {
                    a.0.created_at
                        .cmp(&b.0.created_at)
                        .then(a.0.id.cmp(&b.0.id))
                });

                let participates =
                    job.user_id == viewer_id || bids.iter().any(|(_, u)| *u == viewer_id);
                participates.then(|| (job.clone(), bids))
            })
            .collect();
        jobs.sort_by(|a, b| {
            b.0.created_at
                .cmp(&a.0.created_at)
                .then(b.0.id.cmp(&a.0.id))
        });

        let messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.involves(viewer_id))
            .cloned()
            .collect();

        ViewerSnapshot {
            jobs,
            messages,
            seq: self.feed.current_seq(),
        }
    }
}
