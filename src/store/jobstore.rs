// store/jobstore.rs
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use super::feed::{EventKind, EventPayload};
use super::store::{StoreClient, StoreError};
use crate::models::jobmodel::{Bid, BidStatus, Job, JobStatus};

#[async_trait]
pub trait JobStoreExt {
    async fn insert_job(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
        budget: BigDecimal,
        category: String,
        location: String,
    ) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Option<Job>;

    /// All jobs, newest first, each with its bids.
    async fn list_jobs_with_bids(&self) -> Vec<(Job, Vec<Bid>)>;

    async fn bids_for_job(&self, job_id: Uuid) -> Vec<Bid>;

    async fn get_bid(&self, bid_id: Uuid) -> Option<Bid>;

    async fn insert_bid(
        &self,
        job_id: Uuid,
        business_id: Uuid,
        amount: BigDecimal,
        proposal: String,
    ) -> Result<Bid, StoreError>;

    /// Apply a set of bid status decisions and an optional job status change
    /// as one transaction. Emits `BidDecided` for every decided bid in the
    /// given order, then `JobStatusChanged` when the job moved.
    async fn apply_bid_decision(
        &self,
        job_id: Uuid,
        decisions: &[(Uuid, BidStatus)],
        new_status: Option<JobStatus>,
    ) -> Result<(Job, Vec<Bid>), StoreError>;

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<Job, StoreError>;
}

#[async_trait]
impl JobStoreExt for StoreClient {
    async fn insert_job(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
        budget: BigDecimal,
        category: String,
        location: String,
    ) -> Result<Job, StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::RowNotFound("user", user_id));
        }

        let job = Job {
            id: Uuid::new_v4(),
            user_id,
            title,
            description,
            budget,
            category,
            location,
            status: JobStatus::Open,
            created_at: Utc::now(),
        };
        tables.jobs.insert(job.id, job.clone());
        self.feed()
            .append(EventKind::JobCreated, EventPayload::Job(job.clone()));

        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.tables.read().await.jobs.get(&job_id).cloned()
    }

    async fn list_jobs_with_bids(&self) -> Vec<(Job, Vec<Bid>)> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        jobs.into_iter()
            .map(|job| {
                let mut bids: Vec<Bid> = tables
                    .bids
                    .values()
                    .filter(|b| b.job_id == job.id)
                    .cloned()
                    .collect();
                bids.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                (job, bids)
            })
            .collect()
    }

    async fn bids_for_job(&self, job_id: Uuid) -> Vec<Bid> {
        let tables = self.tables.read().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|b| b.job_id == job_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        bids
    }

    async fn get_bid(&self, bid_id: Uuid) -> Option<Bid> {
        self.tables.read().await.bids.get(&bid_id).cloned()
    }

    async fn insert_bid(
        &self,
        job_id: Uuid,
        business_id: Uuid,
        amount: BigDecimal,
        proposal: String,
    ) -> Result<Bid, StoreError> {
        let mut tables = self.tables.write().await;

        let job_owner_id = tables
            .jobs
            .get(&job_id)
            .map(|j| j.user_id)
            .ok_or(StoreError::RowNotFound("job", job_id))?;
        let bidder_user_id = tables
            .businesses
            .get(&business_id)
            .map(|b| b.user_id)
            .ok_or(StoreError::RowNotFound("business profile", business_id))?;

        let bid = Bid {
            id: Uuid::new_v4(),
            job_id,
            business_id,
            amount,
            proposal,
            status: BidStatus::Pending,
            created_at: Utc::now(),
        };
        tables.bids.insert(bid.id, bid.clone());
        self.feed().append(
            EventKind::BidCreated,
            EventPayload::Bid {
                bid: bid.clone(),
                job_owner_id,
                bidder_user_id,
            },
        );

        Ok(bid)
    }

    async fn apply_bid_decision(
        &self,
        job_id: Uuid,
        decisions: &[(Uuid, BidStatus)],
        new_status: Option<JobStatus>,
    ) -> Result<(Job, Vec<Bid>), StoreError> {
        let mut tables = self.tables.write().await;

        let job_owner_id = tables
            .jobs
            .get(&job_id)
            .map(|j| j.user_id)
            .ok_or(StoreError::RowNotFound("job", job_id))?;

        // Validate the whole batch before touching anything; the transaction
        // either applies completely or not at all.
        let mut bidder_users = Vec::with_capacity(decisions.len());
        for (bid_id, _) in decisions {
            let bid = tables
                .bids
                .get(bid_id)
                .ok_or(StoreError::RowNotFound("bid", *bid_id))?;
            let bidder_user_id = tables
                .businesses
                .get(&bid.business_id)
                .map(|b| b.user_id)
                .ok_or(StoreError::RowNotFound("business profile", bid.business_id))?;
            bidder_users.push(bidder_user_id);
        }

        let mut decided = Vec::with_capacity(decisions.len());
        for ((bid_id, status), bidder_user_id) in decisions.iter().zip(bidder_users) {
            let bid = tables
                .bids
                .get_mut(bid_id)
                .ok_or(StoreError::RowNotFound("bid", *bid_id))?;
            bid.status = *status;
            let snapshot = bid.clone();
            self.feed().append(
                EventKind::BidDecided,
                EventPayload::Bid {
                    bid: snapshot.clone(),
                    job_owner_id,
                    bidder_user_id,
                },
            );
            decided.push(snapshot);
        }

        let job = {
            let job = tables
                .jobs
                .get_mut(&job_id)
                .ok_or(StoreError::RowNotFound("job", job_id))?;
            if let Some(status) = new_status {
                job.status = status;
                let snapshot = job.clone();
                self.feed()
                    .append(EventKind::JobStatusChanged, EventPayload::Job(snapshot));
            }
            job.clone()
        };

        Ok((job, decided))
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<Job, StoreError> {
        let mut tables = self.tables.write().await;
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::RowNotFound("job", job_id))?;
        job.status = status;
        let snapshot = job.clone();
        self.feed()
            .append(EventKind::JobStatusChanged, EventPayload::Job(snapshot.clone()));
        Ok(snapshot)
    }
}
