// service/workflow_service.rs
//
// The only component allowed to change Job/Bid status fields. Lifecycle
// rules run under a per-job mutex so concurrent decisions on the same job
// serialize; operations on different jobs and message sends stay fully
// parallel.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dtos::chatdtos::SendMessageDto;
use crate::dtos::jobdtos::{BidDecision, CreateJobDto, SubmitBidDto};
use crate::dtos::userdtos::{OnboardBusinessDto, RegisterUserDto, UpdateProfileDto};
use crate::models::chatmodel::Message;
use crate::models::jobmodel::{Bid, BidStatus, Job, JobStatus};
use crate::models::usermodel::{BusinessProfile, User};
use crate::service::error::ServiceError;
use crate::store::chatstore::ChatStoreExt;
use crate::store::jobstore::JobStoreExt;
use crate::store::store::StoreClient;
use crate::store::userstore::UserStoreExt;
use crate::utils::decimal;

#[derive(Debug, Clone)]
pub struct WorkflowService {
    store: Arc<StoreClient>,
    job_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl WorkflowService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self {
            store,
            job_locks: Arc::new(DashMap::new()),
        }
    }

    fn job_lock(&self, job_id: Uuid) -> Arc<Mutex<()>> {
        self.job_locks
            .entry(job_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn positive_amount(value: f64, what: &str) -> Result<BigDecimal, ServiceError> {
        decimal::from_f64(value)
            .filter(|a| *a > BigDecimal::from(0))
            .ok_or_else(|| ServiceError::Validation(format!("{} must be positive", what)))
    }

    pub async fn register_user(&self, user_data: RegisterUserDto) -> Result<User, ServiceError> {
        if user_data.name.trim().is_empty() {
            return Err(ServiceError::Validation("Name is required".to_string()));
        }

        let user = self
            .store
            .create_user(
                user_data.user_id,
                user_data.email,
                user_data.name,
                user_data.role,
            )
            .await?;

        tracing::info!("user {} registered as {}", user.id, user.role.to_str());
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        profile_data: UpdateProfileDto,
    ) -> Result<User, ServiceError> {
        if let Some(name) = &profile_data.name {
            if name.trim().is_empty() {
                return Err(ServiceError::Validation("Name is required".to_string()));
            }
        }

        let user = self
            .store
            .update_profile(user_id, profile_data.name, profile_data.profile_image_url)
            .await?;
        Ok(user)
    }

    pub async fn onboard_business(
        &self,
        user_id: Uuid,
        business_data: OnboardBusinessDto,
    ) -> Result<BusinessProfile, ServiceError> {
        let business = self
            .store
            .create_business_profile(
                user_id,
                business_data.business_name,
                business_data.category,
                business_data.description,
                business_data.address,
                business_data.hours,
                business_data.image_url,
            )
            .await?;

        tracing::info!("business {} onboarded for user {}", business.id, user_id);
        Ok(business)
    }

    pub async fn create_job(
        &self,
        requester_id: Uuid,
        job_data: CreateJobDto,
    ) -> Result<Job, ServiceError> {
        let budget = Self::positive_amount(job_data.budget, "Budget")?;

        for (field, value) in [
            ("Title", &job_data.title),
            ("Description", &job_data.description),
            ("Category", &job_data.category),
            ("Location", &job_data.location),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::Validation(format!("{} is required", field)));
            }
        }

        let job = self
            .store
            .insert_job(
                requester_id,
                job_data.title,
                job_data.description,
                budget,
                job_data.category,
                job_data.location,
            )
            .await?;

        tracing::info!("job {} posted by {}", job.id, requester_id);
        Ok(job)
    }

    pub async fn submit_bid(
        &self,
        job_id: Uuid,
        business_id: Uuid,
        acting_user_id: Uuid,
        bid_data: SubmitBidDto,
    ) -> Result<Bid, ServiceError> {
        let amount = Self::positive_amount(bid_data.amount, "Bid amount")?;
        if bid_data.proposal.trim().is_empty() {
            return Err(ServiceError::Validation("Proposal is required".to_string()));
        }

        let business = self
            .store
            .get_business(business_id)
            .await
            .ok_or(ServiceError::NotFound("business profile", business_id))?;
        if business.user_id != acting_user_id {
            return Err(ServiceError::Unauthorized {
                actor: acting_user_id,
                entity: "business profile",
                id: business_id,
            });
        }

        // The open check and the insert must not interleave with a
        // concurrent decision on this job.
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let job = self
            .store
            .get_job(job_id)
            .await
            .ok_or(ServiceError::NotFound("job", job_id))?;
        if job.user_id == acting_user_id {
            return Err(ServiceError::Validation(
                "You cannot bid on your own job".to_string(),
            ));
        }
        if job.status != JobStatus::Open {
            return Err(ServiceError::InvalidState(format!(
                "job {} is {}; bids are only accepted while a job is open",
                job.id,
                job.status.to_str()
            )));
        }

        let bid = self
            .store
            .insert_bid(job_id, business_id, amount, bid_data.proposal)
            .await?;

        tracing::info!("bid {} submitted on job {}", bid.id, job_id);
        Ok(bid)
    }

    /// Accepting a bid atomically rejects every other pending bid on the job
    /// and moves the job to in_progress, so "at most one accepted bid" holds
    /// structurally and no pending bid outlives a closed job.
    pub async fn decide_bid(
        &self,
        bid_id: Uuid,
        decision: BidDecision,
        acting_user_id: Uuid,
    ) -> Result<Bid, ServiceError> {
        let bid = self
            .store
            .get_bid(bid_id)
            .await
            .ok_or(ServiceError::NotFound("bid", bid_id))?;

        let lock = self.job_lock(bid.job_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; a concurrent decision may have landed.
        let bid = self
            .store
            .get_bid(bid_id)
            .await
            .ok_or(ServiceError::NotFound("bid", bid_id))?;
        let job = self
            .store
            .get_job(bid.job_id)
            .await
            .ok_or(ServiceError::NotFound("job", bid.job_id))?;

        if job.user_id != acting_user_id {
            return Err(ServiceError::Unauthorized {
                actor: acting_user_id,
                entity: "job",
                id: job.id,
            });
        }
        if bid.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "bid {} is already {}",
                bid.id,
                bid.status.to_str()
            )));
        }

        let (decisions, new_status) = match decision {
            BidDecision::Reject => (vec![(bid.id, BidStatus::Rejected)], None),
            BidDecision::Accept => {
                if job.status != JobStatus::Open {
                    // The bid is still pending but the job closed underneath
                    // it; the caller lost a race.
                    return Err(ServiceError::Conflict(format!(
                        "job {} is no longer open",
                        job.id
                    )));
                }
                let mut decisions = vec![(bid.id, BidStatus::Accepted)];
                decisions.extend(
                    self.store
                        .bids_for_job(job.id)
                        .await
                        .iter()
                        .filter(|b| b.id != bid.id && b.status == BidStatus::Pending)
                        .map(|b| (b.id, BidStatus::Rejected)),
                );
                (decisions, Some(JobStatus::InProgress))
            }
        };

        let rejected_siblings = decisions.len() - 1;
        let (_, mut decided) = self
            .store
            .apply_bid_decision(job.id, &decisions, new_status)
            .await?;
        if decided.is_empty() {
            return Err(ServiceError::NotFound("bid", bid_id));
        }
        let decided_bid = decided.remove(0);

        match decision {
            BidDecision::Accept => tracing::info!(
                "bid {} accepted on job {}; {} sibling bid(s) auto-rejected",
                bid_id,
                job.id,
                rejected_siblings
            ),
            BidDecision::Reject => tracing::info!("bid {} rejected on job {}", bid_id, job.id),
        }

        Ok(decided_bid)
    }

    pub async fn complete_job(
        &self,
        job_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<Job, ServiceError> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let job = self
            .store
            .get_job(job_id)
            .await
            .ok_or(ServiceError::NotFound("job", job_id))?;

        if job.user_id != acting_user_id {
            return Err(ServiceError::Unauthorized {
                actor: acting_user_id,
                entity: "job",
                id: job_id,
            });
        }
        if job.status != JobStatus::InProgress {
            return Err(ServiceError::InvalidState(format!(
                "job {} is {}; only an in_progress job can be completed",
                job.id,
                job.status.to_str()
            )));
        }

        let job = self
            .store
            .set_job_status(job_id, JobStatus::Completed)
            .await?;

        // The job reached its terminal status; its lock slot is done.
        drop(_guard);
        self.job_locks.remove(&job_id);

        tracing::info!("job {} completed", job_id);
        Ok(job)
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        message_data: SendMessageDto,
    ) -> Result<Message, ServiceError> {
        if message_data.content.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Message content is required".to_string(),
            ));
        }
        if message_data.receiver_id == sender_id {
            return Err(ServiceError::Validation(
                "You cannot message yourself".to_string(),
            ));
        }
        if self.store.get_user(message_data.receiver_id).await.is_none() {
            return Err(ServiceError::NotFound("user", message_data.receiver_id));
        }

        let message = self
            .store
            .insert_message(sender_id, message_data.receiver_id, message_data.content)
            .await?;
        Ok(message)
    }

    pub async fn mark_thread_read(
        &self,
        viewer_id: Uuid,
        counterparty_id: Uuid,
    ) -> Result<Vec<Message>, ServiceError> {
        if self.store.get_user(counterparty_id).await.is_none() {
            return Err(ServiceError::NotFound("user", counterparty_id));
        }

        Ok(self
            .store
            .mark_messages_read(viewer_id, counterparty_id)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usermodel::UserRole;
    use futures::future::join_all;

    async fn setup() -> (Arc<StoreClient>, WorkflowService) {
        let store = Arc::new(StoreClient::new(256));
        let workflow = WorkflowService::new(store.clone());
        (store, workflow)
    }

    async fn seed_requester(workflow: &WorkflowService, email: &str) -> User {
        workflow
            .register_user(RegisterUserDto {
                user_id: None,
                email: email.to_string(),
                name: "Pat Requester".to_string(),
                role: UserRole::Requester,
            })
            .await
            .unwrap()
    }

    async fn seed_provider(
        workflow: &WorkflowService,
        email: &str,
        business_name: &str,
    ) -> (User, BusinessProfile) {
        let user = workflow
            .register_user(RegisterUserDto {
                user_id: None,
                email: email.to_string(),
                name: "Sam Provider".to_string(),
                role: UserRole::Provider,
            })
            .await
            .unwrap();
        let business = workflow
            .onboard_business(
                user.id,
                OnboardBusinessDto {
                    business_name: business_name.to_string(),
                    category: "plumbing".to_string(),
                    description: "Pipes fixed same day".to_string(),
                    address: "12 Main St".to_string(),
                    hours: None,
                    image_url: None,
                },
            )
            .await
            .unwrap();
        (user, business)
    }

    fn job_dto(budget: f64) -> CreateJobDto {
        CreateJobDto {
            title: "Fix kitchen sink".to_string(),
            description: "Leaking under the basin, needs new trap".to_string(),
            budget,
            category: "plumbing".to_string(),
            location: "Springfield".to_string(),
        }
    }

    fn bid_dto(amount: f64) -> SubmitBidDto {
        SubmitBidDto {
            amount,
            proposal: "Can start tomorrow morning".to_string(),
        }
    }

    #[tokio::test]
    async fn create_job_rejects_non_positive_budget() {
        let (_, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;

        for budget in [0.0, -25.0] {
            let err = workflow
                .create_job(requester.id, job_dto(budget))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn create_job_rejects_blank_required_fields() {
        let (_, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;

        let mut dto = job_dto(100.0);
        dto.title = "   ".to_string();
        let err = workflow.create_job(requester.id, dto).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_bid_fails_on_non_open_job_regardless_of_amount() {
        let (_, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;
        let (provider_one, business_one) =
            seed_provider(&workflow, "sam@example.com", "Sam's Pipes").await;
        let (_, business_two) = seed_provider(&workflow, "lee@example.com", "Lee's Drains").await;

        let job = workflow
            .create_job(requester.id, job_dto(100.0))
            .await
            .unwrap();
        let bid = workflow
            .submit_bid(job.id, business_one.id, provider_one.id, bid_dto(90.0))
            .await
            .unwrap();
        workflow
            .decide_bid(bid.id, BidDecision::Accept, requester.id)
            .await
            .unwrap();

        for amount in [1.0, 95.0, 10_000.0] {
            let err = workflow
                .submit_bid(
                    job.id,
                    business_two.id,
                    business_two.user_id,
                    bid_dto(amount),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidState(_)));
        }
    }

    #[tokio::test]
    async fn submit_bid_rejects_non_positive_amount() {
        let (_, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;
        let (provider, business) = seed_provider(&workflow, "sam@example.com", "Sam's Pipes").await;

        let job = workflow
            .create_job(requester.id, job_dto(100.0))
            .await
            .unwrap();
        let err = workflow
            .submit_bid(job.id, business.id, provider.id, bid_dto(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn accepting_a_bid_cascades_and_closes_the_job() {
        let (store, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;
        let (provider_one, business_one) =
            seed_provider(&workflow, "sam@example.com", "Sam's Pipes").await;
        let (provider_two, business_two) =
            seed_provider(&workflow, "lee@example.com", "Lee's Drains").await;

        let job = workflow
            .create_job(requester.id, job_dto(100.0))
            .await
            .unwrap();
        let bid_one = workflow
            .submit_bid(job.id, business_one.id, provider_one.id, bid_dto(90.0))
            .await
            .unwrap();
        let bid_two = workflow
            .submit_bid(job.id, business_two.id, provider_two.id, bid_dto(95.0))
            .await
            .unwrap();

        let accepted = workflow
            .decide_bid(bid_one.id, BidDecision::Accept, requester.id)
            .await
            .unwrap();
        assert_eq!(accepted.status, BidStatus::Accepted);

        let job = store.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        let sibling = store.get_bid(bid_two.id).await.unwrap();
        assert_eq!(sibling.status, BidStatus::Rejected);

        // The cascade already rejected bid two; a late accept must fail.
        let err = workflow
            .decide_bid(bid_two.id, BidDecision::Accept, requester.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn rejecting_a_bid_leaves_the_job_open() {
        let (store, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;
        let (provider_one, business_one) =
            seed_provider(&workflow, "sam@example.com", "Sam's Pipes").await;
        let (provider_two, business_two) =
            seed_provider(&workflow, "lee@example.com", "Lee's Drains").await;

        let job = workflow
            .create_job(requester.id, job_dto(100.0))
            .await
            .unwrap();
        let bid_one = workflow
            .submit_bid(job.id, business_one.id, provider_one.id, bid_dto(90.0))
            .await
            .unwrap();
        let bid_two = workflow
            .submit_bid(job.id, business_two.id, provider_two.id, bid_dto(95.0))
            .await
            .unwrap();

        workflow
            .decide_bid(bid_one.id, BidDecision::Reject, requester.id)
            .await
            .unwrap();

        let job_after = store.get_job(job.id).await.unwrap();
        assert_eq!(job_after.status, JobStatus::Open);
        assert_eq!(
            store.get_bid(bid_two.id).await.unwrap().status,
            BidStatus::Pending
        );

        let accepted = workflow
            .decide_bid(bid_two.id, BidDecision::Accept, requester.id)
            .await
            .unwrap();
        assert_eq!(accepted.status, BidStatus::Accepted);
    }

    #[tokio::test]
    async fn decide_bid_requires_the_job_owner() {
        let (_, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;
        let (provider, business) = seed_provider(&workflow, "sam@example.com", "Sam's Pipes").await;

        let job = workflow
            .create_job(requester.id, job_dto(100.0))
            .await
            .unwrap();
        let bid = workflow
            .submit_bid(job.id, business.id, provider.id, bid_dto(90.0))
            .await
            .unwrap();

        let err = workflow
            .decide_bid(bid.id, BidDecision::Accept, provider.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn complete_job_checks_owner_and_status() {
        let (_, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;
        let (provider, business) = seed_provider(&workflow, "sam@example.com", "Sam's Pipes").await;

        let job = workflow
            .create_job(requester.id, job_dto(100.0))
            .await
            .unwrap();

        // Not in progress yet.
        let err = workflow
            .complete_job(job.id, requester.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let bid = workflow
            .submit_bid(job.id, business.id, provider.id, bid_dto(90.0))
            .await
            .unwrap();
        workflow
            .decide_bid(bid.id, BidDecision::Accept, requester.id)
            .await
            .unwrap();

        let err = workflow
            .complete_job(job.id, provider.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized { .. }));

        let completed = workflow.complete_job(job.id, requester.id).await.unwrap();
        assert_eq!(completed.status, JobStatus::Completed);

        let err = workflow
            .complete_job(job.id, requester.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_on_one_job_produce_exactly_one_winner() {
        let (store, workflow) = setup().await;
        let requester = seed_requester(&workflow, "pat@example.com").await;

        let job = workflow
            .create_job(requester.id, job_dto(500.0))
            .await
            .unwrap();

        let mut bids = Vec::new();
        for i in 0..8 {
            let (provider, business) = seed_provider(
                &workflow,
                &format!("provider{}@example.com", i),
                &format!("Crew {}", i),
            )
            .await;
            let bid = workflow
                .submit_bid(job.id, business.id, provider.id, bid_dto(50.0 + i as f64))
                .await
                .unwrap();
            bids.push(bid);
        }

        let results = join_all(bids.iter().map(|bid| {
            let workflow = workflow.clone();
            let bid_id = bid.id;
            let owner = requester.id;
            async move { workflow.decide_bid(bid_id, BidDecision::Accept, owner).await }
        }))
        .await;

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one accept may succeed");
        for result in &results {
            if let Err(err) = result {
                assert!(
                    matches!(
                        err,
                        ServiceError::InvalidState(_) | ServiceError::Conflict(_)
                    ),
                    "losers must see InvalidState or Conflict, got {:?}",
                    err
                );
            }
        }

        let job = store.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        let accepted = store
            .bids_for_job(job.id)
            .await
            .into_iter()
            .filter(|b| b.status == BidStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn send_message_validates_content_and_receiver() {
        let (_, workflow) = setup().await;
        let alice = seed_requester(&workflow, "alice@example.com").await;

        let err = workflow
            .send_message(
                alice.id,
                SendMessageDto {
                    receiver_id: Uuid::new_v4(),
                    content: "hello".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("user", _)));

        let err = workflow
            .send_message(
                alice.id,
                SendMessageDto {
                    receiver_id: alice.id,
                    content: "hello".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
