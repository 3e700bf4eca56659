use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::jobmodel::{Bid, BidStatus, Job, JobStatus};
use crate::utils::decimal::BigDecimalHelpers;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateJobDto {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,

    #[validate(length(
        min = 10,
        max = 2000,
        message = "Description must be between 10 and 2000 characters"
    ))]
    pub description: String,

    #[validate(range(min = 0.01, message = "Budget must be positive"))]
    pub budget: f64,

    #[validate(length(min = 1, max = 50, message = "Category is required"))]
    pub category: String,

    #[validate(length(min = 1, max = 100, message = "Location is required"))]
    pub location: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SubmitBidDto {
    #[validate(range(min = 0.01, message = "Bid amount must be positive"))]
    pub amount: f64,

    #[validate(length(
        min = 1,
        max = 2000,
        message = "Proposal must be between 1 and 2000 characters"
    ))]
    pub proposal: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BidDecision {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct DecideBidDto {
    pub decision: BidDecision,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BidResponseDto {
    pub id: Uuid,
    pub job_id: Uuid,
    pub business_id: Uuid,
    pub business_name: String,
    pub amount: f64,
    pub proposal: String,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

impl BidResponseDto {
    pub fn from_model(bid: &Bid, business_name: String) -> Self {
        BidResponseDto {
            id: bid.id,
            job_id: bid.job_id,
            business_id: bid.business_id,
            business_name,
            amount: bid.amount.to_f64_or_zero(),
            proposal: bid.proposal.clone(),
            status: bid.status,
            created_at: bid.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponseDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub category: String,
    pub location: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub bids: Vec<BidResponseDto>,
}

impl JobResponseDto {
    pub fn from_model(job: &Job, bids: Vec<BidResponseDto>) -> Self {
        JobResponseDto {
            id: job.id,
            user_id: job.user_id,
            title: job.title.clone(),
            description: job.description.clone(),
            budget: job.budget.to_f64_or_zero(),
            category: job.category.clone(),
            location: job.location.clone(),
            status: job.status,
            created_at: job.created_at,
            bids,
        }
    }
}
