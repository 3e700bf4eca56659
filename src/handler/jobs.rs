use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::jobdtos::{BidResponseDto, CreateJobDto, DecideBidDto, JobResponseDto, SubmitBidDto},
    error::HttpError,
    middleware::AuthenticatedUser,
    store::jobstore::JobStoreExt,
    store::userstore::UserStoreExt,
    AppState,
};

pub fn job_handler() -> Router {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/:job_id/bids", post(submit_bid))
        .route("/:job_id/complete", put(complete_job))
        .route("/bids/:bid_id/decision", put(decide_bid))
}

pub async fn create_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(body): Json<CreateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .workflow_service
        .create_job(auth.user.id, body)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": JobResponseDto::from_model(&job, Vec::new())
    })))
}

pub async fn list_jobs(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let business_names: HashMap<Uuid, String> = app_state
        .store
        .list_businesses()
        .await
        .into_iter()
        .map(|b| (b.id, b.business_name))
        .collect();

    let jobs: Vec<JobResponseDto> = app_state
        .store
        .list_jobs_with_bids()
        .await
        .iter()
        .map(|(job, bids)| {
            let bids = bids
                .iter()
                .map(|bid| {
                    let name = business_names
                        .get(&bid.business_id)
                        .cloned()
                        .unwrap_or_default();
                    BidResponseDto::from_model(bid, name)
                })
                .collect();
            JobResponseDto::from_model(job, bids)
        })
        .collect();

    Ok(Json(serde_json::json!({
        "status": "success",
        "results": jobs.len(),
        "data": jobs
    })))
}

pub async fn submit_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<SubmitBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    // Bidding happens on behalf of the caller's business profile.
    let business = app_state
        .store
        .get_business_by_user(auth.user.id)
        .await
        .ok_or_else(|| HttpError::bad_request("A business profile is required to bid"))?;

    let bid = app_state
        .workflow_service
        .submit_bid(job_id, business.id, auth.user.id, body)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": BidResponseDto::from_model(&bid, business.business_name)
    })))
}

pub async fn decide_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(bid_id): Path<Uuid>,
    Json(body): Json<DecideBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .workflow_service
        .decide_bid(bid_id, body.decision, auth.user.id)
        .await?;

    let business_name = app_state
        .store
        .get_business(bid.business_id)
        .await
        .map(|b| b.business_name)
        .unwrap_or_default();

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": BidResponseDto::from_model(&bid, business_name)
    })))
}

pub async fn complete_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state
        .workflow_service
        .complete_job(job_id, auth.user.id)
        .await?;

    let bids = app_state.store.bids_for_job(job.id).await;
    let business_names: HashMap<Uuid, String> = app_state
        .store
        .list_businesses()
        .await
        .into_iter()
        .map(|b| (b.id, b.business_name))
        .collect();
    let bids = bids
        .iter()
        .map(|bid| {
            let name = business_names
                .get(&bid.business_id)
                .cloned()
                .unwrap_or_default();
            BidResponseDto::from_model(bid, name)
        })
        .collect();

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": JobResponseDto::from_model(&job, bids)
    })))
}
