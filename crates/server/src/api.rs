//! JSON routes over the workflow service.
//!
//! - `POST /api/webhooks/google-forms` ingest a form submission
//! - `GET  /api/requests` list requests (`status`, `site_id` filters)
//! - `GET  /api/requests/{id}` one request with items and ledger entry
//! - `PUT  /api/requests/{id}/finance-review` finance decision
//! - `PUT  /api/requests/{id}/queue-head-office` hand an approved request to head office
//! - `PUT  /api/requests/{id}/head-office-review` head-office decision
//! - `GET  /api/reports/daily-spending` approved spend for one day (`date`)
//! - `GET  /api/sites` all sites

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use sitespend_core::clock::Clock;
use sitespend_core::domain::money::Money;
use sitespend_core::domain::request::{RequestId, RequestStatus};
use sitespend_core::domain::site::{Site, SiteId};
use sitespend_core::errors::{InterfaceError, WorkflowError};
use sitespend_core::ingestion::{Submission, SubmittedItem, WorkerIdentity};
use sitespend_core::reporting::{DailySpending, RequestFilter, RequestSummary};
use sitespend_core::workflow::{RequestDetail, ReviewContext, ReviewDecision, WorkflowService};
use sitespend_db::SqlWorkflowStore;

pub const REVIEWER_HEADER: &str = "x-reviewer-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

pub type AppService = WorkflowService<SqlWorkflowStore, Arc<dyn Clock>>;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<AppService>,
}

impl ApiState {
    pub fn new(service: Arc<AppService>) -> Self {
        Self { service }
    }
}

pub fn router(service: Arc<AppService>) -> Router {
    Router::new()
        .route("/api/webhooks/google-forms", post(receive_google_form))
        .route("/api/requests", get(list_requests))
        .route("/api/requests/{id}", get(find_request))
        .route("/api/requests/{id}/finance-review", put(finance_review))
        .route("/api/requests/{id}/queue-head-office", put(queue_head_office))
        .route("/api/requests/{id}/head-office-review", put(head_office_review))
        .route("/api/reports/daily-spending", get(daily_spending))
        .route("/api/sites", get(list_sites))
        .with_state(ApiState::new(service))
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FormItem {
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_rate: Money,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleFormSubmission {
    pub submission_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub site: String,
    pub date: String,
    pub items: Vec<FormItem>,
    pub worker_name: String,
    pub worker_contact: String,
    pub notes: Option<String>,
}

impl From<GoogleFormSubmission> for Submission {
    fn from(form: GoogleFormSubmission) -> Self {
        Submission {
            submission_id: form.submission_id,
            site_name: form.site,
            business_date: form.date,
            worker: WorkerIdentity { name: form.worker_name, contact: form.worker_contact },
            items: form
                .items
                .into_iter()
                .map(|item| SubmittedItem {
                    item_name: item.item_name,
                    quantity: item.quantity,
                    unit_rate: item.unit_rate,
                    category: item.category,
                })
                .collect(),
            notes: form.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub request_id: RequestId,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub approved: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub success: bool,
    pub status: RequestStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub site_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DailySpendingQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn workflow(error: WorkflowError, correlation_id: &str) -> Self {
        if let WorkflowError::Storage(detail) = &error {
            error!(
                event_name = "http.request.storage_failure",
                correlation_id = %correlation_id,
                error = %detail,
                "record store unavailable"
            );
        }
        Self(error.into_interface(correlation_id))
    }

    fn bad_request(code: &'static str, message: String, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            code,
            message,
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn receive_google_form(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<GoogleFormSubmission>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let form = json_body(payload, "invalid_submission", &correlation_id)?;
    info!(
        event_name = "http.webhook.received",
        correlation_id = %correlation_id,
        submission_id = %form.submission_id,
        form_timestamp = ?form.timestamp,
        item_count = form.items.len(),
        "form submission received"
    );

    let outcome = state
        .service
        .submit(form.into(), &correlation_id)
        .await
        .map_err(|error| ApiError::workflow(error, &correlation_id))?;

    Ok(Json(SubmitResponse {
        success: true,
        request_id: outcome.request_id,
        created: outcome.created,
    }))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Vec<RequestSummary>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let filter = parse_filter(&query, &correlation_id)?;

    let summaries = state
        .service
        .list_requests(filter)
        .await
        .map_err(|error| ApiError::workflow(error, &correlation_id))?;
    Ok(Json(summaries))
}

async fn find_request(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<RequestDetail>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let id = request_id(id, &correlation_id)?;
    let detail = state
        .service
        .find_request(id)
        .await
        .map_err(|error| ApiError::workflow(error, &correlation_id))?;
    Ok(Json(detail))
}

async fn finance_review(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let context = review_context(&headers)?;
    let id = request_id(id, &context.correlation_id)?;
    let body = json_body(payload, "invalid_review", &context.correlation_id)?;
    let decision = ReviewDecision { approved: body.approved, notes: body.notes };
    let status = state
        .service
        .review_finance(id, decision, &context)
        .await
        .map_err(|error| ApiError::workflow(error, &context.correlation_id))?;
    Ok(Json(ReviewResponse { success: true, status }))
}

async fn queue_head_office(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ReviewResponse>, ApiError> {
    let context = review_context(&headers)?;
    let id = request_id(id, &context.correlation_id)?;
    let status = state
        .service
        .queue_for_head_office(id, &context)
        .await
        .map_err(|error| ApiError::workflow(error, &context.correlation_id))?;
    Ok(Json(ReviewResponse { success: true, status }))
}

async fn head_office_review(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let context = review_context(&headers)?;
    let id = request_id(id, &context.correlation_id)?;
    let body = json_body(payload, "invalid_review", &context.correlation_id)?;
    let decision = ReviewDecision { approved: body.approved, notes: body.notes };
    let status = state
        .service
        .review_head_office(id, decision, &context)
        .await
        .map_err(|error| ApiError::workflow(error, &context.correlation_id))?;
    Ok(Json(ReviewResponse { success: true, status }))
}

async fn daily_spending(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<DailySpendingQuery>,
) -> Result<Json<DailySpending>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let report = state
        .service
        .daily_spending(query.date.as_deref())
        .await
        .map_err(|error| ApiError::workflow(error, &correlation_id))?;
    Ok(Json(report))
}

async fn list_sites(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Site>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let sites = state
        .service
        .list_sites()
        .await
        .map_err(|error| ApiError::workflow(error, &correlation_id))?;
    Ok(Json(sites))
}

// ---------------------------------------------------------------------------
// Header and query helpers
// ---------------------------------------------------------------------------

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn correlation_id(headers: &HeaderMap) -> String {
    header_value(headers, CORRELATION_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn review_context(headers: &HeaderMap) -> Result<ReviewContext, ApiError> {
    let correlation_id = correlation_id(headers);
    match header_value(headers, REVIEWER_HEADER) {
        Some(reviewer) => Ok(ReviewContext::new(reviewer, correlation_id)),
        None => Err(ApiError::bad_request(
            "missing_reviewer",
            format!("the `{REVIEWER_HEADER}` header is required for reviews"),
            &correlation_id,
        )),
    }
}

/// Extractor rejections become the same typed error body as every other 400.
fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    code: &'static str,
    correlation_id: &str,
) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(code, rejection.body_text(), correlation_id))
}

fn request_id(
    path: Result<Path<i64>, PathRejection>,
    correlation_id: &str,
) -> Result<RequestId, ApiError> {
    path.map(|Path(id)| RequestId(id)).map_err(|rejection| {
        ApiError::bad_request("invalid_request_id", rejection.body_text(), correlation_id)
    })
}

fn parse_filter(query: &RequestListQuery, correlation_id: &str) -> Result<RequestFilter, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request(
                "invalid_filter",
                format!("`{raw}` is not a request status"),
                correlation_id,
            )
        })?),
        None => None,
    };
    let site_id = match query.site_id.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => Some(SiteId(raw.parse::<i64>().map_err(|_| {
            ApiError::bad_request(
                "invalid_filter",
                format!("`{raw}` is not a site id"),
                correlation_id,
            )
        })?)),
        None => None,
    };
    Ok(RequestFilter { status, site_id })
}
