use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::AuditEvent;
use crate::domain::request::{CashFlow, NewCashFlow, Request, RequestId, RequestStatus, ReviewStamp};
use crate::domain::site::Site;
use crate::ingestion::NewRequest;
use crate::reporting::{ApprovedSpend, RequestFilter};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("request status is {actual}, expected {expected}")]
    StatusChanged { expected: RequestStatus, actual: RequestStatus },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Result of a request insert keyed by external submission id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    Created(RequestId),
    Duplicate(RequestId),
}

impl Insertion {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Created(id) | Self::Duplicate(id) => *id,
        }
    }
}

/// A status change and every write that must land with it.
///
/// Stores apply it only while the request is still in `expected`; otherwise nothing is written
/// and [`StoreError::StatusChanged`] reports the status actually found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionCommit {
    pub request_id: RequestId,
    pub expected: RequestStatus,
    pub next: RequestStatus,
    pub finance_review: Option<ReviewStamp>,
    pub head_office_review: Option<ReviewStamp>,
    pub cash_flow: Option<NewCashFlow>,
    pub audit: AuditEvent,
}

impl TransitionCommit {
    /// The request as it reads once this commit has landed.
    pub fn applied_to(&self, request: &Request) -> Request {
        let mut updated = request.clone();
        updated.status = self.next;
        if let Some(stamp) = &self.finance_review {
            updated.finance_review = Some(stamp.clone());
        }
        if let Some(stamp) = &self.head_office_review {
            updated.head_office_review = Some(stamp.clone());
        }
        updated
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestRecord {
    pub request: Request,
    pub site_name: String,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find_site_by_name(&self, name: &str) -> Result<Option<Site>, StoreError>;

    async fn list_sites(&self) -> Result<Vec<Site>, StoreError>;

    /// Persists the request, its items and the audit event in one unit.
    async fn insert_request(
        &self,
        request: NewRequest,
        audit: AuditEvent,
    ) -> Result<Insertion, StoreError>;

    async fn find_request(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError>;

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<(), StoreError>;

    /// Ordered by submission time, then id.
    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<RequestRecord>, StoreError>;

    /// Requests approved by head office in `[start, end)`.
    async fn approved_spend_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ApprovedSpend>, StoreError>;

    async fn cash_flows_for_request(&self, id: RequestId) -> Result<Vec<CashFlow>, StoreError>;
}
