use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus};
use crate::workflow::{ApprovalEvent, StoreError, TransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures surfaced by workflow operations. Each kind has a stable `code()`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("site `{name}` was not found")]
    SiteNotFound { name: String },
    #[error("request {id} was not found")]
    RequestNotFound { id: RequestId },
    #[error("request is {status} and cannot accept {event:?}")]
    InvalidTransition { status: RequestStatus, event: ApprovalEvent },
    #[error("`{value}` is not a calendar date (expected YYYY-MM-DD)")]
    InvalidDate { value: String },
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SiteNotFound { .. } => "site_not_found",
            Self::RequestNotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidDate { .. } => "invalid_date",
            Self::InvalidSubmission(_) => "invalid_submission",
            Self::Storage(_) => "storage_failure",
        }
    }

    pub(crate) fn from_store(error: StoreError, id: RequestId, event: ApprovalEvent) -> Self {
        match error {
            StoreError::NotFound => Self::RequestNotFound { id },
            StoreError::StatusChanged { actual, .. } => Self::InvalidTransition { status: actual, event },
            StoreError::Backend(message) => Self::Storage(message),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::InvalidTransition { state, event } => {
                Self::InvalidTransition { status: state, event }
            }
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Self::Storage("referenced record disappeared".to_string()),
            StoreError::StatusChanged { expected, actual } => Self::Storage(format!(
                "request status changed concurrently (expected {expected}, found {actual})"
            )),
            StoreError::Backend(message) => Self::Storage(message),
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        Self::Storage(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { code: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { code: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { code: &'static str, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::ServiceUnavailable { code, .. } => code,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }

    /// Caller-safe text. Storage details are never echoed.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } => {
                "The record store is temporarily unavailable. Please retry shortly.".to_string()
            }
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let code = self.code();
        let message = self.to_string();
        match self {
            Self::SiteNotFound { .. } | Self::RequestNotFound { .. } => {
                InterfaceError::NotFound { code, message, correlation_id }
            }
            Self::InvalidTransition { .. } => {
                InterfaceError::Conflict { code, message, correlation_id }
            }
            Self::InvalidDate { .. } | Self::InvalidSubmission(_) => {
                InterfaceError::BadRequest { code, message, correlation_id }
            }
            Self::Storage(_) => InterfaceError::ServiceUnavailable { code, message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::{RequestId, RequestStatus};
    use crate::errors::{InterfaceError, WorkflowError};
    use crate::workflow::{ApprovalEvent, StoreError};

    #[test]
    fn every_failure_kind_has_a_distinct_code() {
        let errors = [
            WorkflowError::SiteNotFound { name: "Site Z".to_string() },
            WorkflowError::RequestNotFound { id: RequestId(1) },
            WorkflowError::InvalidTransition {
                status: RequestStatus::RejectedFinance,
                event: ApprovalEvent::FinanceApproved,
            },
            WorkflowError::InvalidDate { value: "2026-13-01".to_string() },
            WorkflowError::InvalidSubmission("no items".to_string()),
            WorkflowError::Storage("disk I/O error".to_string()),
        ];

        let mut codes = errors.iter().map(WorkflowError::code).collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn not_found_maps_to_not_found_interface_error() {
        let interface =
            WorkflowError::SiteNotFound { name: "Site Z".to_string() }.into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { code: "site_not_found", ref correlation_id, .. }
                if correlation_id == "req-1"
        ));
    }

    #[test]
    fn invalid_transition_maps_to_conflict() {
        let interface = WorkflowError::InvalidTransition {
            status: RequestStatus::ApprovedHeadOffice,
            event: ApprovalEvent::HeadOfficeApproved,
        }
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.code(), "invalid_transition");
    }

    #[test]
    fn storage_failure_hides_backend_detail() {
        let interface =
            WorkflowError::Storage("database is locked".to_string()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(!interface.user_message().contains("locked"));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn lost_race_is_reported_as_invalid_transition_with_observed_status() {
        let error = WorkflowError::from_store(
            StoreError::StatusChanged {
                expected: RequestStatus::PendingFinance,
                actual: RequestStatus::ApprovedFinance,
            },
            RequestId(4),
            ApprovalEvent::FinanceApproved,
        );

        assert_eq!(
            error,
            WorkflowError::InvalidTransition {
                status: RequestStatus::ApprovedFinance,
                event: ApprovalEvent::FinanceApproved,
            }
        );
    }
}
