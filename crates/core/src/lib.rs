pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ingestion;
pub mod reporting;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::money::{Money, MoneyParseError};
pub use domain::request::{
    CashFlow, CashFlowId, NewCashFlow, Request, RequestId, RequestItem, RequestItemId,
    RequestStatus, ReviewStamp, ReviewerId,
};
pub use domain::site::{Site, SiteId};
pub use errors::{DomainError, InterfaceError, WorkflowError};
pub use ingestion::{NewRequest, PricedItem, Submission, SubmitOutcome, SubmittedItem, WorkerIdentity};
pub use reporting::{ApprovedSpend, DailySpending, RequestFilter, RequestSummary, SiteSpend};
pub use workflow::{
    ApprovalEngine, ApprovalEvent, InMemoryWorkflowStore, Insertion, RequestDetail, RequestRecord,
    ReviewContext, ReviewDecision, StoreError, TransitionCommit, WorkflowService, WorkflowStore,
};
