pub mod engine;
pub mod memory;
pub mod service;
pub mod states;
pub mod store;

pub use engine::{ApprovalEngine, TransitionError, TwoStageApproval, WorkflowDefinition};
pub use memory::InMemoryWorkflowStore;
pub use service::{RequestDetail, ReviewContext, WorkflowService};
pub use states::{ApprovalAction, ApprovalEvent, ReviewDecision, TransitionOutcome};
pub use store::{Insertion, RequestRecord, StoreError, TransitionCommit, WorkflowStore};
