use thiserror::Error;

use crate::domain::request::RequestStatus;
use crate::workflow::states::{ApprovalAction, ApprovalEvent, TransitionOutcome};

pub trait WorkflowDefinition: Send + Sync {
    fn initial_state(&self) -> RequestStatus;
    fn transition(
        &self,
        current: RequestStatus,
        event: ApprovalEvent,
    ) -> Result<TransitionOutcome, TransitionError>;
}

/// Finance review, explicit hand-off, head-office review.
#[derive(Clone, Debug, Default)]
pub struct TwoStageApproval;

impl WorkflowDefinition for TwoStageApproval {
    fn initial_state(&self) -> RequestStatus {
        RequestStatus::PendingFinance
    }

    fn transition(
        &self,
        current: RequestStatus,
        event: ApprovalEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        transition_two_stage(current, event)
    }
}

pub struct ApprovalEngine<F = TwoStageApproval> {
    workflow: F,
}

impl<F> ApprovalEngine<F>
where
    F: WorkflowDefinition,
{
    pub fn new(workflow: F) -> Self {
        Self { workflow }
    }

    pub fn initial_state(&self) -> RequestStatus {
        self.workflow.initial_state()
    }

    pub fn apply(
        &self,
        current: RequestStatus,
        event: ApprovalEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.workflow.transition(current, event)
    }
}

impl Default for ApprovalEngine<TwoStageApproval> {
    fn default() -> Self {
        Self::new(TwoStageApproval)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {state} using event {event:?}")]
    InvalidTransition { state: RequestStatus, event: ApprovalEvent },
}

fn transition_two_stage(
    current: RequestStatus,
    event: ApprovalEvent,
) -> Result<TransitionOutcome, TransitionError> {
    use ApprovalAction::{PostCashFlow, RecordFinanceReview, RecordHeadOfficeReview};
    use ApprovalEvent::{
        FinanceApproved, FinanceRejected, HeadOfficeApproved, HeadOfficeRejected,
        QueuedForHeadOffice,
    };
    use RequestStatus::{
        ApprovedFinance, ApprovedHeadOffice, PendingFinance, PendingHeadOffice, RejectedFinance,
        RejectedHeadOffice,
    };

    let (to, actions) = match (current, event) {
        (PendingFinance, FinanceApproved) => (ApprovedFinance, vec![RecordFinanceReview]),
        (PendingFinance, FinanceRejected) => (RejectedFinance, vec![RecordFinanceReview]),
        (ApprovedFinance, QueuedForHeadOffice) => (PendingHeadOffice, Vec::new()),
        (PendingHeadOffice, HeadOfficeApproved) => {
            (ApprovedHeadOffice, vec![RecordHeadOfficeReview, PostCashFlow])
        }
        (PendingHeadOffice, HeadOfficeRejected) => (RejectedHeadOffice, vec![RecordHeadOfficeReview]),
        _ => return Err(TransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}
