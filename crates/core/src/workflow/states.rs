use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalEvent {
    FinanceApproved,
    FinanceRejected,
    QueuedForHeadOffice,
    HeadOfficeApproved,
    HeadOfficeRejected,
}

impl ApprovalEvent {
    pub const ALL: [ApprovalEvent; 5] = [
        Self::FinanceApproved,
        Self::FinanceRejected,
        Self::QueuedForHeadOffice,
        Self::HeadOfficeApproved,
        Self::HeadOfficeRejected,
    ];

    pub fn finance(approved: bool) -> Self {
        if approved {
            Self::FinanceApproved
        } else {
            Self::FinanceRejected
        }
    }

    pub fn head_office(approved: bool) -> Self {
        if approved {
            Self::HeadOfficeApproved
        } else {
            Self::HeadOfficeRejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinanceApproved => "finance_approved",
            Self::FinanceRejected => "finance_rejected",
            Self::QueuedForHeadOffice => "queued_for_head_office",
            Self::HeadOfficeApproved => "head_office_approved",
            Self::HeadOfficeRejected => "head_office_rejected",
        }
    }
}

/// Side effects a transition obliges the caller to commit together with the status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    RecordFinanceReview,
    RecordHeadOfficeReview,
    PostCashFlow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub event: ApprovalEvent,
    pub actions: Vec<ApprovalAction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub approved: bool,
    pub notes: Option<String>,
}

impl ReviewDecision {
    pub fn approve(notes: Option<&str>) -> Self {
        Self { approved: true, notes: notes.map(str::to_string) }
    }

    pub fn reject(notes: Option<&str>) -> Self {
        Self { approved: false, notes: notes.map(str::to_string) }
    }
}
