use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::site::SiteId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CashFlowId(pub i64);

/// Opaque identity of whoever performed a review, supplied by the auth collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerId(pub String);

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingFinance,
    ApprovedFinance,
    RejectedFinance,
    PendingHeadOffice,
    ApprovedHeadOffice,
    RejectedHeadOffice,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        Self::PendingFinance,
        Self::ApprovedFinance,
        Self::RejectedFinance,
        Self::PendingHeadOffice,
        Self::ApprovedHeadOffice,
        Self::RejectedHeadOffice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingFinance => "pending_finance",
            Self::ApprovedFinance => "approved_finance",
            Self::RejectedFinance => "rejected_finance",
            Self::PendingHeadOffice => "pending_head_office",
            Self::ApprovedHeadOffice => "approved_head_office",
            Self::RejectedHeadOffice => "rejected_head_office",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_finance" => Some(Self::PendingFinance),
            "approved_finance" => Some(Self::ApprovedFinance),
            "rejected_finance" => Some(Self::RejectedFinance),
            "pending_head_office" => Some(Self::PendingHeadOffice),
            "approved_head_office" => Some(Self::ApprovedHeadOffice),
            "rejected_head_office" => Some(Self::RejectedHeadOffice),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RejectedFinance | Self::ApprovedHeadOffice | Self::RejectedHeadOffice)
    }

    /// Whether a request in this status must carry a finance review stamp.
    pub fn has_finance_review(&self) -> bool {
        !matches!(self, Self::PendingFinance)
    }

    /// Whether a request in this status must carry a head-office review stamp.
    pub fn has_head_office_review(&self) -> bool {
        matches!(self, Self::ApprovedHeadOffice | Self::RejectedHeadOffice)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStamp {
    pub reviewer: ReviewerId,
    pub reviewed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: RequestItemId,
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_rate: Money,
    pub total_amount: Money,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub site_id: SiteId,
    pub submission_id: String,
    pub request_date: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    pub worker_name: String,
    pub worker_contact: String,
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub total_amount: Money,
    pub finance_review: Option<ReviewStamp>,
    pub head_office_review: Option<ReviewStamp>,
    pub items: Vec<RequestItem>,
}

impl Request {
    /// Checks the stored total against the items and the review stamps against the status.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let item_total: Money = self.items.iter().map(|item| item.total_amount).sum();
        if item_total != self.total_amount {
            return Err(DomainError::InvariantViolation(format!(
                "request {} total {} does not match item sum {}",
                self.id, self.total_amount, item_total
            )));
        }

        if self.status.has_finance_review() != self.finance_review.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} in {} has inconsistent finance review fields",
                self.id, self.status
            )));
        }

        if self.status.has_head_office_review() != self.head_office_review.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} in {} has inconsistent head office review fields",
                self.id, self.status
            )));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlow {
    pub id: CashFlowId,
    pub request_id: RequestId,
    pub site_id: SiteId,
    pub amount: Money,
    pub transaction_date: DateTime<Utc>,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCashFlow {
    pub request_id: RequestId,
    pub site_id: SiteId,
    pub amount: Money,
    pub transaction_date: DateTime<Utc>,
    pub description: String,
}

impl NewCashFlow {
    pub fn for_approved_request(request: &Request, transaction_date: DateTime<Utc>) -> Self {
        Self {
            request_id: request.id,
            site_id: request.site_id,
            amount: request.total_amount,
            transaction_date,
            description: format!("Approved payment for {} items", request.items.len()),
        }
    }
}
