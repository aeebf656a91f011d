//! Conversion of an external form submission into a priced request.
//!
//! Pricing is pure: every line total is `quantity × unit_rate` computed on its own, and the
//! request total is the sum of those line totals. Nothing here touches the record store.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::request::RequestId;
use crate::domain::site::SiteId;
use crate::errors::WorkflowError;

pub const BUSINESS_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub name: String,
    pub contact: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedItem {
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_rate: Money,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: String,
    pub site_name: String,
    pub business_date: String,
    pub worker: WorkerIdentity,
    pub items: Vec<SubmittedItem>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_rate: Money,
    pub total_amount: Money,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedSubmission {
    pub request_date: NaiveDate,
    pub items: Vec<PricedItem>,
    pub total_amount: Money,
}

/// Outcome of `submit`: the request id, and whether this call created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub request_id: RequestId,
    pub created: bool,
}

/// Everything the store needs to persist a new request atomically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    pub site_id: SiteId,
    pub submission_id: String,
    pub request_date: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    pub worker: WorkerIdentity,
    pub notes: Option<String>,
    pub total_amount: Money,
    pub items: Vec<PricedItem>,
}

pub fn parse_business_date(value: &str) -> Result<NaiveDate, WorkflowError> {
    NaiveDate::parse_from_str(value.trim(), BUSINESS_DATE_FORMAT)
        .map_err(|_| WorkflowError::InvalidDate { value: value.to_string() })
}

pub fn price_item(item: &SubmittedItem) -> Result<PricedItem, WorkflowError> {
    let item_name = item.item_name.trim();
    if item_name.is_empty() {
        return Err(WorkflowError::InvalidSubmission("item name must not be blank".to_string()));
    }
    if item.quantity.is_sign_negative() && !item.quantity.is_zero() {
        return Err(WorkflowError::InvalidSubmission(format!(
            "quantity for `{item_name}` must not be negative"
        )));
    }
    if item.unit_rate.is_negative() {
        return Err(WorkflowError::InvalidSubmission(format!(
            "unit rate for `{item_name}` must not be negative"
        )));
    }

    let total_amount = item.unit_rate.checked_mul(item.quantity).ok_or_else(|| {
        WorkflowError::InvalidSubmission(format!("line total for `{item_name}` overflows"))
    })?;

    Ok(PricedItem {
        item_name: item_name.to_string(),
        quantity: item.quantity,
        unit_rate: item.unit_rate,
        total_amount,
        category: item
            .category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .map(str::to_string),
    })
}

pub fn price_submission(submission: &Submission) -> Result<PricedSubmission, WorkflowError> {
    let request_date = parse_business_date(&submission.business_date)?;

    if submission.submission_id.trim().is_empty() {
        return Err(WorkflowError::InvalidSubmission("submission id must not be blank".to_string()));
    }
    if submission.items.is_empty() {
        return Err(WorkflowError::InvalidSubmission(
            "a submission needs at least one item".to_string(),
        ));
    }

    let items = submission.items.iter().map(price_item).collect::<Result<Vec<_>, _>>()?;
    let total_amount = items
        .iter()
        .try_fold(Money::ZERO, |total, item| total.checked_add(item.total_amount))
        .ok_or_else(|| WorkflowError::InvalidSubmission("request total overflows".to_string()))?;

    Ok(PricedSubmission { request_date, items, total_amount })
}
