use std::collections::BTreeMap;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::request::{Request, RequestId, RequestStatus};
use crate::domain::site::SiteId;

/// One approved request as seen by the daily report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedSpend {
    pub request_id: RequestId,
    pub site_name: String,
    pub amount: Money,
    pub approved_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpend {
    pub amount: Money,
    pub transactions: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySpending {
    pub date: NaiveDate,
    pub total_spent: Money,
    pub total_transactions: u64,
    pub site_breakdown: BTreeMap<String, SiteSpend>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub site_id: Option<SiteId>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        self.status.map_or(true, |status| request.status == status)
            && self.site_id.map_or(true, |site_id| request.site_id == site_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub total_amount: Decimal,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub id: RequestId,
    pub site_id: SiteId,
    pub site_name: String,
    pub request_date: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    pub status: RequestStatus,
    pub total_amount: Decimal,
    pub items: Vec<ItemSummary>,
}

impl RequestSummary {
    pub fn from_request(request: &Request, site_name: impl Into<String>) -> Self {
        Self {
            id: request.id,
            site_id: request.site_id,
            site_name: site_name.into(),
            request_date: request.request_date,
            submitted_at: request.submitted_at,
            status: request.status,
            total_amount: request.total_amount.display_amount(),
            items: request
                .items
                .iter()
                .map(|item| ItemSummary {
                    item_name: item.item_name.clone(),
                    quantity: item.quantity.normalize(),
                    unit_rate: item.unit_rate.display_amount(),
                    total_amount: item.total_amount.display_amount(),
                    category: item.category.clone(),
                })
                .collect(),
        }
    }
}

/// UTC bounds of the half-open local day `[date 00:00, date+1 00:00)` in `tz`.
/// `None` when either bound falls outside the representable instant range.
pub fn day_window(date: NaiveDate, tz: Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let next = date.succ_opt()?;
    Some((local_midnight(date, tz)?, local_midnight(next, tz)?))
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    // A midnight skipped by a DST change resolves to the first instant that exists.
    let mut candidate = date.and_hms_opt(0, 0, 0)?;
    for _ in 0..=4 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(at) => return Some(at.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => candidate = candidate.checked_add_signed(Duration::minutes(30))?,
        }
    }
    None
}

pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Folds approved requests into a daily report. Purely additive, so input order is irrelevant.
pub fn aggregate_daily<I>(date: NaiveDate, approved: I) -> DailySpending
where
    I: IntoIterator<Item = ApprovedSpend>,
{
    approved.into_iter().fold(
        DailySpending {
            date,
            total_spent: Money::ZERO,
            total_transactions: 0,
            site_breakdown: BTreeMap::new(),
        },
        |mut report, spend| {
            report.total_spent += spend.amount;
            report.total_transactions += 1;
            let site = report.site_breakdown.entry(spend.site_name).or_default();
            site.amount += spend.amount;
            site.transactions += 1;
            report
        },
    )
}
