//! The operations exposed to the transport layer.
//!
//! Every operation is one round trip to the store: reads happen first, the state machine decides
//! the outcome, and all writes for a transition go to the store as a single [`TransitionCommit`].

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditEvent};
use crate::clock::Clock;
use crate::domain::request::{
    CashFlow, NewCashFlow, Request, RequestId, RequestStatus, ReviewStamp, ReviewerId,
};
use crate::domain::site::Site;
use crate::errors::WorkflowError;
use crate::ingestion::{parse_business_date, price_submission, NewRequest, Submission, SubmitOutcome};
use crate::reporting::{
    aggregate_daily, day_window, today_in, DailySpending, RequestFilter, RequestSummary,
};
use crate::workflow::engine::{ApprovalEngine, TwoStageApproval, WorkflowDefinition};
use crate::workflow::states::{ApprovalAction, ApprovalEvent, ReviewDecision};
use crate::workflow::store::{Insertion, StoreError, TransitionCommit, WorkflowStore};

/// Who is acting, and the id that ties their call to log lines and audit rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewContext {
    pub reviewer: ReviewerId,
    pub correlation_id: String,
}

impl ReviewContext {
    pub fn new(reviewer: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self { reviewer: ReviewerId(reviewer.into()), correlation_id: correlation_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetail {
    pub request: Request,
    pub site_name: String,
    pub cash_flows: Vec<CashFlow>,
}

pub struct WorkflowService<S, C, F = TwoStageApproval> {
    store: S,
    clock: C,
    engine: ApprovalEngine<F>,
    timezone: Tz,
}

impl<S, C> WorkflowService<S, C, TwoStageApproval>
where
    S: WorkflowStore,
    C: Clock,
{
    pub fn new(store: S, clock: C, timezone: Tz) -> Self {
        Self { store, clock, engine: ApprovalEngine::default(), timezone }
    }
}

impl<S, C, F> WorkflowService<S, C, F>
where
    S: WorkflowStore,
    C: Clock,
    F: WorkflowDefinition,
{
    pub fn with_engine(store: S, clock: C, engine: ApprovalEngine<F>, timezone: Tz) -> Self {
        Self { store, clock, engine, timezone }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn submit(
        &self,
        submission: Submission,
        correlation_id: &str,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let site_name = submission.site_name.trim();
        let site = self
            .store
            .find_site_by_name(site_name)
            .await?
            .ok_or_else(|| WorkflowError::SiteNotFound { name: site_name.to_string() })?;

        let priced = price_submission(&submission)?;
        let submitted_at = self.clock.now();
        let item_count = priced.items.len();

        let audit = AuditEvent::new(
            "request.submitted",
            AuditCategory::Ingestion,
            submission.worker.name.clone(),
            correlation_id,
            submitted_at,
        )
        .with_metadata("submission_id", submission.submission_id.clone())
        .with_metadata("site", site.name.clone())
        .with_metadata("total_amount", priced.total_amount.to_string());

        let new_request = NewRequest {
            site_id: site.id,
            submission_id: submission.submission_id.trim().to_string(),
            request_date: priced.request_date,
            submitted_at,
            worker: submission.worker,
            notes: submission.notes,
            total_amount: priced.total_amount,
            items: priced.items,
        };

        let outcome = match self.store.insert_request(new_request, audit).await? {
            Insertion::Created(request_id) => {
                info!(
                    event_name = "request.submitted",
                    correlation_id = %correlation_id,
                    request_id = %request_id,
                    site = %site.name,
                    items = item_count,
                    total_amount = %priced.total_amount,
                    "purchase request recorded"
                );
                SubmitOutcome { request_id, created: true }
            }
            Insertion::Duplicate(request_id) => {
                info!(
                    event_name = "request.submission_duplicate",
                    correlation_id = %correlation_id,
                    request_id = %request_id,
                    submission_id = %submission.submission_id,
                    "submission already ingested"
                );
                SubmitOutcome { request_id, created: false }
            }
        };

        Ok(outcome)
    }

    pub async fn review_finance(
        &self,
        request_id: RequestId,
        decision: ReviewDecision,
        context: &ReviewContext,
    ) -> Result<RequestStatus, WorkflowError> {
        self.transition(
            request_id,
            ApprovalEvent::finance(decision.approved),
            decision.notes,
            context,
        )
        .await
    }

    pub async fn queue_for_head_office(
        &self,
        request_id: RequestId,
        context: &ReviewContext,
    ) -> Result<RequestStatus, WorkflowError> {
        self.transition(request_id, ApprovalEvent::QueuedForHeadOffice, None, context).await
    }

    pub async fn review_head_office(
        &self,
        request_id: RequestId,
        decision: ReviewDecision,
        context: &ReviewContext,
    ) -> Result<RequestStatus, WorkflowError> {
        self.transition(
            request_id,
            ApprovalEvent::head_office(decision.approved),
            decision.notes,
            context,
        )
        .await
    }

    pub async fn list_requests(
        &self,
        filter: RequestFilter,
    ) -> Result<Vec<RequestSummary>, WorkflowError> {
        let records = self.store.list_requests(filter).await?;
        Ok(records
            .iter()
            .map(|record| RequestSummary::from_request(&record.request, record.site_name.clone()))
            .collect())
    }

    pub async fn find_request(&self, request_id: RequestId) -> Result<RequestDetail, WorkflowError> {
        let record = self
            .store
            .find_request(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound { id: request_id })?;
        let cash_flows = self.store.cash_flows_for_request(request_id).await?;
        Ok(RequestDetail { request: record.request, site_name: record.site_name, cash_flows })
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, WorkflowError> {
        Ok(self.store.list_sites().await?)
    }

    /// Approved spend for one business day; `None` means today in the reference zone.
    pub async fn daily_spending(&self, date: Option<&str>) -> Result<DailySpending, WorkflowError> {
        let date = match date {
            Some(raw) => parse_business_date(raw)?,
            None => today_in(self.timezone, self.clock.now()),
        };
        let (start, end) = day_window(date, self.timezone)
            .ok_or_else(|| WorkflowError::InvalidDate { value: date.to_string() })?;
        let approved = self.store.approved_spend_between(start, end).await?;
        let report = aggregate_daily(date, approved);

        debug!(
            event_name = "report.daily_spending",
            date = %report.date,
            transactions = report.total_transactions,
            total_spent = %report.total_spent,
            "daily spending computed"
        );
        Ok(report)
    }

    async fn transition(
        &self,
        request_id: RequestId,
        event: ApprovalEvent,
        notes: Option<String>,
        context: &ReviewContext,
    ) -> Result<RequestStatus, WorkflowError> {
        let record = self
            .store
            .find_request(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound { id: request_id })?;
        let request = record.request;
        let outcome = self.engine.apply(request.status, event)?;
        let now = self.clock.now();

        let stamp = || ReviewStamp {
            reviewer: context.reviewer.clone(),
            reviewed_at: now,
            notes: notes.clone(),
        };
        let finance_review =
            outcome.actions.contains(&ApprovalAction::RecordFinanceReview).then(stamp);
        let head_office_review =
            outcome.actions.contains(&ApprovalAction::RecordHeadOfficeReview).then(stamp);
        let cash_flow = outcome
            .actions
            .contains(&ApprovalAction::PostCashFlow)
            .then(|| NewCashFlow::for_approved_request(&request, now));

        let mut audit = AuditEvent::for_transition(
            format!("request.{}", event.as_str()),
            &outcome,
            context.reviewer.0.clone(),
            context.correlation_id.clone(),
            now,
        );
        if let Some(entry) = &cash_flow {
            audit.category = AuditCategory::Ledger;
            audit = audit.with_metadata("cash_flow_amount", entry.amount.to_string());
        }
        if let Some(notes) = &notes {
            audit = audit.with_metadata("notes", notes.clone());
        }

        let commit = TransitionCommit {
            request_id,
            expected: outcome.from,
            next: outcome.to,
            finance_review,
            head_office_review,
            cash_flow,
            audit,
        };

        if let Err(violation) = commit.applied_to(&request).check_invariants() {
            warn!(
                event_name = "request.invariant_violation",
                correlation_id = %context.correlation_id,
                request_id = %request_id,
                error = %violation,
                "stored request is inconsistent, transition refused"
            );
            return Err(violation.into());
        }

        if let Err(error) = self.store.commit_transition(commit).await {
            if let StoreError::StatusChanged { expected, actual } = &error {
                debug!(
                    event_name = "store.transition.conflict",
                    correlation_id = %context.correlation_id,
                    request_id = %request_id,
                    expected = %expected,
                    actual = %actual,
                    "request changed status before commit"
                );
            } else {
                warn!(
                    event_name = "store.transition.failed",
                    correlation_id = %context.correlation_id,
                    request_id = %request_id,
                    error = %error,
                    "transition could not be committed"
                );
            }
            return Err(WorkflowError::from_store(error, request_id, event));
        }

        info!(
            event_name = "request.transitioned",
            correlation_id = %context.correlation_id,
            request_id = %request_id,
            reviewer = %context.reviewer,
            from = %outcome.from,
            to = %outcome.to,
            "request status changed"
        );
        Ok(outcome.to)
    }
}
