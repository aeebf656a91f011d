use chrono::{DateTime, Utc};
use tracing::debug;

use sitespend_core::audit::AuditEvent;
use sitespend_core::domain::request::{CashFlow, RequestId};
use sitespend_core::domain::site::Site;
use sitespend_core::ingestion::NewRequest;
use sitespend_core::reporting::{ApprovedSpend, RequestFilter};
use sitespend_core::workflow::{
    Insertion, RequestRecord, StoreError, TransitionCommit, WorkflowStore,
};

use super::{audit, cash_flow, request, RepositoryError, SqlSiteRepository};
use crate::DbPool;

/// SQLite-backed record store. Each write operation is one transaction.
#[derive(Clone)]
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn events_for(&self, request_id: RequestId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        audit::list_for_request(&mut conn, request_id).await
    }

    async fn insert_request_tx(
        &self,
        new_request: &NewRequest,
        event: &AuditEvent,
    ) -> Result<Insertion, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let insertion = request::insert(&mut tx, new_request).await?;
        if let Insertion::Created(request_id) = insertion {
            audit::append(&mut tx, request_id, event).await?;
        }
        tx.commit().await?;
        Ok(insertion)
    }

    async fn commit_transition_tx(&self, commit: &TransitionCommit) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        request::apply_transition(&mut tx, commit).await?;
        if let Some(entry) = &commit.cash_flow {
            cash_flow::insert(&mut tx, entry).await?;
        }
        audit::append(&mut tx, commit.request_id, &commit.audit).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn find_site_by_name(&self, name: &str) -> Result<Option<Site>, StoreError> {
        Ok(SqlSiteRepository::new(self.pool.clone()).find_by_name(name).await?)
    }

    async fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        Ok(SqlSiteRepository::new(self.pool.clone()).list().await?)
    }

    async fn insert_request(
        &self,
        request: NewRequest,
        audit: AuditEvent,
    ) -> Result<Insertion, StoreError> {
        self.insert_request_tx(&request, &audit).await.map_err(|error| {
            debug!(
                event_name = "store.insert.rolled_back",
                correlation_id = %audit.correlation_id,
                submission_id = %request.submission_id,
                error = %error,
                "request insert rolled back"
            );
            StoreError::from(error)
        })
    }

    async fn find_request(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(request::find(&mut conn, id).await?)
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<(), StoreError> {
        self.commit_transition_tx(&commit).await.map_err(|error| {
            debug!(
                event_name = "store.transition.rolled_back",
                correlation_id = %commit.audit.correlation_id,
                request_id = %commit.request_id,
                error = %error,
                "transition rolled back"
            );
            StoreError::from(error)
        })
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<RequestRecord>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(request::list(&mut conn, filter).await?)
    }

    async fn approved_spend_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ApprovedSpend>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(request::approved_between(&mut conn, start, end).await?)
    }

    async fn cash_flows_for_request(&self, id: RequestId) -> Result<Vec<CashFlow>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(cash_flow::list_for_request(&mut conn, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use chrono_tz::Tz;
    use rust_decimal::Decimal;

    use sitespend_core::clock::ManualClock;
    use sitespend_core::domain::money::Money;
    use sitespend_core::domain::request::{RequestId, RequestStatus};
    use sitespend_core::domain::site::SiteId;
    use sitespend_core::ingestion::{Submission, SubmittedItem, WorkerIdentity};
    use sitespend_core::reporting::RequestFilter;
    use sitespend_core::workflow::{ReviewContext, ReviewDecision, WorkflowService};

    use super::SqlWorkflowStore;
    use crate::repositories::test_support::{insert_site, setup_pool};
    use crate::{connect_with_settings, migrations, DbPool};

    type Service = WorkflowService<SqlWorkflowStore, ManualClock>;

    fn service(pool: DbPool) -> (Service, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap());
        (WorkflowService::new(SqlWorkflowStore::new(pool), clock.clone(), Tz::UTC), clock)
    }

    fn item(name: &str, quantity: &str, rate: &str) -> SubmittedItem {
        SubmittedItem {
            item_name: name.to_string(),
            quantity: Decimal::from_str(quantity).expect("quantity"),
            unit_rate: Money::from_str(rate).expect("rate"),
            category: Some("materials".to_string()),
        }
    }

    fn submission(id: &str, site: &str) -> Submission {
        Submission {
            submission_id: id.to_string(),
            site_name: site.to_string(),
            business_date: "2026-03-02".to_string(),
            worker: WorkerIdentity { name: "Amina".to_string(), contact: "0700".to_string() },
            items: vec![item("cement", "10", "25.50"), item("sand", "5", "12.00")],
            notes: None,
        }
    }

    fn finance() -> ReviewContext {
        ReviewContext::new("finance-1", "corr-finance")
    }

    fn head_office() -> ReviewContext {
        ReviewContext::new("ho-1", "corr-ho")
    }

    async fn count(pool: &DbPool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .expect("count rows")
    }

    #[tokio::test]
    async fn end_to_end_flow_persists_and_reports() {
        let pool = setup_pool().await;
        insert_site(&pool, "Site A").await;
        let (service, clock) = service(pool.clone());

        let outcome = service.submit(submission("form-1", "Site A"), "corr-1").await.expect("submit");
        let request_id = outcome.request_id;

        let stored = service.find_request(request_id).await.expect("find");
        assert_eq!(stored.request.total_amount, Money::from_str("315.00").expect("money"));
        assert_eq!(stored.request.items.len(), 2);
        assert_eq!(stored.request.items[0].item_name, "cement");
        assert_eq!(stored.request.items[0].total_amount, Money::from_str("255.00").expect("money"));

        clock.advance(Duration::hours(2));
        service
            .review_finance(request_id, ReviewDecision::approve(Some("ok")), &finance())
            .await
            .expect("finance");
        service.queue_for_head_office(request_id, &finance()).await.expect("queue");
        clock.advance(Duration::hours(2));
        let status = service
            .review_head_office(request_id, ReviewDecision::approve(None), &head_office())
            .await
            .expect("head office");
        assert_eq!(status, RequestStatus::ApprovedHeadOffice);

        let detail = service.find_request(request_id).await.expect("detail");
        detail.request.check_invariants().expect("consistent");
        assert_eq!(detail.site_name, "Site A");
        assert_eq!(detail.cash_flows.len(), 1);
        assert_eq!(detail.cash_flows[0].amount, Money::from_str("315.00").expect("money"));
        assert_eq!(
            detail.request.head_office_review.as_ref().map(|stamp| stamp.reviewed_at),
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap())
        );

        let report = service.daily_spending(Some("2026-03-02")).await.expect("report");
        assert_eq!(report.total_spent, Money::from_str("315.00").expect("money"));
        assert_eq!(report.site_breakdown["Site A"].transactions, 1);

        let events = service.store().events_for(request_id).await.expect("events");
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type, "request.submitted");
        assert_eq!(events[3].metadata.get("cash_flow_amount").map(String::as_str), Some("315.00"));

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_site_leaves_no_rows() {
        let pool = setup_pool().await;
        insert_site(&pool, "Site A").await;
        let (service, _) = service(pool.clone());

        let error = service.submit(submission("form-2", "Nowhere"), "corr").await.expect_err("site");
        assert_eq!(error.code(), "site_not_found");
        assert_eq!(count(&pool, "requests").await, 0);
        assert_eq!(count(&pool, "request_items").await, 0);
        assert_eq!(count(&pool, "request_event").await, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_submission_is_a_no_op() {
        let pool = setup_pool().await;
        insert_site(&pool, "Site A").await;
        let (service, _) = service(pool.clone());

        let first = service.submit(submission("form-3", "Site A"), "corr").await.expect("first");
        let second = service.submit(submission("form-3", "Site A"), "corr").await.expect("second");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.request_id, second.request_id);
        assert_eq!(count(&pool, "requests").await, 1);
        assert_eq!(count(&pool, "request_items").await, 2);
        assert_eq!(count(&pool, "request_event").await, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn failed_cash_flow_insert_rolls_back_status_change() {
        let pool = setup_pool().await;
        let site_id = insert_site(&pool, "Site A").await;
        let (service, _) = service(pool.clone());

        let request_id =
            service.submit(submission("form-4", "Site A"), "corr").await.expect("submit").request_id;
        service
            .review_finance(request_id, ReviewDecision::approve(None), &finance())
            .await
            .expect("finance");
        service.queue_for_head_office(request_id, &finance()).await.expect("queue");

        // A stray ledger row makes the posting violate UNIQUE(request_id) mid-transaction.
        sqlx::query(
            "INSERT INTO cash_flow (request_id, site_id, amount, transaction_date, description)
             VALUES (?1, ?2, '1.00', '2026-03-02T09:00:00.000000Z', 'stray')",
        )
        .bind(request_id.0)
        .bind(site_id)
        .execute(&pool)
        .await
        .expect("insert stray cash flow");
        let events_before = count(&pool, "request_event").await;

        let error = service
            .review_head_office(request_id, ReviewDecision::approve(None), &head_office())
            .await
            .expect_err("unique violation");
        assert_eq!(error.code(), "storage_failure");

        let detail = service.find_request(request_id).await.expect("detail");
        assert_eq!(detail.request.status, RequestStatus::PendingHeadOffice);
        assert!(detail.request.head_office_review.is_none());
        assert_eq!(detail.cash_flows.len(), 1);
        assert_eq!(count(&pool, "request_event").await, events_before);

        pool.close().await;
    }

    #[tokio::test]
    async fn inconsistent_stored_total_is_never_posted() {
        let pool = setup_pool().await;
        insert_site(&pool, "Site A").await;
        let (service, _) = service(pool.clone());

        let request_id =
            service.submit(submission("form-4b", "Site A"), "corr").await.expect("submit").request_id;
        service
            .review_finance(request_id, ReviewDecision::approve(None), &finance())
            .await
            .expect("finance");
        service.queue_for_head_office(request_id, &finance()).await.expect("queue");

        sqlx::query("UPDATE requests SET total_amount = '9999.00' WHERE id = ?1")
            .bind(request_id.0)
            .execute(&pool)
            .await
            .expect("edit total");
        let events_before = count(&pool, "request_event").await;

        let error = service
            .review_head_office(request_id, ReviewDecision::approve(None), &head_office())
            .await
            .expect_err("inconsistent total");
        assert_eq!(error.code(), "storage_failure");

        let detail = service.find_request(request_id).await.expect("detail");
        assert_eq!(detail.request.status, RequestStatus::PendingHeadOffice);
        assert_eq!(count(&pool, "cash_flow").await, 0);
        assert_eq!(count(&pool, "request_event").await, events_before);

        pool.close().await;
    }

    #[tokio::test]
    async fn rejected_head_office_review_posts_nothing() {
        let pool = setup_pool().await;
        insert_site(&pool, "Site A").await;
        let (service, _) = service(pool.clone());

        let request_id =
            service.submit(submission("form-5", "Site A"), "corr").await.expect("submit").request_id;
        service
            .review_finance(request_id, ReviewDecision::approve(None), &finance())
            .await
            .expect("finance");
        service.queue_for_head_office(request_id, &finance()).await.expect("queue");
        service
            .review_head_office(request_id, ReviewDecision::reject(Some("no")), &head_office())
            .await
            .expect("reject");

        assert_eq!(count(&pool, "cash_flow").await, 0);
        let report = service.daily_spending(Some("2026-03-02")).await.expect("report");
        assert_eq!(report.total_transactions, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn report_boundaries_are_half_open() {
        let pool = setup_pool().await;
        insert_site(&pool, "Site A").await;
        let (service, clock) = service(pool.clone());

        let instants = [
            ("before", Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap()),
            ("start", Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()),
            ("last", Utc.with_ymd_and_hms(2026, 3, 2, 23, 59, 59).unwrap()),
            ("after", Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap()),
        ];
        for (id, at) in instants {
            clock.set(at);
            let request_id =
                service.submit(submission(id, "Site A"), "corr").await.expect("submit").request_id;
            service
                .review_finance(request_id, ReviewDecision::approve(None), &finance())
                .await
                .expect("finance");
            service.queue_for_head_office(request_id, &finance()).await.expect("queue");
            service
                .review_head_office(request_id, ReviewDecision::approve(None), &head_office())
                .await
                .expect("head office");
        }

        let report = service.daily_spending(Some("2026-03-02")).await.expect("report");
        assert_eq!(report.total_transactions, 2);
        assert_eq!(report.total_spent, Money::from_str("630.00").expect("money"));

        pool.close().await;
    }

    #[tokio::test]
    async fn list_requests_filters_by_status_and_site() {
        let pool = setup_pool().await;
        let site_a = insert_site(&pool, "Site A").await;
        insert_site(&pool, "Site B").await;
        let (service, clock) = service(pool.clone());

        let first = service.submit(submission("l-1", "Site A"), "corr").await.expect("a").request_id;
        clock.advance(Duration::seconds(1));
        let second = service.submit(submission("l-2", "Site B"), "corr").await.expect("b").request_id;
        service
            .review_finance(second, ReviewDecision::reject(None), &finance())
            .await
            .expect("reject");

        let all = service.list_requests(RequestFilter::default()).await.expect("all");
        assert_eq!(all.iter().map(|summary| summary.id).collect::<Vec<_>>(), vec![first, second]);

        let rejected = service
            .list_requests(RequestFilter { status: Some(RequestStatus::RejectedFinance), site_id: None })
            .await
            .expect("rejected");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].site_name, "Site B");

        let by_site = service
            .list_requests(RequestFilter { status: None, site_id: Some(SiteId(site_a)) })
            .await
            .expect("by site");
        assert_eq!(by_site.iter().map(|summary| summary.id).collect::<Vec<_>>(), vec![first]);

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let pool = setup_pool().await;
        let (service, _) = service(pool.clone());

        let error = service
            .review_finance(RequestId(99), ReviewDecision::approve(None), &finance())
            .await
            .expect_err("missing");
        assert_eq!(error.code(), "not_found");

        pool.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_finance_reviews_commit_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        insert_site(&pool, "Site A").await;

        let (service, _) = service(pool.clone());
        let service = Arc::new(service);

        for round in 0..5 {
            let request_id = service
                .submit(submission(&format!("race-{round}"), "Site A"), "corr")
                .await
                .expect("submit")
                .request_id;

            let handles = (0..4)
                .map(|attempt| {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        let context = ReviewContext::new(format!("finance-{attempt}"), "corr-race");
                        service
                            .review_finance(request_id, ReviewDecision::approve(None), &context)
                            .await
                    })
                })
                .collect::<Vec<_>>();

            let mut winners = 0;
            for handle in handles {
                match handle.await.expect("join") {
                    Ok(status) => {
                        winners += 1;
                        assert_eq!(status, RequestStatus::ApprovedFinance);
                    }
                    Err(error) => assert_eq!(error.code(), "invalid_transition"),
                }
            }
            assert_eq!(winners, 1, "round {round} should have exactly one winner");

            let finance_events: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM request_event WHERE request_id = ?1 AND event_type = ?2",
            )
            .bind(request_id.0)
            .bind("request.finance_approved")
            .fetch_one(&pool)
            .await
            .expect("count events");
            assert_eq!(finance_events, 1);
        }

        pool.close().await;
    }
}
