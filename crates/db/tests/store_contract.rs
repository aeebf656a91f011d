use std::str::FromStr;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sitespend_core::clock::ManualClock;
use sitespend_core::domain::money::Money;
use sitespend_core::domain::request::RequestStatus;
use sitespend_core::ingestion::{Submission, SubmittedItem, WorkerIdentity};
use sitespend_core::reporting::RequestFilter;
use sitespend_core::workflow::{ReviewContext, ReviewDecision, WorkflowService};
use sitespend_db::{connect_with_settings, migrations, DbPool, DemoSeedDataset, SqlWorkflowStore};

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn seeded_pool() -> ContractResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    DemoSeedDataset::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

fn money(value: &str) -> ContractResult<Money> {
    Money::from_str(value).map_err(|error| error.to_string())
}

fn submission(id: &str, site: &str) -> ContractResult<Submission> {
    Ok(Submission {
        submission_id: id.to_string(),
        site_name: site.to_string(),
        business_date: "2026-03-02".to_string(),
        worker: WorkerIdentity { name: "Site A Worker".to_string(), contact: "0711".to_string() },
        items: vec![
            SubmittedItem {
                item_name: "rebar".to_string(),
                quantity: Decimal::new(3, 0),
                unit_rate: money("1200.10")?,
                category: Some("steel".to_string()),
            },
            SubmittedItem {
                item_name: "binding wire".to_string(),
                quantity: Decimal::new(25, 1),
                unit_rate: money("80.00")?,
                category: None,
            },
        ],
        notes: Some("urgent".to_string()),
    })
}

#[tokio::test]
async fn seeded_sites_accept_submissions_end_to_end() -> ContractResult {
    let pool = seeded_pool().await?;
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 7, 30, 0).unwrap());
    let service = WorkflowService::new(
        SqlWorkflowStore::new(pool.clone()),
        clock.clone(),
        chrono_tz::Africa::Nairobi,
    );

    let sites = service.list_sites().await.map_err(|error| error.to_string())?;
    require_eq!(sites.iter().map(|site| site.name.as_str()).collect::<Vec<_>>(), vec!["Site A", "Site B"]);
    require_eq!(sites[0].budget_allocation, money("250000.00")?);

    let outcome = service
        .submit(submission("contract-1", "Site A")?, "corr-contract")
        .await
        .map_err(|error| error.to_string())?;
    require!(outcome.created, "first submission should create a request");

    let detail = service.find_request(outcome.request_id).await.map_err(|error| error.to_string())?;
    // 3 x 1200.10 + 2.5 x 80.00
    require_eq!(detail.request.total_amount, money("3800.30")?);
    require_eq!(detail.request.notes.as_deref(), Some("urgent"));
    require_eq!(detail.request.worker_name.as_str(), "Site A Worker");

    let finance = ReviewContext::new("finance@sitespend.local", "corr-finance");
    let head_office = ReviewContext::new("ho@sitespend.local", "corr-ho");
    service
        .review_finance(outcome.request_id, ReviewDecision::approve(None), &finance)
        .await
        .map_err(|error| error.to_string())?;
    service
        .queue_for_head_office(outcome.request_id, &finance)
        .await
        .map_err(|error| error.to_string())?;
    let status = service
        .review_head_office(outcome.request_id, ReviewDecision::approve(Some("paid")), &head_office)
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(status, RequestStatus::ApprovedHeadOffice);

    // 07:30 UTC is 10:30 in Nairobi, same business day.
    let report = service.daily_spending(Some("2026-03-02")).await.map_err(|error| error.to_string())?;
    require_eq!(report.total_spent, money("3800.30")?);
    require_eq!(report.site_breakdown.get("Site A").map(|spend| spend.transactions), Some(1));

    let approved = service
        .list_requests(RequestFilter { status: Some(RequestStatus::ApprovedHeadOffice), site_id: None })
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(approved.len(), 1);
    require_eq!(approved[0].site_name.as_str(), "Site A");

    let events = service
        .store()
        .events_for(outcome.request_id)
        .await
        .map_err(|error| error.to_string())?;
    let actors = events.iter().map(|event| event.actor.as_str()).collect::<Vec<_>>();
    require_eq!(
        actors,
        vec!["Site A Worker", "finance@sitespend.local", "finance@sitespend.local", "ho@sitespend.local"]
    );

    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn seed_clean_keeps_sites_with_requests() -> ContractResult {
    let pool = seeded_pool().await?;
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 7, 30, 0).unwrap());
    let service = WorkflowService::new(SqlWorkflowStore::new(pool.clone()), clock, chrono_tz::Tz::UTC);

    service
        .submit(submission("contract-2", "Site B")?, "corr")
        .await
        .map_err(|error| error.to_string())?;
    DemoSeedDataset::clean(&pool).await.map_err(|error| error.to_string())?;

    let remaining = service.list_sites().await.map_err(|error| error.to_string())?;
    require_eq!(remaining.iter().map(|site| site.name.as_str()).collect::<Vec<_>>(), vec!["Site B"]);

    pool.close().await;
    Ok(())
}
