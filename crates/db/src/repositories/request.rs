use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use sitespend_core::domain::request::{
    Request, RequestId, RequestItem, RequestItemId, RequestStatus, ReviewStamp, ReviewerId,
};
use sitespend_core::domain::site::SiteId;
use sitespend_core::ingestion::NewRequest;
use sitespend_core::reporting::{ApprovedSpend, RequestFilter};
use sitespend_core::workflow::{Insertion, RequestRecord, TransitionCommit};

use super::{
    format_timestamp, parse_date, parse_decimal, parse_money, parse_optional_timestamp,
    parse_status, parse_timestamp, RepositoryError,
};

const REQUEST_COLUMNS: &str = "r.id,
    r.site_id,
    s.name AS site_name,
    r.form_submission_id,
    r.request_date,
    r.submitted_at,
    r.worker_name,
    r.worker_contact,
    r.notes,
    r.status,
    r.total_amount,
    r.finance_reviewed_by,
    r.finance_reviewed_at,
    r.finance_notes,
    r.head_office_reviewed_by,
    r.head_office_reviewed_at,
    r.head_office_notes";

/// Inserts the request row and its items. A known submission id inserts nothing.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    request: &NewRequest,
) -> Result<Insertion, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO requests (
            site_id,
            form_submission_id,
            request_date,
            submitted_at,
            worker_name,
            worker_contact,
            notes,
            status,
            total_amount
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(form_submission_id) DO NOTHING",
    )
    .bind(request.site_id.0)
    .bind(&request.submission_id)
    .bind(request.request_date.format("%Y-%m-%d").to_string())
    .bind(format_timestamp(request.submitted_at))
    .bind(&request.worker.name)
    .bind(&request.worker.contact)
    .bind(request.notes.as_deref())
    .bind(RequestStatus::PendingFinance.as_str())
    .bind(request.total_amount.to_string())
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 0 {
        let existing: i64 =
            sqlx::query_scalar("SELECT id FROM requests WHERE form_submission_id = ?1")
                .bind(&request.submission_id)
                .fetch_one(&mut *conn)
                .await?;
        return Ok(Insertion::Duplicate(RequestId(existing)));
    }

    let request_id = RequestId(inserted.last_insert_rowid());
    for (position, item) in request.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO request_items (
                request_id,
                position,
                item_name,
                quantity,
                unit_rate,
                total_amount,
                category
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(request_id.0)
        .bind(position as i64)
        .bind(&item.item_name)
        .bind(item.quantity.to_string())
        .bind(item.unit_rate.to_string())
        .bind(item.total_amount.to_string())
        .bind(item.category.as_deref())
        .execute(&mut *conn)
        .await?;
    }

    Ok(Insertion::Created(request_id))
}

pub(crate) async fn find(
    conn: &mut SqliteConnection,
    id: RequestId,
) -> Result<Option<RequestRecord>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS}
         FROM requests r
         JOIN sites s ON s.id = r.site_id
         WHERE r.id = ?1"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let (mut request, site_name) = request_from_row(&row)?;
            request.items = items_for(conn, request.id).await?;
            Ok(Some(RequestRecord { request, site_name }))
        }
        None => Ok(None),
    }
}

pub(crate) async fn list(
    conn: &mut SqliteConnection,
    filter: RequestFilter,
) -> Result<Vec<RequestRecord>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS}
         FROM requests r
         JOIN sites s ON s.id = r.site_id
         WHERE (?1 IS NULL OR r.status = ?1)
           AND (?2 IS NULL OR r.site_id = ?2)
         ORDER BY r.submitted_at ASC, r.id ASC"
    ))
    .bind(filter.status.map(|status| status.as_str()))
    .bind(filter.site_id.map(|site_id| site_id.0))
    .fetch_all(&mut *conn)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let (mut request, site_name) = request_from_row(&row)?;
        request.items = items_for(conn, request.id).await?;
        records.push(RequestRecord { request, site_name });
    }
    Ok(records)
}

pub(crate) async fn approved_between(
    conn: &mut SqliteConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<ApprovedSpend>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT r.id, s.name AS site_name, r.total_amount, r.head_office_reviewed_at
         FROM requests r
         JOIN sites s ON s.id = r.site_id
         WHERE r.status = ?1
           AND r.head_office_reviewed_at >= ?2
           AND r.head_office_reviewed_at < ?3",
    )
    .bind(RequestStatus::ApprovedHeadOffice.as_str())
    .bind(format_timestamp(start))
    .bind(format_timestamp(end))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(approved_spend_from_row).collect()
}

/// Moves the request from `expected` to `next` and writes any review stamps.
///
/// The guarded UPDATE runs first so the transaction takes the write lock before reading anything.
pub(crate) async fn apply_transition(
    conn: &mut SqliteConnection,
    commit: &TransitionCommit,
) -> Result<(), RepositoryError> {
    let updated = sqlx::query("UPDATE requests SET status = ?1 WHERE id = ?2 AND status = ?3")
        .bind(commit.next.as_str())
        .bind(commit.request_id.0)
        .bind(commit.expected.as_str())
        .execute(&mut *conn)
        .await?;

    if updated.rows_affected() == 0 {
        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM requests WHERE id = ?1")
            .bind(commit.request_id.0)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match actual {
            Some(actual) => RepositoryError::StatusChanged {
                expected: commit.expected,
                actual: parse_status(actual)?,
            },
            None => RepositoryError::MissingRequest(commit.request_id),
        });
    }

    if let Some(stamp) = &commit.finance_review {
        sqlx::query(
            "UPDATE requests
             SET finance_reviewed_by = ?1, finance_reviewed_at = ?2, finance_notes = ?3
             WHERE id = ?4",
        )
        .bind(&stamp.reviewer.0)
        .bind(format_timestamp(stamp.reviewed_at))
        .bind(stamp.notes.as_deref())
        .bind(commit.request_id.0)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(stamp) = &commit.head_office_review {
        sqlx::query(
            "UPDATE requests
             SET head_office_reviewed_by = ?1, head_office_reviewed_at = ?2, head_office_notes = ?3
             WHERE id = ?4",
        )
        .bind(&stamp.reviewer.0)
        .bind(format_timestamp(stamp.reviewed_at))
        .bind(stamp.notes.as_deref())
        .bind(commit.request_id.0)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn items_for(
    conn: &mut SqliteConnection,
    request_id: RequestId,
) -> Result<Vec<RequestItem>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, item_name, quantity, unit_rate, total_amount, category
         FROM request_items
         WHERE request_id = ?1
         ORDER BY position ASC",
    )
    .bind(request_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(item_from_row).collect()
}

fn item_from_row(row: SqliteRow) -> Result<RequestItem, RepositoryError> {
    Ok(RequestItem {
        id: RequestItemId(row.try_get("id")?),
        item_name: row.try_get("item_name")?,
        quantity: parse_decimal("quantity", row.try_get("quantity")?)?,
        unit_rate: parse_money("unit_rate", row.try_get("unit_rate")?)?,
        total_amount: parse_money("total_amount", row.try_get("total_amount")?)?,
        category: row.try_get("category")?,
    })
}

fn approved_spend_from_row(row: SqliteRow) -> Result<ApprovedSpend, RepositoryError> {
    Ok(ApprovedSpend {
        request_id: RequestId(row.try_get("id")?),
        site_name: row.try_get("site_name")?,
        amount: parse_money("total_amount", row.try_get("total_amount")?)?,
        approved_at: parse_timestamp(
            "head_office_reviewed_at",
            row.try_get("head_office_reviewed_at")?,
        )?,
    })
}

fn request_from_row(row: &SqliteRow) -> Result<(Request, String), RepositoryError> {
    let request = Request {
        id: RequestId(row.try_get("id")?),
        site_id: SiteId(row.try_get("site_id")?),
        submission_id: row.try_get("form_submission_id")?,
        request_date: parse_date("request_date", row.try_get("request_date")?)?,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        worker_name: row.try_get("worker_name")?,
        worker_contact: row.try_get("worker_contact")?,
        notes: row.try_get("notes")?,
        status: parse_status(row.try_get("status")?)?,
        total_amount: parse_money("total_amount", row.try_get("total_amount")?)?,
        finance_review: stamp_from_row(
            row,
            "finance_reviewed_by",
            "finance_reviewed_at",
            "finance_notes",
        )?,
        head_office_review: stamp_from_row(
            row,
            "head_office_reviewed_by",
            "head_office_reviewed_at",
            "head_office_notes",
        )?,
        items: Vec::new(),
    };
    Ok((request, row.try_get("site_name")?))
}

fn stamp_from_row(
    row: &SqliteRow,
    reviewer_column: &str,
    reviewed_at_column: &str,
    notes_column: &str,
) -> Result<Option<ReviewStamp>, RepositoryError> {
    let reviewer = row.try_get::<Option<String>, _>(reviewer_column)?;
    let reviewed_at =
        parse_optional_timestamp(reviewed_at_column, row.try_get(reviewed_at_column)?)?;

    Ok(match (reviewer, reviewed_at) {
        (Some(reviewer), Some(reviewed_at)) => Some(ReviewStamp {
            reviewer: ReviewerId(reviewer),
            reviewed_at,
            notes: row.try_get(notes_column)?,
        }),
        _ => None,
    })
}
