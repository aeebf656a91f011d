use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use sitespend_core::domain::request::{CashFlow, CashFlowId, NewCashFlow, RequestId};
use sitespend_core::domain::site::SiteId;

use super::{format_timestamp, parse_money, parse_timestamp, RepositoryError};

/// One row per approved request; the UNIQUE constraint on `request_id` rejects a second posting.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    entry: &NewCashFlow,
) -> Result<CashFlowId, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO cash_flow (request_id, site_id, amount, transaction_date, description)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(entry.request_id.0)
    .bind(entry.site_id.0)
    .bind(entry.amount.to_string())
    .bind(format_timestamp(entry.transaction_date))
    .bind(&entry.description)
    .execute(&mut *conn)
    .await?;

    Ok(CashFlowId(inserted.last_insert_rowid()))
}

pub(crate) async fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: RequestId,
) -> Result<Vec<CashFlow>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, request_id, site_id, amount, transaction_date, description
         FROM cash_flow
         WHERE request_id = ?1
         ORDER BY id ASC",
    )
    .bind(request_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(cash_flow_from_row).collect()
}

fn cash_flow_from_row(row: SqliteRow) -> Result<CashFlow, RepositoryError> {
    Ok(CashFlow {
        id: CashFlowId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        site_id: SiteId(row.try_get("site_id")?),
        amount: parse_money("amount", row.try_get("amount")?)?,
        transaction_date: parse_timestamp("transaction_date", row.try_get("transaction_date")?)?,
        description: row.try_get("description")?,
    })
}
