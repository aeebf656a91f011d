use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use sitespend_core::audit::{AuditCategory, AuditEvent};
use sitespend_core::domain::request::RequestId;

use super::{format_timestamp, parse_timestamp, RepositoryError};

pub(crate) async fn append(
    conn: &mut SqliteConnection,
    request_id: RequestId,
    event: &AuditEvent,
) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&event.metadata)
        .map_err(|error| RepositoryError::Decode(format!("audit metadata: {error}")))?;

    sqlx::query(
        "INSERT INTO request_event (
            id,
            request_id,
            event_type,
            category,
            actor,
            correlation_id,
            metadata_json,
            occurred_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&event.event_id)
    .bind(request_id.0)
    .bind(&event.event_type)
    .bind(event.category.as_str())
    .bind(&event.actor)
    .bind(&event.correlation_id)
    .bind(metadata_json)
    .bind(format_timestamp(event.occurred_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: RequestId,
) -> Result<Vec<AuditEvent>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, event_type, category, actor, correlation_id, metadata_json, occurred_at
         FROM request_event
         WHERE request_id = ?1
         ORDER BY occurred_at ASC, rowid ASC",
    )
    .bind(request_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(event_from_row).collect()
}

fn event_from_row(row: SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let category_raw = row.try_get::<String, _>("category")?;
    let category = AuditCategory::parse(&category_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown audit category `{category_raw}`"))
    })?;
    let metadata_raw = row.try_get::<String, _>("metadata_json")?;
    let metadata = serde_json::from_str::<BTreeMap<String, String>>(&metadata_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid metadata_json: {error}")))?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        category,
        actor: row.try_get("actor")?,
        correlation_id: row.try_get("correlation_id")?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
