use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use sitespend_core::domain::money::Money;
use sitespend_core::domain::request::{RequestId, RequestStatus};
use sitespend_core::workflow::StoreError;

pub mod audit;
pub mod cash_flow;
pub mod request;
pub mod site;
pub mod workflow;

pub use site::SqlSiteRepository;
pub use workflow::SqlWorkflowStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request {0} was not found")]
    MissingRequest(RequestId),
    #[error("request status is {actual}, expected {expected}")]
    StatusChanged { expected: RequestStatus, actual: RequestStatus },
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::MissingRequest(_) => StoreError::NotFound,
            RepositoryError::StatusChanged { expected, actual } => {
                StoreError::StatusChanged { expected, actual }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Fixed-width UTC text, so lexical comparison in SQL matches time order.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_money(column: &str, value: String) -> Result<Money, RepositoryError> {
    Money::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid amount in `{column}`: {error}"))
    })
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_status(value: String) -> Result<RequestStatus, RepositoryError> {
    RequestStatus::parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{value}`")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub async fn insert_site(pool: &DbPool, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO sites (name, location, project_manager, budget_allocation, created_at)
             VALUES (?1, 'Nairobi', 'J. Otieno', '100000.00', '2026-01-01T00:00:00.000000Z')",
        )
        .bind(name)
        .execute(pool)
        .await
        .expect("insert site")
        .last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use sitespend_core::domain::request::{RequestId, RequestStatus};
    use sitespend_core::workflow::StoreError;

    use super::{format_timestamp, parse_timestamp, RepositoryError};

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let later = whole + chrono::Duration::microseconds(1);

        let whole_text = format_timestamp(whole);
        let later_text = format_timestamp(later);

        assert_eq!(whole_text, "2026-03-02T00:00:00.000000Z");
        assert_eq!(whole_text.len(), later_text.len());
        assert!(whole_text < later_text);
        assert_eq!(parse_timestamp("t", later_text).expect("parse"), later);
    }

    #[test]
    fn repository_errors_map_onto_store_errors() {
        assert_eq!(StoreError::from(RepositoryError::MissingRequest(RequestId(3))), StoreError::NotFound);
        assert_eq!(
            StoreError::from(RepositoryError::StatusChanged {
                expected: RequestStatus::PendingFinance,
                actual: RequestStatus::RejectedFinance,
            }),
            StoreError::StatusChanged {
                expected: RequestStatus::PendingFinance,
                actual: RequestStatus::RejectedFinance,
            }
        );
        assert!(matches!(
            StoreError::from(RepositoryError::Decode("bad".to_string())),
            StoreError::Backend(ref message) if message.contains("bad")
        ));
    }
}
