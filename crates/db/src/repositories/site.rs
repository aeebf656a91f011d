use sqlx::{sqlite::SqliteRow, Row};

use sitespend_core::domain::site::{Site, SiteId};

use super::{parse_money, RepositoryError};
use crate::DbPool;

pub struct SqlSiteRepository {
    pool: DbPool,
}

impl SqlSiteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Site>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, location, project_manager, budget_allocation
             FROM sites
             WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(site_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Site>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, location, project_manager, budget_allocation
             FROM sites
             ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(site_from_row).collect()
    }
}

fn site_from_row(row: SqliteRow) -> Result<Site, RepositoryError> {
    Ok(Site {
        id: SiteId(row.try_get("id")?),
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        project_manager: row.try_get("project_manager")?,
        budget_allocation: parse_money("budget_allocation", row.try_get("budget_allocation")?)?,
    })
}
