use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_SITES: &[SeedSiteContract] = &[
    SeedSiteContract {
        name: "Site A",
        location: "Westlands, Nairobi",
        project_manager: "Grace Wanjiru",
        budget_allocation: "250000.00",
    },
    SeedSiteContract {
        name: "Site B",
        location: "Kilimani, Nairobi",
        project_manager: "Peter Mwangi",
        budget_allocation: "180000.00",
    },
];

const SEED_USERS: &[SeedUserContract] = &[
    SeedUserContract { email: "finance@sitespend.local", role: "finance", site: None },
    SeedUserContract { email: "ho@sitespend.local", role: "head_office", site: None },
    SeedUserContract { email: "admin@sitespend.local", role: "admin", site: None },
    SeedUserContract { email: "worker.a@sitespend.local", role: "site_worker", site: Some("Site A") },
];

/// Demo sites and reviewer accounts for local runs and smoke checks.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            sites_seeded: SEED_SITES.iter().map(|site| site.name).collect(),
            users_seeded: SEED_USERS.iter().map(|user| user.email).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for site in SEED_SITES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM sites
                    WHERE name = ?1 AND location = ?2 AND project_manager = ?3 AND budget_allocation = ?4
                 )",
            )
            .bind(site.name)
            .bind(site.location)
            .bind(site.project_manager)
            .bind(site.budget_allocation)
            .fetch_one(pool)
            .await?;
            checks.push((site.name, present == 1));
        }

        for user in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM users u
                    LEFT JOIN sites s ON s.id = u.site_id
                    WHERE u.email = ?1 AND u.role = ?2 AND s.name IS ?3
                 )",
            )
            .bind(user.email)
            .bind(user.role)
            .bind(user.site)
            .fetch_one(pool)
            .await?;
            checks.push((user.email, present == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded users, and seeded sites that no request references.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let emails = sql_array_from_ids(&SEED_USERS.iter().map(|user| user.email).collect::<Vec<_>>());
        let names = sql_array_from_ids(&SEED_SITES.iter().map(|site| site.name).collect::<Vec<_>>());

        sqlx::query(&format!("DELETE FROM users WHERE email IN {emails}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM sites
             WHERE name IN {names}
               AND id NOT IN (SELECT site_id FROM requests)
               AND id NOT IN (SELECT site_id FROM users WHERE site_id IS NOT NULL)"
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedSiteContract {
    name: &'static str,
    location: &'static str,
    project_manager: &'static str,
    budget_allocation: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct SeedUserContract {
    email: &'static str,
    role: &'static str,
    site: Option<&'static str>,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub sites_seeded: Vec<&'static str>,
    pub users_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
