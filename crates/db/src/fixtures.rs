use sqlx::{Executor, Row};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Users and departments of the demo directory, in fixture order.
const DEMO_USERS: &[DemoUser] = &[
    DemoUser { id: 1, name: "Ana Souza", role: "requester" },
    DemoUser { id: 2, name: "Joao Lima", role: "manager" },
    DemoUser { id: 3, name: "Marta Reis", role: "manager" },
    DemoUser { id: 4, name: "Dora Castro", role: "director" },
    DemoUser { id: 5, name: "Paulo Mestre", role: "master" },
];

const DEMO_DEPARTMENTS: &[DemoDepartment] = &[
    DemoDepartment { id: 1, name: "Financeiro", manager_id: Some(2) },
    DemoDepartment { id: 2, name: "Compras", manager_id: Some(3) },
    DemoDepartment { id: 3, name: "TI", manager_id: Some(2) },
    DemoDepartment { id: 4, name: "Almoxarifado", manager_id: None },
];

/// Demo directory for local runs: one user per role and four departments, one
/// of them without a manager so the intake error path can be exercised.
pub struct DemoDirectory;

impl DemoDirectory {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_directory.sql");

    /// Load the directory. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "db.fixtures.demo_directory_loaded",
            users = DEMO_USERS.len(),
            departments = DEMO_DEPARTMENTS.len(),
            "demo directory loaded"
        );

        Ok(SeedResult {
            users_seeded: DEMO_USERS.iter().map(|user| (user.id, user.name, user.role)).collect(),
            departments_seeded: DEMO_DEPARTMENTS.len(),
        })
    }

    /// Check every demo user and department is present with the expected shape.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in DEMO_USERS {
            let present = sqlx::query(
                "SELECT COUNT(*) AS count
                 FROM app_user u
                 JOIN user_role r ON r.user_id = u.id
                 WHERE u.id = ? AND u.name = ? AND r.role = ?",
            )
            .bind(user.id)
            .bind(user.name)
            .bind(user.role)
            .fetch_one(pool)
            .await?
            .try_get::<i64, _>("count")?
                == 1;
            checks.push((user.name, present));
        }

        for department in DEMO_DEPARTMENTS {
            let row = sqlx::query("SELECT name, manager_id FROM department WHERE id = ?")
                .bind(department.id)
                .fetch_optional(pool)
                .await?;
            let present = match row {
                Some(row) => {
                    row.try_get::<String, _>("name")? == department.name
                        && row.try_get::<Option<i64>, _>("manager_id")? == department.manager_id
                }
                None => false,
            };
            checks.push((department.name, present));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the demo directory. Fails if requisitions still reference it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let departments = sql_array_from_ids(DEMO_DEPARTMENTS.iter().map(|department| department.id));
        let users = sql_array_from_ids(DEMO_USERS.iter().map(|user| user.id));

        sqlx::query(&format!("DELETE FROM department WHERE id IN {departments}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM user_role WHERE user_id IN {users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM app_user WHERE id IN {users}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct DemoUser {
    id: i64,
    name: &'static str,
    role: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct DemoDepartment {
    id: i64,
    name: &'static str,
    manager_id: Option<i64>,
}

fn sql_array_from_ids(ids: impl Iterator<Item = i64>) -> String {
    let joined = ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: Vec<(i64, &'static str, &'static str)>,
    pub departments_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoDirectory::SQL.is_empty());
        assert!(DemoDirectory::SQL.contains("INSERT OR IGNORE"));
    }

    #[tokio::test]
    async fn load_verify_clean_round_trip() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let seeded = DemoDirectory::load(&pool).await.expect("load");
        assert_eq!(seeded.users_seeded.len(), 5);
        assert_eq!(seeded.departments_seeded, 4);

        DemoDirectory::load(&pool).await.expect("loading twice is harmless");
        let verification = DemoDirectory::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);

        DemoDirectory::clean(&pool).await.expect("clean");
        let verification = DemoDirectory::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);
    }
}
