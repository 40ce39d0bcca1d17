use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "app_user",
        "user_role",
        "department",
        "supplier",
        "requisition",
        "requisition_department",
        "requisition_manager",
        "item",
        "quote",
        "quote_item",
        "manager_approval",
        "override_event",
        "verification_token",
        "notification_outbox",
        "idx_quote_single_approved",
        "idx_requisition_status",
        "idx_requisition_department_department_id",
        "idx_item_requisition_id",
        "idx_manager_approval_quote_id",
        "idx_override_event_requisition_id",
        "idx_notification_outbox_status_available_at",
    ];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ["requisition", "quote", "manager_approval", "notification_outbox"] {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "table `{table}` should exist");
        }
    }

    #[tokio::test]
    async fn store_rejects_a_second_approved_quote_per_requisition() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        let now = "2026-03-01T12:00:00Z";

        sqlx::query("INSERT INTO app_user (id, name, created_at) VALUES (1, 'Ana', ?)")
            .bind(now)
            .execute(&pool)
            .await
            .expect("insert user");
        sqlx::query(
            "INSERT INTO requisition (id, description, requester_id, director_id, created_at, updated_at)
             VALUES (1, 'Cadeiras', 1, 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .expect("insert requisition");
        sqlx::query(
            "INSERT INTO supplier (id, name, created_at) VALUES (1, 'Acme', ?), (2, 'Globex', ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .expect("insert suppliers");

        for (quote_id, supplier_id) in [(1_i64, 1_i64), (2, 2)] {
            sqlx::query(
                "INSERT INTO quote (id, requisition_id, supplier_id, total_value, status, created_at, updated_at)
                 VALUES (?, 1, ?, '100', 'approved', ?, ?)",
            )
            .bind(quote_id)
            .bind(supplier_id)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .map(|_| ())
            .unwrap_or_else(|error| {
                assert_eq!(quote_id, 2, "only the second insert may fail: {error}");
            });
        }

        let approved = sqlx::query(
            "SELECT COUNT(*) AS count FROM quote WHERE requisition_id = 1 AND status = 'approved'",
        )
        .fetch_one(&pool)
        .await
        .expect("count approved")
        .get::<i64, _>("count");
        assert_eq!(approved, 1);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
