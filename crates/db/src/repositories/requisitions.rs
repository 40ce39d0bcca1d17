use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use despesas_core::domain::actor::UserId;
use despesas_core::domain::allocation::{DepartmentAllocation, DepartmentId};
use despesas_core::domain::quote::QuoteId;
use despesas_core::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};

use super::{
    format_timestamp, parse_decimal, parse_optional_decimal, parse_optional_timestamp,
    parse_timestamp, RepositoryError,
};

const REQUISITION_COLUMNS: &str = "id,
    description,
    requester_id,
    director_id,
    status,
    rateada,
    approved_quote_id,
    approved_by_director_id,
    approved_at,
    rejected_by,
    rejected_at,
    created_at,
    updated_at";

pub async fn insert_requisition(
    conn: &mut SqliteConnection,
    description: &str,
    requester_id: UserId,
    director_id: UserId,
    now: DateTime<Utc>,
) -> Result<RequisitionId, RepositoryError> {
    let timestamp = format_timestamp(now);
    let id = sqlx::query(
        "INSERT INTO requisition (description, requester_id, director_id, status, rateada, created_at, updated_at)
         VALUES (?, ?, ?, 'pending', 0, ?, ?)",
    )
    .bind(description)
    .bind(requester_id.0)
    .bind(director_id.0)
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(RequisitionId(id))
}

pub async fn find_requisition(
    conn: &mut SqliteConnection,
    id: RequisitionId,
) -> Result<Option<Requisition>, RepositoryError> {
    let row =
        sqlx::query(&format!("SELECT {REQUISITION_COLUMNS} FROM requisition WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(requisition_from_row).transpose()
}

pub async fn list_requisitions(
    conn: &mut SqliteConnection,
    status: Option<RequisitionStatus>,
) -> Result<Vec<Requisition>, RepositoryError> {
    let rows = if let Some(status) = status {
        sqlx::query(&format!(
            "SELECT {REQUISITION_COLUMNS} FROM requisition WHERE status = ? ORDER BY id DESC"
        ))
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await?
    } else {
        sqlx::query(&format!("SELECT {REQUISITION_COLUMNS} FROM requisition ORDER BY id DESC"))
            .fetch_all(&mut *conn)
            .await?
    };

    rows.into_iter().map(requisition_from_row).collect()
}

pub async fn insert_allocation(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    department_id: DepartmentId,
    percent: Decimal,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO requisition_department (requisition_id, department_id, percent) VALUES (?, ?, ?)",
    )
    .bind(requisition_id.0)
    .bind(department_id.0)
    .bind(percent.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_allocations(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<DepartmentAllocation>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT requisition_id, department_id, percent, spent_value
         FROM requisition_department
         WHERE requisition_id = ?
         ORDER BY department_id ASC",
    )
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(allocation_from_row).collect()
}

pub async fn set_spent_value(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    department_id: DepartmentId,
    spent_value: Decimal,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE requisition_department SET spent_value = ? WHERE requisition_id = ? AND department_id = ?",
    )
    .bind(spent_value.to_string())
    .bind(requisition_id.0)
    .bind(department_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Flips the `rateada` latch. Returns false when it was already set.
pub async fn latch_rateada(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE requisition SET rateada = 1, updated_at = ? WHERE id = ? AND rateada = 0",
    )
    .bind(format_timestamp(now))
    .bind(requisition_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_required_manager(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    manager_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO requisition_manager (requisition_id, manager_id) VALUES (?, ?)")
        .bind(requisition_id.0)
        .bind(manager_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The required-manager set recorded at intake. Consensus is measured against it.
pub async fn list_required_managers(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<UserId>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT manager_id FROM requisition_manager WHERE requisition_id = ? ORDER BY manager_id",
    )
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|row| Ok(UserId(row.try_get::<i64, _>("manager_id")?))).collect()
}

/// Claims the requisition for final approval. Returns false if it already left
/// `pending` or carries a director approval.
pub async fn mark_approved(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    quote_id: QuoteId,
    director_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let timestamp = format_timestamp(now);
    let result = sqlx::query(
        "UPDATE requisition
         SET status = 'approved',
             approved_quote_id = ?,
             approved_by_director_id = ?,
             approved_at = ?,
             updated_at = ?
         WHERE id = ? AND status = 'pending' AND approved_by_director_id IS NULL",
    )
    .bind(quote_id.0)
    .bind(director_id.0)
    .bind(&timestamp)
    .bind(&timestamp)
    .bind(requisition_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_rejected(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    rejected_by: UserId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let timestamp = format_timestamp(now);
    let result = sqlx::query(
        "UPDATE requisition
         SET status = 'rejected', rejected_by = ?, rejected_at = ?, updated_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(rejected_by.0)
    .bind(&timestamp)
    .bind(&timestamp)
    .bind(requisition_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn replace_director(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    director_id: UserId,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE requisition SET director_id = ?, updated_at = ? WHERE id = ?")
        .bind(director_id.0)
        .bind(format_timestamp(now))
        .bind(requisition_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn requisition_from_row(row: SqliteRow) -> Result<Requisition, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequisitionStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown requisition status `{status_raw}`"))
    })?;

    Ok(Requisition {
        id: RequisitionId(row.try_get("id")?),
        description: row.try_get("description")?,
        requester_id: UserId(row.try_get("requester_id")?),
        director_id: UserId(row.try_get("director_id")?),
        status,
        rateada: row.try_get::<i64, _>("rateada")? != 0,
        approved_quote_id: row.try_get::<Option<i64>, _>("approved_quote_id")?.map(QuoteId),
        approved_by_director_id: row
            .try_get::<Option<i64>, _>("approved_by_director_id")?
            .map(UserId),
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        rejected_by: row.try_get::<Option<i64>, _>("rejected_by")?.map(UserId),
        rejected_at: parse_optional_timestamp("rejected_at", row.try_get("rejected_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn allocation_from_row(row: SqliteRow) -> Result<DepartmentAllocation, RepositoryError> {
    Ok(DepartmentAllocation {
        requisition_id: RequisitionId(row.try_get("requisition_id")?),
        department_id: DepartmentId(row.try_get("department_id")?),
        percent: parse_decimal("percent", row.try_get("percent")?)?,
        spent_value: parse_optional_decimal("spent_value", row.try_get("spent_value")?)?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use despesas_core::domain::actor::Role;
    use despesas_core::domain::quote::QuoteId;
    use despesas_core::domain::requisition::RequisitionStatus;

    use super::{
        find_requisition, insert_allocation, insert_requisition, latch_rateada, list_allocations,
        mark_approved, mark_rejected, set_spent_value,
    };
    use crate::repositories::test_support::{department, parse_ts, setup_pool, user};

    #[tokio::test]
    async fn requisition_round_trip_and_terminal_claims() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let requester = user(&mut conn, "ana", &[Role::Requester]).await;
        let director = user(&mut conn, "dora", &[Role::Director]).await;
        let now = parse_ts("2026-03-01T12:00:00Z");

        let id = insert_requisition(&mut conn, "Cadeiras", requester, director, now)
            .await
            .expect("insert");
        let stored = find_requisition(&mut conn, id).await.expect("find").expect("exists");
        assert_eq!(stored.status, RequisitionStatus::Pending);
        assert_eq!(stored.created_at, now);
        assert!(!stored.rateada);

        assert!(mark_approved(&mut conn, id, QuoteId(1), director, now).await.expect("approve"));
        assert!(!mark_approved(&mut conn, id, QuoteId(1), director, now).await.expect("again"));
        assert!(!mark_rejected(&mut conn, id, director, now).await.expect("reject"));

        let stored = find_requisition(&mut conn, id).await.expect("find").expect("exists");
        assert_eq!(stored.status, RequisitionStatus::Approved);
        assert_eq!(stored.approved_by_director_id, Some(director));
    }

    #[tokio::test]
    async fn rateada_latch_flips_once() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let requester = user(&mut conn, "ana", &[Role::Requester]).await;
        let now = parse_ts("2026-03-01T12:00:00Z");
        let id = insert_requisition(&mut conn, "Toner", requester, requester, now)
            .await
            .expect("insert");

        assert!(latch_rateada(&mut conn, id, now).await.expect("first"));
        assert!(!latch_rateada(&mut conn, id, now).await.expect("second"));
    }

    #[tokio::test]
    async fn allocations_store_decimal_text() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let requester = user(&mut conn, "ana", &[Role::Requester]).await;
        let finance = department(&mut conn, "Financeiro", None).await;
        let now = parse_ts("2026-03-01T12:00:00Z");
        let id = insert_requisition(&mut conn, "Toner", requester, requester, now)
            .await
            .expect("insert");

        insert_allocation(&mut conn, id, finance, Decimal::new(3333, 2)).await.expect("allocate");
        set_spent_value(&mut conn, id, finance, Decimal::new(9999, 2)).await.expect("spent");

        let allocations = list_allocations(&mut conn, id).await.expect("list");
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].percent, Decimal::new(3333, 2));
        assert_eq!(allocations[0].spent_value, Some(Decimal::new(9999, 2)));
    }
}
