use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use despesas_core::domain::actor::UserId;
use despesas_core::domain::approval::{
    ApprovalOrigin, ManagerApproval, OverrideAction, OverrideEvent,
};
use despesas_core::domain::quote::QuoteId;
use despesas_core::domain::requisition::RequisitionId;

use super::{format_timestamp, parse_timestamp, RepositoryError};

pub async fn find_manager_approval(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    manager_id: UserId,
) -> Result<Option<ManagerApproval>, RepositoryError> {
    let row = sqlx::query(
        "SELECT requisition_id, manager_id, quote_id, origin, created_at
         FROM manager_approval
         WHERE requisition_id = ? AND manager_id = ?",
    )
    .bind(requisition_id.0)
    .bind(manager_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(approval_from_row).transpose()
}

/// Fails with a unique violation if the manager already responded.
pub async fn insert_manager_approval(
    conn: &mut SqliteConnection,
    approval: &ManagerApproval,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO manager_approval (requisition_id, manager_id, quote_id, origin, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(approval.requisition_id.0)
    .bind(approval.manager_id.0)
    .bind(approval.quote_id.0)
    .bind(approval.origin.as_str())
    .bind(format_timestamp(approval.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_manager_approvals(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<ManagerApproval>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT requisition_id, manager_id, quote_id, origin, created_at
         FROM manager_approval
         WHERE requisition_id = ?
         ORDER BY created_at ASC, manager_id ASC",
    )
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(approval_from_row).collect()
}

/// Approvals for `quote_id` cast by managers in the requisition's recorded required set.
pub async fn count_required_approvals_for_quote(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    quote_id: QuoteId,
) -> Result<i64, RepositoryError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count
         FROM manager_approval ma
         WHERE ma.requisition_id = ?
           AND ma.quote_id = ?
           AND ma.manager_id IN (
               SELECT rm.manager_id FROM requisition_manager rm WHERE rm.requisition_id = ?
           )",
    )
    .bind(requisition_id.0)
    .bind(quote_id.0)
    .bind(requisition_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("count")?)
}

/// Distinct quotes the managers of a requisition have approved so far.
pub async fn approved_quote_ids(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<QuoteId>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT DISTINCT quote_id FROM manager_approval WHERE requisition_id = ? ORDER BY quote_id",
    )
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|row| Ok(QuoteId(row.try_get::<i64, _>("quote_id")?))).collect()
}

pub async fn append_override_event(
    conn: &mut SqliteConnection,
    event: &OverrideEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO override_event (requisition_id, actor_id, action, on_behalf_of, quote_id, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(event.requisition_id.0)
    .bind(event.actor_id.0)
    .bind(event.action.as_str())
    .bind(event.on_behalf_of.map(|user| user.0))
    .bind(event.quote_id.map(|quote| quote.0))
    .bind(format_timestamp(event.occurred_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_override_events(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<OverrideEvent>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT requisition_id, actor_id, action, on_behalf_of, quote_id, occurred_at
         FROM override_event
         WHERE requisition_id = ?
         ORDER BY id ASC",
    )
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(override_from_row).collect()
}

pub fn override_event(
    requisition_id: RequisitionId,
    actor_id: UserId,
    action: OverrideAction,
    on_behalf_of: Option<UserId>,
    quote_id: Option<QuoteId>,
    occurred_at: DateTime<Utc>,
) -> OverrideEvent {
    OverrideEvent { requisition_id, actor_id, action, on_behalf_of, quote_id, occurred_at }
}

fn approval_from_row(row: SqliteRow) -> Result<ManagerApproval, RepositoryError> {
    let origin_raw = row.try_get::<String, _>("origin")?;
    let origin = ApprovalOrigin::parse(&origin_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval origin `{origin_raw}`")))?;

    Ok(ManagerApproval {
        requisition_id: RequisitionId(row.try_get("requisition_id")?),
        manager_id: UserId(row.try_get("manager_id")?),
        quote_id: QuoteId(row.try_get("quote_id")?),
        origin,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn override_from_row(row: SqliteRow) -> Result<OverrideEvent, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = OverrideAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown override action `{action_raw}`")))?;

    Ok(OverrideEvent {
        requisition_id: RequisitionId(row.try_get("requisition_id")?),
        actor_id: UserId(row.try_get("actor_id")?),
        action,
        on_behalf_of: row.try_get::<Option<i64>, _>("on_behalf_of")?.map(UserId),
        quote_id: row.try_get::<Option<i64>, _>("quote_id")?.map(QuoteId),
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
