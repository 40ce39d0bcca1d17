//! Durable notification queue, written in the same unit of work as the state
//! change it announces and drained by a separate worker.

use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use despesas_core::domain::requisition::RequisitionId;
use despesas_core::notification::{Notification, NotificationTemplate, Recipient};

use super::{format_timestamp, parse_timestamp, RepositoryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutboxMessage {
    pub id: i64,
    pub requisition_id: Option<RequisitionId>,
    pub notification: Notification,
    pub status: OutboxStatus,
    /// Delivery attempts so far, including the one in progress after a claim.
    pub attempts: u32,
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

pub async fn enqueue(
    conn: &mut SqliteConnection,
    requisition_id: Option<RequisitionId>,
    notification: &Notification,
    now: DateTime<Utc>,
) -> Result<i64, RepositoryError> {
    let recipients = serde_json::to_string(&notification.recipients)
        .map_err(|error| RepositoryError::Decode(format!("recipients encode: {error}")))?;
    let data = serde_json::to_string(&notification.data)
        .map_err(|error| RepositoryError::Decode(format!("data encode: {error}")))?;
    let timestamp = format_timestamp(now);

    let id = sqlx::query(
        "INSERT INTO notification_outbox (
            requisition_id,
            template,
            module,
            link,
            recipients_json,
            data_json,
            status,
            attempts,
            available_at,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)",
    )
    .bind(requisition_id.map(|id| id.0))
    .bind(notification.template.as_str())
    .bind(&notification.module)
    .bind(&notification.link)
    .bind(recipients)
    .bind(data)
    .bind(&timestamp)
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Claims up to `limit` due messages and counts the attempt.
///
/// A claimed row is leased until `now + lease`; if the worker dies mid-delivery
/// the row becomes due again once the lease runs out.
pub async fn claim_due(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    lease: Duration,
    limit: u32,
) -> Result<Vec<OutboxMessage>, RepositoryError> {
    let rows = sqlx::query(
        "UPDATE notification_outbox
         SET status = 'processing',
             attempts = attempts + 1,
             available_at = ?,
             updated_at = ?
         WHERE id IN (
             SELECT id FROM notification_outbox
             WHERE status IN ('pending', 'processing') AND available_at <= ?
             ORDER BY available_at ASC, id ASC
             LIMIT ?
         )
         RETURNING id, requisition_id, template, module, link, recipients_json, data_json,
                   status, attempts, available_at, last_error",
    )
    .bind(format_timestamp(now + lease))
    .bind(format_timestamp(now))
    .bind(format_timestamp(now))
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;

    let mut messages = rows.into_iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
    messages.sort_by_key(|message| message.id);
    Ok(messages)
}

pub async fn mark_delivered(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE notification_outbox SET status = 'delivered', last_error = NULL, updated_at = ?
         WHERE id = ?",
    )
    .bind(format_timestamp(now))
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn reschedule(
    conn: &mut SqliteConnection,
    id: i64,
    available_at: DateTime<Utc>,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE notification_outbox
         SET status = 'pending', available_at = ?, last_error = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(format_timestamp(available_at))
    .bind(error)
    .bind(format_timestamp(now))
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    conn: &mut SqliteConnection,
    id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE notification_outbox SET status = 'failed', last_error = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(error)
    .bind(format_timestamp(now))
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_for_requisition(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<OutboxMessage>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, requisition_id, template, module, link, recipients_json, data_json,
                status, attempts, available_at, last_error
         FROM notification_outbox
         WHERE requisition_id = ?
         ORDER BY id ASC",
    )
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(message_from_row).collect()
}

pub async fn count_by_status(
    conn: &mut SqliteConnection,
    status: OutboxStatus,
) -> Result<i64, RepositoryError> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM notification_outbox WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.try_get("count")?)
}

fn message_from_row(row: SqliteRow) -> Result<OutboxMessage, RepositoryError> {
    let template_raw = row.try_get::<String, _>("template")?;
    let template = NotificationTemplate::parse(&template_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown notification template `{template_raw}`"))
    })?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = OutboxStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown outbox status `{status_raw}`")))?;
    let recipients_raw = row.try_get::<String, _>("recipients_json")?;
    let recipients = serde_json::from_str::<Vec<Recipient>>(&recipients_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid recipients_json: {error}")))?;
    let data_raw = row.try_get::<String, _>("data_json")?;
    let data = serde_json::from_str(&data_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid data_json: {error}")))?;
    let attempts = row.try_get::<i64, _>("attempts")?;

    Ok(OutboxMessage {
        id: row.try_get("id")?,
        requisition_id: row.try_get::<Option<i64>, _>("requisition_id")?.map(RequisitionId),
        notification: Notification {
            recipients,
            template,
            data,
            link: row.try_get("link")?,
            module: row.try_get("module")?,
        },
        status,
        attempts: u32::try_from(attempts)
            .map_err(|_| RepositoryError::Decode(format!("invalid attempts `{attempts}`")))?,
        available_at: parse_timestamp("available_at", row.try_get("available_at")?)?,
        last_error: row.try_get("last_error")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use despesas_core::domain::actor::UserId;
    use despesas_core::notification::{
        Notification, NotificationTemplate, Recipient, EXPENSE_MODULE,
    };

    use super::{claim_due, count_by_status, enqueue, mark_delivered, reschedule, OutboxStatus};
    use crate::repositories::test_support::{parse_ts, setup_pool};

    fn notification() -> Notification {
        Notification {
            recipients: vec![Recipient {
                user_id: UserId(7),
                name: "Dora".to_string(),
                email: Some("dora@example.test".to_string()),
            }],
            template: NotificationTemplate::DirectorApprovalRequested,
            data: json!({ "requisition_id": 1 }),
            link: "http://localhost:8080/despesas/1".to_string(),
            module: EXPENSE_MODULE.to_string(),
        }
    }

    #[tokio::test]
    async fn claimed_messages_are_leased_until_rescheduled() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let now = parse_ts("2026-03-01T12:00:00Z");

        enqueue(&mut conn, None, &notification(), now).await.expect("enqueue");

        let claimed = claim_due(&mut conn, now, Duration::seconds(60), 10).await.expect("claim");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);
        assert_eq!(claimed[0].notification, notification());

        let during_lease = claim_due(&mut conn, now + Duration::seconds(30), Duration::seconds(60), 10)
            .await
            .expect("claim during lease");
        assert!(during_lease.is_empty());

        let retry_at = now + Duration::seconds(2);
        reschedule(&mut conn, claimed[0].id, retry_at, "gateway offline", now)
            .await
            .expect("reschedule");
        let retried = claim_due(&mut conn, retry_at, Duration::seconds(60), 10).await.expect("retry");
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].attempts, 2);
        assert_eq!(retried[0].last_error.as_deref(), Some("gateway offline"));

        mark_delivered(&mut conn, retried[0].id, retry_at).await.expect("deliver");
        assert_eq!(count_by_status(&mut conn, OutboxStatus::Delivered).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn messages_are_not_claimed_before_they_are_due() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let now = parse_ts("2026-03-01T12:00:00Z");

        enqueue(&mut conn, None, &notification(), now).await.expect("enqueue");

        let early = claim_due(&mut conn, now - Duration::seconds(1), Duration::seconds(60), 10)
            .await
            .expect("claim");
        assert!(early.is_empty());
        assert_eq!(count_by_status(&mut conn, OutboxStatus::Pending).await.expect("count"), 1);
    }
}
