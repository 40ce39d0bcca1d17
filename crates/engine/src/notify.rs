use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqliteConnection;

use despesas_core::domain::actor::UserId;
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::notification::{Notification, NotificationTemplate, EXPENSE_MODULE};
use despesas_db::repositories::{directory, outbox, RepositoryError};

/// Builds the deep links carried by outgoing notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationLinks {
    base_url: String,
}

impl NotificationLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn requisition(&self, requisition_id: RequisitionId) -> String {
        format!("{}/{EXPENSE_MODULE}/requisitions/{requisition_id}", self.base_url)
    }
}

/// Records a notification in the outbox of the current unit of work.
///
/// Nothing is delivered here; the dispatcher picks the row up after commit.
pub(crate) async fn enqueue(
    conn: &mut SqliteConnection,
    links: &NotificationLinks,
    requisition_id: RequisitionId,
    template: NotificationTemplate,
    recipient_ids: &[UserId],
    data: Value,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let recipients = directory::recipients(conn, recipient_ids).await?;
    if recipients.is_empty() {
        tracing::debug!(
            event_name = "engine.notification.skipped",
            requisition_id = %requisition_id,
            template = template.as_str(),
            "no resolvable recipients"
        );
        return Ok(());
    }

    let notification = Notification {
        recipients,
        template,
        data,
        link: links.requisition(requisition_id),
        module: EXPENSE_MODULE.to_string(),
    };
    outbox::enqueue(conn, Some(requisition_id), &notification, now).await?;
    Ok(())
}
