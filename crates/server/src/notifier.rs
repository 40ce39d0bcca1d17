use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use despesas_core::config::NotificationConfig;
use despesas_core::errors::ExternalDependencyError;
use despesas_core::notification::{Notification, NotificationGateway};

/// Writes notifications to the log instead of sending them anywhere.
#[derive(Clone, Debug, Default)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn notify(&self, notification: &Notification) -> Result<(), ExternalDependencyError> {
        let recipients =
            notification.recipients.iter().map(|recipient| recipient.user_id.0).collect::<Vec<_>>();
        info!(
            event_name = "server.notification.logged",
            template = notification.template.as_str(),
            module = %notification.module,
            link = %notification.link,
            recipients = ?recipients,
            "notification recorded (no webhook configured)"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed endpoint.
#[derive(Clone, Debug)]
pub struct WebhookNotificationGateway {
    client: Client,
    url: String,
}

impl WebhookNotificationGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl NotificationGateway for WebhookNotificationGateway {
    async fn notify(&self, notification: &Notification) -> Result<(), ExternalDependencyError> {
        let response =
            self.client.post(&self.url).json(notification).send().await.map_err(|error| {
                warn!(
                    event_name = "server.notification.webhook_unreachable",
                    template = notification.template.as_str(),
                    error = %error,
                    "notification webhook request failed"
                );
                ExternalDependencyError::Notification(error.to_string())
            })?;

        if !response.status().is_success() {
            return Err(ExternalDependencyError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Webhook when `webhook_url` is set, log-only otherwise.
pub fn gateway_from_config(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotificationGateway>, reqwest::Error> {
    match config.webhook_url.as_deref() {
        Some(url) => Ok(Arc::new(WebhookNotificationGateway::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogNotificationGateway)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use despesas_core::domain::actor::UserId;
    use despesas_core::notification::{
        Notification, NotificationGateway, NotificationTemplate, Recipient,
    };
    use serde_json::json;

    use super::{LogNotificationGateway, WebhookNotificationGateway};

    fn notification() -> Notification {
        Notification {
            recipients: vec![Recipient {
                user_id: UserId(2),
                name: "Joao Lima".to_string(),
                email: Some("joao@example.test".to_string()),
            }],
            template: NotificationTemplate::ManagerApprovalRequested,
            data: json!({ "requisition_id": 7 }),
            link: "http://localhost:8080/despesas/requisitions/7".to_string(),
            module: "despesas".to_string(),
        }
    }

    #[tokio::test]
    async fn log_gateway_always_accepts() {
        LogNotificationGateway.notify(&notification()).await.expect("logged");
    }

    #[tokio::test]
    async fn unreachable_webhook_is_reported_as_notification_failure() {
        let gateway =
            WebhookNotificationGateway::new("http://127.0.0.1:9/hooks", Duration::from_millis(200))
                .expect("client");

        let error = gateway.notify(&notification()).await.expect_err("nothing listens on 9");

        assert!(error.to_string().starts_with("notification delivery failed"));
    }
}
