use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use despesas_core::config::NotificationConfig;
use despesas_core::errors::ApplicationError;
use despesas_core::notification::NotificationGateway;
use despesas_db::repositories::outbox::{self, OutboxMessage};
use despesas_db::repositories::RepositoryError;
use despesas_db::{begin, commit, DbPool};

/// Longest single backoff step, however many attempts have failed.
const MAX_BACKOFF_EXPONENT: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    pub batch_size: u32,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// How long a claimed row stays invisible to other drains.
    pub lease: Duration,
    pub poll_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 8,
            base_backoff: Duration::from_secs(2),
            lease: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl From<&NotificationConfig> for DispatchSettings {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
            base_backoff: Duration::from_secs(config.base_backoff_secs),
            // Outlive one gateway call so a slow delivery is not claimed twice.
            lease: Duration::from_secs(config.timeout_secs.saturating_mul(3).max(30)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Delivers committed outbox rows through the notification gateway.
pub struct OutboxDispatcher {
    pool: DbPool,
    gateway: Arc<dyn NotificationGateway>,
    settings: DispatchSettings,
}

impl OutboxDispatcher {
    pub fn new(
        pool: DbPool,
        gateway: Arc<dyn NotificationGateway>,
        settings: DispatchSettings,
    ) -> Self {
        Self { pool, gateway, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn drain_once(&self) -> Result<DrainReport, ApplicationError> {
        self.drain_at(Utc::now()).await
    }

    /// One drain pass as of `now`. Delivery happens outside any transaction.
    pub async fn drain_at(&self, now: DateTime<Utc>) -> Result<DrainReport, ApplicationError> {
        let lease = to_chrono(self.settings.lease);

        let mut tx = begin(&self.pool).await?;
        let messages = outbox::claim_due(&mut tx, now, lease, self.settings.batch_size).await?;
        commit(tx).await?;

        let mut report = DrainReport { claimed: messages.len(), ..DrainReport::default() };
        for message in messages {
            match self.gateway.notify(&message.notification).await {
                Ok(()) => {
                    let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
                    outbox::mark_delivered(&mut conn, message.id, Utc::now()).await?;
                    report.delivered += 1;
                    debug!(
                        event_name = "engine.outbox.delivered",
                        outbox_id = message.id,
                        template = message.notification.template.as_str(),
                        attempts = message.attempts,
                        "notification delivered"
                    );
                }
                Err(delivery_error) => {
                    let reason = delivery_error.to_string();
                    if self.record_failure(&message, &reason, now).await? {
                        report.failed += 1;
                    } else {
                        report.retried += 1;
                    }
                }
            }
        }

        if report.claimed > 0 {
            info!(
                event_name = "engine.outbox.drained",
                claimed = report.claimed,
                delivered = report.delivered,
                retried = report.retried,
                failed = report.failed,
                "outbox drain pass finished"
            );
        }

        Ok(report)
    }

    /// Returns true when the message is given up on.
    async fn record_failure(
        &self,
        message: &OutboxMessage,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;

        if message.attempts >= self.settings.max_attempts {
            outbox::mark_failed(&mut conn, message.id, reason, Utc::now()).await?;
            warn!(
                event_name = "engine.outbox.failed",
                outbox_id = message.id,
                requisition_id = ?message.requisition_id,
                template = message.notification.template.as_str(),
                attempts = message.attempts,
                error = reason,
                "notification abandoned after max attempts"
            );
            return Ok(true);
        }

        let retry_at = now + to_chrono(self.backoff(message.attempts));
        outbox::reschedule(&mut conn, message.id, retry_at, reason, Utc::now()).await?;
        warn!(
            event_name = "engine.outbox.retry_scheduled",
            outbox_id = message.id,
            requisition_id = ?message.requisition_id,
            template = message.notification.template.as_str(),
            attempts = message.attempts,
            retry_at = %retry_at,
            error = reason,
            "notification delivery failed; retry scheduled"
        );
        Ok(false)
    }

    /// `base · 2^(attempts - 1)`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.settings.base_backoff.saturating_mul(1 << exponent)
    }

    /// Drains on every poll tick until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker =
            tokio::time::interval(self.settings.poll_interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            event_name = "engine.outbox.worker_started",
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "outbox worker started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(drain_error) = self.drain_once().await {
                        error!(
                            event_name = "engine.outbox.drain_failed",
                            error = %drain_error,
                            "outbox drain pass failed"
                        );
                    }
                }
            }
        }

        info!(event_name = "engine.outbox.worker_stopped", "outbox worker stopped");
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use despesas_core::errors::ExternalDependencyError;
    use despesas_core::notification::{Notification, NotificationGateway};

    use super::{DispatchSettings, OutboxDispatcher};

    struct Silent;

    #[async_trait]
    impl NotificationGateway for Silent {
        async fn notify(&self, _: &Notification) -> Result<(), ExternalDependencyError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn backoff_doubles_per_attempt_and_is_capped() {
        let pool = despesas_db::connect_with_settings("sqlite::memory:", 1, 5)
            .await
            .expect("connect");
        let dispatcher = OutboxDispatcher::new(
            pool,
            Arc::new(Silent),
            DispatchSettings { base_backoff: Duration::from_secs(2), ..DispatchSettings::default() },
        );

        assert_eq!(dispatcher.backoff(1), Duration::from_secs(2));
        assert_eq!(dispatcher.backoff(2), Duration::from_secs(4));
        assert_eq!(dispatcher.backoff(4), Duration::from_secs(16));
        assert_eq!(dispatcher.backoff(40), Duration::from_secs(2 * 1024));
    }
}
