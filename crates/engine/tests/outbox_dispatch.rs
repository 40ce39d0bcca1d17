mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use despesas_core::errors::ExternalDependencyError;
use despesas_core::notification::{Notification, NotificationGateway, NotificationTemplate};
use despesas_db::repositories::{outbox, OutboxStatus};
use despesas_engine::{DispatchSettings, OutboxDispatcher};

use common::{world, LINK_BASE};

#[derive(Default)]
struct RecordingGateway {
    delivered: Mutex<Vec<Notification>>,
    failures_left: AtomicUsize,
}

impl RecordingGateway {
    fn failing(times: usize) -> Self {
        Self { delivered: Mutex::new(Vec::new()), failures_left: AtomicUsize::new(times) }
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(&self, notification: &Notification) -> Result<(), ExternalDependencyError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ExternalDependencyError::Notification("smtp relay refused".to_string()));
        }
        self.delivered.lock().expect("gateway lock").push(notification.clone());
        Ok(())
    }
}

fn settings(max_attempts: u32) -> DispatchSettings {
    DispatchSettings {
        batch_size: 10,
        max_attempts,
        base_backoff: Duration::from_secs(10),
        lease: Duration::from_secs(60),
        poll_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn committed_notifications_are_delivered_once() {
    let world = world(2).await;
    let (id, _, _) = world.standard_requisition().await;
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = OutboxDispatcher::new(world.pool.clone(), gateway.clone(), settings(3));

    let report = dispatcher.drain_once().await.expect("drain");
    assert_eq!(report.claimed, 2);
    assert_eq!(report.delivered, 2);

    let again = dispatcher.drain_once().await.expect("second drain");
    assert_eq!(again.claimed, 0);

    let delivered = gateway.delivered.lock().expect("gateway lock").clone();
    assert_eq!(delivered[0].template, NotificationTemplate::ManagerApprovalRequested);
    assert_eq!(
        delivered[0].recipients.iter().map(|recipient| recipient.user_id).collect::<Vec<_>>(),
        world.managers
    );
    assert_eq!(delivered[1].template, NotificationTemplate::RequisitionCreated);
    assert_eq!(delivered[1].recipients[0].user_id, world.director);
    assert_eq!(delivered[1].link, format!("{LINK_BASE}/despesas/requisitions/{id}"));
    assert_eq!(delivered[1].module, "despesas");
}

#[tokio::test]
async fn failed_deliveries_back_off_and_give_up_after_max_attempts() {
    let world = world(1).await;
    world.standard_requisition().await;
    let gateway = Arc::new(RecordingGateway::failing(usize::MAX));
    let dispatcher = OutboxDispatcher::new(world.pool.clone(), gateway, settings(2));
    let start = Utc::now();

    let first = dispatcher.drain_at(start).await.expect("first drain");
    assert_eq!((first.claimed, first.retried, first.failed), (2, 2, 0));

    let too_early = dispatcher.drain_at(start + chrono::Duration::seconds(5)).await.expect("early");
    assert_eq!(too_early.claimed, 0);

    let second =
        dispatcher.drain_at(start + chrono::Duration::seconds(11)).await.expect("second drain");
    assert_eq!((second.claimed, second.retried, second.failed), (2, 0, 2));

    let mut conn = world.pool.acquire().await.expect("acquire");
    assert_eq!(outbox::count_by_status(&mut conn, OutboxStatus::Failed).await.expect("count"), 2);
    assert_eq!(outbox::count_by_status(&mut conn, OutboxStatus::Pending).await.expect("count"), 0);
}

#[tokio::test]
async fn a_transient_failure_is_retried_then_delivered() {
    let world = world(1).await;
    let (id, _, _) = world.standard_requisition().await;
    let gateway = Arc::new(RecordingGateway::failing(1));
    let dispatcher = OutboxDispatcher::new(world.pool.clone(), gateway.clone(), settings(5));
    let start = Utc::now();

    let first = dispatcher.drain_at(start).await.expect("first drain");
    assert_eq!((first.delivered, first.retried), (1, 1));

    let second =
        dispatcher.drain_at(start + chrono::Duration::seconds(11)).await.expect("second drain");
    assert_eq!((second.claimed, second.delivered), (1, 1));

    let mut conn = world.pool.acquire().await.expect("acquire");
    let messages = outbox::list_for_requisition(&mut conn, id).await.expect("messages");
    assert!(messages.iter().all(|message| message.status == OutboxStatus::Delivered));
    assert_eq!(messages.iter().map(|message| message.attempts).max(), Some(2));
    assert_eq!(gateway.delivered.lock().expect("gateway lock").len(), 2);
}

#[tokio::test]
async fn worker_stops_on_shutdown() {
    let world = world(1).await;
    world.standard_requisition().await;
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = OutboxDispatcher::new(world.pool.clone(), gateway.clone(), settings(3));

    dispatcher.run(tokio::time::sleep(Duration::from_millis(200))).await;

    assert_eq!(gateway.delivered.lock().expect("gateway lock").len(), 2);
}
