// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! wh-worker
//!
//! The [`DeliveryWorker`]: the consumer side of the pipeline that performs
//! one delivery attempt per `WorkItem`, classifies the outcome, and drives
//! the notification through its next state transition. Also hosts the
//! [`Sweeper`] safety net for delayed messages the broker lost.

mod cancel;
mod sweeper;

pub use cancel::CancellationToken;
pub use sweeper::{Sweeper, SweeperConfig};

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use wh_adapter::AdapterRegistry;
use wh_broker::{QueueBrokerClient, WorkItemReceiver};
use wh_core::{truncate_response_body, DeliveryAttempt, DeliveryResult, NotificationStatus, WorkItem};
use wh_error::ServiceError;
use wh_retry::{JitterSource, RetryPolicy, SystemJitter};
use wh_service::NotificationService;

/// Tunables for [`DeliveryWorker`] beyond the retry policy itself.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Maximum number of retry-eligible failed attempts before a
    /// notification is marked FAILED (§6 `maxRetryCount`, default 5).
    pub max_retry_count: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_retry_count: 5 }
    }
}

/// Consumes [`WorkItem`]s and drives the per-notification delivery
/// procedure in §4.7: load, precondition-check, deliver, classify, persist.
pub struct DeliveryWorker {
    registry: AdapterRegistry,
    service: Arc<NotificationService>,
    broker: Arc<dyn QueueBrokerClient>,
    retry_policy: RetryPolicy,
    config: WorkerConfig,
    jitter: Mutex<Box<dyn JitterSource + Send>>,
}

impl DeliveryWorker {
    /// Construct a worker over the given collaborators, using
    /// [`SystemJitter`] as its randomness source.
    pub fn new(
        registry: AdapterRegistry,
        service: Arc<NotificationService>,
        broker: Arc<dyn QueueBrokerClient>,
        retry_policy: RetryPolicy,
        config: WorkerConfig,
    ) -> Self {
        Self::with_jitter(
            registry,
            service,
            broker,
            retry_policy,
            config,
            Box::new(SystemJitter),
        )
    }

    /// Construct a worker with an injected jitter source, for deterministic
    /// tests of the retry-delay path.
    pub fn with_jitter(
        registry: AdapterRegistry,
        service: Arc<NotificationService>,
        broker: Arc<dyn QueueBrokerClient>,
        retry_policy: RetryPolicy,
        config: WorkerConfig,
        jitter: Box<dyn JitterSource + Send>,
    ) -> Self {
        Self {
            registry,
            service,
            broker,
            retry_policy,
            config,
            jitter: Mutex::new(jitter),
        }
    }

    /// Run the per-message procedure (§4.7, steps 1-6) for a single work
    /// item. Unit-testable without a running broker or consumer loop.
    ///
    /// Returns `Ok(())` once the outcome is durably recorded (the point at
    /// which a real broker integration would ack). A store or broker
    /// failure is surfaced as `Err` so the caller can nack/requeue; the
    /// in-process broker used here has no native nack, so
    /// [`Self::run`] republishes the item immediately to approximate it.
    pub async fn run_once(&self, item: WorkItem) -> Result<(), ServiceError> {
        let notification = match self.service.find_by_id(item.notification_id).await? {
            Some(n) => n,
            None => {
                warn!(notification_id = %item.notification_id, "stale work item: notification not found, acking");
                return Ok(());
            }
        };

        if notification.status != NotificationStatus::Pending {
            info!(
                notification_id = %notification.id,
                status = %notification.status,
                "work item skipped: notification is no longer pending"
            );
            return Ok(());
        }

        let adapter = match self.registry.resolve(&notification.vendor_name) {
            Some(adapter) => adapter,
            None => {
                error!(
                    notification_id = %notification.id,
                    vendor = %notification.vendor_name,
                    "no adapter available for vendor and no generic fallback registered"
                );
                return Ok(());
            }
        };

        let started = Instant::now();
        let result = adapter.deliver(&notification).await;
        let elapsed = started.elapsed();

        let retryable = if result.success {
            false
        } else {
            adapter.is_retryable(result.status_code, result.response_body.as_deref())
        };

        let attempt = build_attempt(&result);

        info!(
            notification_id = %notification.id,
            vendor = %notification.vendor_name,
            status_code = result.status_code,
            elapsed_ms = elapsed.as_millis() as u64,
            success = result.success,
            "delivery attempt completed"
        );

        if result.success {
            self.service
                .mark_delivered(notification.id, attempt)
                .await?;
            return Ok(());
        }

        if !retryable {
            self.service.mark_failed(notification.id, attempt).await?;
            return Ok(());
        }

        if notification.retry_count >= self.config.max_retry_count {
            warn!(
                notification_id = %notification.id,
                retry_count = notification.retry_count,
                "retry budget exhausted, marking failed"
            );
            self.service.mark_failed(notification.id, attempt).await?;
            return Ok(());
        }

        let delay = {
            let mut jitter = self.jitter.lock().await;
            self.retry_policy
                .calculate_delay(notification.retry_count, jitter.as_mut())
        };
        let next_retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

        self.service
            .schedule_retry(notification.id, attempt, next_retry_at)
            .await?;
        self.broker
            .publish_with_delay(notification.id, notification.retry_count + 1, delay)
            .await?;

        Ok(())
    }

    /// Drive [`Self::run_once`] against a live consumer until `token` is
    /// cancelled. Intended to be spawned as N tokio tasks sharing the same
    /// [`WorkItemReceiver`] to realize "parallel consumers, each
    /// single-message-at-a-time" (§5).
    pub async fn run(&self, receiver: WorkItemReceiver, token: CancellationToken) {
        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = receiver.recv() => item,
            };
            let Some(item) = item else {
                info!("work item channel closed, worker exiting");
                break;
            };
            if let Err(err) = self.run_once(item).await {
                error!(
                    notification_id = %item.notification_id,
                    error = %err,
                    "delivery attempt failed to persist, republishing for redelivery"
                );
                if let Err(publish_err) = self.broker.publish(item.notification_id).await {
                    error!(
                        notification_id = %item.notification_id,
                        error = %publish_err,
                        "failed to republish after a persistence error; item is lost unless the sweeper recovers it"
                    );
                }
            }
        }
    }
}

fn build_attempt(result: &DeliveryResult) -> DeliveryAttempt {
    DeliveryAttempt {
        timestamp: Utc::now(),
        response_code: result.status_code,
        response_body: result
            .response_body
            .as_deref()
            .map(truncate_response_body),
        error_message: result.error_message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wh_adapter::VendorAdapter;
    use wh_broker::InProcessBroker;
    use wh_core::{CreateNotificationRequest, Notification};
    use wh_retry::FixedJitter;
    use wh_store::InMemoryNotificationStore;
    use uuid::Uuid;

    struct ScriptedAdapter {
        responses: std::sync::Mutex<Vec<DeliveryResult>>,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(responses: Vec<DeliveryResult>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VendorAdapter for ScriptedAdapter {
        fn vendor_name(&self) -> &str {
            "generic"
        }

        async fn deliver(&self, _notification: &Notification) -> DeliveryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                DeliveryResult::success(200, None)
            } else {
                responses.remove(0)
            }
        }
    }

    fn registry(adapter: Arc<ScriptedAdapter>) -> AdapterRegistry {
        AdapterRegistry::builder().register(adapter).build().unwrap()
    }

    fn create_request() -> CreateNotificationRequest {
        CreateNotificationRequest {
            vendor_name: "generic".into(),
            target_url: "https://example.test/hook".into(),
            http_method: "POST".to_string(),
            headers: BTreeMap::new(),
            body: None,
            idempotency_key: None,
        }
    }

    fn worker(adapter: Arc<ScriptedAdapter>, service: Arc<NotificationService>) -> DeliveryWorker {
        DeliveryWorker::with_jitter(
            registry(adapter),
            service,
            Arc::new(InProcessBroker::new()),
            RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(1)).unwrap(),
            WorkerConfig { max_retry_count: 3 },
            Box::new(FixedJitter(0.0)),
        )
    }

    #[tokio::test]
    async fn stale_work_item_is_acked_without_error() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let adapter = Arc::new(ScriptedAdapter::new(vec![]));
        let w = worker(adapter.clone(), service);

        w.run_once(WorkItem::first_attempt(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn non_pending_notification_is_skipped_without_attempt() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let created = service.create(create_request()).await.unwrap();
        service.cancel_notification(created.id).await.unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(vec![]));
        let w = worker(adapter.clone(), service.clone());
        w.run_once(WorkItem::first_attempt(created.id))
            .await
            .unwrap();

        assert_eq!(adapter.call_count(), 0);
        let still = service.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(still.status, NotificationStatus::Cancelled);
    }

    #[tokio::test]
    async fn successful_delivery_marks_delivered() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let created = service.create(create_request()).await.unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(vec![DeliveryResult::success(
            200,
            Some("ok".into()),
        )]));
        let w = worker(adapter, service.clone());
        w.run_once(WorkItem::first_attempt(created.id))
            .await
            .unwrap();

        let after = service.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.status, NotificationStatus::Delivered);
        assert_eq!(after.attempts.len(), 1);
        assert_eq!(after.attempts[0].response_code, 200);
    }

    #[tokio::test]
    async fn retryable_failure_schedules_retry_and_republishes() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let broker = Arc::new(InProcessBroker::new());
        let receiver = broker.subscribe();
        let service = Arc::new(NotificationService::new(store, broker.clone()));
        let created = service.create(create_request()).await.unwrap();
        receiver.recv().await.unwrap(); // drain the create-time publish

        let adapter = Arc::new(ScriptedAdapter::new(vec![DeliveryResult::failure(
            503,
            None,
            "unavailable".into(),
        )]));
        let w = DeliveryWorker::with_jitter(
            registry(adapter),
            service.clone(),
            broker,
            RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(1)).unwrap(),
            WorkerConfig { max_retry_count: 3 },
            Box::new(FixedJitter(0.0)),
        );
        w.run_once(WorkItem::first_attempt(created.id))
            .await
            .unwrap();

        let after = service.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.status, NotificationStatus::Pending);
        assert_eq!(after.retry_count, 1);
        assert!(after.next_retry_at.is_some());

        let republished = tokio::time::timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(republished.notification_id, created.id);
        assert_eq!(republished.retry_count, 1);
    }

    #[tokio::test]
    async fn non_retryable_failure_marks_failed_with_zero_retry_count() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let created = service.create(create_request()).await.unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(vec![DeliveryResult::failure(
            400,
            None,
            "bad request".into(),
        )]));
        let w = worker(adapter, service.clone());
        w.run_once(WorkItem::first_attempt(created.id))
            .await
            .unwrap();

        let after = service.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.status, NotificationStatus::Failed);
        assert_eq!(after.retry_count, 0);
        assert_eq!(after.attempts.len(), 1);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_forces_failed() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let created = service.create(create_request()).await.unwrap();
        let next_retry_at = Utc::now();
        // Fast-forward the record to the edge of its retry budget.
        for _ in 0..3 {
            service
                .schedule_retry(
                    created.id,
                    DeliveryAttempt {
                        timestamp: Utc::now(),
                        response_code: 503,
                        response_body: None,
                        error_message: Some("unavailable".into()),
                    },
                    next_retry_at,
                )
                .await
                .unwrap();
        }

        let adapter = Arc::new(ScriptedAdapter::new(vec![DeliveryResult::failure(
            503,
            None,
            "still unavailable".into(),
        )]));
        let w = worker(adapter, service.clone());
        w.run_once(WorkItem::first_attempt(created.id))
            .await
            .unwrap();

        let after = service.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.status, NotificationStatus::Failed);
        assert_eq!(after.retry_count, 3);
    }

    #[tokio::test]
    async fn cancellation_race_is_preserved_over_a_late_success() {
        // The adapter "completes" only after the notification has already
        // been cancelled out from under it; the PENDING precondition in
        // mark_delivered must refuse to overwrite CANCELLED.
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let created = service.create(create_request()).await.unwrap();

        service.cancel_notification(created.id).await.unwrap();

        let attempt = DeliveryAttempt {
            timestamp: Utc::now(),
            response_code: 200,
            response_body: None,
            error_message: None,
        };
        let outcome = service.mark_delivered(created.id, attempt).await.unwrap();
        assert!(outcome.is_none());

        let after = service.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.status, NotificationStatus::Cancelled);
    }

    #[tokio::test]
    async fn response_body_is_truncated_before_persistence() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let service = Arc::new(NotificationService::new(store, Arc::new(InProcessBroker::new())));
        let created = service.create(create_request()).await.unwrap();

        let long_body = "x".repeat(2000);
        let adapter = Arc::new(ScriptedAdapter::new(vec![DeliveryResult::success(
            200,
            Some(long_body),
        )]));
        let w = worker(adapter, service.clone());
        w.run_once(WorkItem::first_attempt(created.id))
            .await
            .unwrap();

        let after = service.find_by_id(created.id).await.unwrap().unwrap();
        let stored = after.attempts[0].response_body.as_ref().unwrap();
        assert!(stored.ends_with("\u{2026} [truncated]"));
        assert!(stored.len() < 2000);
    }
}
