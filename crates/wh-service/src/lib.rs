// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! wh-service
//!
//! [`NotificationService`]: the transactional facade over [`NotificationStore`]
//! and [`QueueBrokerClient`] that the HTTP API and the delivery worker both
//! call through. Every state-mutating operation here is the *only* place
//! that decides what a valid transition looks like; callers never write to
//! the store directly.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use wh_broker::QueueBrokerClient;
use wh_core::{CreateNotificationRequest, DeliveryAttempt, HttpMethod, Notification, NotificationStatus};
use wh_error::{ServiceError, StoreError};
use wh_store::NotificationStore;

/// Transactional facade over the store and broker implementing §4.6's
/// business operations.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn QueueBrokerClient>,
}

impl NotificationService {
    /// Construct a service over the given store and broker.
    pub fn new(store: Arc<dyn NotificationStore>, broker: Arc<dyn QueueBrokerClient>) -> Self {
        Self { store, broker }
    }

    /// Create a notification, or return the existing record when
    /// `request.idempotency_key` already resolves to one (§4.6 "create").
    ///
    /// Persists before publishing: a publish the worker finds no
    /// notification for is silently dropped as a stale message, whereas a
    /// persisted-but-unpublished notification is still recoverable by the
    /// sweeper. Losing the publish is the safer failure.
    pub async fn create(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<Notification, ServiceError> {
        let http_method: HttpMethod = request.http_method.parse().map_err(|_| {
            ServiceError::Validation(format!(
                "httpMethod must be one of GET, POST, PUT, PATCH, DELETE, got {:?}",
                request.http_method
            ))
        })?;

        let idempotency_key = request.idempotency_key.filter(|k| !k.is_empty());

        if let Some(key) = &idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                return Ok(existing);
            }
        }

        let now = Utc::now();
        let notification = Notification::new(
            request.vendor_name,
            request.target_url,
            http_method,
            request.headers,
            request.body,
            idempotency_key.clone(),
            now,
        );

        let saved = match self.store.save(notification).await {
            Ok(saved) => saved,
            Err(StoreError::IdempotencyConflict) => {
                // Lost the race to a concurrent create with the same key;
                // the winner's row is now visible, so hand it back instead
                // of surfacing the conflict to this caller (§8, law 5: both
                // callers see the same id).
                let key = idempotency_key.as_deref().expect(
                    "IdempotencyConflict is only returned when a key was supplied",
                );
                return match self.store.find_by_idempotency_key(key).await? {
                    Some(existing) => Ok(existing),
                    None => Err(StoreError::IdempotencyConflict.into()),
                };
            }
            Err(err) => return Err(err.into()),
        };

        self.broker.publish(saved.id).await?;
        info!(notification_id = %saved.id, vendor = %saved.vendor_name, "notification created and queued");
        Ok(saved)
    }

    /// Look up a notification by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, ServiceError> {
        Ok(self.store.find_by_id(id).await?)
    }

    /// All notifications in `status`.
    pub async fn find_by_status(
        &self,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self.store.find_by_status(status).await?)
    }

    /// All notifications for `vendor_name` in `status`.
    pub async fn find_by_vendor_and_status(
        &self,
        vendor_name: &str,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self
            .store
            .find_by_vendor_and_status(vendor_name, status)
            .await?)
    }

    /// Count of notifications in `status`.
    pub async fn count_by_status(&self, status: NotificationStatus) -> Result<u64, ServiceError> {
        Ok(self.store.count_by_status(status).await?)
    }

    /// Count of notifications for `vendor_name` in `status`.
    pub async fn count_by_vendor_and_status(
        &self,
        vendor_name: &str,
        status: NotificationStatus,
    ) -> Result<u64, ServiceError> {
        Ok(self
            .store
            .count_by_vendor_and_status(vendor_name, status)
            .await?)
    }

    /// Mark `id` delivered: append `attempt`, clear `next_retry_at`.
    ///
    /// Guarded by the PENDING precondition (§5): if a concurrent cancel won
    /// the race, this returns `Ok(None)` and the CANCELLED state is left
    /// untouched.
    pub async fn mark_delivered(
        &self,
        id: Uuid,
        attempt: DeliveryAttempt,
    ) -> Result<Option<Notification>, ServiceError> {
        let updated = self
            .store
            .transition(id, NotificationStatus::Pending, {
                let attempt = attempt.clone();
                Box::new(move |n| {
                    n.attempts.push(attempt);
                    n.status = NotificationStatus::Delivered;
                    n.next_retry_at = None;
                })
            })
            .await?;
        if let Some(n) = &updated {
            info!(notification_id = %id, attempts = n.attempts.len(), "notification delivered");
        }
        Ok(updated)
    }

    /// Mark `id` failed: append `attempt`, clear `next_retry_at`.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        attempt: DeliveryAttempt,
    ) -> Result<Option<Notification>, ServiceError> {
        let updated = self
            .store
            .transition(id, NotificationStatus::Pending, {
                let attempt = attempt.clone();
                Box::new(move |n| {
                    n.attempts.push(attempt);
                    n.status = NotificationStatus::Failed;
                    n.next_retry_at = None;
                })
            })
            .await?;
        if let Some(n) = &updated {
            info!(notification_id = %id, retry_count = n.retry_count, "notification failed permanently");
        }
        Ok(updated)
    }

    /// Append `attempt`, increment `retry_count`, set `next_retry_at`, and
    /// keep `status == Pending`.
    pub async fn schedule_retry(
        &self,
        id: Uuid,
        attempt: DeliveryAttempt,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<Notification>, ServiceError> {
        let updated = self
            .store
            .transition(id, NotificationStatus::Pending, {
                let attempt = attempt.clone();
                Box::new(move |n| {
                    n.attempts.push(attempt);
                    n.retry_count += 1;
                    n.next_retry_at = Some(next_retry_at);
                })
            })
            .await?;
        if let Some(n) = &updated {
            info!(notification_id = %id, retry_count = n.retry_count, next_retry_at = %next_retry_at, "notification scheduled for retry");
        }
        Ok(updated)
    }

    /// Cancel a PENDING notification. Returns `Ok(None)` (not an error) when
    /// the record is not in `Pending`, matching §6's "409 if not PENDING"
    /// behavior at the API layer.
    pub async fn cancel_notification(
        &self,
        id: Uuid,
    ) -> Result<Option<Notification>, ServiceError> {
        let updated = self
            .store
            .transition(
                id,
                NotificationStatus::Pending,
                Box::new(|n| {
                    n.status = NotificationStatus::Cancelled;
                    n.next_retry_at = None;
                }),
            )
            .await?;
        if let Some(n) = &updated {
            info!(notification_id = %id, "notification cancelled");
        }
        Ok(updated)
    }

    /// Reset a FAILED notification back to PENDING with `retry_count = 0`
    /// and republish immediately. Returns `Ok(None)` when the record is not
    /// in `Failed`.
    pub async fn reset_for_retry(&self, id: Uuid) -> Result<Option<Notification>, ServiceError> {
        let updated = self
            .store
            .transition(
                id,
                NotificationStatus::Failed,
                Box::new(|n| {
                    n.status = NotificationStatus::Pending;
                    n.retry_count = 0;
                    n.next_retry_at = None;
                }),
            )
            .await?;
        if let Some(n) = &updated {
            self.broker.publish(n.id).await?;
            info!(notification_id = %id, "notification reset for retry and republished");
        }
        Ok(updated)
    }
}
