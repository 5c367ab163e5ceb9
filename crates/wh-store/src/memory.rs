// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process, lock-backed [`NotificationStore`] implementation.

use crate::{NotificationMutator, NotificationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;
use wh_core::{Notification, NotificationStatus};
use wh_error::StoreError;

#[derive(Default)]
struct StoreInner {
    notifications: HashMap<Uuid, Notification>,
    by_status_vendor: HashMap<(NotificationStatus, String), BTreeSet<Uuid>>,
    retry_due: BTreeMap<(DateTime<Utc>, Uuid), ()>,
    idempotency: HashMap<String, Uuid>,
}

impl StoreInner {
    fn index_insert(&mut self, n: &Notification) {
        self.by_status_vendor
            .entry((n.status, n.vendor_name.clone()))
            .or_default()
            .insert(n.id);
        if n.status == NotificationStatus::Pending {
            if let Some(due) = n.next_retry_at {
                self.retry_due.insert((due, n.id), ());
            }
        }
    }

    fn index_remove(&mut self, n: &Notification) {
        let key = (n.status, n.vendor_name.clone());
        if let Some(set) = self.by_status_vendor.get_mut(&key) {
            set.remove(&n.id);
            if set.is_empty() {
                self.by_status_vendor.remove(&key);
            }
        }
        if n.status == NotificationStatus::Pending {
            if let Some(due) = n.next_retry_at {
                self.retry_due.remove(&(due, n.id));
            }
        }
    }

    /// Replace `existing` with `updated` in the primary map and every
    /// index, after checking idempotency-key ownership and the
    /// append-only attempts invariant. Shared by `save`'s update path and
    /// `transition`.
    fn apply_update(
        &mut self,
        existing: Notification,
        mut updated: Notification,
    ) -> Result<Notification, StoreError> {
        if let Some(key) = &updated.idempotency_key {
            if let Some(owner) = self.idempotency.get(key) {
                if *owner != updated.id {
                    warn!(idempotency_key = %key, "rejected update: idempotency key claimed by another notification");
                    return Err(StoreError::IdempotencyConflict);
                }
            }
        }

        let prefix_intact = updated.attempts.len() >= existing.attempts.len()
            && updated.attempts[..existing.attempts.len()] == existing.attempts[..];
        if !prefix_intact {
            warn!(notification_id = %updated.id, "rejected update: attempts history would be rewritten");
            return Err(StoreError::Backend(
                "attempts must be appended to, never rewritten or removed".to_string(),
            ));
        }

        updated.updated_at = Utc::now();
        self.index_remove(&existing);
        self.index_insert(&updated);
        if let Some(key) = updated.idempotency_key.clone() {
            self.idempotency.insert(key, updated.id);
        }
        self.notifications.insert(updated.id, updated.clone());
        debug!(notification_id = %updated.id, status = %updated.status, "updated notification");
        Ok(updated)
    }
}

/// In-memory [`NotificationStore`] backed by a single `tokio::sync::RwLock`.
///
/// Every write acquires the lock once, so idempotency-key uniqueness and
/// the append-only attempts invariant are enforced atomically within that
/// single critical section rather than needing optimistic-concurrency
/// retries.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryNotificationStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store directly with notifications that already carry an
    /// assigned id, bypassing the insert-vs-update branch in [`Self::save`].
    ///
    /// Intended for crash-recovery warm start from [`crate::load_from`]: the
    /// snapshotted rows already have ids and their own `attempts` history,
    /// so there is no "previous version" to check the append-only
    /// invariant against.
    pub async fn restore(&self, notifications: Vec<Notification>) {
        let mut inner = self.inner.write().await;
        for n in notifications {
            inner.index_insert(&n);
            if let Some(key) = n.idempotency_key.clone() {
                inner.idempotency.insert(key, n.id);
            }
            inner.notifications.insert(n.id, n);
        }
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn save(&self, notification: Notification) -> Result<Notification, StoreError> {
        let mut inner = self.inner.write().await;

        if notification.id.is_nil() {
            if let Some(key) = &notification.idempotency_key {
                if inner.idempotency.contains_key(key) {
                    warn!(idempotency_key = %key, "rejected insert: idempotency key already claimed");
                    return Err(StoreError::IdempotencyConflict);
                }
            }
            let mut fresh = notification;
            fresh.id = Uuid::new_v4();
            inner.index_insert(&fresh);
            if let Some(key) = fresh.idempotency_key.clone() {
                inner.idempotency.insert(key, fresh.id);
            }
            inner.notifications.insert(fresh.id, fresh.clone());
            debug!(notification_id = %fresh.id, vendor = %fresh.vendor_name, "inserted notification");
            return Ok(fresh);
        }

        let existing = inner
            .notifications
            .get(&notification.id)
            .cloned()
            .ok_or(StoreError::NotFound(notification.id))?;

        inner.apply_update(existing, notification)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_status: NotificationStatus,
        mutate: NotificationMutator,
    ) -> Result<Option<Notification>, StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .notifications
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;

        if existing.status != expected_status {
            debug!(
                notification_id = %id,
                expected = %expected_status,
                actual = %existing.status,
                "transition skipped: status precondition no longer holds"
            );
            return Ok(None);
        }

        let mut updated = existing.clone();
        mutate(&mut updated);
        inner.apply_update(existing, updated).map(Some)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.notifications.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Notification>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .idempotency
            .get(idempotency_key)
            .and_then(|id| inner.notifications.get(id))
            .cloned())
    }

    async fn find_by_status(
        &self,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.read().await;
        let mut ids: BTreeSet<Uuid> = BTreeSet::new();
        for ((s, _vendor), set) in inner.by_status_vendor.iter() {
            if *s == status {
                ids.extend(set.iter().copied());
            }
        }
        Ok(ids
            .into_iter()
            .filter_map(|id| inner.notifications.get(&id).cloned())
            .collect())
    }

    async fn find_by_vendor_and_status(
        &self,
        vendor_name: &str,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.read().await;
        let key = (status, vendor_name.to_string());
        Ok(inner
            .by_status_vendor
            .get(&key)
            .into_iter()
            .flat_map(|set| set.iter().copied())
            .filter_map(|id| inner.notifications.get(&id).cloned())
            .collect())
    }

    async fn count_by_status(&self, status: NotificationStatus) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        let count = inner
            .by_status_vendor
            .iter()
            .filter(|((s, _), _)| *s == status)
            .map(|(_, set)| set.len() as u64)
            .sum();
        Ok(count)
    }

    async fn count_by_vendor_and_status(
        &self,
        vendor_name: &str,
        status: NotificationStatus,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        let key = (status, vendor_name.to_string());
        Ok(inner.by_status_vendor.get(&key).map_or(0, |s| s.len() as u64))
    }

    async fn find_due_for_retry(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .retry_due
            .range(..=(before, Uuid::max()))
            .map(|((_, id), ())| *id)
            .filter_map(|id| inner.notifications.get(&id).cloned())
            .collect())
    }
}
