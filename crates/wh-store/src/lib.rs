// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! wh-store
//!
//! The [`NotificationStore`] trait and an in-process, lock-backed
//! implementation ([`InMemoryNotificationStore`]) carrying the three
//! indexes the query surface needs: `{status, vendor_name}`,
//! `{status, next_retry_at}`, and a sparse unique idempotency-key index.

mod memory;
mod snapshot;

pub use memory::InMemoryNotificationStore;
pub use snapshot::{load_from, snapshot_to, SnapshotError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wh_core::{Notification, NotificationStatus};
use wh_error::StoreError;

/// A closure applied to a notification inside an atomic
/// [`NotificationStore::transition`] call.
pub type NotificationMutator = Box<dyn FnOnce(&mut Notification) + Send>;

/// The system of record for notifications: every query the service and
/// worker need, backed by whatever storage the deployment chooses.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert or update `notification`.
    ///
    /// A notification with `id == Uuid::nil()` is treated as new: the store
    /// assigns a fresh id and enforces idempotency-key uniqueness. A
    /// notification with a real id is treated as an update, and its
    /// `attempts` must extend (never shrink or rewrite) the previously
    /// stored attempts.
    async fn save(&self, notification: Notification) -> Result<Notification, StoreError>;

    /// Atomically mutate the record at `id`, but only if its current status
    /// is still `expected_status`.
    ///
    /// This is the CAS primitive every status-precondition write in the
    /// service and worker goes through (§5: "a delivery outcome updates the
    /// record only if current status is still PENDING"). Returns `Ok(None)`
    /// without calling `mutate` when the precondition no longer holds —
    /// e.g. a cancellation raced ahead of an in-flight delivery.
    async fn transition(
        &self,
        id: Uuid,
        expected_status: NotificationStatus,
        mutate: NotificationMutator,
    ) -> Result<Option<Notification>, StoreError>;

    /// Look up a notification by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Look up a notification by its caller-supplied idempotency key.
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Notification>, StoreError>;

    /// All notifications currently in `status`.
    async fn find_by_status(
        &self,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>, StoreError>;

    /// All notifications for `vendor_name` currently in `status`.
    async fn find_by_vendor_and_status(
        &self,
        vendor_name: &str,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Count of notifications currently in `status`.
    async fn count_by_status(&self, status: NotificationStatus) -> Result<u64, StoreError>;

    /// Count of notifications for `vendor_name` currently in `status`.
    async fn count_by_vendor_and_status(
        &self,
        vendor_name: &str,
        status: NotificationStatus,
    ) -> Result<u64, StoreError>;

    /// `Pending` notifications with `next_retry_at` set and not later than
    /// `before` — the sweeper's "due for retry" scan.
    async fn find_due_for_retry(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError>;
}
