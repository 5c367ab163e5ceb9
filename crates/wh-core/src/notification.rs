// SPDX-License-Identifier: MIT OR Apache-2.0
//! The notification entity and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// HttpMethod
// ---------------------------------------------------------------------------

/// HTTP method used to deliver a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// The method name as it appears on the wire (`"GET"`, `"POST"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Waiting in the queue, or waiting for its next retry.
    Pending,
    /// Delivered successfully (2xx).
    Delivered,
    /// Exhausted its retry budget, or received a non-retryable response.
    Failed,
    /// Cancelled by an operator before delivery completed.
    Cancelled,
}

impl NotificationStatus {
    /// `true` for the three terminal states: no further attempts are made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// Returns the set of statuses that are valid successors of `self`.
    ///
    /// The one non-obvious edge is `Failed -> Pending`, which is valid only
    /// via an explicit operator reset (see `NotificationService::reset_for_retry`),
    /// never as a side effect of delivery classification.
    pub fn valid_transitions(&self) -> &'static [NotificationStatus] {
        match self {
            Self::Pending => &[Self::Pending, Self::Delivered, Self::Failed, Self::Cancelled],
            Self::Failed => &[Self::Pending],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stable lowercase string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DeliveryAttempt / DeliveryResult
// ---------------------------------------------------------------------------

/// Immutable record of one `VendorAdapter::deliver` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// When the attempt was made.
    pub timestamp: DateTime<Utc>,
    /// HTTP status code, or `0` for a transport-level failure.
    pub response_code: u16,
    /// Response body, truncated to [`RESPONSE_BODY_TRUNCATE_AT`] characters.
    pub response_body: Option<String>,
    /// Error message, present only when the attempt did not succeed.
    pub error_message: Option<String>,
}

/// Transient outcome of a single delivery attempt. Never persisted directly;
/// the worker folds it into a [`DeliveryAttempt`] before storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    /// `true` for any 2xx response.
    pub success: bool,
    /// HTTP status code, or `0` for a transport-level failure.
    pub status_code: u16,
    /// Raw (untruncated) response body, if any.
    pub response_body: Option<String>,
    /// Error message describing a transport or vendor failure.
    pub error_message: Option<String>,
}

impl DeliveryResult {
    /// Construct a successful result.
    pub fn success(status_code: u16, response_body: Option<String>) -> Self {
        Self {
            success: true,
            status_code,
            response_body,
            error_message: None,
        }
    }

    /// Construct a failure result carrying a vendor-returned status code.
    pub fn failure(status_code: u16, response_body: Option<String>, message: String) -> Self {
        Self {
            success: false,
            status_code,
            response_body,
            error_message: Some(message),
        }
    }

    /// Construct a transport-level failure (status code `0`): timeout,
    /// connection refused, DNS failure, or TLS failure.
    pub fn connection_failure(message: String) -> Self {
        Self {
            success: false,
            status_code: 0,
            response_body: None,
            error_message: Some(message),
        }
    }
}

/// Response bodies stored in attempts are capped to this many characters.
pub const RESPONSE_BODY_TRUNCATE_AT: usize = 1000;
/// Sentinel appended to a response body truncated at [`RESPONSE_BODY_TRUNCATE_AT`].
pub const RESPONSE_BODY_TRUNCATION_SENTINEL: &str = "\u{2026} [truncated]";

/// Truncate a response body to [`RESPONSE_BODY_TRUNCATE_AT`] characters,
/// appending [`RESPONSE_BODY_TRUNCATION_SENTINEL`] when truncation occurred.
///
/// Truncates on `char` boundaries, not bytes, so multi-byte UTF-8 sequences
/// are never split.
pub fn truncate_response_body(body: &str) -> String {
    if body.chars().count() <= RESPONSE_BODY_TRUNCATE_AT {
        return body.to_string();
    }
    let truncated: String = body.chars().take(RESPONSE_BODY_TRUNCATE_AT).collect();
    format!("{truncated}{RESPONSE_BODY_TRUNCATION_SENTINEL}")
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// The broker-level message that tells a worker which notification to
/// process next.
///
/// `retry_count` is advisory only — the store's `retry_count` is
/// authoritative for every retry-eligibility decision. This field exists
/// for diagnostics (log fields, dead-letter inspection), not control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// The notification to process.
    pub notification_id: Uuid,
    /// Advisory retry count at the time of publish.
    pub retry_count: u32,
}

impl WorkItem {
    /// Construct a work item for the first (non-retry) attempt.
    pub fn first_attempt(notification_id: Uuid) -> Self {
        Self {
            notification_id,
            retry_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A durable outbound webhook notification: the system of record for one
/// vendor delivery, including its full attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Opaque unique identifier, assigned by the store on first persistence.
    pub id: Uuid,
    /// Selects the adapter used to deliver this notification.
    pub vendor_name: String,
    /// Absolute `http`/`https` URL.
    pub target_url: String,
    /// HTTP method to use.
    pub http_method: HttpMethod,
    /// Request headers. Keys are unique; case is preserved as supplied.
    pub headers: BTreeMap<String, String>,
    /// Opaque request body, passed to the vendor verbatim.
    pub body: Option<String>,
    /// Caller-supplied idempotency key. When present, globally unique across
    /// all notifications (terminal or not).
    pub idempotency_key: Option<String>,
    /// Current lifecycle status.
    pub status: NotificationStatus,
    /// Number of completed, retry-eligible failed attempts.
    pub retry_count: u32,
    /// When the record was first persisted.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Earliest time the next attempt may run. Meaningful only when
    /// `status == Pending && retry_count > 0`.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Append-only history of delivery attempts.
    pub attempts: Vec<DeliveryAttempt>,
}

impl Notification {
    /// Construct a brand-new notification in its initial state: `Pending`,
    /// `retry_count == 0`, no attempts, no assigned id.
    ///
    /// The id is a placeholder (`Uuid::nil()`) until the store assigns a
    /// real one on first `save`.
    pub fn new(
        vendor_name: impl Into<String>,
        target_url: impl Into<String>,
        http_method: HttpMethod,
        headers: BTreeMap<String, String>,
        body: Option<String>,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            vendor_name: vendor_name.into(),
            target_url: target_url.into(),
            http_method,
            headers,
            body,
            idempotency_key,
            status: NotificationStatus::Pending,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            attempts: Vec::new(),
        }
    }

    /// `true` if this record is eligible to be picked up by a worker (its
    /// status is `Pending`).
    pub fn is_pending(&self) -> bool {
        self.status == NotificationStatus::Pending
    }
}
