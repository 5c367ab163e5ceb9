//! Unified error taxonomy for the webhook relay service.
//!
//! Every fallible operation across the workspace resolves to a
//! [`ServiceError`] carrying a stable machine-readable `code()` plus a
//! human-readable message, so the HTTP layer can map it to a status code
//! without re-deriving the mapping at each call site.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;
use uuid::Uuid;

/// Errors surfaced by the notification store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An idempotency key collided with an existing, different record during
    /// a non-atomic read-then-write path. Callers should retry the lookup.
    #[error("idempotency key conflict")]
    IdempotencyConflict,
    /// The requested record does not exist.
    #[error("notification {0} not found")]
    NotFound(Uuid),
    /// The underlying storage medium failed (I/O, serialization, etc).
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the queue broker client.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker's internal channel is closed (no consumers registered, or
    /// the broker has been shut down).
    #[error("broker channel closed")]
    ChannelClosed,
    /// The underlying transport failed to accept the message.
    #[error("broker backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the notification service (the API-facing layer).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A caller-supplied request failed validation.
    #[error("{0}")]
    Validation(String),
    /// The requested notification does not exist.
    #[error("notification {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: Uuid,
    },
    /// The requested transition is not valid from the record's current state.
    #[error("cannot {action} notification {id}: expected status {expected}, found {actual}")]
    StateConflict {
        /// The id of the record.
        id: Uuid,
        /// The operation that was attempted (e.g. `"retry"`, `"cancel"`).
        action: &'static str,
        /// The status the operation required.
        expected: &'static str,
        /// The status the record actually had.
        actual: String,
    },
    /// The store failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    /// The broker failed.
    #[error("broker failure: {0}")]
    Broker(#[from] BrokerError),
}

impl ServiceError {
    /// Stable, machine-readable error code for the `{status, error, message}`
    /// envelope required by the HTTP API.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::StateConflict { .. } => "state_conflict",
            Self::Store(_) => "store_failure",
            Self::Broker(_) => "broker_failure",
        }
    }

    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::StateConflict { .. } => 409,
            Self::Store(_) | Self::Broker(_) => 500,
        }
    }
}

/// Non-2xx / transport classification for a single delivery attempt.
///
/// This is not a [`std::error::Error`] impl on purpose: a failed delivery
/// attempt is expected, ordinary output of a delivery-result classification,
/// not an exceptional control-flow path — it is recorded, not propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response.
    Success,
    /// Transport-level failure (timeout, connection refused, DNS, TLS).
    TransportFailure,
    /// 429 Too Many Requests.
    RateLimited,
    /// 5xx response.
    VendorServerError,
    /// Any other non-2xx response (terminal).
    VendorClientError,
}

impl AttemptOutcome {
    /// Classify a status code (0 = transport failure) per the adapter
    /// contract: `0`, `429`, and `>= 500` are retryable; everything else is
    /// terminal.
    pub fn classify(status_code: u16) -> Self {
        match status_code {
            0 => Self::TransportFailure,
            200..=299 => Self::Success,
            429 => Self::RateLimited,
            500..=599 => Self::VendorServerError,
            _ => Self::VendorClientError,
        }
    }

    /// `true` for outcomes another attempt might resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure | Self::RateLimited | Self::VendorServerError
        )
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::TransportFailure => "transport_failure",
            Self::RateLimited => "rate_limited",
            Self::VendorServerError => "vendor_server_error",
            Self::VendorClientError => "vendor_client_error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_transport_failure() {
        assert_eq!(AttemptOutcome::classify(0), AttemptOutcome::TransportFailure);
    }

    #[test]
    fn classify_success_range() {
        assert_eq!(AttemptOutcome::classify(200), AttemptOutcome::Success);
        assert_eq!(AttemptOutcome::classify(299), AttemptOutcome::Success);
    }

    #[test]
    fn classify_rate_limited() {
        assert_eq!(AttemptOutcome::classify(429), AttemptOutcome::RateLimited);
    }

    #[test]
    fn classify_server_error_range() {
        assert_eq!(
            AttemptOutcome::classify(500),
            AttemptOutcome::VendorServerError
        );
        assert_eq!(
            AttemptOutcome::classify(599),
            AttemptOutcome::VendorServerError
        );
    }

    #[test]
    fn classify_client_error_is_terminal() {
        assert_eq!(
            AttemptOutcome::classify(400),
            AttemptOutcome::VendorClientError
        );
        assert!(!AttemptOutcome::classify(400).is_retryable());
        assert!(!AttemptOutcome::classify(404).is_retryable());
    }

    #[test]
    fn retryable_outcomes() {
        assert!(AttemptOutcome::classify(0).is_retryable());
        assert!(AttemptOutcome::classify(429).is_retryable());
        assert!(AttemptOutcome::classify(503).is_retryable());
    }

    #[test]
    fn success_is_never_asked_to_retry_in_practice_but_is_not_retryable() {
        assert!(!AttemptOutcome::classify(200).is_retryable());
    }

    #[test]
    fn service_error_status_codes() {
        assert_eq!(ServiceError::Validation("bad".into()).status_code(), 400);
        assert_eq!(
            ServiceError::NotFound { id: Uuid::nil() }.status_code(),
            404
        );
        assert_eq!(
            ServiceError::StateConflict {
                id: Uuid::nil(),
                action: "retry",
                expected: "failed",
                actual: "pending".into(),
            }
            .status_code(),
            409
        );
        assert_eq!(
            ServiceError::Store(StoreError::Backend("disk full".into())).status_code(),
            500
        );
    }

    #[test]
    fn service_error_codes_are_stable() {
        assert_eq!(ServiceError::Validation("x".into()).code(), "validation_error");
        assert_eq!(ServiceError::NotFound { id: Uuid::nil() }.code(), "not_found");
        assert_eq!(
            ServiceError::StateConflict {
                id: Uuid::nil(),
                action: "cancel",
                expected: "pending",
                actual: "failed".into(),
            }
            .code(),
            "state_conflict"
        );
    }

    #[test]
    fn store_error_converts_into_service_error() {
        let err: ServiceError = StoreError::NotFound(Uuid::nil()).into();
        assert!(matches!(err, ServiceError::Store(StoreError::NotFound(_))));
    }
}
