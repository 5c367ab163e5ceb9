// SPDX-License-Identifier: MIT OR Apache-2.0
//! wh-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The persistent data model shared by every crate in the webhook relay
//! workspace: [`Notification`], its lifecycle, and the wire envelope placed
//! on the broker.

/// The notification entity, its lifecycle state machine, and delivery
/// attempt records.
pub mod notification;
/// API-facing request/response DTOs.
pub mod request;

pub use notification::{
    truncate_response_body, DeliveryAttempt, DeliveryResult, HttpMethod, Notification,
    NotificationStatus, WorkItem, RESPONSE_BODY_TRUNCATION_SENTINEL, RESPONSE_BODY_TRUNCATE_AT,
};
pub use request::CreateNotificationRequest;
