// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! wh-adapter
//!
//! The [`VendorAdapter`] abstraction for outbound webhook delivery, a
//! reqwest-backed [`GenericHttpAdapter`], and the [`AdapterRegistry`] that
//! resolves a notification's `vendor_name` to a concrete adapter.

mod http;
mod registry;

pub use http::{GenericHttpAdapter, HttpConfig};
pub use registry::{AdapterRegistry, RegistryError};

use async_trait::async_trait;
use wh_core::{DeliveryResult, Notification};

/// A vendor-specific delivery transport.
///
/// `deliver` never returns `Err` — every failure mode (connect, timeout,
/// DNS, TLS, non-2xx status) is folded into a [`DeliveryResult`] so the
/// caller has one uniform way to classify the outcome.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// The name this adapter is registered under.
    fn vendor_name(&self) -> &str;

    /// Attempt one delivery of `notification`.
    async fn deliver(&self, notification: &Notification) -> DeliveryResult;

    /// Whether a completed attempt with the given status code and body
    /// should be retried. The default implements the `{0, 429, >=500}`
    /// rule; adapters may widen or narrow it for vendor-specific quirks.
    fn is_retryable(&self, status_code: u16, _body: Option<&str>) -> bool {
        status_code == 0 || status_code == 429 || status_code >= 500
    }
}
