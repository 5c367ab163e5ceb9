// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! wh-daemon
//!
//! Wires the whole webhook relay pipeline together: the HTTP API (§6), the
//! delivery worker pool (§4.7), and the sweeper safety net (§4.8), over a
//! shared store/broker/registry/service built at startup.

/// HTTP API routes and error envelope.
pub mod api;
/// CLI configuration.
pub mod config;

pub use api::ApiError;
pub use config::Args;

use std::sync::Arc;
use tower_http::trace::TraceLayer;
use wh_service::NotificationService;

/// Shared application state handed to every Axum handler.
pub struct AppState {
    /// The transactional facade every handler calls through.
    pub service: Arc<NotificationService>,
}

/// Build the Axum router for the notification API, instrumented with
/// `tower_http`'s request/response tracing layer.
pub fn build_app(state: Arc<AppState>) -> axum::Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
