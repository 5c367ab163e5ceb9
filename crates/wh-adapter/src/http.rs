// SPDX-License-Identifier: MIT OR Apache-2.0
//! `reqwest`-backed [`VendorAdapter`] implementation.

use crate::VendorAdapter;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::warn;
use wh_core::{DeliveryResult, HttpMethod, Notification};

/// Transport-level configuration shared by every [`GenericHttpAdapter`]
/// built from the same client.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Per-request timeout, covering connect + body read.
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Delivers notifications over plain HTTP(S) using a shared, connection
/// pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct GenericHttpAdapter {
    name: String,
    client: Client,
}

impl GenericHttpAdapter {
    /// Build an adapter registered under `name`, constructing its own
    /// client configured with `config.timeout`.
    pub fn new(name: impl Into<String>, config: HttpConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            name: name.into(),
            client,
        }
    }

    /// Build an adapter reusing an already-constructed client, so multiple
    /// vendor adapters can share one connection pool.
    pub fn with_client(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

fn method_for(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl VendorAdapter for GenericHttpAdapter {
    fn vendor_name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, notification: &Notification) -> DeliveryResult {
        let mut builder = self
            .client
            .request(method_for(notification.http_method), &notification.target_url);

        for (key, value) in &notification.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &notification.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(
                    notification_id = %notification.id,
                    error = %err,
                    "vendor delivery attempt failed before a response was received"
                );
                return DeliveryResult::connection_failure(err.to_string());
            }
        };

        let status = response.status().as_u16();
        // Always drain the body, on every path, so the connection returns to
        // the pool instead of being dropped mid-stream.
        let body_text = match response.text().await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(
                    notification_id = %notification.id,
                    error = %err,
                    "failed to read vendor response body"
                );
                None
            }
        };

        if (200..300).contains(&status) {
            DeliveryResult::success(status, body_text)
        } else {
            let message = format!("vendor responded with status {status}");
            DeliveryResult::failure(status, body_text, message)
        }
    }

    fn is_retryable(&self, status_code: u16, _body: Option<&str>) -> bool {
        status_code == 0 || status_code == 429 || status_code >= 500
    }
}
