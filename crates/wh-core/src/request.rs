// SPDX-License-Identifier: MIT OR Apache-2.0
//! API-facing request DTOs.

use crate::notification::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Body of `POST /api/v1/notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    /// Target vendor adapter name.
    pub vendor_name: String,
    /// Absolute `http`/`https` URL.
    pub target_url: String,
    /// HTTP method, as received on the wire. Deserialized as a plain string
    /// rather than the [`HttpMethod`] enum so an unrecognized value is a
    /// `validate()` failure surfaced through `ApiError::validation`'s 400
    /// envelope, instead of a raw enum-deserialization rejection.
    pub http_method: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Opaque request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Caller-supplied idempotency key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl CreateNotificationRequest {
    /// Validate the request per §6's rules, accumulating every violation
    /// found rather than failing on the first.
    ///
    /// Returns `Ok(())` when the request is well-formed, or the list of
    /// human-readable violations otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.vendor_name.trim().is_empty() {
            errors.push("vendorName must not be empty".to_string());
        }

        if !self.target_url.starts_with("http://") && !self.target_url.starts_with("https://") {
            errors.push("targetUrl must be an absolute http(s) URL".to_string());
        }

        if HttpMethod::from_str(&self.http_method).is_err() {
            errors.push("httpMethod must be one of GET, POST, PUT, PATCH, DELETE".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
