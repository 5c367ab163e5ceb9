// SPDX-License-Identifier: MIT OR Apache-2.0
//! The §6 HTTP API: five routes over [`NotificationService`].

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use wh_core::{CreateNotificationRequest, Notification, NotificationStatus};
use wh_error::ServiceError;

/// The `{status, error, message, details[], timestamp}` envelope every
/// non-2xx response carries.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    status: u16,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
    timestamp: DateTime<Utc>,
}

/// An API-facing error: a status code plus the envelope fields above.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Vec<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// A `400` with per-field validation violations.
    pub fn validation(details: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: "request failed validation".to_string(),
            details,
        }
    }

    /// A `404` for a notification id that does not exist.
    pub fn not_found(id: Uuid) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("notification {id} not found"),
        )
    }

    /// A `409` for a state-conflicting transition request.
    pub fn state_conflict(action: &'static str, expected: &'static str, actual: NotificationStatus) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "state_conflict",
            format!("cannot {action}: expected status {expected}, found {actual}"),
        )
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            status: self.status.as_u16(),
            error: self.code,
            message: self.message,
            details: self.details,
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the router for all five notification endpoints.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/notifications", post(create_notification))
        .route("/api/v1/notifications/failed", get(list_failed))
        .route(
            "/api/v1/notifications/{id}",
            get(get_notification).delete(cancel_notification),
        )
        .route("/api/v1/notifications/{id}/retry", post(retry_notification))
}

/// `202 Accepted` body for a successful create.
#[derive(Debug, Serialize)]
struct CreateResponse {
    id: Uuid,
    status: NotificationStatus,
    created_at: DateTime<Utc>,
}

impl From<&Notification> for CreateResponse {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            status: n.status,
            created_at: n.created_at,
        }
    }
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<CreateResponse>), ApiError> {
    request.validate().map_err(ApiError::validation)?;
    let created = state.service.create(request).await?;
    Ok((StatusCode::ACCEPTED, Json(CreateResponse::from(&created))))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    state
        .service
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(id))
}

async fn retry_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let current = state
        .service
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(id))?;

    match state.service.reset_for_retry(id).await? {
        Some(updated) => Ok(Json(updated)),
        None => Err(ApiError::state_conflict("retry", "failed", current.status)),
    }
}

async fn cancel_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let current = state
        .service
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(id))?;

    match state.service.cancel_notification(id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => {
            error!(notification_id = %id, status = %current.status, "cancel rejected: not pending");
            Err(ApiError::state_conflict("cancel", "pending", current.status))
        }
    }
}

#[derive(Debug, Deserialize)]
struct FailedQuery {
    #[serde(default)]
    vendor_name: Option<String>,
}

async fn list_failed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FailedQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let records = match params.vendor_name {
        Some(vendor) => {
            state
                .service
                .find_by_vendor_and_status(&vendor, NotificationStatus::Failed)
                .await?
        }
        None => state.service.find_by_status(NotificationStatus::Failed).await?,
    };
    Ok(Json(records))
}
