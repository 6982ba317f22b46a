//! Notification routes
//!
//! Endpoints for in-app notifications: list, mark read, delete. Records are
//! only ever visible to and mutable by their recipient.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::pagination::PaginationParams;
use crate::api::Paginated;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{NotificationResponse, UnreadCountResponse};
use crate::error::ApiError;

/// Flattening typed params through `Query` trips over urlencoded's
/// string-only buffering, so the fields stay explicit here.
#[derive(Debug, Deserialize, Default)]
pub struct NotificationQueryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub unread_only: Option<bool>,
}

impl NotificationQueryParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// GET /notifications
///
/// List notifications for the current user with pagination and filtering.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQueryParams>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user_id;
    let unread_only = query.unread_only.unwrap_or(false);
    let pagination = query.pagination();

    let (rows, total) = state
        .notifications
        .list_for_user(
            user_id,
            unread_only,
            pagination.limit() as i64,
            pagination.offset() as i64,
        )
        .await?;

    let data: Vec<NotificationResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(Paginated::new(data, &pagination, total as u64)))
}

/// GET /notifications/unread-count
///
/// Get the count of unread notifications for the current user.
pub async fn get_unread_count(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.notifications.unread_count(auth.user_id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// PATCH /notifications/:notification_id/read
///
/// Mark a single notification as read. Marking an already-read record is
/// fine; marking someone else's is not found.
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let found = state
        .notifications
        .mark_read(auth.user_id, notification_id)
        .await?;
    if !found {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

/// PATCH /notifications/read-all
///
/// Mark all notifications as read for the current user.
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let marked = state.notifications.mark_all_read(auth.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "marked_count": marked
    })))
}

/// DELETE /notifications/:notification_id
///
/// Delete a single notification.
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .notifications
        .delete(auth.user_id, notification_id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
