pub mod events;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod routing_events;


use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Message threads (nested under projects)
        .route(
            "/projects/:project_id/messages",
            get(messages::list_messages),
        )
        .route(
            "/projects/:project_id/messages",
            post(messages::create_message),
        )
        .route("/projects/:project_id/threads", get(messages::list_threads))
        // Live updates (SSE per project scope)
        .route("/projects/:project_id/events", get(events::project_events))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/unread-count",
            get(notifications::get_unread_count),
        )
        .route(
            "/notifications/read-all",
            patch(notifications::mark_all_read),
        )
        .route(
            "/notifications/:notification_id/read",
            patch(notifications::mark_notification_read),
        )
        .route(
            "/notifications/:notification_id",
            delete(notifications::delete_notification),
        )
        // Routing/bid change intake from the external workflow
        .route(
            "/internal/routing-events",
            post(routing_events::ingest_routing_change),
        )
}
