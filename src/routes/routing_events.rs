//! Routing/bid change intake
//!
//! The routing and bidding workflow lives outside this core and owns its
//! own tables; it reports lifecycle changes here so the fanout can notify
//! the affected parties. Admin-gated: end users never post these.

use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::RoutingChange;
use crate::error::ApiError;

/// POST /internal/routing-events
pub async fn ingest_routing_change(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(change): Json<RoutingChange>,
) -> Result<impl IntoResponse, ApiError> {
    if !auth.role.is_admin() {
        return Err(ApiError::not_authorized(
            "routing events are internal to the platform",
        ));
    }

    tracing::info!(
        project_id = %change.project_id(),
        vendor_id = %change.vendor_id(),
        "Routing change received"
    );

    let project = state
        .gate
        .project(change.project_id())
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let written = state.fanout.on_routing_or_bid_change(&project, &change).await;
    Ok(Json(serde_json::json!({
        "success": true,
        "notified": written.len()
    })))
}
