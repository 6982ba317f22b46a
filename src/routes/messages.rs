//! Message thread routes
//!
//! Scoped reads and writes against project threads. Every handler resolves
//! the actor's thread scope through the access resolver first; the thread
//! store never re-derives authorization.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::response::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{
    CreateMessageRequest, MessageQuery, MessageResponse, NewMessage, ThreadKey, ThreadScope,
    ThreadSummary,
};
use crate::error::ApiError;
use crate::services::access::{self, Operation};
use crate::services::events::ChannelEvent;

/// GET /projects/:project_id/messages
///
/// Ordered messages of the resolved thread. A business omitting `vendor_id`
/// is only valid while exactly one vendor thread exists; admins without a
/// `vendor_id` read the whole project.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let actor = auth.0;
    let scope = access::resolve_scope(
        state.gate.as_ref(),
        &actor,
        project_id,
        query.vendor_id,
        Operation::Read,
    )
    .await?;

    let messages = state.threads.list(project_id, scope, query.cursor).await?;
    let data: Vec<MessageResponse> = messages.into_iter().map(Into::into).collect();
    Ok(Json(DataResponse::new(data)))
}

/// POST /projects/:project_id/messages
///
/// Append a message to the resolved thread. `vendor_id` is required for
/// business-authored messages when multiple vendor threads exist and is
/// forced to the caller's own id for vendors.
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    auth: RequireAuth,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = auth.0;
    tracing::info!(
        user_id = %actor.user_id,
        project_id = %project_id,
        "Sending message"
    );

    let text = req.message_text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("message_text must not be empty"));
    }
    if let Some(image_url) = &req.image_url {
        url::Url::parse(image_url)
            .map_err(|_| ApiError::bad_request("image_url is not a valid URL"))?;
    }

    let scope = access::resolve_scope(
        state.gate.as_ref(),
        &actor,
        project_id,
        req.vendor_id,
        Operation::Write,
    )
    .await?;
    let vendor_id = match scope {
        ThreadScope::Vendor(vendor_id) => vendor_id,
        ThreadScope::Project => {
            return Err(ApiError::ambiguous_scope("a write must name a vendor thread"))
        }
    };

    let message = state
        .threads
        .append(
            ThreadKey::new(project_id, vendor_id),
            NewMessage {
                sender_id: actor.user_id,
                text: text.to_string(),
                image_url: req.image_url.clone(),
            },
        )
        .await?;

    // Push to live sessions; degraded sessions pick it up on their next poll.
    state.bus.publish(ChannelEvent::Message(message.clone()));

    // Fanout is decoupled from the append: it retries per recipient on its
    // own and never fails the write that triggered it.
    let project = state
        .gate
        .project(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    tokio::spawn({
        let fanout = state.fanout.clone();
        let message = message.clone();
        async move {
            fanout.on_message_appended(&project, &message).await;
        }
    });

    let response: MessageResponse = message.into();
    Ok((StatusCode::CREATED, Json(DataResponse::new(response))))
}

/// GET /projects/:project_id/threads
///
/// The threads visible to the actor, with the routing/bid facts the UI uses
/// to label them.
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let actor = auth.0;
    let keys = access::visible_threads(state.gate.as_ref(), &actor, project_id).await?;
    let project = state
        .gate
        .project(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let mut data = Vec::with_capacity(keys.len());
    for key in keys {
        let routed = state.gate.is_routed(project_id, key.vendor_id).await?;
        let bid_status = state.gate.bid_status(project_id, key.vendor_id).await?;
        data.push(ThreadSummary {
            project_id,
            vendor_id: key.vendor_id,
            routed,
            bid_status,
            is_selected_vendor: project.selected_vendor_id == Some(key.vendor_id),
        });
    }
    Ok(Json(DataResponse::new(data)))
}
