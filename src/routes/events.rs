//! Live update routes
//!
//! One SSE stream per connected session, scoped like the message listing.
//! Each stream is backed by a delivery channel that merges push events with
//! the polling fallback, so a record reaches the client exactly once no
//! matter which path carried it.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::services::access::{self, Operation};
use crate::services::delivery::{
    ClientUpdate, DeliveryChannel, DeliveryConfig, SessionWatermarks, StorePoller,
};
use crate::services::events::{BusTransport, SessionFilter};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventsQuery {
    #[serde(default, alias = "vendorId")]
    pub vendor_id: Option<Uuid>,
    /// Id of the last message the client has applied. When present, the
    /// stream opens with the messages the client missed; without it the
    /// stream starts at the current tail and the backlog belongs to the
    /// message listing.
    #[serde(default)]
    pub cursor: Option<Uuid>,
}

/// GET /projects/:project_id/events
///
/// Server-sent events for the resolved thread scope plus the caller's own
/// notifications. Closing the stream tears the session down: timers and the
/// push subscription are released, while in-flight appends elsewhere are
/// untouched.
pub async fn project_events(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
    auth: RequireAuth,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let actor = auth.0;
    let scope = access::resolve_scope(
        state.gate.as_ref(),
        &actor,
        project_id,
        query.vendor_id,
        Operation::Read,
    )
    .await?;

    tracing::debug!(
        user_id = %actor.user_id,
        project_id = %project_id,
        "Opening delivery session"
    );

    // Catch up from the client's cursor, or start at the current tail.
    let existing = state.threads.list(project_id, scope, query.cursor).await?;
    let message_watermark = existing
        .last()
        .map(|m| (m.created_at, m.id))
        .or(query.cursor.map(|id| (Utc::now(), id)));
    let catchup: Vec<ClientUpdate> = if query.cursor.is_some() {
        existing.into_iter().map(ClientUpdate::Message).collect()
    } else {
        Vec::new()
    };

    let filter = SessionFilter {
        user_id: actor.user_id,
        project_id,
        scope,
    };
    let channel = DeliveryChannel::spawn(
        Arc::new(BusTransport::new(state.bus.clone(), filter)),
        Arc::new(StorePoller::new(
            state.threads.clone(),
            state.notifications.clone(),
            project_id,
            scope,
            actor.user_id,
        )),
        DeliveryConfig::from_settings(&state.settings),
        SessionWatermarks {
            message: message_watermark,
            notification: Some(Utc::now()),
        },
    );

    let live = stream::unfold(channel, |mut channel| async move {
        channel.recv().await.map(|update| (update, channel))
    });
    let updates = stream::iter(catchup).chain(live).map(|update| sse_event(&update));

    Ok(Sse::new(updates).keep_alive(KeepAlive::default()))
}

fn sse_event(update: &ClientUpdate) -> Result<Event, Infallible> {
    Ok(Event::default().json_data(update).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode update");
        Event::default().comment("encoding error")
    }))
}
