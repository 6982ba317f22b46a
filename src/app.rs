use axum::{http::HeaderValue, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::fanout::NotificationFanout;
use crate::services::EventBus;
use crate::store::{MemoryStore, NotificationStore, PgStore, RoutingGate, ThreadStore};

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    /// Present only on the PostgreSQL backend; used by the health probe.
    pub db: Option<PgPool>,
    pub threads: Arc<dyn ThreadStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub gate: Arc<dyn RoutingGate>,
    pub bus: EventBus,
    pub fanout: Arc<NotificationFanout>,
}

impl AppState {
    pub fn with_memory_store(settings: Settings, store: Arc<MemoryStore>) -> Arc<Self> {
        let bus = EventBus::new(settings.event_bus_capacity);
        let notifications: Arc<dyn NotificationStore> = store.clone();
        let fanout = Arc::new(NotificationFanout::new(notifications.clone(), bus.clone()));
        Arc::new(Self {
            settings,
            db: None,
            threads: store.clone(),
            notifications,
            gate: store,
            bus,
            fanout,
        })
    }

    pub fn with_pg_store(settings: Settings, pool: PgPool) -> Arc<Self> {
        let store = Arc::new(PgStore::new(pool.clone()));
        let bus = EventBus::new(settings.event_bus_capacity);
        let notifications: Arc<dyn NotificationStore> = store.clone();
        let fanout = Arc::new(NotificationFanout::new(notifications.clone(), bus.clone()));
        Arc::new(Self {
            settings,
            db: Some(pool),
            threads: store.clone(),
            notifications,
            gate: store,
            bus,
            fanout,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(&state.settings);

    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Request ID layers
    let (set_request_id, propagate_request_id) = request_id_layer();

    // Build router (routes at root level, no /api prefix)
    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // In dev mode, use longer preflight cache to reduce OPTIONS requests
    let max_age = if settings.env.is_dev() {
        // Cache preflight for 24 hours in development
        std::time::Duration::from_secs(86400)
    } else {
        // 1 hour in production
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderName::from_static("x-user-id"),
            axum::http::HeaderName::from_static("x-user-role"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
