//! Storage ports
//!
//! The thread store and notification store are the single point of truth for
//! everything this core creates; the routing/bid gate exposes the
//! externally-owned facts (projects, routing entries, bids) the access
//! resolver depends on. Two backends implement all three ports: an in-memory
//! store for dev and tests, and PostgreSQL for production.

use axum::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    BidStatus, Message, NewMessage, NewNotification, Notification, Project, ThreadKey, ThreadScope,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed thread key")]
    MalformedThreadKey,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Message persistence, keyed by `(project, vendor)` thread.
///
/// Authorization is the access resolver's job and happens before any call
/// lands here; the store re-validates thread-key shape only, so the two
/// concerns stay separable and independently testable.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Append a message to one thread. Appends to the same key are
    /// serialized to preserve the ordering invariant; appends to different
    /// keys are independent and commute.
    async fn append(&self, key: ThreadKey, new: NewMessage) -> Result<Message, StoreError>;

    /// Messages of the scoped thread(s) in strict `(created_at, id)`
    /// ascending order, resuming strictly after `cursor` when one is given.
    /// The cursor is the id of the last message the caller has seen; an
    /// unknown cursor is an error, never a silent full replay.
    async fn list(
        &self,
        project_id: Uuid,
        scope: ThreadScope,
        cursor: Option<Uuid>,
    ) -> Result<Vec<Message>, StoreError>;
}

/// Per-recipient notification records. No locking beyond per-record
/// atomicity; records for different recipients are fully independent.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError>;

    /// Newest-first page of a user's notifications plus the total count.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64), StoreError>;

    /// Oldest-first notifications created at or after `since`; the polling
    /// feed of the delivery channel. Inclusive on purpose: a record sharing
    /// the boundary timestamp must not be skipped, and the delivery merge
    /// drops anything already applied.
    async fn list_since(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError>;

    /// Mark one of the user's notifications read. Returns false when no such
    /// notification exists for that user; marking an already-read record is
    /// not an error.
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;

    /// Mark all of the user's unread notifications read; returns how many.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete one of the user's notifications. Returns false when absent.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

/// Read-only facts from the routing/bidding workflow.
///
/// This core never writes any of these; it only needs the shape of the facts
/// that drive thread visibility.
#[async_trait]
pub trait RoutingGate: Send + Sync {
    async fn project(&self, project_id: Uuid) -> Result<Option<Project>, StoreError>;

    async fn is_routed(&self, project_id: Uuid, vendor_id: Uuid) -> Result<bool, StoreError>;

    async fn bid_status(&self, project_id: Uuid, vendor_id: Uuid)
        -> Result<BidStatus, StoreError>;

    /// Vendors with a routing entry or a bid on the project, in routing/bid
    /// order — the project's thread universe.
    async fn eligible_vendors(&self, project_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}
