use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::bids::BidStatus;

/// Key of one conversation: a project and the vendor on the other side.
///
/// Threads are derived, never stored as rows. For a fixed project the
/// vendor-scoped threads partition its messages: no vendor can observe
/// another vendor's messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub project_id: Uuid,
    pub vendor_id: Uuid,
}

impl ThreadKey {
    pub fn new(project_id: Uuid, vendor_id: Uuid) -> Self {
        Self {
            project_id,
            vendor_id,
        }
    }

    /// Shape check only. Authorization is the access resolver's concern and
    /// is never re-derived at the store layer.
    pub fn is_well_formed(&self) -> bool {
        !self.project_id.is_nil() && !self.vendor_id.is_nil()
    }
}

/// Read scope for a project's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadScope {
    /// One vendor's thread.
    Vendor(Uuid),
    /// Every vendor thread of the project (admin monitoring view).
    Project,
}

impl ThreadScope {
    pub fn contains(&self, vendor_id: Uuid) -> bool {
        match self {
            Self::Vendor(v) => *v == vendor_id,
            Self::Project => true,
        }
    }
}

/// Message entity
///
/// Immutable once created; there is no edit or delete. Ordered by
/// `(created_at, id)` ascending, which message ids (UUIDv7) agree with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sender_id: Uuid,
    /// The vendor thread this message belongs to. Business-authored messages
    /// carry their target vendor explicitly, so every stored message lands in
    /// exactly one vendor thread.
    pub vendor_id: Uuid,
    pub text: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for appending a message; id and timestamp are assigned by the
/// thread store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub text: String,
    pub image_url: Option<String>,
}

/// Request DTO for sending a message
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(alias = "messageText")]
    pub message_text: String,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default, alias = "vendorId")]
    pub vendor_id: Option<Uuid>,
}

/// Query params for listing messages
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MessageQuery {
    #[serde(default, alias = "vendorId")]
    pub vendor_id: Option<Uuid>,
    /// Id of the last message the caller has seen; the response resumes
    /// strictly after it.
    #[serde(default)]
    pub cursor: Option<Uuid>,
}

/// Response DTO for message
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sender_id: Uuid,
    pub vendor_id: Uuid,
    pub text: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            project_id: m.project_id,
            sender_id: m.sender_id,
            vendor_id: m.vendor_id,
            text: m.text,
            image_url: m.image_url,
            created_at: m.created_at,
        }
    }
}

/// One visible thread of a project, with the routing/bid facts the UI needs
/// to label it.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub project_id: Uuid,
    pub vendor_id: Uuid,
    pub routed: bool,
    pub bid_status: BidStatus,
    /// Accepted-bid threads render as "active project" threads; access rules
    /// are unaffected.
    pub is_selected_vendor: bool,
}
