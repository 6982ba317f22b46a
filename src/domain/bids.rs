use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bid status enum
///
/// Transitions move forward only (no_bid -> submitted -> accepted); rejection
/// is terminal. Written by the bidding workflow, read-only in this core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    NoBid,
    Submitted,
    Accepted,
    Rejected,
}

impl Default for BidStatus {
    fn default() -> Self {
        Self::NoBid
    }
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoBid => "no_bid",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "submitted" => Self::Submitted,
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            _ => Self::NoBid,
        }
    }

    /// A bid in any state grants the vendor standing on its thread.
    pub fn grants_access(&self) -> bool {
        !matches!(self, Self::NoBid)
    }
}

/// Bid entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub project_id: Uuid,
    pub vendor_id: Uuid,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
