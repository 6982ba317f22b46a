use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::bids::BidStatus;

/// Routing entry
///
/// Created when a project is routed to a vendor for consideration; immutable
/// afterwards (deleted only on project cancellation). A routing entry is the
/// baseline grant: a routed vendor may always see its own thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub project_id: Uuid,
    pub vendor_id: Uuid,
    pub routed_at: DateTime<Utc>,
}

/// Routing/bid lifecycle change, pushed into the core by the external
/// routing and bidding workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoutingChange {
    /// A project was routed to a vendor for consideration.
    VendorRouted { project_id: Uuid, vendor_id: Uuid },
    /// A vendor's bid moved to a new status.
    BidStatusChanged {
        project_id: Uuid,
        vendor_id: Uuid,
        status: BidStatus,
    },
}

impl RoutingChange {
    pub fn project_id(&self) -> Uuid {
        match self {
            Self::VendorRouted { project_id, .. } => *project_id,
            Self::BidStatusChanged { project_id, .. } => *project_id,
        }
    }

    pub fn vendor_id(&self) -> Uuid {
        match self {
            Self::VendorRouted { vendor_id, .. } => *vendor_id,
            Self::BidStatusChanged { vendor_id, .. } => *vendor_id,
        }
    }
}
