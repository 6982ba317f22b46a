//! Domain types and DTOs
//!
//! Entities and request/response shapes for the messaging core: projects and
//! routing/bid facts (read-only here), message threads, and notifications.

#![allow(dead_code)]

pub mod bids;
pub mod messages;
pub mod notifications;
pub mod projects;
pub mod routing;

// Re-export commonly used types
pub use bids::*;
pub use messages::*;
pub use notifications::*;
pub use projects::*;
pub use routing::*;
