//! Service layer modules for the messaging core.
//!
//! Access resolution, notification fanout, the push event bus, and the
//! per-session delivery channel manager.

pub mod access;
pub mod delivery;
pub mod events;
pub mod fanout;

pub use events::EventBus;
