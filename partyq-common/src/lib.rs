//! # partyq Common Library
//!
//! Shared code for the partyq crates including:
//! - Value types for users and resolved tracks
//! - Party event types and the broadcast event bus
//! - Configuration file discovery
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use events::{EventBus, PartyEvent};
pub use models::{Track, User};
