//! Shared types for warden
//!
//! This crate defines the data model shared by the store, the core and the
//! collaborator adapters:
//! - Sanctions and their status
//! - Reversal jobs
//! - Audit events

mod events;
mod types;

pub use events::*;
pub use types::*;
