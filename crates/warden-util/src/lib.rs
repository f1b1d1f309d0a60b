//! Shared utilities for warden
//!
//! This crate provides:
//! - ID types (SubjectId, SanctionId, EventId)
//! - Clock access with a mock-time override for development
//! - Duration parsing and human-readable formatting
//! - Default paths for config and data directories

mod duration;
mod ids;
mod paths;
mod time;

pub use duration::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
