//! Sanction workflows for warden
//!
//! This crate is the heart of warden, containing:
//! - The impose workflow (parse, policy checks, external action, commit, schedule, report)
//! - The idempotent reverse workflow
//! - A durable reversal scheduler with bounded retry and restart recovery
//! - Best-effort audit reporting

mod error;
mod executor;
mod reporter;
mod scheduler;

pub use error::*;
pub use executor::*;
pub use reporter::*;
pub use scheduler::*;
