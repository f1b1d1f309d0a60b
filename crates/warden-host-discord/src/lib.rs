//! Discord adapter for warden
//!
//! Implements the collaborator traits against the Discord REST API:
//! - Guild member lookup and exempt-role detection
//! - Guild bans as the external sanction
//! - Direct-message notices
//! - Log channel embeds as the audit sink

mod adapter;
mod client;
mod sink;

pub use adapter::*;
pub use client::*;
pub use sink::*;
