//! Collaborator interfaces for warden
//!
//! This crate defines the boundary between the sanction core and the outside
//! world: resolving subjects, applying and reverting the external sanction,
//! notifying the subject, and delivering audit events. It contains no
//! platform code itself.

mod mock;
mod offline;
mod sink;
mod traits;

pub use mock::*;
pub use offline::*;
pub use sink::*;
pub use traits::*;
