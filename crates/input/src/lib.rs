//! Input: fixed logical actions and the set of actions held this frame.
//!
//! # Invariants
//! - Bindings are fixed; platforms translate raw keys into [`Action`]s.
//! - Consumers read held actions, never raw key events.

pub mod action;

pub use action::{Action, KeyState, ParseActionError};

pub fn crate_info() -> &'static str {
    "boxlight-input v0.1.0"
}
