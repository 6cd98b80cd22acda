// SPDX-License-Identifier: MIT

//! Trigger policies.
//!
//! Each policy is a pure function from a trigger (a change event or a
//! state-change notification) plus the relevant head snapshot to at
//! most one [`dmakr_core::JobEvent`]. Wiring to buses and dispatch
//! order live in [`crate::pipeline`].

pub mod automatic;
pub mod forward;
pub mod indirect;
pub mod prepare;
pub mod select;

pub use automatic::automatic_event;
pub use forward::forward_event;
pub use indirect::indirect_prepare_event;
pub use prepare::{prepare_event, removed_needs_repair};
pub use select::{branch_priority, select_head};
