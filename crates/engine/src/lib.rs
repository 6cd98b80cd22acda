// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dmakr-engine: the rules engine and runner adapters.
//!
//! Policies are pure functions over a change/notification trigger plus
//! the latest available head snapshot; pipelines wire them to the heads
//! bus and the job state store and dispatch the resulting job events
//! strictly in order.

pub mod heads;
pub mod pipeline;
pub mod rules;
pub mod runner;

pub use heads::HeadsHub;
pub use pipeline::{spawn_pipelines, EngineDeps, PipelineError};
pub use runner::{Runner, RunnerError};
