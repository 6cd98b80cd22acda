// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dmakr-daemon: configuration, pollers, and process lifecycle for the
//! `dmakrd` binary.

pub mod config;
pub mod lifecycle;
pub mod poller;

pub use config::{Config, ConfigError};
pub use lifecycle::{run, LifecycleError};
