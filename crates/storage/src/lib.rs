// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dmakr-storage: per-commit job state with idempotent merge and
//! change notification.

mod db;
mod doc;
mod store;

pub use db::JsonDb;
pub use doc::{fingerprint, merge_status, IndirectRecord, PersistedJobDoc};
pub use store::{JobStateStore, StoreError};
