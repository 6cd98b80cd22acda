// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dmakr-core: data model and diff engine for the dmakr CI trigger daemon.

pub mod macros;

pub mod diff;
pub mod job;
pub mod mirror;
pub mod options;

pub use diff::{filter_heads, ChangeEvent, ChangeKind, MirrorDiff};
pub use job::{
    JobEvent, JobKind, JobRecord, JobStage, JobStateChanged, JobStatus, JobsMap, ModifyJobState,
    ParseJobKindError,
};
pub use mirror::{watched_id, BranchHeads, CommitInfo, MirrorId, MirrorIds, GUARD_ID};
pub use options::{default_branch_filter, default_branches, RepoOptions, RuleOptions};
