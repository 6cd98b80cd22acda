// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dmakr-adapters: boundary adapters for the dmakr trigger engine.
//!
//! Everything that touches the outside world lives here: the git mirror
//! registry, workspace checkout, job-script discovery and execution,
//! and the subprocess helper they share. The engine depends only on the
//! trait seams; fakes for them ship behind the `test-support` feature.

pub mod git;
pub mod script;
pub mod subprocess;
pub mod workspace;

pub use git::{
    remote_with_credentials, Credentials, GitError, GitMirrors, MirrorRegistry, SnapshotSource,
};
pub use script::{find_job_file, ScriptError, ScriptExecutor, ShellExecutor};
pub use subprocess::{run_with_timeout, SubprocessError, GIT_COMMAND_TIMEOUT, JOB_SCRIPT_TIMEOUT};
pub use workspace::{GitWorkspace, WorkspaceError, WorkspaceProvider};

#[cfg(any(test, feature = "test-support"))]
pub use script::{FakeExecutor, ScriptCall};
#[cfg(any(test, feature = "test-support"))]
pub use workspace::FakeWorkspace;
