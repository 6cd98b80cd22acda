// SPDX-License-Identifier: MIT

//! Job kinds, statuses, and the events that drive the job lifecycle.
//!
//! Job kinds compose as colon-joined strings, matching the keys stored
//! in the per-commit jobs map: `prepare`, `automatic`,
//! `prepare:indirectly`, `prepare:forward`, `prepare:indirectly:forward`.

use crate::mirror::{CommitInfo, MirrorId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The two job stages of the lifecycle. Prepare runs first per commit;
/// automatic runs after a prepare-family job finishes while the commit
/// is still its branch's head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Prepare,
    Automatic,
}

crate::simple_display! {
    JobStage {
        Prepare => "prepare",
        Automatic => "automatic",
    }
}

/// A concrete job type: a stage plus the indirect/forward markers that
/// record how the job was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct JobKind {
    pub stage: JobStage,
    /// Triggered on behalf of a guard-repository parent event.
    pub indirect: bool,
    /// Delegated to the guard repository by a `forward` status.
    pub forwarded: bool,
}

impl JobKind {
    pub const PREPARE: JobKind = JobKind { stage: JobStage::Prepare, indirect: false, forwarded: false };
    pub const AUTOMATIC: JobKind =
        JobKind { stage: JobStage::Automatic, indirect: false, forwarded: false };

    /// Prepare kind carrying the indirect marker.
    pub fn indirect_prepare() -> Self {
        JobKind { stage: JobStage::Prepare, indirect: true, forwarded: false }
    }

    /// The same kind with the `:forward` marker appended. Used when a
    /// runner delegates the job to the guard repository.
    pub fn with_forwarded(self) -> Self {
        JobKind { forwarded: true, ..self }
    }

    /// Base stage name used for job-script resolution
    /// (`{id}.{base}.sh`), i.e. the kind string before the first `:`.
    pub fn base(&self) -> &'static str {
        match self.stage {
            JobStage::Prepare => "prepare",
            JobStage::Automatic => "automatic",
        }
    }

    /// Whether this kind belongs to the prepare family
    /// (`prepare`, `prepare:forward`, `prepare:indirectly`, ...).
    pub fn is_prepare_family(&self) -> bool {
        self.stage == JobStage::Prepare
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stage)?;
        if self.indirect {
            write!(f, ":indirectly")?;
        }
        if self.forwarded {
            write!(f, ":forward")?;
        }
        Ok(())
    }
}

/// Error parsing a job-kind string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown job kind: {0}")]
pub struct ParseJobKindError(pub String);

impl FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let stage = match parts.next() {
            Some("prepare") => JobStage::Prepare,
            Some("automatic") => JobStage::Automatic,
            _ => return Err(ParseJobKindError(s.to_string())),
        };
        let mut kind = JobKind { stage, indirect: false, forwarded: false };
        for marker in parts {
            match marker {
                "indirectly" if !kind.indirect && !kind.forwarded => kind.indirect = true,
                "forward" if !kind.forwarded => kind.forwarded = true,
                _ => return Err(ParseJobKindError(s.to_string())),
            }
        }
        Ok(kind)
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for JobKind {
    type Error = ParseJobKindError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Status of one job entry in the per-commit jobs map.
///
/// `unset → running → {finished, error, finished:skipped,
/// finished:noJobFile, forward}`; `forward` is non-terminal — it is
/// itself the trigger for the forward policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "error")]
    Error,
    /// No job script found; delegate execution to the guard repository.
    #[serde(rename = "forward")]
    Forward,
    /// No job script found; nothing to run.
    #[serde(rename = "finished:skipped")]
    FinishedSkipped,
    /// Forwarded job found no script in the guard repository either.
    #[serde(rename = "finished:noJobFile")]
    FinishedNoJobFile,
}

crate::simple_display! {
    JobStatus {
        Running => "running",
        Finished => "finished",
        Error => "error",
        Forward => "forward",
        FinishedSkipped => "finished:skipped",
        FinishedNoJobFile => "finished:noJobFile",
    }
}

/// One entry of the jobs map: the current status for a `(branch, kind)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
}

/// Per-commit jobs map: branch → job-kind string → record.
///
/// `BTreeMap` keeps the serialized form canonical, so content
/// fingerprints are stable across merges.
pub type JobsMap = BTreeMap<String, BTreeMap<String, JobRecord>>;

/// A unit of work emitted by the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(rename = "gitId")]
    pub git_id: MirrorId,
    pub commit: CommitInfo,
    /// For forwarded jobs: the status transition that delegated here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ModifyJobState>,
    /// For indirect jobs: the triggering event on the parent repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<JobEvent>>,
}

impl JobEvent {
    pub fn new(kind: JobKind, git_id: MirrorId, commit: CommitInfo) -> Self {
        Self { kind, git_id, commit, source: None, parent: None }
    }

    pub fn with_source(mut self, source: ModifyJobState) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_parent(mut self, parent: JobEvent) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }
}

/// A requested status transition for one `(repo, commit, branch, kind)` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyJobState {
    #[serde(rename = "gitId")]
    pub git_id: MirrorId,
    #[serde(rename = "commitId")]
    pub commit_id: String,
    pub branch: String,
    pub job: JobKind,
    pub status: JobStatus,
}

impl ModifyJobState {
    /// Transition for a job event's own `(branch, commit, kind)` slot.
    pub fn for_event(event: &JobEvent, status: JobStatus) -> Self {
        Self {
            git_id: event.git_id.clone(),
            commit_id: event.commit.commit_id.clone(),
            branch: event.commit.branch.clone(),
            job: event.kind,
            status,
        }
    }
}

/// Notification emitted after an effective (non-no-op) state write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateChanged {
    pub trigger: ModifyJobState,
    /// The merged jobs map after the write.
    pub state: JobsMap,
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
