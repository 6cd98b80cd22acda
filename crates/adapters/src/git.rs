// SPDX-License-Identifier: MIT

//! Git mirror management: bare mirror clones, refresh, and head scans.
//!
//! The registry is an explicit value owned by the daemon and handed by
//! reference into the pollers — there is no ambient global repository
//! table.

use crate::subprocess::{run_with_timeout, SubprocessError, GIT_COMMAND_TIMEOUT};
use async_trait::async_trait;
use dmakr_core::{BranchHeads, CommitInfo, MirrorId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// Errors from mirror operations.
#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("io error for mirror {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed for {id}: {stderr}")]
    Command { id: String, command: String, stderr: String },
    #[error("unknown mirror id: {0}")]
    UnknownMirror(String),
}

/// Optional credentials embedded into a remote URL's userinfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

/// Embed credentials into a remote URL. Sources that are not URLs
/// (local paths) pass through untouched.
pub fn remote_with_credentials(remote_url: &str, credentials: Option<&Credentials>) -> String {
    let Some(creds) = credentials else {
        return remote_url.to_string();
    };
    let Some((scheme, rest)) = remote_url.split_once("://") else {
        return remote_url.to_string();
    };
    // Strip any userinfo already present in the source URL.
    let host = rest.split_once('@').map_or(rest, |(_, host)| host);
    format!(
        "{scheme}://{}:{}@{host}",
        percent_encode_userinfo(&creds.user),
        percent_encode_userinfo(&creds.pass)
    )
}

/// Percent-encode a userinfo component (RFC 3986 unreserved set plus
/// sub-delims stay literal).
fn percent_encode_userinfo(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

/// Mirror locations keyed by role id.
#[derive(Debug, Default, Clone)]
pub struct MirrorRegistry {
    mirrors: HashMap<String, PathBuf>,
}

impl MirrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) {
        self.mirrors.insert(id.into(), path.into());
    }

    pub fn path(&self, id: &str) -> Result<&Path, GitError> {
        self.mirrors
            .get(id)
            .map(PathBuf::as_path)
            .ok_or_else(|| GitError::UnknownMirror(id.to_string()))
    }
}

/// Refresh-and-scan source of branch-head snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Refresh the mirror from its remote and scan the branch heads.
    async fn refresh(&self, git_id: &MirrorId) -> Result<BranchHeads, GitError>;
}

/// Git-CLI implementation of mirror management.
pub struct GitMirrors {
    registry: MirrorRegistry,
}

impl GitMirrors {
    pub fn new(registry: MirrorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MirrorRegistry {
        &self.registry
    }

    /// Ensure a valid bare mirror clone of `remote_url` exists at
    /// `mirror_path`, repairing (remove and re-clone) anything that is
    /// missing, not bare, or pointing at the wrong remote.
    pub async fn ensure_mirror(
        id: &str,
        mirror_path: &Path,
        remote_url: &str,
    ) -> Result<(), GitError> {
        match validate_mirror(mirror_path, remote_url).await {
            Ok(()) => return Ok(()),
            Err(reason) => {
                tracing::info!(id, mirror = %mirror_path.display(), %reason, "repairing mirror");
            }
        }

        if mirror_path.exists() {
            tokio::fs::remove_dir_all(mirror_path)
                .await
                .map_err(|source| GitError::Io { id: id.to_string(), source })?;
        }
        if let Some(parent) = mirror_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| GitError::Io { id: id.to_string(), source })?;
        }

        let mut cmd = Command::new("git");
        cmd.args(["clone", "--mirror", remote_url])
            .arg(mirror_path)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git clone --mirror").await?;
        if !output.status.success() {
            return Err(GitError::Command {
                id: id.to_string(),
                command: "git clone --mirror".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Mirror identity used by workspace fetches.
        for (key, value) in [
            ("user.name", "Mirror Dmakr"),
            ("user.email", "dmakr@only.local"),
            ("uploadpack.allowAnySHA1InWant", "true"),
        ] {
            let mut cmd = Command::new("git");
            cmd.args(["-C"]).arg(mirror_path).args(["config", key, value]);
            run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git config").await?;
        }

        tracing::info!(id, mirror = %mirror_path.display(), "mirror repaired");
        Ok(())
    }

    /// Run `git remote update --prune` in the mirror.
    pub async fn update_mirror(&self, git_id: &MirrorId) -> Result<(), GitError> {
        let path = self.registry.path(&git_id.id)?;
        let mut cmd = Command::new("git");
        cmd.args(["-C"]).arg(path).args(["remote", "update", "--prune"]);
        let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git remote update").await?;
        if !output.status.success() {
            return Err(GitError::Command {
                id: git_id.id.clone(),
                command: "git remote update --prune".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Scan branch heads in ref order: name, commit id, subject, and
    /// any tags pointing at the head commit.
    pub async fn scan_mirror(&self, git_id: &MirrorId) -> Result<Vec<CommitInfo>, GitError> {
        let path = self.registry.path(&git_id.id)?;
        let mut cmd = Command::new("git");
        cmd.args(["-C"]).arg(path).args([
            "for-each-ref",
            "refs/heads",
            "--format=%(refname:short)%09%(objectname)%09%(subject)",
        ]);
        let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git for-each-ref").await?;
        if !output.status.success() {
            return Err(GitError::Command {
                id: git_id.id.clone(),
                command: "git for-each-ref".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let mut heads = Vec::new();
        for line in listing.lines() {
            let mut fields = line.splitn(3, '\t');
            let (Some(branch), Some(commit_id)) = (fields.next(), fields.next()) else {
                continue;
            };
            let message = fields.next().unwrap_or_default();
            let tags = self.tags_at(&git_id.id, path, commit_id).await?;
            heads.push(
                CommitInfo::new(branch, commit_id).with_message(message).with_tags(tags),
            );
        }
        Ok(heads)
    }

    async fn tags_at(
        &self,
        id: &str,
        mirror: &Path,
        commit_id: &str,
    ) -> Result<Vec<String>, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(["-C"]).arg(mirror).args(["tag", "--points-at", commit_id]);
        let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git tag --points-at").await?;
        if !output.status.success() {
            return Err(GitError::Command {
                id: id.to_string(),
                command: "git tag --points-at".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl SnapshotSource for GitMirrors {
    async fn refresh(&self, git_id: &MirrorId) -> Result<BranchHeads, GitError> {
        self.update_mirror(git_id).await?;
        let heads = self.scan_mirror(git_id).await?;
        Ok(BranchHeads::new(git_id.clone(), heads))
    }
}

/// Check that `mirror_path` holds a bare mirror of `remote_url`.
async fn validate_mirror(mirror_path: &Path, remote_url: &str) -> Result<(), String> {
    if !mirror_path.exists() {
        return Err("no mirror directory".to_string());
    }

    let mut cmd = Command::new("git");
    cmd.args(["-C"]).arg(mirror_path).args(["rev-parse", "--is-bare-repository"]);
    let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git rev-parse")
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() || String::from_utf8_lossy(&output.stdout).trim() != "true" {
        return Err("not a bare repository".to_string());
    }

    let mut cmd = Command::new("git");
    cmd.args(["-C"]).arg(mirror_path).args(["remote", "get-url", "origin"]);
    let output = run_with_timeout(cmd, GIT_COMMAND_TIMEOUT, "git remote get-url")
        .await
        .map_err(|e| e.to_string())?;
    let configured = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || configured != remote_url {
        return Err(format!("remote mismatch: {configured}"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
