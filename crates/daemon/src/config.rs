// SPDX-License-Identifier: MIT

//! Environment configuration for the daemon.
//!
//! All configuration is read once at startup and handed to the rest of
//! the process as static, read-only records. Malformed values are fatal
//! before anything starts polling or writing state.

use dmakr_adapters::Credentials;
use dmakr_core::{watched_id, RepoOptions, RuleOptions, GUARD_ID};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JOBS_REPO must be set to the jobs repository url")]
    MissingJobsRepo,
    #[error("invalid {var}: {source}")]
    BadJson {
        var: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unusable repository url in {var}: {url:?}")]
    BadRepoUrl { var: &'static str, url: String },
}

/// Branch lists arrive either as JSON arrays or in the legacy
/// comma-separated string form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BranchList {
    List(Vec<String>),
    Csv(String),
}

impl BranchList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(list) => list,
            Self::Csv(csv) => csv
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Per-repository option overrides as they appear in the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRepoOptions {
    /// Poll interval in seconds.
    interval: Option<u64>,
    default_branch: Option<BranchList>,
    branch_filter: Option<BranchList>,
    user: Option<String>,
    pass: Option<String>,
}

impl RawRepoOptions {
    /// Remote credentials, present only when both halves are set.
    fn credentials(&self) -> Option<Credentials> {
        match (&self.user, &self.pass) {
            (Some(user), Some(pass)) => {
                Some(Credentials { user: user.clone(), pass: pass.clone() })
            }
            _ => None,
        }
    }

    fn apply(self, mut base: RepoOptions) -> RepoOptions {
        if let Some(secs) = self.interval {
            base.interval = Duration::from_secs(secs);
        }
        if let Some(branches) = self.default_branch {
            base.default_branch = branches.into_vec();
        }
        if let Some(filter) = self.branch_filter {
            base.branch_filter = filter.into_vec();
        }
        base
    }
}

/// One tracked repository: where it lives and how to watch it.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub remote_url: String,
    pub credentials: Option<Credentials>,
    pub options: RepoOptions,
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: PathBuf,
    pub guard: RepoConfig,
    /// Watched repositories keyed by role id (`watched.<name>`).
    pub watched: HashMap<String, RepoConfig>,
}

impl Config {
    /// Load configuration from the environment:
    ///
    /// - `DMAKR_DATA_PATH` — working directory (default `.dmakr`)
    /// - `JOBS_REPO` — jobs repository url (required)
    /// - `JOBS_REPO_OPTIONS` — JSON option overrides for the jobs repo
    /// - `WATCHED_REPOS` — JSON map of name to repository url
    /// - `WATCHED_REPOS_OPTIONS` — JSON map of name to option overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_path =
            PathBuf::from(std::env::var("DMAKR_DATA_PATH").unwrap_or_else(|_| ".dmakr".into()));
        let jobs_repo = std::env::var("JOBS_REPO").map_err(|_| ConfigError::MissingJobsRepo)?;
        check_remote("JOBS_REPO", &jobs_repo)?;

        let guard_raw: RawRepoOptions = json_var("JOBS_REPO_OPTIONS")?.unwrap_or_default();
        let watched_urls: HashMap<String, String> = match json_var("WATCHED_REPOS")? {
            Some(urls) => urls,
            None => {
                tracing::warn!("WATCHED_REPOS not set, tracking only the jobs repository");
                HashMap::new()
            }
        };
        let mut watched_raw: HashMap<String, RawRepoOptions> =
            json_var("WATCHED_REPOS_OPTIONS")?.unwrap_or_default();

        let mut watched = HashMap::new();
        for (name, remote_url) in watched_urls {
            check_remote("WATCHED_REPOS", &remote_url)?;
            let raw = watched_raw.remove(&name).unwrap_or_default();
            let credentials = raw.credentials();
            let options = raw.apply(RepoOptions::defaults(false));
            watched.insert(watched_id(&name), RepoConfig { remote_url, credentials, options });
        }

        // The guard's filter admits every branch a watched repository
        // may forward from, so forward selection can find a guard head.
        let guard_credentials = guard_raw.credentials();
        let mut guard_options = guard_raw.apply(RepoOptions::defaults(true));
        for repo in watched.values() {
            for prefix in &repo.options.branch_filter {
                if !guard_options.branch_filter.contains(prefix) {
                    guard_options.branch_filter.push(prefix.clone());
                }
            }
        }

        Ok(Self {
            data_path,
            guard: RepoConfig {
                remote_url: jobs_repo,
                credentials: guard_credentials,
                options: guard_options,
            },
            watched,
        })
    }

    /// Location of the job state database.
    pub fn db_path(&self) -> PathBuf {
        self.data_path.join("dmakr.db.json")
    }

    /// Local mirror location for a repository role: `.mirrors/jobs` for
    /// the guard, `.mirrors/watched/<name>` for watched repositories.
    pub fn mirror_path(&self, role_id: &str) -> PathBuf {
        let mirrors = self.data_path.join(".mirrors");
        match role_id.strip_prefix("watched.") {
            Some(name) => mirrors.join("watched").join(name),
            None => mirrors.join("jobs"),
        }
    }

    /// The rule-relevant option records, keyed by role id.
    pub fn rule_options(&self) -> RuleOptions {
        let mut rules = RuleOptions::default();
        rules.insert(GUARD_ID, self.guard.options.clone());
        for (role_id, repo) in &self.watched {
            rules.insert(role_id.clone(), repo.options.clone());
        }
        rules
    }
}

/// Cheap repository-source sanity check: a URL needs a scheme and a
/// remainder, a local path just needs to be non-empty.
fn check_remote(var: &'static str, url: &str) -> Result<(), ConfigError> {
    let trimmed = url.trim();
    let bad = match trimmed.split_once("://") {
        Some((scheme, rest)) => scheme.is_empty() || rest.is_empty(),
        None => trimmed.is_empty(),
    };
    if bad {
        return Err(ConfigError::BadRepoUrl { var, url: url.to_string() });
    }
    Ok(())
}

fn json_var<T: DeserializeOwned>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => {
            serde_json::from_str(&raw).map(Some).map_err(|source| ConfigError::BadJson { var, source })
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
