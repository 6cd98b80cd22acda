// SPDX-License-Identifier: MIT

//! Per-repository rule options, supplied read-only at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default fallback branches, highest priority first.
pub fn default_branches() -> Vec<String> {
    vec!["main".into(), "master".into()]
}

/// Default branch-name filter prefixes.
pub fn default_branch_filter() -> Vec<String> {
    vec![
        "master".into(),
        "main".into(),
        "feature/".into(),
        "release/".into(),
        "production".into(),
    ]
}

/// Options attached to one tracked repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOptions {
    /// Mirror refresh interval.
    pub interval: Duration,
    /// Fallback branches for forward/indirect selection, ordered by priority.
    pub default_branch: Vec<String>,
    /// Branch-name prefixes admitted by the diff engine.
    pub branch_filter: Vec<String>,
}

impl RepoOptions {
    /// Defaults for the given role: the guard polls more often than
    /// watched repositories.
    pub fn defaults(is_guard: bool) -> Self {
        Self {
            interval: Duration::from_secs(if is_guard { 30 } else { 40 }),
            default_branch: default_branches(),
            branch_filter: default_branch_filter(),
        }
    }
}

/// The rule-relevant subset of [`RepoOptions`], keyed by role id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    options: HashMap<String, RepoOptions>,
}

impl RuleOptions {
    pub fn new(options: HashMap<String, RepoOptions>) -> Self {
        Self { options }
    }

    pub fn insert(&mut self, repo_id: impl Into<String>, options: RepoOptions) {
        self.options.insert(repo_id.into(), options);
    }

    pub fn get(&self, repo_id: &str) -> Option<&RepoOptions> {
        self.options.get(repo_id)
    }

    /// Branch filter for a role; missing roles admit nothing.
    pub fn branch_filter(&self, repo_id: &str) -> Vec<String> {
        self.options.get(repo_id).map(|o| o.branch_filter.clone()).unwrap_or_default()
    }

    /// Fallback branches for a role; missing roles fall back to the
    /// built-in defaults.
    pub fn default_branch(&self, repo_id: &str) -> Vec<String> {
        self.options.get(repo_id).map(|o| o.default_branch.clone()).unwrap_or_else(default_branches)
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
