// SPDX-License-Identifier: MIT

//! Daemon startup, supervision, and shutdown.
//!
//! Startup order: state store, mirror validation/repair, pipelines,
//! pollers. A pipeline error is fatal; SIGINT/SIGTERM drain cleanly.

use crate::config::Config;
use crate::poller;
use dmakr_adapters::{
    remote_with_credentials, GitError, GitMirrors, GitWorkspace, MirrorRegistry, ShellExecutor,
};
use dmakr_core::{MirrorId, MirrorIds, GUARD_ID};
use dmakr_engine::{spawn_pipelines, EngineDeps, HeadsHub, PipelineError, Runner};
use dmakr_storage::{JobStateStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors that terminate the daemon.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run the daemon until shutdown or a fatal pipeline error.
pub async fn run(config: Config) -> Result<(), LifecycleError> {
    tokio::fs::create_dir_all(&config.data_path).await?;
    let store = Arc::new(JobStateStore::open(config.db_path())?);

    // Every mirror is validated or repaired before anything polls.
    // A repository that cannot be cloned means broken configuration.
    let mut registry = MirrorRegistry::new();
    let mut repos = vec![(GUARD_ID.to_string(), &config.guard)];
    repos.extend(config.watched.iter().map(|(id, repo)| (id.clone(), repo)));
    for (role_id, repo) in repos {
        let remote = remote_with_credentials(&repo.remote_url, repo.credentials.as_ref());
        let mirror_path = config.mirror_path(&role_id);
        GitMirrors::ensure_mirror(&role_id, &mirror_path, &remote).await?;
        registry.insert(role_id, mirror_path);
    }

    let mirror_id =
        |role_id: &str| MirrorId::new(role_id, config.mirror_path(role_id).to_string_lossy());
    let mirrors = MirrorIds {
        guard: mirror_id(GUARD_ID),
        watched: config.watched.keys().map(|id| (id.clone(), mirror_id(id))).collect(),
    };

    let git = Arc::new(GitMirrors::new(registry));
    let hub = HeadsHub::new();
    let rules = config.rule_options();
    let runner = Arc::new(Runner::new(
        store.clone(),
        GitWorkspace::new(&config.data_path),
        ShellExecutor::new(),
        config.watched.len(),
    ));

    let cancel = CancellationToken::new();
    let deps = EngineDeps {
        store,
        heads: hub.clone(),
        mirrors: mirrors.clone(),
        rules: rules.clone(),
    };
    let mut pipelines = spawn_pipelines(deps, runner, cancel.clone());

    let mut pollers = JoinSet::new();
    for repo in mirrors.iter() {
        let interval = rules
            .get(&repo.id)
            .map(|options| options.interval)
            .unwrap_or(Duration::from_secs(40));
        pollers.spawn(poller::poll_mirror(
            git.clone(),
            hub.clone(),
            repo.clone(),
            interval,
            cancel.clone(),
        ));
    }

    info!(
        watched = config.watched.len(),
        data = %config.data_path.display(),
        "dmakr daemon running"
    );

    let result = supervise(&mut pipelines).await;

    cancel.cancel();
    while pipelines.join_next().await.is_some() {}
    pollers.shutdown().await;
    info!("dmakr daemon stopped");
    result
}

/// Wait for a shutdown signal or the first pipeline failure.
async fn supervise(
    pipelines: &mut JoinSet<Result<(), PipelineError>>,
) -> Result<(), LifecycleError> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("interrupt received, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("terminate received, shutting down");
                return Ok(());
            }
            joined = pipelines.join_next() => match joined {
                Some(Ok(Ok(()))) => continue,
                Some(Ok(Err(err))) => return Err(err.into()),
                Some(Err(err)) => return Err(err.into()),
                None => return Ok(()),
            },
        }
    }
}
