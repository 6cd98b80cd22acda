// SPDX-License-Identifier: MIT

//! Mirror refresh pollers: one interval task per tracked repository.

use dmakr_adapters::SnapshotSource;
use dmakr_core::MirrorId;
use dmakr_engine::HeadsHub;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically refresh one mirror and publish its head snapshots.
///
/// The first tick fires immediately, so startup catch-up does not wait
/// a full interval. Refresh failures are logged and retried on the next
/// tick; a failed refresh publishes nothing.
pub async fn poll_mirror<S: SnapshotSource>(
    source: Arc<S>,
    hub: HeadsHub,
    mirror: MirrorId,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match source.refresh(&mirror).await {
            Ok(heads) => {
                tracing::debug!(repo = %mirror.id, heads = heads.heads.len(), "mirror refreshed");
                hub.publish(heads);
            }
            Err(err) => {
                tracing::warn!(repo = %mirror.id, error = %err, "mirror refresh failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
