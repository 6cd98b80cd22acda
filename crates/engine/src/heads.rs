// SPDX-License-Identifier: MIT

//! Shared head-snapshot state.
//!
//! Pollers publish every snapshot here; policies read the latest value
//! per repository at trigger time instead of joining streams. A lossy
//! broadcast channel fans the raw snapshots out to the pipelines.

use std::collections::HashMap;
use std::sync::Arc;

use dmakr_core::BranchHeads;
use parking_lot::Mutex;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

/// Latest head snapshot per repository plus a broadcast bus of updates.
#[derive(Clone)]
pub struct HeadsHub {
    latest: Arc<Mutex<HashMap<String, BranchHeads>>>,
    bus: broadcast::Sender<BranchHeads>,
}

impl Default for HeadsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadsHub {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self { latest: Arc::new(Mutex::new(HashMap::new())), bus }
    }

    /// Records `heads` as the latest snapshot for its repository and
    /// broadcasts it. Publishing never blocks; slow subscribers lag.
    pub fn publish(&self, heads: BranchHeads) {
        self.latest.lock().insert(heads.git_id.id.clone(), heads.clone());
        let _ = self.bus.send(heads);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BranchHeads> {
        self.bus.subscribe()
    }

    /// Latest snapshot for `repo_id`, if one has been published yet.
    pub fn latest(&self, repo_id: &str) -> Option<BranchHeads> {
        self.latest.lock().get(repo_id).cloned()
    }
}

#[cfg(test)]
#[path = "heads_tests.rs"]
mod tests;
