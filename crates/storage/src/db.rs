// SPDX-License-Identifier: MIT

//! Single-file JSON persistence for the job state store.
//!
//! The whole document map is written on every effective change. Volumes
//! here are small (one document per observed commit), so a rewrite per
//! write keeps recovery trivial: the file on disk is always a complete,
//! parseable snapshot.

use crate::doc::PersistedJobDoc;
use crate::store::StoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// repository id → commit id → document.
pub type DocMap = BTreeMap<String, BTreeMap<String, PersistedJobDoc>>;

/// JSON file backing for the store.
#[derive(Debug)]
pub struct JsonDb {
    path: PathBuf,
}

impl JsonDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted document map; a missing file is an empty map.
    pub fn load(&self) -> Result<DocMap, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no job state file, starting empty");
                Ok(DocMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the document map. Written to a sibling temp file first so
    /// a crash mid-write never leaves a truncated state file behind.
    pub fn save(&self, docs: &DocMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(docs)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
