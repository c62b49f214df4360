//! Durable snapshot of the host registry.
//!
//! The on-disk layout is a JSON document keyed by group name, each value a
//! map from address string to display name, plus a schema version for
//! forward compatibility. Before every overwrite the previous snapshot is
//! copied to a fixed sibling backup path (single generation), and the new
//! snapshot lands via temp file + rename so a failed write never corrupts
//! the previous one.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Group name → (address string → display name).
pub type GroupHosts = BTreeMap<String, BTreeMap<String, String>>;

const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    groups: &'a GroupHosts,
}

#[derive(Deserialize)]
struct SnapshotFile {
    #[serde(default = "schema_version")]
    #[allow(dead_code)]
    version: u32,
    groups: GroupHosts,
}

/// File-backed store for the grouped host map.
pub struct HostStore {
    path: PathBuf,
}

impl HostStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fixed sibling path the previous snapshot is copied to on save.
    pub fn backup_path(&self) -> PathBuf {
        let stem = self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("hosts");
        self.path.with_file_name(format!("{stem}_backup.json"))
    }

    /// Load the persisted snapshot and union it into `seeds`.
    ///
    /// Persisted entries win on conflicting addresses. Only groups present
    /// in the seed set are merged; a missing or malformed file degrades to
    /// the seeds alone — never a fatal error.
    pub fn load(&self, seeds: GroupHosts) -> GroupHosts {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted snapshot, using seed hosts");
                return seeds;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot unreadable, using seed hosts");
                return seeds;
            }
        };

        let file: SnapshotFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot malformed, using seed hosts");
                return seeds;
            }
        };

        let mut merged = seeds;
        for (group, persisted) in file.groups {
            if let Some(hosts) = merged.get_mut(&group) {
                hosts.extend(persisted);
            }
        }
        info!(path = %self.path.display(), "host snapshot loaded");
        merged
    }

    /// Write the full host map, backing up the prior snapshot first.
    pub fn save(&self, groups: &GroupHosts) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let raw = serde_json::to_string_pretty(&SnapshotRef { version: SCHEMA_VERSION, groups })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "host snapshot written");
        Ok(())
    }
}
