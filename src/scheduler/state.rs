// src/scheduler/state.rs

//! Profile snapshot persisted between runs.
//!
//! ```json
//! {
//!   "resources": { "w1": { "implementations": { "compute.default": { ... } } } },
//!   "implementations": { "compute.default": { "execCount": 3, "minTime": 10, "maxTime": 30, "avgTime": 20 } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::Result;
use crate::scheduler::profile::{Profile, ProfileRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfiles {
    #[serde(default)]
    pub implementations: BTreeMap<String, ProfileRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStore {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceProfiles>,
    #[serde(default)]
    pub implementations: BTreeMap<String, ProfileRecord>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a snapshot; a missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "profile snapshot not found; starting without history");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let store: ProfileStore = serde_json::from_str(&contents)?;
        info!(
            path = %path.display(),
            resources = store.resources.len(),
            implementations = store.implementations.len(),
            "loaded profile snapshot"
        );
        Ok(store)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = %path.display(), "wrote profile snapshot");
        Ok(())
    }

    /// Starting profiles for a worker.
    ///
    /// The worker's own history wins; otherwise the global average of the
    /// implementation is used as an estimate without execution history.
    pub fn seed_for(&self, worker: &str, signatures: &[Vec<String>]) -> Vec<Vec<Profile>> {
        let own = self.resources.get(worker);
        signatures
            .iter()
            .map(|impls| {
                impls
                    .iter()
                    .map(|sig| {
                        if let Some(record) = own.and_then(|r| r.implementations.get(sig)) {
                            Profile::from(*record)
                        } else if let Some(record) = self.implementations.get(sig) {
                            Profile::from(*record).as_estimate()
                        } else {
                            Profile::default()
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Overwrite a worker's entry with its current profiles.
    pub fn record_resource(&mut self, worker: &str, signatures: &[Vec<String>], profiles: &[Vec<Profile>]) {
        let entry = self.resources.entry(worker.to_string()).or_default();
        for (sig, profile) in zip_table(signatures, profiles) {
            entry.implementations.insert(sig.clone(), profile.to_record());
        }
    }

    /// Add this session's runs to the global implementation entries.
    pub fn accumulate_implementations(&mut self, signatures: &[Vec<String>], session: &[Vec<Profile>]) {
        for (sig, profile) in zip_table(signatures, session) {
            if profile.executions() == 0 {
                continue;
            }
            let mut merged = self
                .implementations
                .get(sig)
                .map(|r| Profile::from(*r))
                .unwrap_or_default();
            merged.accumulate(profile);
            self.implementations.insert(sig.clone(), merged.to_record());
        }
    }
}

fn zip_table<'a>(
    signatures: &'a [Vec<String>],
    profiles: &'a [Vec<Profile>],
) -> impl Iterator<Item = (&'a String, &'a Profile)> {
    signatures
        .iter()
        .zip(profiles)
        .flat_map(|(sigs, row)| sigs.iter().zip(row))
}
