// src/data.rs

//! Narrow interface to the data-location subsystem.
//!
//! The scheduler core never touches this; the runtime shell resolves inputs
//! before asking a backend to transfer them, and registers outputs once a
//! job finished.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// A logical datum at a given version.
///
/// Version `0` denotes data that exists before the application starts (for
/// example an input file); every task writing a name bumps its version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DataKey {
    pub name: String,
    pub version: u32,
}

impl DataKey {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#v{}", self.name, self.version)
    }
}

/// Everything known about one datum version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalData {
    pub locations: BTreeSet<String>,
    pub value: Option<String>,
}

impl LogicalData {
    pub fn is_available(&self) -> bool {
        !self.locations.is_empty() || self.value.is_some()
    }
}

/// Registration is idempotent per `(name, version)`: registering the same
/// location twice is a no-op and reports `false`.
pub trait DataRegistry: Send + Sync {
    fn register_location(&self, data: &DataKey, location: &str) -> bool;

    fn register_value(&self, data: &DataKey, value: String) -> bool;

    fn get_data(&self, data: &DataKey) -> Option<LogicalData>;
}

#[derive(Debug, Default)]
pub struct InMemoryDataRegistry {
    entries: Mutex<HashMap<DataKey, LogicalData>>,
}

impl InMemoryDataRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataRegistry for InMemoryDataRegistry {
    fn register_location(&self, data: &DataKey, location: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(data.clone())
            .or_default()
            .locations
            .insert(location.to_string())
    }

    fn register_value(&self, data: &DataKey, value: String) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(data.clone()).or_default();
        if entry.value.as_ref() == Some(&value) {
            return false;
        }
        entry.value = Some(value);
        true
    }

    fn get_data(&self, data: &DataKey) -> Option<LogicalData> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(data).cloned()
    }
}
