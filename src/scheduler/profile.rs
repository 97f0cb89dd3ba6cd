// src/scheduler/profile.rs

use serde::{Deserialize, Serialize};

/// Average reported for an implementation nobody has timed yet.
pub const DEFAULT_AVERAGE_MS: u64 = 100;

/// Execution-time statistics of one (core, implementation) pair, in
/// milliseconds.
///
/// The average is derived from `total_time / executions`; when nothing has
/// been recorded the `estimate` (loaded from a previous run, or
/// [`DEFAULT_AVERAGE_MS`]) stands in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    executions: u64,
    min_time: u64,
    max_time: u64,
    total_time: u64,
    estimate: u64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            executions: 0,
            min_time: u64::MAX,
            max_time: 0,
            total_time: 0,
            estimate: DEFAULT_AVERAGE_MS,
        }
    }
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile of a single run that took `elapsed_ms`.
    pub fn single(elapsed_ms: u64) -> Self {
        Self {
            executions: 1,
            min_time: elapsed_ms,
            max_time: elapsed_ms,
            total_time: elapsed_ms,
            estimate: DEFAULT_AVERAGE_MS,
        }
    }

    /// Empty profile that still predicts `average_ms` per run.
    pub fn with_estimate(average_ms: u64) -> Self {
        Self {
            estimate: average_ms,
            ..Self::default()
        }
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn min_time(&self) -> u64 {
        self.min_time
    }

    pub fn max_time(&self) -> u64 {
        self.max_time
    }

    pub fn total_time(&self) -> u64 {
        self.total_time
    }

    pub fn average_time(&self) -> u64 {
        if self.executions == 0 {
            self.estimate
        } else {
            self.total_time / self.executions
        }
    }

    /// Fold `other` into `self`.
    ///
    /// Counts and totals add up, min/max combine; an empty `other` is the
    /// identity, so the operation is associative and commutative on count,
    /// min and max.
    pub fn accumulate(&mut self, other: &Profile) {
        if other.executions == 0 {
            return;
        }
        if self.executions == 0 {
            self.min_time = other.min_time;
            self.max_time = other.max_time;
        } else {
            self.min_time = self.min_time.min(other.min_time);
            self.max_time = self.max_time.max(other.max_time);
        }
        self.executions = self.executions.saturating_add(other.executions);
        self.total_time = self.total_time.saturating_add(other.total_time);
    }

    /// Same profile with the execution history dropped but the average kept
    /// as an estimate. Used to seed a worker from global statistics.
    pub fn as_estimate(&self) -> Profile {
        Profile::with_estimate(self.average_time())
    }

    pub fn to_record(&self) -> ProfileRecord {
        ProfileRecord {
            exec_count: self.executions,
            min_time: self.min_time,
            max_time: self.max_time,
            avg_time: self.average_time(),
        }
    }
}

/// Persisted form of a [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub exec_count: u64,
    pub min_time: u64,
    pub max_time: u64,
    pub avg_time: u64,
}

impl From<ProfileRecord> for Profile {
    fn from(record: ProfileRecord) -> Self {
        if record.exec_count == 0 {
            return Profile {
                min_time: record.min_time,
                max_time: record.max_time,
                ..Profile::with_estimate(record.avg_time)
            };
        }
        Profile {
            executions: record.exec_count,
            min_time: record.min_time,
            max_time: record.max_time,
            total_time: record.avg_time.saturating_mul(record.exec_count),
            estimate: record.avg_time,
        }
    }
}

impl From<&Profile> for ProfileRecord {
    fn from(profile: &Profile) -> Self {
        profile.to_record()
    }
}
