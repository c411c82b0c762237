//! Deterministic cohort assignment

use concord_core::Cohort;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Number of buckets callers are hashed into
pub const BUCKETS: u64 = 100;

/// First 8 bytes of SHA-256 over the caller id, big-endian
pub fn stable_hash(caller_id: &str) -> u64 {
    let digest = Sha256::digest(caller_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Bucket in [0, 100) for a caller
pub fn bucket(caller_id: &str) -> u8 {
    (stable_hash(caller_id) % BUCKETS) as u8
}

/// Cohort for a caller at a rollout percentage.
///
/// A caller in the new cohort at some percentage stays there at every
/// higher percentage.
pub fn assign_cohort(caller_id: &str, percentage: u8) -> Cohort {
    if bucket(caller_id) < percentage {
        Cohort::New
    } else {
        Cohort::Legacy
    }
}

enum Lookup {
    Hit(Cohort),
    /// Entry computed under an older stage version
    Stale,
    Miss,
}

/// Per-caller cohort cache keyed by stage version.
///
/// Entries from an older version are recomputed on access, so a stage
/// change never serves an outdated cohort.
pub struct CohortCache {
    entries: Mutex<HashMap<String, (u64, Cohort)>>,
    capacity: usize,
}

impl CohortCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Cached cohort for `caller_id`, computing it when missing or stale
    pub fn get_or_assign(&self, caller_id: &str, stage_version: u64, percentage: u8) -> Cohort {
        let mut entries = self.entries.lock();

        let lookup = match entries.get(caller_id) {
            Some(&(version, cohort)) if version == stage_version => Lookup::Hit(cohort),
            Some(_) => Lookup::Stale,
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(cohort) => return cohort,
            Lookup::Stale => debug!(caller_id, stage_version, "Recomputing stale cohort"),
            Lookup::Miss => {}
        }

        let cohort = assign_cohort(caller_id, percentage);
        if entries.len() >= self.capacity && !entries.contains_key(caller_id) {
            entries.retain(|_, (version, _)| *version == stage_version);
            if entries.len() >= self.capacity {
                entries.clear();
            }
        }
        entries.insert(caller_id.to_string(), (stage_version, cohort));
        cohort
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for CohortCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}
