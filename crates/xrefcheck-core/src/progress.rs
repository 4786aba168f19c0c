//! Thread-safe verification progress counters.
//!
//! The verifier publishes into a shared [`VerifyProgress`]; a display layer
//! samples it at its own pace. Counters only grow, so a sample is always a
//! consistent lower bound of the real state and merging two snapshots is a
//! field-wise max.

use std::sync::{Arc, Mutex};

/// Monotonic counter for one family of checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
    pub errors: u64,
    /// Logical timestamp bumped on every mutation.
    pub task_timestamp: u64,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn incr_done(&mut self) {
        self.done += 1;
        self.task_timestamp += 1;
    }

    pub fn incr_errors(&mut self) {
        self.errors += 1;
        self.task_timestamp += 1;
    }

    pub fn incr_total(&mut self) {
        self.total += 1;
        self.task_timestamp += 1;
    }

    pub fn add_done(&mut self, n: u64) {
        self.done += n;
        self.task_timestamp += 1;
    }

    pub fn add_errors(&mut self, n: u64) {
        self.errors += n;
        self.task_timestamp += 1;
    }

    /// Field-wise max of two snapshots.
    pub fn merge_max(self, other: Self) -> Self {
        Self {
            done: self.done.max(other.done),
            total: self.total.max(other.total),
            errors: self.errors.max(other.errors),
            task_timestamp: self.task_timestamp.max(other.task_timestamp),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.done >= self.total
    }
}

/// Progress of one verification run, split by check family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerifyProgress {
    pub local: Progress,
    pub external: Progress,
    /// External probes currently stuck in a rate-limit retry loop. `total`
    /// counts probes that ever hit a 429, `done` those that resolved.
    pub external_fixable: Progress,
}

impl VerifyProgress {
    pub fn new(local_total: u64, external_total: u64) -> Self {
        Self {
            local: Progress::new(local_total),
            external: Progress::new(external_total),
            external_fixable: Progress::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.local.is_finished() && self.external.is_finished()
    }
}

/// Shared handle the verifier mutates and displays sample.
pub type SharedProgress = Arc<Mutex<VerifyProgress>>;

/// Create a shared progress handle with known totals.
pub fn shared(local_total: u64, external_total: u64) -> SharedProgress {
    Arc::new(Mutex::new(VerifyProgress::new(local_total, external_total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let mut p = Progress::new(3);
        p.incr_done();
        p.incr_errors();
        p.incr_done();
        assert_eq!(p.done, 2);
        assert_eq!(p.errors, 1);
        assert_eq!(p.task_timestamp, 3);
        assert!(!p.is_finished());
        p.incr_done();
        assert!(p.is_finished());
    }

    #[test]
    fn merge_takes_the_max_per_field() {
        let a = Progress {
            done: 5,
            total: 10,
            errors: 0,
            task_timestamp: 7,
        };
        let b = Progress {
            done: 3,
            total: 10,
            errors: 2,
            task_timestamp: 6,
        };
        let merged = a.merge_max(b);
        assert_eq!(merged.done, 5);
        assert_eq!(merged.errors, 2);
        assert_eq!(merged.task_timestamp, 7);
    }
}
