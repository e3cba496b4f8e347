//! Dedup Guard: decides whether the latest reading is new information.
//!
//! A sample is new when no sample in the window *as it stood before this
//! tick* shares its identity key, and its key is not in the guard's own
//! bounded memory of accepted keys. The memory covers samples that have
//! already scrolled out of the display window. Keys that age out of the
//! memory fall back to the window check alone.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::DedupConfig;
use crate::sample::{IdentityKey, Sample, SampleTime};
use crate::window::Window;

#[derive(Debug, Clone)]
pub struct DedupGuard {
    retention: TimeDelta,
    max_undated: usize,
    /// Accepted dated instants per camera. Each camera ages out against its
    /// own newest instant, so a skewed clock on one camera never evicts
    /// another camera's keys.
    dated: HashMap<String, BTreeSet<DateTime<Utc>>>,
    undated: VecDeque<IdentityKey>,
    undated_index: HashSet<IdentityKey>,
}

impl DedupGuard {
    pub fn new(cfg: &DedupConfig) -> Self {
        // TimeDelta is bounded by i64 milliseconds
        let secs = cfg.retention_secs.min(i64::MAX as u64 / 1000) as i64;
        Self {
            retention: TimeDelta::seconds(secs),
            max_undated: cfg.max_undated_keys,
            dated: HashMap::new(),
            undated: VecDeque::new(),
            undated_index: HashSet::new(),
        }
    }

    /// Pure window check: `sample` is new iff `prior` holds no sample with
    /// the same identity key.
    ///
    /// `prior` must be the window from before the current tick's
    /// replacement; the post-replacement window always contains `sample`.
    pub fn is_new(sample: &Sample, prior: &Window) -> bool {
        !prior.contains(&sample.identity())
    }

    /// Check `sample` against `prior` and the accepted-key memory, and
    /// remember it when it is new.
    pub fn admit(&mut self, sample: &Sample, prior: &Window) -> bool {
        if !Self::is_new(sample, prior) {
            return false;
        }
        let key = sample.identity();
        if self.has_seen(&key) {
            return false;
        }
        self.remember(key);
        true
    }

    /// Whether `key` is still remembered as accepted.
    pub fn has_seen(&self, key: &IdentityKey) -> bool {
        match &key.timestamp {
            SampleTime::At(t) => self
                .dated
                .get(&key.source_id)
                .is_some_and(|instants| instants.contains(t)),
            SampleTime::Undated(_) => self.undated_index.contains(key),
        }
    }

    /// Number of keys currently remembered.
    pub fn tracked_keys(&self) -> usize {
        let dated: usize = self.dated.values().map(BTreeSet::len).sum();
        dated + self.undated.len()
    }

    fn remember(&mut self, key: IdentityKey) {
        match key.timestamp {
            SampleTime::At(t) => {
                let retention = self.retention;
                let instants = self.dated.entry(key.source_id).or_default();
                instants.insert(t);
                let horizon = instants
                    .last()
                    .and_then(|newest| newest.checked_sub_signed(retention));
                if let Some(horizon) = horizon {
                    *instants = instants.split_off(&horizon);
                }
            }
            SampleTime::Undated(_) => {
                if self.undated_index.insert(key.clone()) {
                    self.undated.push_back(key);
                }
                while self.undated.len() > self.max_undated {
                    if let Some(old) = self.undated.pop_front() {
                        self.undated_index.remove(&old);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::ClassCounts;

    fn sample(ts: &str, cam: &str, car: u64) -> Sample {
        Sample::new(
            SampleTime::parse(ts),
            cam,
            ClassCounts { car, ..Default::default() },
            car,
        )
    }

    fn guard(retention_secs: u64) -> DedupGuard {
        DedupGuard::new(&DedupConfig {
            retention_secs,
            max_undated_keys: 2,
        })
    }

    #[test]
    fn test_is_new_against_prior_window() {
        let s = sample("2024-05-01T12:00:00", "cam", 1);
        let prior = Window::from_samples(vec![s.clone()], None);
        assert!(!DedupGuard::is_new(&s, &prior));
        assert!(DedupGuard::is_new(&s, &Window::default()));
    }

    #[test]
    fn test_counts_differ_but_key_matches() {
        let a = sample("2024-05-01T12:00:00", "cam", 1);
        let b = sample("2024-05-01T12:00:00", "cam", 9);
        let prior = Window::from_samples(vec![a], None);
        assert!(!DedupGuard::is_new(&b, &prior));
    }

    #[test]
    fn test_same_instant_other_camera_is_new() {
        let mut g = guard(60);
        let empty = Window::default();
        assert!(g.admit(&sample("2024-05-01T12:00:00", "a", 1), &empty));
        assert!(g.admit(&sample("2024-05-01T12:00:00", "b", 1), &empty));
        assert!(!g.admit(&sample("2024-05-01T12:00:00", "a", 1), &empty));
    }

    #[test]
    fn test_memory_outlives_window() {
        let mut g = guard(3600);
        let s = sample("2024-05-01T12:00:00", "cam", 3);
        assert!(g.admit(&s, &Window::default()));
        // scrolled out of the display window, still remembered
        assert!(!g.admit(&s, &Window::default()));
    }

    #[test]
    fn test_dated_keys_evicted_past_horizon() {
        let mut g = guard(10);
        let empty = Window::default();
        g.admit(&sample("2024-05-01T12:00:00", "cam", 1), &empty);
        g.admit(&sample("2024-05-01T12:00:05", "cam", 1), &empty);
        assert_eq!(g.tracked_keys(), 2);
        g.admit(&sample("2024-05-01T12:00:30", "cam", 1), &empty);
        assert_eq!(g.tracked_keys(), 1);

        // forgotten: only the prior window can still reject it
        let evicted = sample("2024-05-01T12:00:00", "cam", 1);
        assert!(!g.has_seen(&evicted.identity()));
        let prior = Window::from_samples(vec![evicted.clone()], None);
        assert!(!g.admit(&evicted, &prior));
    }

    #[test]
    fn test_late_sample_within_horizon_is_new() {
        let mut g = guard(60);
        let empty = Window::default();
        g.admit(&sample("2024-05-01T12:00:30", "cam", 1), &empty);
        assert!(g.admit(&sample("2024-05-01T12:00:10", "cam", 1), &empty));
    }

    #[test]
    fn test_future_stamp_does_not_block_other_cameras() {
        let mut g = guard(3600);
        let empty = Window::default();
        assert!(g.admit(&sample("2099-01-01T00:00:00", "skewed", 1), &empty));
        for i in 0..10 {
            let s = sample(&format!("2024-05-01T12:00:0{}", i), "cam", 1);
            assert!(g.admit(&s, &empty));
        }
        assert_eq!(g.tracked_keys(), 11);
    }

    #[test]
    fn test_future_stamp_on_same_camera_still_admits_new_keys() {
        let mut g = guard(3600);
        let empty = Window::default();
        assert!(g.admit(&sample("2099-01-01T00:00:00", "cam", 1), &empty));
        assert!(g.admit(&sample("2024-05-01T12:00:00", "cam", 1), &empty));
        assert!(g.admit(&sample("2024-05-01T12:00:01", "cam", 1), &empty));
    }

    #[test]
    fn test_lagging_camera_is_not_past_horizon() {
        let mut g = guard(3600);
        let empty = Window::default();
        assert!(g.admit(&sample("2024-05-01T14:00:00", "a", 1), &empty));
        assert!(g.admit(&sample("2024-05-01T12:00:00", "b", 1), &empty));
        assert!(!g.admit(&sample("2024-05-01T12:00:00", "b", 1), &empty));
    }

    #[test]
    fn test_undated_keys_are_fifo_bounded() {
        let mut g = guard(60);
        let empty = Window::default();
        assert!(g.admit(&sample("x1", "cam", 1), &empty));
        assert!(g.admit(&sample("x2", "cam", 1), &empty));
        assert!(!g.admit(&sample("x1", "cam", 1), &empty));
        assert!(g.admit(&sample("x3", "cam", 1), &empty));
        assert_eq!(g.tracked_keys(), 2);
    }
}
