//! Cumulative-to-delta conversion
//!
//! OS counters such as bytes sent on an interface only ever grow. The
//! [`DeltaTracker`] remembers the last absolute reading per key and reports
//! the increment since then, so the consuming counter advances by exactly the
//! activity of one collection interval.

use dashmap::DashMap;

/// Difference between two readings of a cumulative counter.
///
/// Counters are treated as non-negative 63-bit values: a reading lower than
/// the previous one means the source wrapped past `i64::MAX` back to zero.
pub fn calculate_delta(old: i64, new: i64) -> i64 {
    if new >= old {
        new.saturating_sub(old)
    } else {
        i64::MAX
            .saturating_sub(old)
            .saturating_add(new)
            .saturating_add(1)
    }
}

/// Last-seen absolute value per fully-qualified metric key
#[derive(Debug, Default)]
pub struct DeltaTracker {
    last: DashMap<String, i64>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `key` and return the increment since the previous
    /// observation, or `None` on the first observation of the key.
    ///
    /// Calls for the same key are serialized on the map shard; different keys
    /// proceed independently.
    pub fn observe_cumulative(&self, key: &str, value: i64) -> Option<i64> {
        use dashmap::mapref::entry::Entry;

        match self.last.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let delta = calculate_delta(*entry.get(), value);
                entry.insert(value);
                Some(delta)
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Last absolute value recorded for `key`
    pub fn last(&self, key: &str) -> Option<i64> {
        self.last.get(key).map(|v| *v)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_first_observation_has_no_delta() {
        let tracker = DeltaTracker::new();
        assert_eq!(tracker.observe_cumulative("net.eth0.bytes_sent", 100), None);
        assert_eq!(tracker.last("net.eth0.bytes_sent"), Some(100));
    }

    #[test]
    fn test_delta_between_observations() {
        let tracker = DeltaTracker::new();
        tracker.observe_cumulative("k", 100);
        assert_eq!(tracker.observe_cumulative("k", 150), Some(50));
        assert_eq!(tracker.observe_cumulative("k", 150), Some(0));
    }

    #[test]
    fn test_wraparound_is_positive() {
        let tracker = DeltaTracker::new();
        tracker.observe_cumulative("k", i64::MAX - 5);
        assert_eq!(tracker.observe_cumulative("k", 10), Some(16));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = DeltaTracker::new();
        tracker.observe_cumulative("a", 10);
        assert_eq!(tracker.observe_cumulative("b", 20), None);
        assert_eq!(tracker.observe_cumulative("a", 15), Some(5));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_concurrent_keys_sum() {
        // Each thread feeds a strictly increasing sequence into its own key;
        // deltas must add up to the final reading minus the baseline.
        let tracker = Arc::new(DeltaTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let key = format!("k{}", t);
                    let mut total = 0;
                    for v in 0..1000i64 {
                        total += tracker.observe_cumulative(&key, v * 3).unwrap_or(0);
                    }
                    total
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 999 * 3);
        }
    }

    proptest! {
        #[test]
        fn prop_delta_non_negative(old in 0i64..=i64::MAX, new in 0i64..=i64::MAX) {
            prop_assert!(calculate_delta(old, new) >= 0);
        }

        #[test]
        fn prop_delta_monotonic(old in 0i64..i64::MAX / 2, step in 0i64..i64::MAX / 2) {
            prop_assert_eq!(calculate_delta(old, old + step), step);
        }

        #[test]
        fn prop_sequence_deltas_sum(values in proptest::collection::vec(0i64..1_000_000, 1..50)) {
            let mut sorted = values.clone();
            sorted.sort();
            let tracker = DeltaTracker::new();
            let sum: i64 = sorted
                .iter()
                .filter_map(|v| tracker.observe_cumulative("k", *v))
                .sum();
            prop_assert_eq!(sum, sorted[sorted.len() - 1] - sorted[0]);
        }
    }
}
