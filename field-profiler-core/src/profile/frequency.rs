use hyperloglog::HyperLogLog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::metric::Metric;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueValueEntry {
    pub value: String,
    /// Exact until the table overflows; an upper bound afterwards.
    pub count: u64,
    /// Share of all observed (valid) values.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueValueSummary {
    /// Ordered by count descending, then value ascending.
    pub top_values: Vec<UniqueValueEntry>,
    pub distinct_count: u64,
    /// False once the tracking limit was hit and `distinct_count` became an estimate.
    pub distinct_exact: bool,
    /// True whenever `top_values` is not the complete distinct list.
    pub truncated: bool,
    pub observed: u64,
    /// Distinct values seen exactly once.
    pub singletons: Metric<u64>,
}

// error rate ~0.8%
const HLL_ERROR_RATE: f64 = 0.00813;
const HLL_SEED: u128 = 0x6669_656c_645f_7072_6f66_696c_6572_0001;

/// HyperLogLog with a fixed seed, so estimates repeat across runs.
#[derive(Clone)]
struct DistinctEstimator {
    hll: HyperLogLog,
}

impl DistinctEstimator {
    fn new() -> Self {
        Self {
            hll: HyperLogLog::new_deterministic(HLL_ERROR_RATE, HLL_SEED),
        }
    }

    fn insert(&mut self, value: &str) {
        self.hll.insert(&value);
    }

    fn estimate(&self) -> u64 {
        self.hll.len().round() as u64
    }
}

impl std::fmt::Debug for DistinctEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistinctEstimator").field("estimate", &self.estimate()).finish()
    }
}

/// Bounded top-N frequency table.
///
/// Up to `tracking_limit` distinct keys are counted exactly. Past that the
/// table runs as a Space-Saving counter: a new key replaces the entry with the
/// lowest count (smallest key among ties) and inherits that count plus one, so
/// a late heavy hitter still surfaces. The distinct count then comes from a
/// seeded HyperLogLog.
#[derive(Debug, Clone)]
pub struct UniqueValueSummarizer {
    counts: HashMap<String, u64>,
    /// (count, key) index over `counts`, built at the first eviction.
    by_count: Option<BTreeSet<(u64, String)>>,
    observed: u64,
    evictions: u64,
    retention_cap: usize,
    tracking_limit: usize,
    distinct: DistinctEstimator,
}

impl UniqueValueSummarizer {
    pub fn new(retention_cap: usize, tracking_limit: usize) -> Self {
        Self {
            counts: HashMap::new(),
            by_count: None,
            observed: 0,
            evictions: 0,
            retention_cap,
            tracking_limit: tracking_limit.max(retention_cap).max(1),
            distinct: DistinctEstimator::new(),
        }
    }

    pub fn observe(&mut self, value: &str) {
        self.observed += 1;
        self.distinct.insert(value);
        if let Some(c) = self.counts.get_mut(value) {
            if let Some(index) = &mut self.by_count {
                index.remove(&(*c, value.to_owned()));
                index.insert((*c + 1, value.to_owned()));
            }
            *c += 1;
            return;
        }
        if self.counts.len() < self.tracking_limit {
            self.counts.insert(value.to_owned(), 1);
            if let Some(index) = &mut self.by_count {
                index.insert((1, value.to_owned()));
            }
            return;
        }
        let counts = &mut self.counts;
        let index = self
            .by_count
            .get_or_insert_with(|| counts.iter().map(|(k, c)| (*c, k.clone())).collect());
        let Some((min, victim)) = index.pop_first() else { return };
        counts.remove(&victim);
        counts.insert(value.to_owned(), min + 1);
        index.insert((min + 1, value.to_owned()));
        self.evictions += 1;
    }

    pub fn overflowed(&self) -> bool {
        self.evictions > 0
    }

    /// Non-consuming; the summarizer can keep observing afterwards.
    pub fn finalize(&self) -> UniqueValueSummary {
        let overflowed = self.overflowed();
        let mut entries: Vec<(&String, u64)> = self.counts.iter().map(|(k, v)| (k, *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let total = self.observed;
        let top_values: Vec<UniqueValueEntry> = entries
            .iter()
            .take(self.retention_cap)
            .map(|(v, c)| UniqueValueEntry {
                value: (*v).clone(),
                count: *c,
                percentage: if total > 0 {
                    *c as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        let tracked = self.counts.len() as u64;
        let distinct_count = if overflowed {
            self.distinct.estimate().max(tracked + 1)
        } else {
            tracked
        };
        let singletons = if total == 0 {
            Metric::NotApplicable
        } else if overflowed {
            Metric::Undefined
        } else {
            Metric::Value(entries.iter().filter(|(_, c)| *c == 1).count() as u64)
        };
        UniqueValueSummary {
            truncated: overflowed || distinct_count > self.retention_cap as u64,
            top_values,
            distinct_count,
            distinct_exact: !overflowed,
            observed: total,
            singletons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_count_then_value() {
        let mut s = UniqueValueSummarizer::new(10, 100);
        for v in ["b", "a", "c", "b", "a", "d"] {
            s.observe(v);
        }
        let r = s.finalize();
        let vals: Vec<&str> = r.top_values.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(vals, vec!["a", "b", "c", "d"]);
        assert_eq!(r.distinct_count, 4);
        assert!(!r.truncated);
        assert_eq!(r.top_values.iter().map(|e| e.count).sum::<u64>(), 6);
        assert_eq!(r.singletons, Metric::Value(2));
    }

    #[test]
    fn cap_sets_truncation_flag() {
        let mut s = UniqueValueSummarizer::new(2, 100);
        for v in ["x", "y", "z"] {
            s.observe(v);
        }
        let r = s.finalize();
        assert_eq!(r.top_values.len(), 2);
        assert_eq!(r.distinct_count, 3);
        assert!(r.distinct_exact);
        assert!(r.truncated);
    }

    #[test]
    fn tracking_limit_bounds_memory_and_estimates() {
        let mut s = UniqueValueSummarizer::new(5, 1000);
        for i in 0..20_000 {
            s.observe(&i.to_string());
        }
        assert_eq!(s.counts.len(), 1000);
        let r = s.finalize();
        assert!(!r.distinct_exact);
        assert!(r.truncated);
        assert_eq!(r.singletons, Metric::Undefined);
        let err = (r.distinct_count as f64 - 20_000.0).abs() / 20_000.0;
        assert!(err < 0.05, "estimate {} too far off", r.distinct_count);
    }

    #[test]
    fn late_heavy_hitter_reaches_top() {
        let mut s = UniqueValueSummarizer::new(5, 1000);
        for i in 0..1000 {
            s.observe(&format!("v{i:04}"));
        }
        for _ in 0..500 {
            s.observe("hot");
        }
        assert_eq!(s.counts.len(), 1000);
        let r = s.finalize();
        assert_eq!(r.top_values[0].value, "hot");
        // inherited the evicted entry's count of 1
        assert_eq!(r.top_values[0].count, 501);
        assert!(!r.distinct_exact);
    }

    #[test]
    fn eviction_is_deterministic() {
        let feed = |s: &mut UniqueValueSummarizer| {
            for i in 0..300u32 {
                s.observe(&(i % 97 * 7 + i / 50).to_string());
            }
        };
        let mut a = UniqueValueSummarizer::new(5, 20);
        let mut b = UniqueValueSummarizer::new(5, 20);
        feed(&mut a);
        feed(&mut b);
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn finalize_is_repeatable() {
        let mut s = UniqueValueSummarizer::new(3, 10);
        for v in ["q", "r", "q"] {
            s.observe(v);
        }
        assert_eq!(s.finalize(), s.finalize());
    }

    #[test]
    fn empty_summary() {
        let r = UniqueValueSummarizer::new(3, 10).finalize();
        assert!(r.top_values.is_empty());
        assert_eq!(r.distinct_count, 0);
        assert!(!r.truncated);
        assert_eq!(r.singletons, Metric::NotApplicable);
    }
}
