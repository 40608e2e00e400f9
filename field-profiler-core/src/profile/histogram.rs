use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub range_start: f64,
    pub range_end: f64,
    pub count: u64,
}

/// Equal-width bins over already sorted values. The last bin is closed on
/// the right so the maximum lands inside it.
pub fn build_histogram(sorted: &[f64], bins: usize) -> Vec<HistogramBin> {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    if bins == 0 {
        return Vec::new();
    }
    if max - min <= f64::EPSILON * max.abs().max(1.0) {
        return vec![HistogramBin { range_start: min, range_end: max, count: sorted.len() as u64 }];
    }
    let width = (max - min) / bins as f64;
    let mut out = Vec::with_capacity(bins);
    let mut start_idx = 0usize;
    for i in 0..bins {
        let range_start = min + i as f64 * width;
        let range_end = if i + 1 == bins { max } else { min + (i + 1) as f64 * width };
        let end_idx = if i + 1 == bins {
            sorted.len()
        } else {
            start_idx + sorted[start_idx..].partition_point(|&v| v < range_end)
        };
        out.push(HistogramBin { range_start, range_end, count: (end_idx - start_idx) as u64 });
        start_idx = end_idx;
    }
    out
}
