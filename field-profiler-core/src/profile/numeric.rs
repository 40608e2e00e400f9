use serde::{Deserialize, Serialize};
use tdigest::TDigest;

use super::frequency::{UniqueValueSummarizer, UniqueValueSummary};
use super::histogram::{build_histogram, HistogramBin};
use super::metric::Metric;
use crate::coerce::numeric_key;

const DIGEST_FLUSH: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantileMethod {
    /// All valid values retained and sorted; linear interpolation between ranks.
    Exact,
    /// t-digest estimate, clamped to the observed min/max.
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p1: Metric<f64>,
    pub p5: Metric<f64>,
    pub q1: Metric<f64>,
    pub median: Metric<f64>,
    pub q3: Metric<f64>,
    pub p95: Metric<f64>,
    pub p99: Metric<f64>,
    pub iqr: Metric<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalityTest {
    /// D'Agostino-Pearson omnibus statistic, chi-squared with 2 dof under normality.
    pub k2: f64,
    pub p_value: f64,
    pub alpha: f64,
    pub likely_normal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionShape {
    /// Moment coefficient g1 = m3 / m2^1.5.
    pub skewness: Metric<f64>,
    /// Excess kurtosis g2 = m4 / m2^2 - 3.
    pub kurtosis: Metric<f64>,
    pub normality: Metric<NormalityTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub lower_fence: f64,
    pub upper_fence: f64,
    pub count: u64,
    pub percentage: f64,
    pub lowest: Option<f64>,
    pub highest: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: u64,
    pub sum: Metric<f64>,
    pub mean: Metric<f64>,
    pub min: Metric<f64>,
    pub max: Metric<f64>,
    pub range: Metric<f64>,
    /// Sample variance (n - 1); 0 when count <= 1.
    pub variance: Metric<f64>,
    pub std_dev: Metric<f64>,
    pub population_std_dev: Metric<f64>,
    /// Coefficient of variation in percent; undefined when the mean is 0.
    pub cv_percent: Metric<f64>,
    pub quantile_method: QuantileMethod,
    pub percentiles: Percentiles,
    pub zeros: u64,
    pub positives: u64,
    pub negatives: u64,
    pub integers: u64,
    pub decimals: u64,
    /// Every value sharing the highest count, when that count exceeds 1.
    pub modes: Vec<f64>,
    pub low_variance: bool,
    /// `None` when the distribution-shape group is disabled.
    pub shape: Option<DistributionShape>,
    /// `None` when the outlier group is disabled; `NotApplicable` without exact quantiles.
    pub outliers: Option<Metric<OutlierSummary>>,
    pub histogram: Vec<HistogramBin>,
    pub unique: UniqueValueSummary,
}

#[derive(Debug, Clone, Copy)]
pub struct NumericOptions {
    pub exact_quantile_threshold: usize,
    pub histogram_bins: usize,
    pub shape: bool,
    pub outliers: bool,
    pub normality_alpha: f64,
}

/// Streaming numeric accumulator: Welford/Pebay central moments plus either
/// the full value list or a t-digest for order statistics.
#[derive(Debug, Clone)]
pub struct NumericAccumulator {
    opts: NumericOptions,
    count: u64,
    sum: f64,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    min: f64,
    max: f64,
    zeros: u64,
    positives: u64,
    negatives: u64,
    integers: u64,
    decimals: u64,
    /// Exact mode: every valid value. Approximate mode: the pending digest batch.
    values: Vec<f64>,
    digest: Option<TDigest>,
    unique: UniqueValueSummarizer,
}

impl NumericAccumulator {
    pub fn new(opts: NumericOptions, unique: UniqueValueSummarizer) -> Self {
        Self {
            opts,
            count: 0,
            sum: 0.0,
            mean: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            zeros: 0,
            positives: 0,
            negatives: 0,
            integers: 0,
            decimals: 0,
            values: Vec::new(),
            digest: None,
            unique,
        }
    }

    pub fn add(&mut self, v: f64) {
        let n1 = self.count as f64;
        self.count += 1;
        let n = self.count as f64;
        let delta = v - self.mean;
        let dn = delta / n;
        let term1 = delta * dn * n1;
        self.mean += dn;
        if self.opts.shape {
            let dn2 = dn * dn;
            self.m4 += term1 * dn2 * (n * n - 3.0 * n + 3.0) + 6.0 * dn2 * self.m2 - 4.0 * dn * self.m3;
            self.m3 += term1 * dn * (n - 2.0) - 3.0 * dn * self.m2;
        }
        self.m2 += term1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        match v.partial_cmp(&0.0) {
            Some(std::cmp::Ordering::Greater) => self.positives += 1,
            Some(std::cmp::Ordering::Less) => self.negatives += 1,
            _ => self.zeros += 1,
        }
        if v.fract() == 0.0 {
            self.integers += 1;
        } else {
            self.decimals += 1;
        }
        self.unique.observe(&numeric_key(v));

        self.values.push(v);
        if self.digest.is_none() {
            if self.values.len() > self.opts.exact_quantile_threshold {
                tracing::debug!(
                    threshold = self.opts.exact_quantile_threshold,
                    "switching to approximate quantiles"
                );
                self.digest = Some(TDigest::new_with_size(100));
                self.flush();
            }
        } else if self.values.len() >= DIGEST_FLUSH {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if let Some(digest) = &self.digest {
            if !self.values.is_empty() {
                // merge_unsorted is a method on &self returning a new TDigest
                let merged = digest.merge_unsorted(std::mem::take(&mut self.values));
                self.digest = Some(merged);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_exact(&self) -> bool {
        self.digest.is_none()
    }

    pub fn finalize(&self) -> NumericStats {
        let unique = self.unique.finalize();
        if self.count == 0 {
            return self.empty_stats(unique);
        }
        let n = self.count as f64;
        let variance = if self.count > 1 { self.m2 / (n - 1.0) } else { 0.0 };
        let std_dev = variance.sqrt();
        let population_std_dev = (self.m2 / n).sqrt();

        let order = match &self.digest {
            None => {
                let mut sorted = self.values.clone();
                sorted.sort_by(f64::total_cmp);
                OrderStats::Exact(sorted)
            }
            Some(digest) => OrderStats::Approximate(digest.merge_unsorted(self.values.clone())),
        };
        let quantile = |q: f64| order.quantile(q, self.min, self.max);
        let quantile_method = order.method();
        let q1 = quantile(0.25);
        let q3 = quantile(0.75);
        let percentiles = Percentiles {
            p1: Metric::Value(quantile(0.01)),
            p5: Metric::Value(quantile(0.05)),
            q1: Metric::Value(q1),
            median: Metric::Value(quantile(0.5)),
            q3: Metric::Value(q3),
            p95: Metric::Value(quantile(0.95)),
            p99: Metric::Value(quantile(0.99)),
            iqr: Metric::Value(q3 - q1),
        };

        let shape = self.opts.shape.then(|| self.shape());
        let outliers = self.opts.outliers.then(|| match &order {
            OrderStats::Exact(sorted) => Metric::Value(outlier_summary(sorted, q1, q3)),
            OrderStats::Approximate(_) => Metric::NotApplicable,
        });
        let histogram = match &order {
            OrderStats::Exact(sorted) => build_histogram(sorted, self.opts.histogram_bins),
            OrderStats::Approximate(_) => Vec::new(),
        };

        NumericStats {
            count: self.count,
            sum: Metric::Value(self.sum),
            mean: Metric::Value(self.mean),
            min: Metric::Value(self.min),
            max: Metric::Value(self.max),
            range: Metric::Value(self.max - self.min),
            variance: Metric::Value(variance),
            std_dev: Metric::Value(std_dev),
            population_std_dev: Metric::Value(population_std_dev),
            cv_percent: Metric::when(self.mean != 0.0, || std_dev / self.mean.abs() * 100.0),
            quantile_method,
            percentiles,
            zeros: self.zeros,
            positives: self.positives,
            negatives: self.negatives,
            integers: self.integers,
            decimals: self.decimals,
            modes: modes(&unique),
            low_variance: std_dev < 1e-10,
            shape,
            outliers,
            histogram,
            unique,
        }
    }

    fn shape(&self) -> DistributionShape {
        let n = self.count as f64;
        let spread = self.m2 > 0.0;
        let g1 = n.sqrt() * self.m3 / self.m2.powf(1.5);
        let g2 = n * self.m4 / (self.m2 * self.m2) - 3.0;
        let normality = if spread && self.count >= 20 {
            match dagostino_k2(n, g1, g2) {
                Some((k2, p_value)) => Metric::Value(NormalityTest {
                    k2,
                    p_value,
                    alpha: self.opts.normality_alpha,
                    likely_normal: p_value > self.opts.normality_alpha,
                }),
                None => Metric::Undefined,
            }
        } else {
            Metric::Undefined
        };
        DistributionShape {
            skewness: Metric::when(spread && self.count >= 3, || g1),
            kurtosis: Metric::when(spread && self.count >= 4, || g2),
            normality,
        }
    }

    fn empty_stats(&self, unique: UniqueValueSummary) -> NumericStats {
        let na = Metric::NotApplicable;
        NumericStats {
            count: 0,
            sum: na,
            mean: na,
            min: na,
            max: na,
            range: na,
            variance: na,
            std_dev: na,
            population_std_dev: na,
            cv_percent: na,
            quantile_method: if self.is_exact() { QuantileMethod::Exact } else { QuantileMethod::Approximate },
            percentiles: Percentiles { p1: na, p5: na, q1: na, median: na, q3: na, p95: na, p99: na, iqr: na },
            zeros: 0,
            positives: 0,
            negatives: 0,
            integers: 0,
            decimals: 0,
            modes: Vec::new(),
            low_variance: false,
            shape: self.opts.shape.then_some(DistributionShape {
                skewness: Metric::NotApplicable,
                kurtosis: Metric::NotApplicable,
                normality: Metric::NotApplicable,
            }),
            outliers: self.opts.outliers.then_some(Metric::NotApplicable),
            histogram: Vec::new(),
            unique,
        }
    }
}

enum OrderStats {
    Exact(Vec<f64>),
    Approximate(TDigest),
}

impl OrderStats {
    fn quantile(&self, q: f64, min: f64, max: f64) -> f64 {
        match self {
            OrderStats::Exact(sorted) => exact_quantile(sorted, q),
            OrderStats::Approximate(digest) => digest.estimate_quantile(q).clamp(min, max),
        }
    }

    fn method(&self) -> QuantileMethod {
        match self {
            OrderStats::Exact(_) => QuantileMethod::Exact,
            OrderStats::Approximate(_) => QuantileMethod::Approximate,
        }
    }
}

/// Linear interpolation between closest ranks (numpy's default).
pub fn exact_quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn iqr_fences(q1: f64, q3: f64) -> (f64, f64) {
    let iqr = q3 - q1;
    (q1 - 1.5 * iqr, q3 + 1.5 * iqr)
}

fn outlier_summary(sorted: &[f64], q1: f64, q3: f64) -> OutlierSummary {
    let (lower_fence, upper_fence) = iqr_fences(q1, q3);
    let below = sorted.partition_point(|&v| v < lower_fence);
    let above_start = sorted.partition_point(|&v| v <= upper_fence);
    let count = (below + sorted.len() - above_start) as u64;
    let lowest = if below > 0 {
        sorted.first().copied()
    } else {
        sorted.get(above_start).copied()
    };
    let highest = if above_start < sorted.len() {
        sorted.last().copied()
    } else if below > 0 {
        Some(sorted[below - 1])
    } else {
        None
    };
    OutlierSummary {
        lower_fence,
        upper_fence,
        count,
        percentage: if sorted.is_empty() { 0.0 } else { count as f64 / sorted.len() as f64 * 100.0 },
        lowest,
        highest,
    }
}

fn modes(unique: &UniqueValueSummary) -> Vec<f64> {
    let Some(top) = unique.top_values.first() else {
        return Vec::new();
    };
    if top.count < 2 {
        return Vec::new();
    }
    let mut modes: Vec<f64> = unique
        .top_values
        .iter()
        .take_while(|e| e.count == top.count)
        .filter_map(|e| e.value.parse().ok())
        .collect();
    modes.sort_by(f64::total_cmp);
    modes
}

/// D'Agostino-Pearson K^2 from the skewness and kurtosis z-scores.
/// Returns `(k2, p_value)`; `None` when the kurtosis transform degenerates.
pub fn dagostino_k2(n: f64, g1: f64, g2: f64) -> Option<(f64, f64)> {
    let y = g1 * ((n + 1.0) * (n + 3.0) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    let z_skew = delta * (y / alpha).asinh();

    let b2 = g2 + 3.0;
    let expected = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (b2 - expected) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return None;
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    let z_kurt = (1.0 - 2.0 / (9.0 * a) - term2) / (2.0 / (9.0 * a)).sqrt();

    let k2 = z_skew * z_skew + z_kurt * z_kurt;
    if !k2.is_finite() {
        return None;
    }
    Some((k2, (-k2 / 2.0).exp()))
}
