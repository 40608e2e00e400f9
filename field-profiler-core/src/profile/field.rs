use chrono::NaiveDate;
use field_profiler_common::ProfilingConfig;

use super::frequency::UniqueValueSummarizer;
use super::numeric::{NumericAccumulator, NumericOptions};
use super::temporal::TemporalAccumulator;
use super::text::TextAccumulator;
use crate::classify::Family;
use crate::coerce::CoercedValue;
use crate::record::RecordId;

/// Category counts shared by every family.
#[derive(Debug, Clone, Default)]
pub struct FieldCounts {
    pub total: u64,
    pub null: u64,
    pub empty: u64,
    pub conversion_error: u64,
    pub valid: u64,
    pub conversion_error_ids: Vec<RecordId>,
}

impl FieldCounts {
    fn record_error(&mut self, id: RecordId, id_cap: usize) {
        self.conversion_error += 1;
        if self.conversion_error_ids.len() < id_cap {
            self.conversion_error_ids.push(id);
        }
    }
}

#[derive(Debug, Clone)]
pub enum FamilyAccumulator {
    Numeric(NumericAccumulator),
    Text(TextAccumulator),
    Date(TemporalAccumulator),
}

/// Running state for one field. Owned by the scan loop and never shared
/// between fields.
#[derive(Debug, Clone)]
pub struct FieldAccumulator {
    counts: FieldCounts,
    id_cap: usize,
    family: FamilyAccumulator,
}

impl FieldAccumulator {
    pub fn new(family: Family, cfg: &ProfilingConfig, today: NaiveDate) -> Self {
        let unique = UniqueValueSummarizer::new(cfg.unique_retention_cap, cfg.unique_tracking_limit);
        let family = match family {
            Family::Numeric => FamilyAccumulator::Numeric(NumericAccumulator::new(
                NumericOptions {
                    exact_quantile_threshold: cfg.exact_quantile_threshold,
                    histogram_bins: cfg.histogram_bins,
                    shape: cfg.groups.distribution_shape,
                    outliers: cfg.groups.outliers,
                    normality_alpha: cfg.normality_alpha,
                },
                unique,
            )),
            Family::Text => FamilyAccumulator::Text(TextAccumulator::new(
                cfg.groups.text_case_and_nonprintable,
                cfg.issue_id_cap,
                unique,
            )),
            Family::Date => FamilyAccumulator::Date(TemporalAccumulator::new(
                cfg.groups.date_time_and_weekend,
                today,
                unique,
            )),
        };
        Self {
            counts: FieldCounts::default(),
            id_cap: cfg.issue_id_cap,
            family,
        }
    }

    /// Folds one coerced value in. Returns the numeric value when one was
    /// accepted, for cross-field statistics.
    pub fn observe(&mut self, id: RecordId, value: CoercedValue) -> Option<f64> {
        self.counts.total += 1;
        match (&mut self.family, value) {
            (_, CoercedValue::Null) => self.counts.null += 1,
            (_, CoercedValue::Empty) => self.counts.empty += 1,
            (_, CoercedValue::ConversionError(_)) => self.counts.record_error(id, self.id_cap),
            (FamilyAccumulator::Numeric(acc), CoercedValue::Numeric(v)) => {
                acc.add(v);
                self.counts.valid += 1;
                return Some(v);
            }
            (FamilyAccumulator::Text(acc), CoercedValue::Text(s)) => {
                acc.add(id, &s);
                self.counts.valid += 1;
            }
            (FamilyAccumulator::Date(acc), CoercedValue::Date(dt)) => {
                acc.add(dt);
                self.counts.valid += 1;
            }
            (
                FamilyAccumulator::Numeric(_) | FamilyAccumulator::Text(_) | FamilyAccumulator::Date(_),
                CoercedValue::Numeric(_) | CoercedValue::Text(_) | CoercedValue::Date(_),
            ) => {
                tracing::debug!(%id, "coerced value does not match field family");
                self.counts.record_error(id, self.id_cap);
            }
        }
        None
    }

    pub fn counts(&self) -> &FieldCounts {
        &self.counts
    }

    pub fn family(&self) -> &FamilyAccumulator {
        &self.family
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Coercer;
    use crate::record::RawValue;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn categories_partition_total() {
        let cfg = ProfilingConfig::default();
        let coercer = Coercer::from_config(&cfg);
        let mut acc = FieldAccumulator::new(Family::Numeric, &cfg, today());
        let raw = [
            RawValue::from(10),
            RawValue::from("20"),
            RawValue::from("  "),
            RawValue::Null,
            RawValue::from("abc"),
        ];
        for (i, v) in raw.iter().enumerate() {
            acc.observe(RecordId(i as u64), coercer.coerce(Family::Numeric, v));
        }
        let c = acc.counts();
        assert_eq!(c.total, 5);
        assert_eq!((c.valid, c.null, c.empty, c.conversion_error), (2, 1, 1, 1));
        assert_eq!(c.null + c.empty + c.conversion_error + c.valid, c.total);
        assert_eq!(c.conversion_error_ids, vec![RecordId(4)]);
    }

    #[test]
    fn error_ids_respect_cap() {
        let cfg = ProfilingConfig {
            issue_id_cap: 2,
            ..ProfilingConfig::default()
        };
        let mut acc = FieldAccumulator::new(Family::Date, &cfg, today());
        for i in 0..5 {
            acc.observe(RecordId(i), CoercedValue::ConversionError("x".into()));
        }
        assert_eq!(acc.counts().conversion_error, 5);
        assert_eq!(acc.counts().conversion_error_ids.len(), 2);
    }

    #[test]
    fn mismatched_value_counts_as_error() {
        let cfg = ProfilingConfig::default();
        let mut acc = FieldAccumulator::new(Family::Numeric, &cfg, today());
        assert_eq!(acc.observe(RecordId(0), CoercedValue::Text("t".into())), None);
        assert_eq!(acc.counts().conversion_error, 1);
    }
}
