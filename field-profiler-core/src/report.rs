use chrono::NaiveDate;
use field_profiler_common::{FieldProfilerError, Result};
use serde::{Deserialize, Serialize};

use crate::classify::{Classification, Family, FieldDescriptor};
use crate::profile::correlation::CorrelationMatrix;
use crate::profile::field::{FamilyAccumulator, FieldAccumulator};
use crate::profile::frequency::UniqueValueSummary;
use crate::profile::metric::Metric;
use crate::profile::numeric::{NumericStats, QuantileMethod};
use crate::profile::temporal::DateStats;
use crate::profile::text::TextStats;
use crate::record::{DeclaredKind, RecordFilter, RecordId};
use crate::rules::RuleOutcome;

/// Share of text values that must parse as another family before a hint is raised.
const MISMATCH_SHARE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilyStats {
    Numeric(NumericStats),
    Text(TextStats),
    Date(DateStats),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileWarning {
    /// The run saw no records at all.
    NoRecords,
    /// Records existed but none held a valid value for this field.
    NoValidValues,
    ApproximateQuantiles,
    /// Distinct values exceeded the tracking limit; the distinct count is an estimate.
    UniqueTrackingOverflow,
}

/// Immutable, self-describing profile of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProfileReport {
    pub field_name: String,
    pub position: usize,
    pub declared_kind: DeclaredKind,
    pub family: Family,
    pub classification: Classification,
    pub total_count: u64,
    pub null_count: u64,
    pub empty_count: u64,
    pub conversion_error_count: u64,
    pub valid_count: u64,
    pub null_percentage: Metric<f64>,
    pub conversion_error_ids: Vec<RecordId>,
    pub conversion_error_ids_truncated: bool,
    pub type_hint: Option<String>,
    pub warnings: Vec<ProfileWarning>,
    pub stats: FamilyStats,
}

impl FieldProfileReport {
    /// Values that were present: valid, empty, or failed conversion.
    pub fn non_null_count(&self) -> u64 {
        self.total_count - self.null_count
    }

    pub fn unique(&self) -> &UniqueValueSummary {
        match &self.stats {
            FamilyStats::Numeric(s) => &s.unique,
            FamilyStats::Text(s) => &s.unique,
            FamilyStats::Date(s) => &s.unique,
        }
    }

    pub fn numeric(&self) -> Option<&NumericStats> {
        match &self.stats {
            FamilyStats::Numeric(s) => Some(s),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&TextStats> {
        match &self.stats {
            FamilyStats::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<&DateStats> {
        match &self.stats {
            FamilyStats::Date(s) => Some(s),
            _ => None,
        }
    }

    /// Label/value pairs for plain-text rendering.
    pub fn summary_rows(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = vec![
            ("family".into(), self.family.to_string()),
            ("total".into(), self.total_count.to_string()),
            ("valid".into(), self.valid_count.to_string()),
            ("null".into(), format!("{} ({})", self.null_count, self.null_percentage.display_f64(2))),
            ("empty".into(), self.empty_count.to_string()),
            ("conversion_errors".into(), self.conversion_error_count.to_string()),
        ];
        let fmt = |m: &Metric<f64>| m.display_f64(4);
        match &self.stats {
            FamilyStats::Numeric(s) => {
                rows.push(("mean".into(), fmt(&s.mean)));
                rows.push(("std_dev".into(), fmt(&s.std_dev)));
                rows.push(("min".into(), fmt(&s.min)));
                rows.push(("q1".into(), fmt(&s.percentiles.q1)));
                rows.push(("median".into(), fmt(&s.percentiles.median)));
                rows.push(("q3".into(), fmt(&s.percentiles.q3)));
                rows.push(("max".into(), fmt(&s.max)));
                if s.quantile_method == QuantileMethod::Approximate {
                    rows.push(("quantiles".into(), "approximate (t-digest)".into()));
                }
                if let Some(shape) = &s.shape {
                    rows.push(("skewness".into(), fmt(&shape.skewness)));
                    rows.push(("kurtosis".into(), fmt(&shape.kurtosis)));
                    let normal = match &shape.normality {
                        Metric::Value(t) => format!("{} (p={:.4})", t.likely_normal, t.p_value),
                        other => other.map(|t| t.likely_normal).display(),
                    };
                    rows.push(("likely_normal".into(), normal));
                }
                if let Some(Metric::Value(o)) = &s.outliers {
                    rows.push(("outliers".into(), o.count.to_string()));
                }
            }
            FamilyStats::Text(s) => {
                rows.push(("mean_length".into(), fmt(&s.mean_length)));
                rows.push(("min_length".into(), s.min_length.display()));
                rows.push(("max_length".into(), s.max_length.display()));
                if let Some(case) = &s.case {
                    rows.push(("uppercase".into(), case.uppercase.count.to_string()));
                    rows.push(("lowercase".into(), case.lowercase.count.to_string()));
                    rows.push(("mixed_case".into(), case.mixed_case.count.to_string()));
                    rows.push(("no_letters".into(), case.no_letters.count.to_string()));
                }
                if let Some(np) = &s.non_printable {
                    rows.push(("non_printable".into(), np.count.to_string()));
                }
            }
            FamilyStats::Date(s) => {
                rows.push(("min".into(), s.min.display()));
                rows.push(("max".into(), s.max.display()));
                rows.push(("span_days".into(), s.span_days.display_f64(2)));
                if let Some(t) = &s.time {
                    rows.push(("has_time".into(), t.has_time.percentage.display_f64(2) + "%"));
                }
                if let Some(w) = &s.weekdays {
                    rows.push(("weekend".into(), w.weekend.count.to_string()));
                }
            }
        }
        let unique = self.unique();
        let distinct = if unique.distinct_exact {
            unique.distinct_count.to_string()
        } else {
            format!("~{}", unique.distinct_count)
        };
        rows.push(("distinct".into(), distinct));
        if let Some(top) = unique.top_values.first() {
            rows.push(("top_value".into(), format!("{} ({})", top.value, top.count)));
        }
        if let Some(hint) = &self.type_hint {
            rows.push(("hint".into(), hint.clone()));
        }
        rows
    }
}

/// Builds the report for one field. Pure: the accumulator is only read.
pub fn finalize(descriptor: &FieldDescriptor, accumulator: &FieldAccumulator) -> FieldProfileReport {
    let counts = accumulator.counts();
    let stats = match accumulator.family() {
        FamilyAccumulator::Numeric(acc) => FamilyStats::Numeric(acc.finalize()),
        FamilyAccumulator::Text(acc) => FamilyStats::Text(acc.finalize()),
        FamilyAccumulator::Date(acc) => FamilyStats::Date(acc.finalize()),
    };

    let mut warnings = Vec::new();
    if counts.total == 0 {
        warnings.push(ProfileWarning::NoRecords);
    } else if counts.valid == 0 {
        warnings.push(ProfileWarning::NoValidValues);
    }
    if let FamilyStats::Numeric(s) = &stats {
        if s.count > 0 && s.quantile_method == QuantileMethod::Approximate {
            warnings.push(ProfileWarning::ApproximateQuantiles);
        }
    }

    let mut report = FieldProfileReport {
        field_name: descriptor.name.clone(),
        position: descriptor.position,
        declared_kind: descriptor.declared,
        family: descriptor.family,
        classification: descriptor.classification.clone(),
        total_count: counts.total,
        null_count: counts.null,
        empty_count: counts.empty,
        conversion_error_count: counts.conversion_error,
        valid_count: counts.valid,
        null_percentage: if counts.total > 0 {
            Metric::Value(counts.null as f64 / counts.total as f64 * 100.0)
        } else {
            Metric::NotApplicable
        },
        conversion_error_ids: counts.conversion_error_ids.clone(),
        conversion_error_ids_truncated: counts.conversion_error > counts.conversion_error_ids.len() as u64,
        type_hint: None,
        warnings,
        stats,
    };
    if !report.unique().distinct_exact {
        report.warnings.push(ProfileWarning::UniqueTrackingOverflow);
    }
    report.type_hint = type_hint(&report);
    report
}

fn type_hint(report: &FieldProfileReport) -> Option<String> {
    match &report.stats {
        FamilyStats::Text(s) if s.count > 0 => {
            let n = s.count as f64;
            if s.numeric_like as f64 / n >= MISMATCH_SHARE {
                Some("text field holds mostly numeric values".into())
            } else if s.date_like as f64 / n >= MISMATCH_SHARE {
                Some("text field holds mostly date values".into())
            } else {
                None
            }
        }
        FamilyStats::Numeric(_) | FamilyStats::Date(_) if report.total_count > 0 => {
            let present = report.non_null_count() - report.empty_count;
            if present > 0 && report.conversion_error_count as f64 / present as f64 >= MISMATCH_SHARE {
                Some(format!("most values failed {} conversion; field may be text", report.family))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// All field reports of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub records_profiled: u64,
    pub reference_date: NaiveDate,
    pub fields: Vec<FieldProfileReport>,
    pub correlation: Option<CorrelationMatrix>,
    pub validation: Vec<RuleOutcome>,
    /// Pre-filter the run used; selection re-applies it.
    pub filter: RecordFilter,
}

impl DatasetProfile {
    pub fn field(&self, name: &str) -> Option<&FieldProfileReport> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    pub fn require_field(&self, name: &str) -> Result<&FieldProfileReport> {
        self.field(name)
            .ok_or_else(|| FieldProfilerError::FieldNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Coercer;
    use crate::record::RawValue;
    use field_profiler_common::ProfilingConfig;

    fn build(family: Family, values: &[RawValue]) -> FieldProfileReport {
        let cfg = ProfilingConfig::default();
        let coercer = Coercer::from_config(&cfg);
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut acc = FieldAccumulator::new(family, &cfg, today);
        for (i, v) in values.iter().enumerate() {
            acc.observe(RecordId(i as u64), coercer.coerce(family, v));
        }
        let descriptor = FieldDescriptor {
            name: "f".into(),
            position: 0,
            declared: DeclaredKind::Unknown,
            family,
            classification: Classification::Declared,
        };
        finalize(&descriptor, &acc)
    }

    #[test]
    fn age_scenario() {
        let r = build(
            Family::Numeric,
            &[10.into(), 20.into(), 20.into(), RawValue::Null, "abc".into()],
        );
        assert_eq!(r.valid_count, 3);
        assert_eq!(r.null_count, 1);
        assert_eq!(r.conversion_error_count, 1);
        let s = r.numeric().unwrap();
        assert!((s.mean.get().unwrap() - 16.67).abs() < 0.01);
        assert_eq!(s.min, Metric::Value(10.0));
        assert_eq!(s.max, Metric::Value(20.0));
        assert_eq!(r.conversion_error_ids, vec![RecordId(4)]);
    }

    #[test]
    fn name_scenario() {
        let r = build(Family::Text, &["Bob".into(), "bob".into(), "".into(), RawValue::Null]);
        assert_eq!(r.non_null_count(), 3);
        assert_eq!(r.empty_count, 1);
        assert_eq!(r.valid_count, 2);
        let case = r.text().unwrap().case.clone().unwrap();
        assert_eq!(case.mixed_case.count, 1);
        assert_eq!(case.lowercase.count, 1);
        assert_eq!(case.no_letters.count, 0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let cfg = ProfilingConfig::default();
        let coercer = Coercer::from_config(&cfg);
        let mut acc = FieldAccumulator::new(Family::Numeric, &cfg, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        for i in 0..50 {
            acc.observe(RecordId(i), coercer.coerce(Family::Numeric, &RawValue::Int(i as i64 % 7)));
        }
        let d = FieldDescriptor {
            name: "n".into(),
            position: 0,
            declared: DeclaredKind::Numeric,
            family: Family::Numeric,
            classification: Classification::Declared,
        };
        assert_eq!(finalize(&d, &acc), finalize(&d, &acc));
    }

    #[test]
    fn empty_field_warns() {
        let r = build(Family::Date, &[RawValue::Null, RawValue::Null]);
        assert_eq!(r.warnings, vec![ProfileWarning::NoValidValues]);
        assert_eq!(r.date().unwrap().min, Metric::NotApplicable);
        let r = build(Family::Date, &[]);
        assert_eq!(r.warnings, vec![ProfileWarning::NoRecords]);
        assert_eq!(r.null_percentage, Metric::NotApplicable);
    }

    #[test]
    fn numeric_text_raises_hint() {
        let r = build(Family::Text, &["1".into(), "2.5".into(), "3".into()]);
        assert!(r.type_hint.unwrap().contains("numeric"));
        let r = build(Family::Numeric, &["a".into(), "b".into()]);
        assert!(r.type_hint.is_some());
    }

    #[test]
    fn summary_rows_cover_family() {
        let r = build(Family::Numeric, &[1.into(), 2.into(), 3.into()]);
        let rows = r.summary_rows();
        assert!(rows.iter().any(|(k, v)| k == "median" && v == "2.0000"));
    }
}
