use chrono::NaiveDateTime;
use field_profiler_common::{FieldProfilerError, ProfilingConfig, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::classify::Family;
use crate::coerce::{date_key, numeric_key, CoercedValue, Coercer};
use crate::profile::metric::Metric;
use crate::profile::temporal::{has_time, is_weekend};
use crate::profile::text::{case_of, has_edge_whitespace, has_non_printable, CaseCategory};
use crate::record::{RawValue, Record, RecordId, RecordSource};
use crate::report::{DatasetProfile, FamilyStats, FieldProfileReport};
use crate::rules::CmpOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Cmp(CmpOp),
    /// Membership in the reported top-N values.
    OneOf,
}

impl std::str::FromStr for Operator {
    type Err = FieldProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "one_of" | "in" => Ok(Operator::OneOf),
            other => other.parse().map(Operator::Cmp),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Cmp(op) => f.write_str(op.symbol()),
            Operator::OneOf => f.write_str("one_of"),
        }
    }
}

impl From<CmpOp> for Operator {
    fn from(op: CmpOp) -> Self {
        Operator::Cmp(op)
    }
}

/// A statistic-based selection against one field of a completed profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriterion {
    pub field: String,
    pub statistic: String,
    pub operator: Operator,
    /// Replaces the report's value as comparand when given.
    pub threshold: Option<RawValue>,
}

impl SelectionCriterion {
    pub fn new(field: impl Into<String>, statistic: impl Into<String>, operator: impl Into<Operator>) -> Self {
        Self {
            field: field.into(),
            statistic: statistic.into(),
            operator: operator.into(),
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: impl Into<RawValue>) -> Self {
        self.threshold = Some(threshold.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Null,
    Empty,
    ConversionError,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextFlag {
    Case(CaseCategory),
    NonPrintable,
    EdgeWhitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateFlag {
    Weekend,
    Weekday,
    HasTime,
}

#[derive(Debug, Clone)]
enum Test {
    Category { category: Category, member: bool },
    Number { op: CmpOp, value: f64 },
    Outlier { lower: f64, upper: f64, member: bool },
    Length { op: CmpOp, value: f64 },
    Text { flag: TextFlag, member: bool },
    Date { op: CmpOp, value: NaiveDateTime },
    DateFlag { flag: DateFlag, member: bool },
    Keys { keys: BTreeSet<String>, member: bool },
}

/// A record test produced from a report criterion. Records are coerced with
/// the same rules the profiling pass used; values that fail conversion never
/// match a value-based statistic.
#[derive(Debug, Clone)]
pub struct Predicate {
    position: usize,
    family: Family,
    coercer: Coercer,
    test: Test,
}

impl Predicate {
    pub fn matches(&self, record: &Record) -> bool {
        let coerced = self.coercer.coerce(self.family, record.value(self.position));
        if let Test::Category { category, member } = self.test {
            let is = match category {
                Category::Null => coerced == CoercedValue::Null,
                Category::Empty => coerced == CoercedValue::Empty,
                Category::ConversionError => matches!(coerced, CoercedValue::ConversionError(_)),
                Category::Valid => coerced.is_valid(),
            };
            return is == member;
        }
        match (&self.test, &coerced) {
            (Test::Number { op, value }, CoercedValue::Numeric(v)) => v.partial_cmp(value).is_some_and(|o| op.holds(o)),
            (Test::Outlier { lower, upper, member }, CoercedValue::Numeric(v)) => {
                (*v < *lower || *v > *upper) == *member
            }
            (Test::Length { op, value }, CoercedValue::Text(s)) => {
                let len = s.chars().count() as f64;
                len.partial_cmp(value).is_some_and(|o| op.holds(o))
            }
            (Test::Text { flag, member }, CoercedValue::Text(s)) => {
                let is = match flag {
                    TextFlag::Case(c) => case_of(s) == *c,
                    TextFlag::NonPrintable => has_non_printable(s),
                    TextFlag::EdgeWhitespace => !s.trim().is_empty() && has_edge_whitespace(s),
                };
                is == *member
            }
            (Test::Date { op, value }, CoercedValue::Date(dt)) => op.holds(dt.cmp(value)),
            (Test::DateFlag { flag, member }, CoercedValue::Date(dt)) => {
                let is = match flag {
                    DateFlag::Weekend => is_weekend(dt),
                    DateFlag::Weekday => !is_weekend(dt),
                    DateFlag::HasTime => has_time(dt),
                };
                is == *member
            }
            (Test::Keys { keys, member }, v) => match v.unique_key() {
                Some(k) => keys.contains(&k) == *member,
                None => false,
            },
            _ => false,
        }
    }
}

fn invalid(msg: impl Into<String>) -> FieldProfilerError {
    FieldProfilerError::InvalidCriterion(msg.into())
}

fn metric_value<T: Copy>(m: &Metric<T>, statistic: &str) -> Result<T> {
    match m {
        Metric::Value(v) => Ok(*v),
        Metric::Undefined => Err(invalid(format!("statistic '{statistic}' is undefined for this field"))),
        Metric::NotApplicable => Err(invalid(format!("statistic '{statistic}' has no data for this field"))),
    }
}

fn cmp_only(op: Operator, statistic: &str) -> Result<CmpOp> {
    match op {
        Operator::Cmp(c) => Ok(c),
        Operator::OneOf => Err(invalid(format!("'one_of' applies to top_values, not '{statistic}'"))),
    }
}

fn membership(op: Operator, statistic: &str) -> Result<bool> {
    match op {
        Operator::Cmp(CmpOp::Eq) => Ok(true),
        Operator::Cmp(CmpOp::Ne) => Ok(false),
        other => Err(invalid(format!("'{statistic}' supports only == and !=, got '{other}'"))),
    }
}

const SHAPE_STATISTICS: &[&str] = &[
    "sum",
    "range",
    "variance",
    "std_dev",
    "population_std_dev",
    "cv_percent",
    "iqr",
    "skewness",
    "kurtosis",
    "normality",
    "std_dev_length",
    "span_days",
    "distinct_count",
];

/// Turns a report statistic into a record predicate.
pub fn translate(
    report: &FieldProfileReport,
    statistic: &str,
    op: Operator,
    threshold: Option<&RawValue>,
    cfg: &ProfilingConfig,
) -> Result<Predicate> {
    let coercer = Coercer::from_config(cfg);
    let family = report.family;
    let test = match statistic {
        "null_count" | "empty_count" | "conversion_error_count" | "valid_count" => {
            let category = match statistic {
                "null_count" => Category::Null,
                "empty_count" => Category::Empty,
                "conversion_error_count" => Category::ConversionError,
                _ => Category::Valid,
            };
            Test::Category { category, member: membership(op, statistic)? }
        }
        "top_value" | "top_values" => keys_test(report, statistic, op, threshold, &coercer)?,
        s if SHAPE_STATISTICS.contains(&s) => {
            return Err(invalid(format!("statistic '{s}' describes the whole field and cannot select records")))
        }
        _ => match &report.stats {
            FamilyStats::Numeric(stats) => {
                let comparand = |m: &Metric<f64>| -> Result<f64> {
                    match threshold {
                        Some(raw) => threshold_number(&coercer, raw),
                        None => metric_value(m, statistic),
                    }
                };
                let p = &stats.percentiles;
                let value_stat = match statistic {
                    "min" => Some(&stats.min),
                    "max" => Some(&stats.max),
                    "mean" => Some(&stats.mean),
                    "median" => Some(&p.median),
                    "q1" => Some(&p.q1),
                    "q3" => Some(&p.q3),
                    "p1" => Some(&p.p1),
                    "p5" => Some(&p.p5),
                    "p95" => Some(&p.p95),
                    "p99" => Some(&p.p99),
                    _ => None,
                };
                match (value_stat, statistic) {
                    (Some(m), _) => Test::Number { op: cmp_only(op, statistic)?, value: comparand(m)? },
                    (None, "mode") => {
                        let member = match op {
                            Operator::OneOf => true,
                            other => membership(other, statistic)?,
                        };
                        if stats.modes.is_empty() {
                            return Err(invalid("field has no repeated value, so no mode"));
                        }
                        Test::Keys { keys: stats.modes.iter().map(|v| numeric_key(*v)).collect(), member }
                    }
                    (None, "outliers") => match &stats.outliers {
                        Some(Metric::Value(o)) => Test::Outlier {
                            lower: o.lower_fence,
                            upper: o.upper_fence,
                            member: membership(op, statistic)?,
                        },
                        Some(_) => return Err(invalid("outliers need exact quantiles and valid data")),
                        None => return Err(invalid("outlier analysis is disabled")),
                    },
                    _ => return Err(unknown(statistic, family)),
                }
            }
            FamilyStats::Text(stats) => match statistic {
                "min_length" | "max_length" | "mean_length" => {
                    let m = match statistic {
                        "min_length" => stats.min_length.map(|v| v as f64),
                        "max_length" => stats.max_length.map(|v| v as f64),
                        _ => stats.mean_length,
                    };
                    let value = match threshold {
                        Some(raw) => threshold_number(&coercer, raw)?,
                        None => metric_value(&m, statistic)?,
                    };
                    Test::Length { op: cmp_only(op, statistic)?, value }
                }
                "uppercase" | "lowercase" | "mixed_case" | "no_letters" | "non_printable" => {
                    if stats.case.is_none() {
                        return Err(invalid("case and non-printable analysis is disabled"));
                    }
                    let flag = match statistic {
                        "uppercase" => TextFlag::Case(CaseCategory::Upper),
                        "lowercase" => TextFlag::Case(CaseCategory::Lower),
                        "mixed_case" => TextFlag::Case(CaseCategory::Mixed),
                        "no_letters" => TextFlag::Case(CaseCategory::NoLetters),
                        _ => TextFlag::NonPrintable,
                    };
                    Test::Text { flag, member: membership(op, statistic)? }
                }
                "leading_trailing_whitespace" => Test::Text {
                    flag: TextFlag::EdgeWhitespace,
                    member: membership(op, statistic)?,
                },
                _ => return Err(unknown(statistic, family)),
            },
            FamilyStats::Date(stats) => match statistic {
                "min_date" | "max_date" => {
                    let m = if statistic == "min_date" { &stats.min } else { &stats.max };
                    let value = match threshold {
                        Some(raw) => match coercer.coerce(Family::Date, raw) {
                            CoercedValue::Date(dt) => dt,
                            _ => return Err(invalid(format!("threshold {raw:?} is not a date"))),
                        },
                        None => metric_value(m, statistic)?,
                    };
                    Test::Date { op: cmp_only(op, statistic)?, value }
                }
                "weekend" | "weekday" | "has_time" => {
                    if stats.weekdays.is_none() {
                        return Err(invalid("time-component and weekend analysis is disabled"));
                    }
                    let flag = match statistic {
                        "weekend" => DateFlag::Weekend,
                        "weekday" => DateFlag::Weekday,
                        _ => DateFlag::HasTime,
                    };
                    Test::DateFlag { flag, member: membership(op, statistic)? }
                }
                _ => return Err(unknown(statistic, family)),
            },
        },
    };
    Ok(Predicate {
        position: report.position,
        family,
        coercer,
        test,
    })
}

fn unknown(statistic: &str, family: Family) -> FieldProfilerError {
    invalid(format!("statistic '{statistic}' does not exist for {family} fields"))
}

fn threshold_number(coercer: &Coercer, raw: &RawValue) -> Result<f64> {
    match coercer.coerce(Family::Numeric, raw) {
        CoercedValue::Numeric(v) => Ok(v),
        _ => Err(invalid(format!("threshold {raw:?} is not numeric"))),
    }
}

fn keys_test(
    report: &FieldProfileReport,
    statistic: &str,
    op: Operator,
    threshold: Option<&RawValue>,
    coercer: &Coercer,
) -> Result<Test> {
    let unique = report.unique();
    if statistic == "top_values" {
        if op != Operator::OneOf {
            return Err(invalid("top_values supports only one_of"));
        }
        if unique.top_values.is_empty() {
            return Err(invalid("field has no valid values"));
        }
        let keys = unique.top_values.iter().map(|e| e.value.clone()).collect();
        return Ok(Test::Keys { keys, member: true });
    }
    let member = membership(op, statistic)?;
    let key = match threshold {
        Some(raw) => match coercer.coerce(report.family, raw) {
            CoercedValue::Numeric(v) => numeric_key(v),
            CoercedValue::Text(s) => s,
            CoercedValue::Date(dt) => date_key(&dt),
            _ => return Err(invalid(format!("threshold {raw:?} does not convert to {}", report.family))),
        },
        None => match unique.top_values.first() {
            Some(e) => e.value.clone(),
            None => return Err(invalid("field has no valid values")),
        },
    };
    Ok(Test::Keys { keys: BTreeSet::from([key]), member })
}

/// Re-reads the source under the profile's filter and returns the ids of the
/// records matching the criterion, in source order.
pub fn select(
    source: &dyn RecordSource,
    profile: &DatasetProfile,
    criterion: &SelectionCriterion,
    cfg: &ProfilingConfig,
) -> Result<Vec<RecordId>> {
    let report = profile.require_field(&criterion.field)?;
    let position = source
        .field_position(&report.field_name)
        .ok_or_else(|| FieldProfilerError::FieldNotFound(report.field_name.clone()))?;
    if position != report.position {
        return Err(invalid(format!(
            "field '{}' moved from position {} to {}; the profile does not match this source",
            report.field_name, report.position, position
        )));
    }
    let predicate = translate(
        report,
        &criterion.statistic,
        criterion.operator,
        criterion.threshold.as_ref(),
        cfg,
    )?;
    let mut ids = Vec::new();
    for record in source.records()? {
        let record = record?;
        if profile.filter.admits(record.id) && predicate.matches(&record) {
            ids.push(record.id);
        }
    }
    info!(
        field = %criterion.field,
        statistic = %criterion.statistic,
        operator = %criterion.operator,
        matched = ids.len(),
        "selection finished"
    );
    Ok(ids)
}
