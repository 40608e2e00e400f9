use crate::coerce::Coercer;
use crate::record::{DeclaredKind, RawValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Statistical treatment applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Numeric,
    Text,
    Date,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Family::Numeric => "numeric",
            Family::Text => "text",
            Family::Date => "date",
        };
        f.write_str(s)
    }
}

// tie-break order when several families coerce the same share of the sample
const PRIORITY: [Family; 3] = [Family::Numeric, Family::Date, Family::Text];

/// How a field's family was decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Classification {
    Declared,
    Sampled {
        sample_size: usize,
        success_ratio: f64,
        /// More than one family reached the winning ratio.
        ambiguous: bool,
    },
}

/// Immutable per-run description of a profiled field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Position of the field in the source's field list.
    pub position: usize,
    pub declared: DeclaredKind,
    pub family: Family,
    pub classification: Classification,
}

pub fn classify(hint: DeclaredKind, samples: &[RawValue], coercer: &Coercer, k: usize) -> Family {
    classify_detailed(hint, samples, coercer, k).0
}

/// Declared hints win outright. Otherwise the first `k` non-null, non-blank
/// samples are coerced into every family and the highest success ratio wins;
/// an empty sample falls back to Text.
pub fn classify_detailed(
    hint: DeclaredKind,
    samples: &[RawValue],
    coercer: &Coercer,
    k: usize,
) -> (Family, Classification) {
    match hint {
        DeclaredKind::Numeric => return (Family::Numeric, Classification::Declared),
        DeclaredKind::Text => return (Family::Text, Classification::Declared),
        DeclaredKind::Date => return (Family::Date, Classification::Declared),
        DeclaredKind::Unknown => {}
    }
    let sample: Vec<&RawValue> = samples
        .iter()
        .filter(|v| !is_blank(v))
        .take(k)
        .collect();
    if sample.is_empty() {
        return (
            Family::Text,
            Classification::Sampled {
                sample_size: 0,
                success_ratio: 0.0,
                ambiguous: false,
            },
        );
    }
    let ratios: Vec<(Family, f64)> = PRIORITY
        .iter()
        .map(|&fam| {
            let ok = sample
                .iter()
                .filter(|v| coercer.coerce(fam, v).is_valid())
                .count();
            (fam, ok as f64 / sample.len() as f64)
        })
        .collect();
    let best = ratios.iter().map(|(_, r)| *r).fold(f64::MIN, f64::max);
    let winners: Vec<Family> = ratios
        .iter()
        .filter(|(_, r)| *r == best)
        .map(|(f, _)| *f)
        .collect();
    // PRIORITY order is preserved, so the first winner is the tie-break result
    let family = winners[0];
    let ambiguous = winners.len() > 1;
    if ambiguous {
        debug!(?winners, chosen = %family, ratio = best, "classification tie resolved by priority");
    }
    (
        family,
        Classification::Sampled {
            sample_size: sample.len(),
            success_ratio: best,
            ambiguous,
        },
    )
}

fn is_blank(v: &RawValue) -> bool {
    match v {
        RawValue::Null => true,
        RawValue::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Whether a raw value counts toward a field's classification sample.
pub(crate) fn is_sample_candidate(v: &RawValue) -> bool {
    !is_blank(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(hint: DeclaredKind, vals: Vec<RawValue>) -> (Family, Classification) {
        classify_detailed(hint, &vals, &Coercer::default(), 1000)
    }

    #[test]
    fn declared_hint_wins() {
        let (f, c) = run(DeclaredKind::Text, vec!["1".into(), "2".into()]);
        assert_eq!(f, Family::Text);
        assert_eq!(c, Classification::Declared);
        assert_eq!(run(DeclaredKind::Date, vec![]).0, Family::Date);
    }

    #[test]
    fn clean_numbers_are_numeric_via_priority() {
        let (f, c) = run(DeclaredKind::Unknown, vec!["1".into(), "2.5".into(), RawValue::Null]);
        assert_eq!(f, Family::Numeric);
        match c {
            Classification::Sampled { sample_size, ambiguous, .. } => {
                assert_eq!(sample_size, 2);
                assert!(ambiguous); // text ties at 100%
            }
            _ => panic!("expected sampled"),
        }
    }

    #[test]
    fn dates_beat_text() {
        let (f, _) = run(DeclaredKind::Unknown, vec!["2024-01-01".into(), "2024-02-01 10:00:00".into()]);
        assert_eq!(f, Family::Date);
    }

    #[test]
    fn mixed_values_fall_to_text() {
        let (f, _) = run(DeclaredKind::Unknown, vec!["1".into(), "abc".into()]);
        assert_eq!(f, Family::Text);
    }

    #[test]
    fn empty_sample_defaults_to_text() {
        let (f, c) = run(DeclaredKind::Unknown, vec![RawValue::Null, "".into()]);
        assert_eq!(f, Family::Text);
        assert!(matches!(c, Classification::Sampled { sample_size: 0, .. }));
    }

    #[test]
    fn sample_is_bounded() {
        let mut vals: Vec<RawValue> = (0..5).map(RawValue::from).collect();
        vals.push("oops".into());
        let (f, _) = classify_detailed(DeclaredKind::Unknown, &vals, &Coercer::default(), 5);
        assert_eq!(f, Family::Numeric);
    }
}
