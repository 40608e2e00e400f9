use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::frequency::{UniqueValueSummarizer, UniqueValueSummary};
use super::metric::{Metric, Share};
use crate::coerce::parse_number;
use crate::record::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseCategory {
    Upper,
    Lower,
    Mixed,
    NoLetters,
}

/// Categorises by cased letters only; digits and punctuation are ignored.
pub fn case_of(s: &str) -> CaseCategory {
    let mut upper = false;
    let mut lower = false;
    for c in s.chars() {
        upper |= c.is_uppercase();
        lower |= c.is_lowercase();
        if upper && lower {
            return CaseCategory::Mixed;
        }
    }
    match (upper, lower) {
        (true, false) => CaseCategory::Upper,
        (false, true) => CaseCategory::Lower,
        _ => CaseCategory::NoLetters,
    }
}

static RE_NON_PRINTABLE: OnceLock<Regex> = OnceLock::new();

// Cc, Cf, Co, Cn, Zl and Zp, minus tab, newline and carriage return.
fn re_non_printable() -> &'static Regex {
    RE_NON_PRINTABLE.get_or_init(|| {
        Regex::new(r"[\p{Cc}\p{Cf}\p{Co}\p{Cn}\p{Zl}\p{Zp}&&[^\t\n\r]]").unwrap()
    })
}

/// True when `s` holds a control, format, private-use, unassigned or
/// line/paragraph separator character other than tab/newline/carriage return.
pub fn has_non_printable(s: &str) -> bool {
    re_non_printable().is_match(s)
}

pub fn has_edge_whitespace(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

static RE_DATE_LIKE: OnceLock<Regex> = OnceLock::new();

fn re_date_like() -> &'static Regex {
    RE_DATE_LIKE.get_or_init(|| {
        Regex::new(r"^(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[./]\d{1,2}[./]\d{4})([T ]\d{1,2}:\d{2}(:\d{2})?)?").unwrap()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBreakdown {
    pub uppercase: Share,
    pub lowercase: Share,
    pub mixed_case: Share,
    pub no_letters: Share,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonPrintableSummary {
    pub count: u64,
    pub rate: Metric<f64>,
    pub record_ids: Vec<RecordId>,
    pub ids_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    /// Non-empty values; lengths are counted in characters.
    pub count: u64,
    pub min_length: Metric<u64>,
    pub max_length: Metric<u64>,
    pub mean_length: Metric<f64>,
    pub std_dev_length: Metric<f64>,
    pub whitespace_only: u64,
    pub leading_trailing_whitespace: u64,
    /// `None` when case and non-printable analysis is disabled.
    pub case: Option<CaseBreakdown>,
    pub non_printable: Option<NonPrintableSummary>,
    pub numeric_like: u64,
    pub date_like: u64,
    pub unique: UniqueValueSummary,
}

#[derive(Debug, Clone)]
pub struct TextAccumulator {
    count: u64,
    min_len: u64,
    max_len: u64,
    mean_len: f64,
    m2_len: f64,
    whitespace_only: u64,
    edge_whitespace: u64,
    case_counts: Option<[u64; 4]>,
    non_printable: Option<(u64, Vec<RecordId>)>,
    id_cap: usize,
    numeric_like: u64,
    date_like: u64,
    unique: UniqueValueSummarizer,
}

impl TextAccumulator {
    pub fn new(case_and_nonprintable: bool, id_cap: usize, unique: UniqueValueSummarizer) -> Self {
        Self {
            count: 0,
            min_len: u64::MAX,
            max_len: 0,
            mean_len: 0.0,
            m2_len: 0.0,
            whitespace_only: 0,
            edge_whitespace: 0,
            case_counts: case_and_nonprintable.then_some([0; 4]),
            non_printable: case_and_nonprintable.then(|| (0, Vec::new())),
            id_cap,
            numeric_like: 0,
            date_like: 0,
            unique,
        }
    }

    /// Takes non-empty values only; empties are accounted at the field level.
    pub fn add(&mut self, id: RecordId, s: &str) {
        self.count += 1;
        let len = s.chars().count() as u64;
        self.min_len = self.min_len.min(len);
        self.max_len = self.max_len.max(len);
        let delta = len as f64 - self.mean_len;
        self.mean_len += delta / self.count as f64;
        self.m2_len += delta * (len as f64 - self.mean_len);

        if s.trim().is_empty() {
            self.whitespace_only += 1;
        } else if has_edge_whitespace(s) {
            self.edge_whitespace += 1;
        }
        if let Some(counts) = &mut self.case_counts {
            let idx = match case_of(s) {
                CaseCategory::Upper => 0,
                CaseCategory::Lower => 1,
                CaseCategory::Mixed => 2,
                CaseCategory::NoLetters => 3,
            };
            counts[idx] += 1;
        }
        if let Some((n, ids)) = &mut self.non_printable {
            if has_non_printable(s) {
                *n += 1;
                if ids.len() < self.id_cap {
                    ids.push(id);
                }
            }
        }
        let trimmed = s.trim();
        if parse_number(trimmed).is_some() {
            self.numeric_like += 1;
        } else if re_date_like().is_match(trimmed) {
            self.date_like += 1;
        }
        self.unique.observe(s);
    }

    pub fn finalize(&self) -> TextStats {
        let n = self.count;
        let (min_length, max_length, mean_length, std_dev_length) = if n == 0 {
            (Metric::NotApplicable, Metric::NotApplicable, Metric::NotApplicable, Metric::NotApplicable)
        } else {
            let var = if n > 1 { self.m2_len / (n - 1) as f64 } else { 0.0 };
            (
                Metric::Value(self.min_len),
                Metric::Value(self.max_len),
                Metric::Value(self.mean_len),
                Metric::Value(var.sqrt()),
            )
        };
        TextStats {
            count: n,
            min_length,
            max_length,
            mean_length,
            std_dev_length,
            whitespace_only: self.whitespace_only,
            leading_trailing_whitespace: self.edge_whitespace,
            case: self.case_counts.map(|c| CaseBreakdown {
                uppercase: Share::of(c[0], n),
                lowercase: Share::of(c[1], n),
                mixed_case: Share::of(c[2], n),
                no_letters: Share::of(c[3], n),
            }),
            non_printable: self.non_printable.as_ref().map(|(count, ids)| NonPrintableSummary {
                count: *count,
                rate: Share::of(*count, n).percentage,
                record_ids: ids.clone(),
                ids_truncated: *count > ids.len() as u64,
            }),
            numeric_like: self.numeric_like,
            date_like: self.date_like,
            unique: self.unique.finalize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc() -> TextAccumulator {
        TextAccumulator::new(true, 2, UniqueValueSummarizer::new(10, 100))
    }

    #[test]
    fn case_categories() {
        assert_eq!(case_of("Bob"), CaseCategory::Mixed);
        assert_eq!(case_of("bob"), CaseCategory::Lower);
        assert_eq!(case_of("BOB 42"), CaseCategory::Upper);
        assert_eq!(case_of("42-17"), CaseCategory::NoLetters);
        assert_eq!(case_of("Ärger"), CaseCategory::Mixed);
    }

    #[test]
    fn non_printable_detection() {
        assert!(has_non_printable("a\u{0007}b"));
        assert!(has_non_printable("zero\u{200B}width"));
        assert!(!has_non_printable("tab\tand\nnewline"));
        assert!(!has_non_printable("plain"));
        assert!(!has_non_printable("crlf\r\n"));
    }

    #[test]
    fn invisible_format_and_private_use_are_non_printable() {
        assert!(has_non_printable("abc\u{202E}def"));
        assert!(has_non_printable("\u{2066}isolate"));
        assert!(has_non_printable("pua\u{E000}"));
        assert!(has_non_printable("soft\u{00AD}hyphen"));
        assert!(has_non_printable("line\u{2028}sep"));
        assert!(has_non_printable("unassigned\u{0378}"));
        assert!(!has_non_printable("żółw café"));
    }

    #[test]
    fn bob_scenario_case_breakdown() {
        let mut a = acc();
        a.add(RecordId(0), "Bob");
        a.add(RecordId(1), "bob");
        let s = a.finalize();
        let case = s.case.unwrap();
        assert_eq!(case.mixed_case.count, 1);
        assert_eq!(case.lowercase.count, 1);
        assert_eq!(case.uppercase.count, 0);
        assert_eq!(case.no_letters.count, 0);
        assert_eq!(case.mixed_case.percentage, Metric::Value(50.0));
    }

    #[test]
    fn length_stats_in_chars() {
        let mut a = acc();
        a.add(RecordId(0), "héllo");
        a.add(RecordId(1), "hi");
        a.add(RecordId(2), "abc");
        let s = a.finalize();
        assert_eq!(s.min_length, Metric::Value(2));
        assert_eq!(s.max_length, Metric::Value(5));
        assert!((s.mean_length.get().unwrap() - 10.0 / 3.0).abs() < 1e-9);
        assert!((s.std_dev_length.get().unwrap() - (7.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn non_printable_ids_are_capped() {
        let mut a = acc();
        for i in 0..4 {
            a.add(RecordId(i), "x\u{0001}");
        }
        let np = a.finalize().non_printable.unwrap();
        assert_eq!(np.count, 4);
        assert_eq!(np.record_ids, vec![RecordId(0), RecordId(1)]);
        assert!(np.ids_truncated);
    }

    #[test]
    fn whitespace_and_hints() {
        let mut a = acc();
        a.add(RecordId(0), "   ");
        a.add(RecordId(1), " padded");
        a.add(RecordId(2), "12.5");
        a.add(RecordId(3), "2024-01-31");
        let s = a.finalize();
        assert_eq!(s.whitespace_only, 1);
        assert_eq!(s.leading_trailing_whitespace, 1);
        assert_eq!(s.numeric_like, 1);
        assert_eq!(s.date_like, 1);
    }

    #[test]
    fn disabled_group_skips_analysis() {
        let mut a = TextAccumulator::new(false, 10, UniqueValueSummarizer::new(10, 100));
        a.add(RecordId(0), "ABC");
        let s = a.finalize();
        assert!(s.case.is_none());
        assert!(s.non_printable.is_none());
    }

    #[test]
    fn empty_accumulator() {
        let s = acc().finalize();
        assert_eq!(s.mean_length, Metric::NotApplicable);
        assert_eq!(s.case.unwrap().uppercase.percentage, Metric::NotApplicable);
    }
}
