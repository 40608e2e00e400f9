use crate::classify::Family;
use crate::record::RawValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use field_profiler_common::ProfilingConfig;
use regex::Regex;
use std::sync::OnceLock;

/// A raw value converted into its field's family, or the reason it wasn't.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null,
    Empty,
    Numeric(f64),
    Text(String),
    Date(NaiveDateTime),
    /// Keeps the original text for diagnostics.
    ConversionError(String),
}

impl CoercedValue {
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            CoercedValue::Numeric(_) | CoercedValue::Text(_) | CoercedValue::Date(_)
        )
    }

    /// Key under which the unique-value summarizer counts this value.
    pub fn unique_key(&self) -> Option<String> {
        match self {
            CoercedValue::Numeric(v) => Some(numeric_key(*v)),
            CoercedValue::Text(s) => Some(s.clone()),
            CoercedValue::Date(dt) => Some(date_key(dt)),
            CoercedValue::Null | CoercedValue::Empty | CoercedValue::ConversionError(_) => None,
        }
    }
}

pub fn numeric_key(v: f64) -> String {
    format!("{v}")
}

/// Exact midnight renders date-only. Sub-second parts are kept when present,
/// so instants that differ below a second get distinct keys.
pub fn date_key(dt: &NaiveDateTime) -> String {
    let t = dt.time();
    if t.nanosecond() != 0 {
        dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    } else if t.num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

pub(crate) fn at_midnight(d: NaiveDate) -> Option<NaiveDateTime> {
    d.and_hms_opt(0, 0, 0)
}

static RE_NUMBER: OnceLock<Regex> = OnceLock::new();

fn re_number() -> &'static Regex {
    RE_NUMBER.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("numeric pattern is valid")
    })
}

/// Converts raw values into family representations. Holds the configured
/// date formats; cheap to clone.
#[derive(Debug, Clone)]
pub struct Coercer {
    date_formats: Vec<String>,
}

impl Coercer {
    pub fn new(date_formats: Vec<String>) -> Self {
        Self { date_formats }
    }

    pub fn from_config(cfg: &ProfilingConfig) -> Self {
        Self::new(cfg.date_formats.clone())
    }

    pub fn coerce(&self, family: Family, raw: &RawValue) -> CoercedValue {
        if raw.is_null() {
            return CoercedValue::Null;
        }
        match family {
            Family::Numeric => coerce_numeric(raw),
            Family::Text => coerce_text(raw),
            Family::Date => self.coerce_date(raw),
        }
    }

    fn coerce_date(&self, raw: &RawValue) -> CoercedValue {
        match raw {
            RawValue::Null => CoercedValue::Null,
            RawValue::Date(d) => match at_midnight(*d) {
                Some(dt) => CoercedValue::Date(dt),
                None => CoercedValue::ConversionError(d.to_string()),
            },
            RawValue::DateTime(dt) => CoercedValue::Date(*dt),
            RawValue::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return CoercedValue::Empty;
                }
                match self.parse_date(t) {
                    Some(dt) => CoercedValue::Date(dt),
                    None => CoercedValue::ConversionError(s.clone()),
                }
            }
            RawValue::Bool(_) | RawValue::Int(_) | RawValue::Float(_) => {
                CoercedValue::ConversionError(raw.to_text().unwrap_or_default())
            }
        }
    }

    /// Tries each configured format in order. Formats carrying an offset
    /// (`%z`, `%:z`) are normalized to UTC; date-only formats yield midnight.
    pub fn parse_date(&self, s: &str) -> Option<NaiveDateTime> {
        for fmt in &self.date_formats {
            if fmt.contains("%z") || fmt.contains("%:z") || fmt.contains("%#z") {
                if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                    return Some(dt.naive_utc());
                }
                continue;
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt);
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return at_midnight(d);
            }
        }
        None
    }
}

impl Default for Coercer {
    fn default() -> Self {
        Self::from_config(&ProfilingConfig::default())
    }
}

/// Numbers are carried as f64, so integers beyond ±2^53 round to the nearest
/// representable value and neighbouring large ids can share a key.
fn coerce_numeric(raw: &RawValue) -> CoercedValue {
    match raw {
        RawValue::Null => CoercedValue::Null,
        RawValue::Int(i) => CoercedValue::Numeric(*i as f64),
        RawValue::Float(f) if f.is_finite() => CoercedValue::Numeric(*f),
        RawValue::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                return CoercedValue::Empty;
            }
            match parse_number(t) {
                Some(v) => CoercedValue::Numeric(v),
                None => CoercedValue::ConversionError(s.clone()),
            }
        }
        RawValue::Float(_) | RawValue::Bool(_) | RawValue::Date(_) | RawValue::DateTime(_) => {
            CoercedValue::ConversionError(raw.to_text().unwrap_or_default())
        }
    }
}

/// Plain decimal or scientific notation; rejects `inf`, `NaN`, thousands separators.
pub(crate) fn parse_number(t: &str) -> Option<f64> {
    if !re_number().is_match(t) {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn coerce_text(raw: &RawValue) -> CoercedValue {
    match raw {
        RawValue::Null => CoercedValue::Null,
        RawValue::Text(s) if s.is_empty() => CoercedValue::Empty,
        other => match other.to_text() {
            Some(s) if s.is_empty() => CoercedValue::Empty,
            Some(s) => CoercedValue::Text(s),
            None => CoercedValue::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn c() -> Coercer {
        Coercer::default()
    }

    #[test]
    fn numeric_accepts_native_and_text() {
        assert_eq!(c().coerce(Family::Numeric, &RawValue::Int(7)), CoercedValue::Numeric(7.0));
        assert_eq!(c().coerce(Family::Numeric, &" -2.5e1 ".into()), CoercedValue::Numeric(-25.0));
        assert_eq!(c().coerce(Family::Numeric, &".5".into()), CoercedValue::Numeric(0.5));
    }

    #[test]
    fn numeric_rejects_garbage_keeping_text() {
        assert_eq!(
            c().coerce(Family::Numeric, &"12abc".into()),
            CoercedValue::ConversionError("12abc".into())
        );
        assert!(matches!(c().coerce(Family::Numeric, &"NaN".into()), CoercedValue::ConversionError(_)));
        assert!(matches!(c().coerce(Family::Numeric, &"1,000".into()), CoercedValue::ConversionError(_)));
        assert!(matches!(c().coerce(Family::Numeric, &RawValue::Float(f64::NAN)), CoercedValue::ConversionError(_)));
        assert!(matches!(c().coerce(Family::Numeric, &RawValue::Bool(true)), CoercedValue::ConversionError(_)));
    }

    #[test]
    fn blank_and_null_are_distinct() {
        assert_eq!(c().coerce(Family::Numeric, &"  ".into()), CoercedValue::Empty);
        assert_eq!(c().coerce(Family::Text, &"".into()), CoercedValue::Empty);
        assert_eq!(c().coerce(Family::Text, &RawValue::Null), CoercedValue::Null);
        // whitespace is a real text value
        assert_eq!(c().coerce(Family::Text, &" ".into()), CoercedValue::Text(" ".into()));
    }

    #[test]
    fn date_formats_first_match_wins() {
        let d = c().coerce(Family::Date, &"2024-03-09".into());
        assert_eq!(d, CoercedValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(0, 0, 0).unwrap()));
        let dt = c().coerce(Family::Date, &"2024-03-09 13:45:00".into());
        assert_eq!(dt, CoercedValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(13, 45, 0).unwrap()));
        let de = c().coerce(Family::Date, &"09.03.2024".into());
        assert_eq!(de, d);
    }

    #[test]
    fn date_with_offset_normalizes_to_utc() {
        let v = c().coerce(Family::Date, &"2024-03-09T10:00:00+02:00".into());
        assert_eq!(v, CoercedValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(8, 0, 0).unwrap()));
        let z = c().coerce(Family::Date, &"2024-03-09T10:00:00Z".into());
        assert_eq!(z, CoercedValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(10, 0, 0).unwrap()));
    }

    #[test]
    fn date_rejects_numbers_and_garbage() {
        assert!(matches!(c().coerce(Family::Date, &RawValue::Int(20240101)), CoercedValue::ConversionError(_)));
        assert!(matches!(c().coerce(Family::Date, &"yesterday".into()), CoercedValue::ConversionError(_)));
    }

    #[test]
    fn text_always_succeeds() {
        assert_eq!(c().coerce(Family::Text, &RawValue::Int(5)), CoercedValue::Text("5".into()));
        let d = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(c().coerce(Family::Text, &RawValue::Date(d)), CoercedValue::Text("2020-01-02".into()));
    }

    #[test]
    fn unique_keys() {
        assert_eq!(CoercedValue::Numeric(20.0).unique_key().as_deref(), Some("20"));
        assert_eq!(CoercedValue::Numeric(16.5).unique_key().as_deref(), Some("16.5"));
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(CoercedValue::Date(dt).unique_key().as_deref(), Some("2020-01-02"));
        assert_eq!(CoercedValue::Null.unique_key(), None);
    }

    #[test]
    fn date_keys_keep_sub_second_parts() {
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let a = day.and_hms_milli_opt(10, 0, 0, 250).unwrap();
        let b = day.and_hms_milli_opt(10, 0, 0, 750).unwrap();
        assert_eq!(date_key(&a), "2020-01-02 10:00:00.250");
        assert_ne!(date_key(&a), date_key(&b));
        let just_after_midnight = day.and_hms_milli_opt(0, 0, 0, 5).unwrap();
        assert_eq!(date_key(&just_after_midnight), "2020-01-02 00:00:00.005");
        assert_eq!(date_key(&day.and_hms_opt(10, 0, 0).unwrap()), "2020-01-02 10:00:00");
    }

    #[test]
    fn large_integers_round_to_f64() {
        let exact = c().coerce(Family::Numeric, &RawValue::Int(9_007_199_254_740_992));
        assert_eq!(exact.unique_key().as_deref(), Some("9007199254740992"));
        let rounded = c().coerce(Family::Numeric, &RawValue::Int(9_007_199_254_740_993));
        assert_eq!(rounded, exact);
    }
}
