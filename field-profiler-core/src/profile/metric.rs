use serde::{Deserialize, Serialize};

/// A reported statistic that separates "computed" from "could not be computed".
///
/// `Undefined` means data existed but too little of it (or zero spread) for
/// the statistic; `NotApplicable` means there was no valid data at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Metric<T> {
    Value(T),
    Undefined,
    NotApplicable,
}

impl<T> Metric<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::Undefined | Metric::NotApplicable => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metric<U> {
        match self {
            Metric::Value(v) => Metric::Value(f(v)),
            Metric::Undefined => Metric::Undefined,
            Metric::NotApplicable => Metric::NotApplicable,
        }
    }

    /// `Value` when `defined`, else `Undefined`.
    pub fn when(defined: bool, f: impl FnOnce() -> T) -> Self {
        if defined {
            Metric::Value(f())
        } else {
            Metric::Undefined
        }
    }
}

impl<T: Copy> Metric<T> {
    pub fn get(&self) -> Option<T> {
        self.as_option().copied()
    }
}

impl<T: std::fmt::Display> Metric<T> {
    pub fn display(&self) -> String {
        match self {
            Metric::Value(v) => v.to_string(),
            Metric::Undefined => "undefined".into(),
            Metric::NotApplicable => "n/a".into(),
        }
    }
}

impl Metric<f64> {
    pub fn display_f64(&self, precision: usize) -> String {
        match self {
            Metric::Value(v) => format!("{v:.precision$}"),
            other => other.display(),
        }
    }
}

/// Count with its share of a base, both reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub count: u64,
    pub percentage: Metric<f64>,
}

impl Share {
    pub fn of(count: u64, base: u64) -> Self {
        Self {
            count,
            percentage: if base > 0 {
                Metric::Value(count as f64 / base as f64 * 100.0)
            } else {
                Metric::NotApplicable
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_distinguishes_states() {
        let v = serde_json::to_string(&Metric::Value(0.0)).unwrap();
        let u = serde_json::to_string(&Metric::<f64>::Undefined).unwrap();
        let n = serde_json::to_string(&Metric::<f64>::NotApplicable).unwrap();
        assert_eq!(v, r#"{"status":"value","value":0.0}"#);
        assert_eq!(u, r#"{"status":"undefined"}"#);
        assert_eq!(n, r#"{"status":"not_applicable"}"#);
    }

    #[test]
    fn share_of_zero_base() {
        assert_eq!(Share::of(0, 0).percentage, Metric::NotApplicable);
        assert_eq!(Share::of(1, 4).percentage, Metric::Value(25.0));
    }
}
