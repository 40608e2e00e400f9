use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::frequency::{UniqueValueSummarizer, UniqueValueSummary};
use super::metric::{Metric, Share};
use crate::coerce::date_key;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const COMMON_LIMIT: usize = 3;
const NOON: Option<NaiveTime> = NaiveTime::from_hms_opt(12, 0, 0);

pub fn is_weekend(dt: &NaiveDateTime) -> bool {
    matches!(dt.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn has_time(dt: &NaiveDateTime) -> bool {
    dt.time() != NaiveTime::MIN
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarCount<K> {
    pub key: K,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBreakdown {
    pub has_time: Share,
    pub date_only: Share,
    pub midnight: Share,
    pub noon: Share,
    /// Hour-of-day counts, only populated when some value carries a time.
    pub hours: Vec<CalendarCount<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayBreakdown {
    /// Monday first.
    pub counts: Vec<CalendarCount<String>>,
    pub common: Vec<CalendarCount<String>>,
    pub weekend: Share,
    pub weekday: Share,
    /// weekend / weekday; undefined without weekday values.
    pub weekend_ratio: Metric<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateStats {
    pub count: u64,
    pub min: Metric<NaiveDateTime>,
    pub max: Metric<NaiveDateTime>,
    pub span_days: Metric<f64>,
    pub common_years: Vec<CalendarCount<i32>>,
    pub common_months: Vec<CalendarCount<u32>>,
    pub reference_date: NaiveDate,
    pub before_reference: u64,
    pub after_reference: u64,
    /// `None` when time-component and weekend analysis is disabled.
    pub time: Option<TimeBreakdown>,
    pub weekdays: Option<WeekdayBreakdown>,
    pub unique: UniqueValueSummary,
}

#[derive(Debug, Clone, Default)]
struct TimeCounts {
    has_time: u64,
    midnight: u64,
    noon: u64,
    hours: [u64; 24],
    weekdays: [u64; 7],
}

#[derive(Debug, Clone)]
pub struct TemporalAccumulator {
    count: u64,
    min: Option<NaiveDateTime>,
    max: Option<NaiveDateTime>,
    years: BTreeMap<i32, u64>,
    months: [u64; 12],
    today: NaiveDate,
    before: u64,
    after: u64,
    time: Option<TimeCounts>,
    unique: UniqueValueSummarizer,
}

impl TemporalAccumulator {
    pub fn new(time_and_weekend: bool, today: NaiveDate, unique: UniqueValueSummarizer) -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            years: BTreeMap::new(),
            months: [0; 12],
            today,
            before: 0,
            after: 0,
            time: time_and_weekend.then(TimeCounts::default),
            unique,
        }
    }

    pub fn add(&mut self, dt: NaiveDateTime) {
        self.count += 1;
        self.min = Some(self.min.map_or(dt, |m| m.min(dt)));
        self.max = Some(self.max.map_or(dt, |m| m.max(dt)));
        *self.years.entry(dt.year()).or_insert(0) += 1;
        self.months[dt.month0() as usize] += 1;
        match dt.date().cmp(&self.today) {
            std::cmp::Ordering::Less => self.before += 1,
            std::cmp::Ordering::Greater => self.after += 1,
            std::cmp::Ordering::Equal => {}
        }
        if let Some(t) = &mut self.time {
            if has_time(&dt) {
                t.has_time += 1;
            } else {
                t.midnight += 1;
            }
            if Some(dt.time()) == NOON {
                t.noon += 1;
            }
            t.hours[dt.hour() as usize] += 1;
            t.weekdays[dt.weekday().num_days_from_monday() as usize] += 1;
        }
        self.unique.observe(&date_key(&dt));
    }

    pub fn finalize(&self) -> DateStats {
        let n = self.count;
        let (min, max, span_days) = match (self.min, self.max) {
            (Some(lo), Some(hi)) => (
                Metric::Value(lo),
                Metric::Value(hi),
                Metric::Value((hi - lo).num_seconds() as f64 / 86_400.0),
            ),
            _ => (Metric::NotApplicable, Metric::NotApplicable, Metric::NotApplicable),
        };
        let common_years = top_counts(self.years.iter().map(|(y, c)| (*y, *c)));
        let common_months = top_counts(
            self.months
                .iter()
                .enumerate()
                .map(|(i, c)| (i as u32 + 1, *c)),
        );

        let (time, weekdays) = match &self.time {
            None => (None, None),
            Some(t) => {
                let hours = if t.has_time > 0 {
                    t.hours
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| **c > 0)
                        .map(|(h, c)| CalendarCount { key: h as u32, count: *c })
                        .collect()
                } else {
                    Vec::new()
                };
                let time = TimeBreakdown {
                    has_time: Share::of(t.has_time, n),
                    date_only: Share::of(n - t.has_time, n),
                    midnight: Share::of(t.midnight, n),
                    noon: Share::of(t.noon, n),
                    hours,
                };
                let weekend: u64 = t.weekdays[5] + t.weekdays[6];
                let weekday = n - weekend;
                let counts: Vec<CalendarCount<String>> = WEEKDAYS
                    .iter()
                    .zip(t.weekdays.iter())
                    .map(|(d, c)| CalendarCount { key: d.to_string(), count: *c })
                    .collect();
                let common = top_counts(WEEKDAYS.iter().zip(t.weekdays.iter()).map(|(d, c)| (d.num_days_from_monday(), *c)))
                    .into_iter()
                    .map(|cc| CalendarCount { key: WEEKDAYS[cc.key as usize].to_string(), count: cc.count })
                    .collect();
                let breakdown = WeekdayBreakdown {
                    counts,
                    common,
                    weekend: Share::of(weekend, n),
                    weekday: Share::of(weekday, n),
                    weekend_ratio: if n == 0 {
                        Metric::NotApplicable
                    } else {
                        Metric::when(weekday > 0, || weekend as f64 / weekday as f64)
                    },
                };
                (Some(time), Some(breakdown))
            }
        };

        DateStats {
            count: n,
            min,
            max,
            span_days,
            common_years,
            common_months,
            reference_date: self.today,
            before_reference: self.before,
            after_reference: self.after,
            time,
            weekdays,
            unique: self.unique.finalize(),
        }
    }
}

/// Highest counts first, ties by key; zero counts dropped.
fn top_counts<K: Ord + Copy>(items: impl Iterator<Item = (K, u64)>) -> Vec<CalendarCount<K>> {
    let mut v: Vec<(K, u64)> = items.filter(|(_, c)| *c > 0).collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    v.into_iter()
        .take(COMMON_LIMIT)
        .map(|(key, count)| CalendarCount { key, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn acc(groups: bool) -> TemporalAccumulator {
        TemporalAccumulator::new(
            groups,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            UniqueValueSummarizer::new(10, 100),
        )
    }

    #[test]
    fn range_and_reference_split() {
        let mut a = acc(true);
        a.add(dt("2024-01-06 00:00:00")); // Saturday
        a.add(dt("2024-01-08 12:00:00")); // Monday
        a.add(dt("2024-12-25 08:30:00")); // Wednesday
        let s = a.finalize();
        assert_eq!(s.min, Metric::Value(dt("2024-01-06 00:00:00")));
        assert_eq!(s.max, Metric::Value(dt("2024-12-25 08:30:00")));
        assert_eq!((s.before_reference, s.after_reference), (2, 1));
        assert!((s.span_days.get().unwrap() - 354.354_166).abs() < 1e-3);
        assert_eq!(s.common_years, vec![CalendarCount { key: 2024, count: 3 }]);
    }

    #[test]
    fn time_and_weekday_breakdown() {
        let mut a = acc(true);
        a.add(dt("2024-01-06 00:00:00"));
        a.add(dt("2024-01-08 12:00:00"));
        a.add(dt("2024-01-10 08:30:00"));
        a.add(dt("2024-01-07 00:00:00")); // Sunday
        let s = a.finalize();
        let t = s.time.unwrap();
        assert_eq!(t.has_time.count, 2);
        assert_eq!(t.midnight.count, 2);
        assert_eq!(t.noon.count, 1);
        assert_eq!(t.hours.len(), 3);
        let w = s.weekdays.unwrap();
        assert_eq!(w.weekend.count, 2);
        assert_eq!(w.weekday.count, 2);
        assert_eq!(w.weekend_ratio, Metric::Value(1.0));
        assert_eq!(w.counts[0], CalendarCount { key: "Mon".to_string(), count: 1 });
        assert_eq!(w.counts.iter().map(|c| c.count).sum::<u64>(), 4);
    }

    #[test]
    fn date_only_values_have_no_hours() {
        let mut a = acc(true);
        a.add(dt("2023-03-01 00:00:00"));
        let t = a.finalize().time.unwrap();
        assert!(t.hours.is_empty());
        assert_eq!(t.date_only.percentage, Metric::Value(100.0));
    }

    #[test]
    fn disabled_group_and_empty() {
        let s = acc(false).finalize();
        assert!(s.time.is_none());
        assert!(s.weekdays.is_none());
        assert_eq!(s.min, Metric::NotApplicable);
        assert!(s.common_months.is_empty());
    }
}
