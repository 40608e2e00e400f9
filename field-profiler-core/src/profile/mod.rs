pub mod correlation;
pub mod field;
pub mod frequency;
pub mod full_scan;
pub mod histogram;
pub mod metric;
pub mod numeric;
pub mod temporal;
pub mod text;

pub use correlation::{CorrelationAccumulator, CorrelationMatrix};
pub use field::{FamilyAccumulator, FieldAccumulator, FieldCounts};
pub use frequency::{UniqueValueEntry, UniqueValueSummarizer, UniqueValueSummary};
pub use full_scan::{ProfileOutcome, Profiler};
pub use histogram::{build_histogram, HistogramBin};
pub use metric::{Metric, Share};
pub use numeric::{DistributionShape, NormalityTest, NumericStats, OutlierSummary, Percentiles, QuantileMethod};
pub use temporal::{CalendarCount, DateStats, TimeBreakdown, WeekdayBreakdown};
pub use text::{CaseBreakdown, CaseCategory, NonPrintableSummary, TextStats};
