pub mod classify;
pub mod coerce;
pub mod export;
pub mod profile;
pub mod reader;
pub mod record;
pub mod report;
pub mod rules;
pub mod select;

pub use field_profiler_common::{FieldProfilerError, ProfilingConfig, Result};

pub use classify::{classify, classify_detailed, Classification, Family, FieldDescriptor};
pub use coerce::{CoercedValue, Coercer};
pub use export::{export, print_summary, ExportFormat};
pub use profile::{Metric, ProfileOutcome, Profiler, Share};
pub use reader::ParquetSource;
pub use record::{
    DeclaredKind, FieldSpec, MemorySource, RawValue, Record, RecordFilter, RecordId, RecordIter, RecordSource,
};
pub use report::{finalize, DatasetProfile, FamilyStats, FieldProfileReport, ProfileWarning};
pub use rules::{CmpOp, Rule, RuleOutcome};
pub use select::{select, translate, Operator, Predicate, SelectionCriterion};
