use chrono::NaiveDate;
use field_profiler_common::{FieldProfilerError, ProfilingConfig, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::correlation::CorrelationAccumulator;
use super::field::FieldAccumulator;
use crate::classify::{classify_detailed, is_sample_candidate, Family, FieldDescriptor};
use crate::coerce::Coercer;
use crate::record::{DeclaredKind, RawValue, Record, RecordFilter, RecordSource};
use crate::report::{finalize, DatasetProfile, ProfileWarning};
use crate::rules::{compile_rules, RuleTally};

const PROGRESS_EVERY: u64 = 1000;

/// Result of a profiling run. A cancelled run carries nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileOutcome {
    Completed(DatasetProfile),
    Cancelled,
}

impl ProfileOutcome {
    pub fn completed(self) -> Option<DatasetProfile> {
        match self {
            ProfileOutcome::Completed(p) => Some(p),
            ProfileOutcome::Cancelled => None,
        }
    }
}

/// One profiling invocation over a record source.
pub struct Profiler<'c> {
    config: &'c ProfilingConfig,
    coercer: Coercer,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<Sender<u64>>,
    filter: RecordFilter,
    fields: Option<Vec<String>>,
    rules: Vec<String>,
    today: NaiveDate,
}

impl<'c> Profiler<'c> {
    pub fn new(config: &'c ProfilingConfig) -> Self {
        Self {
            config,
            coercer: Coercer::from_config(config),
            cancel: None,
            progress: None,
            filter: RecordFilter::all(),
            fields: None,
            rules: Vec::new(),
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Checked between records; once set the run stops and reports nothing.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Receives the number of records processed so far.
    pub fn with_progress(mut self, tx: Sender<u64>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Profiles only the named fields, in the given order. Duplicates are dropped.
    pub fn with_fields(mut self, names: Vec<String>) -> Self {
        self.fields = Some(names);
        self
    }

    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules = rules;
        self
    }

    /// Reference day for before/after date counts.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn report_progress(&self, processed: u64) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(processed);
        }
    }

    /// Positions of the requested fields. Repeated names are profiled once,
    /// at their first position in the request.
    fn selected_positions(&self, source: &dyn RecordSource) -> Result<Vec<usize>> {
        let Some(names) = &self.fields else {
            return Ok((0..source.fields().len()).collect());
        };
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let p = source.field_position(name).ok_or_else(|| {
                warn!(field = %name, "requested field not in source");
                FieldProfilerError::FieldNotFound(name.clone())
            })?;
            if positions.contains(&p) {
                debug!(field = %name, "duplicate field request ignored");
            } else {
                positions.push(p);
            }
        }
        Ok(positions)
    }

    pub fn run(&self, source: &dyn RecordSource) -> Result<ProfileOutcome> {
        let cfg = self.config;
        let specs = source.fields();
        let positions = self.selected_positions(source)?;
        let rules = compile_rules(&self.rules, specs)?;
        info!(
            fields = positions.len(),
            rules = rules.len(),
            filtered = self.filter.is_restricted(),
            "profiling run started"
        );

        let filter = &self.filter;
        let mut records = source
            .records()?
            .filter(move |r| r.as_ref().map_or(true, |rec| filter.admits(rec.id)));

        // Bounded read-ahead for fields without a usable declared kind. The
        // buffered records are replayed below, so the source is read once.
        let k = cfg.classification_sample_size;
        let needs_sample: Vec<usize> = positions
            .iter()
            .enumerate()
            .filter(|(_, &p)| specs[p].kind == DeclaredKind::Unknown)
            .map(|(i, _)| i)
            .collect();
        let mut samples: Vec<Vec<RawValue>> = vec![Vec::new(); positions.len()];
        let mut buffer: Vec<Record> = Vec::new();
        while !needs_sample.is_empty()
            && buffer.len() < cfg.classification_scan_limit
            && needs_sample.iter().any(|&i| samples[i].len() < k)
        {
            if self.cancelled() {
                warn!("profiling run cancelled during classification");
                return Ok(ProfileOutcome::Cancelled);
            }
            let Some(record) = records.next() else { break };
            let record = record?;
            for &i in &needs_sample {
                let v = record.value(positions[i]);
                if samples[i].len() < k && is_sample_candidate(v) {
                    samples[i].push(v.clone());
                }
            }
            buffer.push(record);
        }

        let descriptors: Vec<FieldDescriptor> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let spec = &specs[p];
                let (family, classification) = classify_detailed(spec.kind, &samples[i], &self.coercer, k);
                debug!(field = %spec.name, %family, ?classification, "field classified");
                FieldDescriptor {
                    name: spec.name.clone(),
                    position: p,
                    declared: spec.kind,
                    family,
                    classification,
                }
            })
            .collect();
        drop(samples);

        let mut accumulators: Vec<FieldAccumulator> = descriptors
            .iter()
            .map(|d| FieldAccumulator::new(d.family, cfg, self.today))
            .collect();

        let numeric: Vec<usize> = descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.family == Family::Numeric)
            .map(|(i, _)| i)
            .collect();
        let mut correlation = (cfg.groups.correlation && numeric.len() >= 2).then(|| {
            CorrelationAccumulator::new(numeric.iter().map(|&i| descriptors[i].name.clone()).collect())
        });
        let mut corr_slot: Vec<Option<usize>> = vec![None; descriptors.len()];
        for (slot, &i) in numeric.iter().enumerate() {
            corr_slot[i] = Some(slot);
        }
        let mut corr_row: Vec<Option<f64>> = vec![None; numeric.len()];

        let mut tallies: Vec<RuleTally> = rules
            .into_iter()
            .map(|r| RuleTally::new(r, cfg.issue_id_cap))
            .collect();

        let mut processed = 0u64;
        for record in buffer.into_iter().map(Ok).chain(records) {
            if self.cancelled() {
                warn!(processed, "profiling run cancelled");
                return Ok(ProfileOutcome::Cancelled);
            }
            let record = record?;
            corr_row.iter_mut().for_each(|v| *v = None);
            for (i, (desc, acc)) in descriptors.iter().zip(accumulators.iter_mut()).enumerate() {
                let value = self.coercer.coerce(desc.family, record.value(desc.position));
                let number = acc.observe(record.id, value);
                if let Some(slot) = corr_slot[i] {
                    corr_row[slot] = number;
                }
            }
            if let Some(c) = &mut correlation {
                c.add_row(&corr_row);
            }
            for t in &mut tallies {
                t.check(&record);
            }
            processed += 1;
            if processed % PROGRESS_EVERY == 0 {
                self.report_progress(processed);
            }
        }
        if self.cancelled() {
            warn!(processed, "profiling run cancelled before finalize");
            return Ok(ProfileOutcome::Cancelled);
        }

        let fields: Vec<_> = descriptors
            .par_iter()
            .zip(accumulators.par_iter())
            .map(|(d, a)| finalize(d, a))
            .collect();
        for f in &fields {
            if f.warnings.contains(&ProfileWarning::UniqueTrackingOverflow) {
                warn!(
                    field = %f.field_name,
                    limit = cfg.unique_tracking_limit,
                    "unique-value tracking overflowed; distinct count is estimated"
                );
            }
        }
        self.report_progress(processed);
        info!(records = processed, fields = fields.len(), "profiling run finished");

        Ok(ProfileOutcome::Completed(DatasetProfile {
            records_profiled: processed,
            reference_date: self.today,
            fields,
            correlation: correlation.map(|c| c.finalize()),
            validation: tallies.iter().map(|t| t.finish()).collect(),
            filter: self.filter.clone(),
        }))
    }
}
