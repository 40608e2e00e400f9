use field_profiler_core::profile::frequency::UniqueValueSummarizer;
use field_profiler_core::{DeclaredKind, MemorySource, Profiler, ProfilingConfig, RawValue};
use proptest::prelude::*;

fn raw_value() -> impl Strategy<Value = RawValue> {
    prop_oneof![
        Just(RawValue::Null),
        Just(RawValue::Text(String::new())),
        (-1000i64..1000).prop_map(RawValue::Int),
        (-1e6f64..1e6).prop_map(RawValue::Float),
        "[a-z ]{0,6}".prop_map(RawValue::Text),
    ]
}

proptest! {
    #[test]
    fn categories_partition_total(values in prop::collection::vec(raw_value(), 0..200)) {
        let n = values.len() as u64;
        let source = MemorySource::single_column("f", DeclaredKind::Numeric, values);
        let profile = Profiler::new(&ProfilingConfig::default()).run(&source).unwrap().completed().unwrap();
        let r = profile.require_field("f").unwrap();
        prop_assert_eq!(r.total_count, n);
        prop_assert_eq!(r.null_count + r.empty_count + r.conversion_error_count + r.valid_count, n);
    }

    #[test]
    fn quantiles_are_ordered(values in prop::collection::vec(-1e6f64..1e6, 1..300)) {
        let source = MemorySource::single_column(
            "f",
            DeclaredKind::Numeric,
            values.into_iter().map(RawValue::Float),
        );
        let profile = Profiler::new(&ProfilingConfig::default()).run(&source).unwrap().completed().unwrap();
        let s = profile.require_field("f").unwrap().numeric().unwrap().clone();
        let p = &s.percentiles;
        let chain = [&s.min, &p.p1, &p.p5, &p.q1, &p.median, &p.q3, &p.p95, &p.p99, &s.max]
            .map(|m| m.get().unwrap());
        for w in chain.windows(2) {
            prop_assert!(w[0] <= w[1], "{:?}", chain);
        }
    }

    #[test]
    fn summarizer_flags_truncation(keys in prop::collection::vec(0u32..500, 0..400), cap in 1usize..20) {
        let mut summarizer = UniqueValueSummarizer::new(cap, 10_000);
        for k in &keys {
            summarizer.observe(&k.to_string());
        }
        let summary = summarizer.finalize();
        let distinct = keys.iter().collect::<std::collections::BTreeSet<_>>().len() as u64;
        prop_assert_eq!(summary.distinct_count, distinct);
        prop_assert!(summary.distinct_exact);
        prop_assert!(summary.top_values.len() <= cap);
        prop_assert_eq!(summary.truncated, distinct > cap as u64);
        for w in summary.top_values.windows(2) {
            prop_assert!(w[0].count >= w[1].count);
        }
    }
}
