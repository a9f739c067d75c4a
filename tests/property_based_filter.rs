//! Property-based tests of call filters, presets and diagram labels
//!
//! Properties tested:
//! 1. Preset expressions never panic, whatever the input
//! 2. Depth presets exclude exactly the calls deeper than the threshold
//! 3. A call filter traces a call iff no preset excludes it
//! 4. Rank labels keep short lists and compress long ones
//! 5. Traced recursion yields balanced call/return events

use doctrace::filter::{call_filter_factory, presets, trace_all, trace_none, Preset};
use doctrace::plantuml::rank_label;
use proptest::prelude::*;

fn module_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z_]{1,8}", 1..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_preset_expression_never_panics(expr in ".{0,40}") {
        // Property: any text either parses or gives a filter error
        let _ = Preset::from_expr(&expr);
    }

    #[test]
    fn prop_depth_preset_threshold(threshold in 0i64..50, depth in 0usize..100) {
        let preset = Preset::from_expr(&format!("depth={}", threshold)).unwrap();
        let excluded = preset.excludes(&["app".to_string()], "f", depth);
        prop_assert_eq!(excluded, depth > threshold as usize);
    }

    #[test]
    fn prop_negative_depth_rejected(threshold in i64::MIN..0) {
        prop_assert!(presets::exclude_call_depth(threshold).is_err());
        let expr = format!("depth={}", threshold);
        prop_assert!(Preset::from_expr(&expr).is_err());
    }

    #[test]
    fn prop_filter_traces_iff_no_preset_excludes(
        modules in prop::collection::vec("[a-z]{1,6}", 1..5),
        path in module_path(),
        depth in 0usize..10,
    ) {
        let preset = presets::exclude_modules("modules", modules.clone());
        let filter = call_filter_factory(Some(vec![preset]));

        let excluded = modules.contains(&path[0]);
        prop_assert_eq!(filter.should_trace_call(&path, "f", depth), !excluded);
    }

    #[test]
    fn prop_never_excluding_preset_changes_nothing(
        threshold in 0i64..6,
        path in module_path(),
        depth in 0usize..10,
    ) {
        let base = vec![presets::exclude_std(), presets::exclude_call_depth(threshold).unwrap()];
        let mut extended = vec![presets::exclude_std(), presets::exclude_call_depth(threshold).unwrap()];
        extended.push(Preset::new("never", |_, _, _| false));

        let base = call_filter_factory(Some(base));
        let extended = call_filter_factory(Some(extended));
        prop_assert_eq!(
            base.should_trace_call(&path, "f", depth),
            extended.should_trace_call(&path, "f", depth)
        );
    }

    #[test]
    fn prop_singleton_filters(path in module_path(), function in "[a-z_]{1,10}", depth in 0usize..50) {
        prop_assert!(trace_all().should_trace_call(&path, &function, depth));
        prop_assert!(!trace_none().should_trace_call(&path, &function, depth));
    }

    #[test]
    fn prop_rank_label_short_lists(ranks in prop::collection::vec(1u64..1000, 0..8)) {
        let label = rank_label(&ranks);
        prop_assert!(!label.contains("..."));
        let expected: Vec<String> = ranks.iter().map(u64::to_string).collect();
        prop_assert_eq!(label, expected.join(", "));
    }

    #[test]
    fn prop_rank_label_long_lists(ranks in prop::collection::vec(1u64..1000, 8..40)) {
        let label = rank_label(&ranks);
        let n = ranks.len();
        let expected = format!(
            "{}, {}, {} ... {}, {}, {}",
            ranks[0], ranks[1], ranks[2], ranks[n - 3], ranks[n - 2], ranks[n - 1]
        );
        prop_assert_eq!(label, expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_recursion_events_are_balanced(value in 0u64..15) {
        use doctrace::demos::math;
        use doctrace::sink::RecordingSink;
        use doctrace::tracer::ExecutionTracer;

        let tracer = ExecutionTracer::new(RecordingSink::new(), trace_all());
        let outcome = tracer.runfunc(|| math::factorial_recursive(value));
        prop_assert_eq!(tracer.call_depth(), 0);

        let sink = tracer.into_sink().unwrap();
        let sub_calls = value.saturating_sub(1) as usize;
        prop_assert_eq!(sink.count("tracing_start"), 1);
        prop_assert_eq!(sink.count("start_call"), sub_calls);
        prop_assert_eq!(sink.count("return"), sub_calls);
        prop_assert_eq!(sink.count("tracing_end"), 1);
        prop_assert_eq!(outcome, (1..=value.max(1)).product::<u64>() * u64::from(value > 0));
    }
}
