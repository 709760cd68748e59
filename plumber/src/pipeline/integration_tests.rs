//! Integration tests for pipeline runs.

#[cfg(test)]
mod tests {
    use crate::errors::{PipelineError, PreconditionError, INVALID_STAGE};
    use crate::events::{
        CollectingEventSink, RunEvents, RUN_COMPLETED, RUN_STARTED, WORKER_FINISHED,
        WORKER_STARTED,
    };
    use crate::pipeline::{Pipeline, RunOptions};
    use crate::prefetch::{PrefetchConfig, PrefetchPool, Prefetcher};
    use crate::stages::{adapt, precondition, Records, Stage, StageArg, StageExt};
    use crate::testing::{FailingStage, RecordingStage, SlowStage};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    type Doc = HashMap<String, String>;

    fn doc(name: &str) -> Doc {
        HashMap::from([("name".to_string(), name.to_string())])
    }

    fn strip_name(mut d: Doc) -> anyhow::Result<Doc> {
        if let Some(name) = d.get_mut("name") {
            *name = name.trim().to_string();
        }
        Ok(d)
    }

    fn upper_name(mut d: Doc) -> anyhow::Result<Doc> {
        if let Some(name) = d.get_mut("name") {
            *name = name.to_uppercase();
        }
        Ok(d)
    }

    fn strip_upper() -> Pipeline<Doc> {
        Pipeline::builder("strip-upper")
            .adapted(adapt("strip", strip_name))
            .adapted(adapt("upper", upper_name))
            .build()
            .unwrap()
    }

    fn collect_ok<T>(output: impl Iterator<Item = Result<T, PipelineError>>) -> Vec<T> {
        output.map(Result::unwrap).collect()
    }

    fn sorted(mut values: Vec<i64>) -> Vec<i64> {
        values.sort_unstable();
        values
    }

    fn arithmetic() -> Pipeline<i64> {
        Pipeline::builder("arithmetic")
            .adapted(adapt("double", |n: i64| Ok(n * 2)))
            .adapted(adapt("inc", |n: i64| Ok(n + 1)))
            .build()
            .unwrap()
    }

    // ========================================================================
    // Scenario and property tests
    // ========================================================================

    #[test]
    fn test_strip_upper_without_prefetch() {
        let out = collect_ok(strip_upper().run(vec![doc("  foo  ")], RunOptions::new()).unwrap());
        assert_eq!(out, vec![doc("FOO")]);
    }

    #[test]
    fn test_strip_upper_with_prefetch() {
        let out = collect_ok(
            strip_upper()
                .run(vec![doc("  foo  ")], RunOptions::new().with_prefetch(5))
                .unwrap(),
        );
        assert_eq!(out, vec![doc("FOO")]);
    }

    #[test]
    fn test_passing_guard_is_identity_across_run() {
        let plain = strip_upper();
        let guarded: Pipeline<Doc> = Pipeline::builder("guarded")
            .stage(RecordingStage::new("strip", strip_name).with_precondition(|_: &Doc| Ok(())))
            .stage(RecordingStage::new("upper", upper_name).with_precondition(|_: &Doc| Ok(())))
            .build()
            .unwrap();

        let input = vec![doc("  a "), doc("b"), doc(""), Doc::new()];
        let expected = collect_ok(plain.run(input.clone(), RunOptions::new()).unwrap());
        let actual = collect_ok(guarded.run(input, RunOptions::new()).unwrap());
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_unmet_guard_bypasses_every_record() {
        let upper = Arc::new(RecordingStage::new("upper", upper_name));
        let pipeline: Pipeline<Doc> = Pipeline::builder("bypass")
            .stage(
                upper
                    .clone()
                    .with_precondition(|_: &Doc| Err(PreconditionError::unmet("never"))),
            )
            .build()
            .unwrap();

        let input = vec![doc("x"), doc("y"), doc("z")];
        let out = collect_ok(pipeline.run(input.clone(), RunOptions::new().with_prefetch(2)).unwrap());

        assert_eq!(out.len(), 3);
        for record in &input {
            assert!(out.contains(record));
        }
        assert_eq!(upper.call_count(), 0);
    }

    #[test]
    fn test_guard_applies_per_record() {
        let pipeline: Pipeline<Doc> = Pipeline::builder("partial")
            .adapted(adapt(
                "upper-named",
                precondition(
                    |d: &Doc| {
                        if d.contains_key("name") {
                            Ok(())
                        } else {
                            Err(PreconditionError::unmet("no name"))
                        }
                    },
                    |mut d: Doc| {
                        d.insert("touched".to_string(), "yes".to_string());
                        upper_name(d)
                    },
                ),
            ))
            .build()
            .unwrap();

        let out = collect_ok(pipeline.run(vec![doc("a"), Doc::new()], RunOptions::new()).unwrap());
        assert_eq!(out[0].get("name").map(String::as_str), Some("A"));
        assert_eq!(out[0].get("touched").map(String::as_str), Some("yes"));
        assert_eq!(out[1], Doc::new());
    }

    #[test]
    fn test_order_preserved_without_prefetch() {
        let input: Vec<i64> = (0..500).collect();
        let out = collect_ok(arithmetic().run(input.clone(), RunOptions::new()).unwrap());
        let expected: Vec<i64> = input.iter().map(|n| n * 2 + 1).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_order_preserved_with_one_worker() {
        let pipeline = arithmetic();
        let input: Vec<i64> = (0..300).collect();
        let baseline = collect_ok(pipeline.run(input.clone(), RunOptions::new()).unwrap());

        let single = collect_ok(pipeline.run(input.clone(), RunOptions::new().with_prefetch(1)).unwrap());
        assert_eq!(single, baseline);

        let pinned: Pipeline<i64> = Pipeline::builder("pinned")
            .adapted(adapt("double", |n: i64| Ok(n * 2)))
            .adapted(adapt("inc", |n: i64| Ok(n + 1)))
            .prefetch_config(PrefetchConfig::new().with_workers(1))
            .build()
            .unwrap();
        let pinned_out = collect_ok(pinned.run(input, RunOptions::new().with_prefetch(16)).unwrap());
        assert_eq!(pinned_out, baseline);
    }

    #[test]
    fn test_completeness_under_prefetch() {
        let pipeline = arithmetic();
        let input: Vec<i64> = (0..1_000).collect();
        let expected: Vec<i64> = input.iter().map(|n| n * 2 + 1).collect();

        for k in [1, 2, 3, 7, 16, 64, 2_000] {
            let out = collect_ok(pipeline.run(input.clone(), RunOptions::new().with_prefetch(k)).unwrap());
            assert_eq!(out.len(), input.len(), "prefetch={k}");
            assert_eq!(sorted(out), expected, "prefetch={k}");
        }
    }

    #[test]
    fn test_completeness_with_duplicates_and_jitter() {
        let pipeline: Pipeline<i64> = Pipeline::builder("jittery")
            .stage(SlowStage::new("slow", Duration::ZERO).with_jitter(Duration::from_millis(1)))
            .build()
            .unwrap();
        let input: Vec<i64> = (0..60).map(|n| n % 7).collect();

        let out = collect_ok(pipeline.run(input.clone(), RunOptions::new().with_prefetch(8)).unwrap());
        assert_eq!(sorted(out), sorted(input));
    }

    #[test]
    fn test_rewrap_single_structured_record() {
        let wrap = adapt("wrap", |obj: Value| {
            let name = obj
                .get("name")
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("record has no name"))?;
            Ok(json!({ "name": name }))
        });
        let shout = adapt("shout", |obj: Value| {
            let Value::Object(fields) = obj else {
                anyhow::bail!("expected an object");
            };
            Ok(Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| match value {
                        Value::String(s) => (key, Value::String(s.to_uppercase())),
                        other => (key, other),
                    })
                    .collect(),
            ))
        });
        let pipeline = Pipeline::new(vec![wrap.into(), shout.into()]).unwrap();

        let obj = json!({ "name": "Foo name", "id": 7, "tags": ["a", "b"] });
        for prefetch in [0, 3] {
            let out = collect_ok(
                pipeline
                    .run_rewrapped(obj.clone(), RunOptions::new().with_prefetch(prefetch))
                    .unwrap(),
            );
            assert_eq!(out, vec![json!({ "name": "FOO NAME" })]);
        }
    }

    #[test]
    fn test_run_is_lazy() {
        let stage = Arc::new(RecordingStage::new("count", |n: i64| Ok(n)));
        let shared: Arc<dyn Stage<i64>> = stage.clone();
        let pipeline = Pipeline::new(vec![StageArg::from(shared)]).unwrap();

        let mut output = pipeline.run(0..100, RunOptions::new()).unwrap();
        assert_eq!(stage.call_count(), 0);

        assert_eq!(output.next().unwrap().unwrap(), 0);
        assert_eq!(output.next().unwrap().unwrap(), 1);
        assert_eq!(stage.call_count(), 2);
    }

    #[test]
    fn test_empty_pipeline_passes_records_through() {
        let pipeline: Pipeline<i64> = Pipeline::new(Vec::new()).unwrap();
        assert!(pipeline.is_empty());

        let out = collect_ok(pipeline.run(vec![3, 1, 2], RunOptions::new()).unwrap());
        assert_eq!(out, vec![3, 1, 2]);
    }

    #[test]
    fn test_empty_input() {
        let out = collect_ok(arithmetic().run(Vec::new(), RunOptions::new().with_prefetch(4)).unwrap());
        assert!(out.is_empty());
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_empty_stage_name_rejected_before_run() {
        let err = Pipeline::<i64>::new(vec![
            adapt("ok", |n: i64| Ok(n)).into(),
            adapt("  ", |n: i64| Ok(n)).into(),
        ])
        .unwrap_err();

        assert_eq!(err.code(), Some(INVALID_STAGE));
        assert!(err.message.contains("position 1"));
        assert!(err.message.contains("adapted function"));
    }

    #[test]
    fn test_pipeline_accessors() {
        let pipeline = strip_upper();
        assert_eq!(pipeline.name(), "strip-upper");
        assert_eq!(pipeline.stage_names(), vec!["strip", "upper"]);
        assert_eq!(pipeline.len(), 2);
        assert!(format!("{pipeline:?}").contains("strip-upper"));
    }

    // ========================================================================
    // Faults
    // ========================================================================

    #[test]
    fn test_stage_fault_delivered_in_place_without_prefetch() {
        let pipeline: Pipeline<i64> = Pipeline::builder("faulty")
            .stage(FailingStage::when("reject-five", "five rejected", |n: &i64| *n == 5))
            .adapted(adapt("inc", |n: i64| Ok(n + 1)))
            .build()
            .unwrap();

        let results: Vec<_> = pipeline.run(0..10, RunOptions::new()).unwrap().collect();
        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            if i == 5 {
                match result {
                    Err(PipelineError::Stage { stage, source }) => {
                        assert_eq!(stage, "reject-five");
                        assert_eq!(source.to_string(), "five rejected");
                    }
                    other => panic!("expected a stage error, got {other:?}"),
                }
            } else {
                assert_eq!(*result.as_ref().unwrap(), i as i64 + 1);
            }
        }
    }

    #[test]
    fn test_stage_fault_delivered_once_under_prefetch() {
        let pipeline: Pipeline<i64> = Pipeline::builder("faulty")
            .stage(FailingStage::when("reject-mid", "mid rejected", |n: &i64| *n == 250))
            .build()
            .unwrap();

        let mut output = pipeline.run(0..500, RunOptions::new().with_prefetch(8)).unwrap();
        let mut ok = Vec::new();
        let mut faults = 0;
        for result in output.by_ref() {
            match result {
                Ok(n) => ok.push(n),
                Err(PipelineError::Stage { stage, .. }) => {
                    assert_eq!(stage, "reject-mid");
                    faults += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(faults, 1);
        assert_eq!(output.failed(), 1);
        assert_eq!(output.yielded(), 499);
        assert_eq!(sorted(ok), (0..500).filter(|n| *n != 250).collect::<Vec<_>>());
    }

    // ========================================================================
    // Prefetcher injection and events
    // ========================================================================

    #[derive(Default)]
    struct SpyPrefetcher {
        capacities: Mutex<Vec<usize>>,
    }

    impl Prefetcher<i64> for SpyPrefetcher {
        fn prefetch(
            &self,
            source: Records<i64>,
            capacity: usize,
            _events: RunEvents,
        ) -> Result<Records<i64>, PipelineError> {
            self.capacities.lock().push(capacity);
            Ok(source)
        }
    }

    #[test]
    fn test_injected_prefetcher_receives_capacity() {
        let spy = Arc::new(SpyPrefetcher::default());
        let pipeline: Pipeline<i64> = Pipeline::builder("spied")
            .adapted(adapt("inc", |n: i64| Ok(n + 1)))
            .prefetcher(spy.clone())
            .build()
            .unwrap();

        let out = collect_ok(pipeline.run(vec![1, 2, 3], RunOptions::new().with_prefetch(5)).unwrap());
        assert_eq!(out, vec![2, 3, 4]);
        assert_eq!(*spy.capacities.lock(), vec![5]);
    }

    #[test]
    fn test_zero_prefetch_skips_prefetcher() {
        let spy = Arc::new(SpyPrefetcher::default());
        let pipeline: Pipeline<i64> = Pipeline::builder("spied")
            .prefetcher(spy.clone())
            .build()
            .unwrap();

        let out = collect_ok(pipeline.run(vec![1, 2], RunOptions::new()).unwrap());
        assert_eq!(out, vec![1, 2]);
        assert!(spy.capacities.lock().is_empty());
    }

    #[test]
    fn test_run_events_share_run_id() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline: Pipeline<i64> = Pipeline::builder("observed")
            .adapted(adapt("inc", |n: i64| Ok(n + 1)))
            .prefetch_config(PrefetchConfig::new().with_workers(3))
            .event_sink(sink.clone())
            .build()
            .unwrap();

        let mut output = pipeline.run(0..50, RunOptions::new().with_prefetch(4)).unwrap();
        let run_id = output.run_id().to_string();
        assert_eq!(output.by_ref().count(), 50);

        let started = sink.events_of_type(RUN_STARTED);
        assert_eq!(started.len(), 1);
        let data = started[0].1.clone().unwrap();
        assert_eq!(data["pipeline"], "observed");
        assert_eq!(data["prefetch"], 4);
        assert_eq!(data["run_id"], run_id);

        assert_eq!(sink.events_of_type(WORKER_STARTED).len(), 3);
        let finished = sink.events_of_type(WORKER_FINISHED);
        assert_eq!(finished.len(), 3);
        assert_eq!(finished.last().unwrap().1.as_ref().unwrap()["remaining"], 0);

        let completed = sink.events_of_type(RUN_COMPLETED);
        assert_eq!(completed.len(), 1);
        let data = completed[0].1.clone().unwrap();
        assert_eq!(data["yielded"], 50);
        assert_eq!(data["run_id"], run_id);

        for (_, data) in sink.events() {
            assert_eq!(data.unwrap()["run_id"], run_id);
        }
    }

    #[test]
    fn test_early_drop_releases_prefetch_workers() {
        let stage = Arc::new(RecordingStage::new("count", |n: i64| Ok(n)));
        let shared: Arc<dyn Stage<i64>> = stage.clone();
        let pipeline: Pipeline<i64> = Pipeline::builder("abandoned")
            .arg(shared)
            .prefetch_config(PrefetchConfig::new().with_workers(2))
            .build()
            .unwrap();

        let mut output = pipeline.run(0.., RunOptions::new().with_prefetch(4)).unwrap();
        assert!(output.next().unwrap().is_ok());
        drop(output);

        // Workers stop at the next pull or push once the run is cancelled.
        std::thread::sleep(Duration::from_millis(50));
        let settled = stage.call_count();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(stage.call_count(), settled);
    }

    #[test]
    fn test_prefetch_runs_stages_on_worker_threads() {
        let stage = Arc::new(RecordingStage::new("where", |n: i64| Ok(n)));
        let shared: Arc<dyn Stage<i64>> = stage.clone();
        let pipeline: Pipeline<i64> = Pipeline::builder("threads")
            .arg(shared)
            .prefetch_config(PrefetchConfig::new().with_thread_name_prefix("stagehand"))
            .build()
            .unwrap();

        assert_eq!(pipeline.run(0..20, RunOptions::new().with_prefetch(2)).unwrap().count(), 20);
        assert!(stage
            .threads()
            .iter()
            .all(|name| name.starts_with("stagehand-")));
    }

    #[test]
    fn test_pool_used_directly_matches_pipeline() {
        let pool = PrefetchPool::new(PrefetchConfig::new().with_workers(4));
        let composed = arithmetic().compose(Box::new((0..100).map(Ok)));
        let out = collect_ok(pool.spawn(composed, 8).unwrap());
        assert_eq!(sorted(out), (0..100).map(|n| n * 2 + 1).collect::<Vec<_>>());
    }

    // ========================================================================
    // Async bridge
    // ========================================================================

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_output_into_stream() {
        use futures::StreamExt;

        let stream = strip_upper()
            .run(vec![doc("  foo  "), doc(" bar")], RunOptions::new().with_prefetch(2))
            .unwrap()
            .into_stream(4);
        let out: Vec<Doc> = stream.map(Result::unwrap).collect().await;

        assert_eq!(out.len(), 2);
        assert!(out.contains(&doc("FOO")));
        assert!(out.contains(&doc("BAR")));
    }
}
