//! Integration tests for workflow execution.

#[cfg(test)]
mod tests {
    use crate::components::query_generator::{MockQueryGenerator, QueryGeneratorComponent};
    use crate::components::{Component, ComponentConfig, FnComponent};
    use crate::context::{Context, Value};
    use crate::errors::ComponentExecutionError;
    use crate::events::{
        STEP_COMPLETED, STEP_FAILED, STEP_SKIPPED, STEP_STARTED, WORKFLOW_ABORTED,
        WORKFLOW_COMPLETED, WORKFLOW_STARTED, WORKFLOW_STOPPED,
    };
    use crate::registry::constructor;
    use crate::testing::{
        assert_context_value, assert_run_aborted_at, assert_run_completed, assert_steps_executed,
        MockComponent, TestHarness, TestWorkflow,
    };
    use crate::workflow::{
        ExecutorOptions, FailureKind, RunOptions, RunStatus, StepDefinition, StepStatus,
        WorkflowDefinition, FAILED_STEP_KEY,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn three_steps(middle: StepDefinition) -> WorkflowDefinition {
        TestWorkflow::new("three")
            .step("first")
            .with_step(middle)
            .step("third")
            .build()
    }

    #[tokio::test]
    async fn test_two_emitters_build_final_context() {
        let harness = TestHarness::new()
            .with_component("emit_a", MockComponent::emitting(Context::new().with("x", 1)).constructor())
            .with_component("emit_b", MockComponent::emitting(Context::new().with("y", 2)).constructor())
            .with_workflow(TestWorkflow::linear("pair", &["emit_a", "emit_b"]));

        let run = harness.run("pair", Context::new()).await.unwrap();

        assert_run_completed(&run);
        assert_eq!(run.context.to_json(), json!({"x": 1, "y": 2}));
        assert_steps_executed(&run, &["step_1", "step_2"]);
    }

    #[tokio::test]
    async fn test_step_merge_is_shallow_last_write_wins() {
        let harness = TestHarness::new()
            .with_component(
                "update",
                MockComponent::emitting(Context::new().with("b", 3).with("c", 4)).constructor(),
            )
            .with_workflow(TestWorkflow::linear("merge", &["update"]));

        let initial = Context::new().with("a", 1).with("b", 2);
        let run = harness.run("merge", initial).await.unwrap();

        assert_eq!(run.context.to_json(), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[tokio::test]
    async fn test_single_raising_step_keeps_initial_context() {
        let harness = TestHarness::new()
            .with_component("fail_critical", MockComponent::raising("boom").constructor())
            .with_workflow(TestWorkflow::linear("fails", &["fail_critical"]));

        let run = harness.run("fails", Context::new().with("x", 1)).await.unwrap();

        assert_run_aborted_at(&run, "step_1");
        assert_context_value(&run.context, "x", 1);
        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Execution);
        assert_eq!(failure.component_type, "fail_critical");
        assert!(failure.message.contains("boom"));

        let marker = run.context.get(FAILED_STEP_KEY).unwrap().as_map().unwrap();
        assert_eq!(marker.get("step_id"), Some(&Value::from("step_1")));
        assert_eq!(marker.get("message"), Some(&Value::from("boom")));
    }

    #[tokio::test]
    async fn test_critical_raise_skips_remaining_steps() {
        let first = MockComponent::emitting(Context::new().with("a", 1));
        let middle = MockComponent::raising("database unreachable");
        let third = MockComponent::emitting(Context::new().with("c", 3));
        let harness = TestHarness::new()
            .with_component("first", first.constructor())
            .with_component("middle", middle.constructor())
            .with_component("third", third.constructor())
            .with_workflow(three_steps(StepDefinition::new("middle", "default")));

        let run = harness.run("three", Context::new()).await.unwrap();

        assert_run_aborted_at(&run, "step_2");
        assert_eq!(third.call_count(), 0);
        assert_context_value(&run.context, "a", 1);
        assert!(!run.context.contains_key("c"));
        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.steps[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_raise_aborts_even_when_step_is_not_critical() {
        let third = MockComponent::emitting(Context::new().with("c", 3));
        let harness = TestHarness::new()
            .with_component("first", MockComponent::new().constructor())
            .with_component("middle", MockComponent::raising("boom").constructor())
            .with_component("third", third.constructor())
            .with_workflow(three_steps(
                StepDefinition::new("middle", "default").with_critical(false),
            ));

        let run = harness.run("three", Context::new()).await.unwrap();

        assert_run_aborted_at(&run, "step_2");
        assert_eq!(third.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_critical_soft_error_continues() {
        let third = MockComponent::emitting(Context::new().with("c", 3));
        let harness = TestHarness::new()
            .with_component("first", MockComponent::new().constructor())
            .with_component("middle", MockComponent::soft_error("x").constructor())
            .with_component("third", third.constructor())
            .with_workflow(three_steps(
                StepDefinition::new("middle", "default").with_critical(false),
            ));

        let run = harness.run("three", Context::new()).await.unwrap();

        assert_run_completed(&run);
        assert_eq!(third.call_count(), 1);
        assert_context_value(&run.context, "error", "x");
        assert_context_value(&run.context, "step_2_error", "x");
        assert_context_value(&run.context, "c", 3);
        assert_eq!(run.step("step_2").unwrap().status, StepStatus::Failed);
        assert!(run.failure.is_none());

        let failed = harness.events().first_payload(STEP_FAILED).unwrap();
        assert_eq!(failed["fatal"], false);
    }

    #[tokio::test]
    async fn test_critical_soft_error_aborts() {
        let third = MockComponent::new();
        let harness = TestHarness::new()
            .with_component("first", MockComponent::new().constructor())
            .with_component("middle", MockComponent::soft_error("no rows").constructor())
            .with_component("third", third.constructor())
            .with_workflow(three_steps(StepDefinition::new("middle", "default")));

        let run = harness.run("three", Context::new()).await.unwrap();

        assert_run_aborted_at(&run, "step_2");
        assert_eq!(run.failure.as_ref().unwrap().kind, FailureKind::SoftError);
        // The partial result is merged before the failure is evaluated.
        assert_context_value(&run.context, "error", "no rows");
        assert_eq!(third.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_component_is_fatal() {
        let harness = TestHarness::new()
            .with_component("first", MockComponent::new().constructor())
            .with_workflow(TestWorkflow::new("broken").step("first").optional_step("ghost"));

        let run = harness.run("broken", Context::new()).await.unwrap();

        assert_run_aborted_at(&run, "step_2");
        assert_eq!(
            run.failure.as_ref().unwrap().kind,
            FailureKind::ComponentNotFound
        );
        assert!(harness.registry().list_instances().iter().all(|k| k.component_type != "ghost"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let harness = TestHarness::new()
            .with_component(
                "static",
                constructor(|init| {
                    Ok(Box::new(crate::components::builtin::StaticComponent::new(init))
                        as Box<dyn Component>)
                }),
            )
            .with_workflow(TestWorkflow::linear("seed", &["static"]));
        harness.registry().register_config(
            "static",
            "default",
            ComponentConfig::from_json(json!({"values": "not a map"})),
        );

        let run = harness.run("seed", Context::new()).await.unwrap();

        assert_eq!(run.status, RunStatus::Aborted);
        assert_eq!(
            run.failure.as_ref().unwrap().kind,
            FailureKind::ConfigValidation
        );
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_an_error() {
        let err = TestHarness::new()
            .run("nope", Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.name, "nope");
    }

    #[tokio::test]
    async fn test_generated_query_flows_through_workflow() {
        let mut generator = MockQueryGenerator::new();
        let mut seq = mockall::Sequence::new();
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("SELECT t1.name FROM users".to_string()));
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("SELECT t1.name FROM users t1".to_string()));

        let harness = TestHarness::new()
            .with_component(
                QueryGeneratorComponent::TYPE_NAME,
                QueryGeneratorComponent::constructor(Arc::new(generator)),
            )
            .with_workflow(TestWorkflow::linear("nl2sql", &["query_generator"]));
        harness.registry().register_config(
            "query_generator",
            "default",
            ComponentConfig::new().with("max_attempts", 2),
        );

        let initial = Context::from_json(json!({
            "query": "list user names",
            "schema": {"users": ["id", "name"]},
        }));
        let run = harness.run("nl2sql", initial).await.unwrap();

        assert_run_completed(&run);
        assert_context_value(&run.context, "generated_query", "SELECT t1.name FROM users t1");
        assert_context_value(&run.context, "query_error", Value::Null);
        assert_context_value(&run.context, "query_attempts", 2);
    }

    #[tokio::test]
    async fn test_disabled_and_unselected_steps_are_skipped() {
        let a = MockComponent::emitting(Context::new().with("a", 1));
        let b = MockComponent::emitting(Context::new().with("b", 2));
        let c = MockComponent::emitting(Context::new().with("c", 3));
        let harness = TestHarness::new()
            .with_component("a", a.constructor())
            .with_component("b", b.constructor())
            .with_component("c", c.constructor())
            .with_workflow(
                TestWorkflow::new("skip")
                    .with_step(StepDefinition::new("a", "default").with_id("load"))
                    .with_step(StepDefinition::new("b", "default").disabled())
                    .with_step(StepDefinition::new("c", "default").with_id("answer")),
            );

        let options = RunOptions::new().with_selected_steps(["answer"]);
        let run = harness
            .executor()
            .run_workflow_with("skip", Context::new(), &options)
            .await
            .unwrap();

        assert_run_completed(&run);
        assert_steps_executed(&run, &["answer"]);
        assert_eq!(run.step("load").unwrap().error.as_deref(), Some("not selected"));
        assert_eq!(run.step("step_2").unwrap().error.as_deref(), Some("disabled"));
        assert_eq!((a.call_count(), b.call_count(), c.call_count()), (0, 0, 1));
        assert_eq!(harness.events().events_of_type(STEP_SKIPPED).len(), 2);
    }

    #[tokio::test]
    async fn test_workflow_stop_ends_run_after_merge() {
        let last = MockComponent::new();
        let harness = TestHarness::new()
            .with_component(
                "cache",
                MockComponent::emitting(
                    Context::new().with("results", vec![1, 2]).with("workflow_stop", true),
                )
                .constructor(),
            )
            .with_component("last", last.constructor())
            .with_workflow(TestWorkflow::linear("cached", &["cache", "last"]));

        let run = harness.run("cached", Context::new()).await.unwrap();

        assert_eq!(run.status, RunStatus::Stopped);
        assert!(run.is_success());
        assert_eq!(last.call_count(), 0);
        assert_context_value(&run.context, "results", vec![1, 2]);
        assert!(harness.events().event_types().contains(&WORKFLOW_STOPPED.to_string()));
    }

    #[tokio::test]
    async fn test_initial_context_overrides_caller_keys() {
        let observer = MockComponent::new();
        let workflow = WorkflowDefinition::new("seeded")
            .with_initial_context(Context::new().with("dialect", "sqlite").with("limit", 10))
            .with_step(StepDefinition::new("observer", "default"));
        let harness = TestHarness::new()
            .with_component("observer", observer.constructor())
            .with_workflow(workflow);

        let run = harness
            .run("seeded", Context::new().with("limit", 50).with("query", "q"))
            .await
            .unwrap();

        assert_context_value(&run.context, "limit", 10);
        assert_context_value(&run.context, "query", "q");
        assert_eq!(
            observer.last_context().unwrap().get_str("dialect"),
            Some("sqlite")
        );
    }

    #[tokio::test]
    async fn test_component_sees_current_step_but_it_is_not_merged() {
        let observer = MockComponent::new();
        let harness = TestHarness::new()
            .with_component("observer", observer.constructor())
            .with_workflow(
                TestWorkflow::new("view").with_step(
                    StepDefinition::new("observer", "default")
                        .with_id("inspect")
                        .with_inputs(["query"])
                        .with_tools(["sql"])
                        .with_config(ComponentConfig::new().with("dialect", "sqlite")),
                ),
            );

        let run = harness.run("view", Context::new().with("query", "q")).await.unwrap();

        let seen = observer.last_context().unwrap();
        let step = seen.get("current_step").unwrap().to_json();
        assert_eq!(
            step,
            json!({
                "id": "inspect",
                "index": 0,
                "component_type": "observer",
                "component_id": "default",
                "inputs": ["query"],
                "tools": ["sql"],
                "config": {"dialect": "sqlite"},
            })
        );
        assert!(!run.context.contains_key("current_step"));
    }

    #[tokio::test]
    async fn test_step_config_reaches_component_without_touching_instance() {
        let harness = TestHarness::new()
            .with_component(
                "limit",
                constructor(|init| {
                    Ok(Box::new(FnComponent::new(
                        init.component_type,
                        init.component_id,
                        |ctx: &Context| {
                            let step = ctx.get("current_step").and_then(Value::as_map);
                            let id = step
                                .and_then(|step| step.get("id"))
                                .and_then(Value::as_str)
                                .unwrap_or_default();
                            let limit = step
                                .and_then(|step| step.get("config"))
                                .and_then(Value::as_map)
                                .and_then(|config| config.get("limit"))
                                .and_then(Value::as_i64)
                                .unwrap_or(100);
                            Ok(Context::new().with(format!("{id}_limit"), limit))
                        },
                    )) as Box<dyn Component>)
                }),
            )
            .with_workflow(
                TestWorkflow::new("scoped")
                    .with_step(
                        StepDefinition::new("limit", "default")
                            .with_id("narrow")
                            .with_config(ComponentConfig::new().with("limit", 5)),
                    )
                    .with_step(StepDefinition::new("limit", "default").with_id("wide")),
            );

        let run = harness.run("scoped", Context::new()).await.unwrap();

        assert_run_completed(&run);
        assert_context_value(&run.context, "narrow_limit", 5);
        // The second step shares the instance but sees no step config.
        assert_context_value(&run.context, "wide_limit", 100);
        assert!(harness.registry().config("limit", "default").unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_strict_inputs_follow_critical_flag() {
        let needs_schema = MockComponent::new();
        let tail = MockComponent::emitting(Context::new().with("done", true));
        let harness = TestHarness::new()
            .with_component("needs_schema", needs_schema.constructor())
            .with_component("tail", tail.constructor())
            .with_options(ExecutorOptions::default().with_strict_inputs(true))
            .with_workflow(
                TestWorkflow::new("optional")
                    .with_step(
                        StepDefinition::new("needs_schema", "default")
                            .with_inputs(["schema"])
                            .with_critical(false),
                    )
                    .step("tail"),
            )
            .with_workflow(
                TestWorkflow::new("required").with_step(
                    StepDefinition::new("needs_schema", "default").with_inputs(["schema"]),
                ),
            );

        let run = harness.run("optional", Context::new()).await.unwrap();
        assert_run_completed(&run);
        assert_eq!(needs_schema.call_count(), 0);
        assert_context_value(&run.context, "step_1_error", "missing declared inputs: schema");
        assert_context_value(&run.context, "done", true);

        let run = harness.run("required", Context::new()).await.unwrap();
        assert_run_aborted_at(&run, "step_1");
        assert_eq!(run.failure.unwrap().kind, FailureKind::MissingInput);
    }

    #[tokio::test]
    async fn test_lenient_inputs_still_execute() {
        let needs_schema = MockComponent::new();
        let harness = TestHarness::new()
            .with_component("needs_schema", needs_schema.constructor())
            .with_workflow(TestWorkflow::new("lenient").with_step(
                StepDefinition::new("needs_schema", "default").with_inputs(["schema"]),
            ));

        let run = harness.run("lenient", Context::new()).await.unwrap();

        assert_run_completed(&run);
        assert_eq!(needs_schema.call_count(), 1);
    }

    #[tokio::test]
    async fn test_events_follow_step_order() {
        let harness = TestHarness::new()
            .with_component("ok", MockComponent::new().constructor())
            .with_component("bad", MockComponent::raising("boom").constructor())
            .with_workflow(TestWorkflow::linear("evented", &["ok", "bad"]));

        let run = harness.run("evented", Context::new()).await.unwrap();

        assert_eq!(
            harness.events().event_types(),
            vec![
                WORKFLOW_STARTED,
                STEP_STARTED,
                STEP_COMPLETED,
                STEP_STARTED,
                STEP_FAILED,
                WORKFLOW_ABORTED,
            ]
        );
        let started = harness.events().first_payload(WORKFLOW_STARTED).unwrap();
        assert_eq!(started["run_id"], run.run_id.to_string());
        assert!(!harness.events().event_types().contains(&WORKFLOW_COMPLETED.to_string()));
    }

    #[tokio::test]
    async fn test_fixed_run_id_is_used() {
        let harness = TestHarness::new()
            .with_component("ok", MockComponent::new().constructor())
            .with_workflow(TestWorkflow::linear("one", &["ok"]));
        let run_id = uuid::Uuid::new_v4();

        let run = harness
            .executor()
            .run_workflow_with("one", Context::new(), &RunOptions::new().with_run_id(run_id))
            .await
            .unwrap();

        assert_eq!(run.run_id, run_id);
        assert_eq!(run.to_dict()["run_id"], run_id.to_string());
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_serialized_instances() {
        let slow = MockComponent::emitting(Context::new().with("done", true))
            .with_delay(Duration::from_millis(10));
        let harness = TestHarness::new()
            .with_component("slow", slow.constructor())
            .with_workflow(TestWorkflow::linear("slow", &["slow"]));
        let executor = Arc::new(harness.executor());

        let runs: Vec<_> = (0..4)
            .map(|i| {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    executor
                        .run_workflow("slow", Context::new().with("request", i))
                        .await
                })
            })
            .collect();

        for run in futures::future::join_all(runs).await {
            assert_run_completed(&run.unwrap().unwrap());
        }
        assert_eq!(slow.construction_count(), 1);
        assert_eq!(slow.call_count(), 4);
        assert_eq!(slow.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_fn_component_in_workflow() {
        let harness = TestHarness::new()
            .with_component(
                "double",
                constructor(|init| {
                    Ok(Box::new(FnComponent::new(
                        init.component_type,
                        init.component_id,
                        |ctx: &Context| {
                            let n = ctx
                                .get_i64("n")
                                .ok_or_else(|| ComponentExecutionError::new("n is required"))?;
                            Ok(Context::new().with("n", n * 2))
                        },
                    )) as Box<dyn Component>)
                }),
            )
            .with_workflow(TestWorkflow::linear("twice", &["double", "double"]));

        let run = harness.run("twice", Context::new().with("n", 3)).await.unwrap();
        assert_context_value(&run.context, "n", 12);

        let run = harness.run("twice", Context::new()).await.unwrap();
        assert_run_aborted_at(&run, "step_1");
    }
}
