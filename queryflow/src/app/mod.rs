//! The application facade: configuration, registry and executor wired
//! together.

mod builder;

pub use builder::ApplicationBuilder;

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::errors::{InitializationError, QueryflowError, WorkflowNotFoundError};
use crate::registry::{ComponentRegistry, InstanceKey};
use crate::workflow::{RunOptions, WorkflowExecutor, WorkflowRun};
use std::sync::Arc;
use tracing::{debug, info};

/// A bootstrapped application. Build one with [`Application::builder`].
#[derive(Debug)]
pub struct Application {
    config: RuntimeConfig,
    registry: Arc<ComponentRegistry>,
    executor: WorkflowExecutor,
}

impl Application {
    /// Starts building an application from `config`.
    #[must_use]
    pub fn builder(config: RuntimeConfig) -> ApplicationBuilder {
        ApplicationBuilder::new(config)
    }

    fn new(config: RuntimeConfig, registry: Arc<ComponentRegistry>, executor: WorkflowExecutor) -> Self {
        Self {
            config,
            registry,
            executor,
        }
    }

    /// Returns the loaded configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the component registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Returns the workflow executor.
    #[must_use]
    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    /// Returns the workflow run by [`Application::process_query`].
    #[must_use]
    pub fn default_workflow(&self) -> Option<&str> {
        self.config.default_workflow.as_deref()
    }

    /// Runs a workflow by name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowNotFoundError`] if the name is unknown.
    pub async fn run(&self, workflow: &str, ctx: Context) -> Result<WorkflowRun, WorkflowNotFoundError> {
        self.executor.run_workflow(workflow, ctx).await
    }

    /// Runs a workflow by name with per-run options.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowNotFoundError`] if the name is unknown.
    pub async fn run_with(
        &self,
        workflow: &str,
        ctx: Context,
        options: &RunOptions,
    ) -> Result<WorkflowRun, WorkflowNotFoundError> {
        self.executor.run_workflow_with(workflow, ctx, options).await
    }

    /// Runs the default workflow with `query` set to the question.
    ///
    /// `selected_steps` restricts the run to those step ids.
    ///
    /// # Errors
    ///
    /// Returns an error if no default workflow is configured.
    pub async fn process_query(
        &self,
        query: &str,
        context: Option<Context>,
        selected_steps: Option<Vec<String>>,
    ) -> Result<WorkflowRun, QueryflowError> {
        let workflow = self
            .default_workflow()
            .ok_or_else(|| InitializationError::new("no default_workflow configured"))?;

        debug!(workflow, query, "Processing query");
        let ctx = context.unwrap_or_default().with("query", query);
        let options = RunOptions {
            selected_steps,
            run_id: None,
        };
        Ok(self.run_with(workflow, ctx, &options).await?)
    }

    /// Checks every cached component.
    pub async fn health_report(&self) -> Vec<(InstanceKey, bool)> {
        self.registry.health_check_all().await
    }

    /// Runs every component's shutdown hook and clears the instance cache.
    pub async fn shutdown(&self) {
        info!("Shutting down application");
        self.registry.shutdown_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::query_generator::{MockQueryGenerator, QueryGeneratorComponent};
    use crate::components::search::{MockSearchBackend, SearchComponent, SearchHit};
    use crate::components::{Component, ComponentConfig, HealthStatus};
    use crate::errors::{ComponentExecutionError, ComponentRegistryError};
    use crate::events::CollectingEventSink;
    use crate::registry::constructor;
    use crate::testing::{assert_context_value, assert_run_completed, MockComponent};
    use crate::workflow::RunStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CONFIG: &str = r"
default_workflow: answer
components:
  static:
    instances:
      defaults:
        values: { dialect: sqlite, limit: 10 }
  require_keys:
    instances:
      question:
        keys: [query]
  query_generator:
    instances:
      default:
        max_attempts: 2
workflows:
  answer:
    steps:
      - id: seed
        component_type: static
        component_id: defaults
      - id: check
        component_type: require_keys
        component_id: question
      - id: generate
        component_type: query_generator
  seed_only:
    steps:
      - component_type: static
        component_id: defaults
";

    fn generator_returning(query: &'static str) -> Arc<MockQueryGenerator> {
        let mut generator = MockQueryGenerator::new();
        generator
            .expect_generate()
            .returning(move |_| Ok(query.to_string()));
        generator.expect_ping().returning(|| Ok(()));
        Arc::new(generator)
    }

    fn builder(config: &str) -> ApplicationBuilder {
        Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_builtin_components()
            .with_component(
                QueryGeneratorComponent::TYPE_NAME,
                QueryGeneratorComponent::constructor(generator_returning("SELECT 1")),
            )
    }

    #[tokio::test]
    async fn test_process_query_runs_default_workflow() {
        let app = builder(CONFIG).build().await.unwrap();

        let run = app
            .process_query("how many users?", Some(Context::new().with("limit", 99)), None)
            .await
            .unwrap();

        assert_run_completed(&run);
        assert_eq!(run.workflow, "answer");
        assert_context_value(&run.context, "query", "how many users?");
        assert_context_value(&run.context, "limit", 10);
        assert_context_value(&run.context, "generated_query", "SELECT 1");
    }

    #[tokio::test]
    async fn test_process_query_with_selected_steps() {
        let app = builder(CONFIG).build().await.unwrap();

        let run = app
            .process_query("q", None, Some(vec!["seed".to_string()]))
            .await
            .unwrap();

        assert_eq!(run.executed_step_ids(), vec!["seed"]);
        assert!(!run.context.contains_key("generated_query"));
    }

    #[tokio::test]
    async fn test_missing_question_aborts_at_check() {
        let app = builder(CONFIG).build().await.unwrap();

        let run = app.run("answer", Context::new()).await.unwrap();

        assert_eq!(run.status, RunStatus::Aborted);
        assert_eq!(run.failure.unwrap().step_id, "check");
    }

    #[tokio::test]
    async fn test_build_instantiates_configured_components() {
        let app = builder(CONFIG).build().await.unwrap();

        assert!(app.registry().is_instantiated("static", "defaults"));
        assert!(app.registry().is_instantiated("require_keys", "question"));
        assert!(app.registry().is_instantiated("query_generator", "default"));
        assert_eq!(app.executor().workflow_names(), vec!["answer", "seed_only"]);
    }

    #[tokio::test]
    async fn test_invalid_component_config_fails_startup() {
        let config = "components:\n  require_keys:\n    instances:\n      bad: { keys: [] }\n";
        let err = builder(config).build().await.unwrap_err();

        assert!(matches!(
            err,
            QueryflowError::Registry(ComponentRegistryError::ConfigValidation(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_step_type_fails_startup() {
        let config = "workflows:\n  w:\n    steps:\n      - component_type: ghost\n";
        let err = builder(config).build().await.unwrap_err();

        assert!(err.to_string().contains("unregistered component type 'ghost'"));
    }

    #[tokio::test]
    async fn test_unknown_default_workflow_fails_startup() {
        let err = builder("default_workflow: nope\n").build().await.unwrap_err();
        assert!(err.to_string().contains("default workflow 'nope' is not defined"));
    }

    #[tokio::test]
    async fn test_configured_type_without_constructor_fails_startup() {
        let config = "components:\n  vector_store:\n    instances:\n      default: {}\n";
        let err = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, QueryflowError::Initialization(_)));
    }

    #[tokio::test]
    async fn test_class_binds_type_to_named_constructor() {
        let config = r"
components:
  docs_search:
    class: search
    instances:
      default: { top_k: 2 }
workflows:
  lookup:
    steps:
      - component_type: docs_search
";
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .returning(|_, _| Ok(vec![SearchHit::new("a", 0.9, "doc a")]));
        backend.expect_ping().returning(|| Ok(()));
        let app = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component(SearchComponent::TYPE_NAME, SearchComponent::constructor(Arc::new(backend)))
            .build()
            .await
            .unwrap();

        let run = app.run("lookup", Context::new().with("query", "refunds")).await.unwrap();

        assert_run_completed(&run);
        assert_context_value(&run.context, "search_count", 1);
    }

    #[derive(Debug)]
    struct Checked {
        component_type: String,
        component_id: String,
        healthy: bool,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Component for Checked {
        fn component_type(&self) -> &str {
            &self.component_type
        }

        fn component_id(&self) -> &str {
            &self.component_id
        }

        async fn execute(&mut self, _ctx: &Context) -> Result<Context, ComponentExecutionError> {
            Ok(Context::new())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("connection refused".to_string())
            }
        }

        async fn shutdown(&mut self) -> Result<(), ComponentExecutionError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn checked(healthy: bool, shutdowns: Arc<AtomicUsize>) -> crate::registry::ComponentConstructor {
        constructor(move |init| {
            Ok(Box::new(Checked {
                component_type: init.component_type,
                component_id: init.component_id,
                healthy,
                shutdowns: shutdowns.clone(),
            }) as Box<dyn Component>)
        })
    }

    #[tokio::test]
    async fn test_required_component_must_be_healthy() {
        let config = "required_components: [db]\ncomponents:\n  db:\n    instances:\n      default: {}\n";

        let err = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component("db", checked(false, Arc::default()))
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("required component db/default is unhealthy"));

        let app = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component("db", checked(false, Arc::default()))
            .with_health_checks(false)
            .build()
            .await;
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn test_optional_unhealthy_component_only_warns() {
        let config = "components:\n  cache:\n    instances:\n      default: {}\n";
        let app = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component("cache", checked(false, Arc::default()))
            .build()
            .await
            .unwrap();

        assert_eq!(
            app.health_report().await,
            vec![(InstanceKey::new("cache", "default"), false)]
        );
    }

    #[tokio::test]
    async fn test_shutdown_runs_hooks() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let config = "components:\n  db:\n    instances:\n      a: {}\n      b: {}\n";
        let app = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component("db", checked(true, shutdowns.clone()))
            .build()
            .await
            .unwrap();

        app.shutdown().await;

        assert_eq!(shutdowns.load(Ordering::SeqCst), 2);
        assert!(app.registry().list_instances().is_empty());
    }

    #[tokio::test]
    async fn test_retry_manager_resolves_sibling_through_app_registry() {
        let config = r"
components:
  search:
    instances:
      default: { top_k: 5, score_threshold: 0.9 }
  retry_manager:
    instances:
      default: { max_retries: 2, initial_wait_ms: 0, min_results: 1 }
workflows:
  resilient:
    steps:
      - component_type: search
        critical: false
      - component_type: retry_manager
        critical: false
";
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .returning(|_, _| Ok(vec![SearchHit::new("a", 0.8, "doc a")]));
        backend.expect_ping().returning(|| Ok(()));
        let events = Arc::new(CollectingEventSink::new());
        let app = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component(SearchComponent::TYPE_NAME, SearchComponent::constructor(Arc::new(backend)))
            .with_retry_manager()
            .with_event_sink(events.clone())
            .build()
            .await
            .unwrap();

        let run = app.run("resilient", Context::new().with("query", "q")).await.unwrap();

        assert_run_completed(&run);
        assert_context_value(&run.context, "search_count", 1);
        assert_context_value(&run.context, "retries", 1);
        assert!(!events.is_empty());
    }

    #[tokio::test]
    async fn test_process_query_without_default_workflow() {
        let app = builder("workflows:\n  w:\n    steps: []\n").build().await.unwrap();
        let err = app.process_query("q", None, None).await.unwrap_err();
        assert!(matches!(err, QueryflowError::Initialization(_)));
    }

    #[tokio::test]
    async fn test_mock_component_bound_by_class() {
        let mock = MockComponent::emitting(Context::new().with("x", 1));
        let config = "components:\n  emit_a:\n    class: mock\n    instances:\n      default: {}\nworkflows:\n  w:\n    steps:\n      - component_type: emit_a\n";
        let app = Application::builder(RuntimeConfig::from_yaml_str(config).unwrap())
            .with_component("mock", mock.constructor())
            .build()
            .await
            .unwrap();

        let run = app.run("w", Context::new()).await.unwrap();

        assert_context_value(&run.context, "x", 1);
        assert_eq!(mock.construction_count(), 1);
        assert_eq!(
            app.registry().config("emit_a", "default"),
            Some(ComponentConfig::new())
        );
    }
}
