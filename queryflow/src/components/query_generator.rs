//! Query generation with validation-driven regeneration.
//!
//! The component turns the question in `query` into a query string by
//! calling an external [`QueryGenerator`], checks the candidate against the
//! `schema` in the context, and regenerates with a corrective hint until the
//! candidate validates or the attempt budget is spent.

use super::{check_rules, Component, ComponentConfig, ComponentInit, ComponentMetadata, ConfigRule, HealthStatus};
use crate::context::{Context, Value};
use crate::errors::ComponentExecutionError;
use crate::registry::{constructor, ComponentConstructor};
use crate::retry::{generate_validated, BackoffStrategy, JitterStrategy, RetryConfig};
use crate::validation::{QueryValidator, ValidationMode};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Input handed to a [`QueryGenerator`] for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The natural-language question.
    pub question: String,
    /// The schema description from the context, if any.
    pub schema: Option<Value>,
    /// 1-based attempt number.
    pub attempt: usize,
    /// The defect found in the previous candidate.
    pub hint: Option<String>,
}

impl GenerationRequest {
    /// Returns the question with the correction hint folded in.
    #[must_use]
    pub fn prompt_question(&self) -> String {
        match &self.hint {
            Some(hint) => format!("{} (Previous attempt was rejected: {hint})", self.question),
            None => self.question.clone(),
        }
    }
}

/// External service that turns a question into a query, usually an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Produces one candidate query.
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;

    /// Checks that the service is reachable.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Generates a query for the question in `query`.
///
/// Options:
///
/// | key | default | constraint |
/// |---|---|---|
/// | `max_attempts` | 3 | integer > 0 |
/// | `base_delay_ms` | 0 | integer >= 0 |
/// | `backoff` | `exponential` | `exponential`, `linear` or `constant` |
/// | `validation_mode` | `full` | `full`, `syntax_only` or `none` |
///
/// Writes `generated_query`, `query_attempts`, `query_corrections` and
/// `query_error` (null when the query validated).
pub struct QueryGeneratorComponent {
    component_type: String,
    component_id: String,
    config: ComponentConfig,
    generator: Arc<dyn QueryGenerator>,
}

impl QueryGeneratorComponent {
    /// Type name this component is registered under by default.
    pub const TYPE_NAME: &'static str = "query_generator";

    /// Creates the component.
    #[must_use]
    pub fn new(init: ComponentInit, generator: Arc<dyn QueryGenerator>) -> Self {
        Self {
            component_type: init.component_type,
            component_id: init.component_id,
            config: init.config,
            generator,
        }
    }

    /// Returns a constructor that shares `generator` across instances.
    pub fn constructor(generator: Arc<dyn QueryGenerator>) -> ComponentConstructor {
        constructor(move |init| {
            Ok(Box::new(Self::new(init, Arc::clone(&generator))) as Box<dyn Component>)
        })
    }

    fn rules() -> Vec<ConfigRule> {
        vec![
            ConfigRule::positive_int("max_attempts"),
            ConfigRule::non_negative_int("base_delay_ms"),
            ConfigRule::one_of("backoff", &BackoffStrategy::NAMES),
            ConfigRule::one_of("validation_mode", &ValidationMode::NAMES),
        ]
    }

    fn retry_config(&self) -> RetryConfig {
        let max_attempts = usize::try_from(self.config.int_or("max_attempts", 3)).unwrap_or(1);
        let base_delay_ms = u64::try_from(self.config.int_or("base_delay_ms", 0)).unwrap_or(0);
        RetryConfig::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(base_delay_ms)
            .with_backoff(
                BackoffStrategy::parse(self.config.str_or("backoff", "exponential"))
                    .unwrap_or_default(),
            )
            .with_jitter(JitterStrategy::Equal)
    }

    fn validation_mode(&self) -> ValidationMode {
        ValidationMode::parse(self.config.str_or("validation_mode", "full")).unwrap_or_default()
    }
}

#[async_trait]
impl Component for QueryGeneratorComponent {
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        let Some(question) = ctx.get_str("query").map(str::trim).filter(|q| !q.is_empty()) else {
            return Ok(Context::failure("no question provided in 'query'"));
        };

        let schema = ctx.get("schema").filter(|s| !s.is_null()).cloned();
        let validator = match &schema {
            Some(schema) => QueryValidator::new(self.validation_mode()).with_schema(schema),
            None => QueryValidator::new(self.validation_mode()),
        };

        debug!(component_id = %self.component_id, question, "Generating query");

        let generator = Arc::clone(&self.generator);
        let outcome = generate_validated(
            &self.retry_config(),
            &self.component_id,
            |attempt, hint| {
                let generator = Arc::clone(&generator);
                let request = GenerationRequest {
                    question: question.to_string(),
                    schema: schema.clone(),
                    attempt,
                    hint,
                };
                async move { generator.generate(&request).await }
            },
            |candidate: &String| validator.validate(candidate).map_err(|issue| issue.to_string()),
        )
        .await
        .map_err(|err| ComponentExecutionError::from(err.context("query generation failed")))?;

        match &outcome.error {
            None => info!(
                component_id = %self.component_id,
                attempts = outcome.attempts,
                "Generated valid query"
            ),
            Some(error) => warn!(
                component_id = %self.component_id,
                attempts = outcome.attempts,
                %error,
                "Returning query that failed validation"
            ),
        }

        Ok(Context::new()
            .with("generated_query", outcome.candidate)
            .with("query_attempts", outcome.attempts)
            .with("query_corrections", outcome.corrections)
            .with("query_error", outcome.error))
    }

    fn config_violation(&self) -> Option<String> {
        check_rules(&self.config, &Self::rules()).err()
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id)
            .with_display_name("Query generator")
            .with_description("Generates a query and regenerates it until it validates")
    }

    async fn health_check(&self) -> HealthStatus {
        match self.generator.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(err) => HealthStatus::Unhealthy(format!("{err:#}")),
        }
    }
}

impl fmt::Debug for QueryGeneratorComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryGeneratorComponent")
            .field("component_type", &self.component_type)
            .field("component_id", &self.component_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
