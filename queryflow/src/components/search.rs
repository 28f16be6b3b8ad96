//! Similarity search and the retry manager that widens it.

use super::{check_rules, Component, ComponentConfig, ComponentInit, ComponentMetadata, ConfigRule, HealthStatus};
use crate::context::{Context, Value};
use crate::errors::ComponentExecutionError;
use crate::registry::{constructor, ComponentConstructor, ComponentRegistry};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TOP_K: i64 = 5;
const DEFAULT_SCORE_THRESHOLD: f64 = 0.7;
const MAX_WAIT_MS: i64 = 30_000;

/// One scored match returned by a [`SearchBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Similarity score, higher is closer.
    pub score: f64,
    /// Document payload.
    pub payload: Value,
}

impl SearchHit {
    /// Creates a hit.
    #[must_use]
    pub fn new(id: impl Into<String>, score: f64, payload: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            score,
            payload: payload.into(),
        }
    }

    fn into_value(self) -> Value {
        let mut map = IndexMap::new();
        map.insert("id".to_string(), Value::String(self.id));
        map.insert("score".to_string(), Value::Float(self.score));
        map.insert("payload".to_string(), self.payload);
        Value::Map(map)
    }
}

/// External similarity search service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns up to `limit` candidates for the query, best first.
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchHit>>;

    /// Checks that the service is reachable.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Searches for documents similar to `query`.
///
/// Options: `top_k` (integer > 0, default 5) and `score_threshold`
/// (number in [0, 1], default 0.7). Both can be overridden per call through
/// context keys of the same name. Backend failures are reported as a soft
/// `error` with empty results.
pub struct SearchComponent {
    component_type: String,
    component_id: String,
    config: ComponentConfig,
    backend: Arc<dyn SearchBackend>,
}

impl SearchComponent {
    /// Type name this component is registered under by default.
    pub const TYPE_NAME: &'static str = "search";

    /// Creates the component.
    #[must_use]
    pub fn new(init: ComponentInit, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            component_type: init.component_type,
            component_id: init.component_id,
            config: init.config,
            backend,
        }
    }

    /// Returns a constructor that shares `backend` across instances.
    pub fn constructor(backend: Arc<dyn SearchBackend>) -> ComponentConstructor {
        constructor(move |init| {
            Ok(Box::new(Self::new(init, Arc::clone(&backend))) as Box<dyn Component>)
        })
    }

    fn rules() -> [ConfigRule; 2] {
        [
            ConfigRule::positive_int("top_k"),
            ConfigRule::float_range("score_threshold", 0.0, 1.0),
        ]
    }

    fn empty_results(&self, error: impl Into<String>) -> Context {
        Context::failure(error)
            .with("search_results", Vec::<Value>::new())
            .with("search_count", 0)
            .with("search_component", self.component_id.as_str())
    }
}

#[async_trait]
impl Component for SearchComponent {
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        let Some(query) = ctx.get_str("query").filter(|q| !q.trim().is_empty()) else {
            return Ok(self.empty_results("no query provided"));
        };

        let top_k = ctx
            .get_i64("top_k")
            .unwrap_or_else(|| self.config.int_or("top_k", DEFAULT_TOP_K));
        let top_k = usize::try_from(top_k).unwrap_or(0).max(1);
        let threshold = ctx
            .get_f64("score_threshold")
            .unwrap_or_else(|| self.config.float_or("score_threshold", DEFAULT_SCORE_THRESHOLD));

        let hits = match self.backend.search(query, top_k).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(component_id = %self.component_id, error = %format!("{err:#}"), "Search backend failed");
                return Ok(self.empty_results(format!("search failed: {err:#}")));
            }
        };

        let results: Vec<Value> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .take(top_k)
            .map(SearchHit::into_value)
            .collect();

        debug!(
            component_id = %self.component_id,
            top_k,
            threshold,
            count = results.len(),
            "Search finished"
        );

        Ok(Context::new()
            .with("search_count", results.len())
            .with("search_results", results)
            .with("search_component", self.component_id.as_str()))
    }

    fn config_violation(&self) -> Option<String> {
        check_rules(&self.config, &Self::rules()).err()
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id)
            .with_display_name("Similarity search")
    }

    async fn health_check(&self) -> HealthStatus {
        match self.backend.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(err) => HealthStatus::Unhealthy(format!("{err:#}")),
        }
    }
}

impl fmt::Debug for SearchComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchComponent")
            .field("component_type", &self.component_type)
            .field("component_id", &self.component_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// How the retry manager widens a search that returned too little.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Multiply the score threshold by `threshold_reduction_factor`.
    ThresholdReduction,
    /// Double `top_k`.
    ExpandTopK,
}

impl FallbackStrategy {
    /// Option values accepted in component configuration.
    pub const NAMES: [&'static str; 2] = ["threshold_reduction", "expand_top_k"];

    /// Parses a configuration value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "threshold_reduction" => Some(Self::ThresholdReduction),
            "expand_top_k" => Some(Self::ExpandTopK),
            _ => None,
        }
    }
}

/// Re-runs a sibling search component with relaxed parameters until it
/// returns at least `min_results` results.
///
/// The sibling is resolved through the registry at call time. Adjusted
/// parameters travel in the context handed to the sibling; the sibling's own
/// configuration is never changed.
///
/// Options: `max_retries` (>= 0, default 3), `min_results` (> 0, default 1),
/// `backoff_factor` (> 0, default 1.5), `initial_wait_ms` (>= 0, default
/// 100), `fallback_strategy` (default `threshold_reduction`),
/// `threshold_reduction_factor` (in (0, 1), default 0.8), `search_type`
/// (default `search`) and `search_component` (default `default`).
pub struct RetryManagerComponent {
    component_type: String,
    component_id: String,
    config: ComponentConfig,
    registry: Weak<ComponentRegistry>,
}

impl RetryManagerComponent {
    /// Type name this component is registered under by default.
    pub const TYPE_NAME: &'static str = "retry_manager";

    /// Creates the component.
    ///
    /// The registry is held weakly since it owns this instance.
    #[must_use]
    pub fn new(init: ComponentInit, registry: &Arc<ComponentRegistry>) -> Self {
        Self {
            component_type: init.component_type,
            component_id: init.component_id,
            config: init.config,
            registry: Arc::downgrade(registry),
        }
    }

    /// Returns a constructor bound to `registry`.
    pub fn constructor(registry: &Arc<ComponentRegistry>) -> ComponentConstructor {
        let registry = Arc::downgrade(registry);
        constructor(move |init| {
            Ok(Box::new(Self {
                component_type: init.component_type,
                component_id: init.component_id,
                config: init.config,
                registry: registry.clone(),
            }) as Box<dyn Component>)
        })
    }

    fn rules() -> [ConfigRule; 7] {
        [
            ConfigRule::non_negative_int("max_retries"),
            ConfigRule::positive_int("min_results"),
            ConfigRule::positive_float("backoff_factor"),
            ConfigRule::non_negative_int("initial_wait_ms"),
            ConfigRule::non_negative_int("max_wait_ms"),
            ConfigRule::one_of("fallback_strategy", &FallbackStrategy::NAMES),
            ConfigRule::float_open_range("threshold_reduction_factor", 0.0, 1.0),
        ]
    }

    /// Pause before retry number `retry`, capped at `max_wait_ms`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn wait_for(&self, retry: i32) -> Duration {
        let initial = self.config.int_or("initial_wait_ms", 100).max(0) as f64;
        let factor = self.config.float_or("backoff_factor", 1.5);
        let cap = self.config.int_or("max_wait_ms", MAX_WAIT_MS).max(0) as f64;
        let wait = initial * factor.powi(retry.saturating_sub(1));
        // NaN and infinity fall back to the cap.
        let wait = if wait.is_finite() { wait.clamp(0.0, cap) } else { cap };
        Duration::from_millis(wait as u64)
    }
}

fn result_count(ctx: &Context) -> usize {
    ctx.get("search_results")
        .and_then(Value::as_list)
        .map_or(0, <[Value]>::len)
}

#[async_trait]
impl Component for RetryManagerComponent {
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        let min_results = usize::try_from(self.config.int_or("min_results", 1)).unwrap_or(1);
        let max_retries = i32::try_from(self.config.int_or("max_retries", 3)).unwrap_or(0);

        if result_count(ctx) >= min_results {
            debug!(component_id = %self.component_id, "Enough results, no retry needed");
            return Ok(Context::new().with("retries", 0));
        }

        let search_type = self.config.str_or("search_type", SearchComponent::TYPE_NAME).to_string();
        let search_id = ctx
            .get_str("search_component")
            .unwrap_or_else(|| self.config.str_or("search_component", "default"))
            .to_string();

        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| ComponentExecutionError::new("component registry is no longer available"))?;

        let search = match registry.get(&search_type, &search_id) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(component_id = %self.component_id, error = %err, "Search component unavailable");
                return Ok(Context::failure(format!("search component unavailable: {err}")).with("retries", 0));
            }
        };

        let sibling = registry.config(&search_type, &search_id).unwrap_or_default();
        let mut threshold = ctx
            .get_f64("score_threshold")
            .unwrap_or_else(|| sibling.float_or("score_threshold", DEFAULT_SCORE_THRESHOLD));
        let mut top_k = ctx
            .get_i64("top_k")
            .unwrap_or_else(|| sibling.int_or("top_k", DEFAULT_TOP_K));

        let strategy = FallbackStrategy::parse(self.config.str_or("fallback_strategy", "threshold_reduction"))
            .unwrap_or(FallbackStrategy::ThresholdReduction);
        let reduction = self.config.float_or("threshold_reduction_factor", 0.8);

        let mut current = ctx.clone();
        let mut last_error = None;
        let mut retries = 0;

        while result_count(&current) < min_results && retries < max_retries {
            retries += 1;
            match strategy {
                FallbackStrategy::ThresholdReduction => threshold *= reduction,
                FallbackStrategy::ExpandTopK => top_k = top_k.saturating_mul(2),
            }

            let wait = self.wait_for(retries);
            debug!(
                component_id = %self.component_id,
                retry = retries,
                threshold,
                top_k,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Retrying search"
            );
            tokio::time::sleep(wait).await;

            let request = current
                .clone()
                .with("score_threshold", threshold)
                .with("top_k", top_k);
            let partial = search.execute(&request).await?;
            last_error = partial.get("error").filter(|e| !e.is_blank()).cloned();
            current.merge(partial);
        }

        let count = result_count(&current);
        info!(component_id = %self.component_id, retries, count, "Search retries finished");

        let mut params = IndexMap::new();
        params.insert("score_threshold".to_string(), Value::Float(threshold));
        params.insert("top_k".to_string(), Value::Int(top_k));

        let mut output = Context::new()
            .with("search_results", current.get("search_results").cloned().unwrap_or_default())
            .with("search_count", count)
            .with("retries", retries)
            .with("retry_manager", self.component_id.as_str())
            .with("search_params", params);
        if let Some(error) = last_error {
            output.insert("error", error);
        }
        Ok(output)
    }

    fn config_violation(&self) -> Option<String> {
        check_rules(&self.config, &Self::rules()).err()
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id)
            .with_display_name("Search retry manager")
    }
}

impl fmt::Debug for RetryManagerComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryManagerComponent")
            .field("component_type", &self.component_type)
            .field("component_id", &self.component_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
