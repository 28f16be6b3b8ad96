//! Mock components for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::components::{Component, ComponentMetadata};
use crate::context::Context;
use crate::errors::ComponentExecutionError;
use crate::registry::{constructor, ComponentConstructor};

/// What a [`MockComponent`] does when executed.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// Return this partial context.
    Output(Context),
    /// Raise a [`ComponentExecutionError`] with this message.
    Raise(String),
}

#[derive(Debug)]
struct MockState {
    response: Mutex<MockResponse>,
    calls: Mutex<Vec<Context>>,
    constructions: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// A component with a scripted response that records every call.
///
/// Clones share their recorded state, so a test keeps one clone and hands
/// [`MockComponent::constructor`] to the registry.
#[derive(Debug, Clone)]
pub struct MockComponent {
    component_type: String,
    component_id: String,
    delay: Option<Duration>,
    state: Arc<MockState>,
}

impl MockComponent {
    /// Creates a mock that returns an empty partial context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_response(MockResponse::Output(Context::new()))
    }

    /// Creates a mock that returns `partial`.
    #[must_use]
    pub fn emitting(partial: Context) -> Self {
        Self::with_response(MockResponse::Output(partial))
    }

    /// Creates a mock that raises `message`.
    #[must_use]
    pub fn raising(message: impl Into<String>) -> Self {
        Self::with_response(MockResponse::Raise(message.into()))
    }

    /// Creates a mock that reports a soft `error`.
    #[must_use]
    pub fn soft_error(message: impl Into<String>) -> Self {
        Self::emitting(Context::failure(message))
    }

    fn with_response(response: MockResponse) -> Self {
        Self {
            component_type: "mock".to_string(),
            component_id: "default".to_string(),
            delay: None,
            state: Arc::new(MockState {
                response: Mutex::new(response),
                calls: Mutex::new(Vec::new()),
                constructions: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }),
        }
    }

    /// Sleeps for `delay` inside every execution.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the scripted response.
    pub fn set_response(&self, response: MockResponse) {
        *self.state.response.lock() = response;
    }

    /// Returns a constructor that builds clones sharing this mock's state.
    #[must_use]
    pub fn constructor(&self) -> ComponentConstructor {
        let template = self.clone();
        constructor(move |init| {
            template.state.constructions.fetch_add(1, Ordering::SeqCst);
            let mut component = template.clone();
            component.component_type = init.component_type;
            component.component_id = init.component_id;
            Ok(Box::new(component) as Box<dyn Component>)
        })
    }

    /// Returns how many times the component executed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    /// Returns how many instances the registry constructed.
    #[must_use]
    pub fn construction_count(&self) -> usize {
        self.state.constructions.load(Ordering::SeqCst)
    }

    /// Returns the highest number of overlapping executions observed.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Returns the context seen by each call.
    #[must_use]
    pub fn recorded_contexts(&self) -> Vec<Context> {
        self.state.calls.lock().clone()
    }

    /// Returns the context seen by the latest call.
    #[must_use]
    pub fn last_context(&self) -> Option<Context> {
        self.state.calls.lock().last().cloned()
    }

    /// Clears recorded calls.
    pub fn reset(&self) {
        self.state.calls.lock().clear();
    }
}

impl Default for MockComponent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Component for MockComponent {
    fn component_type(&self) -> &str {
        &self.component_type
    }

    fn component_id(&self) -> &str {
        &self.component_id
    }

    async fn execute(&mut self, ctx: &Context) -> Result<Context, ComponentExecutionError> {
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        self.state.calls.lock().push(ctx.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.state.response.lock().clone();
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        match response {
            MockResponse::Output(partial) => Ok(partial),
            MockResponse::Raise(message) => Err(ComponentExecutionError::new(message)),
        }
    }

    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(&self.component_type, &self.component_id)
            .with_display_name("Mock")
            .with_configurable(false)
    }
}
