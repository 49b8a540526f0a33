//! Executor trait and registry.
//!
//! Executors perform a single test step and hand back a structured result for
//! the host's assertion layer. The host builds an [`ExecutorRegistry`] from
//! the executors it wants and looks them up by name when running steps.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{Instrument, debug};

use crate::context::ExecutionContext;
use crate::step::{Step, StepAction, StepAssertions, StepOutput, StepReport};
use crate::{Error, Result};

/// Trait for step executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Run a step's action and return its result.
    async fn run(&self, ctx: &ExecutionContext, action: &StepAction) -> Result<StepOutput>;

    /// Checks applied when a step declares none.
    fn default_assertions(&self) -> Option<StepAssertions> {
        None
    }
}

/// Constructor producing a fresh executor instance.
pub type ExecutorFactory = fn() -> Box<dyn Executor>;

/// Name to constructor lookup table, built explicitly by the host.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    factories: BTreeMap<String, ExecutorFactory>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, returning the one it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ExecutorFactory,
    ) -> Option<ExecutorFactory> {
        self.factories.insert(name.into(), factory)
    }

    pub fn with(mut self, name: impl Into<String>, factory: ExecutorFactory) -> Self {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create a fresh executor for `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Executor>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownExecutor(name.to_string()))
    }

    /// Run a step with a fresh executor inside the context's span.
    pub async fn run_step(&self, ctx: &ExecutionContext, step: &Step) -> Result<StepReport> {
        let executor = self.create(step.action.executor())?;
        debug!(step = %step.label(), executor = executor.name(), "Running step");

        let result = executor
            .run(ctx, &step.action)
            .instrument(ctx.span().clone())
            .await?;

        let assertions = if step.assertions.is_empty() {
            executor
                .default_assertions()
                .map(|defaults| defaults.assertions)
                .unwrap_or_default()
        } else {
            step.assertions.clone()
        };

        Ok(StepReport {
            step: step.label().to_string(),
            executor: executor.name().to_string(),
            result,
            assertions,
        })
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl<N: Into<String>> FromIterator<(N, ExecutorFactory)> for ExecutorRegistry {
    fn from_iter<I: IntoIterator<Item = (N, ExecutorFactory)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (name, factory) in iter {
            registry.register(name, factory);
        }
        registry
    }
}
