//! Core step types and traits for the buildpacks-venom executors.
//!
//! This crate contains:
//! - Build options and results of the `pack` executor
//! - The generated image name result
//! - Step definitions, outputs and assertions
//! - The execution context passed to executors
//! - The executor trait and registry

pub mod build;
pub mod context;
pub mod error;
pub mod executor;
pub mod name;
pub mod step;

pub use build::{BuildOptions, BuildResult};
pub use context::{CancelHandle, CancelSignal, ExecutionContext, cancel_pair};
pub use error::{Error, Result, ResultExt};
pub use executor::{Executor, ExecutorFactory, ExecutorRegistry};
pub use name::NameResult;
pub use step::{Assertion, Step, StepAction, StepAssertions, StepOutput, StepReport};
