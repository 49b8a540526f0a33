//! Step definitions and their outputs.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::build::{BuildOptions, BuildResult};
use crate::name::NameResult;

/// Registry key of the `pack` build executor.
pub const PACK_EXECUTOR: &str = "pack";
/// Registry key of the random image name executor.
pub const RANDOM_IMAGE_NAME_EXECUTOR: &str = "random-image-name";

/// A single declarative unit of a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// What the step does, with its decoded options.
    pub action: StepAction,
    /// Explicit checks; the executor's defaults apply when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
}

impl Step {
    pub fn new(action: StepAction) -> Self {
        Self {
            name: None,
            action,
            assertions: Vec::new(),
        }
    }

    /// Name used in logs: the display name, or the executor name.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.action.executor())
    }
}

/// Statically-typed options of each known executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepAction {
    Pack(BuildOptions),
    RandomImageName,
}

impl StepAction {
    /// Registry key of the executor handling this action.
    pub fn executor(&self) -> &'static str {
        match self {
            StepAction::Pack(_) => PACK_EXECUTOR,
            StepAction::RandomImageName => RANDOM_IMAGE_NAME_EXECUTOR,
        }
    }
}

/// Result an executor hands back for assertion evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepOutput {
    Pack(BuildResult),
    ImageName(NameResult),
}

/// A check in the host's assertion syntax, e.g. `result.code ShouldEqual 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct Assertion(String);

impl Assertion {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Assertion {
    fn from(expr: &str) -> Self {
        Self::new(expr)
    }
}

/// Checks applied to a step's result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAssertions {
    pub assertions: Vec<Assertion>,
}

impl StepAssertions {
    pub fn new(assertions: impl IntoIterator<Item = Assertion>) -> Self {
        Self {
            assertions: assertions.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }
}

/// Everything the host needs after a step ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: String,
    pub executor: String,
    pub result: StepOutput,
    /// Explicit step assertions, or the executor defaults.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_executor_names() {
        let pack = StepAction::Pack(BuildOptions::new("local/app"));
        assert_eq!(pack.executor(), "pack");
        assert_eq!(StepAction::RandomImageName.executor(), "random-image-name");
    }

    #[test]
    fn test_step_label_falls_back_to_executor() {
        let mut step = Step::new(StepAction::RandomImageName);
        assert_eq!(step.label(), "random-image-name");

        step.name = Some("image".to_string());
        assert_eq!(step.label(), "image");
    }

    #[test]
    fn test_output_serializes_as_inner_result() {
        let output = StepOutput::ImageName(NameResult {
            name: "local.venom.buildpacks.io/pack-test-abcdefghij".to_string(),
        });
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["name"], "local.venom.buildpacks.io/pack-test-abcdefghij");
    }

    #[test]
    fn test_assertion_display() {
        let assertion = Assertion::from("result.code ShouldEqual 0");
        assert_eq!(assertion.to_string(), "result.code ShouldEqual 0");
        assert_eq!(
            serde_json::to_string(&assertion).unwrap(),
            "\"result.code ShouldEqual 0\""
        );
    }
}
