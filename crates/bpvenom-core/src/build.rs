//! Options and results of the `pack` build executor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Binary used when a step does not name one.
pub const DEFAULT_PACK_BINARY: &str = "pack";

/// Parameters of a single `pack build` invocation.
///
/// Only fields that are explicitly set contribute to the generated command
/// line; empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Name of the image to build. Required.
    pub image_name: String,
    /// Builder image reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    /// Buildpack identifiers, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buildpacks: Vec<String>,
    pub clear_cache: bool,
    /// Build-time environment variables.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Raw arguments appended verbatim after the env flags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub no_color: bool,
    pub no_pull: bool,
    /// Path or name of the builder binary, resolved through `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_binary: Option<String>,
    /// Build context directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbom_output_dir: Option<String>,
    pub trust_builder: bool,
    pub verbose: bool,
    /// Volume mount specs, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
}

impl BuildOptions {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            ..Default::default()
        }
    }

    /// The configured builder binary, falling back to `pack`.
    pub fn pack_binary(&self) -> &str {
        self.pack_binary
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_PACK_BINARY)
    }

    /// Check the options are complete enough to generate a command.
    pub fn validate(&self) -> Result<()> {
        if self.image_name.is_empty() {
            return Err(Error::InvalidInput("image-name must be defined".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a `pack build` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildResult {
    /// Exit code of the build process, 0 on success.
    pub code: i32,
    /// Rendered command line, for diagnostics.
    pub command: String,
    pub systemout: String,
    pub systemerr: String,
    /// `local_info` from `pack inspect`; only populated when `code` is 0.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub image_info: Map<String, Value>,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}
