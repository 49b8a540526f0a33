//! Result type of the random image name executor.

use serde::{Deserialize, Serialize};

/// Namespace every generated image name lives under.
pub const IMAGE_NAME_PREFIX: &str = "local.venom.buildpacks.io/pack-test";

/// A generated image name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameResult {
    pub name: String,
}
