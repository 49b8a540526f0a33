//! Random image name executor.

use async_trait::async_trait;
use bpvenom_core::context::ExecutionContext;
use bpvenom_core::executor::Executor;
use bpvenom_core::name::{IMAGE_NAME_PREFIX, NameResult};
use bpvenom_core::step::{RANDOM_IMAGE_NAME_EXECUTOR, StepAction, StepOutput};
use bpvenom_core::{Error, Result};
use rand::Rng;
use tracing::debug;

const SUFFIX_LEN: usize = 10;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Generate `local.venom.buildpacks.io/pack-test-<10 lowercase letters>`.
///
/// The suffix only avoids accidental collisions between test runs; it is not
/// meant to be unpredictable.
pub fn generate() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect();
    format!("{}-{}", IMAGE_NAME_PREFIX, suffix)
}

/// Executor producing a fresh image name per step.
#[derive(Debug, Default)]
pub struct RandomImageNameExecutor;

impl RandomImageNameExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Registry constructor.
    pub fn boxed() -> Box<dyn Executor> {
        Box::new(Self::new())
    }
}

#[async_trait]
impl Executor for RandomImageNameExecutor {
    fn name(&self) -> &'static str {
        RANDOM_IMAGE_NAME_EXECUTOR
    }

    async fn run(&self, _ctx: &ExecutionContext, action: &StepAction) -> Result<StepOutput> {
        match action {
            StepAction::RandomImageName => {
                let name = generate();
                debug!(name = %name, "Generated image name");
                Ok(StepOutput::ImageName(NameResult { name }))
            }
            other => Err(Error::InvalidInput(format!(
                "random-image-name executor cannot run a {} step",
                other.executor()
            ))),
        }
    }
}
