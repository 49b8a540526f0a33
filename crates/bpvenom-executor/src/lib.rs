//! Step executors for buildpacks-venom.
//!
//! Provides the executors registered with the test host:
//! - `pack`: builds an image with the pack CLI and inspects the result
//! - `random-image-name`: generates a throwaway image name

pub mod image_name;
pub mod pack;

pub use bpvenom_core::executor::{Executor, ExecutorFactory, ExecutorRegistry};
pub use image_name::RandomImageNameExecutor;
pub use pack::PackExecutor;

use bpvenom_core::step::{PACK_EXECUTOR, RANDOM_IMAGE_NAME_EXECUTOR};

/// Registry holding both built-in executors.
pub fn builtin_registry() -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with(PACK_EXECUTOR, PackExecutor::boxed)
        .with(RANDOM_IMAGE_NAME_EXECUTOR, RandomImageNameExecutor::boxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpvenom_core::{ExecutionContext, Step, StepAction, StepOutput};

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_registry();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["pack", "random-image-name"]
        );
        assert_eq!(registry.create("pack").unwrap().name(), "pack");
        assert_eq!(
            registry.create("random-image-name").unwrap().name(),
            "random-image-name"
        );
        assert!(registry.create("docker").is_err());
    }

    #[tokio::test]
    async fn test_registry_runs_random_image_name_step() {
        let report = builtin_registry()
            .run_step(&ExecutionContext::new(), &Step::new(StepAction::RandomImageName))
            .await
            .unwrap();

        assert_eq!(report.executor, "random-image-name");
        assert!(report.assertions.is_empty());
        assert!(matches!(report.result, StepOutput::ImageName(_)));
    }
}
