//! CLI command implementations.

pub mod run;

use anyhow::Result;
use bpvenom_config::{ConfigError, load_steps};
use bpvenom_executor::builtin_registry;
use bpvenom_executor::image_name::generate;

pub fn validate(path: &str) -> Result<()> {
    match load_steps(path) {
        Ok(steps) => {
            println!("Step file is valid ({} steps)", steps.len());
            Ok(())
        }
        Err(ConfigError::InvalidStep { step, errors }) => {
            println!("Step '{}' is invalid:", step);
            for error in &errors {
                println!("  - {}", error);
            }
            std::process::exit(1);
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn executors() {
    for name in builtin_registry().names() {
        println!("{}", name);
    }
}

pub fn image_name() {
    println!("{}", generate());
}
