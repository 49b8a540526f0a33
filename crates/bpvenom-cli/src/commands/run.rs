//! Step file execution command.

use anyhow::{Context, Result};
use bpvenom_config::load_steps;
use bpvenom_core::{
    CancelHandle, CancelSignal, ExecutionContext, ExecutorRegistry, Step, StepReport, cancel_pair,
};
use bpvenom_executor::builtin_registry;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{error, info_span, warn};

/// Run every step of a step file through the built-in executors.
pub async fn run_file(config_path: &str, workdir: Option<PathBuf>) -> Result<()> {
    let steps = load_steps(config_path)
        .with_context(|| format!("Failed to load step file: {}", config_path))?;

    let working_dir = match workdir {
        Some(dir) => dir,
        None => default_working_dir(config_path)?,
    };
    println!("Working directory: {}", working_dir.display());

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
            std::process::exit(130);
        }
    });

    let registry = builtin_registry();
    let outcomes = execute_steps(&registry, &steps, &working_dir, &signal).await;

    let mut failed = 0;
    for (label, outcome) in &outcomes {
        match outcome {
            Ok(report) => {
                println!("✓ Step '{}'", label);
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            Err(e) => {
                println!("✗ Step '{}' failed: {}", label, e);
                failed += 1;
            }
        }
    }

    if outcomes.len() < steps.len() {
        println!("⊘ {} steps skipped", steps.len() - outcomes.len());
    }

    if failed > 0 {
        anyhow::bail!("{} of {} steps failed", failed, steps.len());
    }
    Ok(())
}

/// Run steps in order, stopping early only when cancelled.
pub async fn execute_steps(
    registry: &ExecutorRegistry,
    steps: &[Step],
    working_dir: &Path,
    cancel: &CancelSignal,
) -> Vec<(String, bpvenom_core::Result<StepReport>)> {
    let mut outcomes = Vec::with_capacity(steps.len());

    for (idx, step) in steps.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let span = info_span!("step", index = idx + 1, name = %step.label());
        let ctx = ExecutionContext::new()
            .with_working_dir(working_dir)
            .with_span(span)
            .with_cancel(cancel.clone());

        let outcome = registry.run_step(&ctx, step).await;
        if let Err(e) = &outcome {
            error!(step = %step.label(), error = %e, "Step failed");
        }
        outcomes.push((step.label().to_string(), outcome));
    }

    outcomes
}

/// Cancel on the first interrupt. Returns `true` once a second interrupt
/// arrives, at which point the caller should exit.
async fn watch_interrupts<F, Fut>(mut interrupt: F, cancel: CancelHandle) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupted, cancelling running step");
    cancel.cancel();

    if interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupted again, exiting");
    true
}

/// The directory containing the step file, or the current directory.
fn default_working_dir(config_path: &str) -> Result<PathBuf> {
    Path::new(config_path)
        .parent()
        .map(|p| {
            if p.as_os_str().is_empty() {
                Path::new(".")
            } else {
                p
            }
        })
        .unwrap_or(Path::new("."))
        .canonicalize()
        .context("Failed to resolve working directory")
}
