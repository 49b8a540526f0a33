//! Step definition parsing.
//!
//! A step file is a KDL document of `step` nodes. The first argument names the
//! executor, an optional `name=` property labels the step, and children carry
//! the executor's options:
//!
//! ```kdl
//! step "random-image-name" name="image"
//!
//! step "pack" name="build app" {
//!     image-name "local/app"
//!     builder "paketobuildpacks/builder:base"
//!     buildpacks "paketo-buildpacks/go"
//!     env { BP_GO_VERSION "1.22" }
//!     trust-builder
//!     assertions "result.code ShouldEqual 0"
//! }
//! ```

use crate::{ConfigError, ConfigResult, FieldError};
use bpvenom_core::step::{PACK_EXECUTOR, RANDOM_IMAGE_NAME_EXECUTOR};
use bpvenom_core::{Assertion, BuildOptions, Step, StepAction};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use std::path::Path;

/// Read and parse a step file.
pub fn load_steps(path: impl AsRef<Path>) -> ConfigResult<Vec<Step>> {
    let content = std::fs::read_to_string(path)?;
    parse_steps(&content)
}

/// Parse steps from KDL text.
pub fn parse_steps(kdl: &str) -> ConfigResult<Vec<Step>> {
    let doc: KdlDocument = kdl.parse()?;

    let mut steps = Vec::new();
    for node in doc.nodes() {
        match node.name().value() {
            "step" => steps.push(parse_step(node, steps.len())?),
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "node".to_string(),
                    message: format!("expected 'step', found '{}'", other),
                });
            }
        }
    }

    Ok(steps)
}

fn parse_step(node: &KdlNode, index: usize) -> ConfigResult<Step> {
    let executor = get_first_string_arg(node).ok_or_else(|| {
        ConfigError::MissingField(format!("executor for step #{}", index + 1))
    })?;

    let mut errors = Vec::new();
    let mut name = None;
    for entry in node.entries() {
        match entry.name().map(|n| n.value()) {
            None => {}
            Some("name") => match entry.value().as_string() {
                Some(s) => name = Some(s.to_string()),
                None => errors.push(FieldError::new("name", "expected a string")),
            },
            Some(other) => errors.push(FieldError::new(other, "unknown step property")),
        }
    }
    if node.entries().iter().filter(|e| e.name().is_none()).count() > 1 {
        errors.push(FieldError::new("executor", "expected a single executor name"));
    }

    let mut assertions = Vec::new();
    let action = match executor.as_str() {
        PACK_EXECUTOR => StepAction::Pack(decode_build_options(node, &mut assertions, &mut errors)),
        RANDOM_IMAGE_NAME_EXECUTOR => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "assertions" => decode_assertions(child, &mut assertions, &mut errors),
                    other => errors.push(FieldError::new(other, "unknown field")),
                }
            }
            StepAction::RandomImageName
        }
        _ => return Err(ConfigError::UnknownExecutor(executor)),
    };

    if !errors.is_empty() {
        let step = name.unwrap_or_else(|| format!("#{} ({})", index + 1, executor));
        return Err(ConfigError::InvalidStep { step, errors });
    }

    Ok(Step {
        name,
        action,
        assertions,
    })
}

fn decode_build_options(
    node: &KdlNode,
    assertions: &mut Vec<Assertion>,
    errors: &mut Vec<FieldError>,
) -> BuildOptions {
    let mut opts = BuildOptions::default();
    let mut image_name = None;

    for child in child_nodes(node) {
        let field = child.name().value();
        match field {
            "image-name" => set_once(&mut image_name, child, errors),
            "builder" => set_once(&mut opts.builder, child, errors),
            "network" => set_once(&mut opts.network, child, errors),
            "pack-binary" => set_once(&mut opts.pack_binary, child, errors),
            "path" => set_once(&mut opts.path, child, errors),
            "pull-policy" => set_once(&mut opts.pull_policy, child, errors),
            "sbom-output-dir" => set_once(&mut opts.sbom_output_dir, child, errors),
            "buildpacks" => opts.buildpacks.extend(get_string_list(child, errors)),
            "extra-args" => opts.extra_args.extend(get_string_list(child, errors)),
            "volumes" => opts.volumes.extend(get_string_list(child, errors)),
            "clear-cache" => opts.clear_cache = get_flag(child, errors),
            "no-color" => opts.no_color = get_flag(child, errors),
            "no-pull" => opts.no_pull = get_flag(child, errors),
            "trust-builder" => opts.trust_builder = get_flag(child, errors),
            "verbose" => opts.verbose = get_flag(child, errors),
            "gid" => {
                if opts.gid.is_some() {
                    errors.push(FieldError::new(field, "defined more than once"));
                } else {
                    opts.gid = get_gid(child, errors);
                }
            }
            "env" => decode_env(child, &mut opts, errors),
            "assertions" => decode_assertions(child, assertions, errors),
            other => errors.push(FieldError::new(other, "unknown field")),
        }
    }

    match image_name {
        Some(name) if !name.is_empty() => opts.image_name = name,
        _ => errors.push(FieldError::new("image-name", "image-name must be defined")),
    }

    opts
}

fn decode_env(node: &KdlNode, opts: &mut BuildOptions, errors: &mut Vec<FieldError>) {
    // Properties (`env FOO="bar"`) and children (`env { FOO "bar" }`) are both accepted.
    for entry in node.entries() {
        match entry.name() {
            Some(key) => match entry.value().as_string() {
                Some(value) => {
                    opts.env.insert(key.value().to_string(), value.to_string());
                }
                None => errors.push(FieldError::new(
                    format!("env.{}", key.value()),
                    "expected a string",
                )),
            },
            None => errors.push(FieldError::new("env", "expected NAME=\"value\" entries")),
        }
    }

    for child in child_nodes(node) {
        let key = child.name().value();
        match single_arg(child).and_then(|v| v.as_string()) {
            Some(value) => {
                opts.env.insert(key.to_string(), value.to_string());
            }
            None => errors.push(FieldError::new(format!("env.{}", key), "expected a string")),
        }
    }
}

fn decode_assertions(
    node: &KdlNode,
    assertions: &mut Vec<Assertion>,
    errors: &mut Vec<FieldError>,
) {
    assertions.extend(get_string_list(node, errors).into_iter().map(Assertion::new));
}

// Helper functions for extracting values from KDL nodes

fn child_nodes(node: &KdlNode) -> &[KdlNode] {
    node.children().map(|c| c.nodes()).unwrap_or(&[])
}

fn positional_args(node: &KdlNode) -> impl Iterator<Item = &KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    positional_args(node)
        .next()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// The only positional argument of a node that has no properties or children.
fn single_arg(node: &KdlNode) -> Option<&KdlValue> {
    if node.children().is_some() || node.entries().len() != 1 {
        return None;
    }
    positional_args(node).next().map(|e| e.value())
}

fn set_once(slot: &mut Option<String>, node: &KdlNode, errors: &mut Vec<FieldError>) {
    let field = node.name().value();
    if slot.is_some() {
        errors.push(FieldError::new(field, "defined more than once"));
        return;
    }
    match single_arg(node).and_then(|v| v.as_string()) {
        Some(s) => *slot = Some(s.to_string()),
        None => errors.push(FieldError::new(field, "expected a single string value")),
    }
}

fn get_string_list(node: &KdlNode, errors: &mut Vec<FieldError>) -> Vec<String> {
    let field = node.name().value();
    if node.children().is_some() || node.entries().iter().any(|e| e.name().is_some()) {
        errors.push(FieldError::new(field, "expected a list of string values"));
        return Vec::new();
    }

    let mut values = Vec::new();
    for entry in positional_args(node) {
        match entry.value().as_string() {
            Some(s) => values.push(s.to_string()),
            None => errors.push(FieldError::new(
                field,
                format!("expected a string, found {}", entry.value()),
            )),
        }
    }
    if node.entries().is_empty() {
        errors.push(FieldError::new(field, "expected at least one value"));
    }
    values
}

/// A bare flag node means `true`; otherwise a single boolean argument.
fn get_flag(node: &KdlNode, errors: &mut Vec<FieldError>) -> bool {
    if node.entries().is_empty() && node.children().is_none() {
        return true;
    }
    match single_arg(node).and_then(|v| v.as_bool()) {
        Some(b) => b,
        None => {
            errors.push(FieldError::new(node.name().value(), "expected a boolean"));
            false
        }
    }
}

fn get_gid(node: &KdlNode, errors: &mut Vec<FieldError>) -> Option<u32> {
    let field = node.name().value();
    match single_arg(node).and_then(|v| v.as_integer()) {
        Some(n) => match u32::try_from(n) {
            Ok(gid) => Some(gid),
            Err(_) => {
                errors.push(FieldError::new(field, format!("{} is out of range", n)));
                None
            }
        },
        None => {
            errors.push(FieldError::new(field, "expected an integer"));
            None
        }
    }
}
