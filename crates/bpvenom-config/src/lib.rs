//! KDL step definition parsing for buildpacks-venom.
//!
//! This crate decodes step files into statically-typed [`Step`] values,
//! reporting every invalid field of a step rather than stopping at the first.
//!
//! [`Step`]: bpvenom_core::Step

pub mod error;
pub mod steps;

pub use error::{ConfigError, ConfigResult, FieldError};
pub use steps::{load_steps, parse_steps};
