//! Field validator: presence checks against a command descriptor.
//!
//! Runs before the request builder. Values are inspected, never rewritten.

use thiserror::Error;

use super::args::BoundArguments;
use super::catalog::CommandDescriptor;

/// Bad command-line (or batch entry) input, caught before any network activity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing required field: --{0}")]
    MissingRequiredField(&'static str),

    #[error("unknown parameter '{name}' for '{command}'")]
    UnknownParameter { command: String, name: String },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("parameter '{name}' cannot take a {shape} value")]
    UnsupportedValue { name: String, shape: &'static str },
}

/// Fails on the first undeclared name, then on the first required field that
/// is absent or empty (descriptor order).
pub fn validate(descriptor: &CommandDescriptor, args: &BoundArguments) -> Result<(), UsageError> {
    if let Some(name) = args.names().find(|n| descriptor.param(n).is_none()) {
        return Err(UsageError::UnknownParameter {
            command: descriptor.path(),
            name: name.to_string(),
        });
    }

    for p in descriptor.params.iter().filter(|p| p.required) {
        if args.get(p.name).is_none_or(str::is_empty) {
            return Err(UsageError::MissingRequiredField(p.name));
        }
    }
    Ok(())
}
