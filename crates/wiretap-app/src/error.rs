//! Framework-level run errors.

use thiserror::Error;

/// Errors produced by the dispatcher itself.
///
/// Hook and action errors are not represented here; they pass through
/// [`App::run`](crate::App::run) as opaque `anyhow` errors.
#[derive(Debug, Error)]
pub enum RunError {
    /// `run` was called with an empty argument vector (not even a program
    /// name).
    #[error("no arguments supplied")]
    EmptyArguments,

    /// A `-`-prefixed token appeared where a command name was expected.
    /// The framework does not parse flags; flag definitions exist for help
    /// rendering only.
    #[error("flag provided where a command was expected: {0}")]
    UnexpectedFlag(String),

    /// No command with the given name exists and no command-not-found hook
    /// is installed.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// The resolved command's action slot holds a non-callable extension
    /// payload.
    #[error("action slot holds a non-callable extension value: {0}")]
    ExtensionAction(&'static str),
}
