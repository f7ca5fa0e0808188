//! Tooling & Integration Layer
//!
//! Command-line entry points for participants and the coordination service.

pub mod cli;

pub use cli::{describe_error, Cli, Commands, LogArgs, ServerCli};
