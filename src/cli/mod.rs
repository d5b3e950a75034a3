//! CLI module for routebook - command-line interface and subcommands.
//!
//! Serves the HTTP API, or drives the services directly from the shell.

pub mod commands;

pub use commands::Cli;
