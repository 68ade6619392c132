//! CLI subcommands.

pub mod common;
pub mod config;
pub mod fetch;
pub mod watch;
