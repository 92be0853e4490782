//! `invsync` command-line front end: argument parsing, environment
//! configuration, subcommand dispatch and report rendering.

pub mod cli;
pub mod commands;
pub mod config;
pub mod output;

pub use cli::{Cli, Command, OutputFormat};
pub use commands::{Session, connect, run};
pub use config::{Config, ConfigError};
