//! Command-line surface of `invsync`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use invsync_observability::LogFormat;

/// Bulk-load, unload and export an inventory server's catalogue from JSON
/// files on disk.
#[derive(Debug, Parser)]
#[command(name = "invsync")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data root holding `companies/` and `parts/` [default: $INVSYNC_DATA_ROOT or ./data]
    #[arg(long, global = true)]
    pub data_root: Option<PathBuf>,

    /// Bound on the whole run, in seconds; records not started by then are skipped
    #[arg(long, global = true, value_name = "SECS")]
    pub run_timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format (logs go to stderr)
    #[arg(long, default_value = "text", global = true, value_parser = parse_log_format)]
    pub log_format: LogFormat,

    /// Report format on stdout
    #[arg(short, long, default_value = "text", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse().map_err(|e: invsync_observability::ParseLogFormatError| e.to_string())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create records on the server, dependencies first
    Load(LoadArgs),
    /// Delete records from the server, dependents first
    Unload(UnloadArgs),
    /// Print the load order without contacting the server
    Plan(PlanArgs),
    /// Write the server's catalogue into the data root, or compare the two
    Export(ExportArgs),
}

impl Command {
    pub fn dry_run(&self) -> bool {
        match self {
            Command::Load(args) => args.dry_run,
            Command::Unload(args) => args.dry_run,
            Command::Plan(_) | Command::Export(_) => false,
        }
    }

    /// Whether the command talks to the server at all.
    pub fn needs_remote(&self) -> bool {
        !matches!(self, Command::Plan(_))
    }
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Glob patterns relative to the data root; everything when omitted
    pub patterns: Vec<String>,

    /// Overwrite records that already exist remotely
    #[arg(long)]
    pub force: bool,

    /// Use the (truncated) part name as IPN for parts without one
    #[arg(long)]
    pub force_ipn: bool,

    /// Replace supplier price breaks: update listed quantities, delete the rest
    #[arg(long)]
    pub force_price: bool,

    /// Worker threads per dependency level
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub workers: u16,

    /// Report what would be created without changing the server
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct UnloadArgs {
    /// Glob patterns relative to the data root
    #[arg(required = true)]
    pub patterns: Vec<String>,

    /// Remove the local JSON files of deleted records
    #[arg(long)]
    pub remove_json: bool,

    /// Report what would be deleted without changing the server
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Glob patterns relative to the data root; everything when omitted
    pub patterns: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Directory to write into [default: the data root]
    #[arg(long)]
    pub into: Option<PathBuf>,

    /// Compare the data root with the server instead of writing anything
    #[arg(long, visible_alias = "dry-diff", conflicts_with = "into")]
    pub diff: bool,
}
