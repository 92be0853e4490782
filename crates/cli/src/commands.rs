//! Subcommand execution.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use invsync_core::{Classify, ErrorKind};
use invsync_observability::RunId;
use invsync_records::RecordStore;
use invsync_remote::{DryRun, HttpRemote, InMemoryRemote, RemoteApi};
use invsync_resolver::Resolver;
use invsync_sync::{
    Exporter, LoadOptions, Loader, RunContext, RunReport, SyncError, UnloadOptions, Unloader,
};

use crate::cli::{Command, ExportArgs, LoadArgs, OutputFormat, PlanArgs, UnloadArgs};
use crate::config::Config;
use crate::output::{self, RunSummary};

/// Every record succeeded.
pub const EXIT_OK: i32 = 0;
/// Some records failed, or were skipped for a dependency or cancellation.
pub const EXIT_RECORDS_FAILED: i32 = 1;
/// The data set or the configuration is unusable; nothing was changed.
pub const EXIT_STRUCTURAL: i32 = 2;

/// Exit code for a run that aborted before processing records.
pub fn abort_code(kind: ErrorKind) -> i32 {
    if kind.is_structural() || kind == ErrorKind::Unauthorized {
        EXIT_STRUCTURAL
    } else {
        EXIT_RECORDS_FAILED
    }
}

/// The server client for `config`. Dry runs wrap it so that nothing is
/// changed, and fall back to an empty in-memory server when no server is
/// configured.
pub fn connect(config: &Config, dry_run: bool) -> Result<Box<dyn RemoteApi>> {
    if !dry_run {
        let remote = HttpRemote::new(config.http()?)?;
        info!(url = remote.base_url(), "server configured");
        return Ok(Box::new(remote));
    }
    match config.http() {
        Ok(http) => Ok(Box::new(DryRun::new(HttpRemote::new(http)?))),
        Err(reason) => {
            warn!(%reason, "dry run against an empty in-memory server");
            Ok(Box::new(DryRun::new(InMemoryRemote::new())))
        }
    }
}

/// Everything a subcommand needs besides its own arguments.
pub struct Session<'a> {
    pub config: &'a Config,
    /// `None` for commands that never contact the server.
    pub remote: Option<&'a dyn RemoteApi>,
    pub ctx: &'a RunContext,
    pub format: OutputFormat,
    pub run_id: RunId,
}

impl<'a> Session<'a> {
    fn remote(&self) -> Result<&'a dyn RemoteApi> {
        self.remote.context("no server connection configured")
    }

    fn open_store(&self) -> Result<RecordStore, SyncError> {
        Ok(RecordStore::open(&self.config.data_root)?)
    }
}

/// Runs `command` and returns the process exit code. Reports go to `out`,
/// per-record failures and aborts to `err`.
pub fn run(
    command: &Command,
    session: &Session<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    info!(run_id = %session.run_id, data_root = %session.config.data_root.display(), "run started");
    match command {
        Command::Load(args) => load(args, session, out, err),
        Command::Unload(args) => unload(args, session, out, err),
        Command::Plan(args) => plan(args, session, out, err),
        Command::Export(args) => export(args, session, out, err),
    }
}

fn aborted(err: &mut dyn Write, e: &SyncError) -> Result<i32> {
    error!(kind = %e.kind(), error = %e, "run aborted");
    writeln!(err, "error: {}: {e}", e.kind())?;
    Ok(abort_code(e.kind()))
}

fn finish(
    session: &Session<'_>,
    dry_run: bool,
    started_at: chrono::DateTime<Utc>,
    result: Result<RunReport, SyncError>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let report = match result {
        Ok(report) => report,
        Err(e) => return aborted(err, &e),
    };
    let summary = RunSummary {
        run_id: session.run_id,
        started_at,
        finished_at: Utc::now(),
        dry_run,
        exit_code: report.exit_code(),
        counts: report.counts(),
        report: &report,
    };
    output::write_report(out, err, session.format, &summary)?;
    Ok(report.exit_code())
}

fn load(
    args: &LoadArgs,
    session: &Session<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let started_at = Utc::now();
    let remote = session.remote()?;
    let options = LoadOptions::default()
        .with_force(args.force)
        .with_force_ipn(args.force_ipn)
        .with_force_price(args.force_price)
        .with_workers(usize::from(args.workers));
    let result = session.open_store().and_then(|store| {
        Loader::new(&store, remote)
            .with_options(options)
            .run(&args.patterns, session.ctx)
    });
    finish(session, args.dry_run, started_at, result, out, err)
}

fn unload(
    args: &UnloadArgs,
    session: &Session<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let started_at = Utc::now();
    let remote = session.remote()?;
    // Files stay put when nothing is really deleted.
    let options = UnloadOptions::default().with_remove_json(args.remove_json && !args.dry_run);
    let result = session.open_store().and_then(|store| {
        Unloader::new(&store, remote)
            .with_options(options)
            .run(&args.patterns, session.ctx)
    });
    finish(session, args.dry_run, started_at, result, out, err)
}

fn plan(
    args: &PlanArgs,
    session: &Session<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let planned = session.open_store().and_then(|store| {
        let selection = store.select(&args.patterns)?;
        Ok(Resolver::new(&store).plan_local(&selection)?)
    });
    match planned {
        Ok(plan) => {
            output::write_plan(out, session.format, &plan)?;
            Ok(EXIT_OK)
        }
        Err(e) => aborted(err, &e),
    }
}

fn export(
    args: &ExportArgs,
    session: &Session<'_>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let remote = session.remote()?;
    if args.diff {
        let compared = session
            .open_store()
            .and_then(|store| Exporter::new(remote).diff(&store));
        return match compared {
            Ok(report) => {
                output::write_diff(out, session.format, session.run_id, &report)?;
                Ok(if report.is_clean() { EXIT_OK } else { EXIT_RECORDS_FAILED })
            }
            Err(e) => aborted(err, &e),
        };
    }
    let root = args.into.as_ref().unwrap_or(&session.config.data_root);
    match Exporter::new(remote).export(root) {
        Ok(report) => {
            output::write_export(out, session.format, session.run_id, &report)?;
            Ok(EXIT_OK)
        }
        Err(e) => aborted(err, &e),
    }
}
