use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use invsync_cli::commands::{self, EXIT_STRUCTURAL, Session};
use invsync_cli::{Cli, Config};
use invsync_observability::{LogConfig, RunId};
use invsync_sync::RunContext;

fn main() -> ExitCode {
    let cli = Cli::parse();
    invsync_observability::init(&LogConfig::new(cli.log_format, cli.verbose));

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_STRUCTURAL as u8)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::from_env()?.with_overrides(&cli);
    let run_id = RunId::new();

    let cancel = Arc::new(AtomicBool::new(false));
    watch_ctrl_c(Arc::clone(&cancel));
    let mut ctx = RunContext::new().with_cancel_flag(cancel);
    if let Some(timeout) = config.run_timeout {
        ctx = ctx.with_timeout(timeout);
    }

    let remote = if cli.command.needs_remote() {
        Some(commands::connect(&config, cli.command.dry_run())?)
    } else {
        None
    };
    let session = Session {
        config: &config,
        remote: remote.as_deref(),
        ctx: &ctx,
        format: cli.output,
        run_id,
    };

    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    commands::run(&cli.command, &session, &mut stdout.lock(), &mut stderr.lock())
}

/// Sets `cancel` on the first Ctrl-C. Records already in flight finish;
/// the rest are reported as cancelled.
fn watch_ctrl_c(cancel: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!(error = %err, "cannot watch for Ctrl-C");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupted; finishing records in flight");
                    cancel.store(true, Ordering::SeqCst);
                }
            });
        });
    if let Err(err) = spawned {
        warn!(error = %err, "cannot watch for Ctrl-C");
    }
}
