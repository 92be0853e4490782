//! Rendering of run reports for humans (text) and machines (JSON).

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use invsync_observability::RunId;
use invsync_resolver::{Plan, Target};
use invsync_sync::{DiffReport, Drift, ExportReport, RunReport};

use crate::cli::OutputFormat;

/// Envelope written with `--output json`.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub exit_code: i32,
    pub counts: BTreeMap<String, usize>,
    #[serde(flatten)]
    pub report: &'a RunReport,
}

pub fn write_report(
    out: &mut dyn Write,
    err: &mut dyn Write,
    format: OutputFormat,
    summary: &RunSummary<'_>,
) -> std::io::Result<()> {
    let report = summary.report;
    for failed in report.failures() {
        if let Some(failure) = failed.failure() {
            writeln!(
                err,
                "FAILED {} ({}){}: {}: {}",
                failed.path,
                failed.key,
                failed.remote_id.map(|id| format!(" #{id}")).unwrap_or_default(),
                failure.kind,
                failure.message
            )?;
        }
    }

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, summary)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for record in &report.records {
                let mut line = format!("{:<28} {:<40} {}", record.state.label(), record.key, record.path);
                if let Some(id) = record.remote_id {
                    line.push_str(&format!(" #{id}"));
                }
                let children = record.children;
                if !children.is_empty() {
                    line.push_str(&format!(
                        " (children: {} created, {} updated, {} found",
                        children.created, children.updated, children.found
                    ));
                    if children.removed > 0 {
                        line.push_str(&format!(", {} removed", children.removed));
                    }
                    line.push(')');
                }
                if !record.selected {
                    line.push_str(" [dependency]");
                }
                writeln!(out, "{line}")?;
            }
            let counts: Vec<String> = summary
                .counts
                .iter()
                .map(|(label, n)| format!("{n} {label}"))
                .collect();
            let dry = if summary.dry_run { " (dry run)" } else { "" };
            writeln!(
                out,
                "{:?}{dry}: {} record(s): {}",
                report.operation,
                report.records.len(),
                if counts.is_empty() { "nothing to do".to_string() } else { counts.join(", ") }
            )?;
        }
    }
    Ok(())
}

pub fn write_plan(out: &mut dyn Write, format: OutputFormat, plan: &Plan) -> std::io::Result<()> {
    match format {
        OutputFormat::Json => {
            let steps: Vec<serde_json::Value> = plan
                .steps()
                .iter()
                .enumerate()
                .map(|(position, step)| {
                    serde_json::json!({
                        "position": position,
                        "level": step.level,
                        "path": step.path,
                        "key": step.key.to_string(),
                        "selected": step.selected,
                        "depends_on": step.depends_on,
                        "outside": step
                            .links
                            .iter()
                            .filter(|l| !matches!(l.target, Target::Local(_)))
                            .map(|l| l.reference.to_string())
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();
            serde_json::to_writer_pretty(&mut *out, &steps)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for (position, step) in plan.steps().iter().enumerate() {
                let mut line = format!("{position:>4} L{:<2} {:<40} {}", step.level, step.key, step.path);
                if !step.depends_on.is_empty() {
                    let deps: Vec<String> = step.depends_on.iter().map(usize::to_string).collect();
                    line.push_str(&format!(" after {}", deps.join(",")));
                }
                writeln!(out, "{line}")?;
            }
            writeln!(
                out,
                "{} record(s) in {} level(s)",
                plan.len(),
                plan.levels().len()
            )?;
        }
    }
    Ok(())
}

pub fn write_export(
    out: &mut dyn Write,
    format: OutputFormat,
    run_id: RunId,
    report: &ExportReport,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Json => {
            let counts: BTreeMap<&str, usize> =
                report.counts.iter().map(|(k, n)| (k.as_str(), *n)).collect();
            serde_json::to_writer_pretty(
                &mut *out,
                &serde_json::json!({
                    "run_id": run_id,
                    "operation": "export",
                    "root": report.root,
                    "records": report.records(),
                    "files": report.files.len(),
                    "skipped": report.skipped,
                    "counts": counts,
                }),
            )?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for (kind, n) in &report.counts {
                writeln!(out, "{n:>6} {kind}")?;
            }
            writeln!(
                out,
                "Export: {} record(s) in {} file(s) under {}{}",
                report.records(),
                report.files.len(),
                report.root.display(),
                if report.skipped > 0 {
                    format!(", {} remote object(s) skipped", report.skipped)
                } else {
                    String::new()
                }
            )?;
        }
    }
    Ok(())
}

pub fn write_diff(
    out: &mut dyn Write,
    format: OutputFormat,
    run_id: RunId,
    report: &DiffReport,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &serde_json::json!({
                    "run_id": run_id,
                    "operation": "diff",
                    "clean": report.is_clean(),
                    "counts": report.counts(),
                    "skipped": report.skipped,
                    "records": report.entries,
                }),
            )?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for entry in report.drifted() {
                let mut line = format!("{:<12} {:<40}", entry.drift.label(), entry.key);
                if let Some(path) = &entry.path {
                    line.push_str(&format!(" {path}"));
                }
                if let Drift::Changed { fields } = &entry.drift {
                    line.push_str(&format!(" [{}]", fields.join(", ")));
                }
                writeln!(out, "{}", line.trim_end())?;
            }
            let counts: Vec<String> = report
                .counts()
                .iter()
                .map(|(label, n)| format!("{n} {label}"))
                .collect();
            writeln!(
                out,
                "Diff: {} record(s): {}",
                report.entries.len(),
                if counts.is_empty() { "nothing to compare".to_string() } else { counts.join(", ") }
            )?;
        }
    }
    Ok(())
}
