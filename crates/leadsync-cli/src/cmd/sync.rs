//! `leadsync sync`: run one reconciliation pass over the stored snapshot.

use super::{load_config, open_store};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render, render_error};
use chrono::{Local, Utc};
use clap::Args;
use leadsync_core::error::ErrorCode;
use leadsync_core::reconcile::{self, SyncResponse, SyncSummary};
use leadsync_core::throttle::{ThreadPacer, ThrottlePolicy};
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Skip the pauses between write groups.
    #[arg(long)]
    pub no_throttle: bool,
}

fn write_summary(summary: &SyncSummary, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Reconciliation")?;
    pretty_kv(w, "Total", summary.total.to_string())?;
    pretty_kv(w, "Processed", summary.processed.to_string())?;
    pretty_kv(w, "Created", summary.created.to_string())?;
    pretty_kv(w, "Updated", summary.updated.to_string())?;
    pretty_kv(w, "Errors", summary.errors.to_string())?;
    pretty_kv(w, "Skipped", summary.skipped.total().to_string())?;
    for failure in &summary.failures {
        writeln!(
            w,
            "  ! {} {} ({}): {}",
            failure.operation, failure.phone, failure.appointment_id, failure.message
        )?;
    }
    if summary.errors > summary.failures.len() {
        writeln!(
            w,
            "  ... {} more failure(s) not shown",
            summary.errors - summary.failures.len()
        )?;
    }
    Ok(())
}

pub fn run_sync(args: &SyncArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let cfg = load_config(project_root, output)?;
    let store = open_store(project_root, output)?;

    let mut options = cfg.sync.options();
    if args.no_throttle {
        options.throttle = ThrottlePolicy::unthrottled();
    }

    match store.last_sync_run() {
        Ok(Some(at)) => tracing::info!(previous = %at.to_rfc3339(), "previous sync run"),
        Ok(None) => tracing::info!("first sync run for this store"),
        Err(e) => tracing::warn!(error = %e, "could not read last sync time"),
    }

    let result = reconcile::run(&store, &ThreadPacer, &options, Local::now().date_naive());
    let response = SyncResponse::from_result(&result);

    match result {
        Ok(summary) => {
            if let Err(e) = store.record_sync_run(Utc::now()) {
                tracing::warn!(error = %e, "could not record sync time");
            }
            if output.is_json() {
                render(output, &response, |_, _| Ok(()))
            } else {
                render(output, &summary, write_summary)
            }
        }
        Err(err) => {
            if output.is_json() {
                render(output, &response, |_, _| Ok(()))?;
            }
            render_error(
                output,
                &CliError::coded(ErrorCode::from(&err), err.to_string()),
            )?;
            Err(err.into())
        }
    }
}
