//! `leadsync dedup`: report and collapse leads sharing a phone identity.

use super::{fail, load_config, open_store};
use crate::output::{CliError, OutputMode, pretty_rule, pretty_section, render};
use chrono::Utc;
use clap::Args;
use leadsync_core::dedup::{CollapseMode, CollapseSummary, DuplicateReport, collapse, find_duplicates};
use leadsync_core::error::ErrorCode;
use leadsync_core::store::EntityStore;
use serde::Serialize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

#[derive(Args, Debug)]
#[command(
    after_help = "EXAMPLES:\n    # Show duplicate groups\n    leadsync dedup\n\n\
                  # Collapse them, keeping the oldest lead per phone\n    leadsync dedup --apply --yes\n\n\
                  # Keep the collapsed records as tombstones\n    leadsync dedup --apply --yes --mode tombstone"
)]
pub struct DedupArgs {
    /// Collapse the duplicates instead of only reporting them.
    #[arg(long)]
    pub apply: bool,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// How duplicates are removed. Defaults to `[dedup] mode` from the config.
    #[arg(long)]
    pub mode: Option<CollapseMode>,
}

#[derive(Debug, Serialize)]
struct DedupOutput<'a> {
    groups: usize,
    duplicates: usize,
    report: &'a DuplicateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    collapsed: Option<&'a CollapseSummary>,
}

fn write_report(report: &DuplicateReport, w: &mut dyn Write) -> io::Result<()> {
    if report.is_empty() {
        return writeln!(w, "No duplicate leads.");
    }
    pretty_section(
        w,
        &format!(
            "{} phone(s) with duplicates, {} lead(s) to collapse",
            report.groups.len(),
            report.count()
        ),
    )?;
    for group in &report.groups {
        writeln!(
            w,
            "{}  keep {} ({})",
            group.phone, group.survivor.id, group.survivor.name
        )?;
        for dup in &group.duplicates {
            writeln!(w, "    drop {} ({})", dup.id, dup.name)?;
        }
    }
    pretty_rule(w)
}

fn confirm(count: usize) -> io::Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }
    eprint!("Collapse {count} duplicate lead(s)? [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

pub fn run_dedup(args: &DedupArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let cfg = load_config(project_root, output)?;
    let store = open_store(project_root, output)?;
    let report = find_duplicates(&store.list_leads()?);

    let collapsed = if args.apply && !report.is_empty() {
        if !args.yes && !confirm(report.count())? {
            return fail(
                output,
                &CliError::coded(
                    ErrorCode::ConfirmationRequired,
                    format!("refusing to collapse {} lead(s) without confirmation", report.count()),
                ),
            );
        }
        let mode = args.mode.unwrap_or(cfg.dedup.mode);
        Some(collapse(&store, &report, mode, Utc::now()))
    } else {
        None
    };

    let out = DedupOutput {
        groups: report.groups.len(),
        duplicates: report.count(),
        report: &report,
        collapsed: collapsed.as_ref(),
    };
    render(output, &out, |o, w| {
        write_report(o.report, w)?;
        if let Some(summary) = o.collapsed {
            writeln!(w, "✓ Collapsed {} lead(s)", summary.removed)?;
            for failure in &summary.failed {
                writeln!(w, "  ! {}: {}", failure.id, failure.message)?;
            }
        }
        Ok(())
    })?;

    if let Some(summary) = collapsed.filter(|s| !s.failed.is_empty()) {
        return fail(
            output,
            &CliError::coded(
                ErrorCode::RecordWriteFailed,
                format!("{} duplicate(s) could not be collapsed", summary.failed.len()),
            ),
        );
    }
    Ok(())
}
