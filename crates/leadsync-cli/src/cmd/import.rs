//! `leadsync import`: load appointment or lead JSON into the store.
//!
//! Both inputs are JSON arrays of camelCase records, the shape the
//! scheduling system and CRM export. Appointments are upserted by id; leads
//! are always created fresh (keeping `createdAt` when the file carries it).

use super::{fail, open_store};
use crate::output::{CliError, OutputMode, render};
use clap::Args;
use leadsync_core::error::ErrorCode;
use leadsync_core::model::{Appointment, NewLead};
use leadsync_core::store::EntityStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["appointments", "leads"])))]
pub struct ImportArgs {
    /// JSON array of appointments.
    #[arg(long, value_name = "FILE")]
    pub appointments: Option<PathBuf>,

    /// JSON array of leads.
    #[arg(long, value_name = "FILE")]
    pub leads: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct ImportReport {
    appointments: usize,
    leads: usize,
    failed: usize,
}

fn read_records<T: DeserializeOwned>(path: &Path, output: OutputMode) -> anyhow::Result<Vec<T>> {
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str::<Vec<T>>(&raw).map_err(anyhow::Error::from));
    match parsed {
        Ok(records) => Ok(records),
        Err(e) => fail(
            output,
            &CliError::coded(
                ErrorCode::InvalidImportFile,
                format!("{}: {e}", path.display()),
            ),
        ),
    }
}

pub fn run_import(args: &ImportArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root, output)?;
    let mut report = ImportReport::default();

    if let Some(ref path) = args.appointments {
        for appt in read_records::<Appointment>(path, output)? {
            match store.insert_appointment(&appt) {
                Ok(()) => report.appointments += 1,
                Err(e) => {
                    tracing::warn!(appointment = %appt.id, error = %e, "appointment import failed");
                    report.failed += 1;
                }
            }
        }
    }

    if let Some(ref path) = args.leads {
        for lead in read_records::<NewLead>(path, output)? {
            let phone = lead.phone.clone();
            match store.create_lead(lead) {
                Ok(_) => report.leads += 1,
                Err(e) => {
                    tracing::warn!(%phone, error = %e, "lead import failed");
                    report.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        appointments = report.appointments,
        leads = report.leads,
        failed = report.failed,
        "import finished"
    );

    render(output, &report, |r, w| {
        writeln!(
            w,
            "✓ Imported {} appointment(s), {} lead(s); {} failed",
            r.appointments, r.leads, r.failed
        )
    })?;

    if report.failed > 0 {
        anyhow::bail!("{} record(s) failed to import", report.failed);
    }
    Ok(())
}
