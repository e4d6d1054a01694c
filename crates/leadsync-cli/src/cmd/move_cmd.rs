//! `leadsync move`: move a lead to another funnel status.

use super::{fail, open_store};
use crate::actor;
use crate::output::{CliError, OutputMode, render};
use clap::Args;
use leadsync_core::error::ErrorCode;
use leadsync_core::model::{LeadId, LeadPatch, LeadStatus};
use leadsync_core::status::{TransitionOutcome, apply_status_change};
use serde_json::json;
use std::path::Path;

#[derive(Args, Debug)]
#[command(
    after_help = "EXAMPLES:\n    # Move a lead forward as a salesperson\n    leadsync move ld-000001 avulso --role salesperson\n\n\
                  # Record the unit that closed the plan in the same write\n    leadsync move ld-000001 therapeuticPlan --unit-name Centro"
)]
pub struct MoveArgs {
    /// Lead ID.
    pub id: String,

    /// Target status: lead, avulso, therapeuticPlan, renewal.
    pub status: String,

    /// Acting role. Falls back to LEADSYNC_ROLE, then the user config.
    #[arg(long)]
    pub role: Option<String>,

    /// Unit written together with the status.
    #[arg(long)]
    pub unit_id: Option<String>,

    #[arg(long)]
    pub unit_name: Option<String>,

    /// Salesperson written together with the status.
    #[arg(long)]
    pub salesperson_id: Option<String>,

    #[arg(long)]
    pub salesperson_name: Option<String>,
}

impl MoveArgs {
    fn bundle(&self) -> LeadPatch {
        LeadPatch {
            unit_id: self.unit_id.clone(),
            unit_name: self.unit_name.clone(),
            salesperson_id: self.salesperson_id.clone(),
            salesperson_name: self.salesperson_name.clone(),
            ..LeadPatch::default()
        }
    }
}

pub fn run_move(
    args: &MoveArgs,
    user_role: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let role = match actor::require_role(args.role.as_deref(), user_role) {
        Ok(role) => role,
        Err(e) => return fail(output, &CliError::coded(e.code, e.message)),
    };

    let to = match args.status.parse::<LeadStatus>() {
        Ok(status) => status,
        Err(e) => return fail(output, &CliError::coded(ErrorCode::InvalidStatus, e.to_string())),
    };

    let store = open_store(project_root, output)?;
    let id = LeadId::new(args.id.trim());

    let change = match apply_status_change(&store, &id, to, role, args.bundle()) {
        Ok(change) => change,
        Err(e) => return fail(output, &CliError::coded(ErrorCode::from(&e), e.to_string())),
    };

    let outcome = match change.outcome {
        TransitionOutcome::Unchanged => "unchanged",
        TransitionOutcome::Progressed(_) => "progressed",
        TransitionOutcome::Regressed(_) => "regressed",
    };
    let val = json!({
        "ok": true,
        "id": change.lead.id,
        "from": change.previous,
        "to": change.lead.status,
        "outcome": outcome,
        "role": role,
    });

    render(output, &val, |_, w| {
        if change.outcome == TransitionOutcome::Unchanged {
            writeln!(w, "= {} already {}", change.lead.id, change.previous)
        } else {
            writeln!(
                w,
                "✓ {} {} → {} ({outcome} by {role})",
                change.lead.id, change.previous, change.lead.status
            )
        }
    })
}
