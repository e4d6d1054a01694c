//! `leadsync list`: list leads.

use super::{fail, open_store};
use crate::output::{CliError, OutputMode, Renderable, render_list};
use clap::Args;
use leadsync_core::error::ErrorCode;
use leadsync_core::identity;
use leadsync_core::model::{Lead, LeadStatus};
use leadsync_core::store::{EntityStore, LeadFilter, LeadSort};
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status: lead, avulso, therapeuticPlan, renewal.
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by phone (any formatting).
    #[arg(long)]
    pub phone: Option<String>,

    /// Include leads collapsed into another lead.
    #[arg(long)]
    pub all: bool,

    /// Newest first.
    #[arg(long)]
    pub newest: bool,

    /// Maximum leads to show.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

struct LeadLine<'a>(&'a Lead);

impl Renderable for LeadLine<'_> {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let lead = self.0;
        let marker = if lead.is_live() { " " } else { "x" };
        writeln!(
            w,
            "{marker} {:<10} {:<16} {:<15} {}",
            lead.id, lead.status, lead.phone, lead.name
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self.0)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let lead = self.0;
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            lead.id,
            lead.status,
            identity::normalize(&lead.phone),
            lead.name,
            lead.created_at.to_rfc3339()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "status", "phone", "name", "created_at"]
    }
}

impl ListArgs {
    fn filter(&self, status: Option<LeadStatus>) -> LeadFilter {
        LeadFilter {
            phone_digits: self.phone.as_deref().map(identity::normalize),
            status,
            include_tombstoned: self.all,
            sort: if self.newest {
                LeadSort::CreatedDesc
            } else {
                LeadSort::CreatedAsc
            },
            limit: Some(self.limit),
            ..LeadFilter::default()
        }
    }
}

pub fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let status = match args.status.as_deref().map(str::parse::<LeadStatus>).transpose() {
        Ok(status) => status,
        Err(e) => return fail(output, &CliError::coded(ErrorCode::InvalidStatus, e.to_string())),
    };

    let store = open_store(project_root, output)?;
    let leads = store.filter_leads(&args.filter(status))?;
    let lines: Vec<LeadLine<'_>> = leads.iter().map(LeadLine).collect();
    render_list(&lines, output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ListArgs,
    }

    #[test]
    fn list_args_defaults() {
        let w = Wrapper::parse_from(["test"]);
        assert!(w.args.status.is_none());
        assert!(!w.args.all);
        assert_eq!(w.args.limit, 50);
    }

    #[test]
    fn filter_normalizes_phone() {
        let w = Wrapper::parse_from(["test", "--phone", "(11) 99999-8888", "--all", "--newest"]);
        let filter = w.args.filter(None);
        assert_eq!(filter.phone_digits.as_deref(), Some("11999998888"));
        assert!(filter.include_tombstoned);
        assert_eq!(filter.sort, LeadSort::CreatedDesc);
    }
}
