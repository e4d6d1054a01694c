#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use leadsync_core::config::{self, UserConfig};
use output::OutputMode;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "leadsync: keep the sales funnel in step with the appointment book",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format. Overrides FORMAT and the user config.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a leadsync project",
        long_about = "Create .leadsync/ with a default config and an empty store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    leadsync init\n\n    # Rewrite the config of an existing project\n    leadsync init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Load appointments or leads from JSON",
        long_about = "Load a JSON array of appointments or leads into the store.",
        after_help = "EXAMPLES:\n    # Load the appointment book export\n    leadsync import --appointments agenda.json\n\n    # Load existing leads\n    leadsync import --leads leads.json"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Reconciliation",
        about = "Create or update leads from appointments",
        long_about = "Run one reconciliation pass: every qualifying appointment creates or updates the lead for its phone.",
        after_help = "EXAMPLES:\n    # Reconcile with the configured pacing\n    leadsync sync\n\n    # Reconcile without pauses and print the response object\n    leadsync sync --no-throttle --json"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        next_help_heading = "Reconciliation",
        about = "Find and collapse leads that share a phone",
        long_about = "Report groups of leads with the same normalized phone. With --apply, keep the oldest lead of each group and remove the rest.",
        after_help = "EXAMPLES:\n    # Report only\n    leadsync dedup\n\n    # Collapse without prompting, keeping tombstones\n    leadsync dedup --apply --yes --mode tombstone"
    )]
    Dedup(cmd::dedup::DedupArgs),

    #[command(
        next_help_heading = "Funnel",
        about = "Move a lead to another status",
        long_about = "Change a lead's funnel status, subject to the acting role's permissions."
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(
        next_help_heading = "Funnel",
        about = "List leads",
        after_help = "EXAMPLES:\n    # Leads in the renewal column\n    leadsync list --status renewal\n\n    # Everything for one phone, collapsed leads included\n    leadsync list --phone '(11) 99999-8888' --all --json"
    )]
    List(cmd::list::ListArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEADSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "leadsync=debug,leadsync_core=debug,info"
        } else {
            "leadsync=info,leadsync_core=info,warn"
        })
    });

    let format = env::var("LEADSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn user_config() -> UserConfig {
    config::load_user_config().unwrap_or_else(|e| {
        warn!(error = %format!("{e:#}"), "ignoring unreadable user config");
        UserConfig::default()
    })
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let user = user_config();
    let output = output::resolve_output_mode(cli.format, cli.json, user.output.as_deref());
    let project_root = env::current_dir()?;

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Import(ref args) => cmd::import::run_import(args, output, &project_root),
        Commands::Sync(ref args) => cmd::sync::run_sync(args, output, &project_root),
        Commands::Dedup(ref args) => cmd::dedup::run_dedup(args, output, &project_root),
        Commands::Move(ref args) => {
            cmd::move_cmd::run_move(args, user.role.as_deref(), output, &project_root)
        }
        Commands::List(ref args) => cmd::list::run_list(args, output, &project_root),
    }
}
