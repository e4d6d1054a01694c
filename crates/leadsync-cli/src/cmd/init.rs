//! `leadsync init`: create the project directory, config and store.

use crate::output::{OutputMode, pretty_kv, render};
use anyhow::{Context as _, Result};
use clap::Args;
use leadsync_core::config::{self, PROJECT_DIR};
use leadsync_core::store::sqlite::SqliteStore;
use serde::Serialize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config even if `.leadsync/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "leadsync.db\nleadsync.db-wal\nleadsync.db-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    ok: bool,
    config: String,
    store: String,
}

/// Execute `leadsync init`. Creates:
///
/// ```text
/// .leadsync/
///   config.toml    (defaults, every key spelled out)
///   leadsync.db    (migrated SQLite store)
///   .gitignore
/// ```
///
/// # Errors
///
/// Returns an error if `.leadsync/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let dir = project_root.join(PROJECT_DIR);

    if dir.exists() && !args.force {
        anyhow::bail!("{PROJECT_DIR}/ already exists. Use `leadsync init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = config::project_config_path(project_root);
    std::fs::write(&config_path, config::default_project_config_toml()?)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let store_path = config::store_path(project_root);
    SqliteStore::open(&store_path)?;
    tracing::info!(path = %store_path.display(), "store initialized");

    let report = InitReport {
        ok: true,
        config: config_path.display().to_string(),
        store: store_path.display().to_string(),
    };
    render(output, &report, |r, w| {
        writeln!(w, "✓ Initialized {PROJECT_DIR}/")?;
        pretty_kv(w, "Config", &r.config)?;
        pretty_kv(w, "Store", &r.store)?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  leadsync import --appointments appointments.json")?;
        writeln!(w, "  leadsync sync")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_config_and_store() {
        let dir = TempDir::new().unwrap();
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).unwrap();

        assert!(config::project_config_path(dir.path()).exists());
        assert!(config::store_path(dir.path()).exists());
        let cfg = config::load_project_config(dir.path()).unwrap();
        assert_eq!(cfg.sync.closed_marker, "FECHADO");
    }

    #[test]
    fn refuses_to_reinitialize_without_force() {
        let dir = TempDir::new().unwrap();
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).unwrap();
        let err = run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        run_init(&InitArgs { force: true }, OutputMode::Json, dir.path()).unwrap();
    }
}
