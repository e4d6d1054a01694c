pub mod dedup;
pub mod import;
pub mod init;
pub mod list;
pub mod move_cmd;
pub mod sync;

use crate::output::{CliError, OutputMode, render_error};
use leadsync_core::config::{self, PROJECT_DIR, ProjectConfig};
use leadsync_core::error::ErrorCode;
use leadsync_core::store::sqlite::SqliteStore;
use std::path::Path;

/// Render `error` and fail the command with its message.
pub fn fail<T>(output: OutputMode, error: &CliError) -> anyhow::Result<T> {
    render_error(output, error)?;
    Err(anyhow::anyhow!("{}", error.message))
}

/// Open the project's store, or explain that the project is missing.
pub fn open_store(project_root: &Path, output: OutputMode) -> anyhow::Result<SqliteStore> {
    if !project_root.join(PROJECT_DIR).is_dir() {
        return fail(
            output,
            &CliError::coded(
                ErrorCode::NotInitialized,
                format!("no {PROJECT_DIR}/ directory in {}", project_root.display()),
            ),
        );
    }
    match SqliteStore::open(&config::store_path(project_root)) {
        Ok(store) => Ok(store),
        Err(e) => fail(
            output,
            &CliError::coded(ErrorCode::StoreUnavailable, format!("{e:#}")),
        ),
    }
}

/// Load `.leadsync/config.toml`, rendering parse failures with their code.
pub fn load_config(project_root: &Path, output: OutputMode) -> anyhow::Result<ProjectConfig> {
    match config::load_project_config(project_root) {
        Ok(cfg) => Ok(cfg),
        Err(e) => fail(
            output,
            &CliError::coded(ErrorCode::ConfigParseError, format!("{e:#}")),
        ),
    }
}
