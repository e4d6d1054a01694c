use crate::dedup::CollapseMode;
use crate::reconcile::SyncOptions;
use crate::throttle::ThrottlePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding project state, relative to the project root.
pub const PROJECT_DIR: &str = ".leadsync";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_closed_marker")]
    pub closed_marker: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_max_error_details")]
    pub max_error_details: usize,
    #[serde(default)]
    pub throttle: ThrottleConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            closed_marker: default_closed_marker(),
            origin: default_origin(),
            max_error_details: default_max_error_details(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Engine options for a run started from this config.
    #[must_use]
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            closed_marker: self.closed_marker.clone(),
            origin: self.origin.clone(),
            max_error_details: self.max_error_details,
            throttle: self.throttle.policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_group_pause_ms")]
    pub group_pause_ms: u64,
    #[serde(default = "default_milestone_size")]
    pub milestone_size: usize,
    #[serde(default = "default_milestone_pause_ms")]
    pub milestone_pause_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            group_pause_ms: default_group_pause_ms(),
            milestone_size: default_milestone_size(),
            milestone_pause_ms: default_milestone_pause_ms(),
        }
    }
}

impl ThrottleConfig {
    #[must_use]
    pub const fn policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            group_size: self.group_size,
            group_pause: Duration::from_millis(self.group_pause_ms),
            milestone_size: self.milestone_size,
            milestone_pause: Duration::from_millis(self.milestone_pause_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub mode: CollapseMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Default acting role for status changes.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// Path of the SQLite store under `project_root`.
#[must_use]
pub fn store_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join("leadsync.db")
}

/// Path of the project config under `project_root`.
#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join("config.toml")
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir.join("leadsync/config.toml"))
}

/// Load a user config from an explicit path; missing files yield defaults.
pub fn load_user_config_from(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Render the default project config as TOML, for `leadsync init`.
pub fn default_project_config_toml() -> Result<String> {
    toml::to_string_pretty(&ProjectConfig::default()).context("Failed to render default config")
}

fn default_closed_marker() -> String {
    "FECHADO".to_string()
}

fn default_origin() -> String {
    "schedule-sync".to_string()
}

const fn default_max_error_details() -> usize {
    20
}

const fn default_group_size() -> usize {
    10
}

const fn default_group_pause_ms() -> u64 {
    500
}

const fn default_milestone_size() -> usize {
    100
}

const fn default_milestone_pause_ms() -> u64 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.sync.closed_marker, "FECHADO");
        assert_eq!(cfg.sync.origin, "schedule-sync");
        assert_eq!(cfg.sync.max_error_details, 20);
        assert_eq!(cfg.sync.throttle.group_size, 10);
        assert_eq!(cfg.sync.throttle.milestone_pause_ms, 3000);
        assert_eq!(cfg.dedup.mode, CollapseMode::Hard);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(PROJECT_DIR)).expect("mkdir");
        std::fs::write(
            project_config_path(root.path()),
            "[sync]\nclosed_marker = \"CLOSED\"\n\n[sync.throttle]\ngroup_size = 5\n\n[dedup]\nmode = \"tombstone\"\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load");
        assert_eq!(cfg.sync.closed_marker, "CLOSED");
        assert_eq!(cfg.sync.origin, "schedule-sync");
        assert_eq!(cfg.sync.throttle.group_size, 5);
        assert_eq!(cfg.sync.throttle.group_pause_ms, 500);
        assert_eq!(cfg.dedup.mode, CollapseMode::Tombstone);
    }

    #[test]
    fn malformed_config_names_the_file() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(PROJECT_DIR)).expect("mkdir");
        std::fs::write(project_config_path(root.path()), "[sync\n").expect("write");

        let err = load_project_config(root.path()).expect_err("must fail");
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn default_config_round_trips() {
        let rendered = default_project_config_toml().expect("render");
        let parsed: ProjectConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed.sync.throttle.milestone_size, 100);
        assert_eq!(parsed.dedup.mode, CollapseMode::Hard);
    }

    #[test]
    fn user_config_reads_role_and_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "role = \"receptionist\"\noutput = \"json\"\n").expect("write");

        let cfg = load_user_config_from(&path).expect("load");
        assert_eq!(cfg.role.as_deref(), Some("receptionist"));
        assert_eq!(cfg.output.as_deref(), Some("json"));
    }

    #[test]
    fn throttle_config_becomes_policy() {
        let policy = ThrottleConfig::default().policy();
        assert_eq!(policy.group_pause, Duration::from_millis(500));
        assert_eq!(policy.milestone_size, 100);
    }
}
