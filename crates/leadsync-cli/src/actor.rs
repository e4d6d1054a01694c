//! Acting-role resolution for status changes.
//!
//! The resolution chain: `--role` flag > `LEADSYNC_ROLE` env > `role` in the
//! user config. The first source that is set wins; an unparseable value is
//! an error rather than a fall-through.

use leadsync_core::error::ErrorCode;
use leadsync_core::status::Role;
use std::env;

/// Errors from role resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleResolutionError {
    pub message: String,
    pub code: ErrorCode,
}

impl std::fmt::Display for RoleResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RoleResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn parse_from(source: &str, raw: &str) -> Result<Role, RoleResolutionError> {
    raw.parse::<Role>().map_err(|e| RoleResolutionError {
        message: format!("{e} (from {source})"),
        code: ErrorCode::InvalidRole,
    })
}

fn resolve_role_with(
    cli_flag: Option<&str>,
    user_default: Option<&str>,
    env: &dyn EnvReader,
) -> Result<Role, RoleResolutionError> {
    if let Some(raw) = cli_flag.filter(|r| !r.trim().is_empty()) {
        return parse_from("--role", raw);
    }

    if let Some(raw) = env.get("LEADSYNC_ROLE") {
        return parse_from("LEADSYNC_ROLE", &raw);
    }

    if let Some(raw) = user_default.filter(|r| !r.trim().is_empty()) {
        return parse_from("user config", raw);
    }

    Err(RoleResolutionError {
        message: "a role is required to change lead status".to_string(),
        code: ErrorCode::InvalidRole,
    })
}

/// Resolve the acting role, or explain why none could be found.
pub fn require_role(
    cli_flag: Option<&str>,
    user_default: Option<&str>,
) -> Result<Role, RoleResolutionError> {
    resolve_role_with(cli_flag, user_default, &RealEnv)
}
