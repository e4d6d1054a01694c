use crate::reconcile::SyncError;
use crate::status::StatusChangeError;
use crate::store::StoreError;
use std::fmt;

/// Machine-readable error codes for scripts and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    InvalidRole,
    LeadNotFound,
    TransitionDenied,
    InvalidStatus,
    InvalidImportFile,
    CorruptStore,
    SnapshotFetchFailed,
    RecordWriteFailed,
    StoreUnavailable,
    ConfirmationRequired,
    InternalUnexpected,
}

impl ErrorCode {
    pub const ALL: [Self; 13] = [
        Self::NotInitialized,
        Self::ConfigParseError,
        Self::InvalidRole,
        Self::LeadNotFound,
        Self::TransitionDenied,
        Self::InvalidStatus,
        Self::InvalidImportFile,
        Self::CorruptStore,
        Self::SnapshotFetchFailed,
        Self::RecordWriteFailed,
        Self::StoreUnavailable,
        Self::ConfirmationRequired,
        Self::InternalUnexpected,
    ];

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidRole => "E1003",
            Self::LeadNotFound => "E2001",
            Self::TransitionDenied => "E2002",
            Self::InvalidStatus => "E2003",
            Self::InvalidImportFile => "E2004",
            Self::CorruptStore => "E3001",
            Self::SnapshotFetchFailed => "E4001",
            Self::RecordWriteFailed => "E5001",
            Self::StoreUnavailable => "E5002",
            Self::ConfirmationRequired => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidRole => "Unknown or missing role",
            Self::LeadNotFound => "Lead not found",
            Self::TransitionDenied => "Status transition denied",
            Self::InvalidStatus => "Invalid lead status",
            Self::InvalidImportFile => "Import file could not be read",
            Self::CorruptStore => "Corrupt store record",
            Self::SnapshotFetchFailed => "Could not load appointment or lead snapshot",
            Self::RecordWriteFailed => "Record write failed",
            Self::StoreUnavailable => "Store unavailable",
            Self::ConfirmationRequired => "Confirmation required",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `leadsync init` in this directory."),
            Self::ConfigParseError => Some("Fix syntax in .leadsync/config.toml and retry."),
            Self::InvalidRole => Some(
                "Pass --role, set LEADSYNC_ROLE, or set `role` in the user config \
                 (salesperson, receptionist, manager, admin).",
            ),
            Self::LeadNotFound => Some(
                "Run `leadsync list` to see live lead ids; collapsed leads only show with --all.",
            ),
            Self::TransitionDenied => Some(
                "Salespeople move lead -> avulso/therapeuticPlan and avulso -> therapeuticPlan; \
                 receptionists move avulso -> therapeuticPlan/renewal and therapeuticPlan -> renewal. \
                 Ask a manager otherwise.",
            ),
            Self::InvalidStatus => Some("Use one of: lead, avulso, therapeuticPlan, renewal."),
            Self::InvalidImportFile => Some("Provide a JSON array of records."),
            Self::CorruptStore => Some("Inspect the row named in the message or re-import."),
            Self::SnapshotFetchFailed => Some("Check the store is reachable and retry the sync."),
            Self::RecordWriteFailed => None,
            Self::StoreUnavailable => Some("Check disk space and write permissions."),
            Self::ConfirmationRequired => Some("Re-run with --yes to confirm."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<&StoreError> for ErrorCode {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::LeadNotFound,
            StoreError::Corrupt { .. } => Self::CorruptStore,
            StoreError::Sqlite(_) => Self::RecordWriteFailed,
            StoreError::Unavailable(_) => Self::StoreUnavailable,
        }
    }
}

impl From<&StatusChangeError> for ErrorCode {
    fn from(err: &StatusChangeError) -> Self {
        match err {
            StatusChangeError::NotFound(_) | StatusChangeError::Collapsed { .. } => {
                Self::LeadNotFound
            }
            StatusChangeError::Denied(_) => Self::TransitionDenied,
            StatusChangeError::Store(inner) => inner.into(),
        }
    }
}

impl From<&SyncError> for ErrorCode {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::Snapshot { .. } => Self::SnapshotFetchFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use crate::model::{LeadId, LeadStatus};
    use crate::status::{Role, StatusChangeError, TransitionDenied};
    use crate::store::StoreError;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ErrorCode::ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ErrorCode::ALL {
            let raw = code.code();
            assert_eq!(raw.len(), 5);
            assert!(raw.starts_with('E'));
            assert!(raw[1..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn denial_maps_to_e2002() {
        let err = StatusChangeError::Denied(TransitionDenied {
            role: Role::Salesperson,
            from: LeadStatus::TherapeuticPlan,
            to: LeadStatus::Renewal,
        });
        assert_eq!(ErrorCode::from(&err).code(), "E2002");
    }

    #[test]
    fn collapsed_lead_reads_as_not_found() {
        let err = StatusChangeError::Collapsed {
            id: LeadId::new("ld-2"),
            merged_into: LeadId::new("ld-1"),
        };
        assert_eq!(ErrorCode::from(&err).code(), "E2001");
    }

    #[test]
    fn denial_hint_names_every_receptionist_move() {
        let hint = ErrorCode::TransitionDenied.hint().unwrap_or_default();
        assert!(hint.contains("receptionists move avulso -> therapeuticPlan/renewal"));
        assert!(hint.contains("therapeuticPlan -> renewal"));
    }

    #[test]
    fn nested_store_errors_keep_their_code() {
        let err = StatusChangeError::Store(StoreError::lead_not_found(&LeadId::new("ld-1")));
        assert_eq!(ErrorCode::from(&err), ErrorCode::LeadNotFound);
        let err = StoreError::Unavailable("disk full".into());
        assert_eq!(ErrorCode::from(&err), ErrorCode::StoreUnavailable);
    }
}
