//! Role-gated funnel status transitions.
//!
//! # Rules
//!
//! - Same status: no-op.
//! - Regression (lower rank): always allowed, for every role.
//! - Progression (higher rank): allowed only when the target appears in
//!   the `(role, from)` row of the progression table.
//!
//! | role          | from              | may progress to                |
//! |---------------|-------------------|--------------------------------|
//! | salesperson   | `lead`            | `avulso`, `therapeuticPlan`    |
//! | salesperson   | `avulso`          | `therapeuticPlan`              |
//! | receptionist  | `avulso`          | `therapeuticPlan`, `renewal`   |
//! | receptionist  | `therapeuticPlan` | `renewal`                      |
//! | admin/manager | any               | any higher status              |
//!
//! There is no lock around read-check-write: two concurrent changes on the
//! same lead race and the later write wins.

use crate::model::LeadStatus::{Avulso, Lead as Fresh, Renewal, TherapeuticPlan};
use crate::model::{Lead, LeadId, LeadPatch, LeadStatus};
use crate::store::{EntityStore, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Who is asking for the status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Salesperson,
    Receptionist,
    Manager,
    Admin,
}

impl Role {
    pub const ALL: [Self; 4] = [
        Self::Salesperson,
        Self::Receptionist,
        Self::Manager,
        Self::Admin,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Salesperson => "salesperson",
            Self::Receptionist => "receptionist",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "salesperson" => Ok(Self::Salesperson),
            "receptionist" => Ok(Self::Receptionist),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

const ANY_HIGHER: [LeadStatus; 4] = LeadStatus::ALL;

/// Statuses `role` may progress to from `from`.
///
/// Admin and manager rows list every status; callers filter down to the
/// higher ranks, so the same lookup serves every role.
#[must_use]
pub const fn progression_targets(role: Role, from: LeadStatus) -> &'static [LeadStatus] {
    match (role, from) {
        (Role::Admin | Role::Manager, _) => &ANY_HIGHER,
        (Role::Salesperson, Fresh) => &[Avulso, TherapeuticPlan],
        (Role::Salesperson, Avulso) => &[TherapeuticPlan],
        (Role::Receptionist, Avulso) => &[TherapeuticPlan, Renewal],
        (Role::Receptionist, TherapeuticPlan) => &[Renewal],
        _ => &[],
    }
}

/// What a permitted transition does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "to")]
pub enum TransitionOutcome {
    /// Target equals the current status; nothing to write.
    Unchanged,
    Progressed(LeadStatus),
    Regressed(LeadStatus),
}

impl TransitionOutcome {
    /// Status after the transition, given the status before it.
    #[must_use]
    pub const fn resulting(self, from: LeadStatus) -> LeadStatus {
        match self {
            Self::Unchanged => from,
            Self::Progressed(to) | Self::Regressed(to) => to,
        }
    }
}

/// A progression the actor's role does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{role} may not move a lead from {from} to {to}")]
pub struct TransitionDenied {
    pub role: Role,
    pub from: LeadStatus,
    pub to: LeadStatus,
}

/// Decide whether `role` may move a lead from `from` to `to`.
///
/// # Errors
///
/// Returns [`TransitionDenied`] for a progression outside the role's row of
/// the progression table.
pub fn transition(
    from: LeadStatus,
    to: LeadStatus,
    role: Role,
) -> Result<TransitionOutcome, TransitionDenied> {
    if to == from {
        return Ok(TransitionOutcome::Unchanged);
    }
    if to < from {
        return Ok(TransitionOutcome::Regressed(to));
    }
    if progression_targets(role, from).contains(&to) {
        Ok(TransitionOutcome::Progressed(to))
    } else {
        Err(TransitionDenied { role, from, to })
    }
}

// ---------------------------------------------------------------------------
// Applying a change through the store
// ---------------------------------------------------------------------------

/// Failure applying a status change to a stored lead.
#[derive(Debug, thiserror::Error)]
pub enum StatusChangeError {
    #[error("lead {0} not found")]
    NotFound(LeadId),
    #[error("lead {id} was collapsed into {merged_into}")]
    Collapsed { id: LeadId, merged_into: LeadId },
    #[error(transparent)]
    Denied(#[from] TransitionDenied),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`apply_status_change`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub previous: LeadStatus,
    pub outcome: TransitionOutcome,
    pub lead: Lead,
}

/// Move a stored lead to `to` on behalf of `role`.
///
/// Fields in `bundle` (for example a unit or salesperson snapshot taken by
/// the UI) are written in the same update as the status. Any status in
/// `bundle` is overridden by `to`. An [`TransitionOutcome::Unchanged`]
/// outcome writes nothing, bundle included.
///
/// # Errors
///
/// Returns [`StatusChangeError::Denied`] without writing when the role may
/// not make the move, [`StatusChangeError::NotFound`] when the lead does not
/// exist, [`StatusChangeError::Collapsed`] when it is a tombstone, or the
/// store error when the read or write fails.
pub fn apply_status_change<S: EntityStore + ?Sized>(
    store: &S,
    lead_id: &LeadId,
    to: LeadStatus,
    role: Role,
    bundle: LeadPatch,
) -> Result<StatusChange, StatusChangeError> {
    let lead = store
        .get_lead(lead_id)?
        .ok_or_else(|| StatusChangeError::NotFound(lead_id.clone()))?;
    if let Some(ref tombstone) = lead.tombstone {
        warn!(lead = %lead_id, merged_into = %tombstone.merged_into, "status change on collapsed lead");
        return Err(StatusChangeError::Collapsed {
            id: lead_id.clone(),
            merged_into: tombstone.merged_into.clone(),
        });
    }
    let previous = lead.status;

    let outcome = match transition(previous, to, role) {
        Ok(outcome) => outcome,
        Err(denied) => {
            warn!(lead = %lead_id, %role, from = %previous, %to, "status transition denied");
            return Err(denied.into());
        }
    };

    if outcome == TransitionOutcome::Unchanged {
        debug!(lead = %lead_id, status = %previous, "status unchanged, skipping write");
        return Ok(StatusChange {
            previous,
            outcome,
            lead,
        });
    }

    let patch = LeadPatch {
        status: Some(to),
        ..bundle
    };
    let lead = store.update_lead(lead_id, &patch)?;
    info!(lead = %lead_id, %role, from = %previous, %to, "lead status changed");

    Ok(StatusChange {
        previous,
        outcome,
        lead,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewLead, Tombstone};
    use crate::store::memory::MemoryStore;

    #[test]
    fn same_status_is_noop_for_every_role() {
        for role in Role::ALL {
            for status in LeadStatus::ALL {
                assert_eq!(
                    transition(status, status, role),
                    Ok(TransitionOutcome::Unchanged)
                );
            }
        }
    }

    #[test]
    fn regression_always_allowed() {
        for role in Role::ALL {
            assert_eq!(
                transition(Renewal, Fresh, role),
                Ok(TransitionOutcome::Regressed(Fresh))
            );
            assert_eq!(
                transition(TherapeuticPlan, Avulso, role),
                Ok(TransitionOutcome::Regressed(Avulso))
            );
        }
    }

    #[test]
    fn salesperson_progressions() {
        let r = Role::Salesperson;
        assert!(transition(Fresh, Avulso, r).is_ok());
        assert!(transition(Fresh, TherapeuticPlan, r).is_ok());
        assert!(transition(Avulso, TherapeuticPlan, r).is_ok());
        assert_eq!(
            transition(Fresh, Renewal, r),
            Err(TransitionDenied {
                role: r,
                from: Fresh,
                to: Renewal
            })
        );
        assert!(transition(Avulso, Renewal, r).is_err());
        assert!(transition(TherapeuticPlan, Renewal, r).is_err());
    }

    #[test]
    fn receptionist_progressions() {
        let r = Role::Receptionist;
        assert!(transition(Avulso, TherapeuticPlan, r).is_ok());
        assert!(transition(Avulso, Renewal, r).is_ok());
        assert!(transition(TherapeuticPlan, Renewal, r).is_ok());
        assert!(transition(Fresh, Avulso, r).is_err());
        assert!(transition(Fresh, TherapeuticPlan, r).is_err());
        assert!(transition(Fresh, Renewal, r).is_err());
    }

    #[test]
    fn admin_and_manager_may_progress_anywhere() {
        for role in [Role::Admin, Role::Manager] {
            for from in LeadStatus::ALL {
                for to in LeadStatus::ALL.into_iter().filter(|to| *to > from) {
                    assert_eq!(
                        transition(from, to, role),
                        Ok(TransitionOutcome::Progressed(to))
                    );
                }
            }
        }
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Receptionist".parse::<Role>(), Ok(Role::Receptionist));
        assert_eq!(" admin ".parse::<Role>(), Ok(Role::Admin));
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn outcome_resulting_status() {
        assert_eq!(TransitionOutcome::Unchanged.resulting(Avulso), Avulso);
        assert_eq!(
            TransitionOutcome::Progressed(Renewal).resulting(Avulso),
            Renewal
        );
    }

    fn seeded(status: LeadStatus) -> (MemoryStore, LeadId) {
        let store = MemoryStore::new();
        let lead = store
            .create_lead(NewLead {
                name: "Ana".into(),
                phone: "11911112222".into(),
                status,
                ..NewLead::default()
            })
            .unwrap();
        (store, lead.id)
    }

    #[test]
    fn apply_persists_status_and_bundle() {
        let (store, id) = seeded(Fresh);
        let bundle = LeadPatch {
            unit_name: Some("Zona Sul".into()),
            status: Some(Renewal),
            ..LeadPatch::default()
        };
        let change = apply_status_change(&store, &id, Avulso, Role::Salesperson, bundle).unwrap();
        assert_eq!(change.previous, Fresh);
        assert_eq!(change.outcome, TransitionOutcome::Progressed(Avulso));

        let stored = store.get_lead(&id).unwrap().unwrap();
        assert_eq!(stored.status, Avulso);
        assert_eq!(stored.unit_name.as_deref(), Some("Zona Sul"));
    }

    #[test]
    fn apply_denied_leaves_lead_untouched() {
        let (store, id) = seeded(Fresh);
        let before = store.get_lead(&id).unwrap().unwrap();
        let err = apply_status_change(
            &store,
            &id,
            Avulso,
            Role::Receptionist,
            LeadPatch {
                unit_name: Some("ignored".into()),
                ..LeadPatch::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StatusChangeError::Denied(_)));
        assert_eq!(store.get_lead(&id).unwrap().unwrap(), before);
    }

    #[test]
    fn apply_unknown_lead_is_not_found() {
        let store = MemoryStore::new();
        let err = apply_status_change(
            &store,
            &LeadId::new("missing"),
            Avulso,
            Role::Admin,
            LeadPatch::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StatusChangeError::NotFound(_)));
    }

    #[test]
    fn apply_on_tombstone_is_refused() {
        let (store, id) = seeded(Fresh);
        let tombstone = Tombstone {
            merged_into: LeadId::new("ld-000009"),
            at: chrono::Utc::now(),
        };
        store
            .update_lead(
                &id,
                &LeadPatch {
                    tombstone: Some(tombstone),
                    ..LeadPatch::default()
                },
            )
            .unwrap();
        let writes_before = store.write_count();

        let err = apply_status_change(&store, &id, Renewal, Role::Admin, LeadPatch::default())
            .unwrap_err();
        assert!(matches!(
            err,
            StatusChangeError::Collapsed { ref merged_into, .. } if merged_into.as_str() == "ld-000009"
        ));
        assert_eq!(store.write_count(), writes_before);
        assert_eq!(store.get_lead(&id).unwrap().unwrap().status, Fresh);
    }

    #[test]
    fn apply_unchanged_does_not_write() {
        let (store, id) = seeded(Avulso);
        let writes_before = store.write_count();
        let change =
            apply_status_change(&store, &id, Avulso, Role::Salesperson, LeadPatch::default())
                .unwrap();
        assert_eq!(change.outcome, TransitionOutcome::Unchanged);
        assert_eq!(store.write_count(), writes_before);
    }
}
