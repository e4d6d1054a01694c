//! Duplicate lead detection and collapse.
//!
//! Leads sharing a phone identity are grouped; in each group the oldest
//! lead (by `created_at`, ties by id) survives and the rest are collapsed.
//! Detection never writes. [`collapse`] applies a report and must be fed a
//! report computed from a current snapshot.

use crate::identity::PhoneKey;
use crate::model::{Lead, LeadId, LeadPatch, Tombstone};
use crate::store::{EntityStore, LeadSort, sort_leads};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// One phone identity held by more than one live lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub phone: String,
    pub survivor: Lead,
    pub duplicates: Vec<Lead>,
}

/// Result of [`find_duplicates`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    /// Groups ordered by phone.
    pub groups: Vec<DuplicateGroup>,
    /// Every non-survivor, in group order.
    pub to_delete: Vec<LeadId>,
}

impl DuplicateReport {
    /// Number of leads slated for collapse.
    #[must_use]
    pub fn count(&self) -> usize {
        self.to_delete.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty()
    }

    fn survivor_of(&self, id: &LeadId) -> Option<&LeadId> {
        self.groups
            .iter()
            .find(|g| g.duplicates.iter().any(|d| &d.id == id))
            .map(|g| &g.survivor.id)
    }
}

/// Group live, eligible leads by phone and pick survivors.
#[must_use]
pub fn find_duplicates(leads: &[Lead]) -> DuplicateReport {
    let mut by_phone: BTreeMap<PhoneKey, Vec<Lead>> = BTreeMap::new();
    for lead in leads.iter().filter(|l| l.is_live()) {
        if let Some(key) = PhoneKey::from_raw(&lead.phone) {
            by_phone.entry(key).or_default().push(lead.clone());
        }
    }

    let mut report = DuplicateReport::default();
    for (key, mut members) in by_phone {
        if members.len() < 2 {
            continue;
        }
        sort_leads(&mut members, LeadSort::CreatedAsc);
        let survivor = members.remove(0);
        report
            .to_delete
            .extend(members.iter().map(|l| l.id.clone()));
        report.groups.push(DuplicateGroup {
            phone: key.to_string(),
            survivor,
            duplicates: members,
        });
    }
    report
}

/// How a duplicate is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollapseMode {
    /// Delete the record.
    #[default]
    Hard,
    /// Keep the record, marked as merged into the survivor.
    Tombstone,
}

impl CollapseMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Tombstone => "tombstone",
        }
    }
}

impl fmt::Display for CollapseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollapseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" | "delete" => Ok(Self::Hard),
            "tombstone" | "soft" => Ok(Self::Tombstone),
            other => Err(format!(
                "unknown collapse mode '{other}' (expected hard or tombstone)"
            )),
        }
    }
}

/// A collapse that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseFailure {
    pub id: LeadId,
    pub message: String,
}

/// Outcome of [`collapse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseSummary {
    pub removed: usize,
    pub failed: Vec<CollapseFailure>,
}

/// Remove every lead in `report.to_delete`.
///
/// Each removal is independent: a failure is logged and recorded and the
/// remaining ids are still attempted. An id that no group lists as a
/// duplicate is recorded as a failure and left alone, so `removed` plus
/// `failed` always equals the number of ids.
pub fn collapse<S: EntityStore + ?Sized>(
    store: &S,
    report: &DuplicateReport,
    mode: CollapseMode,
    now: DateTime<Utc>,
) -> CollapseSummary {
    let mut summary = CollapseSummary::default();

    for id in &report.to_delete {
        let result = match (mode, report.survivor_of(id)) {
            (_, None) => Err(format!("lead {id} is not a duplicate in any group")),
            (CollapseMode::Hard, Some(_)) => store.delete_lead(id).map_err(|e| e.to_string()),
            (CollapseMode::Tombstone, Some(survivor)) => {
                let patch = LeadPatch {
                    tombstone: Some(Tombstone {
                        merged_into: survivor.clone(),
                        at: now,
                    }),
                    ..LeadPatch::default()
                };
                store
                    .update_lead(id, &patch)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
        };

        match result {
            Ok(()) => summary.removed += 1,
            Err(err) => {
                warn!(lead = %id, %mode, error = %err, "failed to collapse duplicate");
                summary.failed.push(CollapseFailure {
                    id: id.clone(),
                    message: err,
                });
            }
        }
    }

    info!(
        %mode,
        removed = summary.removed,
        failed = summary.failed.len(),
        "duplicate collapse finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewLead;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn lead(id: &str, phone: &str, secs: i64) -> Lead {
        NewLead {
            name: id.into(),
            phone: phone.into(),
            ..NewLead::default()
        }
        .into_lead(LeadId::new(id), Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn oldest_lead_survives() {
        let leads = vec![
            lead("newer", "(11) 99999-8888", 20),
            lead("older", "11999998888", 10),
            lead("other", "21988887777", 5),
        ];
        let report = find_duplicates(&leads);
        assert_eq!(report.count(), 1);
        assert_eq!(report.groups[0].survivor.id.as_str(), "older");
        assert_eq!(report.to_delete, vec![LeadId::new("newer")]);
    }

    #[test]
    fn created_at_ties_break_on_id() {
        let leads = vec![lead("b", "11999998888", 1), lead("a", "11999998888", 1)];
        let report = find_duplicates(&leads);
        assert_eq!(report.groups[0].survivor.id.as_str(), "a");
    }

    #[test]
    fn short_and_tombstoned_phones_never_group() {
        let mut gone = lead("gone", "11999998888", 0);
        gone.tombstone = Some(Tombstone {
            merged_into: LeadId::new("keep"),
            at: Utc.timestamp_opt(1, 0).unwrap(),
        });
        let leads = vec![
            lead("s1", "12345", 0),
            lead("s2", "12345", 1),
            gone,
            lead("keep", "11999998888", 2),
        ];
        assert!(find_duplicates(&leads).is_empty());
    }

    #[test]
    fn hard_collapse_deletes_and_tolerates_failures() {
        let leads = vec![
            lead("ld-1", "11999998888", 1),
            lead("ld-2", "11999998888", 2),
            lead("ld-3", "11999998888", 3),
        ];
        let store = MemoryStore::with_snapshot(vec![], leads.clone());
        store.fail_delete_of(&LeadId::new("ld-2"));

        let summary = collapse(&store, &find_duplicates(&leads), CollapseMode::Hard, Utc::now());
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].id.as_str(), "ld-2");
        let left: Vec<_> = store
            .list_leads()
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(left, vec![LeadId::new("ld-1"), LeadId::new("ld-2")]);
    }

    #[test]
    fn tombstone_collapse_keeps_records() {
        let leads = vec![lead("ld-1", "11999998888", 1), lead("ld-2", "11999998888", 2)];
        let store = MemoryStore::with_snapshot(vec![], leads.clone());
        let at = Utc.timestamp_opt(100, 0).unwrap();

        let summary = collapse(&store, &find_duplicates(&leads), CollapseMode::Tombstone, at);
        assert_eq!(summary.removed, 1);

        let all = store.list_leads().unwrap();
        assert_eq!(all.len(), 2);
        let stone = all[1].tombstone.clone().unwrap();
        assert_eq!(stone.merged_into.as_str(), "ld-1");
        assert_eq!(stone.at, at);
        assert!(find_duplicates(&all).is_empty());
    }

    #[test]
    fn ungrouped_id_is_reported_not_skipped() {
        let leads = vec![
            lead("ld-1", "11999998888", 1),
            lead("ld-2", "11999998888", 2),
            lead("ld-9", "21988887777", 3),
        ];
        let mut report = find_duplicates(&leads);
        report.to_delete.push(LeadId::new("ld-9"));

        for mode in [CollapseMode::Tombstone, CollapseMode::Hard] {
            let store = MemoryStore::with_snapshot(vec![], leads.clone());
            let summary = collapse(&store, &report, mode, Utc::now());
            assert_eq!(summary.removed + summary.failed.len(), report.to_delete.len());
            assert_eq!(summary.failed.len(), 1);
            assert_eq!(summary.failed[0].id.as_str(), "ld-9");
            let untouched = store.get_lead(&LeadId::new("ld-9")).unwrap().unwrap();
            assert!(untouched.is_live());
        }
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("HARD".parse::<CollapseMode>(), Ok(CollapseMode::Hard));
        assert_eq!("soft".parse::<CollapseMode>(), Ok(CollapseMode::Tombstone));
        assert!("archive".parse::<CollapseMode>().is_err());
    }
}
