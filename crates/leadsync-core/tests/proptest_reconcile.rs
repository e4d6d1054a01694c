//! Property tests for the reconciliation job and duplicate detection.


use chrono::NaiveDate;
use generators::{arb_appointments, arb_leads};
use leadsync_core::dedup::find_duplicates;
use leadsync_core::identity::{self, PhoneKey};
use leadsync_core::reconcile::{self, SyncOptions, screen};
use leadsync_core::store::EntityStore;
use leadsync_core::store::memory::MemoryStore;
use leadsync_core::throttle::{NoPacer, ThrottlePolicy};
use proptest::prelude::*;
use std::collections::HashSet;

fn options() -> SyncOptions {
    SyncOptions {
        throttle: ThrottlePolicy::unthrottled(),
        ..SyncOptions::default()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

proptest! {
    #[test]
    fn normalize_keeps_only_digits(raw in ".{0,40}") {
        let digits = identity::normalize(&raw);
        prop_assert!(digits.chars().all(|c| c.is_ascii_digit()));
        prop_assert_eq!(identity::normalize(&digits), digits.clone());
    }

    #[test]
    fn second_run_creates_nothing_and_changes_nothing(
        appts in arb_appointments(12),
        leads in arb_leads(4),
    ) {
        let store = MemoryStore::with_snapshot(appts, leads);
        reconcile::run(&store, &NoPacer, &options(), today()).unwrap();
        let after_first = store.list_leads().unwrap();

        let second = reconcile::run(&store, &NoPacer, &options(), today()).unwrap();
        prop_assert_eq!(second.created, 0);
        prop_assert_eq!(store.list_leads().unwrap(), after_first);
    }

    #[test]
    fn only_eligible_qualifying_phones_become_leads(appts in arb_appointments(12)) {
        let store = MemoryStore::with_snapshot(appts.clone(), vec![]);
        let summary = reconcile::run(&store, &NoPacer, &options(), today()).unwrap();

        let expected: HashSet<PhoneKey> = appts
            .iter()
            .filter_map(|a| screen(a, "FECHADO").ok())
            .collect();
        let leads = store.list_leads().unwrap();
        let got: HashSet<PhoneKey> = leads
            .iter()
            .map(|l| PhoneKey::from_raw(&l.phone).unwrap())
            .collect();

        prop_assert_eq!(leads.len(), expected.len());
        prop_assert_eq!(got, expected);
        prop_assert_eq!(summary.created, leads.len());
        prop_assert_eq!(summary.processed + summary.skipped.total(), summary.total);
    }

    #[test]
    fn run_from_empty_never_produces_duplicates(appts in arb_appointments(12)) {
        let store = MemoryStore::with_snapshot(appts, vec![]);
        reconcile::run(&store, &NoPacer, &options(), today()).unwrap();
        prop_assert!(find_duplicates(&store.list_leads().unwrap()).is_empty());
    }

    #[test]
    fn dedup_leaves_one_oldest_lead_per_phone(leads in arb_leads(10)) {
        let report = find_duplicates(&leads);
        let doomed: HashSet<_> = report.to_delete.iter().cloned().collect();
        prop_assert_eq!(doomed.len(), report.count());

        let survivors: Vec<_> = leads.iter().filter(|l| !doomed.contains(&l.id)).cloned().collect();
        prop_assert!(find_duplicates(&survivors).is_empty());

        for group in &report.groups {
            for dup in &group.duplicates {
                prop_assert!(
                    (group.survivor.created_at, &group.survivor.id) <= (dup.created_at, &dup.id)
                );
            }
        }
    }
}
