//! Phone-number identity.
//!
//! A client's identity is the digit-only form of their phone number. Digit
//! strings shorter than [`MIN_IDENTITY_DIGITS`] are too ambiguous to match on
//! (missing area code, extension-only entries) and never take part in
//! matching or duplicate grouping.

use crate::model::Lead;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

/// Minimum digit count for a phone to act as an identity key.
pub const MIN_IDENTITY_DIGITS: usize = 10;

/// Strip every non-digit character from a raw phone string.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Whether a normalized phone is long enough to be an identity key.
#[must_use]
pub fn is_eligible(digits: &str) -> bool {
    digits.len() >= MIN_IDENTITY_DIGITS
}

/// A normalized, eligible phone number.
///
/// Only constructible through [`PhoneKey::from_raw`], so holding one proves
/// the eligibility check already happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhoneKey(String);

impl PhoneKey {
    /// Normalize `raw` and return its key, or `None` when ineligible.
    #[must_use]
    pub fn from_raw(raw: &str) -> Option<Self> {
        let digits = normalize(raw);
        is_eligible(&digits).then_some(Self(digits))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Phone → lead lookup built from a lead snapshot.
///
/// Scoped to a single reconciliation run; callers own it and pass it
/// explicitly to whatever needs to read or extend it.
#[derive(Debug, Default, Clone)]
pub struct PhoneIndex {
    slots: HashMap<PhoneKey, Lead>,
    shadowed: usize,
}

impl PhoneIndex {
    /// Build an index in iteration order. The first live lead seen for a
    /// phone keeps the slot; later ones with the same phone are counted in
    /// [`PhoneIndex::shadowed`] and otherwise ignored.
    pub fn build<'a>(leads: impl IntoIterator<Item = &'a Lead>) -> Self {
        let mut index = Self::default();
        for lead in leads {
            if !lead.is_live() {
                continue;
            }
            let Some(key) = PhoneKey::from_raw(&lead.phone) else {
                continue;
            };
            match index.slots.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(lead.clone());
                }
                Entry::Occupied(_) => index.shadowed += 1,
            }
        }
        index
    }

    #[must_use]
    pub fn get(&self, key: &PhoneKey) -> Option<&Lead> {
        self.slots.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &PhoneKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Store `lead` under `key`, replacing whatever held the slot.
    ///
    /// Used after a write so later lookups in the same run see the stored
    /// record.
    pub fn record(&mut self, key: PhoneKey, lead: Lead) {
        self.slots.insert(key, lead);
    }

    /// Live leads left out of the index because an earlier lead already
    /// holds their phone.
    #[must_use]
    pub const fn shadowed(&self) -> usize {
        self.shadowed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
