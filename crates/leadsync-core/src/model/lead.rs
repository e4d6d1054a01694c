//! CRM lead records and their funnel status.
//!
//! # Status Ranking
//!
//! Statuses have a total ordering:
//!   lead(0) < avulso(1) < therapeuticPlan(2) < renewal(3)
//!
//! Moving to a higher rank is a *progression*, moving to a lower rank is a
//! *regression*. Which progressions an actor may perform is decided in
//! [`crate::status`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// LeadStatus
// ---------------------------------------------------------------------------

/// Funnel stage of a lead, ordered by rank.
///
/// The discriminant values define the rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum LeadStatus {
    Lead = 0,
    Avulso = 1,
    TherapeuticPlan = 2,
    Renewal = 3,
}

impl LeadStatus {
    /// All statuses in rank order.
    pub const ALL: [Self; 4] = [
        Self::Lead,
        Self::Avulso,
        Self::TherapeuticPlan,
        Self::Renewal,
    ];

    /// Return the numeric rank of this status.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Return the wire name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Avulso => "avulso",
            Self::TherapeuticPlan => "therapeuticPlan",
            Self::Renewal => "renewal",
        }
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::Lead
    }
}

impl PartialOrd for LeadStatus {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LeadStatus {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the four statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lead status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for LeadStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(Self::Lead),
            "avulso" => Ok(Self::Avulso),
            "therapeuticPlan" => Ok(Self::TherapeuticPlan),
            "renewal" => Ok(Self::Renewal),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Store-assigned lead identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(String);

impl LeadId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// Soft-deletion marker left on a lead collapsed into a survivor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub merged_into: LeadId,
    pub at: DateTime<Utc>,
}

/// A persisted lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub salesperson_id: Option<String>,
    #[serde(default)]
    pub salesperson_name: Option<String>,
    #[serde(default)]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub unit_name: Option<String>,
    #[serde(default)]
    pub therapist_id: Option<String>,
    #[serde(default)]
    pub therapist_name: Option<String>,
    #[serde(default)]
    pub converted: bool,
    #[serde(default)]
    pub conversion_date: Option<NaiveDate>,
    #[serde(default)]
    pub negotiated_value: Option<f64>,
    #[serde(default)]
    pub contact_attempts: u32,
    #[serde(default)]
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstone: Option<Tombstone>,
}

impl Lead {
    /// A lead is live until it has been collapsed into a survivor.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.tombstone.is_none()
    }

    /// Apply a patch in place. `None` fields leave the current value alone.
    pub fn apply(&mut self, patch: &LeadPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref name) = patch.name {
            self.name.clone_from(name);
        }
        if let Some(ref phone) = patch.phone {
            self.phone.clone_from(phone);
        }
        if let Some(ref v) = patch.salesperson_id {
            self.salesperson_id = Some(v.clone());
        }
        if let Some(ref v) = patch.salesperson_name {
            self.salesperson_name = Some(v.clone());
        }
        if let Some(ref v) = patch.unit_id {
            self.unit_id = Some(v.clone());
        }
        if let Some(ref v) = patch.unit_name {
            self.unit_name = Some(v.clone());
        }
        if let Some(ref v) = patch.therapist_id {
            self.therapist_id = Some(v.clone());
        }
        if let Some(ref v) = patch.therapist_name {
            self.therapist_name = Some(v.clone());
        }
        if let Some(converted) = patch.converted {
            self.converted = converted;
        }
        if let Some(date) = patch.conversion_date {
            self.conversion_date = Some(date);
        }
        if let Some(value) = patch.negotiated_value {
            self.negotiated_value = Some(value);
        }
        if let Some(attempts) = patch.contact_attempts {
            self.contact_attempts = attempts;
        }
        if let Some(ref tombstone) = patch.tombstone {
            self.tombstone = Some(tombstone.clone());
        }
    }
}

/// Fields for a lead that does not exist yet. The store assigns `id` and,
/// unless the caller is importing history, `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub status: LeadStatus,
    pub salesperson_id: Option<String>,
    pub salesperson_name: Option<String>,
    pub unit_id: Option<String>,
    pub unit_name: Option<String>,
    pub therapist_id: Option<String>,
    pub therapist_name: Option<String>,
    pub converted: bool,
    pub conversion_date: Option<NaiveDate>,
    pub negotiated_value: Option<f64>,
    pub contact_attempts: u32,
    pub origin: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewLead {
    /// Materialize the record a store persists for this request.
    #[must_use]
    pub fn into_lead(self, id: LeadId, now: DateTime<Utc>) -> Lead {
        Lead {
            id,
            name: self.name,
            phone: self.phone,
            status: self.status,
            salesperson_id: self.salesperson_id,
            salesperson_name: self.salesperson_name,
            unit_id: self.unit_id,
            unit_name: self.unit_name,
            therapist_id: self.therapist_id,
            therapist_name: self.therapist_name,
            converted: self.converted,
            conversion_date: self.conversion_date,
            negotiated_value: self.negotiated_value,
            contact_attempts: self.contact_attempts,
            origin: self.origin,
            created_at: self.created_at.unwrap_or(now),
            tombstone: None,
        }
    }
}

/// Partial update for a lead. Every `None` leaves the stored value as is;
/// `id` and `created_at` cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub status: Option<LeadStatus>,
    pub salesperson_id: Option<String>,
    pub salesperson_name: Option<String>,
    pub unit_id: Option<String>,
    pub unit_name: Option<String>,
    pub therapist_id: Option<String>,
    pub therapist_name: Option<String>,
    pub converted: Option<bool>,
    pub conversion_date: Option<NaiveDate>,
    pub negotiated_value: Option<f64>,
    pub contact_attempts: Option<u32>,
    pub tombstone: Option<Tombstone>,
}

impl LeadPatch {
    /// Patch that only moves the status.
    #[must_use]
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// True when applying the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
