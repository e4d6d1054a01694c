//! Batch reconciliation of appointments into leads.
//!
//! One run reads a full appointment snapshot and a full lead snapshot,
//! indexes leads by phone identity, and for every qualifying appointment
//! either updates the matching lead or creates a new one. Writes are
//! sequential and paced by a [`ThrottlePolicy`]. A failed write is counted
//! and the run moves on; only a failure to read the snapshots aborts it.

use crate::identity::{PhoneIndex, PhoneKey};
use crate::model::{Appointment, AppointmentKind, LeadPatch, LeadStatus, NewLead};
use crate::store::{EntityStore, LeadSort, StoreError, sort_leads};
use crate::throttle::{Pacer, ThrottlePolicy};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Knobs for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Client name marking a closed slot rather than a client.
    pub closed_marker: String,
    /// `origin` stamped on leads created by the job.
    pub origin: String,
    /// Cap on failure details kept in the summary.
    pub max_error_details: usize,
    pub throttle: ThrottlePolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            closed_marker: "FECHADO".to_string(),
            origin: "schedule-sync".to_string(),
            max_error_details: 20,
            throttle: ThrottlePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Screening and classification
// ---------------------------------------------------------------------------

/// Why an appointment does not take part in reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    BlockingPlaceholder,
    ClosedMarker,
    BlankName,
    IneligiblePhone,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockingPlaceholder => "blocking-placeholder",
            Self::ClosedMarker => "closed-marker",
            Self::BlankName => "blank-name",
            Self::IneligiblePhone => "ineligible-phone",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether `appt` qualifies, returning its phone key when it does.
///
/// # Errors
///
/// Returns the first [`SkipReason`] that applies.
pub fn screen(appt: &Appointment, closed_marker: &str) -> Result<PhoneKey, SkipReason> {
    if appt.kind == AppointmentKind::BlockingPlaceholder {
        return Err(SkipReason::BlockingPlaceholder);
    }
    let name = appt.client_name.trim();
    if name == closed_marker.trim() {
        return Err(SkipReason::ClosedMarker);
    }
    if name.is_empty() {
        return Err(SkipReason::BlankName);
    }
    PhoneKey::from_raw(&appt.client_phone).ok_or(SkipReason::IneligiblePhone)
}

/// Status a qualifying appointment pushes its lead to.
#[must_use]
pub fn target_status(appt: &Appointment) -> LeadStatus {
    if appt.kind == AppointmentKind::OneOff || appt.has_salesperson() {
        LeadStatus::Avulso
    } else {
        LeadStatus::TherapeuticPlan
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Skipped appointments, per reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCounts {
    pub blocking_placeholder: usize,
    pub closed_marker: usize,
    pub blank_name: usize,
    pub ineligible_phone: usize,
}

impl SkipCounts {
    pub const fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::BlockingPlaceholder => self.blocking_placeholder += 1,
            SkipReason::ClosedMarker => self.closed_marker += 1,
            SkipReason::BlankName => self.blank_name += 1,
            SkipReason::IneligiblePhone => self.ineligible_phone += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.blocking_placeholder + self.closed_marker + self.blank_name + self.ineligible_phone
    }
}

/// Which write an appointment triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Create,
    Update,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
        })
    }
}

/// One failed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub appointment_id: String,
    pub phone: String,
    pub operation: WriteOp,
    pub message: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Appointments in the snapshot.
    pub total: usize,
    /// Qualifying appointments a write was attempted for.
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub skipped: SkipCounts,
    /// Live leads sharing a phone with an older lead. Only the oldest one
    /// receives updates; `leadsync dedup` collapses the rest.
    pub shadowed_leads: usize,
    /// At most `max_error_details` entries; `errors` has the full count.
    pub failures: Vec<FailureDetail>,
}

/// A run that could not start.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to load {what} snapshot: {source}")]
    Snapshot {
        what: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Wire shape returned to whoever triggered the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SyncResponse {
    Completed {
        success: bool,
        processados: usize,
        criados: usize,
        atualizados: usize,
        erros: usize,
        total: usize,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        falhas: Vec<FailureDetail>,
    },
    Failed {
        success: bool,
        error: String,
    },
}

impl SyncResponse {
    #[must_use]
    pub fn from_result(result: &Result<SyncSummary, SyncError>) -> Self {
        match result {
            Ok(summary) => Self::Completed {
                success: true,
                processados: summary.processed,
                criados: summary.created,
                atualizados: summary.updated,
                erros: summary.errors,
                total: summary.total,
                falhas: summary.failures.clone(),
            },
            Err(err) => Self::Failed {
                success: false,
                error: err.to_string(),
            },
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// The run
// ---------------------------------------------------------------------------

/// Run one reconciliation pass.
///
/// `today` fills `conversion_date` for appointments without a date.
///
/// # Errors
///
/// Returns [`SyncError::Snapshot`] when either snapshot cannot be read.
/// Individual write failures are reported in the summary instead.
pub fn run<S, P>(
    store: &S,
    pacer: &P,
    options: &SyncOptions,
    today: NaiveDate,
) -> Result<SyncSummary, SyncError>
where
    S: EntityStore + ?Sized,
    P: Pacer + ?Sized,
{
    let mut appointments = store
        .list_appointments()
        .map_err(|source| SyncError::Snapshot {
            what: "appointment",
            source,
        })?;
    let mut leads = store.list_leads().map_err(|source| SyncError::Snapshot {
        what: "lead",
        source,
    })?;

    sort_leads(&mut leads, LeadSort::CreatedAsc);
    let mut index = PhoneIndex::build(&leads);
    appointments.sort_by_key(|a| a.date);

    if index.shadowed() > 0 {
        warn!(
            shadowed = index.shadowed(),
            "leads share a phone with an older lead; only the oldest is updated"
        );
    }

    info!(
        appointments = appointments.len(),
        leads = leads.len(),
        indexed = index.len(),
        "reconciliation started"
    );

    let mut summary = SyncSummary {
        total: appointments.len(),
        shadowed_leads: index.shadowed(),
        ..SyncSummary::default()
    };

    for appt in &appointments {
        let key = match screen(appt, &options.closed_marker) {
            Ok(key) => key,
            Err(reason) => {
                debug!(appointment = %appt.id, %reason, "appointment skipped");
                summary.skipped.record(reason);
                continue;
            }
        };

        let status = target_status(appt);
        let op = if index.contains(&key) {
            WriteOp::Update
        } else {
            WriteOp::Create
        };

        match upsert(store, &mut index, key.clone(), appt, status, options, today) {
            Ok(WriteOp::Create) => summary.created += 1,
            Ok(WriteOp::Update) => summary.updated += 1,
            Err(err) => {
                warn!(appointment = %appt.id, phone = %key, %op, error = %err, "lead write failed");
                summary.errors += 1;
                if summary.failures.len() < options.max_error_details {
                    summary.failures.push(FailureDetail {
                        appointment_id: appt.id.clone(),
                        phone: key.to_string(),
                        operation: op,
                        message: err.to_string(),
                    });
                }
            }
        }

        summary.processed += 1;
        if let Some(pause) = options.throttle.pause_after(summary.processed) {
            debug!(processed = summary.processed, ?pause, "pacing writes");
            pacer.pause(pause);
        }
    }

    info!(
        total = summary.total,
        processed = summary.processed,
        created = summary.created,
        updated = summary.updated,
        errors = summary.errors,
        skipped = summary.skipped.total(),
        "reconciliation finished"
    );

    Ok(summary)
}

/// Create or update the lead for `key` and record the stored result in
/// `index`.
fn upsert<S: EntityStore + ?Sized>(
    store: &S,
    index: &mut PhoneIndex,
    key: PhoneKey,
    appt: &Appointment,
    status: LeadStatus,
    options: &SyncOptions,
    today: NaiveDate,
) -> Result<WriteOp, StoreError> {
    let conversion_date = appt.date.unwrap_or(today);

    if let Some(existing) = index.get(&key) {
        let id = existing.id.clone();
        let patch = LeadPatch {
            status: Some(status),
            salesperson_id: appt.salesperson_id.clone(),
            salesperson_name: appt.salesperson_name.clone(),
            unit_id: appt.unit_id.clone(),
            unit_name: appt.unit_name.clone(),
            therapist_id: appt.professional_id.clone(),
            therapist_name: appt.professional_name.clone(),
            converted: Some(true),
            conversion_date: Some(conversion_date),
            negotiated_value: appt.agreed_value,
            ..LeadPatch::default()
        };
        let stored = store.update_lead(&id, &patch)?;
        debug!(appointment = %appt.id, lead = %stored.id, %status, "lead updated");
        index.record(key, stored);
        return Ok(WriteOp::Update);
    }

    let created = store.create_lead(NewLead {
        name: appt.client_name.trim().to_string(),
        phone: appt.client_phone.clone(),
        status,
        salesperson_id: appt.salesperson_id.clone(),
        salesperson_name: appt.salesperson_name.clone(),
        unit_id: appt.unit_id.clone(),
        unit_name: appt.unit_name.clone(),
        therapist_id: appt.professional_id.clone(),
        therapist_name: appt.professional_name.clone(),
        converted: true,
        conversion_date: Some(conversion_date),
        negotiated_value: appt.agreed_value,
        contact_attempts: 0,
        origin: Some(options.origin.clone()),
        created_at: None,
    })?;
    debug!(appointment = %appt.id, lead = %created.id, %status, "lead created");
    index.record(key, created);
    Ok(WriteOp::Create)
}
