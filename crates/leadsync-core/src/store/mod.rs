//! Entity store seam.
//!
//! The engine never owns persistence. It reads snapshots and issues
//! create/update/delete calls through [`EntityStore`]. Two implementations
//! ship with the crate: [`memory::MemoryStore`] for tests and embedding, and
//! [`sqlite::SqliteStore`] for the CLI.

pub mod memory;
pub mod sqlite;

use crate::identity;
use crate::model::{Appointment, Lead, LeadId, LeadPatch, LeadStatus, NewLead};
use std::sync::{Arc, Mutex, Weak};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    #[must_use]
    pub fn lead_not_found(id: &LeadId) -> Self {
        Self::NotFound {
            entity: "lead",
            id: id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Sort order for lead listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadSort {
    /// Oldest first, ties by id.
    #[default]
    CreatedAsc,
    /// Newest first, ties by id.
    CreatedDesc,
}

/// Predicate, sort and paging for [`EntityStore::filter_leads`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    /// Match leads whose normalized phone equals this digit string.
    pub phone_digits: Option<String>,
    pub status: Option<LeadStatus>,
    pub origin: Option<String>,
    /// Include collapsed (tombstoned) leads.
    pub include_tombstoned: bool,
    pub sort: LeadSort,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LeadFilter {
    /// Whether `lead` satisfies the predicate part of the filter.
    #[must_use]
    pub fn matches(&self, lead: &Lead) -> bool {
        if !self.include_tombstoned && !lead.is_live() {
            return false;
        }
        if let Some(ref digits) = self.phone_digits {
            if identity::normalize(&lead.phone) != *digits {
                return false;
            }
        }
        if let Some(status) = self.status {
            if lead.status != status {
                return false;
            }
        }
        if let Some(ref origin) = self.origin {
            if lead.origin.as_deref() != Some(origin.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Sort `leads` in place by the given order, ties broken by id.
pub fn sort_leads(leads: &mut [Lead], sort: LeadSort) {
    match sort {
        LeadSort::CreatedAsc => {
            leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        }
        LeadSort::CreatedDesc => {
            leads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        }
    }
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// A write observed through a store handle.
#[derive(Debug, Clone, PartialEq)]
pub enum LeadEvent {
    Created(Lead),
    Updated(Lead),
    Deleted(LeadId),
}

pub type LeadCallback = Box<dyn Fn(&LeadEvent) + Send + Sync>;

type Registry = Mutex<Vec<(u64, Arc<LeadCallback>)>>;

/// Callback registry shared by the store implementations.
#[derive(Default)]
pub struct Subscribers {
    next_id: Mutex<u64>,
    registry: Arc<Registry>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.registry.lock().map_or(0, |r| r.len());
        f.debug_struct("Subscribers").field("count", &count).finish()
    }
}

impl Subscribers {
    pub fn subscribe(&self, callback: LeadCallback) -> Subscription {
        let id = {
            let mut next = self
                .next_id
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *next += 1;
            *next
        };
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Callbacks run outside the registry lock so they may subscribe or
    /// drop subscriptions themselves.
    pub fn notify(&self, event: &LeadEvent) {
        let callbacks: Vec<Arc<LeadCallback>> = self
            .registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(event);
        }
    }
}

/// Handle returned by [`EntityStore::subscribe_leads`]. Dropping it
/// unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Stop receiving events. Same as dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// CRUD capability the engine consumes.
///
/// Implementations assign ids and `created_at` on create and must never
/// change `created_at` afterwards.
pub trait EntityStore {
    /// Every appointment, in the store's natural order.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot be read.
    fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    /// Every lead, tombstoned ones included.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot be read.
    fn list_leads(&self) -> Result<Vec<Lead>, StoreError>;

    /// Leads matching `filter`, sorted and paged as requested.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot be read.
    fn filter_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError>;

    /// # Errors
    ///
    /// Returns an error when the backend cannot be read.
    fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError>;

    /// # Errors
    ///
    /// Returns an error when the write fails.
    fn create_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;

    /// Apply `patch` and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or the backend
    /// error when the write fails.
    fn update_lead(&self, id: &LeadId, patch: &LeadPatch) -> Result<Lead, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or the backend
    /// error when the write fails.
    fn delete_lead(&self, id: &LeadId) -> Result<(), StoreError>;

    /// Insert or replace an appointment. Only the import path writes
    /// appointments.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    /// Register a callback for lead writes made through this store handle.
    fn subscribe_leads(&self, callback: LeadCallback) -> Subscription;
}

/// Apply a filter's sort and paging to an already-matched set.
pub(crate) fn page(mut leads: Vec<Lead>, filter: &LeadFilter) -> Vec<Lead> {
    sort_leads(&mut leads, filter.sort);
    let offset = filter.offset.unwrap_or(0);
    let limit = filter.limit.unwrap_or(usize::MAX);
    leads.into_iter().skip(offset).take(limit).collect()
}
