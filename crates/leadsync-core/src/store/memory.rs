//! In-process store backed by vectors behind a mutex.
//!
//! Carries a small fault-injection surface so callers can exercise the
//! engine's failure boundaries without a real backend.

use super::{
    EntityStore, LeadCallback, LeadEvent, LeadFilter, StoreError, Subscribers, Subscription, page,
};
use crate::identity;
use crate::model::{Appointment, Lead, LeadId, LeadPatch, NewLead};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    appointments: Vec<Appointment>,
    leads: Vec<Lead>,
    next_seq: u64,
    writes: usize,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    fail_reads: bool,
    fail_lead_reads: bool,
    fail_all_writes: bool,
    fail_writes_for_phones: HashSet<String>,
    fail_deletes_for: HashSet<LeadId>,
}

/// Thread-safe in-memory [`EntityStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    subscribers: Subscribers,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with an appointment and lead snapshot. Leads keep their
    /// ids and timestamps.
    #[must_use]
    pub fn with_snapshot(appointments: Vec<Appointment>, leads: Vec<Lead>) -> Self {
        let store = Self::new();
        {
            let mut t = store.lock();
            t.appointments = appointments;
            t.leads = leads;
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful create/update/delete calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every list/filter/get call fail.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().faults.fail_reads = fail;
    }

    /// Make lead reads fail while appointment reads keep working.
    pub fn fail_lead_reads(&self, fail: bool) {
        self.lock().faults.fail_lead_reads = fail;
    }

    /// Make every create/update/delete call fail.
    pub fn fail_all_writes(&self, fail: bool) {
        self.lock().faults.fail_all_writes = fail;
    }

    /// Fail creates and updates touching a lead with this phone (any
    /// formatting; compared after normalization).
    pub fn fail_writes_for_phone(&self, raw_phone: &str) {
        self.lock()
            .faults
            .fail_writes_for_phones
            .insert(identity::normalize(raw_phone));
    }

    /// Fail deletes of this lead.
    pub fn fail_delete_of(&self, id: &LeadId) {
        self.lock().faults.fail_deletes_for.insert(id.clone());
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

impl Tables {
    fn check_read(&self) -> Result<(), StoreError> {
        if self.faults.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }

    fn check_lead_read(&self) -> Result<(), StoreError> {
        self.check_read()?;
        if self.faults.fail_lead_reads {
            return Err(StoreError::Unavailable("injected lead read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self, phone: &str) -> Result<(), StoreError> {
        if self.faults.fail_all_writes
            || self
                .faults
                .fail_writes_for_phones
                .contains(&identity::normalize(phone))
        {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn position(&self, id: &LeadId) -> Result<usize, StoreError> {
        self.leads
            .iter()
            .position(|l| &l.id == id)
            .ok_or_else(|| StoreError::lead_not_found(id))
    }
}

impl EntityStore for MemoryStore {
    fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let t = self.lock();
        t.check_read()?;
        Ok(t.appointments.clone())
    }

    fn list_leads(&self) -> Result<Vec<Lead>, StoreError> {
        let t = self.lock();
        t.check_lead_read()?;
        Ok(t.leads.clone())
    }

    fn filter_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError> {
        let t = self.lock();
        t.check_lead_read()?;
        let matched = t.leads.iter().filter(|l| filter.matches(l)).cloned().collect();
        Ok(page(matched, filter))
    }

    fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        let t = self.lock();
        t.check_lead_read()?;
        Ok(t.leads.iter().find(|l| &l.id == id).cloned())
    }

    fn create_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let created = {
            let mut t = self.lock();
            t.check_write(&lead.phone)?;
            let id = loop {
                t.next_seq += 1;
                let candidate = LeadId::new(format!("ld-{:06}", t.next_seq));
                if !t.leads.iter().any(|l| l.id == candidate) {
                    break candidate;
                }
            };
            let created = lead.into_lead(id, Self::now());
            t.leads.push(created.clone());
            t.writes += 1;
            created
        };
        self.subscribers.notify(&LeadEvent::Created(created.clone()));
        Ok(created)
    }

    fn update_lead(&self, id: &LeadId, patch: &LeadPatch) -> Result<Lead, StoreError> {
        let updated = {
            let mut t = self.lock();
            let pos = t.position(id)?;
            let phone = t.leads[pos].phone.clone();
            t.check_write(&phone)?;
            t.leads[pos].apply(patch);
            t.writes += 1;
            t.leads[pos].clone()
        };
        self.subscribers.notify(&LeadEvent::Updated(updated.clone()));
        Ok(updated)
    }

    fn delete_lead(&self, id: &LeadId) -> Result<(), StoreError> {
        {
            let mut t = self.lock();
            let pos = t.position(id)?;
            let phone = t.leads[pos].phone.clone();
            t.check_write(&phone)?;
            if t.faults.fail_deletes_for.contains(id) {
                return Err(StoreError::Unavailable("injected delete failure".into()));
            }
            t.leads.remove(pos);
            t.writes += 1;
        }
        self.subscribers.notify(&LeadEvent::Deleted(id.clone()));
        Ok(())
    }

    fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut t = self.lock();
        if t.faults.fail_all_writes {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        match t.appointments.iter_mut().find(|a| a.id == appointment.id) {
            Some(existing) => existing.clone_from(appointment),
            None => t.appointments.push(appointment.clone()),
        }
        Ok(())
    }

    fn subscribe_leads(&self, callback: LeadCallback) -> Subscription {
        self.subscribers.subscribe(callback)
    }
}
