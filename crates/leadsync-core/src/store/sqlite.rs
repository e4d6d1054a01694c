//! SQLite-backed [`EntityStore`].
//!
//! All queries take the connection mutex for their whole duration, so a
//! handle can be shared across threads. Writes that read-modify-write a row
//! run inside a transaction.

use super::{
    EntityStore, LeadCallback, LeadEvent, LeadFilter, LeadSort, StoreError, Subscribers,
    Subscription,
};
use crate::db;
use crate::identity;
use crate::model::{Appointment, AppointmentKind, Lead, LeadId, LeadPatch, NewLead, Tombstone};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const LEAD_COLUMNS: &str = "lead_id, name, phone, status, salesperson_id, salesperson_name, \
     unit_id, unit_name, therapist_id, therapist_name, converted, conversion_date, \
     negotiated_value, contact_attempts, origin, created_at_us, merged_into, tombstoned_at_us";

const APPOINTMENT_COLUMNS: &str = "appointment_id, kind, client_name, client_phone, \
     salesperson_id, salesperson_name, unit_id, unit_name, professional_id, \
     professional_name, appointment_date, agreed_value";

/// Raw `leads` row before string fields are parsed.
struct LeadRow {
    id: String,
    name: String,
    phone: String,
    status: String,
    salesperson_id: Option<String>,
    salesperson_name: Option<String>,
    unit_id: Option<String>,
    unit_name: Option<String>,
    therapist_id: Option<String>,
    therapist_name: Option<String>,
    converted: bool,
    conversion_date: Option<String>,
    negotiated_value: Option<f64>,
    contact_attempts: i64,
    origin: Option<String>,
    created_at_us: i64,
    merged_into: Option<String>,
    tombstoned_at_us: Option<i64>,
}

impl LeadRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            status: row.get(3)?,
            salesperson_id: row.get(4)?,
            salesperson_name: row.get(5)?,
            unit_id: row.get(6)?,
            unit_name: row.get(7)?,
            therapist_id: row.get(8)?,
            therapist_name: row.get(9)?,
            converted: row.get(10)?,
            conversion_date: row.get(11)?,
            negotiated_value: row.get(12)?,
            contact_attempts: row.get(13)?,
            origin: row.get(14)?,
            created_at_us: row.get(15)?,
            merged_into: row.get(16)?,
            tombstoned_at_us: row.get(17)?,
        })
    }

    fn into_lead(self) -> Result<Lead, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            entity: "lead",
            id: self.id.clone(),
            reason,
        };
        let status = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let conversion_date = self
            .conversion_date
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(corrupt)?;
        let created_at = from_micros(self.created_at_us)
            .ok_or_else(|| corrupt(format!("bad created_at_us {}", self.created_at_us)))?;
        let contact_attempts = u32::try_from(self.contact_attempts)
            .map_err(|_| corrupt(format!("bad contact_attempts {}", self.contact_attempts)))?;
        let tombstone = match (self.merged_into, self.tombstoned_at_us) {
            (Some(survivor), Some(at)) => Some(Tombstone {
                merged_into: LeadId::new(survivor),
                at: from_micros(at).ok_or_else(|| corrupt(format!("bad tombstoned_at_us {at}")))?,
            }),
            _ => None,
        };

        Ok(Lead {
            id: LeadId::new(self.id),
            name: self.name,
            phone: self.phone,
            status,
            salesperson_id: self.salesperson_id,
            salesperson_name: self.salesperson_name,
            unit_id: self.unit_id,
            unit_name: self.unit_name,
            therapist_id: self.therapist_id,
            therapist_name: self.therapist_name,
            converted: self.converted,
            conversion_date,
            negotiated_value: self.negotiated_value,
            contact_attempts,
            origin: self.origin,
            created_at,
            tombstone,
        })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    raw.parse::<NaiveDate>()
        .map_err(|e| format!("bad date {raw:?}: {e}"))
}

fn from_micros(us: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
}

/// Drop precision the `*_us` columns cannot hold, so returned records
/// compare equal to what a later read yields.
fn truncate_to_micros(lead: &mut Lead) {
    lead.created_at = lead.created_at.trunc_subsecs(6);
    if let Some(stone) = lead.tombstone.as_mut() {
        stone.at = stone.at.trunc_subsecs(6);
    }
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<(Appointment, Option<String>)> {
    let kind: String = row.get(1)?;
    let kind = serde_json::from_value::<AppointmentKind>(serde_json::Value::String(kind))
        .unwrap_or(AppointmentKind::Other);
    let date: Option<String> = row.get(10)?;
    Ok((
        Appointment {
            id: row.get(0)?,
            kind,
            client_name: row.get(2)?,
            client_phone: row.get(3)?,
            salesperson_id: row.get(4)?,
            salesperson_name: row.get(5)?,
            unit_id: row.get(6)?,
            unit_name: row.get(7)?,
            professional_id: row.get(8)?,
            professional_name: row.get(9)?,
            date: None,
            agreed_value: row.get(11)?,
        },
        date,
    ))
}

/// [`EntityStore`] over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    subscribers: Subscribers,
}

impl SqliteStore {
    /// Open (creating and migrating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(db::open_store_db(path)?))
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(db::open_in_memory()?))
    }

    /// Wrap an already-migrated connection.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            subscribers: Subscribers::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember when the last reconciliation run finished.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub fn record_sync_run(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock().execute(
            "UPDATE store_meta SET last_sync_at_us = ?1 WHERE id = 1",
            [at.timestamp_micros()],
        )?;
        Ok(())
    }

    /// When the last reconciliation run finished, if ever.
    ///
    /// # Errors
    ///
    /// Returns an error when the read fails.
    pub fn last_sync_run(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let us: Option<i64> = self.lock().query_row(
            "SELECT last_sync_at_us FROM store_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(us.and_then(from_micros))
    }

    fn fetch_lead(conn: &Connection, id: &str) -> Result<Option<Lead>, StoreError> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lead_id = ?1");
        conn.query_row(&sql, [id], LeadRow::from_row)
            .optional()?
            .map(LeadRow::into_lead)
            .transpose()
    }

    fn query_leads(
        conn: &Connection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Vec<Lead>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values), LeadRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_lead()?);
        }
        Ok(out)
    }

    fn next_lead_id(conn: &Connection) -> Result<LeadId, StoreError> {
        loop {
            conn.execute(
                "UPDATE store_meta SET next_lead_seq = next_lead_seq + 1 WHERE id = 1",
                [],
            )?;
            let seq: i64 = conn.query_row(
                "SELECT next_lead_seq FROM store_meta WHERE id = 1",
                [],
                |row| row.get(0),
            )?;
            let candidate = format!("ld-{seq:06}");
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM leads WHERE lead_id = ?1)",
                [&candidate],
                |row| row.get(0),
            )?;
            if !taken {
                return Ok(LeadId::new(candidate));
            }
        }
    }

    fn write_lead(conn: &Connection, lead: &Lead) -> Result<(), StoreError> {
        let (merged_into, tombstoned_at_us) = lead.tombstone.as_ref().map_or((None, None), |t| {
            (Some(t.merged_into.as_str()), Some(t.at.timestamp_micros()))
        });
        conn.execute(
            "INSERT INTO leads (
                lead_id, name, phone, phone_digits, status,
                salesperson_id, salesperson_name, unit_id, unit_name,
                therapist_id, therapist_name, converted, conversion_date,
                negotiated_value, contact_attempts, origin, created_at_us,
                merged_into, tombstoned_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(lead_id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                phone_digits = excluded.phone_digits,
                status = excluded.status,
                salesperson_id = excluded.salesperson_id,
                salesperson_name = excluded.salesperson_name,
                unit_id = excluded.unit_id,
                unit_name = excluded.unit_name,
                therapist_id = excluded.therapist_id,
                therapist_name = excluded.therapist_name,
                converted = excluded.converted,
                conversion_date = excluded.conversion_date,
                negotiated_value = excluded.negotiated_value,
                contact_attempts = excluded.contact_attempts,
                origin = excluded.origin,
                merged_into = excluded.merged_into,
                tombstoned_at_us = excluded.tombstoned_at_us",
            params![
                lead.id.as_str(),
                lead.name,
                lead.phone,
                identity::normalize(&lead.phone),
                lead.status.as_str(),
                lead.salesperson_id,
                lead.salesperson_name,
                lead.unit_id,
                lead.unit_name,
                lead.therapist_id,
                lead.therapist_name,
                lead.converted,
                lead.conversion_date.map(|d| d.to_string()),
                lead.negotiated_value,
                i64::from(lead.contact_attempts),
                lead.origin,
                lead.created_at.timestamp_micros(),
                merged_into,
                tombstoned_at_us,
            ],
        )?;
        Ok(())
    }
}

impl EntityStore for SqliteStore {
    fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let conn = self.lock();
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY rowid");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], appointment_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            let (mut appt, date) = row?;
            appt.date = date
                .as_deref()
                .map(parse_date)
                .transpose()
                .map_err(|reason| StoreError::Corrupt {
                    entity: "appointment",
                    id: appt.id.clone(),
                    reason,
                })?;
            out.push(appt);
        }
        Ok(out)
    }

    fn list_leads(&self) -> Result<Vec<Lead>, StoreError> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY rowid");
        Self::query_leads(&self.lock(), &sql, Vec::new())
    }

    fn filter_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError> {
        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();

        if !filter.include_tombstoned {
            sql.push_str(" AND tombstoned_at_us IS NULL");
        }
        if let Some(ref digits) = filter.phone_digits {
            values.push(Value::Text(digits.clone()));
            let _ = write!(sql, " AND phone_digits = ?{}", values.len());
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            let _ = write!(sql, " AND status = ?{}", values.len());
        }
        if let Some(ref origin) = filter.origin {
            values.push(Value::Text(origin.clone()));
            let _ = write!(sql, " AND origin = ?{}", values.len());
        }

        sql.push_str(match filter.sort {
            LeadSort::CreatedAsc => " ORDER BY created_at_us ASC, lead_id ASC",
            LeadSort::CreatedDesc => " ORDER BY created_at_us DESC, lead_id ASC",
        });

        if filter.limit.is_some() || filter.offset.is_some() {
            let limit = filter
                .limit
                .and_then(|l| i64::try_from(l).ok())
                .unwrap_or(-1);
            let offset = filter
                .offset
                .and_then(|o| i64::try_from(o).ok())
                .unwrap_or(0);
            values.push(Value::Integer(limit));
            let _ = write!(sql, " LIMIT ?{}", values.len());
            values.push(Value::Integer(offset));
            let _ = write!(sql, " OFFSET ?{}", values.len());
        }

        Self::query_leads(&self.lock(), &sql, values)
    }

    fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        Self::fetch_lead(&self.lock(), id.as_str())
    }

    fn create_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let created = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let id = Self::next_lead_id(&tx)?;
            let mut created = lead.into_lead(id, Utc::now());
            truncate_to_micros(&mut created);
            Self::write_lead(&tx, &created)?;
            tx.commit()?;
            created
        };
        self.subscribers.notify(&LeadEvent::Created(created.clone()));
        Ok(created)
    }

    fn update_lead(&self, id: &LeadId, patch: &LeadPatch) -> Result<Lead, StoreError> {
        let updated = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let mut lead =
                Self::fetch_lead(&tx, id.as_str())?.ok_or_else(|| StoreError::lead_not_found(id))?;
            lead.apply(patch);
            truncate_to_micros(&mut lead);
            Self::write_lead(&tx, &lead)?;
            tx.commit()?;
            lead
        };
        self.subscribers.notify(&LeadEvent::Updated(updated.clone()));
        Ok(updated)
    }

    fn delete_lead(&self, id: &LeadId) -> Result<(), StoreError> {
        let removed = self
            .lock()
            .execute("DELETE FROM leads WHERE lead_id = ?1", [id.as_str()])?;
        if removed == 0 {
            return Err(StoreError::lead_not_found(id));
        }
        self.subscribers.notify(&LeadEvent::Deleted(id.clone()));
        Ok(())
    }

    fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO appointments (
                appointment_id, kind, client_name, client_phone,
                salesperson_id, salesperson_name, unit_id, unit_name,
                professional_id, professional_name, appointment_date, agreed_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                appointment.id,
                appointment.kind.as_str(),
                appointment.client_name,
                appointment.client_phone,
                appointment.salesperson_id,
                appointment.salesperson_name,
                appointment.unit_id,
                appointment.unit_name,
                appointment.professional_id,
                appointment.professional_name,
                appointment.date.map(|d| d.to_string()),
                appointment.agreed_value,
            ],
        )?;
        Ok(())
    }

    fn subscribe_leads(&self, callback: LeadCallback) -> Subscription {
        self.subscribers.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeadStatus;
    use chrono::TimeZone;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open in-memory store")
    }

    fn new_lead(phone: &str, created_secs: Option<i64>) -> NewLead {
        NewLead {
            name: "Clara".into(),
            phone: phone.into(),
            created_at: created_secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            ..NewLead::default()
        }
    }

    #[test]
    fn create_and_read_back() {
        let store = store();
        let created = store
            .create_lead(NewLead {
                conversion_date: NaiveDate::from_ymd_opt(2024, 3, 5),
                negotiated_value: Some(350.5),
                ..new_lead("(21) 98888-7777", Some(1_000))
            })
            .unwrap();
        assert_eq!(created.id.as_str(), "ld-000001");

        let fetched = store.get_lead(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn filter_by_phone_digits_and_sort() {
        let store = store();
        store.create_lead(new_lead("21 98888-7777", Some(20))).unwrap();
        store.create_lead(new_lead("(21)988887777", Some(10))).unwrap();
        store.create_lead(new_lead("21 90000-0000", Some(5))).unwrap();

        let hits = store
            .filter_leads(&LeadFilter {
                phone_digits: Some("21988887777".into()),
                ..LeadFilter::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].created_at.timestamp(), 10);

        let page = store
            .filter_leads(&LeadFilter {
                sort: LeadSort::CreatedDesc,
                limit: Some(1),
                offset: Some(1),
                ..LeadFilter::default()
            })
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].created_at.timestamp(), 10);
    }

    #[test]
    fn tombstoned_leads_hidden_by_default() {
        let store = store();
        let keep = store.create_lead(new_lead("21988887777", Some(1))).unwrap();
        let gone = store.create_lead(new_lead("21988887777", Some(2))).unwrap();
        store
            .update_lead(
                &gone.id,
                &LeadPatch {
                    tombstone: Some(Tombstone {
                        merged_into: keep.id.clone(),
                        at: Utc.timestamp_opt(3, 0).unwrap(),
                    }),
                    ..LeadPatch::default()
                },
            )
            .unwrap();

        let live = store.filter_leads(&LeadFilter::default()).unwrap();
        assert_eq!(live.len(), 1);
        let all = store
            .filter_leads(&LeadFilter {
                include_tombstoned: true,
                ..LeadFilter::default()
            })
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all[1].tombstone.as_ref().map(|t| t.merged_into.clone()),
            Some(keep.id)
        );
    }

    #[test]
    fn update_keeps_created_at_and_identity() {
        let store = store();
        let lead = store.create_lead(new_lead("21988887777", Some(42))).unwrap();
        let updated = store
            .update_lead(&lead.id, &LeadPatch::status(LeadStatus::TherapeuticPlan))
            .unwrap();
        assert_eq!(updated.created_at.timestamp(), 42);
        assert_eq!(updated.status, LeadStatus::TherapeuticPlan);
        assert_eq!(updated.phone, "21988887777");
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let store = store();
        let err = store.delete_lead(&LeadId::new("ld-999999")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn appointments_round_trip_with_dates() {
        let store = store();
        let appt = Appointment {
            id: "ag-1".into(),
            kind: AppointmentKind::OneOff,
            client_name: "Bia".into(),
            client_phone: "11987654321".into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1),
            agreed_value: Some(120.0),
            ..Appointment::default()
        };
        store.insert_appointment(&appt).unwrap();
        assert_eq!(store.list_appointments().unwrap(), vec![appt]);
    }

    #[test]
    fn sync_run_timestamp_is_recorded() {
        let store = store();
        assert!(store.last_sync_run().unwrap().is_none());
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        store.record_sync_run(at).unwrap();
        assert_eq!(store.last_sync_run().unwrap(), Some(at));
    }
}
