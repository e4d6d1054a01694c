//! SQLite schema for the leadsync store.
//!
//! - `appointments` mirrors the scheduling system's records (read-only to
//!   the engine, written by `import`)
//! - `leads` holds CRM leads; `phone_digits` is the normalized phone kept
//!   beside the raw value so identity lookups stay in SQL
//! - `store_meta` records the schema version and the last sync run

/// Migration v1: appointments, leads, store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS appointments (
    appointment_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    client_name TEXT NOT NULL DEFAULT '',
    client_phone TEXT NOT NULL DEFAULT '',
    salesperson_id TEXT,
    salesperson_name TEXT,
    unit_id TEXT,
    unit_name TEXT,
    professional_id TEXT,
    professional_name TEXT,
    appointment_date TEXT,
    agreed_value REAL
);

CREATE TABLE IF NOT EXISTS leads (
    lead_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    phone_digits TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'lead'
        CHECK (status IN ('lead', 'avulso', 'therapeuticPlan', 'renewal')),
    salesperson_id TEXT,
    salesperson_name TEXT,
    unit_id TEXT,
    unit_name TEXT,
    therapist_id TEXT,
    therapist_name TEXT,
    converted INTEGER NOT NULL DEFAULT 0 CHECK (converted IN (0, 1)),
    conversion_date TEXT,
    negotiated_value REAL,
    contact_attempts INTEGER NOT NULL DEFAULT 0 CHECK (contact_attempts >= 0),
    origin TEXT,
    created_at_us INTEGER NOT NULL,
    CHECK (lead_id LIKE 'ld-%')
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    next_lead_seq INTEGER NOT NULL DEFAULT 0,
    last_sync_at_us INTEGER
);

INSERT OR IGNORE INTO store_meta (id, schema_version, next_lead_seq)
VALUES (1, 0, 0);

CREATE INDEX IF NOT EXISTS idx_leads_phone_digits ON leads(phone_digits);
CREATE INDEX IF NOT EXISTS idx_leads_created ON leads(created_at_us, lead_id);
CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
";

/// Migration v2: tombstones for collapsed duplicates.
pub const MIGRATION_V2_SQL: &str = r"
ALTER TABLE leads ADD COLUMN merged_into TEXT;
ALTER TABLE leads ADD COLUMN tombstoned_at_us INTEGER;

CREATE INDEX IF NOT EXISTS idx_leads_live ON leads(tombstoned_at_us);
";

/// Indexes the current schema must contain.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_leads_phone_digits",
    "idx_leads_created",
    "idx_leads_status",
    "idx_leads_live",
];
