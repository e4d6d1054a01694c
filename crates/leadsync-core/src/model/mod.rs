pub mod appointment;
pub mod lead;

pub use appointment::{Appointment, AppointmentKind};
pub use lead::{Lead, LeadId, LeadPatch, LeadStatus, NewLead, ParseStatusError, Tombstone};
