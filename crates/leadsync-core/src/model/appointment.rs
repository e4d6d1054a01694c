use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of scheduling record.
///
/// Unknown kinds from the scheduling system deserialize to [`Self::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentKind {
    #[default]
    Consult,
    OneOff,
    BlockingPlaceholder,
    #[serde(other)]
    Other,
}

impl AppointmentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Consult => "consult",
            Self::OneOff => "one-off",
            Self::BlockingPlaceholder => "blocking-placeholder",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clinic session as recorded by the scheduling system. Read-only here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Appointment {
    pub id: String,
    pub kind: AppointmentKind,
    pub client_name: String,
    pub client_phone: String,
    pub salesperson_id: Option<String>,
    pub salesperson_name: Option<String>,
    pub unit_id: Option<String>,
    pub unit_name: Option<String>,
    pub professional_id: Option<String>,
    pub professional_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub agreed_value: Option<f64>,
}

impl Appointment {
    /// A salesperson counts as assigned when either the id or the name is
    /// present and non-blank.
    #[must_use]
    pub fn has_salesperson(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.salesperson_id) || present(&self.salesperson_name)
    }
}
