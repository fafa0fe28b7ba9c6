use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StarlinxError};

/// Column headers of the CSV file sink, in write order.
pub const CSV_HEADERS: [&str; 8] = [
    "timestamp",
    "name",
    "document",
    "phone",
    "email",
    "city",
    "vehicle_type",
    "client_ip",
];

/// Timestamp layout used in the CSV file and the embedded database.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Longest accepted value for any single form field, in characters.
pub const MAX_FIELD_CHARS: usize = 256;

// =============================================================================
// Registration record
// =============================================================================

/// A validated driver registration.
///
/// There is no natural key: two identical submissions are two records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Local wall-clock time of the submission, second precision.
    pub created_at: NaiveDateTime,
    pub name: String,
    pub document: String,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub vehicle_type: Option<String>,
    /// Submitter address as seen by the presentation layer.
    pub client_ip: Option<String>,
}

impl Registration {
    /// `created_at` rendered as `YYYY-MM-DDTHH:MM:SS`.
    pub fn timestamp(&self) -> String {
        self.created_at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Field values in `CSV_HEADERS` order; absent optionals become "".
    pub fn csv_fields(&self) -> [String; 8] {
        [
            self.timestamp(),
            self.name.clone(),
            self.document.clone(),
            self.phone.clone(),
            self.email.clone().unwrap_or_default(),
            self.city.clone().unwrap_or_default(),
            self.vehicle_type.clone().unwrap_or_default(),
            self.client_ip.clone().unwrap_or_default(),
        ]
    }
}

/// Raw, unvalidated submission as received from the form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
}

impl NewRegistration {
    /// Convenience constructor for the three required fields.
    pub fn new(
        name: impl Into<String>,
        document: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }

    /// Trim, check and timestamp the submission.
    ///
    /// `now` is truncated to whole seconds.
    pub fn validate(self, now: NaiveDateTime) -> Result<Registration> {
        let created_at = now.with_nanosecond(0).unwrap_or(now);
        Ok(Registration {
            created_at,
            name: required("name", &self.name)?,
            document: required("document", &self.document)?,
            phone: required("phone", &self.phone)?,
            email: optional("email", self.email.as_deref())?,
            city: optional("city", self.city.as_deref())?,
            vehicle_type: optional("vehicle_type", self.vehicle_type.as_deref())?,
            client_ip: optional("client_ip", self.client_ip.as_deref())?,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StarlinxError::invalid(field, "must not be empty"));
    }
    bounded(field, value)
}

fn optional(field: &str, value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => bounded(field, v).map(Some),
    }
}

fn bounded(field: &str, value: &str) -> Result<String> {
    if value.chars().count() > MAX_FIELD_CHARS {
        return Err(StarlinxError::invalid(
            field,
            format!("longer than {} characters", MAX_FIELD_CHARS),
        ));
    }
    Ok(value.to_string())
}
