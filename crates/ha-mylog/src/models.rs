//! Request types sent to the MyLog API

use serde::{Deserialize, Serialize};

use crate::coerce;

/// Log entry severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Log entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Draft,
    Active,
    Archived,
}

/// A single log entry
///
/// Every field is optional. Absent fields are left out of the JSON body
/// entirely rather than sent as null. Deserialization is lenient in the way
/// service data needs: numeric strings, `"on"`/`"off"` flags and numbers in
/// text fields are converted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntryRequest {
    #[serde(
        default,
        deserialize_with = "coerce::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "coerce::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<String>,
    /// Classification by name
    #[serde(
        default,
        deserialize_with = "coerce::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub type_name: Option<String>,
    /// Classification by numeric id
    #[serde(
        default,
        deserialize_with = "coerce::type_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub type_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// 0 to 100
    #[serde(
        default,
        deserialize_with = "coerce::priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// A lone value is accepted as a one-tag list
    #[serde(
        default,
        deserialize_with = "coerce::strings",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "coerce::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub location_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "coerce::latitude",
        skip_serializing_if = "Option::is_none"
    )]
    pub location_lat: Option<f64>,
    #[serde(
        default,
        deserialize_with = "coerce::longitude",
        skip_serializing_if = "Option::is_none"
    )]
    pub location_lng: Option<f64>,
    /// Passed through as given
    #[serde(
        default,
        deserialize_with = "coerce::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub occurred_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "coerce::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_favourite: Option<bool>,
    #[serde(
        default,
        deserialize_with = "coerce::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_starred: Option<bool>,
    #[serde(
        default,
        deserialize_with = "coerce::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_pinned: Option<bool>,
    #[serde(
        default,
        deserialize_with = "coerce::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_public: Option<bool>,
    #[serde(
        default,
        deserialize_with = "coerce::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub external_ref_id: Option<String>,
}

impl LogEntryRequest {
    /// Fill in severity `info` and priority `0` where the caller gave none
    pub fn with_defaults(mut self) -> Self {
        self.severity.get_or_insert(Severity::Info);
        self.priority.get_or_insert(0);
        self
    }
}
