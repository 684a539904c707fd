//! Bucket resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object versioning settings of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Versioning {
    #[serde(default)]
    pub enabled: bool,
}

/// Bucket metadata as returned by the JSON API.
///
/// Some emulator releases emit `Name`/`ID` instead of `name`/`id`; both are
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning: Option<Versioning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Bucket {
    /// Creates a bucket resource suitable for an insert request.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets versioning on the resource.
    pub fn with_versioning(mut self, enabled: bool) -> Self {
        self.versioning = Some(Versioning { enabled });
        self
    }

    /// Returns whether object versioning is enabled.
    pub fn versioning_enabled(&self) -> bool {
        self.versioning.map(|v| v.enabled).unwrap_or(false)
    }

    /// Returns the `gs://` URL of the bucket.
    pub fn gs_url(&self) -> String {
        format!("gs://{}", self.name)
    }
}
