//! Typed views of the few responses the client itself interprets.
//!
//! # Design
//! Resource payloads are the server's contract and pass through as
//! `serde_json::Value`. Only the shapes the client reads (the id returned by
//! create calls and the version report used by `up_to_date`) get structs.

use serde::{Deserialize, Serialize};

/// Body returned by every create call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedResource {
    pub id: u64,
}

/// Response of `version.json` and `version/check_latest.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub version_date: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub latest_version_date: Option<String>,
}

impl VersionInfo {
    /// True when the server reports its own version as the latest one.
    pub fn is_up_to_date(&self) -> bool {
        self.latest_version.as_deref() == Some(self.version.as_str())
    }
}
