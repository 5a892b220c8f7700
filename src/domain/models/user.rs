//! Users, profiles and the records commands write about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user, keyed by DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub did: String,
    pub handle: String,
    pub name: String,
    /// Names this user has held or been granted besides `name`.
    #[serde(default)]
    pub alternates: Vec<String>,
    pub pds: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Value of a user attribute addressed by name in condition arguments.
    pub fn field(&self, field: &str) -> Option<&str> {
        match field {
            "did" => Some(&self.did),
            "handle" => Some(&self.handle),
            "name" => Some(&self.name),
            "pds" | "server" => self.pds.as_deref(),
            _ => None,
        }
    }
}

/// Fields required to insert a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub did: String,
    pub handle: String,
    pub name: String,
    pub pds: Option<String>,
}

/// Profile returned by the identity network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// An idempotently-keyed timeline ("canon") entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub did: String,
    pub key: String,
    pub entry_type: String,
    pub text: String,
    pub uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TimelineEntry {
    pub fn new(
        did: impl Into<String>,
        key: impl Into<String>,
        entry_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            key: key.into(),
            entry_type: entry_type.into(),
            text: text.into(),
            uri: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_uri(mut self, uri: Option<String>) -> Self {
        self.uri = uri;
        self
    }
}

/// Result of trying to claim a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameClaim {
    /// The name was free and now belongs to the claimant.
    Claimed,
    /// The claimant already owned it.
    AlreadyOwned,
    /// Someone else owns it.
    TakenBy(String),
}

/// Normalize free text into a display-name candidate: the first word,
/// lowercased, alphanumerics only.
pub fn normalize_name(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .find(|word| !word.is_empty())
        .map(|word| word.chars().take(32).collect())
}

/// Name derived from a handle, used when a proposed name is unavailable.
pub fn name_from_handle(handle: &str) -> String {
    normalize_name(handle.split('.').next().unwrap_or(handle)).unwrap_or_else(|| handle.to_string())
}
