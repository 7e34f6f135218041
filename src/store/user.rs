//! User directory entries and presence

use serde::{Deserialize, Serialize};

/// Presence status of a directory user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// User currently connected
    Online,
    /// User not connected
    Offline,
}

impl Default for Presence {
    fn default() -> Self {
        Self::Offline
    }
}

/// A user directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// User identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact info (email or similar), if the directory exposes it
    pub contact: Option<String>,
    /// Current presence
    #[serde(default)]
    pub presence: Presence,
    /// Role tag (e.g., "manager", "employee")
    pub role: Option<String>,
}

impl DirectoryUser {
    /// Create a directory entry with just an id and name
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            contact: None,
            presence: Presence::Offline,
            role: None,
        }
    }
}
