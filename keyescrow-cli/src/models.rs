//! Wire types returned by the escrow server.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    Secured,
    Unsecured,
}

impl KeyState {
    /// The state a toggle moves to. A record with no state reads as
    /// unsecured, so toggling it secures it.
    pub fn toggle_from(current: Option<KeyState>) -> KeyState {
        match current.unwrap_or(KeyState::Unsecured) {
            KeyState::Secured => KeyState::Unsecured,
            KeyState::Unsecured => KeyState::Secured,
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secured => f.write_str("secured"),
            Self::Unsecured => f.write_str("unsecured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub os_info: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub state: Option<KeyState>,
    #[serde(default)]
    pub sent_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageBody {
    pub message: String,
}
