//! Escrow storage model types.

use crate::error::EscrowError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bookkeeping flag an operator flips on a key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    #[default]
    Secured,
    Unsecured,
}

impl KeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secured => "secured",
            Self::Unsecured => "unsecured",
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyState {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secured" => Ok(Self::Secured),
            "unsecured" => Ok(Self::Unsecured),
            _ => Err(EscrowError::invalid_state()),
        }
    }
}

impl ToSql for KeyState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for KeyState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: EscrowError| FromSqlError::Other(Box::new(e)))
    }
}

/// One escrowed key entry, as persisted and as returned over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: String,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub os_info: Option<String>,
    pub username: Option<String>,
    pub encryption_key: Option<String>,
    pub state: KeyState,
    pub sent_at: String,
}

impl KeyRecord {
    /// Column list matching the field order read by [`KeyRecord::from_row`].
    pub(crate) const COLUMNS: &'static str =
        "id, hostname, ip_address, mac_address, os_info, username, encryption_key, state, sent_at";

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            hostname: row.get(1)?,
            ip_address: row.get(2)?,
            mac_address: row.get(3)?,
            os_info: row.get(4)?,
            username: row.get(5)?,
            encryption_key: row.get(6)?,
            state: row.get(7)?,
            sent_at: row.get(8)?,
        })
    }
}

/// Fields supplied by a submitting device. `id` and `sent_at` are assigned
/// by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewKeyRecord {
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub os_info: Option<String>,
    pub username: Option<String>,
    pub encryption_key: Option<String>,
    pub state: Option<KeyState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!("secured".parse::<KeyState>().unwrap(), KeyState::Secured);
        assert_eq!("unsecured".parse::<KeyState>().unwrap(), KeyState::Unsecured);

        for bad in ["", "Secured", "SECURED", "locked", " secured"] {
            assert!(matches!(
                bad.parse::<KeyState>(),
                Err(EscrowError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_state_defaults_to_secured() {
        assert_eq!(KeyState::default(), KeyState::Secured);
    }

    #[test]
    fn test_record_json_shape() {
        let record = KeyRecord {
            id: "abc".to_string(),
            hostname: Some("host1".to_string()),
            ip_address: None,
            mac_address: None,
            os_info: None,
            username: Some("alice".to_string()),
            encryption_key: Some("ABC123".to_string()),
            state: KeyState::Unsecured,
            sent_at: "2024-05-01T12:00:00.000Z".to_string(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "unsecured");
        assert_eq!(json["hostname"], "host1");
        assert!(json["ip_address"].is_null());
        assert_eq!(json["sent_at"], "2024-05-01T12:00:00.000Z");
    }
}
