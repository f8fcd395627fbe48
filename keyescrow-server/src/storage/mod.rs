//! SQLite storage backend for escrowed key records.

pub mod models;

use crate::error::EscrowError;
use chrono::{DateTime, SecondsFormat, Utc};
use models::{KeyRecord, KeyState, NewKeyRecord};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Thread-safe key record storage.
///
/// Every operation takes the connection lock for a single statement, so
/// each one acts atomically on at most one row or reads the whole table.
#[derive(Clone)]
pub struct KeyStorage {
    conn: Arc<Mutex<Connection>>,
}

impl KeyStorage {
    pub fn open(path: &Path) -> Result<Self, EscrowError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, EscrowError> {
        let conn = Connection::open_in_memory()?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&self) -> Result<(), EscrowError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS key_records (
                id TEXT PRIMARY KEY,
                hostname TEXT,
                ip_address TEXT,
                mac_address TEXT,
                os_info TEXT,
                username TEXT,
                encryption_key TEXT,
                state TEXT NOT NULL DEFAULT 'secured'
                    CHECK (state IN ('secured', 'unsecured')),
                sent_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_key_records_sent_at
                ON key_records(sent_at);
            CREATE INDEX IF NOT EXISTS idx_key_records_username
                ON key_records(username, sent_at);

            CREATE TRIGGER IF NOT EXISTS key_records_only_state_mutable
                BEFORE UPDATE OF id, hostname, ip_address, mac_address, os_info,
                    username, encryption_key, sent_at
                ON key_records
            BEGIN
                SELECT RAISE(ABORT, 'only state may change after creation');
            END;",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EscrowError> {
        self.conn
            .lock()
            .map_err(|e| EscrowError::Internal(format!("Lock error: {}", e)))
    }

    /// All records, most recent `sent_at` first.
    pub fn list_all(&self) -> Result<Vec<KeyRecord>, EscrowError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM key_records ORDER BY sent_at DESC, rowid DESC",
            KeyRecord::COLUMNS
        ))?;

        let records = stmt
            .query_map([], KeyRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Records submitted under `username`, most recent `sent_at` first.
    pub fn list_by_owner(&self, username: &str) -> Result<Vec<KeyRecord>, EscrowError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM key_records WHERE username = ?1
             ORDER BY sent_at DESC, rowid DESC",
            KeyRecord::COLUMNS
        ))?;

        let records = stmt
            .query_map([username], KeyRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<KeyRecord, EscrowError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM key_records WHERE id = ?1", KeyRecord::COLUMNS),
            [id],
            KeyRecord::from_row,
        )
        .optional()?
        .ok_or_else(EscrowError::key_not_found)
    }

    pub fn create(&self, new: NewKeyRecord) -> Result<KeyRecord, EscrowError> {
        self.insert(new, Utc::now())
    }

    pub(crate) fn insert(
        &self,
        new: NewKeyRecord,
        sent_at: DateTime<Utc>,
    ) -> Result<KeyRecord, EscrowError> {
        let record = KeyRecord {
            id: Uuid::new_v4().to_string(),
            hostname: new.hostname,
            ip_address: new.ip_address,
            mac_address: new.mac_address,
            os_info: new.os_info,
            username: new.username,
            encryption_key: new.encryption_key,
            state: new.state.unwrap_or_default(),
            sent_at: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO key_records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                KeyRecord::COLUMNS
            ),
            rusqlite::params![
                record.id,
                record.hostname,
                record.ip_address,
                record.mac_address,
                record.os_info,
                record.username,
                record.encryption_key,
                record.state,
                record.sent_at,
            ],
        )?;

        Ok(record)
    }

    /// Replace only the `state` column of one record.
    pub fn update_state(&self, id: &str, state: KeyState) -> Result<KeyRecord, EscrowError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "UPDATE key_records SET state = ?1 WHERE id = ?2 RETURNING {}",
                KeyRecord::COLUMNS
            ),
            rusqlite::params![state, id],
            KeyRecord::from_row,
        )
        .optional()?
        .ok_or_else(EscrowError::key_not_found)
    }

    pub fn delete_by_id(&self, id: &str) -> Result<(), EscrowError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM key_records WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(EscrowError::key_not_found());
        }
        Ok(())
    }

    /// Close the underlying connection. Clones still held elsewhere keep it
    /// open until they drop.
    pub fn close(self) -> Result<(), EscrowError> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|e| EscrowError::Internal(format!("Lock error: {}", e)))?;
                conn.close().map_err(|(_, e)| EscrowError::from(e))
            }
            Err(_) => {
                tracing::warn!("Storage still shared at shutdown, deferring close to drop");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn submission(hostname: &str, username: &str) -> NewKeyRecord {
        NewKeyRecord {
            hostname: Some(hostname.to_string()),
            username: Some(username.to_string()),
            encryption_key: Some(format!("key-for-{}", hostname)),
            ..Default::default()
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_create_assigns_id_and_defaults() {
        let storage = KeyStorage::in_memory().unwrap();
        let record = storage.create(NewKeyRecord::default()).unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(record.state, KeyState::Secured);
        assert_eq!(record.hostname, None);
        assert_eq!(record.encryption_key, None);
        assert!(record.sent_at.ends_with('Z'));
        assert_eq!(storage.get(&record.id).unwrap(), record);
    }

    #[test]
    fn test_create_keeps_supplied_state_and_fields() {
        let storage = KeyStorage::in_memory().unwrap();
        let record = storage
            .create(NewKeyRecord {
                hostname: Some("host1".to_string()),
                ip_address: Some("not an ip".to_string()),
                mac_address: Some("zz:zz".to_string()),
                os_info: Some("Linux 6.8".to_string()),
                username: Some("alice".to_string()),
                encryption_key: Some("  raw\nkey material  ".to_string()),
                state: Some(KeyState::Unsecured),
            })
            .unwrap();

        let stored = storage.get(&record.id).unwrap();
        assert_eq!(stored.state, KeyState::Unsecured);
        assert_eq!(stored.ip_address.as_deref(), Some("not an ip"));
        assert_eq!(stored.mac_address.as_deref(), Some("zz:zz"));
        assert_eq!(
            stored.encryption_key.as_deref(),
            Some("  raw\nkey material  ")
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let storage = KeyStorage::in_memory().unwrap();
        let mut ids: Vec<String> = (0..50)
            .map(|i| storage.create(submission(&format!("h{}", i), "u")).unwrap().id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_list_all_empty() {
        let storage = KeyStorage::in_memory().unwrap();
        assert!(storage.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_list_all_newest_first() {
        let storage = KeyStorage::in_memory().unwrap();
        let start = base_time();
        let created: Vec<KeyRecord> = (0..5)
            .map(|i| {
                storage
                    .insert(
                        submission(&format!("host{}", i), "alice"),
                        start + Duration::seconds(i),
                    )
                    .unwrap()
            })
            .collect();

        let listed = storage.list_all().unwrap();
        let expected: Vec<KeyRecord> = created.into_iter().rev().collect();
        assert_eq!(listed, expected);
        assert!(listed.windows(2).all(|w| w[0].sent_at > w[1].sent_at));
    }

    #[test]
    fn test_list_all_orders_by_timestamp_not_insertion() {
        let storage = KeyStorage::in_memory().unwrap();
        let later = storage
            .insert(submission("later", "a"), base_time() + Duration::hours(1))
            .unwrap();
        let earlier = storage.insert(submission("earlier", "a"), base_time()).unwrap();

        let listed = storage.list_all().unwrap();
        assert_eq!(listed[0].id, later.id);
        assert_eq!(listed[1].id, earlier.id);
    }

    #[test]
    fn test_same_timestamp_lists_latest_insert_first() {
        let storage = KeyStorage::in_memory().unwrap();
        let first = storage.insert(submission("a", "u"), base_time()).unwrap();
        let second = storage.insert(submission("b", "u"), base_time()).unwrap();

        let listed = storage.list_all().unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_list_by_owner_filters() {
        let storage = KeyStorage::in_memory().unwrap();
        let a1 = storage.insert(submission("h1", "alice"), base_time()).unwrap();
        storage
            .insert(submission("h2", "bob"), base_time() + Duration::seconds(1))
            .unwrap();
        let a2 = storage
            .insert(submission("h3", "alice"), base_time() + Duration::seconds(2))
            .unwrap();
        storage.create(NewKeyRecord::default()).unwrap();

        let alice = storage.list_by_owner("alice").unwrap();
        assert_eq!(alice, vec![a2, a1]);
        assert!(storage.list_by_owner("carol").unwrap().is_empty());
        assert!(storage.list_by_owner("").unwrap().is_empty());
    }

    #[test]
    fn test_update_state_touches_only_state() {
        let storage = KeyStorage::in_memory().unwrap();
        let original = storage.create(submission("host1", "alice")).unwrap();

        let updated = storage
            .update_state(&original.id, KeyState::Unsecured)
            .unwrap();
        assert_eq!(updated.state, KeyState::Unsecured);
        assert_eq!(
            KeyRecord {
                state: KeyState::Secured,
                ..updated.clone()
            },
            original
        );
        assert_eq!(storage.get(&original.id).unwrap(), updated);
    }

    #[test]
    fn test_update_state_is_idempotent() {
        let storage = KeyStorage::in_memory().unwrap();
        let original = storage.create(submission("host1", "alice")).unwrap();

        let once = storage
            .update_state(&original.id, KeyState::Unsecured)
            .unwrap();
        let twice = storage
            .update_state(&original.id, KeyState::Unsecured)
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_update_state_unknown_id() {
        let storage = KeyStorage::in_memory().unwrap();
        let result = storage.update_state("missing", KeyState::Secured);
        assert!(matches!(result, Err(EscrowError::NotFound(_))));
    }

    #[test]
    fn test_delete_then_not_found() {
        let storage = KeyStorage::in_memory().unwrap();
        let record = storage.create(submission("host1", "alice")).unwrap();
        let other = storage.create(submission("host2", "alice")).unwrap();

        storage.delete_by_id(&record.id).unwrap();
        assert!(matches!(
            storage.get(&record.id),
            Err(EscrowError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete_by_id(&record.id),
            Err(EscrowError::NotFound(_))
        ));
        assert!(matches!(
            storage.update_state(&record.id, KeyState::Secured),
            Err(EscrowError::NotFound(_))
        ));
        assert_eq!(storage.list_all().unwrap(), vec![other]);
    }

    #[test]
    fn test_schema_rejects_other_column_updates() {
        let storage = KeyStorage::in_memory().unwrap();
        let record = storage.create(submission("host1", "alice")).unwrap();

        let conn = storage.conn().unwrap();
        for column in ["hostname", "encryption_key", "sent_at", "id"] {
            let result = conn.execute(
                &format!("UPDATE key_records SET {} = 'x' WHERE id = ?1", column),
                [&record.id],
            );
            assert!(result.is_err(), "{} update should abort", column);
        }
        let result = conn.execute(
            "UPDATE key_records SET state = 'revoked' WHERE id = ?1",
            [&record.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escrow.db");

        let storage = KeyStorage::open(&path).unwrap();
        let record = storage.create(submission("host1", "alice")).unwrap();
        storage.update_state(&record.id, KeyState::Unsecured).unwrap();
        storage.close().unwrap();

        let reopened = KeyStorage::open(&path).unwrap();
        let stored = reopened.get(&record.id).unwrap();
        assert_eq!(stored.state, KeyState::Unsecured);
        assert_eq!(stored.sent_at, record.sent_at);
    }

    #[test]
    fn test_close_while_shared_is_ok() {
        let storage = KeyStorage::in_memory().unwrap();
        let clone = storage.clone();
        storage.close().unwrap();
        assert!(clone.list_all().unwrap().is_empty());
    }
}
