//! Key-value storage for cache snapshots

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::update::clock::Clock;
use crate::update::error::StoreError;

/// Trait for persisting serialized snapshots
///
/// `set` must replace the value atomically: a concurrent `get` sees either
/// the previous value or the new one.
#[cfg_attr(test, automock)]
pub trait SnapshotStore: Send + Sync {
    /// Returns the value for `key` unless it is absent or expired
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, expiring after `ttl`
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

fn expires_at(now_ms: i64, ttl: Duration) -> i64 {
    now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Process-local store
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, i64)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, (String, i64)>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_ms();
        let mut entries = self.lock()?;

        match entries.get(key) {
            Some((value, expires)) if *expires > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires = expires_at(self.clock.now_ms(), ttl);
        self.lock()?
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// SQLite-backed store, survives across runs
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(db_path: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        info!("Initializing snapshot store at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.create_schema()?;

        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }
}

impl SnapshotStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_ms();
        let conn = self.lock_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM snapshots WHERE key = ?1 AND expires_at > ?2",
                (key, now),
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires = expires_at(self.clock.now_ms(), ttl);
        let conn = self.lock_conn()?;

        // Single-statement upsert, readers never see a partial value
        conn.execute(
            r#"
            INSERT INTO snapshots (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
            (key, value, expires),
        )?;

        debug!("Stored snapshot {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM snapshots WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn exercise_store(store: &dyn SnapshotStore, clock: &ManualClock) {
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "one", Duration::from_secs(10)).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("one".to_string()));

        store.set("k", "two", Duration::from_secs(10)).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("two".to_string()));

        clock.advance(10_000);
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "three", Duration::from_secs(10)).unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn memory_store_replaces_expires_and_deletes() {
        let clock = Arc::new(ManualClock(AtomicI64::new(1_000)));
        let store = MemoryStore::new(clock.clone());

        exercise_store(&store, &clock);
    }

    #[test]
    fn sqlite_store_replaces_expires_and_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock(AtomicI64::new(1_000)));
        let store = SqliteStore::new(&temp_dir.path().join("test.db"), clock.clone()).unwrap();

        exercise_store(&store, &clock);
    }

    #[test]
    fn sqlite_store_persists_across_connections() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let clock = Arc::new(ManualClock(AtomicI64::new(1_000)));

        SqliteStore::new(&db_path, clock.clone())
            .unwrap()
            .set("k", "kept", Duration::from_secs(60))
            .unwrap();

        let reopened = SqliteStore::new(&db_path, clock).unwrap();
        assert_eq!(reopened.get("k").unwrap(), Some("kept".to_string()));
    }
}
