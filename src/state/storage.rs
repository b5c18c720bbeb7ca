use rusqlite::{Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::StorageError;

/// Synchronous string-keyed key/value store.
///
/// `read_item` separates a missing key (`Ok(None)`) from a backend that
/// could not be read. `get_item` is the tolerant form: both yield `None`.
/// Each `set_item` is a single write that replaces the whole value.
pub trait LocalStorage {
    fn read_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn get_item(&self, key: &str) -> Option<String> {
        match self.read_item(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "failed to read local storage, treating as empty");
                None
            }
        }
    }
}

impl<T: LocalStorage + ?Sized> LocalStorage for Box<T> {
    fn read_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }
}

impl<T: LocalStorage + ?Sized> LocalStorage for &T {
    fn read_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }
}

/// SQLite-backed store living in the user's data directory.
pub struct SqliteStorage {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Open (or create) the store at `db_path`, creating parent directories.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let storage = SqliteStorage {
            conn,
            db_path: db_path.to_path_buf(),
        };
        storage.init_schema()?;

        info!(path = %db_path.display(), "local storage opened");
        Ok(storage)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let storage = SqliteStorage {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl LocalStorage for SqliteStorage {
    fn read_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn read_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Memory store whose reads or writes can be made to fail
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_reads: std::cell::Cell<bool>,
    pub fail_writes: std::cell::Cell<bool>,
}

#[cfg(test)]
impl LocalStorage for FlakyStorage {
    fn read_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.get() {
            return Err(StorageError::Io(std::io::Error::other("disk I/O error")));
        }
        self.inner.read_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Io(std::io::Error::other("database is locked")));
        }
        self.inner.set_item(key, value)
    }
}
