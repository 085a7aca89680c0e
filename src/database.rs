//! Persistence for the URL collection
//!
//! The registry writes its whole collection after every mutation and reads it
//! back once at startup. This module defines the storage seam and two
//! backends: an embedded redb database and an in-memory slot.

use std::sync::{Mutex, PoisonError};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::StorageError;
use crate::model::StorageData;

/// Table holding the serialized collection
///
/// Key: storage slot name as string
/// Value: JSON-serialized StorageData as string
///
/// Example:
/// - Key: "url-shortener-data"
/// - Value: '{"urls":[{"id":"...","shortCode":"abc123",...}],"lastUpdated":"..."}'
pub const TABLE_STORAGE: TableDefinition<&str, &str> = TableDefinition::new("storage_v1");

/// The single slot the collection lives in
pub const STORAGE_KEY: &str = "url-shortener-data";

/// Where the registry keeps its collection between sessions
pub trait Storage: Send + Sync {
    /// Overwrites the stored collection
    fn save(&self, data: &StorageData) -> Result<(), StorageError>;

    /// Reads the stored collection, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<StorageData>, StorageError>;
}

/// Initializes the embedded database and creates the storage table
///
/// This function:
/// 1. Creates or opens the database file at the specified path
/// 2. Opens the storage table so later reads never miss it
/// 3. Commits the transaction to ensure the table is persisted
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "data.db")
///
/// # Example
///
/// ```no_run
/// # use snaplink::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_STORAGE)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Storage backed by a redb database file
pub struct RedbStorage {
    db: Database,
}

impl RedbStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens (or creates) the database at `db_path`
    pub fn open(db_path: &str) -> Result<Self, StorageError> {
        Ok(Self::new(init_db(db_path)?))
    }

    fn write(&self, json: &str) -> Result<(), redb::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE_STORAGE)?;
            table.insert(STORAGE_KEY, json)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read(&self) -> Result<Option<String>, redb::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_STORAGE)?;
        let value = table.get(STORAGE_KEY)?;
        Ok(value.map(|guard| guard.value().to_string()))
    }
}

impl Storage for RedbStorage {
    fn save(&self, data: &StorageData) -> Result<(), StorageError> {
        let json = serde_json::to_string(data)?;
        self.write(&json)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<StorageData>, StorageError> {
        match self.read()? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Storage that keeps the serialized collection in memory
///
/// Goes through the same JSON encoding as [`RedbStorage`], so it behaves the
/// same apart from not surviving the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the slot with raw text, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    /// The raw text currently stored
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, data: &StorageData) -> Result<(), StorageError> {
        let json = serde_json::to_string(data)?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }

    fn load(&self) -> Result<Option<StorageData>, StorageError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}
