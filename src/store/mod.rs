//! Email record storage.
//!
//! One record per send attempt, inserted after the outcome is known and
//! never mutated. Deletion and clearing exist for external administrative
//! surfaces; the mailer itself only ever appends.

mod sqlite;

pub use sqlite::SqliteStore;

use std::sync::RwLock;

use crate::errors::MailResult;
use crate::types::EmailRecord;

/// Storage for email records.
///
/// Implementations must tolerate concurrent inserts; records are insert-only
/// so no further coordination is required.
pub trait EmailStore: Send + Sync {
    /// Persists a record.
    fn save(&self, record: &EmailRecord) -> MailResult<()>;

    /// Returns all records, newest first.
    fn list(&self) -> MailResult<Vec<EmailRecord>>;

    /// Returns a record by id.
    fn get(&self, id: &str) -> MailResult<Option<EmailRecord>>;

    /// Removes a record by id. Returns true if found and removed.
    fn delete(&self, id: &str) -> MailResult<bool>;

    /// Removes all records.
    fn clear(&self) -> MailResult<()>;
}

/// In-memory record store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<EmailRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmailStore for MemoryStore {
    fn save(&self, record: &EmailRecord) -> MailResult<()> {
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }

    fn list(&self) -> MailResult<Vec<EmailRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.iter().rev().cloned().collect())
    }

    fn get(&self, id: &str) -> MailResult<Option<EmailRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    fn delete(&self, id: &str) -> MailResult<bool> {
        let mut records = self.records.write().unwrap();
        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        records.remove(pos);
        Ok(true)
    }

    fn clear(&self) -> MailResult<()> {
        self.records.write().unwrap().clear();
        Ok(())
    }
}
