//! SQLite-backed email record storage.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::EmailStore;
use crate::errors::{MailError, MailResult};
use crate::types::EmailRecord;

/// SQLite-backed store with one insert-only `emails` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates or opens a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> MailResult<Self> {
        let conn = Connection::open(path).map_err(sql_error)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                body_html TEXT NOT NULL,
                state TEXT NOT NULL,
                headers TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_emails_created ON emails(created_at);
            ",
        )
        .map_err(sql_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            subject: row.get(1)?,
            sender: row.get(2)?,
            recipient: row.get(3)?,
            body_html: row.get(4)?,
            state: row.get(5)?,
            headers: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Row image before the state/headers/timestamp columns are decoded.
struct RawRecord {
    id: String,
    subject: String,
    sender: String,
    recipient: String,
    body_html: String,
    state: String,
    headers: String,
    created_at: String,
}

impl RawRecord {
    fn decode(self) -> MailResult<EmailRecord> {
        let state = self.state.parse()?;
        let headers: Vec<(String, String)> = serde_json::from_str(&self.headers)
            .map_err(|e| MailError::store(format!("Corrupt header snapshot: {}", e)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| MailError::store(format!("Corrupt timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(EmailRecord {
            id: self.id,
            subject: self.subject,
            sender: self.sender,
            recipient: self.recipient,
            body_html: self.body_html,
            state,
            headers,
            created_at,
        })
    }
}

fn sql_error(e: rusqlite::Error) -> MailError {
    MailError::store("SQLite operation failed").with_cause(e)
}

const SELECT_COLUMNS: &str =
    "SELECT id, subject, sender, recipient, body_html, state, headers, created_at FROM emails";

impl EmailStore for SqliteStore {
    fn save(&self, record: &EmailRecord) -> MailResult<()> {
        let conn = self.conn.lock().unwrap();

        let headers = serde_json::to_string(&record.headers)
            .map_err(|e| MailError::store(format!("Header snapshot serialization: {}", e)))?;

        conn.execute(
            "INSERT INTO emails (id, subject, sender, recipient, body_html, state, headers, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.subject,
                record.sender,
                record.recipient,
                record.body_html,
                record.state.as_str(),
                headers,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(sql_error)?;

        Ok(())
    }

    fn list(&self) -> MailResult<Vec<EmailRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY created_at DESC", SELECT_COLUMNS))
            .map_err(sql_error)?;

        let raw: Vec<RawRecord> = stmt
            .query_map([], Self::row_to_record)
            .map_err(sql_error)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_error)?;

        raw.into_iter().map(RawRecord::decode).collect()
    }

    fn get(&self, id: &str) -> MailResult<Option<EmailRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .map_err(sql_error)?;

        match stmt.query_row(params![id], Self::row_to_record) {
            Ok(raw) => Ok(Some(raw.decode()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_error(e)),
        }
    }

    fn delete(&self, id: &str) -> MailResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute("DELETE FROM emails WHERE id = ?", params![id])
            .map_err(sql_error)?;
        Ok(removed > 0)
    }

    fn clear(&self) -> MailResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM emails", []).map_err(sql_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryState;

    fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("emails.db")).unwrap();
        (dir, store)
    }

    fn record(subject: &str, state: DeliveryState) -> EmailRecord {
        EmailRecord::new(
            subject,
            "noreply@example.com",
            "a@example.com, b@example.com",
            "<p>body</p>",
            state,
            vec![
                ("From".to_string(), "Site <noreply@example.com>".to_string()),
                ("Subject".to_string(), subject.to_string()),
            ],
        )
    }

    #[test]
    fn test_round_trip() {
        let (_dir, store) = open_temp();
        let rec = record("hello", DeliveryState::Failed);
        store.save(&rec).unwrap();

        let loaded = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(loaded.subject, "hello");
        assert_eq!(loaded.state, DeliveryState::Failed);
        assert_eq!(loaded.recipient, "a@example.com, b@example.com");
        assert_eq!(loaded.headers, rec.headers);
        assert_eq!(loaded.created_at, rec.created_at);
    }

    #[test]
    fn test_list_and_delete() {
        let (_dir, store) = open_temp();
        let first = record("first", DeliveryState::Success);
        let second = record("second", DeliveryState::Stopped);
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.list().unwrap().len(), 2);

        assert!(store.delete(&first.id).unwrap());
        assert!(!store.delete(&first.id).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (_dir, store) = open_temp();
        let rec = record("dup", DeliveryState::Success);
        store.save(&rec).unwrap();
        assert!(store.save(&rec).is_err());
    }
}
