use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::session::{SessionStore, USER_EMAIL_KEY, USER_NAME_KEY, USER_PREFERENCES_KEY};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open session database at {}", path.display()))?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    // --- Key/value operations ---

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM session WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to read session value '{}'", key))
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Session operations ---

    pub fn store_login(&self, email: &str, name: &str, preferences: &serde_json::Value) -> Result<()> {
        let preferences = if preferences.is_null() {
            "{}".to_string()
        } else {
            preferences.to_string()
        };
        self.set_value(USER_EMAIL_KEY, email)?;
        self.set_value(USER_NAME_KEY, name)?;
        self.set_value(USER_PREFERENCES_KEY, &preferences)?;
        Ok(())
    }

    pub fn user_name(&self) -> Result<Option<String>> {
        self.get_value(USER_NAME_KEY)
    }

    pub fn clear_session(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM session WHERE key IN (?1, ?2, ?3)",
            params![USER_EMAIL_KEY, USER_NAME_KEY, USER_PREFERENCES_KEY],
        )?;
        Ok(removed)
    }
}

impl SessionStore for Database {
    fn user_email(&self) -> Option<String> {
        match self.get_value(USER_EMAIL_KEY) {
            Ok(email) => email.filter(|e| !e.trim().is_empty()),
            Err(e) => {
                warn!("Treating session as signed out: {:#}", e);
                None
            }
        }
    }
}
