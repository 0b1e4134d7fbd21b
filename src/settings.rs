//! SQLite-backed settings store
//!
//! One row per setting in a key/value table. Writes are best-effort: a
//! failure is logged and reported as `false`, never raised to the session.

use crate::session::{SettingField, SettingsStore, StoredSettings};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create settings directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Thread-safe settings database handle
#[derive(Clone)]
pub struct SqliteSettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettingsStore {
    /// Open or create the store at the given path, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SettingsResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SettingsResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, field: SettingField) -> SettingsResult<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![field.key()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, field: SettingField, value: &str) -> SettingsResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![field.key(), value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Every known setting; unparseable temperatures read as absent
    pub fn read_all(&self) -> SettingsResult<StoredSettings> {
        Ok(StoredSettings {
            temperature: self
                .get(SettingField::Temperature)?
                .and_then(|t| t.trim().parse::<f64>().ok())
                .filter(|t| t.is_finite()),
            system_prompt: self.get(SettingField::SystemPrompt)?,
            provider: self.get(SettingField::Provider)?,
            model: self.get(SettingField::Model)?,
        })
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn load(&self) -> Result<StoredSettings, String> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read_all())
            .await
            .map_err(|e| format!("Settings task failed: {e}"))?
            .map_err(|e| e.to_string())
    }

    async fn save(&self, field: SettingField, value: &str) -> bool {
        let store = self.clone();
        let value = value.to_string();
        let result = tokio::task::spawn_blocking(move || store.set(field, &value)).await;
        match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(%field, error = %e, "Failed to save setting");
                false
            }
            Err(e) => {
                tracing::warn!(%field, error = %e, "Settings task failed");
                false
            }
        }
    }
}
