use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// External settings keys shared with the companion UI surface. The
/// engine only reads `biasDetectionEnabled` to initialize the Enabled
/// Flag; the rest belong to the companion surface.
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const SENSITIVITY: &str = "sensitivity";
    pub const SHOW_NOTIFICATIONS: &str = "showNotifications";
    pub const BIAS_DETECTION_ENABLED: &str = "biasDetectionEnabled";
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.seed_defaults()?;
        Ok(store)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("storage: read setting {key}"))?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now()],
        )
        .with_context(|| format!("storage: write setting {key}"))?;
        Ok(())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(match self.get_setting(key)? {
            Some(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "True"),
            None => default,
        })
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_setting(key, if value { "true" } else { "false" })
    }

    /// Install-time defaults, written only for keys not present yet.
    fn seed_defaults(&self) -> Result<()> {
        for (key, value) in [
            (keys::ENABLED, "true"),
            (keys::SENSITIVITY, "medium"),
            (keys::SHOW_NOTIFICATIONS, "true"),
            (keys::BIAS_DETECTION_ENABLED, "true"),
        ] {
            if self.get_setting(key)?.is_none() {
                self.set_setting(key, value)?;
            }
        }
        Ok(())
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
    .context("storage: run migrations")?;
    Ok(())
}

fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("echobreak").join("settings.db"))
}
