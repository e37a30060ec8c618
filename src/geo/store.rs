//! Flat persistence for the geolocation cache, keyed by ip.
//! Both backends replace the stored table atomically: a SQLite transaction,
//! or a temp file renamed over the old one.

use super::{GeoResult, GeoStatus};
use crate::config::{CacheBackend, GeoConfig};
use crate::error::{EtlError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const TABLE: &str = "geo_cache";

const COLUMNS: [&str; 12] = [
    "ip",
    "status",
    "message",
    "country",
    "country_code",
    "region",
    "region_name",
    "city",
    "lat",
    "lon",
    "isp",
    "fetched_at",
];

/// Storage collaborator for [`super::GeoCache`].
pub trait CacheStore: Send {
    /// All stored rows. Rows without a usable ip are dropped here.
    fn load(&self) -> Result<Vec<GeoResult>>;
    /// Replace the stored table with `entries`.
    fn save(&self, entries: &[GeoResult]) -> Result<()>;
}

/// Build the configured backend.
pub fn open_store(config: &GeoConfig) -> Result<Box<dyn CacheStore>> {
    if let Some(parent) = config.cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(match config.cache_backend {
        CacheBackend::Sqlite => Box::new(SqliteCacheStore::open(&config.cache_path)?),
        CacheBackend::JsonFile => Box::new(JsonFileCacheStore::new(&config.cache_path)),
    })
}

/// One stored row; every column may be absent in an older or damaged store.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredRow {
    ip: Option<String>,
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
    /// Unix millis
    fetched_at: Option<i64>,
}

impl StoredRow {
    fn from_result(r: &GeoResult) -> Self {
        Self {
            ip: Some(r.ip.clone()),
            status: Some(r.status.as_str().to_string()),
            message: r.message.clone(),
            country: r.country.clone(),
            country_code: r.country_code.clone(),
            region: r.region.clone(),
            region_name: r.region_name.clone(),
            city: r.city.clone(),
            lat: r.lat,
            lon: r.lon,
            isp: r.isp.clone(),
            fetched_at: Some(r.fetched_at.timestamp_millis()),
        }
    }

    fn into_result(self) -> Option<GeoResult> {
        let ip = self.ip.filter(|ip| !ip.is_empty())?;
        let fetched_at = self
            .fetched_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Some(GeoResult {
            ip,
            status: self.status.as_deref().map(GeoStatus::parse).unwrap_or(GeoStatus::Fail),
            message: self.message,
            country: self.country,
            country_code: self.country_code,
            region: self.region,
            region_name: self.region_name,
            city: self.city,
            lat: self.lat,
            lon: self.lon,
            isp: self.isp,
            fetched_at,
        })
    }
}

fn keyed(rows: Vec<StoredRow>, origin: &Path) -> Vec<GeoResult> {
    let total = rows.len();
    let out: Vec<GeoResult> = rows.into_iter().filter_map(StoredRow::into_result).collect();
    if out.len() < total {
        tracing::warn!(
            path = %origin.display(),
            dropped = total - out.len(),
            "cache rows without ip ignored"
        );
    }
    out
}

pub struct SqliteCacheStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open or create the database; the table is created on first save.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// `err` builds the error for the calling operation when the lock is poisoned.
    fn lock(&self, err: fn(String) -> EtlError) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| err("connection lock poisoned".to_string()))
    }

    fn existing_columns(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
        let cols = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cols)
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self) -> Result<Vec<GeoResult>> {
        let conn = self.lock(EtlError::CacheLoad)?;
        let present: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![TABLE],
                |row| row.get(0),
            )
            .optional()?;
        if present.is_none() {
            return Ok(Vec::new());
        }

        let existing = Self::existing_columns(&conn)?;
        if !existing.iter().any(|c| c == "ip") {
            tracing::warn!(path = %self.path.display(), "cache table has no ip column; starting empty");
        }
        // Missing columns are selected as NULL so older layouts still load.
        let select: Vec<String> = COLUMNS
            .iter()
            .map(|c| {
                if existing.iter().any(|e| e == c) {
                    c.to_string()
                } else {
                    format!("NULL AS {c}")
                }
            })
            .collect();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM {TABLE}", select.join(", ")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredRow {
                    ip: row.get(0)?,
                    status: row.get(1)?,
                    message: row.get(2)?,
                    country: row.get(3)?,
                    country_code: row.get(4)?,
                    region: row.get(5)?,
                    region_name: row.get(6)?,
                    city: row.get(7)?,
                    lat: row.get(8)?,
                    lon: row.get(9)?,
                    isp: row.get(10)?,
                    fetched_at: row.get(11)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keyed(rows, &self.path))
    }

    fn save(&self, entries: &[GeoResult]) -> Result<()> {
        let mut conn = self.lock(EtlError::CachePersist)?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS {TABLE};
            CREATE TABLE {TABLE} (
                ip TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                message TEXT,
                country TEXT,
                country_code TEXT,
                region TEXT,
                region_name TEXT,
                city TEXT,
                lat REAL,
                lon REAL,
                isp TEXT,
                fetched_at INTEGER NOT NULL
            );
            "#
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {TABLE} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                COLUMNS.join(", ")
            ))?;
            for e in entries {
                let row = StoredRow::from_result(e);
                stmt.execute(params![
                    row.ip,
                    row.status,
                    row.message,
                    row.country,
                    row.country_code,
                    row.region,
                    row.region_name,
                    row.city,
                    row.lat,
                    row.lon,
                    row.isp,
                    row.fetched_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// JSON array on disk, replaced via rename.
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl CacheStore for JsonFileCacheStore {
    fn load(&self) -> Result<Vec<GeoResult>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<StoredRow> = serde_json::from_str(&data)?;
        Ok(keyed(rows, &self.path))
    }

    fn save(&self, entries: &[GeoResult]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let rows: Vec<StoredRow> = entries.iter().map(StoredRow::from_result).collect();
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, &rows)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| EtlError::CachePersist(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poisoned() -> (tempfile::TempDir, SqliteCacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCacheStore::open(&dir.path().join("geo.db")).unwrap();
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = store.conn.lock().unwrap();
                    panic!("worker died holding the connection");
                })
                .join();
        });
        (dir, store)
    }

    #[test]
    fn poisoned_lock_on_save_is_a_persist_error() {
        let (_dir, store) = poisoned();
        assert!(matches!(store.save(&[]), Err(EtlError::CachePersist(_))));
    }

    #[test]
    fn poisoned_lock_on_load_is_a_load_error() {
        let (_dir, store) = poisoned();
        assert!(matches!(store.load(), Err(EtlError::CacheLoad(_))));
    }
}
