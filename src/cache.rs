//! Local component cache: SQLite for catalog payloads, plain files for
//! 3D model blobs.
//!
//! Entries go stale after the retention window and are evicted lazily, the
//! next time someone asks for them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::easyeda::models::{ComponentData, ModelData};
use crate::error::CacheError;

const DB_FILE: &str = "components.db";
const MODELS_DIR: &str = "models";
const SEARCH_HISTORY_LIMIT: i64 = 50;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub bytes_on_disk: u64,
}

pub struct CacheStore {
    conn: Mutex<Connection>,
    dir: PathBuf,
    retention: Duration,
}

impl CacheStore {
    pub fn open(dir: &Path) -> CacheResult<Self> {
        Self::with_retention(dir, Duration::days(DEFAULT_RETENTION_DAYS))
    }

    pub fn with_retention(dir: &Path, retention: Duration) -> CacheResult<Self> {
        fs::create_dir_all(dir.join(MODELS_DIR))?;
        let conn = Connection::open(dir.join(DB_FILE))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS components (
                 lcsc_id TEXT PRIMARY KEY,
                 payload TEXT NOT NULL,
                 cached_at INTEGER NOT NULL,
                 last_accessed INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS search_history (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 query TEXT NOT NULL,
                 searched_at INTEGER NOT NULL
             );",
        )?;

        log::debug!("Opened component cache at {}", dir.display());
        Ok(Self { conn: Mutex::new(conn), dir: dir.to_path_buf(), retention })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, cached_at: i64, now: DateTime<Utc>) -> bool {
        now.timestamp() - cached_at > self.retention.num_seconds()
    }

    pub fn get(&self, lcsc_id: &str) -> CacheResult<Option<ComponentData>> {
        self.get_at(lcsc_id, Utc::now())
    }

    /// Cached payload for `lcsc_id` as seen at `now`. Stale rows are deleted
    /// and reported as a miss.
    pub fn get_at(&self, lcsc_id: &str, now: DateTime<Utc>) -> CacheResult<Option<ComponentData>> {
        let row: Option<(String, i64)> = self.conn()
            .query_row(
                "SELECT payload, cached_at FROM components WHERE lcsc_id = ?1",
                params![lcsc_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, cached_at)) = row else {
            log::debug!("Cache miss: {}", lcsc_id);
            return Ok(None);
        };

        if self.is_stale(cached_at, now) {
            log::info!("Cache entry for {} expired, evicting", lcsc_id);
            self.delete(lcsc_id)?;
            return Ok(None);
        }

        match serde_json::from_str::<ComponentData>(&payload) {
            Ok(component) => {
                self.conn().execute(
                    "UPDATE components SET last_accessed = ?1 WHERE lcsc_id = ?2",
                    params![now.timestamp(), lcsc_id],
                )?;
                log::debug!("Cache hit: {}", lcsc_id);
                Ok(Some(component))
            }
            Err(e) => {
                log::warn!("Discarding unreadable cache entry for {}: {}", lcsc_id, e);
                self.delete(lcsc_id)?;
                Ok(None)
            }
        }
    }

    pub fn put(&self, component: &ComponentData) -> CacheResult<()> {
        self.put_at(component, Utc::now())
    }

    /// Stores the whole payload, replacing any previous row.
    pub fn put_at(&self, component: &ComponentData, now: DateTime<Utc>) -> CacheResult<()> {
        let payload = serde_json::to_string(component)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO components (lcsc_id, payload, cached_at, last_accessed)
             VALUES (?1, ?2, ?3, ?3)",
            params![component.lcsc_id, payload, now.timestamp()],
        )?;
        log::debug!("Cached {}", component.lcsc_id);
        Ok(())
    }

    /// Removes the row and its model blobs. Returns whether a row existed.
    pub fn delete(&self, lcsc_id: &str) -> CacheResult<bool> {
        let removed = self.conn().execute("DELETE FROM components WHERE lcsc_id = ?1", params![lcsc_id])?;
        self.remove_model_files(lcsc_id)?;
        Ok(removed > 0)
    }

    pub fn clear_expired(&self) -> CacheResult<usize> {
        self.clear_expired_at(Utc::now())
    }

    pub fn clear_expired_at(&self, now: DateTime<Utc>) -> CacheResult<usize> {
        let cutoff = now.timestamp() - self.retention.num_seconds();
        let expired: Vec<String> = {
            let conn = self.conn();
            let mut stmt = conn.prepare("SELECT lcsc_id FROM components WHERE cached_at < ?1")?;
            let ids = stmt.query_map(params![cutoff], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            ids
        };
        for id in &expired {
            self.delete(id)?;
        }
        if !expired.is_empty() {
            log::info!("Removed {} expired cache entries", expired.len());
        }
        Ok(expired.len())
    }

    pub fn clear_all(&self) -> CacheResult<usize> {
        let removed = self.conn().execute("DELETE FROM components", [])?;
        let models = self.dir.join(MODELS_DIR);
        if models.exists() {
            fs::remove_dir_all(&models)?;
        }
        fs::create_dir_all(&models)?;
        log::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> CacheResult<CacheStats> {
        let cutoff = now.timestamp() - self.retention.num_seconds();
        let (total, expired): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN cached_at < ?1 THEN 1 ELSE 0 END), 0) FROM components",
            params![cutoff],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut bytes_on_disk = 0;
        for entry in fs::read_dir(&self.dir)?.chain(fs::read_dir(self.dir.join(MODELS_DIR))?) {
            let metadata = entry?.metadata()?;
            if metadata.is_file() {
                bytes_on_disk += metadata.len();
            }
        }

        Ok(CacheStats { total: total as usize, expired: expired as usize, bytes_on_disk })
    }

    fn model_path(&self, lcsc_id: &str, extension: &str) -> PathBuf {
        self.dir.join(MODELS_DIR).join(format!("{}.{}", lcsc_id, extension))
    }

    pub fn save_model(&self, lcsc_id: &str, model: &ModelData) -> CacheResult<()> {
        if let Some(step) = &model.step {
            fs::write(self.model_path(lcsc_id, "step"), step)?;
        }
        if let Some(obj) = &model.obj {
            fs::write(self.model_path(lcsc_id, "obj"), obj)?;
        }
        Ok(())
    }

    pub fn model(&self, lcsc_id: &str) -> CacheResult<Option<ModelData>> {
        self.model_at(lcsc_id, Utc::now())
    }

    /// Model blobs share their component row's lifetime: without a fresh row
    /// they are a miss.
    pub fn model_at(&self, lcsc_id: &str, now: DateTime<Utc>) -> CacheResult<Option<ModelData>> {
        let cached_at: Option<i64> = self.conn()
            .query_row(
                "SELECT cached_at FROM components WHERE lcsc_id = ?1",
                params![lcsc_id],
                |row| row.get(0),
            )
            .optional()?;
        match cached_at {
            Some(at) if !self.is_stale(at, now) => {}
            _ => return Ok(None),
        }

        let step_path = self.model_path(lcsc_id, "step");
        let obj_path = self.model_path(lcsc_id, "obj");
        let model = ModelData {
            step: step_path.exists().then(|| fs::read(&step_path)).transpose()?,
            obj: obj_path.exists().then(|| fs::read_to_string(&obj_path)).transpose()?,
        };
        Ok((!model.is_empty()).then_some(model))
    }

    fn remove_model_files(&self, lcsc_id: &str) -> CacheResult<()> {
        for extension in ["step", "obj"] {
            let path = self.model_path(lcsc_id, extension);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn add_search_history(&self, query: &str) -> CacheResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO search_history (query, searched_at) VALUES (?1, ?2)",
            params![query, Utc::now().timestamp()],
        )?;
        conn.execute(
            "DELETE FROM search_history WHERE id NOT IN
                 (SELECT id FROM search_history ORDER BY id DESC LIMIT ?1)",
            params![SEARCH_HISTORY_LIMIT],
        )?;
        Ok(())
    }

    /// Most recent first.
    pub fn search_history(&self, limit: usize) -> CacheResult<Vec<(String, DateTime<Utc>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT query, searched_at FROM search_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (query, at) = row?;
            let at = Utc.timestamp_opt(at, 0).single().unwrap_or_default();
            history.push((query, at));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easyeda::models::Part;

    fn component(id: &str) -> ComponentData {
        ComponentData {
            lcsc_id: id.to_string(),
            title: "NE555".to_string(),
            description: String::new(),
            manufacturer: "TI".to_string(),
            datasheet: String::new(),
            jlc_id: String::new(),
            symbol: Part::Absent,
            footprint: Part::Absent,
            model_3d: Part::Absent,
        }
    }

    #[test]
    fn hit_then_stale_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let t0 = Utc::now();
        cache.put_at(&component("C46749"), t0).unwrap();

        let hit = cache.get_at("C46749", t0 + Duration::days(6)).unwrap();
        assert_eq!(hit.map(|c| c.title), Some("NE555".to_string()));

        assert!(cache.get_at("C46749", t0 + Duration::days(8)).unwrap().is_none());
        // Evicted, so even an earlier clock no longer sees it.
        assert!(cache.get_at("C46749", t0).unwrap().is_none());
    }

    #[test]
    fn put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let mut c = component("C1");
        cache.put(&c).unwrap();
        c.title = "NE556".to_string();
        cache.put(&c).unwrap();
        assert_eq!(cache.get("C1").unwrap().unwrap().title, "NE556");
        assert_eq!(cache.stats().unwrap().total, 1);
    }

    #[test]
    fn models_follow_row_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let model = ModelData { step: Some(b"ISO-10303-21;".to_vec()), obj: None };

        cache.save_model("C2", &model).unwrap();
        assert!(cache.model("C2").unwrap().is_none(), "no row yet");

        let t0 = Utc::now();
        cache.put_at(&component("C2"), t0).unwrap();
        assert_eq!(cache.model_at("C2", t0).unwrap(), Some(model));
        assert!(cache.model_at("C2", t0 + Duration::days(30)).unwrap().is_none());

        cache.delete("C2").unwrap();
        assert!(!dir.path().join("models/C2.step").exists());
    }

    #[test]
    fn clear_expired_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let now = Utc::now();
        cache.put_at(&component("C1"), now - Duration::days(10)).unwrap();
        cache.put_at(&component("C2"), now).unwrap();

        let stats = cache.stats_at(now).unwrap();
        assert_eq!((stats.total, stats.expired), (2, 1));
        assert!(stats.bytes_on_disk > 0);

        assert_eq!(cache.clear_expired_at(now).unwrap(), 1);
        assert_eq!(cache.clear_all().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().total, 0);
    }

    #[test]
    fn search_history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        for i in 0..60 {
            cache.add_search_history(&format!("q{}", i)).unwrap();
        }
        let history = cache.search_history(100).unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history[0].0, "q59");
    }
}
