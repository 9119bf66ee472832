//! Durable record of which component went into which category.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::kicad::sexpr;
use crate::library::atomic::{self, Journal};

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRef {
    /// Library file, relative to the library root.
    pub library: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub lcsc_id: String,
    pub category: String,
    pub name: String,
    pub title: String,
    pub manufacturer: String,
    pub fingerprint: String,
    pub imported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub symbol: Option<SymbolRef>,
    pub footprint: Option<PathBuf>,
    #[serde(default)]
    pub models: Vec<PathBuf>,
}

impl ManifestEntry {
    fn artifact_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.symbol.iter().map(|s| &s.library).chain(self.footprint.iter()).chain(self.models.iter())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip)]
    root: PathBuf,
    version: u32,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let mut manifest = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Manifest>(&content)
                .map_err(|source| LibraryError::StateFile { path: path.clone(), source })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Manifest { root: PathBuf::new(), version: MANIFEST_VERSION, entries: Vec::new() }
            }
            Err(source) => return Err(LibraryError::ReadFailure { path, source }.into()),
        };
        manifest.root = root.to_path_buf();
        Ok(manifest)
    }

    fn path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|source| LibraryError::StateFile { path: self.path(), source }.into())
    }

    fn save(&self, journal: &mut Journal) -> Result<()> {
        let json = self.to_json()?;
        journal.write(&self.path(), json.as_bytes())
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn lookup(&self, lcsc_id: &str, category: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.lcsc_id == lcsc_id && e.category == category)
    }

    pub fn entries_for(&self, lcsc_id: &str) -> Vec<&ManifestEntry> {
        self.entries.iter().filter(|e| e.lcsc_id == lcsc_id).collect()
    }

    pub fn entries_in(&self, category: &str) -> Vec<&ManifestEntry> {
        self.entries.iter().filter(|e| e.category == category).collect()
    }

    /// Inserts or replaces the entry for (component, category) and saves.
    /// Every referenced artifact must already be on disk.
    pub fn record(&mut self, entry: ManifestEntry, journal: &mut Journal) -> Result<()> {
        if let Some(missing) = entry.artifact_files().find(|p| !self.root.join(p).exists()) {
            return Err(LibraryError::ManifestInconsistency(format!(
                "{} in '{}' references missing {}",
                entry.lcsc_id,
                entry.category,
                missing.display()
            ))
            .into());
        }

        match self.entries.iter_mut().find(|e| e.lcsc_id == entry.lcsc_id && e.category == entry.category) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.save(journal)
    }

    pub fn remove(&mut self, lcsc_id: &str, category: &str, journal: &mut Journal) -> Result<Option<ManifestEntry>> {
        let Some(index) = self.entries.iter().position(|e| e.lcsc_id == lcsc_id && e.category == category) else {
            return Ok(None);
        };
        let removed = self.entries.remove(index);
        self.save(journal)?;
        Ok(Some(removed))
    }

    /// Drops entries whose artifacts vanished from disk and saves if anything
    /// changed. Libraries that cannot be read or parsed keep their entries.
    pub fn reconcile(&mut self) -> Result<Vec<ManifestEntry>> {
        let mut symbol_names: HashMap<PathBuf, Option<Vec<String>>> = HashMap::new();
        let root = self.root.clone();

        let (kept, removed): (Vec<ManifestEntry>, Vec<ManifestEntry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| {
                let files_present = entry.footprint.iter().chain(entry.models.iter())
                    .all(|p| root.join(p).exists());
                let symbol_present = entry.symbol.as_ref().is_none_or(|symbol| {
                    let names = symbol_names.entry(symbol.library.clone())
                        .or_insert_with(|| library_symbols(&root.join(&symbol.library)));
                    match names {
                        Some(names) => names.contains(&symbol.name),
                        None => root.join(&symbol.library).exists(),
                    }
                });
                files_present && symbol_present
            });
        self.entries = kept;

        for entry in &removed {
            log::warn!(
                "Removing manifest entry {} in '{}': artifacts missing on disk",
                entry.lcsc_id,
                entry.category
            );
        }
        if !removed.is_empty() {
            atomic::write_atomic(&self.path(), self.to_json()?.as_bytes())?;
        }
        Ok(removed)
    }
}

/// Symbol names in a library, or `None` when it cannot be read or parsed.
fn library_symbols(path: &Path) -> Option<Vec<String>> {
    let content = fs::read_to_string(path).ok()?;
    match sexpr::parse(&content) {
        Ok(root) => Some(sexpr::entries(&root, "symbol").into_iter().map(|e| e.name).collect()),
        Err(e) => {
            log::warn!("Skipping symbol check for {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, category: &str) -> ManifestEntry {
        let now = Utc::now();
        ManifestEntry {
            lcsc_id: id.to_string(),
            category: category.to_string(),
            name: format!("NE555_{}", id),
            title: "NE555".to_string(),
            manufacturer: "TI".to_string(),
            fingerprint: "abc".to_string(),
            imported_at: now,
            updated_at: now,
            symbol: Some(SymbolRef { library: PathBuf::from(format!("{}.kicad_sym", category)), name: format!("NE555_{}", id) }),
            footprint: Some(PathBuf::from(format!("{}.pretty/NE555_{}.kicad_mod", category, id))),
            models: vec![],
        }
    }

    fn write_artifacts(root: &Path, e: &ManifestEntry) {
        let symbol = e.symbol.as_ref().unwrap();
        fs::write(
            root.join(&symbol.library),
            format!("(kicad_symbol_lib (version 20241209) (symbol \"{}\"))", symbol.name),
        )
        .unwrap();
        let footprint = root.join(e.footprint.as_ref().unwrap());
        fs::create_dir_all(footprint.parent().unwrap()).unwrap();
        fs::write(footprint, "(footprint \"x\")").unwrap();
    }

    #[test]
    fn record_requires_artifacts_and_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        let e = entry("C1", "misc");

        let mut journal = Journal::new();
        assert!(manifest.record(e.clone(), &mut journal).is_err());

        write_artifacts(dir.path(), &e);
        manifest.record(e.clone(), &mut journal).unwrap();
        let mut updated = e.clone();
        updated.fingerprint = "def".to_string();
        manifest.record(updated, &mut journal).unwrap();
        journal.commit();

        let reloaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(reloaded.entries().len(), 1);
        assert_eq!(reloaded.lookup("C1", "misc").unwrap().fingerprint, "def");
        assert!(reloaded.lookup("C1", "mcu").is_none());
    }

    #[test]
    fn reconcile_drops_entries_with_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::load(dir.path()).unwrap();
        let a = entry("C1", "misc");
        let b = entry("C2", "mcu");
        write_artifacts(dir.path(), &a);
        write_artifacts(dir.path(), &b);

        let mut journal = Journal::new();
        manifest.record(a, &mut journal).unwrap();
        manifest.record(b.clone(), &mut journal).unwrap();
        journal.commit();

        fs::remove_file(dir.path().join(b.footprint.as_ref().unwrap())).unwrap();
        let removed = manifest.reconcile().unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].lcsc_id, "C2");
        assert_eq!(Manifest::load(dir.path()).unwrap().entries().len(), 1);

        // Nothing left to remove, nothing written.
        assert!(manifest.reconcile().unwrap().is_empty());
    }
}
