//! Category-partitioned KiCad libraries under one root directory.
//!
//! Lock order is category library, then the shared model folder, then the
//! state lock guarding `categories.json`, `manifest.json` and
//! `model_overrides.json`. Journals that touched state files are committed
//! or rolled back while the state lock is still held.

pub mod atomic;
pub mod category;
pub mod manifest;
pub mod placement;
pub mod store;

pub use atomic::Journal;
pub use category::{sanitize_category, Category, CategoryRegistry, DEFAULT_CATEGORY};
pub use manifest::{Manifest, ManifestEntry, SymbolRef};
pub use placement::{compute_defaults, ModelOverrides, ModelTransform};
pub use store::{LibraryStore, Merge, MergeOutcome, MODELS_DIR};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::converter::{component_name, Converter};
use crate::easyeda::models::{ComponentData, FootprintData, Part};
use crate::error::{EasyedaError, LibraryError, Result};
use crate::kicad::lib_table::{self, TableKind};
use crate::kicad::{Ki3dModel, KiFootprint, KiSymbol, LibraryFormat};
use store::acquire;

/// Environment variable KiCad resolves model paths against.
pub const MODEL_PATH_VAR: &str = "LCSC_GRABBER_3D";

/// How footprints reference their 3D model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelPathStyle {
    /// `${LCSC_GRABBER_3D}/<ID>.step`
    #[default]
    Variable,
    Absolute,
}

/// Converted output of one component, ready to merge.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub lcsc_id: String,
    pub category: String,
    pub name: String,
    pub title: String,
    pub manufacturer: String,
    pub symbol: Option<KiSymbol>,
    pub footprint: Option<KiFootprint>,
    /// `(extension, bytes)` for the shared model folder.
    pub models: Vec<(&'static str, Vec<u8>)>,
    /// Saved as the component's placement override.
    pub transform: Option<ModelTransform>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Installed {
    pub category: String,
    pub outcome: MergeOutcome,
    pub symbol: Option<MergeOutcome>,
    pub footprint: Option<MergeOutcome>,
    pub models: Vec<MergeOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registration {
    pub symbol_libs: Vec<String>,
    pub footprint_libs: Vec<String>,
    pub path_variable_set: bool,
}

fn finish<T>(journal: Journal, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            journal.commit();
            Ok(value)
        }
        Err(e) => {
            journal.rollback();
            Err(e)
        }
    }
}

pub struct LibraryManager {
    store: LibraryStore,
    models_lock: Mutex<()>,
    state_lock: Mutex<()>,
    model_paths: ModelPathStyle,
    converter: Converter,
}

impl LibraryManager {
    /// Opens (creating if needed) the library at `root` and reconciles the
    /// manifest against what is on disk.
    pub fn open(root: &Path, format: LibraryFormat) -> Result<Self> {
        let store = LibraryStore::new(root, format)?;
        let models = store.models_dir();
        fs::create_dir_all(&models).map_err(|source| LibraryError::WriteFailure { path: models, source })?;

        let manager = Self {
            store,
            models_lock: Mutex::new(()),
            state_lock: Mutex::new(()),
            model_paths: ModelPathStyle::default(),
            converter: Converter::new(),
        };
        manager.ensure_category(DEFAULT_CATEGORY)?;
        let removed = manager.reconcile()?;
        log::info!(
            "Opened library {} ({} stale manifest entries removed)",
            manager.root().display(),
            removed.len()
        );
        Ok(manager)
    }

    pub fn with_model_paths(mut self, style: ModelPathStyle) -> Self {
        self.model_paths = style;
        self
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn format(&self) -> LibraryFormat {
        self.store.format()
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    /// Creates the category's files and registry entry if missing.
    pub fn ensure_category(&self, name: &str) -> Result<Category> {
        let category = Category::new(name);
        let lock = self.store.category_lock(&category.id);
        let _category_guard = acquire(&lock);
        let mut journal = Journal::new();
        self.store.create_category_files(&mut journal, &category.id)?;

        let _state = acquire(&self.state_lock);
        let result = self.register_category(&mut journal, category);
        finish(journal, result)
    }

    fn register_category(&self, journal: &mut Journal, category: Category) -> Result<Category> {
        let mut registry = CategoryRegistry::load(self.root())?;
        if let Some(existing) = registry.get(&category.id) {
            return Ok(existing.clone());
        }
        registry.insert(category.clone());
        registry.save(journal)?;
        Ok(category)
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        let _state = acquire(&self.state_lock);
        Ok(CategoryRegistry::load(self.root())?.list().to_vec())
    }

    /// Removes a category, moving its components to the default category
    /// first. Returns the ids that were moved.
    pub fn remove_category(&self, name: &str) -> Result<Vec<String>> {
        let id = category::sanitize_category(name);
        if id == DEFAULT_CATEGORY {
            return Err(LibraryError::CannotRemoveDefault(id).into());
        }
        let entries: Vec<ManifestEntry> = {
            let _state = acquire(&self.state_lock);
            if !CategoryRegistry::load(self.root())?.contains(&id) {
                return Err(LibraryError::CategoryNotFound(id).into());
            }
            Manifest::load(self.root())?.entries_in(&id).into_iter().cloned().collect()
        };

        let mut moved = Vec::new();
        for entry in entries {
            self.move_component(&entry.lcsc_id, &id, DEFAULT_CATEGORY)?;
            moved.push(entry.lcsc_id);
        }

        let lock = self.store.category_lock(&id);
        let _category_guard = acquire(&lock);
        let mut journal = Journal::new();
        journal.remove_file(&self.store.symbol_lib_path(&id))?;

        let _state = acquire(&self.state_lock);
        let result = CategoryRegistry::load(self.root()).and_then(|mut registry| {
            registry.remove(&id)?;
            registry.save(&mut journal)
        });
        finish(journal, result)?;

        let footprints = self.store.footprint_dir(&id);
        if let Err(e) = fs::remove_dir(&footprints) {
            log::warn!("Leaving {} in place: {}", footprints.display(), e);
        }
        log::info!("Removed category '{}' ({} components moved to '{}')", id, moved.len(), DEFAULT_CATEGORY);
        Ok(moved)
    }

    /// Placement for a component's model: the stored override, else the
    /// heuristic default for its pads.
    pub fn model_reference(
        &self,
        lcsc_id: &str,
        footprint: &KiFootprint,
        extension: &str,
        transform: Option<ModelTransform>,
    ) -> Result<Ki3dModel> {
        let transform = match transform {
            Some(transform) => transform,
            None => {
                let _state = acquire(&self.state_lock);
                ModelOverrides::load(self.root())?
                    .get(lcsc_id)
                    .copied()
                    .unwrap_or_else(|| compute_defaults(&footprint.pads))
            }
        };
        let path = match self.model_paths {
            ModelPathStyle::Variable => format!("${{{}}}/{}.{}", MODEL_PATH_VAR, lcsc_id, extension),
            ModelPathStyle::Absolute => self.store.model_path(lcsc_id, extension).display().to_string(),
        };
        Ok(Ki3dModel { path, offset: transform.offset, scale: transform.scale, rotate: transform.rotation })
    }

    /// Merges converted artifacts into their category and records the import.
    /// Either everything lands or nothing does.
    pub fn install(&self, artifacts: &Artifacts, cancel: &CancelToken) -> Result<Installed> {
        let category = Category::new(&artifacts.category);
        let lock = self.store.category_lock(&category.id);
        let _category_guard = acquire(&lock);
        let mut journal = Journal::new();

        self.store.create_category_files(&mut journal, &category.id)?;
        let symbol = match &artifacts.symbol {
            Some(symbol) => Some(self.store.merge_symbol(&mut journal, &category.id, symbol)?),
            None => None,
        };
        let footprint = match &artifacts.footprint {
            Some(footprint) => Some(self.store.merge_footprint(&mut journal, &category.id, footprint)?),
            None => None,
        };
        let mut models = Vec::new();
        if !artifacts.models.is_empty() {
            let _models_guard = acquire(&self.models_lock);
            for (extension, bytes) in &artifacts.models {
                models.push(self.store.write_model(&mut journal, &artifacts.lcsc_id, extension, bytes)?);
            }
        }
        cancel.check()?;

        let _state = acquire(&self.state_lock);
        let result = self.record_install(&mut journal, category, artifacts, symbol, footprint, models);
        finish(journal, result)
    }

    fn record_install(
        &self,
        journal: &mut Journal,
        category: Category,
        artifacts: &Artifacts,
        symbol: Option<Merge>,
        footprint: Option<Merge>,
        models: Vec<MergeOutcome>,
    ) -> Result<Installed> {
        let category = self.register_category(journal, category)?;
        if let Some(transform) = artifacts.transform {
            ModelOverrides::load(self.root())?.set(&artifacts.lcsc_id, transform, journal)?;
        }

        let mut manifest = Manifest::load(self.root())?;
        let existing = manifest.lookup(&artifacts.lcsc_id, &category.id).cloned();
        let outcomes: Vec<MergeOutcome> = symbol.iter().map(|m| m.outcome)
            .chain(footprint.iter().map(|m| m.outcome))
            .chain(models.iter().copied())
            .collect();
        let all_duplicates = !outcomes.is_empty() && outcomes.iter().all(|o| *o == MergeOutcome::SkippedDuplicate);

        let outcome = match &existing {
            Some(_) if all_duplicates => MergeOutcome::SkippedDuplicate,
            Some(_) => MergeOutcome::Updated,
            None => MergeOutcome::Added,
        };

        if outcome != MergeOutcome::SkippedDuplicate {
            let fingerprint = content_fingerprint(
                symbol.iter().chain(footprint.iter()).map(|m| m.fingerprint.as_str()),
                artifacts.models.iter().map(|(_, bytes)| bytes.as_slice()),
            );

            let now = Utc::now();
            let entry = ManifestEntry {
                lcsc_id: artifacts.lcsc_id.clone(),
                category: category.id.clone(),
                name: artifacts.name.clone(),
                title: artifacts.title.clone(),
                manufacturer: artifacts.manufacturer.clone(),
                fingerprint,
                imported_at: existing.as_ref().map(|e| e.imported_at).unwrap_or(now),
                updated_at: now,
                symbol: artifacts.symbol.as_ref()
                    .map(|s| SymbolRef {
                        library: self.store.relative(&self.store.symbol_lib_path(&category.id)),
                        name: s.name.clone(),
                    })
                    .or_else(|| existing.as_ref().and_then(|e| e.symbol.clone())),
                footprint: artifacts.footprint.as_ref()
                    .map(|f| self.store.relative(&self.store.footprint_path(&category.id, &f.name)))
                    .or_else(|| existing.as_ref().and_then(|e| e.footprint.clone())),
                models: if artifacts.models.is_empty() {
                    existing.as_ref().map(|e| e.models.clone()).unwrap_or_default()
                } else {
                    artifacts.models.iter()
                        .map(|(ext, _)| self.store.relative(&self.store.model_path(&artifacts.lcsc_id, ext)))
                        .collect()
                },
            };
            manifest.record(entry, journal)?;
        }

        log::info!("{} in '{}': {}", artifacts.lcsc_id, category.id, outcome);
        Ok(Installed {
            category: category.id,
            outcome,
            symbol: symbol.map(|m| m.outcome),
            footprint: footprint.map(|m| m.outcome),
            models,
        })
    }

    /// Manifest entries, optionally limited to one category.
    pub fn list(&self, category: Option<&str>) -> Result<Vec<ManifestEntry>> {
        let _state = acquire(&self.state_lock);
        let manifest = Manifest::load(self.root())?;
        Ok(match category {
            Some(category) => manifest.entries_in(&sanitize_category(category)).into_iter().cloned().collect(),
            None => manifest.entries().to_vec(),
        })
    }

    pub fn lookup(&self, lcsc_id: &str, category: &str) -> Result<Option<ManifestEntry>> {
        let _state = acquire(&self.state_lock);
        Ok(Manifest::load(self.root())?.lookup(lcsc_id, &sanitize_category(category)).cloned())
    }

    pub fn reconcile(&self) -> Result<Vec<ManifestEntry>> {
        let _state = acquire(&self.state_lock);
        Manifest::load(self.root())?.reconcile()
    }

    /// Removes a component from one category, or from all of them. Model
    /// files go away with the last entry referencing them.
    pub fn remove_component(&self, lcsc_id: &str, category: Option<&str>) -> Result<Vec<ManifestEntry>> {
        let targets: Vec<ManifestEntry> = {
            let _state = acquire(&self.state_lock);
            let manifest = Manifest::load(self.root())?;
            match category {
                Some(category) => manifest.lookup(lcsc_id, &sanitize_category(category)).cloned().into_iter().collect(),
                None => manifest.entries_for(lcsc_id).into_iter().cloned().collect(),
            }
        };
        if targets.is_empty() {
            return Err(LibraryError::NotImported {
                id: lcsc_id.to_string(),
                category: category.map(sanitize_category).unwrap_or_else(|| "any category".to_string()),
            }
            .into());
        }

        for entry in &targets {
            self.remove_entry(entry)?;
        }
        Ok(targets)
    }

    fn remove_entry(&self, entry: &ManifestEntry) -> Result<()> {
        let lock = self.store.category_lock(&entry.category);
        let _category_guard = acquire(&lock);
        let mut journal = Journal::new();
        if let Some(symbol) = &entry.symbol {
            self.store.remove_symbol(&mut journal, &entry.category, &symbol.name)?;
        }
        if entry.footprint.is_some() {
            self.store.remove_footprint(&mut journal, &entry.category, &entry.name)?;
        }

        let _models_guard = acquire(&self.models_lock);
        let _state = acquire(&self.state_lock);
        let result = self.forget_entry(&mut journal, entry);
        finish(journal, result)?;
        log::info!("Removed {} from '{}'", entry.lcsc_id, entry.category);
        Ok(())
    }

    fn forget_entry(&self, journal: &mut Journal, entry: &ManifestEntry) -> Result<()> {
        let mut manifest = Manifest::load(self.root())?;
        manifest.remove(&entry.lcsc_id, &entry.category, journal)?;
        if manifest.entries_for(&entry.lcsc_id).is_empty() {
            self.store.remove_models(journal, &entry.lcsc_id)?;
        }
        Ok(())
    }

    /// Whether two categories' symbol libraries share a revision, so entries
    /// can move between them without converting again.
    pub fn same_revision(&self, from: &str, to: &str) -> Result<bool> {
        let from = self.store.symbol_format(&sanitize_category(from))?;
        Ok(from == self.store.symbol_format(&sanitize_category(to))?)
    }

    /// Moves a component's symbol and footprint to another category. Fails
    /// with `FormatMismatch` when the two libraries differ in revision; use
    /// [`LibraryManager::move_converted`] then.
    pub fn move_component(&self, lcsc_id: &str, from: &str, to: &str) -> Result<MergeOutcome> {
        self.move_entry(lcsc_id, from, to, None)
    }

    /// Like [`LibraryManager::move_component`], rendering the artifacts again
    /// from `component` when the target library is on another revision.
    pub fn move_converted(&self, component: &ComponentData, from: &str, to: &str) -> Result<MergeOutcome> {
        self.move_entry(&component.lcsc_id, from, to, Some(component))
    }

    fn move_entry(&self, lcsc_id: &str, from: &str, to: &str, component: Option<&ComponentData>) -> Result<MergeOutcome> {
        let from = sanitize_category(from);
        let target = Category::new(to);
        if from == target.id {
            return Ok(MergeOutcome::SkippedDuplicate);
        }
        let entry = self.lookup(lcsc_id, &from)?
            .ok_or_else(|| LibraryError::NotImported { id: lcsc_id.to_string(), category: from.clone() })?;
        let footprint_ref = match &entry.footprint {
            Some(_) => format!("{}:{}", lib_table::nickname(&target.id), entry.name),
            None => String::new(),
        };

        let mut symbol = None;
        let mut footprint = None;
        if let Some(component) = component {
            if let (Some(stored), Part::Present(data)) = (&entry.symbol, &component.symbol) {
                symbol = Some(self.converter.convert_symbol(component, data, &stored.name, &footprint_ref, &target.id)?);
            }
            if let (Some(_), Part::Present(data)) = (&entry.footprint, &component.footprint) {
                footprint = Some(self.converted_footprint(&component.lcsc_id, data, &entry)?);
            }
        }

        // Two category locks: always take them in name order.
        let (first, second) = if from < target.id { (&from, &target.id) } else { (&target.id, &from) };
        let first_lock = self.store.category_lock(first);
        let second_lock = self.store.category_lock(second);
        let _first_guard = acquire(&first_lock);
        let _second_guard = acquire(&second_lock);

        let mut journal = Journal::new();
        let mut merges = Vec::new();
        self.store.create_category_files(&mut journal, &target.id)?;
        if let Some(stored) = &entry.symbol {
            merges.push(self.store.move_symbol(&mut journal, &from, &target.id, &stored.name, &footprint_ref, symbol.as_ref())?);
        }
        if entry.footprint.is_some() {
            merges.extend(self.store.move_footprint(&mut journal, &from, &target.id, &entry.name, footprint.as_ref())?);
        }
        let models = {
            let _models_guard = acquire(&self.models_lock);
            self.read_models(&entry.models)?
        };
        let fingerprint = content_fingerprint(
            merges.iter().map(|m| m.fingerprint.as_str()),
            models.iter().map(Vec::as_slice),
        );

        let _state = acquire(&self.state_lock);
        let result = self.record_move(&mut journal, ManifestEntry { fingerprint, ..entry }, target);
        finish(journal, result)
    }

    fn record_move(&self, journal: &mut Journal, entry: ManifestEntry, target: Category) -> Result<MergeOutcome> {
        let target = self.register_category(journal, target)?;
        let mut manifest = Manifest::load(self.root())?;
        let outcome = match manifest.lookup(&entry.lcsc_id, &target.id) {
            Some(_) => MergeOutcome::Updated,
            None => MergeOutcome::Added,
        };
        manifest.remove(&entry.lcsc_id, &entry.category, journal)?;

        let from = entry.category.clone();
        let symbol = entry.symbol.as_ref().map(|s| SymbolRef {
            library: self.store.relative(&self.store.symbol_lib_path(&target.id)),
            name: s.name.clone(),
        });
        let footprint = entry.footprint.as_ref()
            .map(|_| self.store.relative(&self.store.footprint_path(&target.id, &entry.name)));
        let moved = ManifestEntry {
            category: target.id.clone(),
            updated_at: Utc::now(),
            symbol,
            footprint,
            ..entry
        };
        log::info!("Moved {} from '{}' to '{}'", moved.lcsc_id, from, target.id);
        manifest.record(moved, journal)?;
        Ok(outcome)
    }

    /// Re-converts the component's footprint and merges it into every
    /// category it is imported into. Returns the categories that changed.
    pub fn regenerate_footprint(&self, component: &ComponentData) -> Result<Vec<String>> {
        let Part::Present(data) = &component.footprint else {
            return Err(EasyedaError::PartialData { id: component.lcsc_id.clone(), missing: vec!["footprint"] }.into());
        };
        let entries: Vec<ManifestEntry> = {
            let _state = acquire(&self.state_lock);
            Manifest::load(self.root())?.entries_for(&component.lcsc_id).into_iter().cloned().collect()
        };
        if entries.is_empty() {
            return Err(LibraryError::NotImported {
                id: component.lcsc_id.clone(),
                category: "any category".to_string(),
            }
            .into());
        }

        let mut changed = Vec::new();
        for entry in entries.into_iter().filter(|e| e.footprint.is_some()) {
            let footprint = self.converted_footprint(&component.lcsc_id, data, &entry)?;

            let lock = self.store.category_lock(&entry.category);
            let _category_guard = acquire(&lock);
            let mut journal = Journal::new();
            let merge = self.store.merge_footprint(&mut journal, &entry.category, &footprint)?;
            if merge.outcome == MergeOutcome::SkippedDuplicate {
                continue;
            }
            let symbol = match &entry.symbol {
                Some(symbol) => self.store.symbol_fingerprint(&entry.category, &symbol.name)?,
                None => None,
            };
            let models = {
                let _models_guard = acquire(&self.models_lock);
                self.read_models(&entry.models)?
            };
            let fingerprint = content_fingerprint(
                symbol.iter().map(String::as_str).chain([merge.fingerprint.as_str()]),
                models.iter().map(Vec::as_slice),
            );

            let _state = acquire(&self.state_lock);
            let result = Manifest::load(self.root()).and_then(|mut manifest| {
                let touched = ManifestEntry { fingerprint, updated_at: Utc::now(), ..entry.clone() };
                manifest.record(touched, &mut journal)
            });
            finish(journal, result)?;
            changed.push(entry.category);
        }
        Ok(changed)
    }

    /// The component's footprint converted again, pointing at its model with
    /// the placement currently in effect.
    fn converted_footprint(&self, lcsc_id: &str, data: &FootprintData, entry: &ManifestEntry) -> Result<KiFootprint> {
        let mut footprint = self.converter.convert_footprint(data, &entry.name)?;
        if let Some(extension) = model_extension(&entry.models) {
            footprint.model_3d = Some(self.model_reference(lcsc_id, &footprint, extension, None)?);
        }
        Ok(footprint)
    }

    fn read_models(&self, models: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
        models.iter()
            .map(|relative| {
                let path = self.root().join(relative);
                fs::read(&path).map_err(|source| LibraryError::ReadFailure { path, source }.into())
            })
            .collect()
    }

    /// Stores a placement override and applies it everywhere the component
    /// is imported.
    pub fn update_model_transform(&self, component: &ComponentData, transform: ModelTransform) -> Result<Vec<String>> {
        {
            let _state = acquire(&self.state_lock);
            let mut journal = Journal::new();
            let result = ModelOverrides::load(self.root())
                .and_then(|mut overrides| overrides.set(&component.lcsc_id, transform, &mut journal));
            finish(journal, result)?;
        }
        self.regenerate_footprint(component)
    }

    /// Drops the override and goes back to the computed placement.
    pub fn reset_auto(&self, component: &ComponentData) -> Result<Vec<String>> {
        {
            let _state = acquire(&self.state_lock);
            let mut journal = Journal::new();
            let result = ModelOverrides::load(self.root())
                .and_then(|mut overrides| overrides.remove(&component.lcsc_id, &mut journal));
            if !finish(journal, result)? {
                log::info!("{} had no placement override", component.lcsc_id);
            }
        }
        self.regenerate_footprint(component)
    }

    /// The placement in effect and whether it is a user override.
    pub fn effective_transform(&self, component: &ComponentData) -> Result<(ModelTransform, bool)> {
        let stored = {
            let _state = acquire(&self.state_lock);
            ModelOverrides::load(self.root())?.get(&component.lcsc_id).copied()
        };
        if let Some(transform) = stored {
            return Ok((transform, true));
        }
        let Part::Present(data) = &component.footprint else {
            return Ok((ModelTransform::default(), false));
        };
        let footprint = self.converter.convert_footprint(data, &component_name(component))?;
        Ok((compute_defaults(&footprint.pads), false))
    }

    /// Adds every category to KiCad's global library tables and points the
    /// model path variable at the shared model folder.
    pub fn register_with_kicad(&self, config_dir: &Path) -> Result<Registration> {
        let categories = self.categories()?;
        let symbol_libs: Vec<(String, PathBuf)> = categories.iter()
            .map(|c| (lib_table::nickname(&c.id), self.store.symbol_lib_path(&c.id)))
            .collect();
        let footprint_libs: Vec<(String, PathBuf)> = categories.iter()
            .map(|c| (lib_table::nickname(&c.id), self.store.footprint_dir(&c.id)))
            .collect();

        Ok(Registration {
            symbol_libs: lib_table::register(
                &config_dir.join(TableKind::Symbol.file_name()),
                TableKind::Symbol,
                &symbol_libs,
            )?,
            footprint_libs: lib_table::register(
                &config_dir.join(TableKind::Footprint.file_name()),
                TableKind::Footprint,
                &footprint_libs,
            )?,
            path_variable_set: lib_table::set_path_variable(
                &config_dir.join("kicad_common.json"),
                MODEL_PATH_VAR,
                &self.store.models_dir(),
            )?,
        })
    }
}

/// SHA-256 over the merged entries' fingerprints followed by the digests of
/// the model files, as stored in the manifest.
fn content_fingerprint<'a>(
    entries: impl IntoIterator<Item = &'a str>,
    models: impl IntoIterator<Item = &'a [u8]>,
) -> String {
    let mut hasher = Sha256::new();
    for fingerprint in entries {
        hasher.update(fingerprint.as_bytes());
    }
    for bytes in models {
        hasher.update(Sha256::digest(bytes));
    }
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

/// STEP is preferred for the footprint reference; VRML otherwise.
fn model_extension(models: &[PathBuf]) -> Option<&'static str> {
    let has = |ext: &str| models.iter().any(|p| p.extension().is_some_and(|e| e == ext));
    if has("step") {
        Some("step")
    } else if has("wrl") {
        Some("wrl")
    } else {
        None
    }
}
