//! On-disk category libraries: `<cat>.kicad_sym`, `<cat>.pretty/` and the
//! shared model folder.
//!
//! Merges parse the existing file, detect its schema revision, render the
//! incoming artifact in that dialect and splice it in. Unrelated entries are
//! never re-serialized, so their bytes survive untouched.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use serde::Serialize;

use crate::error::{LibraryError, Result};
use crate::kicad::sexpr::{self, Sexpr};
use crate::kicad::{FootprintExporter, KiFootprint, KiSymbol, LibraryFormat, SymbolExporter};
use crate::library::atomic::Journal;

pub const MODELS_DIR: &str = "lcsc_grabber.3dshapes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Added,
    Updated,
    SkippedDuplicate,
}

impl std::fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeOutcome::Added => write!(f, "added"),
            MergeOutcome::Updated => write!(f, "updated"),
            MergeOutcome::SkippedDuplicate => write!(f, "skipped (duplicate)"),
        }
    }
}

/// Result of merging one artifact: what happened and the content fingerprint
/// of the entry now on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    pub outcome: MergeOutcome,
    pub fingerprint: String,
}

pub(crate) fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One mutex per library file, created on first use.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

pub struct LibraryStore {
    root: PathBuf,
    format: LibraryFormat,
    locks: LockRegistry,
}

impl LibraryStore {
    /// `format` is used for libraries this store creates; existing files keep
    /// their own revision.
    pub fn new(root: &Path, format: LibraryFormat) -> Result<Self> {
        fs::create_dir_all(root)
            .map_err(|source| LibraryError::WriteFailure { path: root.to_path_buf(), source })?;
        let root = fs::canonicalize(root)
            .map_err(|source| LibraryError::ReadFailure { path: root.to_path_buf(), source })?;
        Ok(Self { root, format, locks: LockRegistry::default() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> LibraryFormat {
        self.format
    }

    pub fn symbol_lib_path(&self, category: &str) -> PathBuf {
        self.root.join(format!("{}.kicad_sym", category))
    }

    pub fn footprint_dir(&self, category: &str) -> PathBuf {
        self.root.join(format!("{}.pretty", category))
    }

    pub fn footprint_path(&self, category: &str, name: &str) -> PathBuf {
        self.footprint_dir(category).join(format!("{}.kicad_mod", name))
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    pub fn model_path(&self, lcsc_id: &str, extension: &str) -> PathBuf {
        self.models_dir().join(format!("{}.{}", lcsc_id, extension))
    }

    /// Path relative to the library root, for the manifest.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn category_lock(&self, category: &str) -> Arc<Mutex<()>> {
        self.locks.lock_for(&self.symbol_lib_path(category))
    }

    /// Creates the empty symbol library and footprint folder when missing.
    /// Returns whether anything was created.
    pub fn create_category_files(&self, journal: &mut Journal, category: &str) -> Result<bool> {
        let mut created = journal.create_dir(&self.footprint_dir(category))?;
        let lib = self.symbol_lib_path(category);
        if !lib.exists() {
            journal.write(&lib, SymbolExporter::new(self.format).empty_library().as_bytes())?;
            created = true;
        }
        if created {
            log::info!("Created category '{}' ({})", category, self.format);
        }
        Ok(created)
    }

    fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map_err(|source| LibraryError::ReadFailure { path: path.to_path_buf(), source }.into())
    }

    fn parse(&self, path: &Path, content: &str, expected: &str) -> Result<Sexpr> {
        let root = sexpr::parse(content)
            .map_err(|e| LibraryError::Malformed { path: path.to_path_buf(), reason: e.to_string() })?;
        if root.head() != Some(expected) {
            return Err(LibraryError::Malformed {
                path: path.to_path_buf(),
                reason: format!("expected a ({} ...) root", expected),
            }
            .into());
        }
        Ok(root)
    }

    fn detect_symbol_format(&self, path: &Path, root: &Sexpr) -> Result<LibraryFormat> {
        let version = sexpr::read_version(root).ok_or_else(|| LibraryError::Malformed {
            path: path.to_path_buf(),
            reason: "missing (version ...)".to_string(),
        })?;
        LibraryFormat::from_symbol_version(version)
            .ok_or_else(|| LibraryError::UnsupportedFormat { path: path.to_path_buf(), version }.into())
    }

    /// Revision of a category's symbol library.
    pub fn symbol_format(&self, category: &str) -> Result<LibraryFormat> {
        let path = self.symbol_lib_path(category);
        if !path.exists() {
            return Ok(self.format);
        }
        let content = self.read(&path)?;
        let root = self.parse(&path, &content, "kicad_symbol_lib")?;
        self.detect_symbol_format(&path, &root)
    }

    pub fn merge_symbol(&self, journal: &mut Journal, category: &str, symbol: &KiSymbol) -> Result<Merge> {
        let path = self.symbol_lib_path(category);
        let content = self.read(&path)?;
        let root = self.parse(&path, &content, "kicad_symbol_lib")?;
        let format = self.detect_symbol_format(&path, &root)?;
        let entry = SymbolExporter::new(format).export(symbol);

        let merge = self.splice(journal, &path, &content, &root, &symbol.name, &entry)?;
        log::info!("Symbol {} in '{}': {}", symbol.name, category, merge.outcome);
        Ok(merge)
    }

    /// Replaces or appends one `(symbol ...)` entry and writes the file,
    /// unless the existing entry has the same fingerprint.
    fn splice(
        &self,
        journal: &mut Journal,
        path: &Path,
        content: &str,
        root: &Sexpr,
        name: &str,
        entry: &str,
    ) -> Result<Merge> {
        let malformed = |e: sexpr::SexprError| LibraryError::Malformed { path: path.to_path_buf(), reason: e.to_string() };
        let entry = entry.trim();
        let fingerprint = sexpr::fingerprint(entry).map_err(malformed)?;

        let existing = sexpr::entries(root, "symbol").into_iter().find(|e| e.name == name);
        let (updated, outcome) = match existing {
            Some(existing) => {
                let current = sexpr::fingerprint(&content[existing.span.clone()]).map_err(malformed)?;
                if current == fingerprint {
                    return Ok(Merge { outcome: MergeOutcome::SkippedDuplicate, fingerprint });
                }
                let span = existing.span;
                (format!("{}{}{}", &content[..span.start], entry, &content[span.end..]), MergeOutcome::Updated)
            }
            None => {
                let close = root.span().end - 1;
                let head = content[..close].trim_end();
                (format!("{}\n  {}\n{}", head, entry, &content[close..]), MergeOutcome::Added)
            }
        };

        journal.write(path, updated.as_bytes())?;
        Ok(Merge { outcome, fingerprint })
    }

    /// Raw text of a symbol entry, as stored.
    pub fn extract_symbol(&self, category: &str, name: &str) -> Result<Option<String>> {
        let path = self.symbol_lib_path(category);
        if !path.exists() {
            return Ok(None);
        }
        let content = self.read(&path)?;
        let root = self.parse(&path, &content, "kicad_symbol_lib")?;
        Ok(sexpr::entries(&root, "symbol")
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| content[e.span].to_string()))
    }

    /// Fingerprint of a stored symbol entry, comparable with [`Merge::fingerprint`].
    pub fn symbol_fingerprint(&self, category: &str, name: &str) -> Result<Option<String>> {
        let path = self.symbol_lib_path(category);
        let Some(text) = self.extract_symbol(category, name)? else {
            return Ok(None);
        };
        let fingerprint = sexpr::fingerprint(&text)
            .map_err(|e| LibraryError::Malformed { path, reason: e.to_string() })?;
        Ok(Some(fingerprint))
    }

    pub fn remove_symbol(&self, journal: &mut Journal, category: &str, name: &str) -> Result<bool> {
        let path = self.symbol_lib_path(category);
        if !path.exists() {
            return Ok(false);
        }
        let content = self.read(&path)?;
        let root = self.parse(&path, &content, "kicad_symbol_lib")?;
        let Some(entry) = sexpr::entries(&root, "symbol").into_iter().find(|e| e.name == name) else {
            return Ok(false);
        };

        let span = line_span(&content, entry.span);
        let updated = format!("{}{}", &content[..span.start], &content[span.end..]);
        journal.write(&path, updated.as_bytes())?;
        log::info!("Removed symbol {} from '{}'", name, category);
        Ok(true)
    }

    /// Moves a symbol entry between categories, pointing its `Footprint`
    /// property at `footprint_ref`.
    ///
    /// Between libraries of the same revision the entry moves as raw text.
    /// Otherwise it is rendered again from `converted` in the target's
    /// dialect, and without it the move fails with `FormatMismatch`.
    pub fn move_symbol(
        &self,
        journal: &mut Journal,
        from: &str,
        to: &str,
        name: &str,
        footprint_ref: &str,
        converted: Option<&KiSymbol>,
    ) -> Result<Merge> {
        let raw = self.extract_symbol(from, name)?
            .ok_or_else(|| LibraryError::Malformed {
                path: self.symbol_lib_path(from),
                reason: format!("symbol {} not found", name),
            })?;
        let source_format = self.symbol_format(from)?;

        let path = self.symbol_lib_path(to);
        let content = self.read(&path)?;
        let root = self.parse(&path, &content, "kicad_symbol_lib")?;
        let target_format = self.detect_symbol_format(&path, &root)?;

        let text = match converted {
            _ if source_format == target_format => rewrite_footprint_property(&raw, footprint_ref),
            Some(symbol) => {
                let symbol = KiSymbol { footprint: footprint_ref.to_string(), ..symbol.clone() };
                SymbolExporter::new(target_format).export(&symbol)
            }
            None => {
                return Err(LibraryError::FormatMismatch {
                    name: name.to_string(),
                    from: source_format,
                    to: target_format,
                }
                .into())
            }
        };
        let merge = self.splice(journal, &path, &content, &root, name, &text)?;
        self.remove_symbol(journal, from, name)?;
        log::info!("Moved symbol {} from '{}' to '{}'", name, from, to);
        Ok(merge)
    }

    pub fn merge_footprint(&self, journal: &mut Journal, category: &str, footprint: &KiFootprint) -> Result<Merge> {
        let path = self.footprint_path(category, &footprint.name);
        let (format, current) = self.footprint_target(category, &path)?;
        let text = FootprintExporter::new(format).export(footprint);
        let merge = self.write_footprint(journal, &path, &text, current.as_deref())?;
        log::info!("Footprint {} in '{}': {}", footprint.name, category, merge.outcome);
        Ok(merge)
    }

    fn footprint_format(&self, path: &Path, content: &str) -> Result<LibraryFormat> {
        let root = self.parse(path, content, "footprint")?;
        let version = sexpr::read_version(&root).ok_or_else(|| LibraryError::Malformed {
            path: path.to_path_buf(),
            reason: "missing (version ...)".to_string(),
        })?;
        LibraryFormat::from_footprint_version(version)
            .ok_or_else(|| LibraryError::UnsupportedFormat { path: path.to_path_buf(), version }.into())
    }

    /// Revision to write `path` in, plus its current content. New footprints
    /// follow the category's symbol library revision.
    fn footprint_target(&self, category: &str, path: &Path) -> Result<(LibraryFormat, Option<String>)> {
        if path.exists() {
            let content = self.read(path)?;
            Ok((self.footprint_format(path, &content)?, Some(content)))
        } else {
            Ok((self.symbol_format(category)?, None))
        }
    }

    fn write_footprint(&self, journal: &mut Journal, path: &Path, text: &str, current: Option<&str>) -> Result<Merge> {
        let malformed = |e: sexpr::SexprError| LibraryError::Malformed { path: path.to_path_buf(), reason: e.to_string() };
        let fingerprint = sexpr::fingerprint(text).map_err(malformed)?;
        let outcome = match current {
            Some(current) if sexpr::fingerprint(current).map_err(malformed)? == fingerprint => {
                return Ok(Merge { outcome: MergeOutcome::SkippedDuplicate, fingerprint });
            }
            Some(_) => MergeOutcome::Updated,
            None => MergeOutcome::Added,
        };
        journal.write(path, text.as_bytes())?;
        Ok(Merge { outcome, fingerprint })
    }

    pub fn remove_footprint(&self, journal: &mut Journal, category: &str, name: &str) -> Result<bool> {
        let removed = journal.remove_file(&self.footprint_path(category, name))?;
        if removed {
            log::info!("Removed footprint {} from '{}'", name, category);
        }
        Ok(removed)
    }

    /// Copies a footprint file into another category and deletes the
    /// original. A revision change needs `converted`, as for symbols.
    pub fn move_footprint(
        &self,
        journal: &mut Journal,
        from: &str,
        to: &str,
        name: &str,
        converted: Option<&KiFootprint>,
    ) -> Result<Option<Merge>> {
        let source = self.footprint_path(from, name);
        if !source.exists() {
            return Ok(None);
        }
        let raw = self.read(&source)?;
        let source_format = self.footprint_format(&source, &raw)?;
        let target = self.footprint_path(to, name);
        let (target_format, current) = self.footprint_target(to, &target)?;

        let text = match converted {
            _ if source_format == target_format => raw,
            Some(footprint) => FootprintExporter::new(target_format).export(footprint),
            None => {
                return Err(LibraryError::FormatMismatch {
                    name: name.to_string(),
                    from: source_format,
                    to: target_format,
                }
                .into())
            }
        };
        let merge = self.write_footprint(journal, &target, &text, current.as_deref())?;
        journal.remove_file(&source)?;
        Ok(Some(merge))
    }

    /// Writes a model file into the shared folder unless identical bytes are
    /// already there.
    pub fn write_model(&self, journal: &mut Journal, lcsc_id: &str, extension: &str, bytes: &[u8]) -> Result<MergeOutcome> {
        let dir = self.models_dir();
        fs::create_dir_all(&dir)
            .map_err(|source| LibraryError::WriteFailure { path: dir.clone(), source })?;

        let path = self.model_path(lcsc_id, extension);
        let outcome = match fs::read(&path) {
            Ok(existing) if existing == bytes => return Ok(MergeOutcome::SkippedDuplicate),
            Ok(_) => MergeOutcome::Updated,
            Err(e) if e.kind() == io::ErrorKind::NotFound => MergeOutcome::Added,
            Err(source) => return Err(LibraryError::ReadFailure { path, source }.into()),
        };
        journal.write(&path, bytes)?;
        log::debug!("Model {} {}", path.display(), outcome);
        Ok(outcome)
    }

    pub fn remove_models(&self, journal: &mut Journal, lcsc_id: &str) -> Result<usize> {
        let mut removed = 0;
        for extension in ["step", "wrl"] {
            if journal.remove_file(&self.model_path(lcsc_id, extension))? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Widens an entry span to its whole line: leading indentation and the
/// trailing newline.
fn line_span(content: &str, span: Range<usize>) -> Range<usize> {
    let bytes = content.as_bytes();
    let mut start = span.start;
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    let rest = &content[span.end..];
    let end = if rest.starts_with("\r\n") {
        span.end + 2
    } else if rest.starts_with('\n') {
        span.end + 1
    } else {
        span.end
    };
    start..end
}

fn rewrite_footprint_property(text: &str, footprint_ref: &str) -> String {
    let re = Regex::new(r#"\(property\s+"Footprint"\s+"(?:[^"\\]|\\.)*""#).expect("static regex");
    let replacement = format!("(property \"Footprint\" {}", sexpr::quote(footprint_ref));
    re.replace(text, regex::NoExpand(&replacement)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::kicad::symbol::tests::sample;
    use crate::library::atomic::fault;

    fn store(format: LibraryFormat) -> (tempfile::TempDir, LibraryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LibraryStore::new(dir.path(), format).unwrap();
        let mut journal = Journal::new();
        store.create_category_files(&mut journal, "misc").unwrap();
        journal.commit();
        (dir, store)
    }

    fn merge(store: &LibraryStore, symbol: &KiSymbol) -> Result<Merge> {
        let mut journal = Journal::new();
        let merge = store.merge_symbol(&mut journal, "misc", symbol)?;
        journal.commit();
        Ok(merge)
    }

    fn named(name: &str) -> KiSymbol {
        KiSymbol { name: name.to_string(), ..sample() }
    }

    #[test]
    fn merge_add_skip_update() {
        let (_dir, store) = store(LibraryFormat::V9);
        let path = store.symbol_lib_path("misc");

        assert_eq!(merge(&store, &named("A")).unwrap().outcome, MergeOutcome::Added);
        let after_add = fs::read_to_string(&path).unwrap();
        assert_eq!(merge(&store, &named("A")).unwrap().outcome, MergeOutcome::SkippedDuplicate);
        assert_eq!(fs::read_to_string(&path).unwrap(), after_add);

        let mut changed = named("A");
        changed.value = "NE556".to_string();
        assert_eq!(merge(&store, &changed).unwrap().outcome, MergeOutcome::Updated);
        let content = fs::read_to_string(&path).unwrap();
        let root = sexpr::parse(&content).unwrap();
        assert_eq!(sexpr::entries(&root, "symbol").len(), 1);
        assert!(content.contains("NE556"));
    }

    #[test]
    fn update_keeps_neighbours_byte_identical() {
        let (_dir, store) = store(LibraryFormat::V8);
        let path = store.symbol_lib_path("misc");
        merge(&store, &named("A")).unwrap();
        merge(&store, &named("B")).unwrap();

        // Hand-edit A so its bytes are not what the exporter would write.
        let content = fs::read_to_string(&path).unwrap();
        let content = content.replacen("(symbol \"A\"", "(symbol \"A\"   ", 1);
        fs::write(&path, &content).unwrap();
        let a_before = store.extract_symbol("misc", "A").unwrap().unwrap();

        let mut changed = named("B");
        changed.value = "other".to_string();
        assert_eq!(merge(&store, &changed).unwrap().outcome, MergeOutcome::Updated);
        assert_eq!(store.extract_symbol("misc", "A").unwrap().unwrap(), a_before);
    }

    #[test]
    fn remove_restores_previous_content() {
        let (_dir, store) = store(LibraryFormat::V9);
        let path = store.symbol_lib_path("misc");
        merge(&store, &named("A")).unwrap();
        let with_a = fs::read_to_string(&path).unwrap();
        merge(&store, &named("B")).unwrap();

        let mut journal = Journal::new();
        assert!(store.remove_symbol(&mut journal, "misc", "B").unwrap());
        assert!(!store.remove_symbol(&mut journal, "misc", "B").unwrap());
        journal.commit();
        assert_eq!(fs::read_to_string(&path).unwrap(), with_a);
    }

    #[test]
    fn v7_library_gets_v7_dialect() {
        let (_dir, store) = store(LibraryFormat::V7);
        merge(&store, &named("A")).unwrap();
        let content = fs::read_to_string(store.symbol_lib_path("misc")).unwrap();
        assert!(content.contains("(version 20220914)"));
        assert!(content.contains("(in_bom yes) (on_board yes)"));
        assert!(!content.contains("(hide yes)"));
        assert_eq!(store.symbol_format("misc").unwrap(), LibraryFormat::V7);
    }

    #[test]
    fn unsupported_version_is_left_alone() {
        let (_dir, store) = store(LibraryFormat::V9);
        let path = store.symbol_lib_path("misc");
        let ancient = "(kicad_symbol_lib (version 20211014) (generator kicad_symbol_editor)\n)\n";
        fs::write(&path, ancient).unwrap();

        let err = merge(&store, &named("A")).unwrap_err();
        assert!(matches!(err, AppError::Library(LibraryError::UnsupportedFormat { version: 20211014, .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), ancient);
    }

    #[test]
    fn failed_write_leaves_library_untouched() {
        let (_dir, store) = store(LibraryFormat::V9);
        let path = store.symbol_lib_path("misc");
        merge(&store, &named("A")).unwrap();
        let before = fs::read(&path).unwrap();

        fault::fail_next_write_after(64);
        let err = merge(&store, &named("B")).unwrap_err();
        assert!(matches!(err, AppError::Library(LibraryError::WriteFailure { .. })));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn move_symbol_rewrites_footprint_reference() {
        let (_dir, store) = store(LibraryFormat::V9);
        let mut journal = Journal::new();
        store.create_category_files(&mut journal, "mcu").unwrap();
        let mut symbol = named("A");
        symbol.footprint = "lcsc_misc:A".to_string();
        store.merge_symbol(&mut journal, "misc", &symbol).unwrap();

        let merge = store.move_symbol(&mut journal, "misc", "mcu", "A", "lcsc_mcu:A", None).unwrap();
        journal.commit();
        assert_eq!(merge.outcome, MergeOutcome::Added);
        assert!(store.extract_symbol("misc", "A").unwrap().is_none());
        let moved = store.extract_symbol("mcu", "A").unwrap().unwrap();
        assert!(moved.contains("(property \"Footprint\" \"lcsc_mcu:A\""));
    }

    #[test]
    fn move_into_older_library_needs_conversion() {
        let (_dir, store) = store(LibraryFormat::V9);
        let legacy = store.symbol_lib_path("legacy");
        let original = "(kicad_symbol_lib (version 20220914) (generator kicad_symbol_editor)\n)\n";
        fs::write(&legacy, original).unwrap();
        merge(&store, &named("A")).unwrap();
        let misc_before = fs::read_to_string(store.symbol_lib_path("misc")).unwrap();

        let mut journal = Journal::new();
        let err = store.move_symbol(&mut journal, "misc", "legacy", "A", "", None).unwrap_err();
        journal.rollback();
        assert!(matches!(
            err,
            AppError::Library(LibraryError::FormatMismatch { from: LibraryFormat::V9, to: LibraryFormat::V7, .. })
        ));
        assert_eq!(fs::read_to_string(&legacy).unwrap(), original);
        assert_eq!(fs::read_to_string(store.symbol_lib_path("misc")).unwrap(), misc_before);

        let mut journal = Journal::new();
        let merge = store
            .move_symbol(&mut journal, "misc", "legacy", "A", "lcsc_legacy:A", Some(&named("A")))
            .unwrap();
        journal.commit();
        assert_eq!(merge.outcome, MergeOutcome::Added);
        let content = fs::read_to_string(&legacy).unwrap();
        assert!(content.starts_with("(kicad_symbol_lib (version 20220914)"));
        assert!(content.contains("(symbol \"A\" (in_bom yes) (on_board yes)"));
        assert!(content.contains("(property \"Footprint\" \"lcsc_legacy:A\""));
        for token in ["(embedded_fonts", "(exclude_from_sim", "(hide yes)"] {
            assert!(!content.contains(token), "{} in a KiCad 7 library", token);
        }
        assert!(store.extract_symbol("misc", "A").unwrap().is_none());
    }

    #[test]
    fn models_skip_identical_bytes() {
        let (_dir, store) = store(LibraryFormat::V9);
        let mut journal = Journal::new();
        assert_eq!(store.write_model(&mut journal, "C1", "step", b"ISO").unwrap(), MergeOutcome::Added);
        assert_eq!(store.write_model(&mut journal, "C1", "step", b"ISO").unwrap(), MergeOutcome::SkippedDuplicate);
        assert_eq!(store.write_model(&mut journal, "C1", "step", b"ISO2").unwrap(), MergeOutcome::Updated);
        journal.rollback();
        assert!(!store.model_path("C1", "step").exists());
    }
}
