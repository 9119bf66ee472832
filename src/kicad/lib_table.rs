//! `sym-lib-table` / `fp-lib-table` registration.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{LibraryError, Result};
use crate::kicad::sexpr::quote;
use crate::library::atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Symbol,
    Footprint,
}

impl TableKind {
    pub fn file_name(self) -> &'static str {
        match self {
            TableKind::Symbol => "sym-lib-table",
            TableKind::Footprint => "fp-lib-table",
        }
    }

    fn root(self) -> &'static str {
        match self {
            TableKind::Symbol => "sym_lib_table",
            TableKind::Footprint => "fp_lib_table",
        }
    }
}

/// Library nickname used for a category in both tables and in footprint references.
pub fn nickname(category: &str) -> String {
    format!("lcsc_{}", category)
}

/// Names already present in a library table.
pub fn registered_names(content: &str) -> Vec<String> {
    let re = Regex::new(r#"\(lib\s+\(name\s+"?([^")\s]+)"?\)"#).expect("static regex");
    re.captures_iter(content).map(|c| c[1].to_string()).collect()
}

/// Adds `(lib ...)` entries for libraries not yet in the table. Returns the
/// names that were added; existing entries are left untouched.
pub fn register(table: &Path, kind: TableKind, libraries: &[(String, PathBuf)]) -> Result<Vec<String>> {
    let content = if table.exists() {
        std::fs::read_to_string(table)
            .map_err(|source| LibraryError::ReadFailure { path: table.to_path_buf(), source })?
    } else {
        format!("({}\n  (version 7)\n)\n", kind.root())
    };

    let existing = registered_names(&content);
    let new_entries: Vec<&(String, PathBuf)> = libraries.iter()
        .filter(|(name, _)| !existing.contains(name))
        .collect();

    if new_entries.is_empty() {
        log::info!("All libraries already registered in {}", table.display());
        return Ok(Vec::new());
    }

    let close = content.rfind(')').ok_or_else(|| LibraryError::Malformed {
        path: table.to_path_buf(),
        reason: "library table has no closing paren".to_string(),
    })?;

    let mut updated = content[..close].trim_end().to_string();
    updated.push('\n');
    for (name, uri) in &new_entries {
        updated.push_str(&format!(
            "  (lib (name {})(type \"KiCad\")(uri {})(options \"\")(descr \"LCSC Grabber imported components\"))\n",
            quote(name),
            quote(&uri.display().to_string())
        ));
        log::info!("Registering {} in {}", name, table.display());
    }
    updated.push_str(&content[close..]);

    if let Some(parent) = table.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| LibraryError::WriteFailure { path: parent.to_path_buf(), source })?;
    }
    atomic::write_atomic(table, updated.as_bytes())?;

    Ok(new_entries.into_iter().map(|(name, _)| name.clone()).collect())
}

/// Sets `environment.vars.<name>` in `kicad_common.json`, creating the file
/// when needed. Returns false when the variable already had that value.
pub fn set_path_variable(common: &Path, name: &str, value: &Path) -> Result<bool> {
    let mut config: Value = match std::fs::read_to_string(common) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| LibraryError::Malformed {
            path: common.to_path_buf(),
            reason: e.to_string(),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => json!({}),
        Err(source) => return Err(LibraryError::ReadFailure { path: common.to_path_buf(), source }.into()),
    };

    let value = Value::String(value.display().to_string());
    let Some(root) = config.as_object_mut() else {
        return Err(LibraryError::Malformed { path: common.to_path_buf(), reason: "not a JSON object".to_string() }.into());
    };
    let environment = root.entry("environment").or_insert_with(|| json!({}));
    if !environment.is_object() {
        *environment = json!({});
    }
    if !environment.get("vars").is_some_and(Value::is_object) {
        environment["vars"] = json!({});
    }
    let vars = &mut environment["vars"];
    if vars.get(name) == Some(&value) {
        return Ok(false);
    }
    vars[name] = value;

    let text = serde_json::to_string_pretty(&config).map_err(|e| LibraryError::Malformed {
        path: common.to_path_buf(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = common.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| LibraryError::WriteFailure { path: parent.to_path_buf(), source })?;
    }
    atomic::write_atomic(common, text.as_bytes())?;
    log::info!("Set {} in {}", name, common.display());
    Ok(true)
}

/// Newest versioned KiCad config dir (e.g. `~/.config/kicad/9.0`) under `base`.
pub fn find_kicad_config_dir(base: &Path) -> Option<PathBuf> {
    let kicad = base.join("kicad");
    let mut versions: Vec<PathBuf> = std::fs::read_dir(&kicad).ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(|c: char| c.is_ascii_digit()))
        })
        .collect();
    versions.sort();
    versions.pop().or(Some(kicad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kicad::sexpr;

    #[test]
    fn creates_table_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("sym-lib-table");
        let libs = vec![(nickname("mcu"), dir.path().join("mcu.kicad_sym"))];

        let added = register(&table, TableKind::Symbol, &libs).unwrap();
        assert_eq!(added, vec!["lcsc_mcu"]);
        let content = std::fs::read_to_string(&table).unwrap();
        assert!(content.starts_with("(sym_lib_table"));
        assert_eq!(registered_names(&content), vec!["lcsc_mcu"]);

        let again = register(&table, TableKind::Symbol, &libs).unwrap();
        assert!(again.is_empty());
        assert_eq!(std::fs::read_to_string(&table).unwrap(), content);
    }

    #[test]
    fn keeps_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("fp-lib-table");
        std::fs::write(&table, "(fp_lib_table\n  (version 7)\n  (lib (name \"Other\")(type \"KiCad\")(uri \"/x\")(options \"\")(descr \"\"))\n)\n").unwrap();

        register(&table, TableKind::Footprint, &[(nickname("misc"), dir.path().join("misc.pretty"))]).unwrap();
        let content = std::fs::read_to_string(&table).unwrap();
        assert_eq!(registered_names(&content), vec!["Other", "lcsc_misc"]);
    }

    #[test]
    fn quotes_awkward_paths() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("sym-lib-table");
        let uri = dir.path().join("odd \"name\" \\ dir").join("misc.kicad_sym");

        register(&table, TableKind::Symbol, &[(nickname("misc"), uri.clone())]).unwrap();
        let content = std::fs::read_to_string(&table).unwrap();
        let root = sexpr::parse(&content).unwrap();
        let lib = root.child("lib").unwrap();
        assert_eq!(lib.child("name").and_then(|n| n.atom_at(1)), Some("lcsc_misc"));
        assert_eq!(lib.child("uri").and_then(|n| n.atom_at(1)), Some(uri.display().to_string().as_str()));
    }

    #[test]
    fn path_variable_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let common = dir.path().join("kicad_common.json");
        std::fs::write(&common, r#"{"environment": {"vars": null}, "graphics": {"canvas_type": 1}}"#).unwrap();

        assert!(set_path_variable(&common, "LCSC_GRABBER_3D", Path::new("/lib/3d")).unwrap());
        assert!(!set_path_variable(&common, "LCSC_GRABBER_3D", Path::new("/lib/3d")).unwrap());
        let config: Value = serde_json::from_str(&std::fs::read_to_string(&common).unwrap()).unwrap();
        assert_eq!(config["environment"]["vars"]["LCSC_GRABBER_3D"], "/lib/3d");
        assert_eq!(config["graphics"]["canvas_type"], 1);
    }
}
