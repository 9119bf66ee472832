//! Named categories and their `categories.json` registry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::library::atomic::Journal;

pub const DEFAULT_CATEGORY: &str = "misc";
const REGISTRY_FILE: &str = "categories.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self { id: sanitize_category(name), name: name.trim().to_string(), created_at: Utc::now() }
    }
}

/// Lower-case id of word characters; spaces and dashes become `_`.
pub fn sanitize_category(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace([' ', '-'], "_");
    let re = Regex::new(r"[^\w]").expect("static regex");
    let id = re.replace_all(&lowered, "").to_string();
    if id.is_empty() { DEFAULT_CATEGORY.to_string() } else { id }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CategoryRegistry {
    #[serde(skip)]
    path: PathBuf,
    categories: Vec<Category>,
}

impl CategoryRegistry {
    /// Loads the registry under `root`; the default category is always listed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(REGISTRY_FILE);
        let mut registry = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<CategoryRegistry>(&content)
                .map_err(|source| LibraryError::StateFile { path: path.clone(), source })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => CategoryRegistry::default(),
            Err(source) => return Err(LibraryError::ReadFailure { path, source }.into()),
        };
        registry.path = path;
        if !registry.contains(DEFAULT_CATEGORY) {
            registry.categories.insert(0, Category::new(DEFAULT_CATEGORY));
        }
        Ok(registry)
    }

    pub fn save(&self, journal: &mut Journal) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| LibraryError::StateFile { path: self.path.clone(), source })?;
        journal.write(&self.path, json.as_bytes())
    }

    pub fn list(&self) -> &[Category] {
        &self.categories
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Adds the category unless present. Returns whether it was new.
    pub fn insert(&mut self, category: Category) -> bool {
        if self.contains(&category.id) {
            return false;
        }
        self.categories.push(category);
        true
    }

    pub fn remove(&mut self, id: &str) -> Result<Category> {
        if id == DEFAULT_CATEGORY {
            return Err(LibraryError::CannotRemoveDefault(id.to_string()).into());
        }
        let index = self.categories.iter().position(|c| c.id == id)
            .ok_or_else(|| LibraryError::CategoryNotFound(id.to_string()))?;
        Ok(self.categories.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_category("Power Supply"), "power_supply");
        assert_eq!(sanitize_category("op-amps!"), "op_amps");
        assert_eq!(sanitize_category("  "), "misc");
        assert_eq!(sanitize_category("MCU"), "mcu");
    }

    #[test]
    fn registry_round_trips_and_protects_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = CategoryRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.list().len(), 1);
        assert!(registry.insert(Category::new("MCU")));
        assert!(!registry.insert(Category::new("mcu")));

        let mut journal = Journal::new();
        registry.save(&mut journal).unwrap();
        journal.commit();

        let mut reloaded = CategoryRegistry::load(dir.path()).unwrap();
        assert_eq!(reloaded.get("mcu").map(|c| c.name.as_str()), Some("MCU"));
        assert!(matches!(
            reloaded.remove(DEFAULT_CATEGORY),
            Err(crate::error::AppError::Library(LibraryError::CannotRemoveDefault(_)))
        ));
        assert!(reloaded.remove("nope").is_err());
        assert_eq!(reloaded.remove("mcu").unwrap().id, "mcu");
    }
}
