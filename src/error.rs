use std::path::PathBuf;
use thiserror::Error;

use crate::kicad::LibraryFormat;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("EasyEDA error: {0}")]
    Easyeda(#[from] EasyedaError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Fetch-layer failures.
#[derive(Error, Debug)]
pub enum EasyedaError {
    #[error("Invalid LCSC ID: {0}")]
    InvalidLcscId(String),

    #[error("Component not found: {0}")]
    NotFound(String),

    #[error("Component {id} is missing {}", missing.join(", "))]
    PartialData { id: String, missing: Vec<&'static str> },

    #[error("API request failed: {0}")]
    ApiRequest(#[source] reqwest::Error),

    #[error("Server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl EasyedaError {
    /// Transport problems worth retrying later, as opposed to bad ids or bad data.
    pub fn is_network(&self) -> bool {
        matches!(self, EasyedaError::ApiRequest(_) | EasyedaError::Status { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported {kind}: {detail}")]
    UnsupportedGeometry { kind: &'static str, detail: String },

    #[error("Invalid 3D model data: {0}")]
    InvalidModel(String),
}

impl ConvertError {
    pub fn unsupported(kind: &'static str, detail: impl Into<String>) -> Self {
        ConvertError::UnsupportedGeometry { kind, detail: detail.into() }
    }
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported library format version {version} in {}", path.display())]
    UnsupportedFormat { path: PathBuf, version: u32 },

    #[error("{name} is stored as {from} and needs converting before it can go into a {to} library")]
    FormatMismatch { name: String, from: LibraryFormat, to: LibraryFormat },

    #[error("Malformed library file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Cannot remove the default category '{0}'")]
    CannotRemoveDefault(String),

    #[error("Manifest inconsistency: {0}")]
    ManifestInconsistency(String),

    #[error("Component {id} is not imported into '{category}'")]
    NotImported { id: String, category: String },

    #[error("Invalid state file {}: {source}", path.display())]
    StateFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
