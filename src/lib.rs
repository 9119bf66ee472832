pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod converter;
pub mod easyeda;
pub mod error;
pub mod import;
pub mod kicad;
pub mod library;

pub use cache::{CacheStats, CacheStore};
pub use cancel::CancelToken;
pub use cli::Cli;
pub use config::Settings;
pub use converter::Converter;
pub use easyeda::{ApiOptions, ComponentSource, EasyedaApi, FootprintImporter, SymbolImporter};
pub use error::{AppError, Result};
pub use import::{ImportReport, ImportRequest, Importer};
pub use kicad::{FootprintExporter, LibraryFormat, ModelExporter, SymbolExporter};
pub use library::{LibraryManager, MergeOutcome, ModelTransform, DEFAULT_CATEGORY};
