pub mod api;
pub mod importer;
pub mod models;

pub use api::{normalize_lcsc_id, ApiOptions, ComponentSource, EasyedaApi};
pub use importer::{FootprintImporter, SymbolImporter};
pub use models::{ComponentData, ModelData, Part, PartSelection};
