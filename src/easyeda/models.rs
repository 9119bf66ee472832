use serde::{Deserialize, Serialize};

use crate::error::EasyedaError;

/// Raw response envelope of the EasyEDA component endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub result: Option<ApiResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult {
    pub title: Option<String>,
    pub description: Option<String>,
    pub data_str: Option<serde_json::Value>,
    pub package_detail: Option<serde_json::Value>,
    pub lcsc: Option<serde_json::Value>,
}

/// A part of a component that the catalog may or may not provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum Part<T> {
    Present(T),
    Absent,
}

impl<T> Part<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Part::Present(_))
    }
}

impl<T> From<Option<T>> for Part<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Part::Present(value),
            None => Part::Absent,
        }
    }
}

/// Raw schematic symbol: EasyEDA shape strings plus the symbol origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolData {
    pub shapes: Vec<String>,
    pub origin_x: f64,
    pub origin_y: f64,
    /// Reference designator prefix from `c_para.pre`, e.g. `U?`.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Raw PCB footprint: EasyEDA shape strings plus the package origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintData {
    pub title: String,
    pub shapes: Vec<String>,
    pub origin_x: f64,
    pub origin_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model3dInfo {
    pub uuid: String,
    pub title: String,
}

/// Downloaded 3D model blobs; either format may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub step: Option<Vec<u8>>,
    pub obj: Option<String>,
}

impl ModelData {
    pub fn is_empty(&self) -> bool {
        self.step.is_none() && self.obj.is_none()
    }
}

/// Everything the catalog knows about one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    pub lcsc_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub manufacturer: String,
    pub datasheet: String,
    pub jlc_id: String,
    pub symbol: Part<SymbolData>,
    pub footprint: Part<FootprintData>,
    pub model_3d: Part<Model3dInfo>,
}

/// Which parts of a component an import asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSelection {
    pub symbol: bool,
    pub footprint: bool,
    pub model_3d: bool,
}

impl PartSelection {
    pub const ALL: PartSelection = PartSelection { symbol: true, footprint: true, model_3d: true };

    pub fn is_empty(&self) -> bool {
        !self.symbol && !self.footprint && !self.model_3d
    }
}

impl Default for PartSelection {
    fn default() -> Self {
        Self::ALL
    }
}

impl ComponentData {
    /// Names of the selected parts the catalog did not provide.
    pub fn missing(&self, selection: PartSelection) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if selection.symbol && !self.symbol.is_present() {
            missing.push("symbol");
        }
        if selection.footprint && !self.footprint.is_present() {
            missing.push("footprint");
        }
        if selection.model_3d && !self.model_3d.is_present() {
            missing.push("3D model");
        }
        missing
    }

    /// Fails with `PartialData` when any selected part is absent.
    pub fn require(&self, selection: PartSelection) -> Result<(), EasyedaError> {
        let missing = self.missing(selection);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EasyedaError::PartialData { id: self.lcsc_id.clone(), missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component() -> ComponentData {
        ComponentData {
            lcsc_id: "C1".to_string(),
            title: "X".to_string(),
            description: String::new(),
            manufacturer: String::new(),
            datasheet: String::new(),
            jlc_id: String::new(),
            symbol: Part::Present(SymbolData {
                shapes: vec![],
                origin_x: 0.0,
                origin_y: 0.0,
                prefix: None,
            }),
            footprint: Part::Absent,
            model_3d: Part::Absent,
        }
    }

    #[test]
    fn require_reports_missing_parts() {
        let c = component();
        assert!(c.require(PartSelection { symbol: true, footprint: false, model_3d: false }).is_ok());

        match c.require(PartSelection::ALL) {
            Err(EasyedaError::PartialData { id, missing }) => {
                assert_eq!(id, "C1");
                assert_eq!(missing, vec!["footprint", "3D model"]);
            }
            other => panic!("expected PartialData, got {:?}", other),
        }
    }

    #[test]
    fn part_survives_serialization() {
        let c = component();
        let json = serde_json::to_string(&c).unwrap();
        let back: ComponentData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert!(json.contains("\"state\":\"absent\""));
    }
}
