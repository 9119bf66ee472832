//! Default 3D model placement and user overrides.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::kicad::KiPad;
use crate::library::atomic::Journal;

const OVERRIDES_FILE: &str = "model_overrides.json";
/// Pin 1 must sit this far (as a fraction of the pad extent) from the centre
/// on both axes to pick a quadrant.
const QUADRANT_THRESHOLD: f64 = 0.3;
const MIN_EXTENT_MM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelTransform {
    pub offset: (f64, f64, f64),
    pub rotation: (f64, f64, f64),
    pub scale: (f64, f64, f64),
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self { offset: (0.0, 0.0, 0.0), rotation: (0.0, 0.0, 0.0), scale: (1.0, 1.0, 1.0) }
    }
}

/// Offset to the pad bounding-box centre plus a Z rotation guessed from where
/// pin 1 sits.
pub fn compute_defaults(pads: &[KiPad]) -> ModelTransform {
    let Some(first) = pads.first() else {
        return ModelTransform::default();
    };

    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.pos_x, first.pos_x, first.pos_y, first.pos_y);
    for pad in pads {
        min_x = min_x.min(pad.pos_x);
        max_x = max_x.max(pad.pos_x);
        min_y = min_y.min(pad.pos_y);
        max_y = max_y.max(pad.pos_y);
    }
    let (cx, cy) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    // KiCad's 3D offset has Y pointing up, footprints have it pointing down.
    let offset = (cx, -cy, 0.0);
    let rotation_z = find_pin_one(pads)
        .map(|pin| quadrant_rotation(pin.pos_x - cx, pin.pos_y - cy, max_x - min_x, max_y - min_y))
        .unwrap_or(0.0);

    ModelTransform { offset, rotation: (0.0, 0.0, rotation_z), ..ModelTransform::default() }
}

/// Pin 1 by number (`1`, `A1`, `A`, `P1`), else the lowest numeric pad, else
/// the first pad.
pub fn find_pin_one(pads: &[KiPad]) -> Option<&KiPad> {
    for candidate in ["1", "A1", "A", "P1"] {
        if let Some(pad) = pads.iter().find(|p| p.number.eq_ignore_ascii_case(candidate)) {
            return Some(pad);
        }
    }
    pads.iter()
        .filter_map(|p| p.number.parse::<u32>().ok().map(|n| (n, p)))
        .min_by_key(|(n, _)| *n)
        .map(|(_, p)| p)
        .or_else(|| pads.first())
}

/// Top-left 0°, top-right 90°, bottom-right 180°, bottom-left 270°.
fn quadrant_rotation(dx: f64, dy: f64, width: f64, height: f64) -> f64 {
    if width < MIN_EXTENT_MM || height < MIN_EXTENT_MM {
        return 0.0;
    }
    let (rx, ry) = (dx / width, dy / height);
    if rx.abs() < QUADRANT_THRESHOLD || ry.abs() < QUADRANT_THRESHOLD {
        return 0.0;
    }
    match (rx < 0.0, ry < 0.0) {
        (true, true) => 0.0,
        (false, true) => 90.0,
        (false, false) => 180.0,
        (true, false) => 270.0,
    }
}

/// User placement edits, kept apart from the manifest so re-imports keep them.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelOverrides {
    #[serde(skip)]
    path: PathBuf,
    overrides: BTreeMap<String, ModelTransform>,
}

impl ModelOverrides {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(OVERRIDES_FILE);
        let mut overrides = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<ModelOverrides>(&content)
                .map_err(|source| LibraryError::StateFile { path: path.clone(), source })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => ModelOverrides::default(),
            Err(source) => return Err(LibraryError::ReadFailure { path, source }.into()),
        };
        overrides.path = path;
        Ok(overrides)
    }

    pub fn get(&self, lcsc_id: &str) -> Option<&ModelTransform> {
        self.overrides.get(lcsc_id)
    }

    pub fn set(&mut self, lcsc_id: &str, transform: ModelTransform, journal: &mut Journal) -> Result<()> {
        self.overrides.insert(lcsc_id.to_string(), transform);
        self.save(journal)
    }

    /// Returns whether an override existed.
    pub fn remove(&mut self, lcsc_id: &str, journal: &mut Journal) -> Result<bool> {
        if self.overrides.remove(lcsc_id).is_none() {
            return Ok(false);
        }
        self.save(journal)?;
        Ok(true)
    }

    fn save(&self, journal: &mut Journal) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| LibraryError::StateFile { path: self.path.clone(), source })?;
        journal.write(&self.path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kicad::{PadShape, PadType};

    fn pad(number: &str, x: f64, y: f64) -> KiPad {
        KiPad {
            number: number.to_string(),
            pad_type: PadType::Smd,
            shape: PadShape::Rect,
            pos_x: x,
            pos_y: y,
            size_x: 0.5,
            size_y: 0.5,
            rotation: 0.0,
            layers: vec![],
            drill: None,
            polygon: None,
        }
    }

    #[test]
    fn soic_pin_one_top_left() {
        let pads = vec![
            pad("1", -2.7, -1.9), pad("2", -2.7, 1.9),
            pad("3", 2.7, 1.9), pad("4", 2.7, -1.9),
        ];
        let t = compute_defaults(&pads);
        assert_eq!(t.offset, (0.0, 0.0, 0.0));
        assert_eq!(t.rotation.2, 0.0);
        assert_eq!(t.scale, (1.0, 1.0, 1.0));
    }

    #[test]
    fn quadrants_map_to_rotations() {
        let square = |x: f64, y: f64| vec![pad("1", x, y), pad("2", -x, -y), pad("3", -x, y), pad("4", x, -y)];
        assert_eq!(compute_defaults(&square(1.0, -1.0)).rotation.2, 90.0);
        assert_eq!(compute_defaults(&square(1.0, 1.0)).rotation.2, 180.0);
        assert_eq!(compute_defaults(&square(-1.0, 1.0)).rotation.2, 270.0);
    }

    #[test]
    fn offset_is_pad_centre_with_y_up() {
        let pads = vec![pad("1", 1.0, 2.0), pad("2", 3.0, 4.0)];
        let t = compute_defaults(&pads);
        assert_eq!(t.offset, (2.0, -3.0, 0.0));
    }

    #[test]
    fn degenerate_and_ambiguous_layouts_stay_at_zero() {
        // Single row: zero height.
        let row = vec![pad("1", -1.0, 0.0), pad("2", 1.0, 0.0)];
        assert_eq!(compute_defaults(&row).rotation.2, 0.0);
        // Pin 1 centred on one axis.
        let centred = vec![pad("1", 0.0, -1.0), pad("2", -1.0, 1.0), pad("3", 1.0, 1.0)];
        assert_eq!(compute_defaults(&centred).rotation.2, 0.0);
        assert_eq!(compute_defaults(&[]), ModelTransform::default());
    }

    #[test]
    fn pin_one_fallbacks() {
        let bga = vec![pad("B1", 0.0, 0.0), pad("A1", 1.0, 1.0)];
        assert_eq!(find_pin_one(&bga).unwrap().number, "A1");
        let numeric = vec![pad("7", 0.0, 0.0), pad("3", 1.0, 1.0)];
        assert_eq!(find_pin_one(&numeric).unwrap().number, "3");
        let named = vec![pad("GND", 0.0, 0.0), pad("VCC", 1.0, 1.0)];
        assert_eq!(find_pin_one(&named).unwrap().number, "GND");
    }

    #[test]
    fn overrides_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut overrides = ModelOverrides::load(dir.path()).unwrap();
        let transform = ModelTransform { rotation: (0.0, 0.0, 45.0), ..ModelTransform::default() };

        let mut journal = Journal::new();
        overrides.set("C8545", transform, &mut journal).unwrap();
        journal.commit();
        assert_eq!(ModelOverrides::load(dir.path()).unwrap().get("C8545"), Some(&transform));

        let mut journal = Journal::new();
        assert!(overrides.remove("C8545", &mut journal).unwrap());
        assert!(!overrides.remove("C8545", &mut journal).unwrap());
        journal.commit();
        assert!(ModelOverrides::load(dir.path()).unwrap().get("C8545").is_none());
    }
}
