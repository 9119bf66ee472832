pub mod footprint;
pub mod lib_table;
pub mod model;
pub mod sexpr;
pub mod symbol;

pub use footprint::{
    Drill, FootprintExporter, FootprintKiArc, FootprintKiCircle, Ki3dModel, KiFootprint, KiLine,
    KiPad, KiPolygon, KiText,
};
pub use model::ModelExporter;
pub use symbol::{KiCircle, KiPin, KiPolyline, KiRectangle, KiSymbol, SymbolExporter, SymbolKiArc};

use serde::{Deserialize, Serialize};

pub const GENERATOR: &str = "lcsc_grabber";
pub const GENERATOR_VERSION: &str = "1.1";

/// KiCad library schema revisions this crate reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LibraryFormat {
    V7,
    V8,
    V9,
}

impl LibraryFormat {
    pub const ALL: [LibraryFormat; 3] = [LibraryFormat::V7, LibraryFormat::V8, LibraryFormat::V9];
    pub const LATEST: LibraryFormat = LibraryFormat::V9;

    pub fn symbol_version(self) -> u32 {
        match self {
            LibraryFormat::V7 => 20220914,
            LibraryFormat::V8 => 20231120,
            LibraryFormat::V9 => 20241209,
        }
    }

    pub fn footprint_version(self) -> u32 {
        match self {
            LibraryFormat::V7 => 20221018,
            LibraryFormat::V8 => 20240108,
            LibraryFormat::V9 => 20241229,
        }
    }

    /// Maps a `kicad_symbol_lib` version to the newest revision not newer
    /// than it. Versions older than KiCad 7 or newer than KiCad 9 are rejected.
    pub fn from_symbol_version(version: u32) -> Option<Self> {
        Self::detect(version, Self::symbol_version)
    }

    pub fn from_footprint_version(version: u32) -> Option<Self> {
        Self::detect(version, Self::footprint_version)
    }

    fn detect(version: u32, of: fn(LibraryFormat) -> u32) -> Option<Self> {
        if version > of(Self::LATEST) {
            return None;
        }
        Self::ALL.iter().rev().copied().find(|format| of(*format) <= version)
    }

    pub fn kicad_major(self) -> u8 {
        match self {
            LibraryFormat::V7 => 7,
            LibraryFormat::V8 => 8,
            LibraryFormat::V9 => 9,
        }
    }

    /// Trailing token that hides a property or text.
    pub(crate) fn hide_token(self) -> &'static str {
        match self {
            LibraryFormat::V7 => " hide",
            LibraryFormat::V8 | LibraryFormat::V9 => " (hide yes)",
        }
    }

    pub(crate) fn generator_lines(self, indent: &str) -> String {
        match self {
            LibraryFormat::V7 => format!("{indent}(generator {GENERATOR})\n"),
            LibraryFormat::V8 | LibraryFormat::V9 => format!(
                "{indent}(generator \"{GENERATOR}\")\n{indent}(generator_version \"{GENERATOR_VERSION}\")\n"
            ),
        }
    }
}

impl Default for LibraryFormat {
    fn default() -> Self {
        Self::LATEST
    }
}

impl std::fmt::Display for LibraryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KiCad {}", self.kicad_major())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinType {
    Input,
    Output,
    Bidirectional,
    TriState,
    Passive,
    Unspecified,
    PowerIn,
    PowerOut,
    OpenCollector,
    OpenEmitter,
    NoConnect,
}

impl PinType {
    pub fn from_easyeda(value: &str) -> Self {
        match value {
            "1" => PinType::Input,
            "2" => PinType::Output,
            "3" => PinType::Bidirectional,
            "4" => PinType::PowerIn,
            "5" => PinType::PowerOut,
            "6" => PinType::OpenCollector,
            "7" => PinType::OpenEmitter,
            "8" => PinType::Passive,
            "9" => PinType::TriState,
            "10" => PinType::NoConnect,
            _ => PinType::Unspecified,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PinType::Input => "input",
            PinType::Output => "output",
            PinType::Bidirectional => "bidirectional",
            PinType::TriState => "tri_state",
            PinType::Passive => "passive",
            PinType::Unspecified => "unspecified",
            PinType::PowerIn => "power_in",
            PinType::PowerOut => "power_out",
            PinType::OpenCollector => "open_collector",
            PinType::OpenEmitter => "open_emitter",
            PinType::NoConnect => "no_connect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStyle {
    Line,
    Inverted,
    Clock,
    InvertedClock,
}

impl PinStyle {
    pub fn from_flags(dot: bool, clock: bool) -> Self {
        match (dot, clock) {
            (true, true) => PinStyle::InvertedClock,
            (true, false) => PinStyle::Inverted,
            (false, true) => PinStyle::Clock,
            (false, false) => PinStyle::Line,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PinStyle::Line => "line",
            PinStyle::Inverted => "inverted",
            PinStyle::Clock => "clock",
            PinStyle::InvertedClock => "inverted_clock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadType {
    Smd,
    ThroughHole,
    NpThroughHole,
}

impl PadType {
    pub fn as_str(self) -> &'static str {
        match self {
            PadType::Smd => "smd",
            PadType::ThroughHole => "thru_hole",
            PadType::NpThroughHole => "np_thru_hole",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadShape {
    Rect,
    Circle,
    Oval,
    Custom,
}

impl PadShape {
    /// `None` for shapes KiCad has no counterpart for.
    pub fn from_easyeda(shape: &str, width: f64, height: f64) -> Option<Self> {
        match shape {
            "RECT" => Some(PadShape::Rect),
            "ELLIPSE" if (width - height).abs() < f64::EPSILON => Some(PadShape::Circle),
            "ELLIPSE" | "OVAL" => Some(PadShape::Oval),
            "POLYGON" => Some(PadShape::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PadShape::Rect => "rect",
            PadShape::Circle => "circle",
            PadShape::Oval => "oval",
            PadShape::Custom => "custom",
        }
    }
}

/// EasyEDA layer id to KiCad layer name.
pub fn map_layer(layer_id: u32) -> &'static str {
    match layer_id {
        1 => "F.Cu",
        2 => "B.Cu",
        3 => "F.SilkS",
        4 => "B.SilkS",
        5 => "F.Paste",
        6 => "B.Paste",
        7 => "F.Mask",
        8 => "B.Mask",
        10 | 11 => "Edge.Cuts",
        12 => "Cmts.User",
        13 | 99 => "F.Fab",
        14 => "B.Fab",
        15 => "Dwgs.User",
        21 => "F.CrtYd",
        22 => "B.CrtYd",
        _ => "F.SilkS",
    }
}

pub fn map_pad_layers_smd(layer_id: u32) -> Vec<String> {
    let layers: &[&str] = match layer_id {
        2 => &["B.Cu", "B.Paste", "B.Mask"],
        11 => &["*.Cu", "*.Mask"],
        _ => &["F.Cu", "F.Paste", "F.Mask"],
    };
    layers.iter().map(|l| l.to_string()).collect()
}

pub fn map_pad_layers_tht(_layer_id: u32) -> Vec<String> {
    vec!["*.Cu".to_string(), "*.Mask".to_string()]
}

/// Formats a millimetre value without trailing zeros, KiCad style.
pub(crate) fn fmt_mm(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    let text = format!("{:.4}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_version() {
        assert_eq!(LibraryFormat::from_symbol_version(20220914), Some(LibraryFormat::V7));
        assert_eq!(LibraryFormat::from_symbol_version(20230121), Some(LibraryFormat::V7));
        assert_eq!(LibraryFormat::from_symbol_version(20231120), Some(LibraryFormat::V8));
        assert_eq!(LibraryFormat::from_symbol_version(20241209), Some(LibraryFormat::V9));
        assert_eq!(LibraryFormat::from_symbol_version(20211014), None);
        assert_eq!(LibraryFormat::from_symbol_version(20260101), None);
        assert_eq!(LibraryFormat::from_footprint_version(20240108), Some(LibraryFormat::V8));
    }

    #[test]
    fn formats_millimetres() {
        assert_eq!(fmt_mm(2.54), "2.54");
        assert_eq!(fmt_mm(-0.00001), "0");
        assert_eq!(fmt_mm(10.0), "10");
        assert_eq!(fmt_mm(0.254 * 3.0), "0.762");
    }

    #[test]
    fn maps_pad_shapes() {
        assert_eq!(PadShape::from_easyeda("ELLIPSE", 4.0, 4.0), Some(PadShape::Circle));
        assert_eq!(PadShape::from_easyeda("ELLIPSE", 4.0, 6.0), Some(PadShape::Oval));
        assert_eq!(PadShape::from_easyeda("STAR", 1.0, 1.0), None);
    }
}
