use std::fmt::Write as _;

use crate::kicad::sexpr::quote;
use crate::kicad::{fmt_mm, LibraryFormat, PinStyle, PinType};

/// Schematic symbol in KiCad units (mm, Y up).
#[derive(Debug, Clone, PartialEq)]
pub struct KiSymbol {
    pub name: String,
    pub reference: String,
    pub value: String,
    pub footprint: String,
    pub datasheet: String,
    pub description: String,
    pub manufacturer: String,
    pub lcsc_id: String,
    pub jlc_id: String,
    pub pins: Vec<KiPin>,
    pub rectangles: Vec<KiRectangle>,
    pub circles: Vec<KiCircle>,
    pub arcs: Vec<SymbolKiArc>,
    pub polylines: Vec<KiPolyline>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiPin {
    pub number: String,
    pub name: String,
    pub pin_type: PinType,
    pub style: PinStyle,
    pub pos_x: f64,
    pub pos_y: f64,
    pub rotation: f64,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiRectangle {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub stroke_width: f64,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiCircle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
    pub stroke_width: f64,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolKiArc {
    pub start_x: f64,
    pub start_y: f64,
    pub mid_x: f64,
    pub mid_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiPolyline {
    pub points: Vec<(f64, f64)>,
    pub stroke_width: f64,
    pub fill: bool,
}

/// Renders symbols in one KiCad library dialect.
pub struct SymbolExporter {
    format: LibraryFormat,
}

impl SymbolExporter {
    pub fn new(format: LibraryFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> LibraryFormat {
        self.format
    }

    /// Content of a freshly created, empty `.kicad_sym` file.
    pub fn empty_library(&self) -> String {
        format!(
            "(kicad_symbol_lib\n  (version {})\n{})\n",
            self.format.symbol_version(),
            self.format.generator_lines("  ")
        )
    }

    /// Renders one `(symbol ...)` entry. The first line carries no
    /// indentation; nested lines are indented for a place inside the library.
    pub fn export(&self, symbol: &KiSymbol) -> String {
        let mut out = String::new();
        let name = quote(&symbol.name);

        match self.format {
            LibraryFormat::V7 => {
                let _ = writeln!(out, "(symbol {} (in_bom yes) (on_board yes)", name);
            }
            LibraryFormat::V8 | LibraryFormat::V9 => {
                let _ = writeln!(out, "(symbol {}", name);
                out.push_str("    (exclude_from_sim no)\n");
                out.push_str("    (in_bom yes)\n");
                out.push_str("    (on_board yes)\n");
            }
        }

        let properties = [
            ("Reference", symbol.reference.as_str(), 2.54, false),
            ("Value", symbol.value.as_str(), -2.54, false),
            ("Footprint", symbol.footprint.as_str(), -5.08, true),
            ("Datasheet", symbol.datasheet.as_str(), -7.62, true),
            ("Description", symbol.description.as_str(), -10.16, true),
            ("Manufacturer", symbol.manufacturer.as_str(), -12.7, true),
            ("LCSC", symbol.lcsc_id.as_str(), -15.24, true),
            ("JLC Part Class", symbol.jlc_id.as_str(), -17.78, true),
        ];
        for (id, (key, value, y, hidden)) in properties.iter().enumerate() {
            // KiCad 7 has no Description property; it lives in ki_description.
            let key = match (self.format, *key) {
                (LibraryFormat::V7, "Description") => "ki_description",
                _ => *key,
            };
            if value.is_empty() && !matches!(key, "Reference" | "Value" | "Footprint" | "Datasheet") {
                continue;
            }
            self.write_property(&mut out, id, key, value, *y, *hidden);
        }

        let _ = writeln!(out, "    (symbol {}", quote(&format!("{}_0_1", symbol.name)));
        for rect in &symbol.rectangles {
            let _ = writeln!(
                out,
                "      (rectangle (start {} {}) (end {} {})\n        (stroke (width {}) (type default))\n        (fill (type {}))\n      )",
                fmt_mm(rect.x1), fmt_mm(rect.y1), fmt_mm(rect.x2), fmt_mm(rect.y2),
                fmt_mm(rect.stroke_width), fill_type(rect.fill)
            );
        }
        for circle in &symbol.circles {
            let _ = writeln!(
                out,
                "      (circle (center {} {}) (radius {})\n        (stroke (width {}) (type default))\n        (fill (type {}))\n      )",
                fmt_mm(circle.cx), fmt_mm(circle.cy), fmt_mm(circle.radius),
                fmt_mm(circle.stroke_width), fill_type(circle.fill)
            );
        }
        for arc in &symbol.arcs {
            let _ = writeln!(
                out,
                "      (arc (start {} {}) (mid {} {}) (end {} {})\n        (stroke (width {}) (type default))\n        (fill (type none))\n      )",
                fmt_mm(arc.start_x), fmt_mm(arc.start_y),
                fmt_mm(arc.mid_x), fmt_mm(arc.mid_y),
                fmt_mm(arc.end_x), fmt_mm(arc.end_y),
                fmt_mm(arc.stroke_width)
            );
        }
        for polyline in &symbol.polylines {
            if polyline.points.len() < 2 {
                continue;
            }
            out.push_str("      (polyline\n        (pts");
            for (x, y) in &polyline.points {
                let _ = write!(out, " (xy {} {})", fmt_mm(*x), fmt_mm(*y));
            }
            let _ = writeln!(
                out,
                ")\n        (stroke (width {}) (type default))\n        (fill (type {}))\n      )",
                fmt_mm(polyline.stroke_width), fill_type(polyline.fill)
            );
        }
        out.push_str("    )\n");

        let _ = writeln!(out, "    (symbol {}", quote(&format!("{}_1_1", symbol.name)));
        for pin in &symbol.pins {
            let _ = writeln!(
                out,
                "      (pin {} {} (at {} {} {}) (length {})\n        (name {} (effects (font (size 1.27 1.27))))\n        (number {} (effects (font (size 1.27 1.27))))\n      )",
                pin.pin_type.as_str(),
                pin.style.as_str(),
                fmt_mm(pin.pos_x),
                fmt_mm(pin.pos_y),
                fmt_mm(pin.rotation),
                fmt_mm(pin.length),
                quote(&pin.name),
                quote(&pin.number)
            );
        }
        out.push_str("    )\n");

        if self.format == LibraryFormat::V9 {
            out.push_str("    (embedded_fonts no)\n");
        }
        out.push_str("  )");
        out
    }

    fn write_property(&self, out: &mut String, id: usize, key: &str, value: &str, y: f64, hidden: bool) {
        let hide = if hidden { self.format.hide_token() } else { "" };
        match self.format {
            LibraryFormat::V7 => {
                let _ = writeln!(
                    out,
                    "    (property {} {} (at 0 {} 0) (id {})\n      (effects (font (size 1.27 1.27)){})\n    )",
                    quote(key), quote(value), fmt_mm(y), id, hide
                );
            }
            LibraryFormat::V8 | LibraryFormat::V9 => {
                let _ = writeln!(
                    out,
                    "    (property {} {}\n      (at 0 {} 0)\n      (effects (font (size 1.27 1.27)){})\n    )",
                    quote(key), quote(value), fmt_mm(y), hide
                );
            }
        }
    }
}

fn fill_type(fill: bool) -> &'static str {
    if fill { "background" } else { "none" }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::kicad::sexpr;

    pub(crate) fn sample() -> KiSymbol {
        KiSymbol {
            name: "STM32F103C8T6_C8734".to_string(),
            reference: "U".to_string(),
            value: "STM32F103C8T6".to_string(),
            footprint: "lcsc_mcu:STM32F103C8T6_C8734".to_string(),
            datasheet: "https://example.com/ds.pdf".to_string(),
            description: String::new(),
            manufacturer: "ST".to_string(),
            lcsc_id: "C8734".to_string(),
            jlc_id: String::new(),
            pins: vec![KiPin {
                number: "1".to_string(),
                name: "VBAT".to_string(),
                pin_type: PinType::PowerIn,
                style: PinStyle::Line,
                pos_x: -10.16,
                pos_y: 5.08,
                rotation: 0.0,
                length: 2.54,
            }],
            rectangles: vec![KiRectangle { x1: -7.62, y1: 7.62, x2: 7.62, y2: -7.62, stroke_width: 0.0, fill: true }],
            circles: vec![],
            arcs: vec![],
            polylines: vec![],
        }
    }

    #[test]
    fn v7_uses_property_ids_and_bare_hide() {
        let text = SymbolExporter::new(LibraryFormat::V7).export(&sample());
        assert!(text.starts_with("(symbol \"STM32F103C8T6_C8734\" (in_bom yes)"));
        assert!(text.contains("(id 2)"));
        assert!(text.contains(")) hide)"));
        assert!(!text.contains("exclude_from_sim"));
        assert!(sexpr::parse(&text).is_ok());
    }

    #[test]
    fn v9_uses_hide_yes_and_embedded_fonts() {
        let text = SymbolExporter::new(LibraryFormat::V9).export(&sample());
        assert!(text.contains("(hide yes)"));
        assert!(text.contains("(exclude_from_sim no)"));
        assert!(text.contains("(embedded_fonts no)"));
        assert!(!text.contains("(id "));
        let root = sexpr::parse(&text).unwrap();
        assert_eq!(root.atom_at(1), Some("STM32F103C8T6_C8734"));
    }

    #[test]
    fn empty_library_carries_version() {
        for format in LibraryFormat::ALL {
            let text = SymbolExporter::new(format).empty_library();
            let root = sexpr::parse(&text).unwrap();
            assert_eq!(sexpr::read_version(&root), Some(format.symbol_version()));
        }
    }
}
