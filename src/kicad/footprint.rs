use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::kicad::sexpr::quote;
use crate::kicad::{fmt_mm, LibraryFormat, PadShape, PadType};

/// PCB footprint in KiCad units (mm, Y down).
#[derive(Debug, Clone, PartialEq)]
pub struct KiFootprint {
    pub name: String,
    pub description: String,
    pub pads: Vec<KiPad>,
    pub lines: Vec<KiLine>,
    pub circles: Vec<FootprintKiCircle>,
    pub arcs: Vec<FootprintKiArc>,
    pub polygons: Vec<KiPolygon>,
    pub texts: Vec<KiText>,
    pub model_3d: Option<Ki3dModel>,
}

impl KiFootprint {
    pub fn is_through_hole(&self) -> bool {
        self.pads.iter().any(|p| p.pad_type == PadType::ThroughHole)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiPad {
    pub number: String,
    pub pad_type: PadType,
    pub shape: PadShape,
    pub pos_x: f64,
    pub pos_y: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub rotation: f64,
    pub layers: Vec<String>,
    pub drill: Option<Drill>,
    /// Custom pad outline relative to the pad position.
    pub polygon: Option<Vec<(f64, f64)>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drill {
    pub diameter: f64,
    /// Set for oval drills.
    pub width: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiLine {
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub width: f64,
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintKiCircle {
    pub center_x: f64,
    pub center_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub width: f64,
    pub layer: String,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintKiArc {
    pub start_x: f64,
    pub start_y: f64,
    pub mid_x: f64,
    pub mid_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub width: f64,
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiPolygon {
    pub points: Vec<(f64, f64)>,
    pub width: f64,
    pub layer: String,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KiText {
    pub text: String,
    pub pos_x: f64,
    pub pos_y: f64,
    pub rotation: f64,
    pub layer: String,
    pub size: f64,
    pub thickness: f64,
}

/// `(model ...)` block: file path plus placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ki3dModel {
    pub path: String,
    pub offset: (f64, f64, f64),
    pub scale: (f64, f64, f64),
    pub rotate: (f64, f64, f64),
}

pub struct FootprintExporter {
    format: LibraryFormat,
}

impl FootprintExporter {
    pub fn new(format: LibraryFormat) -> Self {
        Self { format }
    }

    /// Renders a complete `.kicad_mod` file.
    pub fn export(&self, footprint: &KiFootprint) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "(footprint {}", quote(&footprint.name));
        let _ = writeln!(out, "  (version {})", self.format.footprint_version());
        out.push_str(&self.format.generator_lines("  "));
        out.push_str("  (layer \"F.Cu\")\n");
        if !footprint.description.is_empty() {
            let _ = writeln!(out, "  (descr {})", quote(&footprint.description));
        }

        self.write_field(&mut out, "Reference", "REF**", -3.0, "F.SilkS");
        self.write_field(&mut out, "Value", &footprint.name, 3.0, "F.Fab");

        let attr = if footprint.is_through_hole() { "through_hole" } else { "smd" };
        let _ = writeln!(out, "  (attr {})", attr);

        for line in &footprint.lines {
            let _ = writeln!(
                out,
                "  (fp_line (start {} {}) (end {} {})\n    (stroke (width {}) (type solid)) (layer {}))",
                fmt_mm(line.start_x), fmt_mm(line.start_y),
                fmt_mm(line.end_x), fmt_mm(line.end_y),
                fmt_mm(line.width), quote(&line.layer)
            );
        }
        for circle in &footprint.circles {
            let _ = writeln!(
                out,
                "  (fp_circle (center {} {}) (end {} {})\n    (stroke (width {}) (type solid)) (fill {}) (layer {}))",
                fmt_mm(circle.center_x), fmt_mm(circle.center_y),
                fmt_mm(circle.end_x), fmt_mm(circle.end_y),
                fmt_mm(circle.width), fill(circle.fill), quote(&circle.layer)
            );
        }
        for arc in &footprint.arcs {
            let _ = writeln!(
                out,
                "  (fp_arc (start {} {}) (mid {} {}) (end {} {})\n    (stroke (width {}) (type solid)) (layer {}))",
                fmt_mm(arc.start_x), fmt_mm(arc.start_y),
                fmt_mm(arc.mid_x), fmt_mm(arc.mid_y),
                fmt_mm(arc.end_x), fmt_mm(arc.end_y),
                fmt_mm(arc.width), quote(&arc.layer)
            );
        }
        for polygon in &footprint.polygons {
            out.push_str("  (fp_poly\n    (pts");
            for (x, y) in &polygon.points {
                let _ = write!(out, " (xy {} {})", fmt_mm(*x), fmt_mm(*y));
            }
            let _ = writeln!(
                out,
                ")\n    (stroke (width {}) (type solid)) (fill {}) (layer {}))",
                fmt_mm(polygon.width), fill(polygon.fill), quote(&polygon.layer)
            );
        }
        for text in &footprint.texts {
            let _ = writeln!(
                out,
                "  (fp_text user {} (at {} {} {}) (layer {})\n    (effects (font (size {} {}) (thickness {}))))",
                quote(&text.text),
                fmt_mm(text.pos_x), fmt_mm(text.pos_y), fmt_mm(text.rotation),
                quote(&text.layer),
                fmt_mm(text.size), fmt_mm(text.size), fmt_mm(text.thickness)
            );
        }
        for pad in &footprint.pads {
            self.write_pad(&mut out, pad);
        }

        if self.format == LibraryFormat::V9 {
            out.push_str("  (embedded_fonts no)\n");
        }
        if let Some(model) = &footprint.model_3d {
            out.push_str(&model_block(model));
        }
        out.push_str(")\n");
        out
    }

    fn write_field(&self, out: &mut String, key: &str, value: &str, y: f64, layer: &str) {
        match self.format {
            LibraryFormat::V7 => {
                let _ = writeln!(
                    out,
                    "  (fp_text {} {} (at 0 {}) (layer {})\n    (effects (font (size 1 1) (thickness 0.15))))",
                    key.to_lowercase(), quote(value), fmt_mm(y), quote(layer)
                );
            }
            LibraryFormat::V8 | LibraryFormat::V9 => {
                let _ = writeln!(
                    out,
                    "  (property {} {} (at 0 {} 0) (layer {})\n    (effects (font (size 1 1) (thickness 0.15))))",
                    quote(key), quote(value), fmt_mm(y), quote(layer)
                );
            }
        }
    }

    fn write_pad(&self, out: &mut String, pad: &KiPad) {
        let at = if pad.rotation != 0.0 {
            format!("{} {} {}", fmt_mm(pad.pos_x), fmt_mm(pad.pos_y), fmt_mm(pad.rotation))
        } else {
            format!("{} {}", fmt_mm(pad.pos_x), fmt_mm(pad.pos_y))
        };
        let _ = write!(
            out,
            "  (pad {} {} {} (at {}) (size {} {})",
            quote(&pad.number),
            pad.pad_type.as_str(),
            pad.shape.as_str(),
            at,
            fmt_mm(pad.size_x),
            fmt_mm(pad.size_y)
        );
        if let Some(drill) = &pad.drill {
            match drill.width {
                Some(width) => {
                    let _ = write!(out, " (drill oval {} {})", fmt_mm(drill.diameter), fmt_mm(width));
                }
                None => {
                    let _ = write!(out, " (drill {})", fmt_mm(drill.diameter));
                }
            }
        }
        let layers: Vec<String> = pad.layers.iter().map(|l| quote(l)).collect();
        let _ = write!(out, " (layers {})", layers.join(" "));

        if let Some(points) = &pad.polygon {
            out.push_str("\n    (options (clearance outline) (anchor circle))\n    (primitives\n      (gr_poly (pts");
            for (x, y) in points {
                let _ = write!(out, " (xy {} {})", fmt_mm(*x), fmt_mm(*y));
            }
            out.push_str(") (width 0.1) (fill yes))\n    )\n  ");
        }
        out.push_str(")\n");
    }

}

fn fill(fill: bool) -> &'static str {
    if fill { "solid" } else { "none" }
}

/// Renders the `(model ...)` block on its own; also used to patch placement.
pub fn model_block(model: &Ki3dModel) -> String {
    let (ox, oy, oz) = model.offset;
    let (sx, sy, sz) = model.scale;
    let (rx, ry, rz) = model.rotate;
    format!(
        "  (model {}\n    (offset (xyz {} {} {}))\n    (scale (xyz {} {} {}))\n    (rotate (xyz {} {} {}))\n  )\n",
        quote(&model.path),
        fmt_mm(ox), fmt_mm(oy), fmt_mm(oz),
        fmt_mm(sx), fmt_mm(sy), fmt_mm(sz),
        fmt_mm(rx), fmt_mm(ry), fmt_mm(rz)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kicad::sexpr;

    fn footprint() -> KiFootprint {
        KiFootprint {
            name: "SOT-23_C8545".to_string(),
            description: "SOT-23".to_string(),
            pads: vec![KiPad {
                number: "1".to_string(),
                pad_type: PadType::Smd,
                shape: PadShape::Rect,
                pos_x: -0.95,
                pos_y: 1.1,
                size_x: 0.6,
                size_y: 1.2,
                rotation: 0.0,
                layers: vec!["F.Cu".to_string(), "F.Paste".to_string(), "F.Mask".to_string()],
                drill: None,
                polygon: None,
            }],
            lines: vec![],
            circles: vec![],
            arcs: vec![],
            polygons: vec![],
            texts: vec![],
            model_3d: Some(Ki3dModel {
                path: "${LCSC_GRABBER_3D}/C8545.step".to_string(),
                offset: (0.0, 0.0, 0.0),
                scale: (1.0, 1.0, 1.0),
                rotate: (0.0, 0.0, 90.0),
            }),
        }
    }

    #[test]
    fn dialects_differ_in_reference_field() {
        let v7 = FootprintExporter::new(LibraryFormat::V7).export(&footprint());
        assert!(v7.contains("(fp_text reference \"REF**\""));
        assert!(v7.contains("(version 20221018)"));

        let v8 = FootprintExporter::new(LibraryFormat::V8).export(&footprint());
        assert!(v8.contains("(property \"Reference\" \"REF**\""));
        assert!(v8.contains("(generator_version"));
        assert!(!v8.contains("embedded_fonts"));
    }

    #[test]
    fn export_parses_and_carries_model() {
        let text = FootprintExporter::new(LibraryFormat::V9).export(&footprint());
        let root = sexpr::parse(&text).unwrap();
        assert_eq!(sexpr::read_version(&root), Some(20241229));
        let model = root.child("model").unwrap();
        assert_eq!(model.atom_at(1), Some("${LCSC_GRABBER_3D}/C8545.step"));
        assert!(text.contains("(attr smd)"));
    }
}
