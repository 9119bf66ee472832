//! Parsers for EasyEDA's `~`-delimited shape strings.
//!
//! Values stay in EasyEDA units (10 mil); unit conversion and axis flipping
//! happen in [`crate::converter`].

use crate::easyeda::models::{FootprintData, SymbolData};
use crate::error::{ConvertError, Result};

/// Symbol shape tags with no schematic geometry worth carrying over.
const SYMBOL_DECORATIONS: &[&str] = &["T", "J", "I", "SVGNODE"];
/// Footprint shape tags with no KiCad footprint counterpart that we skip.
const FOOTPRINT_DECORATIONS: &[&str] = &["SVGNODE", "COPPERAREA", "DIMENSION", "PROTRACTOR", "IMAGE"];

#[derive(Debug, Clone, PartialEq)]
pub struct EePin {
    pub number: String,
    pub name: String,
    pub electric_type: String,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub length: f64,
    pub dot: bool,
    pub clock: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub stroke_width: f64,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeCircle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
    pub stroke_width: f64,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeEllipse {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
    pub stroke_width: f64,
    pub fill: bool,
}

/// Arc stored as an SVG path: `M x y A rx ry rot large sweep x y`.
#[derive(Debug, Clone, PartialEq)]
pub struct EeArc {
    pub path: String,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EePolyline {
    pub points: Vec<(f64, f64)>,
    pub stroke_width: f64,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EePath {
    pub path_data: String,
    pub stroke_width: f64,
    pub fill: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EeSymbol {
    pub pins: Vec<EePin>,
    pub rectangles: Vec<EeRectangle>,
    pub circles: Vec<EeCircle>,
    pub ellipses: Vec<EeEllipse>,
    pub arcs: Vec<EeArc>,
    pub polylines: Vec<EePolyline>,
    pub polygons: Vec<EePolyline>,
    pub paths: Vec<EePath>,
}

pub struct SymbolImporter;

impl SymbolImporter {
    pub fn parse(data: &SymbolData) -> Result<EeSymbol> {
        let mut symbol = EeSymbol::default();

        for shape in &data.shapes {
            let fields: Vec<&str> = shape.split('~').collect();
            match fields[0] {
                "P" => match parse_pin(shape) {
                    Some(pin) => symbol.pins.push(pin),
                    None => log::warn!("Skipping malformed pin: {}", shape),
                },
                "R" if fields.len() > 6 => symbol.rectangles.push(EeRectangle {
                    x: float(&fields, 1),
                    y: float(&fields, 2),
                    width: float(&fields, 5),
                    height: float(&fields, 6),
                    stroke_width: float(&fields, 8),
                    fill: is_filled(field(&fields, 10)),
                }),
                "C" if fields.len() > 3 => symbol.circles.push(EeCircle {
                    cx: float(&fields, 1),
                    cy: float(&fields, 2),
                    radius: float(&fields, 3),
                    stroke_width: float(&fields, 5),
                    fill: is_filled(field(&fields, 7)),
                }),
                "E" if fields.len() > 4 => symbol.ellipses.push(EeEllipse {
                    cx: float(&fields, 1),
                    cy: float(&fields, 2),
                    rx: float(&fields, 3),
                    ry: float(&fields, 4),
                    stroke_width: float(&fields, 6),
                    fill: is_filled(field(&fields, 8)),
                }),
                "A" if fields.len() > 1 => symbol.arcs.push(EeArc {
                    path: fields[1].to_string(),
                    stroke_width: float(&fields, 4),
                }),
                "PL" | "PG" if fields.len() > 1 => {
                    let polyline = EePolyline {
                        points: parse_points(fields[1]),
                        stroke_width: float(&fields, 3),
                        fill: is_filled(field(&fields, 5)),
                    };
                    if fields[0] == "PL" {
                        symbol.polylines.push(polyline);
                    } else {
                        symbol.polygons.push(polyline);
                    }
                }
                "PT" if fields.len() > 1 => symbol.paths.push(EePath {
                    path_data: fields[1].to_string(),
                    stroke_width: float(&fields, 3),
                    fill: is_filled(field(&fields, 5)),
                }),
                "L" if fields.len() > 4 => symbol.polylines.push(EePolyline {
                    points: vec![
                        (float(&fields, 1), float(&fields, 2)),
                        (float(&fields, 3), float(&fields, 4)),
                    ],
                    stroke_width: float(&fields, 6),
                    fill: false,
                }),
                tag if SYMBOL_DECORATIONS.contains(&tag) => {}
                "R" | "C" | "E" | "A" | "PL" | "PG" | "PT" | "L" => {
                    log::warn!("Skipping truncated {} shape", fields[0]);
                }
                tag => {
                    return Err(ConvertError::unsupported("symbol primitive", tag).into());
                }
            }
        }

        log::debug!(
            "Parsed symbol: {} pins, {} rectangles, {} arcs, {} polylines",
            symbol.pins.len(),
            symbol.rectangles.len(),
            symbol.arcs.len(),
            symbol.polylines.len() + symbol.polygons.len()
        );

        Ok(symbol)
    }
}

/// `P~settings^^dot^^path^^name^^number^^inverted^^clock`.
fn parse_pin(shape: &str) -> Option<EePin> {
    let segments: Vec<&str> = shape.split("^^").collect();
    let settings: Vec<&str> = segments.first()?.split('~').collect();
    if settings.len() < 7 {
        return None;
    }

    let path = segments.get(2).and_then(|s| s.split('~').next()).unwrap_or("");
    let name = segments.get(3)
        .and_then(|s| s.split('~').nth(4))
        .unwrap_or("")
        .to_string();
    let number = match settings[3] {
        "" => segments.get(4).and_then(|s| s.split('~').nth(4)).unwrap_or("").to_string(),
        n => n.to_string(),
    };
    let flag = |index: usize| {
        segments.get(index)
            .and_then(|s| s.split('~').next())
            .map(|v| v == "1")
            .unwrap_or(false)
    };

    Some(EePin {
        number,
        name,
        electric_type: settings[2].to_string(),
        x: settings[4].parse().ok()?,
        y: settings[5].parse().ok()?,
        rotation: settings[6].parse().unwrap_or(0.0),
        length: pin_length(path),
        dot: flag(5),
        clock: flag(6),
    })
}

/// Length of a pin from its drawing path, e.g. `M 340 290 h -10`.
fn pin_length(path: &str) -> f64 {
    let tokens: Vec<&str> = path.split_whitespace().collect();
    tokens.windows(2)
        .find(|pair| matches!(pair[0], "h" | "v" | "H" | "V"))
        .and_then(|pair| pair[1].parse::<f64>().ok())
        .map(f64::abs)
        .unwrap_or(10.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EePad {
    pub shape: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub layer_id: u32,
    pub number: String,
    pub hole_radius: Option<f64>,
    pub points: String,
    pub rotation: f64,
    pub hole_length: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeTrack {
    pub stroke_width: f64,
    pub layer_id: u32,
    pub points: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeFpCircle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
    pub stroke_width: f64,
    pub layer_id: u32,
    pub fill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeFpArc {
    pub stroke_width: f64,
    pub layer_id: u32,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeFpRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub stroke_width: f64,
    pub layer_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeText {
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub stroke_width: f64,
    pub rotation: f64,
    pub layer_id: u32,
    pub font_size: f64,
    pub text: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeHole {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeVia {
    pub x: f64,
    pub y: f64,
    pub diameter: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EeSolidRegion {
    pub layer_id: u32,
    pub path: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EeFootprint {
    pub pads: Vec<EePad>,
    pub tracks: Vec<EeTrack>,
    pub circles: Vec<EeFpCircle>,
    pub arcs: Vec<EeFpArc>,
    pub rectangles: Vec<EeFpRect>,
    pub texts: Vec<EeText>,
    pub holes: Vec<EeHole>,
    pub vias: Vec<EeVia>,
    pub regions: Vec<EeSolidRegion>,
}

pub struct FootprintImporter;

impl FootprintImporter {
    pub fn parse(data: &FootprintData) -> Result<EeFootprint> {
        let mut footprint = EeFootprint::default();

        for shape in &data.shapes {
            let fields: Vec<&str> = shape.split('~').collect();
            match fields[0] {
                "PAD" if fields.len() > 8 => footprint.pads.push(EePad {
                    shape: fields[1].to_uppercase(),
                    x: float(&fields, 2),
                    y: float(&fields, 3),
                    width: float(&fields, 4),
                    height: float(&fields, 5),
                    layer_id: layer(&fields, 6),
                    number: fields[8].to_string(),
                    hole_radius: positive(float(&fields, 9)),
                    points: field(&fields, 10).to_string(),
                    rotation: float(&fields, 11),
                    hole_length: positive(float(&fields, 13)),
                }),
                "TRACK" if fields.len() > 4 => footprint.tracks.push(EeTrack {
                    stroke_width: float(&fields, 1),
                    layer_id: layer(&fields, 2),
                    points: fields[4].to_string(),
                }),
                "CIRCLE" if fields.len() > 5 => footprint.circles.push(EeFpCircle {
                    cx: float(&fields, 1),
                    cy: float(&fields, 2),
                    radius: float(&fields, 3),
                    stroke_width: float(&fields, 4),
                    layer_id: layer(&fields, 5),
                    fill: false,
                }),
                "ARC" if fields.len() > 4 => footprint.arcs.push(EeFpArc {
                    stroke_width: float(&fields, 1),
                    layer_id: layer(&fields, 2),
                    path: fields[4].to_string(),
                }),
                "RECT" if fields.len() > 5 => footprint.rectangles.push(EeFpRect {
                    x: float(&fields, 1),
                    y: float(&fields, 2),
                    width: float(&fields, 3),
                    height: float(&fields, 4),
                    stroke_width: float(&fields, 5),
                    layer_id: layer(&fields, 7),
                }),
                "TEXT" if fields.len() > 10 => footprint.texts.push(EeText {
                    kind: fields[1].to_string(),
                    x: float(&fields, 2),
                    y: float(&fields, 3),
                    stroke_width: float(&fields, 4),
                    rotation: float(&fields, 5),
                    layer_id: layer(&fields, 7),
                    font_size: float(&fields, 9),
                    text: fields[10].to_string(),
                    visible: field(&fields, 12) != "none",
                }),
                "HOLE" if fields.len() > 3 => footprint.holes.push(EeHole {
                    x: float(&fields, 1),
                    y: float(&fields, 2),
                    radius: float(&fields, 3),
                }),
                "VIA" if fields.len() > 5 => footprint.vias.push(EeVia {
                    x: float(&fields, 1),
                    y: float(&fields, 2),
                    diameter: float(&fields, 3),
                    radius: float(&fields, 5),
                }),
                "SOLIDREGION" if fields.len() > 3 => footprint.regions.push(EeSolidRegion {
                    layer_id: layer(&fields, 1),
                    path: fields[3].to_string(),
                    kind: field(&fields, 4).to_string(),
                }),
                tag if FOOTPRINT_DECORATIONS.contains(&tag) => {}
                "PAD" | "TRACK" | "CIRCLE" | "ARC" | "RECT" | "TEXT" | "HOLE" | "VIA" | "SOLIDREGION" => {
                    log::warn!("Skipping truncated {} shape", fields[0]);
                }
                tag => {
                    return Err(ConvertError::unsupported("footprint primitive", tag).into());
                }
            }
        }

        log::debug!(
            "Parsed footprint {}: {} pads, {} tracks, {} holes",
            data.title,
            footprint.pads.len(),
            footprint.tracks.len(),
            footprint.holes.len()
        );

        Ok(footprint)
    }
}

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

fn float(fields: &[&str], index: usize) -> f64 {
    field(fields, index).trim().parse().unwrap_or(0.0)
}

fn layer(fields: &[&str], index: usize) -> u32 {
    field(fields, index).trim().parse().unwrap_or(0)
}

fn positive(value: f64) -> Option<f64> {
    (value > 0.0).then_some(value)
}

fn is_filled(color: &str) -> bool {
    !color.is_empty() && !color.eq_ignore_ascii_case("none")
}

/// Parses `x1 y1 x2 y2 ...` (commas allowed) into coordinate pairs.
pub fn parse_points(points: &str) -> Vec<(f64, f64)> {
    let values: Vec<f64> = points
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(shapes: &[&str]) -> SymbolData {
        SymbolData {
            shapes: shapes.iter().map(|s| s.to_string()).collect(),
            origin_x: 400.0,
            origin_y: 300.0,
            prefix: Some("U?".to_string()),
        }
    }

    #[test]
    fn parses_pin_segments() {
        let data = symbol(&[
            "P~show~1~3~340~290~180~gge1~0^^340~290^^M 340 290 h -20~#880000^^1~333~293~0~PA0~start~~~#0000FF^^1~337.5~289~0~3~end~~~#0000FF^^1~337~290^^0~M 334 287 L 331 290 L 334 293",
        ]);
        let parsed = SymbolImporter::parse(&data).unwrap();
        let pin = &parsed.pins[0];
        assert_eq!(pin.number, "3");
        assert_eq!(pin.name, "PA0");
        assert_eq!(pin.electric_type, "1");
        assert_eq!((pin.x, pin.y, pin.rotation), (340.0, 290.0, 180.0));
        assert_eq!(pin.length, 20.0);
        assert!(pin.dot);
        assert!(!pin.clock);
    }

    #[test]
    fn skips_text_but_rejects_unknown_primitives() {
        let ok = symbol(&["T~L~400~300~0~#000~~5pt~~~~comment~U1~1~start~gge2~0~pinpart"]);
        assert!(SymbolImporter::parse(&ok).unwrap().pins.is_empty());

        let bad = symbol(&["PI~400~300~10~10~0~90"]);
        let err = SymbolImporter::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("PI"));
    }

    #[test]
    fn parses_footprint_shapes() {
        let data = FootprintData {
            title: "SOT-23".to_string(),
            shapes: vec![
                "PAD~RECT~4000~3000~6~4~1~~1~0~3997 2998 4003 2998 4003 3002 3997 3002~90~gge5~0~~Y~0".to_string(),
                "PAD~ELLIPSE~4010~3000~6~6~11~~2~1.5~~0~gge6~0~~Y~0".to_string(),
                "TRACK~1~3~~3990 2990 4020 2990~gge7~0".to_string(),
                "HOLE~4005~3010~2~gge8~0".to_string(),
                "SVGNODE~{}".to_string(),
            ],
            origin_x: 4000.0,
            origin_y: 3000.0,
        };
        let fp = FootprintImporter::parse(&data).unwrap();
        assert_eq!(fp.pads.len(), 2);
        assert_eq!(fp.pads[0].number, "1");
        assert_eq!(fp.pads[0].rotation, 90.0);
        assert_eq!(fp.pads[0].hole_radius, None);
        assert_eq!(fp.pads[1].hole_radius, Some(1.5));
        assert_eq!(fp.tracks[0].layer_id, 3);
        assert_eq!(fp.holes[0].radius, 2.0);
    }

    #[test]
    fn parse_points_accepts_commas() {
        assert_eq!(parse_points("1,2 3 4 5"), vec![(1.0, 2.0), (3.0, 4.0)]);
    }
}
