//! EasyEDA primitives to KiCad models.

use std::f64::consts::PI;

use crate::easyeda::importer::{parse_points, EePad, FootprintImporter, SymbolImporter};
use crate::easyeda::models::{ComponentData, FootprintData, SymbolData};
use crate::error::{ConvertError, Result};
use crate::kicad::{
    self, Drill, FootprintKiArc, FootprintKiCircle, KiCircle, KiFootprint, KiLine, KiPad, KiPin,
    KiPolygon, KiPolyline, KiRectangle, KiSymbol, KiText, PadShape, PadType, PinStyle, PinType,
    SymbolKiArc,
};

const COURTYARD_MARGIN: f64 = 0.25;
const COURTYARD_WIDTH: f64 = 0.05;
const MIN_WIDTH: f64 = 0.01;

/// Keyword to reference designator prefix, checked in order.
const PREFIX_KEYWORDS: &[(&str, &str)] = &[
    ("resistor", "R"),
    ("capacitor", "C"),
    ("inductor", "L"),
    ("led", "D"),
    ("diode", "D"),
    ("mosfet", "Q"),
    ("transistor", "Q"),
    ("connector", "J"),
    ("switch", "SW"),
    ("relay", "K"),
    ("crystal", "Y"),
    ("oscillator", "Y"),
    ("transformer", "T"),
    ("fuse", "F"),
    ("mcu", "U"),
    ("microcontroller", "U"),
    ("ic", "U"),
    ("sensor", "U"),
];

/// Centre form of an SVG elliptical arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcGeometry {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
    pub rotation: f64,
    /// Radians.
    pub start_angle: f64,
    /// Signed sweep in radians.
    pub sweep_angle: f64,
}

impl ArcGeometry {
    pub fn point_at(&self, angle: f64) -> (f64, f64) {
        let (sin_phi, cos_phi) = self.rotation.sin_cos();
        let (sin_t, cos_t) = angle.sin_cos();
        (
            self.cx + self.rx * cos_t * cos_phi - self.ry * sin_t * sin_phi,
            self.cy + self.rx * cos_t * sin_phi + self.ry * sin_t * cos_phi,
        )
    }

    pub fn midpoint(&self) -> (f64, f64) {
        self.point_at(self.start_angle + self.sweep_angle / 2.0)
    }
}

/// Parsed `M sx sy A rx ry rot large sweep ex ey`.
struct SvgArc {
    start: (f64, f64),
    radii: (f64, f64),
    rotation: f64,
    large_arc: bool,
    sweep: bool,
    end: (f64, f64),
}

pub struct Converter;

impl Converter {
    pub fn new() -> Self {
        Self
    }

    /// EasyEDA units are 10 mil.
    pub fn px_to_mm(&self, value: f64) -> f64 {
        value * 0.254
    }

    /// SVG endpoint-to-centre conversion; out-of-range radii are scaled up
    /// as the SVG rules require.
    pub fn compute_arc_center(
        &self,
        start: (f64, f64),
        end: (f64, f64),
        radii: (f64, f64),
        rotation_deg: f64,
        large_arc: bool,
        sweep: bool,
    ) -> Result<ArcGeometry> {
        let (x1, y1) = start;
        let (x2, y2) = end;
        let (mut rx, mut ry) = (radii.0.abs(), radii.1.abs());

        if rx < f64::EPSILON || ry < f64::EPSILON {
            return Err(ConvertError::unsupported("arc", "zero radius").into());
        }
        if (x1 - x2).abs() < f64::EPSILON && (y1 - y2).abs() < f64::EPSILON {
            return Err(ConvertError::unsupported("arc", "start and end coincide").into());
        }

        let phi = rotation_deg.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let dx2 = (x1 - x2) / 2.0;
        let dy2 = (y1 - y2) / 2.0;
        let x1p = cos_phi * dx2 + sin_phi * dy2;
        let y1p = -sin_phi * dx2 + cos_phi * dy2;

        let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
        if lambda > 1.0 {
            rx *= lambda.sqrt();
            ry *= lambda.sqrt();
        }

        let numerator = rx * rx * ry * ry - rx * rx * y1p * y1p - ry * ry * x1p * x1p;
        let denominator = rx * rx * y1p * y1p + ry * ry * x1p * x1p;
        let mut coef = (numerator / denominator).max(0.0).sqrt();
        if large_arc == sweep {
            coef = -coef;
        }
        let cxp = coef * rx * y1p / ry;
        let cyp = -coef * ry * x1p / rx;

        let cx = cos_phi * cxp - sin_phi * cyp + (x1 + x2) / 2.0;
        let cy = sin_phi * cxp + cos_phi * cyp + (y1 + y2) / 2.0;

        let (ux, uy) = ((x1p - cxp) / rx, (y1p - cyp) / ry);
        let (vx, vy) = ((-x1p - cxp) / rx, (-y1p - cyp) / ry);
        let start_angle = uy.atan2(ux);
        let mut sweep_angle = (ux * vy - uy * vx).atan2(ux * vx + uy * vy);
        if !sweep && sweep_angle > 0.0 {
            sweep_angle -= 2.0 * PI;
        } else if sweep && sweep_angle < 0.0 {
            sweep_angle += 2.0 * PI;
        }

        if !(cx.is_finite() && cy.is_finite() && sweep_angle.is_finite()) {
            return Err(ConvertError::unsupported("arc", "unresolvable geometry").into());
        }

        Ok(ArcGeometry { cx, cy, rx, ry, rotation: phi, start_angle, sweep_angle })
    }

    /// Converts the catalog symbol to a KiCad symbol named `name` whose
    /// `Footprint` property is `footprint_ref`.
    pub fn convert_symbol(
        &self,
        component: &ComponentData,
        data: &SymbolData,
        name: &str,
        footprint_ref: &str,
        category: &str,
    ) -> Result<KiSymbol> {
        let ee = SymbolImporter::parse(data)?;
        let (ox, oy) = (data.origin_x, data.origin_y);
        let point = |x: f64, y: f64| (self.px_to_mm(x - ox), -self.px_to_mm(y - oy));

        let mut symbol = KiSymbol {
            name: name.to_string(),
            reference: reference_prefix(data.prefix.as_deref(), &component.title, category),
            value: component.title.clone(),
            footprint: footprint_ref.to_string(),
            datasheet: component.datasheet.clone(),
            description: component.description.clone(),
            manufacturer: component.manufacturer.clone(),
            lcsc_id: component.lcsc_id.clone(),
            jlc_id: component.jlc_id.clone(),
            pins: Vec::new(),
            rectangles: Vec::new(),
            circles: Vec::new(),
            arcs: Vec::new(),
            polylines: Vec::new(),
        };

        for pin in &ee.pins {
            if pin.length >= 100.0 {
                log::warn!("Pin {} ({}) has unusual length: {}", pin.number, pin.name, pin.length);
            }
            let (x, y) = point(pin.x, pin.y);
            symbol.pins.push(KiPin {
                number: pin.number.clone(),
                name: pin.name.clone(),
                pin_type: PinType::from_easyeda(&pin.electric_type),
                style: PinStyle::from_flags(pin.dot, pin.clock),
                pos_x: x,
                pos_y: y,
                rotation: (pin.rotation + 180.0) % 360.0,
                length: self.px_to_mm(pin.length),
            });
        }

        for (idx, rect) in ee.rectangles.iter().enumerate() {
            let (x1, y1) = point(rect.x, rect.y);
            let (x2, y2) = point(rect.x + rect.width, rect.y + rect.height);
            symbol.rectangles.push(KiRectangle {
                x1,
                y1,
                x2,
                y2,
                stroke_width: self.px_to_mm(rect.stroke_width),
                // The first rectangle is the body outline.
                fill: idx == 0 || rect.fill,
            });
        }

        for circle in &ee.circles {
            let (cx, cy) = point(circle.cx, circle.cy);
            symbol.circles.push(KiCircle {
                cx,
                cy,
                radius: self.px_to_mm(circle.radius),
                stroke_width: self.px_to_mm(circle.stroke_width),
                fill: circle.fill,
            });
        }

        for ellipse in &ee.ellipses {
            let (cx, cy) = point(ellipse.cx, ellipse.cy);
            symbol.circles.push(KiCircle {
                cx,
                cy,
                radius: self.px_to_mm((ellipse.rx + ellipse.ry) / 2.0),
                stroke_width: self.px_to_mm(ellipse.stroke_width),
                fill: ellipse.fill,
            });
        }

        for arc in &ee.arcs {
            let svg = parse_svg_arc(&arc.path)?;
            let geometry = self.compute_arc_center(svg.start, svg.end, svg.radii, svg.rotation, svg.large_arc, svg.sweep)?;
            let (start_x, start_y) = point(svg.start.0, svg.start.1);
            let (mid_x, mid_y) = {
                let (mx, my) = geometry.midpoint();
                point(mx, my)
            };
            let (end_x, end_y) = point(svg.end.0, svg.end.1);
            symbol.arcs.push(SymbolKiArc {
                start_x,
                start_y,
                mid_x,
                mid_y,
                end_x,
                end_y,
                stroke_width: self.px_to_mm(arc.stroke_width),
            });
        }

        let open = ee.polylines.iter().map(|p| (p, false));
        let closed = ee.polygons.iter().map(|p| (p, true));
        for (polyline, closed) in open.chain(closed) {
            let mut points: Vec<(f64, f64)> = polyline.points.iter().map(|(x, y)| point(*x, *y)).collect();
            if closed && points.first() != points.last() {
                if let Some(first) = points.first().copied() {
                    points.push(first);
                }
            }
            symbol.polylines.push(KiPolyline {
                points,
                stroke_width: self.px_to_mm(polyline.stroke_width),
                fill: polyline.fill,
            });
        }

        for path in &ee.paths {
            let points: Vec<(f64, f64)> = path_points(&path.path_data)?
                .into_iter()
                .map(|(x, y)| point(x, y))
                .collect();
            if points.len() >= 2 {
                symbol.polylines.push(KiPolyline {
                    points,
                    stroke_width: self.px_to_mm(path.stroke_width),
                    fill: path.fill,
                });
            }
        }

        log::debug!("Converted symbol {}: {} pins", symbol.name, symbol.pins.len());
        Ok(symbol)
    }

    pub fn convert_footprint(&self, data: &FootprintData, name: &str) -> Result<KiFootprint> {
        let ee = FootprintImporter::parse(data)?;
        let (ox, oy) = (data.origin_x, data.origin_y);
        let point = |x: f64, y: f64| (self.px_to_mm(x - ox), self.px_to_mm(y - oy));
        let width = |w: f64| self.px_to_mm(w).max(MIN_WIDTH);

        let mut footprint = KiFootprint {
            name: name.to_string(),
            description: data.title.clone(),
            pads: Vec::new(),
            lines: Vec::new(),
            circles: Vec::new(),
            arcs: Vec::new(),
            polygons: Vec::new(),
            texts: Vec::new(),
            model_3d: None,
        };

        for pad in &ee.pads {
            footprint.pads.push(self.convert_pad(pad, ox, oy)?);
        }

        for track in &ee.tracks {
            let points: Vec<(f64, f64)> = parse_points(&track.points)
                .into_iter()
                .map(|(x, y)| point(x, y))
                .collect();
            for segment in points.windows(2) {
                footprint.lines.push(KiLine {
                    start_x: segment[0].0,
                    start_y: segment[0].1,
                    end_x: segment[1].0,
                    end_y: segment[1].1,
                    width: width(track.stroke_width),
                    layer: kicad::map_layer(track.layer_id).to_string(),
                });
            }
        }

        for circle in &ee.circles {
            let (cx, cy) = point(circle.cx, circle.cy);
            footprint.circles.push(FootprintKiCircle {
                center_x: cx,
                center_y: cy,
                end_x: cx + self.px_to_mm(circle.radius),
                end_y: cy,
                width: width(circle.stroke_width),
                layer: kicad::map_layer(circle.layer_id).to_string(),
                fill: circle.fill,
            });
        }

        for arc in &ee.arcs {
            let svg = parse_svg_arc(&arc.path)?;
            let geometry = self.compute_arc_center(svg.start, svg.end, svg.radii, svg.rotation, svg.large_arc, svg.sweep)?;
            let (start_x, start_y) = point(svg.start.0, svg.start.1);
            let (mx, my) = geometry.midpoint();
            let (mid_x, mid_y) = point(mx, my);
            let (end_x, end_y) = point(svg.end.0, svg.end.1);
            footprint.arcs.push(FootprintKiArc {
                start_x,
                start_y,
                mid_x,
                mid_y,
                end_x,
                end_y,
                width: width(arc.stroke_width),
                layer: kicad::map_layer(arc.layer_id).to_string(),
            });
        }

        for rect in &ee.rectangles {
            let (x1, y1) = point(rect.x, rect.y);
            let (x2, y2) = point(rect.x + rect.width, rect.y + rect.height);
            let layer = kicad::map_layer(rect.layer_id);
            footprint.lines.extend(rectangle_lines(x1, y1, x2, y2, width(rect.stroke_width), layer));
        }

        for region in &ee.regions {
            let points: Vec<(f64, f64)> = path_points(&region.path)?
                .into_iter()
                .map(|(x, y)| point(x, y))
                .collect();
            if points.len() < 3 {
                log::warn!("Skipping solid region with {} points", points.len());
                continue;
            }
            let layer = kicad::map_layer(region.layer_id);
            footprint.polygons.push(KiPolygon {
                points,
                width: 0.0,
                layer: layer.to_string(),
                fill: layer != "Edge.Cuts",
            });
        }

        for text in &ee.texts {
            // Reference and value come from the footprint's own fields.
            if matches!(text.kind.as_str(), "N" | "P") || !text.visible || text.text.is_empty() {
                continue;
            }
            let (x, y) = point(text.x, text.y);
            footprint.texts.push(KiText {
                text: text.text.clone(),
                pos_x: x,
                pos_y: y,
                rotation: text.rotation,
                layer: kicad::map_layer(text.layer_id).to_string(),
                size: self.px_to_mm(text.font_size).max(0.5),
                thickness: width(text.stroke_width),
            });
        }

        for hole in &ee.holes {
            let (x, y) = point(hole.x, hole.y);
            let diameter = self.px_to_mm(hole.radius * 2.0);
            footprint.pads.push(KiPad {
                number: String::new(),
                pad_type: PadType::NpThroughHole,
                shape: PadShape::Circle,
                pos_x: x,
                pos_y: y,
                size_x: diameter,
                size_y: diameter,
                rotation: 0.0,
                layers: vec!["*.Cu".to_string(), "*.Mask".to_string()],
                drill: Some(Drill { diameter, width: None }),
                polygon: None,
            });
        }

        for via in &ee.vias {
            let (x, y) = point(via.x, via.y);
            let size = self.px_to_mm(via.diameter);
            footprint.pads.push(KiPad {
                number: String::new(),
                pad_type: PadType::ThroughHole,
                shape: PadShape::Circle,
                pos_x: x,
                pos_y: y,
                size_x: size,
                size_y: size,
                rotation: 0.0,
                layers: vec!["*.Cu".to_string(), "*.Mask".to_string()],
                drill: Some(Drill { diameter: self.px_to_mm(via.radius * 2.0), width: None }),
                polygon: None,
            });
        }

        if !footprint.lines.iter().any(|l| l.layer == "F.CrtYd") {
            if let Some((min_x, min_y, max_x, max_y)) = extent(&footprint) {
                footprint.lines.extend(rectangle_lines(
                    min_x - COURTYARD_MARGIN,
                    min_y - COURTYARD_MARGIN,
                    max_x + COURTYARD_MARGIN,
                    max_y + COURTYARD_MARGIN,
                    COURTYARD_WIDTH,
                    "F.CrtYd",
                ));
            }
        }

        log::debug!("Converted footprint {}: {} pads", footprint.name, footprint.pads.len());
        Ok(footprint)
    }

    fn convert_pad(&self, pad: &EePad, ox: f64, oy: f64) -> Result<KiPad> {
        let shape = PadShape::from_easyeda(&pad.shape, pad.width, pad.height)
            .ok_or_else(|| ConvertError::unsupported("pad shape", format!("{} (pad {})", pad.shape, pad.number)))?;

        let pad_type = if pad.hole_radius.is_some() { PadType::ThroughHole } else { PadType::Smd };
        let layers = match pad_type {
            PadType::ThroughHole => kicad::map_pad_layers_tht(pad.layer_id),
            _ => kicad::map_pad_layers_smd(pad.layer_id),
        };

        let drill = pad.hole_radius.map(|hole_radius| {
            let diameter = hole_radius * 2.0;
            match pad.hole_length {
                Some(hole_length) => {
                    let longest = diameter.max(hole_length);
                    // Orient the slot along the longer side of the pad.
                    if pad.height - longest > pad.width - longest {
                        Drill { diameter: self.px_to_mm(diameter), width: Some(self.px_to_mm(hole_length)) }
                    } else {
                        Drill { diameter: self.px_to_mm(hole_length), width: Some(self.px_to_mm(diameter)) }
                    }
                }
                None => Drill { diameter: self.px_to_mm(diameter), width: None },
            }
        });

        let pos_x = self.px_to_mm(pad.x - ox);
        let pos_y = self.px_to_mm(pad.y - oy);

        if shape == PadShape::Custom {
            let outline = parse_points(&pad.points);
            if outline.len() < 3 {
                return Err(ConvertError::unsupported(
                    "polygon pad",
                    format!("pad {} has {} vertices", pad.number, outline.len()),
                ).into());
            }
            let polygon = outline.into_iter()
                .map(|(x, y)| (self.px_to_mm(x - ox) - pos_x, self.px_to_mm(y - oy) - pos_y))
                .collect();
            return Ok(KiPad {
                number: pad.number.clone(),
                pad_type,
                shape,
                pos_x,
                pos_y,
                size_x: MIN_WIDTH,
                size_y: MIN_WIDTH,
                rotation: 0.0,
                layers,
                drill,
                polygon: Some(polygon),
            });
        }

        Ok(KiPad {
            number: pad.number.clone(),
            pad_type,
            shape,
            pos_x,
            pos_y,
            size_x: self.px_to_mm(pad.width).max(MIN_WIDTH),
            size_y: self.px_to_mm(pad.height).max(MIN_WIDTH),
            rotation: angle_to_ki(pad.rotation),
            layers,
            drill,
            polygon: None,
        })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

/// `{title}_{id}`, the name used for the symbol, footprint and manifest entry.
pub fn component_name(component: &ComponentData) -> String {
    format!("{}_{}", sanitize_name(&component.title), component.lcsc_id)
}

pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Reference prefix from `c_para.pre` (`U?` becomes `U`), else guessed.
pub fn reference_prefix(declared: Option<&str>, title: &str, category: &str) -> String {
    let declared = declared.unwrap_or("").trim().trim_end_matches('?').trim();
    if !declared.is_empty() {
        return declared.to_string();
    }
    guess_prefix(&format!("{} {}", title, category))
}

pub fn guess_prefix(text: &str) -> String {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    PREFIX_KEYWORDS.iter()
        .find(|(keyword, _)| words.iter().any(|w| w == keyword || w.strip_suffix('s') == Some(keyword)))
        .map(|(_, prefix)| prefix.to_string())
        .unwrap_or_else(|| "U".to_string())
}

/// Negates angles above 180° to match KiCad's convention.
fn angle_to_ki(rotation: f64) -> f64 {
    if rotation > 180.0 {
        -(360.0 - rotation)
    } else {
        rotation
    }
}

fn rectangle_lines(x1: f64, y1: f64, x2: f64, y2: f64, width: f64, layer: &str) -> Vec<KiLine> {
    let corners = [(x1, y1), (x2, y1), (x2, y2), (x1, y2), (x1, y1)];
    corners.windows(2)
        .map(|pair| KiLine {
            start_x: pair[0].0,
            start_y: pair[0].1,
            end_x: pair[1].0,
            end_y: pair[1].1,
            width,
            layer: layer.to_string(),
        })
        .collect()
}

/// Bounding box over pads and drawn graphics.
fn extent(footprint: &KiFootprint) -> Option<(f64, f64, f64, f64)> {
    let mut points: Vec<(f64, f64)> = Vec::new();
    for pad in &footprint.pads {
        match &pad.polygon {
            Some(outline) => points.extend(outline.iter().map(|(x, y)| (pad.pos_x + x, pad.pos_y + y))),
            None => {
                let half = pad.size_x.max(pad.size_y) / 2.0;
                points.push((pad.pos_x - half, pad.pos_y - half));
                points.push((pad.pos_x + half, pad.pos_y + half));
            }
        }
    }
    for line in &footprint.lines {
        points.push((line.start_x, line.start_y));
        points.push((line.end_x, line.end_y));
    }
    for arc in &footprint.arcs {
        points.extend([(arc.start_x, arc.start_y), (arc.mid_x, arc.mid_y), (arc.end_x, arc.end_y)]);
    }
    for circle in &footprint.circles {
        let r = ((circle.end_x - circle.center_x).powi(2) + (circle.end_y - circle.center_y).powi(2)).sqrt();
        points.push((circle.center_x - r, circle.center_y - r));
        points.push((circle.center_x + r, circle.center_y + r));
    }
    for polygon in &footprint.polygons {
        points.extend(polygon.points.iter().copied());
    }

    let first = *points.first()?;
    Some(points.iter().fold((first.0, first.1, first.0, first.1), |(a, b, c, d), (x, y)| {
        (a.min(*x), b.min(*y), c.max(*x), d.max(*y))
    }))
}

/// Splits SVG path data into commands and numbers: `M10,5L3 4` gives
/// `M 10 5 L 3 4`.
fn path_tokens(path: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in path.chars() {
        if c.is_ascii_alphabetic() && c != 'e' && c != 'E' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_whitespace() || c == ',' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if c == '-' && !current.is_empty() && !current.ends_with(['e', 'E']) {
            tokens.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn number(tokens: &[String], index: usize, path: &str) -> Result<f64> {
    tokens.get(index)
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| ConvertError::unsupported("arc", format!("cannot read path '{}'", path)).into())
}

fn parse_svg_arc(path: &str) -> Result<SvgArc> {
    let tokens = path_tokens(path);
    if tokens.len() < 11 || tokens[0] != "M" || !tokens[3].eq_ignore_ascii_case("A") {
        return Err(ConvertError::unsupported("arc", format!("cannot read path '{}'", path)).into());
    }
    let start = (number(&tokens, 1, path)?, number(&tokens, 2, path)?);
    let radii = (number(&tokens, 4, path)?, number(&tokens, 5, path)?);
    let rotation = number(&tokens, 6, path)?;
    let large_arc = number(&tokens, 7, path)? != 0.0;
    let sweep = number(&tokens, 8, path)? != 0.0;
    let mut end = (number(&tokens, 9, path)?, number(&tokens, 10, path)?);
    if tokens[3] == "a" {
        end = (start.0 + end.0, start.1 + end.1);
    }
    Ok(SvgArc { start, radii, rotation, large_arc, sweep, end })
}

/// Vertices of a straight-segment path (`M`, `L`, `H`, `V`, `Z`).
fn path_points(path: &str) -> Result<Vec<(f64, f64)>> {
    let tokens = path_tokens(path);
    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut command = String::new();
    let mut i = 0;

    let read = |i: usize| tokens.get(i).and_then(|t| t.parse::<f64>().ok());

    while i < tokens.len() {
        let token = &tokens[i];
        if token.chars().all(|c| c.is_ascii_alphabetic()) {
            command = token.to_uppercase();
            if command == "Z" {
                if let Some(first) = points.first().copied() {
                    points.push(first);
                }
            } else if !matches!(command.as_str(), "M" | "L" | "H" | "V") {
                return Err(ConvertError::unsupported("path command", format!("{} in '{}'", token, path)).into());
            }
            i += 1;
            continue;
        }

        let last = points.last().copied().unwrap_or((0.0, 0.0));
        match command.as_str() {
            "M" | "L" => match (read(i), read(i + 1)) {
                (Some(x), Some(y)) => {
                    points.push((x, y));
                    i += 2;
                }
                _ => return Err(ConvertError::unsupported("path", format!("cannot read '{}'", path)).into()),
            },
            "H" => {
                let x = read(i).ok_or_else(|| ConvertError::unsupported("path", path.to_string()))?;
                points.push((x, last.1));
                i += 1;
            }
            "V" => {
                let y = read(i).ok_or_else(|| ConvertError::unsupported("path", path.to_string()))?;
                points.push((last.0, y));
                i += 1;
            }
            _ => return Err(ConvertError::unsupported("path", format!("coordinates before command in '{}'", path)).into()),
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easyeda::models::Part;

    fn component() -> ComponentData {
        ComponentData {
            lcsc_id: "C8734".to_string(),
            title: "STM32F103C8T6".to_string(),
            description: String::new(),
            manufacturer: "ST".to_string(),
            datasheet: String::new(),
            jlc_id: String::new(),
            symbol: Part::Absent,
            footprint: Part::Absent,
            model_3d: Part::Absent,
        }
    }

    #[test]
    fn arc_center_of_half_circle() {
        let c = Converter::new();
        let arc = c.compute_arc_center((0.0, 0.0), (10.0, 0.0), (5.0, 5.0), 0.0, false, true).unwrap();
        assert!((arc.cx - 5.0).abs() < 1e-9);
        assert!(arc.cy.abs() < 1e-9);
        let (mx, my) = arc.midpoint();
        assert!((mx - 5.0).abs() < 1e-9);
        assert!((my.abs() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_radius_arc_is_unsupported() {
        let c = Converter::new();
        assert!(c.compute_arc_center((0.0, 0.0), (1.0, 0.0), (0.0, 0.0), 0.0, false, true).is_err());
    }

    #[test]
    fn symbol_flips_y_and_scales() {
        let data = SymbolData {
            shapes: vec![
                "P~show~4~1~390~310~0~gge1~0^^390~310^^M 390 310 h 10~#880000^^1~403~314~0~VDD~start~~~#0000FF^^1~396~309~0~1~end~~~#0000FF^^0~393~310^^0~M 400 307 L 403 310 L 400 313".to_string(),
                "R~380~290~2~2~20~40~#880000~1~0~none~gge2~0~".to_string(),
            ],
            origin_x: 400.0,
            origin_y: 300.0,
            prefix: Some("U?".to_string()),
        };
        let symbol = Converter::new()
            .convert_symbol(&component(), &data, "STM32F103C8T6_C8734", "lcsc_mcu:STM32F103C8T6_C8734", "mcu")
            .unwrap();
        assert_eq!(symbol.reference, "U");
        let pin = &symbol.pins[0];
        assert!((pin.pos_x - (-2.54)).abs() < 1e-9);
        assert!((pin.pos_y - (-2.54)).abs() < 1e-9);
        assert_eq!(pin.rotation, 180.0);
        assert!((pin.length - 2.54).abs() < 1e-9);
        assert_eq!(pin.pin_type, PinType::PowerIn);
        let rect = &symbol.rectangles[0];
        assert!((rect.y1 - 2.54).abs() < 1e-9);
        assert!((rect.y2 - (-7.62)).abs() < 1e-9);
        assert!(rect.fill);
    }

    #[test]
    fn footprint_gets_courtyard_and_custom_pad() {
        let data = FootprintData {
            title: "TEST".to_string(),
            shapes: vec![
                "PAD~RECT~4000~3000~4~4~1~~1~0~~0~gge1~0~~Y~0".to_string(),
                "PAD~POLYGON~4010~3000~4~4~1~~2~0~4008 2998 4012 2998 4012 3002~0~gge2~0~~Y~0".to_string(),
            ],
            origin_x: 4000.0,
            origin_y: 3000.0,
        };
        let fp = Converter::new().convert_footprint(&data, "TEST_C1").unwrap();
        assert_eq!(fp.pads.len(), 2);
        assert_eq!(fp.pads[1].shape, PadShape::Custom);
        assert_eq!(fp.pads[1].polygon.as_ref().map(|p| p.len()), Some(3));
        let courtyard: Vec<&KiLine> = fp.lines.iter().filter(|l| l.layer == "F.CrtYd").collect();
        assert_eq!(courtyard.len(), 4);
        assert!((courtyard[0].start_x - (-0.508 - COURTYARD_MARGIN)).abs() < 1e-9);
    }

    #[test]
    fn degenerate_polygon_pad_is_rejected() {
        let data = FootprintData {
            title: "BAD".to_string(),
            shapes: vec!["PAD~POLYGON~4000~3000~4~4~1~~1~0~4000 3000 4001 3000~0~gge1~0~~Y~0".to_string()],
            origin_x: 4000.0,
            origin_y: 3000.0,
        };
        let err = Converter::new().convert_footprint(&data, "BAD_C1").unwrap_err();
        assert!(err.to_string().contains("polygon pad"));
    }

    #[test]
    fn unknown_pad_shape_is_rejected() {
        let data = FootprintData {
            title: "BAD".to_string(),
            shapes: vec!["PAD~STAR~4000~3000~4~4~1~~1~0~~0~gge1~0~~Y~0".to_string()],
            origin_x: 4000.0,
            origin_y: 3000.0,
        };
        assert!(Converter::new().convert_footprint(&data, "BAD_C1").is_err());
    }

    #[test]
    fn solid_regions_become_polygons_or_fail() {
        let pad = "PAD~RECT~4000~3000~4~4~1~~1~0~~0~gge1~0~~Y~0".to_string();
        let data = FootprintData {
            title: "REGION".to_string(),
            shapes: vec![pad.clone(), "SOLIDREGION~3~~M 3995 2995 L 4005 2995 L 4005 3005 Z~solid~gge2~0".to_string()],
            origin_x: 4000.0,
            origin_y: 3000.0,
        };
        let fp = Converter::new().convert_footprint(&data, "REGION_C1").unwrap();
        assert_eq!(fp.polygons.len(), 1);
        assert_eq!(fp.polygons[0].points.len(), 4);
        assert_eq!(fp.polygons[0].layer, "F.SilkS");

        let bad = FootprintData {
            shapes: vec![pad, "SOLIDREGION~3~~M 3995 2995 C 1 1 2 2 3 3 Z~solid~gge2~0".to_string()],
            ..data
        };
        let err = Converter::new().convert_footprint(&bad, "REGION_C1").unwrap_err();
        assert!(err.to_string().contains("path command"));
    }

    #[test]
    fn path_tokens_split_commands() {
        assert_eq!(path_tokens("M10,5L3-4Z"), vec!["M", "10", "5", "L", "3", "-4", "Z"]);
        assert_eq!(path_points("M 0 0 H 10 V 5 Z").unwrap(), vec![(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (0.0, 0.0)]);
        assert!(path_points("M 0 0 C 1 1 2 2 3 3").is_err());
    }

    #[test]
    fn guesses_prefix_from_keywords() {
        assert_eq!(guess_prefix("0603 Resistor"), "R");
        assert_eq!(guess_prefix("Chip Capacitors"), "C");
        assert_eq!(guess_prefix("controlled thing"), "U");
        assert_eq!(reference_prefix(Some(" D? "), "x", "misc"), "D");
    }
}
