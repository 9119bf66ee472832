use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{ConvertError, Result};

/// EasyEDA OBJ models are in 1/100 inch; VRML for KiCad is in 2.54 mm units.
const OBJ_TO_VRML_SCALE: f64 = 1.0 / 2.54;

#[derive(Debug, Clone)]
struct Material {
    diffuse: (f64, f64, f64),
    specular: (f64, f64, f64),
    transparency: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self { diffuse: (0.8, 0.8, 0.8), specular: (0.2, 0.2, 0.2), transparency: 0.0 }
    }
}

pub struct ModelExporter;

impl ModelExporter {
    pub fn new() -> Self {
        Self
    }

    /// Converts an EasyEDA OBJ (with inline `newmtl` blocks) to VRML 2.0.
    ///
    /// Faces are fan-triangulated and grouped into one `Shape` per material.
    pub fn obj_to_wrl(&self, obj: &str) -> Result<String> {
        let mut materials: HashMap<String, Material> = HashMap::new();
        let mut vertices: Vec<(f64, f64, f64)> = Vec::new();
        let mut groups: Vec<(String, Vec<[usize; 3]>)> = Vec::new();
        let mut current_material: Option<String> = None;
        let mut current_face_material = String::new();

        for raw in obj.lines() {
            let line = raw.trim();
            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else { continue };
            let rest: Vec<&str> = parts.collect();

            match keyword {
                "newmtl" => {
                    let name = rest.join(" ");
                    materials.insert(name.clone(), Material::default());
                    current_material = Some(name);
                }
                "Kd" | "Ks" | "d" => {
                    let Some(material) = current_material.as_ref().and_then(|m| materials.get_mut(m)) else {
                        continue;
                    };
                    let values: Vec<f64> = rest.iter().filter_map(|v| v.parse().ok()).collect();
                    match (keyword, values.as_slice()) {
                        ("Kd", [r, g, b, ..]) => material.diffuse = (*r, *g, *b),
                        ("Ks", [r, g, b, ..]) => material.specular = (*r, *g, *b),
                        ("d", [d, ..]) => material.transparency = 1.0 - d,
                        _ => {}
                    }
                }
                "endmtl" => current_material = None,
                "usemtl" => current_face_material = rest.join(" "),
                "v" => {
                    let coords: Vec<f64> = rest.iter().take(3).filter_map(|v| v.parse().ok()).collect();
                    if coords.len() != 3 {
                        return Err(ConvertError::InvalidModel(format!("bad vertex line: {}", line)).into());
                    }
                    vertices.push((
                        coords[0] * OBJ_TO_VRML_SCALE,
                        coords[1] * OBJ_TO_VRML_SCALE,
                        coords[2] * OBJ_TO_VRML_SCALE,
                    ));
                }
                "f" => {
                    let indices = rest.iter()
                        .map(|v| face_index(v, vertices.len()))
                        .collect::<Option<Vec<usize>>>()
                        .ok_or_else(|| ConvertError::InvalidModel(format!("bad face line: {}", line)))?;
                    if indices.len() < 3 {
                        continue;
                    }
                    if groups.last().is_none_or(|(name, _)| *name != current_face_material) {
                        groups.push((current_face_material.clone(), Vec::new()));
                    }
                    let Some((_, group)) = groups.last_mut() else { continue };
                    for i in 1..indices.len() - 1 {
                        group.push([indices[0], indices[i], indices[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if vertices.is_empty() || groups.iter().all(|(_, faces)| faces.is_empty()) {
            return Err(ConvertError::InvalidModel("OBJ has no geometry".to_string()).into());
        }

        let mut out = String::from("#VRML V2.0 utf8\n# Generated by lcsc-grabber\n");
        for (material_name, faces) in &groups {
            let material = materials.get(material_name).cloned().unwrap_or_default();
            let used: Vec<usize> = {
                let mut used: Vec<usize> = faces.iter().flatten().copied().collect();
                used.sort_unstable();
                used.dedup();
                used
            };
            let remap: HashMap<usize, usize> = used.iter().enumerate().map(|(new, old)| (*old, new)).collect();

            let _ = writeln!(out, "Shape {{");
            let _ = writeln!(out, "  appearance Appearance {{\n    material Material {{");
            let _ = writeln!(
                out,
                "      diffuseColor {:.4} {:.4} {:.4}\n      specularColor {:.4} {:.4} {:.4}\n      transparency {:.4}\n      shininess 0.5",
                material.diffuse.0, material.diffuse.1, material.diffuse.2,
                material.specular.0, material.specular.1, material.specular.2,
                material.transparency
            );
            let _ = writeln!(out, "    }}\n  }}");
            let _ = writeln!(out, "  geometry IndexedFaceSet {{\n    coord Coordinate {{\n      point [");
            for index in &used {
                let (x, y, z) = vertices[*index];
                let _ = writeln!(out, "        {:.6} {:.6} {:.6},", x, y, z);
            }
            let _ = writeln!(out, "      ]\n    }}\n    coordIndex [");
            for face in faces {
                let _ = writeln!(out, "      {}, {}, {}, -1,", remap[&face[0]], remap[&face[1]], remap[&face[2]]);
            }
            let _ = writeln!(out, "    ]\n  }}\n}}");
        }

        log::debug!("Converted OBJ: {} vertices, {} material groups", vertices.len(), groups.len());
        Ok(out)
    }

    /// STEP blobs pass through once they carry an ISO-10303-21 header.
    pub fn export_step(&self, step: &[u8]) -> Result<Vec<u8>> {
        let head = &step[..step.len().min(256)];
        let text = String::from_utf8_lossy(head);
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with("ISO-10303-21") {
            Ok(step.to_vec())
        } else {
            Err(ConvertError::InvalidModel("STEP data lacks ISO-10303-21 header".to_string()).into())
        }
    }
}

impl Default for ModelExporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves `7`, `7/1`, `7//3` or a negative relative index to a 0-based index.
fn face_index(token: &str, vertex_count: usize) -> Option<usize> {
    let raw: i64 = token.split('/').next()?.parse().ok()?;
    let index = if raw < 0 { vertex_count as i64 + raw } else { raw - 1 };
    (0..vertex_count as i64).contains(&index).then_some(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "newmtl body\nKd 0.1 0.2 0.3\nendmtl\nv 0 0 0\nv 2.54 0 0\nv 2.54 2.54 0\nv 0 2.54 0\nusemtl body\nf 1 2 3 4\n";

    #[test]
    fn converts_quad_to_two_triangles() {
        let wrl = ModelExporter::new().obj_to_wrl(QUAD).unwrap();
        assert!(wrl.starts_with("#VRML V2.0 utf8"));
        assert!(wrl.contains("diffuseColor 0.1000 0.2000 0.3000"));
        assert!(wrl.contains("1.000000 1.000000 0.000000"));
        assert!(wrl.contains("0, 1, 2, -1,"));
        assert!(wrl.contains("0, 2, 3, -1,"));
    }

    #[test]
    fn rejects_out_of_range_faces() {
        let err = ModelExporter::new().obj_to_wrl("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(err.to_string().contains("bad face line"));
    }

    #[test]
    fn validates_step_header() {
        let exporter = ModelExporter::new();
        assert!(exporter.export_step(b"ISO-10303-21;\nHEADER;").is_ok());
        assert!(exporter.export_step(b"<html>not found</html>").is_err());
    }
}
