use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;

use crate::easyeda::models::PartSelection;
use crate::error::{AppError, Result};
use crate::kicad::LibraryFormat;
use crate::library::ModelTransform;

#[derive(Parser, Debug)]
#[command(name = "lcsc-grabber")]
#[command(version)]
#[command(about = "Import EasyEDA/LCSC components into category-partitioned KiCad libraries", long_about = None)]
pub struct Cli {
    /// Library root directory
    #[arg(long, global = true, value_name = "DIR")]
    pub library: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// KiCad format for newly created libraries
    #[arg(long, global = true, value_enum)]
    pub format: Option<LibraryFormat>,

    /// Settings file (default: <config dir>/lcsc-grabber/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import one component or a batch into a category
    Import(ImportArgs),

    /// Remove a component from one category, or from all of them
    Remove {
        #[arg(long, value_name = "ID")]
        lcsc_id: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// Move a component to another category
    Move {
        #[arg(long, value_name = "ID")]
        lcsc_id: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// List imported components
    List {
        #[arg(long)]
        category: Option<String>,
    },

    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    /// Inspect or adjust 3D model placement
    Model {
        #[command(subcommand)]
        action: ModelCommand,
    },

    /// Drop manifest entries whose files are gone
    Reconcile,

    /// Manage the local component cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Add the category libraries to KiCad's global library tables
    Register {
        /// KiCad config directory (default: newest under the user config dir)
        #[arg(long, value_name = "DIR")]
        kicad_config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// LCSC component ID (e.g., C2040)
    #[arg(long, value_name = "ID", conflicts_with = "batch")]
    pub lcsc_id: Option<String>,

    /// Batch mode: read LCSC IDs from a file
    #[arg(long, value_name = "FILE", conflicts_with = "lcsc_id")]
    pub batch: Option<PathBuf>,

    /// Target category (default from settings)
    #[arg(long)]
    pub category: Option<String>,

    /// Import symbol
    #[arg(long)]
    pub symbol: bool,

    /// Import footprint
    #[arg(long)]
    pub footprint: bool,

    /// Import 3D model
    #[arg(long = "3d")]
    pub model_3d: bool,

    /// Import symbol, footprint and 3D model
    #[arg(long)]
    pub full: bool,

    /// Import what is available when the catalog lacks a requested part
    #[arg(long)]
    pub allow_partial: bool,

    /// Ignore cached data and fetch again
    #[arg(long)]
    pub refresh: bool,

    /// Continue on error in batch mode (skip failed components)
    #[arg(long)]
    pub continue_on_error: bool,

    /// Number of parallel imports in batch mode (default from settings)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// 3D model offset in mm, "x,y,z"
    #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
    pub offset: Option<(f64, f64, f64)>,

    /// 3D model rotation in degrees, "x,y,z"
    #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
    pub rotation: Option<(f64, f64, f64)>,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// Create a category
    Add { name: String },
    /// Remove a category; its components move to the default category
    Remove { name: String },
    /// List categories
    List,
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Override the placement; unspecified values keep their current setting
    Set {
        #[arg(long, value_name = "ID")]
        lcsc_id: String,

        #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
        offset: Option<(f64, f64, f64)>,

        #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
        rotation: Option<(f64, f64, f64)>,

        #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
        scale: Option<(f64, f64, f64)>,
    },
    /// Discard the override and recompute the placement
    Reset {
        #[arg(long, value_name = "ID")]
        lcsc_id: String,
    },
    /// Show the placement in effect
    Show {
        #[arg(long, value_name = "ID")]
        lcsc_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Entry counts and disk usage
    Stats,
    /// Delete every cache entry
    Clear,
    /// Delete entries past the retention window
    ClearExpired,
}

/// Parses `"x,y,z"`.
pub fn parse_triple(value: &str) -> std::result::Result<(f64, f64, f64), String> {
    let parts: Vec<f64> = value.split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid number in '{}': {}", value, e))?;
    match parts.as_slice() {
        [x, y, z] => Ok((*x, *y, *z)),
        _ => Err(format!("expected three comma-separated values, got '{}'", value)),
    }
}

impl ImportArgs {
    pub fn validate(&self) -> Result<()> {
        if self.lcsc_id.is_none() && self.batch.is_none() {
            return Err(AppError::Other(
                "Either --lcsc-id or --batch must be specified".to_string()
            ));
        }

        if !self.symbol && !self.footprint && !self.model_3d && !self.full {
            return Err(AppError::Other(
                "At least one import option must be specified (--symbol, --footprint, --3d, or --full)".to_string()
            ));
        }

        if self.parallel == Some(0) {
            return Err(AppError::Other("--parallel must be at least 1".to_string()));
        }

        Ok(())
    }

    pub fn parts(&self) -> PartSelection {
        if self.full {
            return PartSelection::ALL;
        }
        PartSelection { symbol: self.symbol, footprint: self.footprint, model_3d: self.model_3d }
    }

    /// Placement given on the command line, if any.
    pub fn transform(&self) -> Option<ModelTransform> {
        if self.offset.is_none() && self.rotation.is_none() {
            return None;
        }
        let defaults = ModelTransform::default();
        Some(ModelTransform {
            offset: self.offset.unwrap_or(defaults.offset),
            rotation: self.rotation.unwrap_or(defaults.rotation),
            scale: defaults.scale,
        })
    }

    /// Get list of LCSC IDs to process (either single ID or from batch file)
    pub fn get_lcsc_ids(&self) -> Result<Vec<String>> {
        if let Some(ref id) = self.lcsc_id {
            Ok(vec![id.clone()])
        } else if let Some(ref batch_file) = self.batch {
            let content = std::fs::read_to_string(batch_file)
                .map_err(|e| AppError::Other(format!("Failed to open batch file: {}", e)))?;
            let ids = extract_lcsc_ids(&content);
            if ids.is_empty() {
                return Err(AppError::Other("No valid LCSC IDs found in batch file".to_string()));
            }

            log::info!("Loaded {} LCSC IDs from batch file", ids.len());
            Ok(ids)
        } else {
            Err(AppError::Other("No LCSC ID source specified".to_string()))
        }
    }
}

/// Every `C<digits>` token in free text such as a BOM export, first
/// occurrence order, no repeats.
pub fn extract_lcsc_ids(content: &str) -> Vec<String> {
    let re = Regex::new(r"\bC\d+\b").expect("static regex");
    let mut ids: Vec<String> = Vec::new();
    for m in re.find_iter(content) {
        if !ids.iter().any(|id| id == m.as_str()) {
            ids.push(m.as_str().to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_with_placement() {
        let cli = Cli::try_parse_from([
            "lcsc-grabber", "--format", "v7", "import", "--lcsc-id", "C2040", "--full",
            "--category", "mcu", "--rotation", "0,0,-90",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(LibraryFormat::V7));
        let Command::Import(args) = cli.command else { panic!("expected import") };
        args.validate().unwrap();
        assert_eq!(args.parts(), PartSelection::ALL);
        assert_eq!(args.transform().unwrap().rotation, (0.0, 0.0, -90.0));
    }

    #[test]
    fn import_needs_a_part() {
        let cli = Cli::try_parse_from(["lcsc-grabber", "import", "--lcsc-id", "C2040"]).unwrap();
        let Command::Import(args) = cli.command else { panic!("expected import") };
        assert!(args.validate().is_err());
    }

    #[test]
    fn batch_ids_are_deduplicated() {
        let ids = extract_lcsc_ids("Designator,LCSC\nU1,C8734\nU2,C8734\nR1,C25804; NC1234\n");
        assert_eq!(ids, vec!["C8734", "C25804"]);
    }

    #[test]
    fn triples() {
        assert_eq!(parse_triple("1, 2.5,-3"), Ok((1.0, 2.5, -3.0)));
        assert!(parse_triple("1,2").is_err());
        assert!(parse_triple("a,b,c").is_err());
    }
}
