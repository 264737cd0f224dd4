//! `relic` - decode legacy binary scene files and report what's inside.

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use log::debug;
use rayon::prelude::*;
use relic_core::format::load_scene_file;
use relic_core::{ParseOptions, SceneStats, UnitSystem};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "relic", version, about = "Decode OpenFlight and 3D Studio scene files")]
struct Args {
    /// Scene files to decode (.flt, .3ds, .prj, .mli)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Unit system of the emitted coordinates
    #[arg(long, value_enum, default_value_t = Units::Meters)]
    units: Units,

    /// Pass coordinates through in file units
    #[arg(long)]
    no_unit_conversion: bool,

    /// Decode files one at a time instead of in parallel
    #[arg(long)]
    sequential: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Units {
    Meters,
    Kilometers,
    Feet,
    Inches,
}

impl From<Units> for UnitSystem {
    fn from(u: Units) -> Self {
        match u {
            Units::Meters => UnitSystem::Meters,
            Units::Kilometers => UnitSystem::Kilometers,
            Units::Feet => UnitSystem::Feet,
            Units::Inches => UnitSystem::Inches,
        }
    }
}

#[derive(Serialize)]
struct Report {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<SceneStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn decode_one(path: &Path, options: &ParseOptions) -> Report {
    debug!("decoding {}", path.display());
    let file = path.display().to_string();
    match load_scene_file(path, options) {
        Ok(scene) => Report {
            file,
            stats: Some(scene.stats()),
            error: None,
        },
        Err(e) => Report {
            file,
            stats: None,
            error: Some(e.to_string()),
        },
    }
}

fn print_text(report: &Report) {
    match (&report.stats, &report.error) {
        (Some(s), _) => {
            println!(
                "{}: {} nodes, {} primitives, {} vertices, ~{} triangles, {} materials, {} textures",
                report.file, s.nodes, s.primitives, s.vertices, s.triangles, s.materials, s.textures
            );
            if s.unresolved_instances > 0 {
                println!("  {} unresolved instances", s.unresolved_instances);
            }
            if let (Some(min), Some(max)) = (s.bounds_min, s.bounds_max) {
                println!("  bounds {min:?} .. {max:?}");
            }
        }
        (None, Some(e)) => eprintln!("{}: {e}", report.file),
        (None, None) => {}
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let options = {
        let mut o = ParseOptions::default().with_target_units(args.units.into());
        if args.no_unit_conversion {
            o = o.without_unit_conversion();
        }
        o
    };

    let reports: Vec<Report> = if args.sequential {
        args.inputs.iter().map(|p| decode_one(p, &options)).collect()
    } else {
        args.inputs
            .par_iter()
            .map(|p| decode_one(p, &options))
            .collect()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_text(report);
        }
    }

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} files failed to decode", reports.len());
    }
    Ok(())
}
