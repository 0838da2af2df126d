//! Wires the model transcoder's stages together for the `binarize` CLI
//! command: read MLOD, resolve each LOD's materials, classify LODs,
//! synthesize model info, convert every LOD to ODOL, and write the result.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use color_eyre::eyre::{self, Context};

use pa_toolchain::config::parse_config;
use pa_toolchain::error::Diagnostics;
use pa_toolchain::model::{
    classify_lods, convert_lod, generate_buoyancy, read_mlod, synthesize_model_info, write_odol, Material, MlodLod,
};

/// Minimum/maximum sphere-mode buoyancy segment counts; the original tool
/// exposes these as binarize-time tunables, kept here as fixed defaults
/// since no CLI flag surfaces them (spec §4.2.6).
const BUOYANCY_MIN_SEGMENTS: u32 = 4;
const BUOYANCY_MAX_SEGMENTS: u32 = 24;

fn resolve_materials(src_dir: &Path, lod: &MlodLod, diagnostics: &mut Diagnostics) -> eyre::Result<Vec<Material>> {
    let mut materials = Vec::with_capacity(lod.materials.len());
    for path in &lod.materials {
        if path.is_empty() {
            materials.push(Material::default());
            continue;
        }
        let relative = path.replace('\\', std::path::MAIN_SEPARATOR_STR);
        let full_path = src_dir.join(&relative);
        let material = match fs::read_to_string(&full_path) {
            Ok(text) => {
                let config = parse_config(&text, path.as_str(), diagnostics)?;
                Material::from_config(path, &config.root, diagnostics)?
            }
            Err(_) => {
                log::warn!("material {path} not found under {src_dir:?}; using defaults");
                let mut m = Material::default();
                m.path = path.clone();
                m
            }
        };
        materials.push(material);
    }
    Ok(materials)
}

/// Reads `src` as an MLOD source model and writes the converted ODOL binary
/// to `dst`, per the spec §4.2 pipeline (read -> classify -> synthesize ->
/// convert each LOD -> write).
pub fn binarize(src: &Path, dst: &Path) -> eyre::Result<()> {
    let file = fs::File::open(src).wrap_err_with(|| format!("opening {src:?}"))?;
    let mut reader = BufReader::new(file);
    let model = read_mlod(&mut reader).wrap_err("reading MLOD source")?;

    let src_dir = src.parent().unwrap_or_else(|| Path::new("."));
    let mut diagnostics = Diagnostics::new();

    let special = classify_lods(&model.lods);
    let info = synthesize_model_info(&model.lods, &special, &mut diagnostics);

    if info.buoyancy {
        let geometry_simple = special.geometry_simple.and_then(|i| model.lods.get(i));
        let geometry = special.geometry.and_then(|i| model.lods.get(i));
        if let Some(data) = generate_buoyancy(geometry_simple, geometry, BUOYANCY_MIN_SEGMENTS, BUOYANCY_MAX_SEGMENTS) {
            log::info!("buoyancy volume {} across {} cells", data.volume, data.cells.len());
        }
    }

    let mut odol_lods = Vec::with_capacity(model.lods.len());
    for lod in model.lods {
        let materials = resolve_materials(src_dir, &lod, &mut diagnostics)?;
        odol_lods.push(convert_lod(lod, &materials, &mut diagnostics)?);
    }

    let mut buffer = std::io::Cursor::new(Vec::<u8>::new());
    write_odol(&mut buffer, &info, &odol_lods)?;

    use std::io::Write;
    let mut out = BufWriter::new(fs::File::create(dst).wrap_err_with(|| format!("creating {dst:?}"))?);
    out.write_all(&buffer.into_inner())?;

    for diag in diagnostics.iter() {
        log::warn!("{diag}");
    }
    Ok(())
}
