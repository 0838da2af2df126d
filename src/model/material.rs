//! Material resolution (spec §4.2.5), grounded in `material.h`/`material.cpp`.

use crate::config::{read_float, read_string, read_string_array, Class};
use crate::error::{Diagnostics, DiagnosticKind, ModelError, Severity};

pub const MAX_STAGES: usize = 16;

/// `uv_source` as read from an `.rvmat` stage transform, mirroring
/// `material.h`'s `uv_source` enum. The original table omits index 4
/// (`Norm`) from its name lookup array even though the enum itself reserves
/// the slot — an `.rvmat` naming `uvSource = "Norm"` therefore cannot
/// round-trip through the name table and is treated as unrecognized, same
/// as the original. Kept here as a documented gap rather than silently
/// "fixed", per the open design question this resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UvSource {
    None,
    Tex,
    TexWaterAnim,
    Pos,
    Norm,
    Tex1,
    WorldPos,
    WorldNorm,
    TexShoreAnim,
}

const UV_SOURCE_NAMES: &[(UvSource, &str)] = &[
    (UvSource::None, "None"),
    (UvSource::Tex, "Tex"),
    (UvSource::TexWaterAnim, "TexWaterAnim"),
    (UvSource::Pos, "Pos"),
    // UvSource::Norm has no name entry, matching the original table.
    (UvSource::Tex1, "Tex1"),
    (UvSource::WorldPos, "WorldPos"),
    (UvSource::WorldNorm, "WorldNorm"),
    (UvSource::TexShoreAnim, "TexShoreAnim"),
];

impl UvSource {
    fn from_name(name: &str) -> Option<UvSource> {
        UV_SOURCE_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(v, _)| *v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogMode {
    None,
    Fog,
    Alpha,
    FogAlpha,
    FogSky,
}

const FOG_MODE_NAMES: &[(FogMode, &str)] = &[
    (FogMode::None, "None"),
    (FogMode::Fog, "Fog"),
    (FogMode::Alpha, "Alpha"),
    (FogMode::FogAlpha, "FogAlpha"),
    (FogMode::FogSky, "FogSky"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightMode {
    None,
    Sun,
    Sky,
    Horizon,
    Stars,
    SunObject,
    SunHaloObject,
    MoonObject,
    MoonHaloObject,
}

const LIGHT_MODE_NAMES: &[(LightMode, &str)] = &[
    (LightMode::None, "None"),
    (LightMode::Sun, "Sun"),
    (LightMode::Sky, "Sky"),
    (LightMode::Horizon, "Horizon"),
    (LightMode::Stars, "Stars"),
    (LightMode::SunObject, "SunObject"),
    (LightMode::SunHaloObject, "SunHaloObject"),
    (LightMode::MoonObject, "MoonObject"),
    (LightMode::MoonHaloObject, "MoonHaloObject"),
];

const RENDER_FLAG_NAMES: &[(u32, &str)] = &[
    (0, "AlwaysInShadow"),
    (1, "NoZWrite"),
    (2, "LandShadow"),
    (3, "Dummy0"),
    (4, "NoColorWrite"),
    (5, "NoAlphaWrite"),
    (6, "AddBlend"),
    (7, "AlphaTest32"),
    (8, "AlphaTest64"),
    (9, "AlphaTest128"),
    (10, "Road"),
    (11, "NoTiWrite"),
    (12, "NoReceiveShadow"),
];

/// The fixed pixel-shader name table, index = shader id. Grounded verbatim
/// in `material.cpp`'s `pixelshaders` array; id 0 ("Normal") is the
/// fallback for unrecognized names.
const PIXEL_SHADERS: &[&str] = &[
    "Normal", "NormalDXTA", "NormalMap", "NormalMapThrough", "NormalMapGrass", "NormalMapDiffuse", "Detail",
    "Interpolation", "Water", "WaterSimple", "White", "WhiteAlpha", "AlphaShadow", "AlphaNoShadow", "Dummy0",
    "DetailMacroAS", "NormalMapMacroAS", "NormalMapDiffuseMacroAS", "NormalMapSpecularMap",
    "NormalMapDetailSpecularMap", "NormalMapMacroASSpecularMap", "NormalMapDetailMacroASSpecularMap",
    "NormalMapSpecularDIMap", "NormalMapDetailSpecularDIMap", "NormalMapMacroASSpecularDIMap",
    "NormalMapDetailMacroASSpecularDIMap", "Terrain1", "Terrain2", "Terrain3", "Terrain4", "Terrain5",
    "Terrain6", "Terrain7", "Terrain8", "Terrain9", "Terrain10", "Terrain11", "Terrain12", "Terrain13",
    "Terrain14", "Terrain15", "TerrainSimple1", "TerrainSimple2", "TerrainSimple3", "TerrainSimple4",
    "TerrainSimple5", "TerrainSimple6", "TerrainSimple7", "TerrainSimple8", "TerrainSimple9", "TerrainSimple10",
    "TerrainSimple11", "TerrainSimple12", "TerrainSimple13", "TerrainSimple14", "TerrainSimple15", "Glass",
    "NonTL", "NormalMapSpecularThrough", "Grass", "NormalMapThroughSimple", "NormalMapSpecularThroughSimple",
    "Road", "Shore", "ShoreWet", "Road2Pass", "ShoreFoam", "NonTLFlare", "NormalMapThroughLowEnd",
    "TerrainGrass1", "TerrainGrass2", "TerrainGrass3", "TerrainGrass4", "TerrainGrass5", "TerrainGrass6",
    "TerrainGrass7", "TerrainGrass8", "TerrainGrass9", "TerrainGrass10", "TerrainGrass11", "TerrainGrass12",
    "TerrainGrass13", "TerrainGrass14", "TerrainGrass15", "Crater1", "Crater2", "Crater3", "Crater4", "Crater5",
    "Crater6", "Crater7", "Crater8", "Crater9", "Crater10", "Crater11", "Crater12", "Crater13", "Crater14",
    "Sprite", "SpriteSimple", "Cloud", "Horizon", "Super", "Multi", "TerrainX", "TerrainSimpleX", "TerrainGrassX",
    "Tree", "TreePRT", "TreeSimple", "Skin", "CalmWater", "TreeAToC", "GrassAToC", "TreeAdv", "TreeAdvSimple",
    "TreeAdvTrunk", "TreeAdvTrunkSimple", "TreeAdvAToC", "TreeAdvSimpleAToC", "TreeSN", "SpriteExtTi",
    "TerrainSNX", "InterpolationAlpha", "VolCloud", "VolCloudSimple", "UnderwaterOcclusion",
    "SimulWeatherClouds", "SimulWeatherCloudsWithLightning", "SimulWeatherCloudsCPU",
    "SimulWeatherCloudsWithLightningCPU", "SuperExt", "SuperHair", "SuperHairAtoC", "Caustics", "Refract",
    "SpriteRefract", "SpriteRefractSimple", "SuperAToC", "NonTLFlareNew", "NonTLFlareLight",
    "TerrainNoDetailX", "TerrainNoDetailSNX", "TerrainSimpleSNX", "NormalPiP", "NonTLFlareNewNoOcclusion",
    "Empty", "Point", "TreeAdvTrans", "TreeAdvTransAToC", "Collimator", "LODDiag", "DepthOnly",
];

/// The fixed vertex-shader name table. Grounded verbatim in
/// `material.cpp`'s `vertexshaders` array.
const VERTEX_SHADERS: &[&str] = &[
    "Basic", "NormalMap", "NormalMapDiffuse", "Grass", "Dummy2", "Dummy3", "ShadowVolume", "Water",
    "WaterSimple", "Sprite", "Point", "NormalMapThrough", "Dummy3", "Terrain", "BasicAS", "NormalMapAS",
    "NormalMapDiffuseAS", "Glass", "NormalMapSpecularThrough", "NormalMapThroughNoFade",
    "NormalMapSpecularThroughNoFade", "Shore", "TerrainGrass", "Super", "Multi", "Tree", "TreeNoFade",
    "TreePRT", "TreePRTNoFade", "Skin", "CalmWater", "TreeAdv", "TreeAdvTrunk", "VolCloud", "Road",
    "UnderwaterOcclusion", "SimulWeatherClouds", "SimulWeatherCloudsCPU", "SpriteOnSurface",
    "TreeAdvModNormals", "Refract", "SimulWeatherCloudsGS", "BasicFade", "Star", "TreeAdvNoFade",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK_OPAQUE: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
}

#[derive(Debug, Clone, Default)]
pub struct StageTransform {
    pub uv_source: Option<UvSource>,
    /// 3x4 affine transform (aside, up, dir, pos rows), row-major.
    pub matrix: [[f32; 3]; 4],
}

#[derive(Debug, Clone, Default)]
pub struct StageTexture {
    pub path: String,
    pub transform_index: u32,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub path: String,
    pub emissive: Color,
    pub ambient: Color,
    pub diffuse: Color,
    pub forced_diffuse: Color,
    pub specular: Color,
    pub specular_power: f32,
    pub pixelshader_id: u32,
    pub vertexshader_id: u32,
    pub main_light: LightMode,
    pub fog_mode: FogMode,
    pub surface: String,
    pub render_flags: u32,
    pub textures: Vec<StageTexture>,
    pub transforms: Vec<StageTransform>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            path: String::new(),
            emissive: Color::BLACK_OPAQUE,
            ambient: Color::BLACK_OPAQUE,
            diffuse: Color::BLACK_OPAQUE,
            forced_diffuse: Color::BLACK_OPAQUE,
            specular: Color::BLACK_OPAQUE,
            specular_power: 1.0,
            pixelshader_id: 0,
            vertexshader_id: 0,
            main_light: LightMode::Sun,
            fog_mode: FogMode::Fog,
            surface: String::new(),
            render_flags: 0,
            textures: vec![StageTexture::default()],
            transforms: Vec::new(),
        }
    }
}

fn read_color(root: &Class, path: &str, default: Color) -> Color {
    match read_string_array(root, path) {
        Ok(values) if values.len() == 4 => {
            let f: Vec<f32> = values.iter().filter_map(|s| s.trim().parse().ok()).collect();
            if f.len() == 4 {
                Color { r: f[0], g: f[1], b: f[2], a: f[3] }
            } else {
                default
            }
        }
        _ => default,
    }
}

impl Material {
    /// Parses an already-loaded `.rvmat` config root into a [`Material`],
    /// mirroring `Material::read` in `material.cpp`. Shader/flag/enum names
    /// that fail to resolve fall back to their documented defaults and push
    /// a warning diagnostic rather than aborting.
    pub fn from_config(path: &str, root: &Class, diagnostics: &mut Diagnostics) -> Result<Material, ModelError> {
        let mut mat = Material { path: path.to_string(), ..Material::default() };

        mat.emissive = read_color(root, "emmisive", mat.emissive);
        mat.ambient = read_color(root, "ambient", mat.ambient);
        mat.diffuse = read_color(root, "diffuse", mat.diffuse);
        mat.forced_diffuse = read_color(root, "forcedDiffuse", mat.forced_diffuse);
        mat.specular = read_color(root, "specular", mat.specular);

        if let Ok(power) = read_float(root, "specularPower") {
            mat.specular_power = power;
        }
        if let Ok(surface) = read_string(root, "surfaceInfo") {
            mat.surface = surface;
        }

        if let Ok(flags) = read_string_array(root, "renderFlags") {
            for flag in flags {
                match RENDER_FLAG_NAMES.iter().find(|(_, n)| n.eq_ignore_ascii_case(&flag)) {
                    Some((bit, _)) => mat.render_flags |= 1 << bit,
                    None => diagnostics.push(
                        DiagnosticKind::UnrecognizedMaterialName,
                        Severity::Warning,
                        format!("unrecognized render flag \"{flag}\" in {path}"),
                    ),
                }
            }
        }

        if let Ok(name) = read_string(root, "mainLight") {
            match LIGHT_MODE_NAMES.iter().find(|(_, n)| n.eq_ignore_ascii_case(&name)) {
                Some((mode, _)) => mat.main_light = *mode,
                None => diagnostics.push(
                    DiagnosticKind::UnrecognizedMaterialName,
                    Severity::Warning,
                    format!("unrecognized mainLight \"{name}\" in {path}"),
                ),
            }
        }
        if let Ok(name) = read_string(root, "fogMode") {
            match FOG_MODE_NAMES.iter().find(|(_, n)| n.eq_ignore_ascii_case(&name)) {
                Some((mode, _)) => mat.fog_mode = *mode,
                None => diagnostics.push(
                    DiagnosticKind::UnrecognizedMaterialName,
                    Severity::Warning,
                    format!("unrecognized fogMode \"{name}\" in {path}"),
                ),
            }
        }

        if let Ok(name) = read_string(root, "PixelShaderID") {
            mat.pixelshader_id = PIXEL_SHADERS
                .iter()
                .position(|n| n.eq_ignore_ascii_case(&name))
                .map(|i| i as u32)
                .unwrap_or_else(|| {
                    diagnostics.push(
                        DiagnosticKind::UnrecognizedMaterialName,
                        Severity::Warning,
                        format!("unrecognized pixel shader \"{name}\" in {path}, assuming \"Normal\""),
                    );
                    0
                });
        }
        if let Ok(name) = read_string(root, "VertexShaderID") {
            mat.vertexshader_id = VERTEX_SHADERS
                .iter()
                .position(|n| n.eq_ignore_ascii_case(&name))
                .map(|i| i as u32)
                .unwrap_or_else(|| {
                    diagnostics.push(
                        DiagnosticKind::UnrecognizedMaterialName,
                        Severity::Warning,
                        format!("unrecognized vertex shader \"{name}\" in {path}, assuming \"Basic\""),
                    );
                    0
                });
        }

        // Stage 0 is the implicit base texture slot; Stage1..MAX_STAGES are
        // read until the first one missing a `texture` entry.
        mat.textures.clear();
        mat.textures.push(StageTexture { path: String::new(), transform_index: 0 });
        for i in 1..MAX_STAGES {
            let texture_path = match read_string(root, &format!("Stage{i}>>texture")) {
                Ok(p) => p,
                Err(_) => break,
            };
            // Placeholder; corrected below once the transform table is
            // deduplicated and each stage's real slot is known.
            mat.textures.push(StageTexture { path: texture_path, transform_index: 0 });
        }

        let raw_transforms = resolve_transforms(root, mat.textures.len());
        let (transforms, index_map) = dedup_transforms(raw_transforms, path)?;
        mat.transforms = transforms;
        // `index_map[k]` is the deduped index for the transform read for
        // Stage(k+1); mirrors `Material::read`'s overwrite of
        // `textures[i].transform_index` after the `find`-against-existing
        // check in `material.cpp`.
        for (i, stage) in mat.textures.iter_mut().enumerate().skip(1) {
            stage.transform_index = index_map[i - 1] as u32;
        }

        Ok(mat)
    }
}

fn resolve_transforms(root: &Class, num_textures: usize) -> Vec<StageTransform> {
    let mut out = Vec::with_capacity(num_textures.saturating_sub(1));
    for i in 1..num_textures {
        let transform_path = format!("Stage{i}>>uvTransform");
        let mut t = StageTransform::default();
        if let Ok(src) = read_string(root, &format!("Stage{i}>>uvSource")) {
            t.uv_source = UvSource::from_name(&src);
        }
        for (row, field) in ["aside", "up", "dir", "pos"].iter().enumerate() {
            if let Ok(vals) = read_string_array(root, &format!("{transform_path}>>{field}")) {
                let f: Vec<f32> = vals.iter().filter_map(|s| s.trim().parse().ok()).collect();
                if f.len() == 3 {
                    t.matrix[row] = [f[0], f[1], f[2]];
                }
            }
        }
        out.push(t);
    }
    out
}

/// De-duplicates identical UV transforms (the engine limits a material to
/// 8 distinct ones, sharing indices across stages that specify the same
/// transform). Returns the deduped table plus, per input transform, the
/// index of its slot in that table.
fn dedup_transforms(transforms: Vec<StageTransform>, path: &str) -> Result<(Vec<StageTransform>, Vec<usize>), ModelError> {
    let mut unique: Vec<StageTransform> = Vec::new();
    let mut index_map = Vec::with_capacity(transforms.len());
    for t in transforms {
        let found = unique.iter().position(|u| transforms_equal(u, &t));
        let index = match found {
            Some(i) => i,
            None => {
                unique.push(t);
                unique.len() - 1
            }
        };
        index_map.push(index);
    }
    if unique.len() > 8 {
        return Err(ModelError::TooManyTransforms { path: path.to_string() });
    }
    Ok((unique, index_map))
}

fn transforms_equal(a: &StageTransform, b: &StageTransform) -> bool {
    a.uv_source == b.uv_source
        && a.matrix.iter().zip(b.matrix.iter()).all(|(ra, rb)| ra.iter().zip(rb.iter()).all(|(x, y)| (x - y).abs() < 1e-6))
}
