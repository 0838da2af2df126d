//! LOD classification, bounds, and model-info synthesis (spec §4.2.2, §4.2.3),
//! grounded in the `LOD_*` resolution constants of `p3d.h`.

use crate::error::{Diagnostics, DiagnosticKind, Severity};

use super::mlod::MlodLod;
use super::{BoundingBox, Vec3};

pub const LOD_GRAPHICAL_END: f32 = 999.9;
pub const LOD_VIEW_GUNNER: f32 = 1000.0;
pub const LOD_VIEW_PILOT: f32 = 1100.0;
pub const LOD_VIEW_CARGO: f32 = 1200.0;
pub const LOD_SHADOW_STENCIL_START: f32 = 10000.0;
pub const LOD_SHADOW_STENCIL_END: f32 = 10999.0;
pub const LOD_SHADOW_VOLUME_START: f32 = 11000.0;
pub const LOD_SHADOW_VOLUME_END: f32 = 11999.0;
pub const LOD_GEOMETRY: f64 = 1e13;
pub const LOD_GEOMETRY_SIMPLE: f64 = LOD_GEOMETRY * 2.0;
pub const LOD_PHYSX_OLD: f64 = LOD_GEOMETRY * 3.0;
pub const LOD_PHYSX: f64 = LOD_GEOMETRY * 4.0;
pub const LOD_MEMORY: f64 = 1e15;
pub const LOD_LAND_CONTACT: f64 = LOD_MEMORY * 2.0;
pub const LOD_ROADWAY: f64 = LOD_MEMORY * 3.0;
pub const LOD_PATHS: f64 = LOD_MEMORY * 4.0;
pub const LOD_HITPOINTS: f64 = LOD_MEMORY * 5.0;
pub const LOD_VIEW_GEOMETRY: f64 = LOD_MEMORY * 6.0;
pub const LOD_FIRE_GEOMETRY: f64 = LOD_MEMORY * 7.0;

fn resolution_matches(resolution: f32, target: f64) -> bool {
    (f64::from(resolution) - target).abs() < 0.5
}

/// The threshold above which a LOD's geometry is considered non-visual
/// (no normal/UV-sensitive vertex fusion, per spec §4.2.4).
pub fn is_non_visual(resolution: f32) -> bool {
    f64::from(resolution) >= LOD_GEOMETRY
}

/// Indices of the named special-purpose LODs, resolved by exact resolution
/// value (spec §4.2.2). `None` when the model has no LOD at that resolution.
#[derive(Debug, Clone, Default)]
pub struct SpecialLods {
    pub memory: Option<usize>,
    pub geometry: Option<usize>,
    pub geometry_simple: Option<usize>,
    pub geometry_physx: Option<usize>,
    pub fire_geometry: Option<usize>,
    pub view_geometry: Option<usize>,
    pub view_pilot: Option<usize>,
    pub view_gunner: Option<usize>,
    pub view_cargo: Option<usize>,
    pub land_contact: Option<usize>,
    pub roadway: Option<usize>,
    pub paths: Option<usize>,
    pub hitpoints: Option<usize>,
    pub shadow_stencil_count: u32,
    pub shadow_buffer_count: u32,
}

/// Classifies every LOD by its exact resolution value and applies the
/// view/fire-geometry fallback rules. `viewgeometry`/`firegeometry`
/// properties on the geometry LOD can override which LOD is aliased.
pub fn classify_lods(lods: &[MlodLod]) -> SpecialLods {
    let mut special = SpecialLods::default();

    for (i, lod) in lods.iter().enumerate() {
        let r = lod.resolution;
        if resolution_matches(r, LOD_MEMORY) {
            special.memory = Some(i);
        } else if resolution_matches(r, LOD_GEOMETRY) {
            special.geometry = Some(i);
        } else if resolution_matches(r, LOD_GEOMETRY_SIMPLE) {
            special.geometry_simple = Some(i);
        } else if resolution_matches(r, LOD_PHYSX_OLD) || resolution_matches(r, LOD_PHYSX) {
            special.geometry_physx = Some(i);
        } else if resolution_matches(r, LOD_FIRE_GEOMETRY) {
            special.fire_geometry = Some(i);
        } else if resolution_matches(r, LOD_VIEW_GEOMETRY) {
            special.view_geometry = Some(i);
        } else if resolution_matches(r, LOD_LAND_CONTACT) {
            special.land_contact = Some(i);
        } else if resolution_matches(r, LOD_ROADWAY) {
            special.roadway = Some(i);
        } else if resolution_matches(r, LOD_PATHS) {
            special.paths = Some(i);
        } else if resolution_matches(r, LOD_HITPOINTS) {
            special.hitpoints = Some(i);
        } else if (r - LOD_VIEW_PILOT).abs() < 0.5 {
            special.view_pilot = Some(i);
        } else if (r - LOD_VIEW_GUNNER).abs() < 0.5 {
            special.view_gunner = Some(i);
        } else if (r - LOD_VIEW_CARGO).abs() < 0.5 {
            special.view_cargo = Some(i);
        } else if r >= LOD_SHADOW_STENCIL_START && r <= LOD_SHADOW_STENCIL_END {
            special.shadow_stencil_count += 1;
        } else if r >= LOD_SHADOW_VOLUME_START && r <= LOD_SHADOW_VOLUME_END {
            special.shadow_buffer_count += 1;
        }
    }

    // `viewgeometry`/`firegeometry` properties on the geometry LOD can
    // redirect these aliases explicitly before the generic fallback below.
    if let Some(g) = special.geometry {
        if let Some(name) = lods[g].property("viewgeometry") {
            if let Some(idx) = lods.iter().position(|l| l.property("lodname") == Some(name)) {
                special.view_geometry = Some(idx);
            }
        }
        if let Some(name) = lods[g].property("firegeometry") {
            if let Some(idx) = lods.iter().position(|l| l.property("lodname") == Some(name)) {
                special.fire_geometry = Some(idx);
            }
        }
    }

    if special.view_geometry.is_none() {
        special.view_geometry = special.geometry;
    }
    if special.fire_geometry.is_none() {
        special.fire_geometry = special.geometry;
    }

    special
}

/// Per-LOD bounding box, autocenter, and bounding-sphere radius (spec §4.2.2).
pub fn lod_bounds(lod: &MlodLod) -> (BoundingBox, Vec3, f32) {
    let bbox = BoundingBox::from_points(lod.points.iter().map(|p| p.pos))
        .unwrap_or(BoundingBox { min: Vec3::ZERO, max: Vec3::ZERO });
    let center = bbox.autocenter();
    let radius = lod
        .points
        .iter()
        .map(|p| p.pos.sub(center).length())
        .fold(0.0f32, f32::max);
    (bbox, center, radius)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InertiaTensor {
    pub center_of_mass: Vec3,
    pub inverse_diagonal: Vec3,
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub autocenter: bool,
    pub map: String,
    pub view_density_coef: f32,
    pub lod_no_shadow: bool,
    pub can_occlude: bool,
    pub can_be_occluded: bool,
    pub armor: f32,
    pub class: String,
    pub damage: String,
    pub frequent: bool,
    pub buoyancy: bool,
    pub force_not_alpha: bool,
    pub animated: bool,
    pub aicovers: f32,
    pub bounding_box_visual: BoundingBox,
    pub bounding_box_total: BoundingBox,
    pub view_density: f32,
    pub mass: f32,
    pub inertia: InertiaTensor,
    pub sbsource: String,
    pub prefer_shadow_volume: bool,
    pub shadow_offset: f32,
    pub shadow_lod: f32,
    pub shadow_volume_lod: f32,
    pub shadow_buffer_lod: f32,
    pub shadow_buffer_lod_vis: f32,
}

fn parse_bool_prop(lod: &MlodLod, name: &str) -> bool {
    matches!(lod.property(name), Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

fn parse_f32_prop(lod: &MlodLod, name: &str, default: f32) -> f32 {
    lod.property(name).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Computes the view-density coefficient, clamping the two boundary cases
/// named in spec §4.2.3.
fn view_density(icon_alpha: f32, coef: f32) -> f32 {
    if icon_alpha >= 0.99 {
        0.0
    } else if icon_alpha <= 0.01 {
        -100.0
    } else {
        (1.0 - icon_alpha * 1.5).ln() * 4.0 * coef
    }
}

/// Gathers model-wide properties from the geometry LOD (falling back to
/// LOD 0), computes overall bounds, view-density, mass and inverse-inertia
/// (spec §4.2.3).
pub fn synthesize_model_info(
    lods: &[MlodLod],
    special: &SpecialLods,
    diagnostics: &mut Diagnostics,
) -> ModelInfo {
    let source_idx = special.geometry.unwrap_or(0);
    let source = lods.get(source_idx);

    let damage = source.and_then(|s| s.property("damage")).map(str::to_string).or_else(|| {
        source.and_then(|s| s.property("dammage")).map(|v| {
            diagnostics.push(
                DiagnosticKind::DammageMisspelling,
                Severity::Warning,
                "model uses the \"dammage\" misspelling instead of \"damage\"".to_string(),
            );
            v.to_string()
        })
    });

    let mut all_points = Vec::new();
    let mut visual_points = Vec::new();
    for lod in lods {
        for p in &lod.points {
            all_points.push(p.pos);
            if !super::lod::is_non_visual(lod.resolution) {
                visual_points.push(p.pos);
            }
        }
    }
    let bounding_box_total =
        BoundingBox::from_points(all_points).unwrap_or(BoundingBox { min: Vec3::ZERO, max: Vec3::ZERO });
    let bounding_box_visual = BoundingBox::from_points(visual_points).unwrap_or(bounding_box_total);

    let icon_alpha = source.and_then(|s| s.property("icon")).and_then(|v| v.parse().ok()).unwrap_or(1.0);
    let coef = source.map(|s| parse_f32_prop(s, "viewdensitycoef", 1.0)).unwrap_or(1.0);

    let inertia = compute_inertia(lods, special);

    let animated = source.map(|s| parse_bool_prop(s, "animated")).unwrap_or(false);
    if animated {
        // No skeleton/sub-skeleton subsystem is implemented (see DESIGN.md);
        // an `animated = 1` model therefore always lacks the bone data the
        // engine needs to actually animate it.
        diagnostics.push(
            DiagnosticKind::AnimatedWithoutSkeleton,
            Severity::Warning,
            "model is marked animated but no skeleton data is available",
        );
    }

    ModelInfo {
        autocenter: source.map(|s| parse_bool_prop(s, "autocenter")).unwrap_or(true),
        map: source.and_then(|s| s.property("map")).unwrap_or("").to_string(),
        view_density_coef: coef,
        lod_no_shadow: source.map(|s| parse_bool_prop(s, "lodnoshadow")).unwrap_or(false),
        can_occlude: source.map(|s| parse_bool_prop(s, "canocclude")).unwrap_or(false),
        can_be_occluded: source.map(|s| parse_bool_prop(s, "canbeoccluded")).unwrap_or(true),
        armor: source.map(|s| parse_f32_prop(s, "armor", 0.0)).unwrap_or(0.0),
        class: source.and_then(|s| s.property("class")).unwrap_or("").to_string(),
        damage: damage.unwrap_or_default(),
        frequent: source.map(|s| parse_bool_prop(s, "frequent")).unwrap_or(false),
        buoyancy: source.map(|s| parse_bool_prop(s, "buoyancy")).unwrap_or(false),
        force_not_alpha: source.map(|s| parse_bool_prop(s, "forcenotalpha")).unwrap_or(false),
        animated,
        aicovers: source.map(|s| parse_f32_prop(s, "aicovers", 0.0)).unwrap_or(0.0),
        bounding_box_visual,
        bounding_box_total,
        view_density: view_density(icon_alpha, coef),
        mass: inertia_total_mass(lods, special),
        inertia,
        sbsource: source.and_then(|s| s.property("sbsource")).unwrap_or("visual").to_string(),
        prefer_shadow_volume: source.map(|s| parse_bool_prop(s, "prefershadowvolume")).unwrap_or(false),
        shadow_offset: source.map(|s| parse_f32_prop(s, "shadowoffset", 0.0)).unwrap_or(0.0),
        // Resolved per visual LOD in the original toolchain; this crate
        // does not model a per-LOD preferred-shadow table, so only the
        // geometry LOD's own hint is carried (see DESIGN.md).
        shadow_lod: source.map(|s| parse_f32_prop(s, "shadowlod", -1.0)).unwrap_or(-1.0),
        shadow_volume_lod: source.map(|s| parse_f32_prop(s, "shadowvolumelod", -1.0)).unwrap_or(-1.0),
        shadow_buffer_lod: source.map(|s| parse_f32_prop(s, "shadowbufferlod", -1.0)).unwrap_or(-1.0),
        shadow_buffer_lod_vis: source.map(|s| parse_f32_prop(s, "shadowbufferlodvis", -1.0)).unwrap_or(-1.0),
    }
}

fn mass_source<'a>(lods: &'a [MlodLod], special: &SpecialLods) -> Option<&'a MlodLod> {
    special
        .geometry
        .and_then(|i| lods.get(i))
        .filter(|l| l.mass.is_some())
        .or_else(|| special.geometry_physx.and_then(|i| lods.get(i)).filter(|l| l.mass.is_some()))
}

fn inertia_total_mass(lods: &[MlodLod], special: &SpecialLods) -> f32 {
    mass_source(lods, special).and_then(|l| l.mass.as_ref()).map(|m| m.iter().sum()).unwrap_or(0.0)
}

/// Center of mass and diagonal inverse-inertia tensor, per spec §4.2.3: if
/// no mass data is present the model is treated as massless with an
/// identity inverse-inertia and origin center of mass.
fn compute_inertia(lods: &[MlodLod], special: &SpecialLods) -> InertiaTensor {
    let Some(lod) = mass_source(lods, special) else {
        return InertiaTensor { center_of_mass: Vec3::ZERO, inverse_diagonal: Vec3::new(1.0, 1.0, 1.0) };
    };
    let mass = lod.mass.as_ref().unwrap();
    let total: f32 = mass.iter().sum();
    if total <= 0.0 {
        return InertiaTensor { center_of_mass: Vec3::ZERO, inverse_diagonal: Vec3::new(1.0, 1.0, 1.0) };
    }

    let mut com = Vec3::ZERO;
    for (p, &m) in lod.points.iter().zip(mass.iter()) {
        com = com.add(p.pos.scale(m));
    }
    com = com.scale(1.0 / total);

    // Diagonal of sum(m_i * skew(r_i)^T * skew(r_i)), the standard
    // point-mass inertia tensor about the center of mass.
    let mut ixx = 0.0f32;
    let mut iyy = 0.0f32;
    let mut izz = 0.0f32;
    for (p, &m) in lod.points.iter().zip(mass.iter()) {
        let r = p.pos.sub(com);
        ixx += m * (r.y * r.y + r.z * r.z);
        iyy += m * (r.x * r.x + r.z * r.z);
        izz += m * (r.x * r.x + r.y * r.y);
    }

    let inv = |v: f32| if v.abs() > f32::EPSILON { 1.0 / v } else { 0.0 };
    InertiaTensor { center_of_mass: com, inverse_diagonal: Vec3::new(inv(ixx), inv(iyy), inv(izz)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mlod::MlodPoint;

    fn lod_with_resolution(resolution: f32) -> MlodLod {
        MlodLod { resolution, ..MlodLod::default() }
    }

    #[test]
    fn classifies_geometry_and_memory_lods() {
        let lods = vec![
            lod_with_resolution(0.0),
            lod_with_resolution(LOD_GEOMETRY as f32),
            lod_with_resolution(LOD_MEMORY as f32),
        ];
        let special = classify_lods(&lods);
        assert_eq!(special.geometry, Some(1));
        assert_eq!(special.memory, Some(2));
        // fallback: view-geometry absent -> aliases geometry
        assert_eq!(special.view_geometry, Some(1));
    }

    #[test]
    fn view_density_clamps_boundary_cases() {
        assert_eq!(view_density(0.995, 1.0), 0.0);
        assert_eq!(view_density(0.005, 1.0), -100.0);
    }

    #[test]
    fn massless_model_gets_identity_inertia() {
        let lods = vec![lod_with_resolution(LOD_GEOMETRY as f32)];
        let special = classify_lods(&lods);
        let inertia = compute_inertia(&lods, &special);
        assert_eq!(inertia.inverse_diagonal, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn mass_weighted_center_of_mass() {
        let mut lod = lod_with_resolution(LOD_GEOMETRY as f32);
        lod.points = vec![
            MlodPoint { pos: Vec3::new(0.0, 0.0, 0.0), flags: 0 },
            MlodPoint { pos: Vec3::new(2.0, 0.0, 0.0), flags: 0 },
        ];
        lod.mass = Some(vec![1.0, 1.0]);
        let lods = vec![lod];
        let special = classify_lods(&lods);
        let inertia = compute_inertia(&lods, &special);
        assert_eq!(inertia.center_of_mass, Vec3::new(1.0, 0.0, 0.0));
    }
}
