//! Buoyancy data generation (spec §4.2.6), grounded in `p3d.h`'s
//! `initBuoyancy`/`insideX`/`insideY`/`insideZ`/`cutX`/`cutY`/`cutZ`.

use rayon::prelude::*;

use super::mlod::MlodLod;
use super::Vec3;

const SUBGRID: usize = 10;

#[derive(Debug, Clone)]
pub struct BuoyancyCell {
    pub center: Vec3,
    pub radius: f32,
    pub area: f32,
}

#[derive(Debug, Clone)]
pub struct BuoyancyData {
    pub volume: f32,
    pub cells: Vec<BuoyancyCell>,
}

/// Signed tetrahedron-volume sum over every geometry face, fanning quads
/// into two triangles sharing vertex 0. Used when the geometry-simple LOD
/// is available ("iteration mode", spec §4.2.6).
fn iteration_volume(lod: &MlodLod) -> f32 {
    let tet_volume = |a: Vec3, b: Vec3, c: Vec3| a.dot(b.cross(c)) / 6.0;
    let mut volume = 0.0f32;
    for face in &lod.faces {
        let p = |i: usize| lod.points[face.points_index[i] as usize].pos;
        volume += tet_volume(p(0), p(1), p(2));
        if face.face_type == 4 {
            volume += tet_volume(p(0), p(2), p(3));
        }
    }
    volume.abs()
}

/// Point-in-polygon test in the plane perpendicular to `axis`, counting
/// edge crossings along that axis for the ray starting at `point`.
fn ray_crosses_face(lod: &MlodLod, face_idx: usize, point: Vec3, axis: usize) -> bool {
    let face = &lod.faces[face_idx];
    let n = face.corner_count();
    let verts: Vec<Vec3> = (0..n).map(|i| lod.points[face.points_index[i] as usize].pos).collect();
    let (u, v) = match axis {
        0 => (1usize, 2usize),
        1 => (0usize, 2usize),
        _ => (0usize, 1usize),
    };
    let (pu, pv) = (component(point, u), component(point, v));
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (iu, iv) = (component(verts[i], u), component(verts[i], v));
        let (ju, jv) = (component(verts[j], u), component(verts[j], v));
        if (iv > pv) != (jv > pv) {
            let cross_u = iu + (pv - iv) / (jv - iv) * (ju - iu);
            if pu < cross_u {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn component(v: Vec3, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn is_inside(lod: &MlodLod, point: Vec3, axis: usize) -> bool {
    let mut crossings = 0u32;
    for i in 0..lod.faces.len() {
        if ray_crosses_face(lod, i, point, axis) {
            crossings += 1;
        }
    }
    crossings % 2 == 1
}

/// Clamps the per-axis segment count to `[min_segments, max_segments]`,
/// scaled by the largest-dimension heuristic `maxSegs / maxDim * axisLen`.
fn segment_count(axis_len: f32, max_dim: f32, min_segments: u32, max_segments: u32) -> u32 {
    if max_dim <= f32::EPSILON {
        return min_segments.max(1);
    }
    let scaled = (max_segments as f32 / max_dim * axis_len).round() as u32;
    scaled.clamp(min_segments.max(1), max_segments.max(min_segments.max(1)))
}

/// Sphere-mode grid generation: samples the bounding box into an X*Y*Z
/// grid, firing a 10x10x10 sub-grid of rays per cell along each primary
/// axis to classify interior cells (spec §4.2.6). The per-cell ray tests
/// are independent and run in parallel (spec §5).
fn sphere_mode(lod: &MlodLod, min_segments: u32, max_segments: u32) -> BuoyancyData {
    let bbox = super::BoundingBox::from_points(lod.points.iter().map(|p| p.pos))
        .unwrap_or(super::BoundingBox { min: Vec3::ZERO, max: Vec3::ZERO });
    let extents = bbox.extents();
    let max_dim = extents.x.max(extents.y).max(extents.z);

    let nx = segment_count(extents.x, max_dim, min_segments, max_segments) as usize;
    let ny = segment_count(extents.y, max_dim, min_segments, max_segments) as usize;
    let nz = segment_count(extents.z, max_dim, min_segments, max_segments) as usize;

    let cell_size = Vec3::new(extents.x / nx as f32, extents.y / ny as f32, extents.z / nz as f32);
    let point_area = cell_size.x * cell_size.y + cell_size.y * cell_size.z + cell_size.x * cell_size.z;

    let indices: Vec<(usize, usize, usize)> =
        (0..nx).flat_map(|x| (0..ny).flat_map(move |y| (0..nz).map(move |z| (x, y, z)))).collect();

    let cells: Vec<BuoyancyCell> = indices
        .par_iter()
        .filter_map(|&(ix, iy, iz)| {
            let cell_min = Vec3::new(
                bbox.min.x + ix as f32 * cell_size.x,
                bbox.min.y + iy as f32 * cell_size.y,
                bbox.min.z + iz as f32 * cell_size.z,
            );
            let center = cell_min.add(cell_size.scale(0.5));

            let mut hits = 0u32;
            let total = SUBGRID * SUBGRID * SUBGRID;
            for sx in 0..SUBGRID {
                for sy in 0..SUBGRID {
                    for sz in 0..SUBGRID {
                        let offset = Vec3::new(
                            (sx as f32 + 0.5) / SUBGRID as f32 * cell_size.x,
                            (sy as f32 + 0.5) / SUBGRID as f32 * cell_size.y,
                            (sz as f32 + 0.5) / SUBGRID as f32 * cell_size.z,
                        );
                        let sample = cell_min.add(offset);
                        if is_inside(lod, sample, 0) && is_inside(lod, sample, 1) && is_inside(lod, sample, 2) {
                            hits += 1;
                        }
                    }
                }
            }
            if hits == 0 {
                return None;
            }
            let fill = hits as f32 / total as f32;
            let r_full = cell_size.length() * 0.5;
            let radius = r_full * fill.cbrt();
            // Border count approximated by whether the cell isn't fully
            // saturated; a fully-interior cell contributes no surface area.
            let border_count = if fill < 1.0 { 1.0 } else { 0.0 };
            Some(BuoyancyCell { center, radius, area: point_area * border_count })
        })
        .collect();

    let volume: f32 = cells.iter().map(|c| 4.0 / 3.0 * std::f32::consts::PI * c.radius.powi(3)).sum();
    BuoyancyData { volume, cells }
}

/// Generates buoyancy data from the geometry-simple LOD if present
/// (iteration mode), else falls back to sphere-mode sampling over
/// geometry or geometry-physx (spec §4.2.6).
pub fn generate_buoyancy(
    geometry_simple: Option<&MlodLod>,
    geometry: Option<&MlodLod>,
    min_segments: u32,
    max_segments: u32,
) -> Option<BuoyancyData> {
    if let Some(simple) = geometry_simple {
        return Some(BuoyancyData { volume: iteration_volume(simple), cells: Vec::new() });
    }
    geometry.map(|g| sphere_mode(g, min_segments, max_segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mlod::{MlodFace, MlodPoint};

    fn unit_cube() -> MlodLod {
        // A single quad face on the z=0 plane covering the unit square, to
        // exercise the 2D point-in-polygon test independent of solid-volume
        // correctness.
        let points = vec![
            MlodPoint { pos: Vec3::new(0.0, 0.0, 0.0), flags: 0 },
            MlodPoint { pos: Vec3::new(1.0, 0.0, 0.0), flags: 0 },
            MlodPoint { pos: Vec3::new(1.0, 1.0, 0.0), flags: 0 },
            MlodPoint { pos: Vec3::new(0.0, 1.0, 0.0), flags: 0 },
        ];
        let face = MlodFace {
            face_type: 4,
            points_index: [0, 1, 2, 3],
            normals_index: [0, 0, 0, 0],
            uv: [(0.0, 0.0); 4],
            texture_index: None,
            material_index: None,
            section_names: String::new(),
        };
        MlodLod { points, faces: vec![face], resolution: 1e13, ..MlodLod::default() }
    }

    #[test]
    fn point_inside_quad_on_z_axis() {
        let lod = unit_cube();
        assert!(is_inside(&lod, Vec3::new(0.5, 0.5, 0.0), 2));
        assert!(!is_inside(&lod, Vec3::new(2.0, 2.0, 0.0), 2));
    }

    #[test]
    fn segment_count_respects_clamp() {
        assert_eq!(segment_count(1.0, 10.0, 1, 4), 1.max(1));
        assert!(segment_count(10.0, 10.0, 1, 4) <= 4);
    }
}
