//! ODOL conversion (spec §4.2.4) and ODOL write (spec §4.2.7), grounded in
//! `p3d.h`'s `odol_face`/`odol_section`/`odol_selection`/`odol_proxy` and
//! `p3d.cpp`'s LOD-finishing/writing passes.

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Diagnostics, DiagnosticKind, ModelError, Severity};
use crate::utils::write_cstring;

use super::lod::{is_non_visual, ModelInfo};
use super::material::Material;
use super::mlod::{MlodFace, MlodLod};
use super::Vec3;

/// Sentinel for "no point"/"no index", matching `NOPOINT` in `p3d.h`.
pub const NOPOINT: u32 = u32::MAX;
/// `1/128`: the tolerance outside `[0, 1]` a UV may fall before it counts
/// as tiling on that axis.
const CLAMP_LIMIT: f32 = 1.0 / 128.0;

/// Face-flag bit constants, grounded verbatim in `p3d.h`'s `FLAG_*` defines.
pub const NOZWRITE: u32 = 0x10;
pub const NOSHADOW: u32 = 0x20;
pub const NOALPHAWRITE: u32 = 0x80;
pub const ISALPHA: u32 = 0x100;
pub const ISTRANSPARENT: u32 = 0x200;
pub const NOCLAMP: u32 = 0x2000;
pub const CLAMPU: u32 = 0x4000;
pub const CLAMPV: u32 = 0x8000;
pub const ISALPHAORDERED: u32 = 0x20000;
pub const NOCOLORWRITE: u32 = 0x40000;
pub const ISALPHAFOG: u32 = 0x80000;
pub const DSTBLENDZERO: u32 = 0x100000;
pub const ISHIDDENPROXY: u32 = 0x10000000;

#[derive(Debug, Clone, Copy)]
pub struct OdolFace {
    pub face_type: u8,
    pub points: [u32; 4],
}

impl OdolFace {
    /// Triangle area, or the sum of the two triangles a quad splits into
    /// (sharing vertex 0), matching `odol_face`'s area computation.
    pub fn area(&self, positions: &[Vec3]) -> f32 {
        let tri_area = |a: Vec3, b: Vec3, c: Vec3| b.sub(a).cross(c.sub(a)).length() * 0.5;
        let p = |i: usize| positions[self.points[i] as usize];
        if self.face_type == 3 {
            tri_area(p(0), p(1), p(2))
        } else {
            tri_area(p(0), p(1), p(2)) + tri_area(p(0), p(2), p(3))
        }
    }
}

#[derive(Debug, Clone)]
pub struct OdolSection {
    pub face_start: u32,
    pub face_end: u32,
    pub face_index_start: u32,
    pub face_index_end: u32,
    pub material_index: Option<u32>,
    pub texture_index: Option<u32>,
    pub flags: u32,
    pub num_stages: u32,
    pub area_over_tex: [f32; 2],
}

#[derive(Debug, Clone)]
pub enum OdolSelection {
    /// Vertex-index / weight pairs, for selections with no skeleton-section
    /// counterpart.
    Vertices { name: String, weights: Vec<(u32, u8)> },
    /// Indices into the LOD's section list, for selections that name a
    /// skeleton bone section.
    Sections { name: String, sections: Vec<u32> },
}

#[derive(Debug, Clone)]
pub struct OdolProxy {
    pub name: String,
    pub proxy_id: u32,
    pub origin: Vec3,
    pub transform_x: Vec3,
    pub transform_y: Vec3,
    pub transform_z: Vec3,
    pub bone_index: i32,
}

#[derive(Debug, Clone)]
pub struct OdolLod {
    pub resolution: f32,
    pub points: Vec<Vec3>,
    /// Packed 30-bit normals, one per vertex (see [`pack_normal`]).
    pub normals_packed: Vec<u32>,
    /// Packed 16-bit UV pairs, one per vertex.
    pub uvs_packed: Vec<(i16, i16)>,
    pub point_to_vertex: Vec<u32>,
    pub vertex_to_point: Vec<u32>,
    pub faces: Vec<OdolFace>,
    pub sections: Vec<OdolSection>,
    pub selections: Vec<OdolSelection>,
    pub proxies: Vec<OdolProxy>,
    pub textures: Vec<String>,
    pub materials: Vec<Material>,
    pub face_area_sum: f32,
    pub vertexboneref_is_simple: bool,
}

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct VertexKey {
    point: u32,
    normal_bits: Option<u32>,
    uv_bits: Option<(u32, u32)>,
}

fn uv_wrap(v: f32) -> f32 {
    v.signum() * v.abs().fract()
}

/// Detects, per texture, whether its faces' UVs tile beyond `[0,1]` on U
/// and/or V (spec §4.2.4), then assigns each face its clamp flags.
fn compute_uv_tiling(faces: &[MlodFace]) -> HashMap<Option<u32>, (bool, bool)> {
    let mut tiling: HashMap<Option<u32>, (bool, bool)> = HashMap::new();
    for face in faces {
        let entry = tiling.entry(face.texture_index).or_insert((false, false));
        for &(u, v) in face.uv.iter().take(face.corner_count()) {
            if u < -CLAMP_LIMIT || u > 1.0 + CLAMP_LIMIT {
                entry.0 = true;
            }
            if v < -CLAMP_LIMIT || v > 1.0 + CLAMP_LIMIT {
                entry.1 = true;
            }
        }
    }
    tiling
}

/// True if the material's diffuse alpha or a `_ca.` texture-path suffix
/// marks this face as needing alpha blending. `_ca.` is the engine's
/// documented alpha-channel naming convention for a stage texture.
fn face_is_alpha(face: &MlodFace, lod: &MlodLod, materials: &[Material]) -> bool {
    if let Some(mi) = face.material_index {
        if let Some(mat) = materials.get(mi as usize) {
            if mat.diffuse.a < 1.0 || mat.forced_diffuse.a < 1.0 {
                return true;
            }
        }
    }
    if let Some(ti) = face.texture_index {
        if let Some(tex) = lod.textures.get(ti as usize) {
            return tex.to_ascii_lowercase().contains("_ca.");
        }
    }
    false
}

/// Computes each face's flag bitset (spec §4.2.4): UV clamp flags, the
/// alpha flag, and hidden-proxy faces (selection name starting `proxy:`,
/// which also clears the face's texture/material).
fn compute_face_flags(lod: &mut MlodLod, materials: &[Material]) -> Vec<u32> {
    let tiling = compute_uv_tiling(&lod.faces);
    let mut flags = Vec::with_capacity(lod.faces.len());
    for face in lod.faces.iter_mut() {
        let mut f = 0u32;
        let is_proxy = face.section_names.split(':').any(|s| s.starts_with("proxy:"));
        if is_proxy {
            f |= ISHIDDENPROXY;
            face.texture_index = None;
            face.material_index = None;
        } else {
            let (tiles_u, tiles_v) = tiling.get(&face.texture_index).copied().unwrap_or((false, false));
            if face.texture_index.is_none() || (tiles_u && tiles_v) {
                f |= NOCLAMP;
            } else {
                if !tiles_u {
                    f |= CLAMPU;
                }
                if !tiles_v {
                    f |= CLAMPV;
                }
            }
            if face_is_alpha(face, lod, materials) {
                f |= ISALPHA;
            }
        }
        flags.push(f);
    }
    flags
}

fn face_sort_key<'a>(
    flags: &'a [u32],
) -> impl Fn(usize, usize, &'a [MlodFace]) -> std::cmp::Ordering + 'a {
    move |a, b, faces: &[MlodFace]| {
        let fa = &faces[a];
        let fb = &faces[b];
        (fa.material_index, flags[a], fa.texture_index, &fa.section_names).cmp(&(
            fb.material_index,
            flags[b],
            fb.texture_index,
            &fb.section_names,
        ))
    }
}

const TRI_REORDER: [usize; 3] = [1, 0, 2];
const QUAD_REORDER: [usize; 4] = [1, 0, 3, 2];

fn reorder_corners(face: &MlodFace) -> Vec<usize> {
    if face.face_type == 3 {
        TRI_REORDER.to_vec()
    } else {
        QUAD_REORDER.to_vec()
    }
}

/// Packs a normal into a signed 30-bit triple (three 10-bit fields, scaled
/// by -511 with round-half-up, clamped to [-511, 511]), per spec §4.2.4.
pub fn pack_normal(n: Vec3) -> u32 {
    let field = |v: f32| -> u32 {
        let scaled = (-511.0 * v).round();
        let clamped = scaled.clamp(-511.0, 511.0) as i32;
        (clamped & 0x3ff) as u32
    };
    field(n.x) | (field(n.y) << 10) | (field(n.z) << 20)
}

/// Maps a wrapped UV coordinate linearly from `[min, max]` onto
/// `[-32767, 32767]`, per spec §4.2.4.
fn pack_uv_component(value: f32, min: f32, max: f32) -> i16 {
    if (max - min).abs() < f32::EPSILON {
        return 0;
    }
    let t = (value - min) / (max - min);
    (t * 2.0 - 1.0).clamp(-1.0, 1.0).mul_add(32767.0, 0.0).round() as i16
}

/// Validates that every face's point/normal indices and every selection's
/// point/face weight arrays are within bounds (spec §3/§4.2 invariants,
/// §7 error-kind-1, §8). Rejected with a typed error rather than left to
/// panic on out-of-range input.
fn validate_lod(lod: &MlodLod) -> Result<(), ModelError> {
    let point_count = lod.points.len() as u32;
    let normal_count = lod.face_normals.len() as u32;
    for face in &lod.faces {
        for c in 0..face.corner_count() {
            let p = face.points_index[c];
            if p >= point_count {
                return Err(ModelError::InvalidPointIndex { kind: "point", index: p, count: point_count });
            }
            let n = face.normals_index[c];
            if n >= normal_count {
                return Err(ModelError::InvalidPointIndex { kind: "normal", index: n, count: normal_count });
            }
        }
    }
    let face_count = lod.faces.len() as u32;
    for sel in &lod.selections {
        let weights_len = sel.point_weights.len() as u32;
        if weights_len != point_count {
            return Err(ModelError::InvalidSelectionIndex {
                name: sel.name.clone(),
                kind: "point",
                index: weights_len,
                count: point_count,
            });
        }
        let flags_len = sel.face_flags.len() as u32;
        if flags_len != face_count {
            return Err(ModelError::InvalidSelectionIndex {
                name: sel.name.clone(),
                kind: "face",
                index: flags_len,
                count: face_count,
            });
        }
    }
    Ok(())
}

/// Converts one read MLOD LOD into its ODOL representation: face-flag
/// computation, sort + section building, vertex fusion with ODOL corner
/// reordering, UV/normal packing, selections, and proxies (spec §4.2.4).
pub fn convert_lod(mut mlod_lod: MlodLod, materials: &[Material], diagnostics: &mut Diagnostics) -> Result<OdolLod, ModelError> {
    validate_lod(&mlod_lod)?;
    let flags = compute_face_flags(&mut mlod_lod, materials);
    let non_visual = is_non_visual(mlod_lod.resolution);

    let mut order: Vec<usize> = (0..mlod_lod.faces.len()).collect();
    let cmp = face_sort_key(&flags);
    order.sort_by(|&a, &b| cmp(a, b, &mlod_lod.faces));

    let mut points = Vec::new();
    let mut normals_packed = Vec::new();
    let mut uvs_raw: Vec<(f32, f32)> = Vec::new();
    let mut point_to_vertex = vec![NOPOINT; mlod_lod.points.len()];
    let mut vertex_to_point = Vec::new();
    let mut vertex_lookup: HashMap<VertexKey, u32> = HashMap::new();
    let mut odol_faces = Vec::with_capacity(order.len());

    let mut fuse = |point_idx: u32, normal: Option<Vec3>, uv: Option<(f32, f32)>| -> u32 {
        let wrapped_uv = uv.map(|(u, v)| (uv_wrap(u), uv_wrap(v)));
        let key = VertexKey {
            point: point_idx,
            normal_bits: normal.map(|n| pack_normal(n)),
            uv_bits: wrapped_uv.map(|(u, v)| (u.to_bits(), v.to_bits())),
        };
        if let Some(&v) = vertex_lookup.get(&key) {
            return v;
        }
        let vertex_index = points.len() as u32;
        points.push(mlod_lod.points[point_idx as usize].pos);
        normals_packed.push(key.normal_bits.unwrap_or(0));
        uvs_raw.push(wrapped_uv.unwrap_or((0.0, 0.0)));
        vertex_to_point.push(point_idx);
        if point_to_vertex[point_idx as usize] == NOPOINT {
            point_to_vertex[point_idx as usize] = vertex_index;
        }
        vertex_lookup.insert(key, vertex_index);
        vertex_index
    };

    for &face_idx in &order {
        let face = &mlod_lod.faces[face_idx];
        let corners = face.corner_count();
        let perm = reorder_corners(face);
        let mut verts = [0u32; 4];
        for (slot, &src) in perm.iter().enumerate() {
            let point_idx = face.points_index[src];
            let normal = if non_visual { None } else { mlod_lod.face_normals.get(face.normals_index[src] as usize).copied() };
            let uv = if non_visual { None } else { Some(face.uv[src]) };
            verts[slot] = fuse(point_idx, normal, uv);
        }
        odol_faces.push(OdolFace { face_type: corners as u8, points: verts });
    }

    let (uv_min, uv_max) = uvs_raw.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &(u, v)| {
        (lo.min(u).min(v), hi.max(u).max(v))
    });
    let uvs_packed: Vec<(i16, i16)> = uvs_raw
        .iter()
        .map(|&(u, v)| (pack_uv_component(u, uv_min, uv_max), pack_uv_component(v, uv_min, uv_max)))
        .collect();

    let sections = build_sections(&order, &mlod_lod.faces, &flags);
    let selections = build_selections(&mlod_lod, &point_to_vertex);
    let proxies = build_proxies(&mlod_lod, &point_to_vertex, diagnostics);
    let face_area_sum: f32 = odol_faces.iter().map(|f| f.area(&points)).sum();

    Ok(OdolLod {
        resolution: mlod_lod.resolution,
        points,
        normals_packed,
        uvs_packed,
        point_to_vertex,
        vertex_to_point,
        faces: odol_faces,
        sections,
        selections,
        proxies,
        textures: mlod_lod.textures,
        materials: materials.to_vec(),
        face_area_sum,
        vertexboneref_is_simple: true,
    })
}

/// Byte footprint of one face's index record in the packed face-index
/// allocation: 16 bytes for a triangle, 20 for a quad (`p3d.cpp`'s
/// `(face_type == 4) ? 20 : 16`).
fn face_index_bytes(face: &MlodFace) -> u32 {
    if face.face_type == 4 {
        20
    } else {
        16
    }
}

fn build_sections(order: &[usize], faces: &[MlodFace], flags: &[u32]) -> Vec<OdolSection> {
    let mut sections = Vec::new();
    let mut run_start = 0usize;
    let mut index_start = 0u32;
    for i in 1..=order.len() {
        let ends_run = i == order.len() || {
            let (a, b) = (order[i - 1], order[i]);
            (faces[a].material_index, flags[a], faces[a].texture_index, &faces[a].section_names)
                != (faces[b].material_index, flags[b], faces[b].texture_index, &faces[b].section_names)
        };
        if ends_run {
            let rep = faces[order[run_start]].clone_flags_source();
            let index_end = index_start + order[run_start..i].iter().map(|&idx| face_index_bytes(&faces[idx])).sum::<u32>();
            sections.push(OdolSection {
                face_start: run_start as u32,
                face_end: i as u32,
                face_index_start: index_start,
                face_index_end: index_end,
                material_index: rep.0,
                texture_index: rep.1,
                flags: flags[order[run_start]],
                num_stages: 2,
                area_over_tex: [1.0, -1000.0],
            });
            index_start = index_end;
            run_start = i;
        }
    }
    sections
}

impl MlodFace {
    fn clone_flags_source(&self) -> (Option<u32>, Option<u32>) {
        (self.material_index, self.texture_index)
    }
}

/// Non-sectional selections (no skeleton subsystem is implemented in this
/// crate, so every selection resolves to its vertex/weight list rather
/// than a skeleton-section reference).
fn build_selections(lod: &MlodLod, point_to_vertex: &[u32]) -> Vec<OdolSelection> {
    lod.selections
        .iter()
        .filter(|s| !s.name.starts_with("proxy:"))
        .map(|sel| {
            let mut total = 0u32;
            let mut weights = Vec::new();
            for (point_idx, &w) in sel.point_weights.iter().enumerate() {
                if w == 0 {
                    continue;
                }
                let vertex = point_to_vertex[point_idx];
                if vertex != NOPOINT {
                    weights.push((vertex, w));
                    total += 1;
                }
            }
            let _ = total;
            OdolSelection::Vertices { name: sel.name.clone(), weights }
        })
        .collect()
}

/// Builds a proxy for every `proxy:NAME.ID` selection: an orthonormal
/// basis derived from the selection's first face (spec §4.2.4). No
/// skeleton subsystem is implemented, so `bone_index` is always -1 rather
/// than "first non-zero bone link of that vertex".
fn build_proxies(lod: &MlodLod, _point_to_vertex: &[u32], diagnostics: &mut Diagnostics) -> Vec<OdolProxy> {
    let mut proxies = Vec::new();
    for sel in &lod.selections {
        let Some(rest) = sel.name.strip_prefix("proxy:") else { continue };
        let Some((name, id_str)) = rest.rsplit_once('.') else { continue };
        let Ok(proxy_id) = id_str.parse::<u32>() else { continue };

        let face = lod.faces.iter().enumerate().find(|(i, f)| {
            (0..f.corner_count()).any(|c| sel.point_weights.get(f.points_index[c] as usize).copied().unwrap_or(0) > 0)
                && sel.face_flags.get(*i).copied().unwrap_or(0) != 0
        });
        let Some((_, face)) = face else {
            diagnostics.push(
                DiagnosticKind::NoProxyFace,
                Severity::Warning,
                format!("proxy selection `{}` has no matching face", sel.name),
            );
            continue;
        };

        let p0 = lod.points[face.points_index[0] as usize].pos;
        let p1 = lod.points[face.points_index[1] as usize].pos;
        let p2 = lod.points[face.points_index[2] as usize].pos;
        let y = p1.sub(p0).normalize();
        let z = p2.sub(p0).normalize();
        let x = y.cross(z);

        proxies.push(OdolProxy {
            name: name.to_string(),
            proxy_id,
            origin: p0,
            transform_x: x,
            transform_y: y,
            transform_z: z,
            bone_index: -1,
        });
    }
    proxies
}

/// Writes a complete ODOL model (spec §4.2.7): header, per-LOD offset
/// tables with placeholder-then-patch offsets, and each LOD's body.
pub fn write_odol<W: Write + Seek>(w: &mut W, info: &ModelInfo, lods: &[OdolLod]) -> Result<(), ModelError> {
    w.write_all(b"ODOL")?;
    w.write_u32::<LittleEndian>(71)?; // version 71, the default ODOL revision.
    w.write_u32::<LittleEndian>(1)?; // app id, fixed for this toolchain's target.
    write_cstring(w, "")?; // muzzle-flash list, always empty for a freshly transcoded model.
    w.write_u32::<LittleEndian>(lods.len() as u32)?;

    write_model_info(w, info)?;

    let start_table_pos = w.stream_position()?;
    for _ in lods {
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;
    }

    let mut offsets = Vec::with_capacity(lods.len());
    for lod in lods {
        let start = w.stream_position()?;
        write_lod_body(w, lod)?;
        let end = w.stream_position()?;
        offsets.push((start as u32, end as u32));
    }

    let tail = w.stream_position()?;
    w.seek(SeekFrom::Start(start_table_pos))?;
    for (start, end) in offsets {
        w.write_u32::<LittleEndian>(start)?;
        w.write_u32::<LittleEndian>(end)?;
    }
    w.seek(SeekFrom::Start(tail))?;
    Ok(())
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> std::io::Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)
}

fn write_bbox<W: Write>(w: &mut W, bbox: &super::BoundingBox) -> std::io::Result<()> {
    write_vec3(w, bbox.min)?;
    write_vec3(w, bbox.max)
}

fn write_model_info<W: Write>(w: &mut W, info: &ModelInfo) -> Result<(), ModelError> {
    w.write_u8(info.autocenter as u8)?;
    write_bbox(w, &info.bounding_box_visual)?;
    write_bbox(w, &info.bounding_box_total)?;
    w.write_f32::<LittleEndian>(info.view_density)?;
    w.write_f32::<LittleEndian>(info.mass)?;
    write_vec3(w, info.inertia.center_of_mass)?;
    write_vec3(w, info.inertia.inverse_diagonal)?;
    w.write_u8(info.lod_no_shadow as u8)?;
    w.write_u8(info.can_occlude as u8)?;
    w.write_u8(info.can_be_occluded as u8)?;
    w.write_u8(info.frequent as u8)?;
    w.write_u8(info.buoyancy as u8)?;
    w.write_u8(info.force_not_alpha as u8)?;
    w.write_u8(info.animated as u8)?;
    w.write_f32::<LittleEndian>(info.armor)?;
    w.write_f32::<LittleEndian>(info.aicovers)?;
    write_cstring(w, &info.map)?;
    write_cstring(w, &info.class)?;
    write_cstring(w, &info.damage)?;
    write_cstring(w, &info.sbsource)?;
    w.write_u8(info.prefer_shadow_volume as u8)?;
    w.write_f32::<LittleEndian>(info.shadow_offset)?;
    w.write_f32::<LittleEndian>(info.shadow_lod)?;
    w.write_f32::<LittleEndian>(info.shadow_volume_lod)?;
    w.write_f32::<LittleEndian>(info.shadow_buffer_lod)?;
    w.write_f32::<LittleEndian>(info.shadow_buffer_lod_vis)?;
    Ok(())
}

fn write_lod_body<W: Write>(w: &mut W, lod: &OdolLod) -> Result<(), ModelError> {
    w.write_u32::<LittleEndian>(lod.proxies.len() as u32)?;
    for p in &lod.proxies {
        write_cstring(w, &p.name)?;
        w.write_u32::<LittleEndian>(p.proxy_id)?;
        write_vec3(w, p.origin)?;
        write_vec3(w, p.transform_x)?;
        write_vec3(w, p.transform_y)?;
        write_vec3(w, p.transform_z)?;
        w.write_i32::<LittleEndian>(p.bone_index)?;
    }

    // subskeleton<->skeleton maps: no skeleton subsystem is implemented, so
    // these are always the trivial identity-length-zero maps.
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(0)?;

    w.write_u32::<LittleEndian>(lod.points.len() as u32)?;
    w.write_f32::<LittleEndian>(lod.face_area_sum)?;
    w.write_u32::<LittleEndian>(0)?; // clip flags

    let bbox = super::BoundingBox::from_points(lod.points.iter().copied())
        .unwrap_or(super::BoundingBox { min: Vec3::ZERO, max: Vec3::ZERO });
    write_bbox(w, &bbox)?;
    write_vec3(w, bbox.autocenter())?;
    let sphere = lod.points.iter().map(|p| p.sub(bbox.autocenter()).length()).fold(0.0f32, f32::max);
    w.write_f32::<LittleEndian>(sphere)?;

    let interned = lod.textures.join("\0");
    write_cstring(w, &interned)?;

    w.write_u32::<LittleEndian>(lod.materials.len() as u32)?;
    for mat in &lod.materials {
        write_material(w, mat)?;
    }

    w.write_u32::<LittleEndian>(lod.faces.len() as u32)?;
    for face in &lod.faces {
        w.write_u8(face.face_type)?;
        for i in 0..face.face_type as usize {
            w.write_u32::<LittleEndian>(face.points[i])?;
        }
    }

    w.write_u32::<LittleEndian>(lod.sections.len() as u32)?;
    for section in &lod.sections {
        w.write_u32::<LittleEndian>(section.face_start)?;
        w.write_u32::<LittleEndian>(section.face_end)?;
        w.write_u32::<LittleEndian>(section.face_index_start)?;
        w.write_u32::<LittleEndian>(section.face_index_end)?;
        w.write_i32::<LittleEndian>(section.material_index.map(|i| i as i32).unwrap_or(-1))?;
        w.write_i32::<LittleEndian>(section.texture_index.map(|i| i as i32).unwrap_or(-1))?;
        w.write_u32::<LittleEndian>(section.flags)?;
        w.write_u32::<LittleEndian>(section.num_stages)?;
        w.write_f32::<LittleEndian>(section.area_over_tex[0])?;
        w.write_f32::<LittleEndian>(section.area_over_tex[1])?;
    }

    w.write_u32::<LittleEndian>(lod.selections.len() as u32)?;
    for sel in &lod.selections {
        match sel {
            OdolSelection::Vertices { name, weights } => {
                write_cstring(w, name)?;
                w.write_u8(0)?; // non-sectional marker
                w.write_u32::<LittleEndian>(weights.len() as u32)?;
                for &(vertex, weight) in weights {
                    w.write_u32::<LittleEndian>(vertex)?;
                    w.write_u8(weight)?;
                }
            }
            OdolSelection::Sections { name, sections } => {
                write_cstring(w, name)?;
                w.write_u8(1)?; // sectional marker
                w.write_u32::<LittleEndian>(sections.len() as u32)?;
                for &s in sections {
                    w.write_u32::<LittleEndian>(s)?;
                }
            }
        }
    }

    w.write_u32::<LittleEndian>(0)?; // property records: none carried past model-info synthesis.
    w.write_u32::<LittleEndian>(0)?; // frames: always 0, per spec §4.2.7.
    w.write_u32::<LittleEndian>(0)?; // colors
    w.write_u32::<LittleEndian>(0)?; // flags

    let vertex_table_size_pos = w.stream_position()?;
    w.write_u32::<LittleEndian>(0)?; // placeholder, patched below
    let vertex_table_start = w.stream_position()?;

    for p in &lod.points {
        write_vec3(w, *p)?;
    }
    for &n in &lod.normals_packed {
        w.write_u32::<LittleEndian>(n)?;
    }
    for &(u, v) in &lod.uvs_packed {
        w.write_i16::<LittleEndian>(u)?;
        w.write_i16::<LittleEndian>(v)?;
    }
    w.write_u8(lod.vertexboneref_is_simple as u8)?;
    for &point in &lod.vertex_to_point {
        w.write_u32::<LittleEndian>(point)?;
    }

    let vertex_table_end = w.stream_position()?;
    let size = (vertex_table_end - vertex_table_start) as u32;
    w.seek(SeekFrom::Start(vertex_table_size_pos))?;
    w.write_u32::<LittleEndian>(size)?;
    w.seek(SeekFrom::Start(vertex_table_end))?;

    // Collimator-info flag; a single trailing byte per spec §4.2.7.
    w.write_u8(0)?;
    Ok(())
}

fn write_material<W: Write>(w: &mut W, mat: &Material) -> Result<(), ModelError> {
    write_cstring(w, &mat.path)?;
    let write_color = |w: &mut W, c: super::material::Color| -> std::io::Result<()> {
        w.write_f32::<LittleEndian>(c.r)?;
        w.write_f32::<LittleEndian>(c.g)?;
        w.write_f32::<LittleEndian>(c.b)?;
        w.write_f32::<LittleEndian>(c.a)
    };
    write_color(w, mat.emissive)?;
    write_color(w, mat.ambient)?;
    write_color(w, mat.diffuse)?;
    write_color(w, mat.forced_diffuse)?;
    write_color(w, mat.specular)?;
    w.write_f32::<LittleEndian>(mat.specular_power)?;
    w.write_u32::<LittleEndian>(mat.pixelshader_id)?;
    w.write_u32::<LittleEndian>(mat.vertexshader_id)?;
    // The original tool writes the specular color a second time here; a
    // known ODOL quirk from an early format revision that the engine still
    // expects, preserved rather than "fixed" so output stays consumable.
    write_color(w, mat.specular)?;
    w.write_u32::<LittleEndian>(mat.render_flags)?;
    w.write_u32::<LittleEndian>(mat.textures.len() as u32)?;
    for tex in &mat.textures {
        write_cstring(w, &tex.path)?;
        w.write_u32::<LittleEndian>(tex.transform_index)?;
    }
    w.write_u32::<LittleEndian>(mat.transforms.len() as u32)?;
    for t in &mat.transforms {
        for row in &t.matrix {
            for &v in row {
                w.write_f32::<LittleEndian>(v)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_normal_roundtrips_axis_unit_vectors() {
        let packed = pack_normal(Vec3::new(1.0, 0.0, 0.0));
        let x = (packed & 0x3ff) as i32;
        let x_signed = if x >= 512 { x - 1024 } else { x };
        assert_eq!(x_signed, -511);
    }

    #[test]
    fn pack_uv_maps_endpoints_to_extremes() {
        assert_eq!(pack_uv_component(0.0, 0.0, 1.0), -32767);
        assert_eq!(pack_uv_component(1.0, 0.0, 1.0), 32767);
    }

    #[test]
    fn uv_wrap_preserves_sign_and_fraction() {
        assert!((uv_wrap(2.25) - 0.25).abs() < 1e-6);
        assert!((uv_wrap(-2.25) + 0.25).abs() < 1e-6);
    }
}
