//! MLOD read (spec §4.2.1), grounded in `p3d.h`'s `mlod_lod::read` layout.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::ModelError;
use crate::utils::read_cstring;

use super::Vec3;

const MLOD_MAGIC: &[u8; 4] = b"MLOD";
const LOD_MAGIC: &[u8; 4] = b"P3DM";

#[derive(Debug, Clone, Copy, Default)]
pub struct MlodPoint {
    pub pos: Vec3,
    /// Per-point flags (selection-weight / clamp-size bits packed by the
    /// original tool); carried through untouched.
    pub flags: u32,
}

/// One face's four-slot pseudovertex table: `(point_index, normal_index, u, v)`
/// per corner, unused slots for a triangle left as [`NOPOINT`](super::odol::NOPOINT).
#[derive(Debug, Clone)]
pub struct MlodFace {
    pub face_type: u8,
    pub points_index: [u32; 4],
    pub normals_index: [u32; 4],
    pub uv: [(f32, f32); 4],
    /// Index into the LOD's interned texture list; `None` = no texture.
    pub texture_index: Option<u32>,
    /// Index into the LOD's interned material list; `None` = no material.
    pub material_index: Option<u32>,
    /// Concatenated selection names this face belongs to, used as a sort
    /// tiebreaker when building ODOL sections (spec §4.2.4).
    pub section_names: String,
}

impl MlodFace {
    pub fn corner_count(&self) -> usize {
        self.face_type as usize
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub name: String,
    pub point_weights: Vec<u8>,
    pub face_flags: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Tag {
    Mass(Vec<f32>),
    SharpEdges(Vec<(u32, u32)>),
    Property { name: String, value: String },
    UvSet { stage: u32, uvs: Vec<[(f32, f32); 4]> },
    Selection(Selection),
}

#[derive(Debug, Clone, Default)]
pub struct MlodLod {
    pub resolution: f32,
    pub points: Vec<MlodPoint>,
    pub face_normals: Vec<Vec3>,
    pub faces: Vec<MlodFace>,
    pub textures: Vec<String>,
    pub materials: Vec<String>,
    pub mass: Option<Vec<f32>>,
    pub sharp_edges: Vec<(u32, u32)>,
    pub properties: Vec<(String, String)>,
    pub uv_sets: Vec<(u32, Vec<[(f32, f32); 4]>)>,
    pub selections: Vec<Selection>,
}

impl MlodLod {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MlodModel {
    pub lods: Vec<MlodLod>,
}

fn intern(list: &mut Vec<String>, value: String) -> Option<u32> {
    if value.is_empty() {
        return None;
    }
    if let Some(i) = list.iter().position(|s| s == &value) {
        return Some(i as u32);
    }
    list.push(value);
    Some((list.len() - 1) as u32)
}

fn read_vec3<R: Read>(r: &mut R) -> std::io::Result<Vec3> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn read_face<R: Read>(r: &mut R, textures: &mut Vec<String>, materials: &mut Vec<String>) -> std::io::Result<MlodFace> {
    let corners = r.read_u32::<LittleEndian>()?;
    let mut points_index = [0u32; 4];
    let mut normals_index = [0u32; 4];
    let mut uv = [(0.0f32, 0.0f32); 4];
    for i in 0..corners as usize {
        points_index[i] = r.read_u32::<LittleEndian>()?;
        normals_index[i] = r.read_u32::<LittleEndian>()?;
        uv[i] = (r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
    }
    let _flags = r.read_u32::<LittleEndian>()?;
    let texture = read_cstring(r)?;
    let material = read_cstring(r)?;
    Ok(MlodFace {
        face_type: corners as u8,
        points_index,
        normals_index,
        uv,
        texture_index: intern(textures, texture),
        material_index: intern(materials, material),
        section_names: String::new(),
    })
}

fn read_tag<R: Read + Seek>(r: &mut R, num_points: u32, num_faces: u32) -> std::io::Result<Option<Tag>> {
    let mut start = [0u8; 1];
    r.read_exact(&mut start)?;
    let name = read_cstring(r)?;
    let len = r.read_u32::<LittleEndian>()?;
    let body_start = r.stream_position()?;

    let tag = match name.as_str() {
        "#EndOfFile#" => None,
        "#Mass#" => {
            let mut mass = Vec::with_capacity(num_points as usize);
            for _ in 0..num_points {
                mass.push(r.read_f32::<LittleEndian>()?);
            }
            Some(Tag::Mass(mass))
        }
        "#SharpEdges#" => {
            let pair_count = len as usize / 8;
            let mut edges = Vec::with_capacity(pair_count);
            for _ in 0..pair_count {
                edges.push((r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?));
            }
            Some(Tag::SharpEdges(edges))
        }
        "#Property#" => {
            let mut name_buf = [0u8; 64];
            let mut value_buf = [0u8; 64];
            r.read_exact(&mut name_buf)?;
            r.read_exact(&mut value_buf)?;
            Some(Tag::Property {
                name: cstr_from_fixed(&name_buf),
                value: cstr_from_fixed(&value_buf),
            })
        }
        "#UVSet#" => {
            let stage = r.read_u32::<LittleEndian>()?;
            let mut uvs = Vec::with_capacity(num_faces as usize);
            for _ in 0..num_faces {
                let mut corners = [(0.0f32, 0.0f32); 4];
                for c in corners.iter_mut() {
                    *c = (r.read_f32::<LittleEndian>()?, r.read_f32::<LittleEndian>()?);
                }
                uvs.push(corners);
            }
            Some(Tag::UvSet { stage, uvs })
        }
        _ => {
            // Any other tag name denotes a selection: a byte-per-point
            // weight array followed by a byte-per-face mask array.
            let mut point_weights = vec![0u8; num_points as usize];
            r.read_exact(&mut point_weights)?;
            let mut face_flags = vec![0u8; num_faces as usize];
            r.read_exact(&mut face_flags)?;
            Some(Tag::Selection(Selection { name, point_weights, face_flags }))
        }
    };

    // Tag bodies are length-prefixed; always resume at the declared end
    // regardless of how many bytes the specific reader above consumed.
    r.seek(SeekFrom::Start(body_start + u64::from(len)))?;
    Ok(tag)
}

fn cstr_from_fixed(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn read_lod<R: Read + Seek>(r: &mut R) -> Result<MlodLod, ModelError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != LOD_MAGIC {
        return Err(ModelError::BadMagic);
    }
    let _version_major = r.read_u32::<LittleEndian>()?;
    let _version_minor = r.read_u32::<LittleEndian>()?;
    let num_points = r.read_u32::<LittleEndian>()?;
    let num_face_normals = r.read_u32::<LittleEndian>()?;
    let num_faces = r.read_u32::<LittleEndian>()?;
    let _flags = r.read_u32::<LittleEndian>()?;

    let mut points = Vec::with_capacity(num_points as usize);
    for _ in 0..num_points {
        let pos = read_vec3(r)?;
        let flags = r.read_u32::<LittleEndian>()?;
        points.push(MlodPoint { pos, flags });
    }

    let mut face_normals = Vec::with_capacity(num_face_normals as usize);
    for _ in 0..num_face_normals {
        face_normals.push(read_vec3(r)?);
    }

    let mut textures = Vec::new();
    let mut materials = Vec::new();
    let mut faces = Vec::with_capacity(num_faces as usize);
    for _ in 0..num_faces {
        faces.push(read_face(r, &mut textures, &mut materials)?);
    }

    let mut lod = MlodLod {
        points,
        face_normals,
        faces,
        textures,
        materials,
        ..MlodLod::default()
    };

    loop {
        match read_tag(r, num_points, num_faces)? {
            None => break,
            Some(Tag::Mass(mass)) => lod.mass = Some(mass),
            Some(Tag::SharpEdges(edges)) => lod.sharp_edges = edges,
            Some(Tag::Property { name, value }) => lod.properties.push((name, value)),
            Some(Tag::UvSet { stage, uvs }) => {
                if stage != 0 {
                    lod.uv_sets.push((stage, uvs));
                }
                // stage 0 duplicates the per-face inline UVs already read
                // above and is discarded, matching the original rejecting
                // anything but the non-default stage here.
            }
            Some(Tag::Selection(sel)) => {
                for (i, face) in lod.faces.iter_mut().enumerate() {
                    if sel.face_flags.get(i).copied().unwrap_or(0) != 0 {
                        if !face.section_names.is_empty() {
                            face.section_names.push(':');
                        }
                        face.section_names.push_str(&sel.name);
                    }
                }
                lod.selections.push(sel);
            }
        }
    }

    Ok(lod)
}

/// Reads every LOD in an MLOD file in order, per spec §4.2.1.
pub fn read_mlod<R: Read + Seek>(r: &mut R) -> Result<MlodModel, ModelError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MLOD_MAGIC {
        return Err(ModelError::BadMagic);
    }
    let _version = r.read_u32::<LittleEndian>()?;
    let num_lods = r.read_u32::<LittleEndian>()?;

    let mut lods = Vec::with_capacity(num_lods as usize);
    for _ in 0..num_lods {
        let mut lod = read_lod(r)?;
        // Resolution is stored as a plain LE f32 immediately following each
        // LOD body in the source container format.
        lod.resolution = r.read_f32::<LittleEndian>()?;
        lods.push(lod);
    }
    Ok(MlodModel { lods })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_minimal_lod(buf: &mut Vec<u8>, resolution: f32) {
        buf.extend_from_slice(LOD_MAGIC);
        buf.extend_from_slice(&0x1bu32.to_le_bytes());
        buf.extend_from_slice(&256u32.to_le_bytes());
        // 3 points, 1 normal, 1 face (triangle)
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        for p in [(0.0f32, 0.0, 0.0), (1.0, 0.0, 0.0), (0.0, 1.0, 0.0)] {
            buf.extend_from_slice(&p.0.to_le_bytes());
            buf.extend_from_slice(&p.1.to_le_bytes());
            buf.extend_from_slice(&p.2.to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes());
        }
        buf.extend_from_slice(&0.0f32.to_le_bytes());
        buf.extend_from_slice(&0.0f32.to_le_bytes());
        buf.extend_from_slice(&1.0f32.to_le_bytes());

        buf.extend_from_slice(&3u32.to_le_bytes()); // face_type
        for (pi, uv) in [(0u32, (0.0f32, 0.0f32)), (1, (1.0, 0.0)), (2, (0.0, 1.0))] {
            buf.extend_from_slice(&pi.to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes());
            buf.extend_from_slice(&uv.0.to_le_bytes());
            buf.extend_from_slice(&uv.1.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(0); // empty texture cstring
        buf.push(0); // empty material cstring

        // #EndOfFile# tag
        buf.push(0u8);
        buf.extend_from_slice(b"#EndOfFile#\0");
        buf.extend_from_slice(&0u32.to_le_bytes());

        buf.extend_from_slice(&resolution.to_le_bytes());
    }

    #[test]
    fn reads_single_triangle_lod() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MLOD_MAGIC);
        buf.extend_from_slice(&257u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        write_minimal_lod(&mut buf, 1.0);

        let model = read_mlod(&mut Cursor::new(buf)).unwrap();
        assert_eq!(model.lods.len(), 1);
        let lod = &model.lods[0];
        assert_eq!(lod.points.len(), 3);
        assert_eq!(lod.faces.len(), 1);
        assert_eq!(lod.faces[0].face_type, 3);
        assert_eq!(lod.resolution, 1.0);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = b"XXXX".to_vec();
        assert!(matches!(read_mlod(&mut Cursor::new(buf)), Err(ModelError::BadMagic)));
    }
}
