// r_model_md3.rs — MD3 alias model loading: meshes, frames and built-in tags

use std::f32::consts::PI;

use ufo_common::q_shared::{add_point_to_bounds, clear_bounds, radius_from_bounds, Mat4, Vec2, Vec3};
use ufo_common::qfiles::{
    DMd3, DMd3Frame, DMd3Mesh, DMd3Tag, DMd3Vertex, LeReader, LumpRecord, MD3_MAX_FRAMES, MD3_MAX_MESHES,
    MD3_MAX_PATH, MD3_MAX_SHADERS, MD3_MAX_TAGS, MD3_MAX_TRIANGLES, MD3_MAX_VERTS, MD3_XYZ_SCALE,
};

use crate::error::ModelError;
use crate::r_image::TextureProvider;
use crate::r_model_alias::{build_static_arrays, parse_anims};
use crate::r_model_md2::load_skin;
use crate::r_model_types::{AliasFrame, AliasMesh, AliasModel, AliasTagData, AliasVertex, Model, ModelKind};

fn limit(name: &str, what: &str, value: i32, min: i32, max: usize) -> Result<usize, ModelError> {
    if value < min || value as usize > max {
        return Err(ModelError::bad_alias(name, format!("has too many (or no) {} ({})", what, value)));
    }
    Ok(value as usize)
}

fn offset(name: &str, what: &str, base: usize, value: i32, len: usize) -> Result<usize, ModelError> {
    let at = usize::try_from(value).ok().and_then(|v| v.checked_add(base)).filter(|&at| at <= len);
    at.ok_or_else(|| ModelError::bad_alias(name, format!("bad {} offset {}", what, value)))
}

fn read_records<T: LumpRecord>(
    name: &str,
    data: &[u8],
    at: usize,
    count: usize,
    what: &'static str,
) -> Result<Vec<T>, ModelError> {
    let mut r = LeReader::at(data, at, what);
    (0..count)
        .map(|_| T::read(&mut r))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ModelError::format(name))
}

/// Latitude in the high byte, longitude in the low byte, 256 steps per turn.
pub fn decode_normal(norm: u16) -> Vec3 {
    let lat = (norm >> 8) as f32 * PI / 128.0;
    let lng = (norm & 0xff) as f32 * PI / 128.0;
    [lat.cos() * lng.sin(), lat.sin() * lng.sin(), lng.cos()]
}

/// Stored frame-major, kept tag-major like the `.tag` files.
fn load_md3_tags(name: &str, raw: &[DMd3Tag], num_tags: usize, num_frames: usize) -> AliasTagData {
    let names = raw[..num_tags].iter().map(|t| t.name.clone()).collect();
    let mut matrices = Vec::with_capacity(num_tags * num_frames);
    for tag in 0..num_tags {
        for frame in 0..num_frames {
            let t = &raw[frame * num_tags + tag];
            if t.name != raw[tag].name {
                log::warn!("model {}: tag {} is named '{}' in frame {}", name, raw[tag].name, t.name, frame);
            }
            let mut m: Mat4 = [0.0; 16];
            for (col, v) in t.axis.iter().chain(std::iter::once(&t.origin)).enumerate() {
                m[col * 4..col * 4 + 3].copy_from_slice(v);
            }
            m[15] = 1.0;
            matrices.push(m);
        }
    }
    AliasTagData { names, num_frames, matrices }
}

fn load_md3_mesh(
    name: &str,
    data: &[u8],
    base: usize,
    num_frames: usize,
    frames: &[AliasFrame],
    textures: &mut dyn TextureProvider,
) -> Result<(AliasMesh, usize), ModelError> {
    let mut r = LeReader::at(data, base, "md3 mesh");
    let hdr = DMd3Mesh::read(&mut r).map_err(ModelError::format(name))?;

    let num_skins = limit(name, "skins", hdr.num_skins, 1, MD3_MAX_SHADERS)?;
    let num_tris = limit(name, "triangles", hdr.num_tris, 1, MD3_MAX_TRIANGLES)?;
    let num_verts = limit(name, "vertices", hdr.num_verts, 1, MD3_MAX_VERTS)?;
    if hdr.num_frames as usize != num_frames {
        return Err(ModelError::bad_alias(
            name,
            format!("mesh {} has {} frames, model has {}", hdr.name, hdr.num_frames, num_frames),
        ));
    }
    if hdr.meshsize <= 0 {
        return Err(ModelError::bad_alias(name, format!("mesh {} has bad size {}", hdr.name, hdr.meshsize)));
    }

    // shaders: name plus an unused index
    let mut r = LeReader::at(data, offset(name, "skin", base, hdr.ofs_skins, data.len())?, "md3 skins");
    let mut skins = Vec::with_capacity(num_skins);
    for _ in 0..num_skins {
        let skin = r.name(MD3_MAX_PATH).map_err(ModelError::format(name))?;
        r.i32().map_err(ModelError::format(name))?;
        skins.push(load_skin(name, &skin, textures));
    }

    let mut r = LeReader::at(data, offset(name, "tris", base, hdr.ofs_tris, data.len())?, "md3 triangles");
    let mut indexes = Vec::with_capacity(num_tris * 3);
    for i in 0..num_tris * 3 {
        let index = r.i32().map_err(ModelError::format(name))?;
        if index < 0 || index as usize >= num_verts {
            return Err(ModelError::bad_alias(name, format!("triangle {} has bad indexes", i / 3)));
        }
        indexes.push(index as u32);
    }

    let mut r = LeReader::at(data, offset(name, "st", base, hdr.ofs_tcs, data.len())?, "md3 texcoords");
    let mut texcoords: Vec<Vec2> = Vec::with_capacity(num_verts);
    for _ in 0..num_verts {
        let s = r.f32().map_err(ModelError::format(name))?;
        let t = r.f32().map_err(ModelError::format(name))?;
        texcoords.push([s, t]);
    }

    let at = offset(name, "verts", base, hdr.ofs_verts, data.len())?;
    let packed: Vec<DMd3Vertex> = read_records(name, data, at, num_frames * num_verts, "md3 vertexes")?;
    let vertexes = packed
        .iter()
        .map(|v| AliasVertex {
            point: v.point.map(|c| c as f32 * MD3_XYZ_SCALE),
            normal: decode_normal(v.norm),
        })
        .collect();

    let mesh = AliasMesh {
        name: hdr.name,
        num_verts,
        num_tris,
        indexes,
        texcoords,
        frames: frames.to_vec(),
        vertexes,
        skins,
        static_arrays: None,
    };
    Ok((mesh, hdr.meshsize as usize))
}

/// Loads an MD3 model and its optional sibling animation file. Tags come
/// from the model itself.
pub fn load_md3(
    name: &str,
    data: &[u8],
    anm: Option<&str>,
    textures: &mut dyn TextureProvider,
) -> Result<Model, ModelError> {
    let hdr = DMd3::parse(data).map_err(ModelError::format(name))?;

    if hdr.ofs_end < 0 || hdr.ofs_end as usize > data.len() {
        return Err(ModelError::bad_alias(
            name,
            format!("broken offset values ({}, {})", data.len(), hdr.ofs_end),
        ));
    }
    let num_frames = limit(name, "frames", hdr.num_frames, 1, MD3_MAX_FRAMES)?;
    let num_tags = limit(name, "tags", hdr.num_tags, 0, MD3_MAX_TAGS)?;
    let num_meshes = limit(name, "meshes", hdr.num_meshes, 1, MD3_MAX_MESHES)?;

    // frame bounds are absolute, vertices carry no per-frame offset
    let at = offset(name, "frames", 0, hdr.ofs_frames, data.len())?;
    let raw_frames: Vec<DMd3Frame> = read_records(name, data, at, num_frames, "md3 frames")?;
    let mut mins = [0.0; 3];
    let mut maxs = [0.0; 3];
    clear_bounds(&mut mins, &mut maxs);
    let frames: Vec<AliasFrame> = raw_frames
        .into_iter()
        .map(|f| {
            add_point_to_bounds(&f.mins, &mut mins, &mut maxs);
            add_point_to_bounds(&f.maxs, &mut mins, &mut maxs);
            AliasFrame {
                radius: radius_from_bounds(&f.mins, &f.maxs),
                name: f.name,
                scale: [1.0; 3],
                translate: [0.0; 3],
                mins: f.mins,
                maxs: f.maxs,
            }
        })
        .collect();

    let tags = if num_tags > 0 {
        let at = offset(name, "tags", 0, hdr.ofs_tags, data.len())?;
        let raw: Vec<DMd3Tag> = read_records(name, data, at, num_tags * num_frames, "md3 tags")?;
        Some(load_md3_tags(name, &raw, num_tags, num_frames))
    } else {
        None
    };

    let mut meshes = Vec::with_capacity(num_meshes);
    let mut base = offset(name, "meshes", 0, hdr.ofs_meshes, data.len())?;
    for _ in 0..num_meshes {
        let (mesh, size) = load_md3_mesh(name, data, base, num_frames, &frames, textures)?;
        meshes.push(mesh);
        base += size;
    }

    let anims = match anm {
        Some(text) => parse_anims(name, text, num_frames)?,
        None => Vec::new(),
    };

    let mut alias = AliasModel { num_frames, meshes, anims, tags };
    build_static_arrays(&mut alias);

    log::info!(
        "model {}: {} frames, {} meshes, {} tris, {} tags",
        name,
        num_frames,
        num_meshes,
        alias.num_tris(),
        num_tags
    );

    Ok(Model {
        name: name.to_string(),
        mins,
        maxs,
        radius: radius_from_bounds(&mins, &maxs),
        kind: ModelKind::Alias(alias),
    })
}
