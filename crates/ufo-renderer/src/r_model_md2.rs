// r_model_md2.rs — MD2 alias model and tag file loading

use std::collections::HashMap;

use ufo_common::q_shared::{
    add_point_to_bounds, clear_bounds, com_file_path, cross_product, radius_from_bounds, vector_add,
    vector_normalize, vector_subtract, Mat4, Vec3,
};
use ufo_common::qfiles::{
    DAliasFrame, DMdl, DStVert, DTagHeader, DTriangle, LeReader, LumpRecord, MD2_FRAME_HEADER_SIZE,
    MD2_MAX_FRAMES, MD2_MAX_SKINNAME, MD2_MAX_SKINS, MD2_MAX_TAGNAME, MD2_MAX_TRIANGLES, MD2_MAX_VERTS,
    TAG_DISK_MATRIX_SIZE, TAG_HEADER_SIZE, TAG_MATRIX_SIZE,
};

use crate::error::ModelError;
use crate::r_image::{ImageKind, TextureInfo, TextureProvider};
use crate::r_model_alias::{build_static_arrays, parse_anims};
use crate::r_model_types::{AliasFrame, AliasMesh, AliasModel, AliasSkin, AliasTagData, AliasVertex, Model, ModelKind};

/// Hard limit on de-duplicated vertices per mesh.
pub const MAX_ALIAS_VERTS: usize = 8192;
const WARN_ALIAS_VERTS: usize = 4096;

fn count(name: &str, what: &str, value: i32, min: i32, max: usize) -> Result<usize, ModelError> {
    if value < min || value as usize >= max {
        return Err(ModelError::bad_alias(name, format!("has too many (or no) {} ({})", what, value)));
    }
    Ok(value as usize)
}

fn offset(name: &str, what: &str, value: i32, len: usize) -> Result<usize, ModelError> {
    if value < 0 || value as usize > len {
        return Err(ModelError::bad_alias(name, format!("bad {} offset {}", what, value)));
    }
    Ok(value as usize)
}

/// Skin names starting with a dot are relative to the model's directory.
fn skin_path(model: &str, skin: &str) -> String {
    match skin.strip_prefix('.') {
        Some(relative) => format!("{}{}", com_file_path(model), relative.trim_start_matches('/')),
        None => skin.to_string(),
    }
}

pub(crate) fn load_skin(model: &str, skin: &str, textures: &mut dyn TextureProvider) -> AliasSkin {
    let path = skin_path(model, skin);
    let image: TextureInfo = match textures.find_image(&path, ImageKind::Skin) {
        Some(image) => image,
        None => {
            log::warn!("model {}: couldn't load skin {}", model, path);
            textures.placeholder()
        }
    };
    AliasSkin { name: path, image }
}

/// Loads an MD2 model plus its optional sibling tag and animation files.
pub fn load_md2(
    name: &str,
    data: &[u8],
    tag: Option<&[u8]>,
    anm: Option<&str>,
    textures: &mut dyn TextureProvider,
) -> Result<Model, ModelError> {
    let hdr = DMdl::parse(data).map_err(ModelError::format(name))?;

    if data.len() != hdr.ofs_end as usize {
        return Err(ModelError::bad_alias(
            name,
            format!("broken offset values ({}, {})", data.len(), hdr.ofs_end),
        ));
    }
    if hdr.skinwidth <= 0 || hdr.skinheight <= 0 {
        return Err(ModelError::bad_alias(
            name,
            format!("invalid skin dimensions '{} x {}'", hdr.skinwidth, hdr.skinheight),
        ));
    }

    let num_frames = count(name, "frames", hdr.num_frames, 1, MD2_MAX_FRAMES)?;
    let num_xyz = count(name, "vertices", hdr.num_xyz, 1, MD2_MAX_VERTS)?;
    let num_tris = count(name, "triangles", hdr.num_tris, 1, MD2_MAX_TRIANGLES)?;
    let num_skins = count(name, "skins", hdr.num_skins, 0, MD2_MAX_SKINS)?;
    let num_st = hdr.num_st.max(0) as usize;

    let framesize = hdr.framesize.max(0) as usize;
    if framesize < MD2_FRAME_HEADER_SIZE + num_xyz * 4 {
        return Err(ModelError::bad_alias(name, format!("frame size {} too small", hdr.framesize)));
    }

    // skins
    let mut r = LeReader::at(data, offset(name, "skin", hdr.ofs_skins, data.len())?, "md2 skins");
    let mut skins = Vec::with_capacity(num_skins);
    for _ in 0..num_skins {
        let skin = r.name(MD2_MAX_SKINNAME).map_err(ModelError::format(name))?;
        skins.push(load_skin(name, &skin, textures));
    }

    // texture coordinates and triangles
    let mut r = LeReader::at(data, offset(name, "st", hdr.ofs_st, data.len())?, "md2 texcoords");
    let st = (0..num_st)
        .map(|_| DStVert::read(&mut r))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ModelError::format(name))?;

    let mut r = LeReader::at(data, offset(name, "tris", hdr.ofs_tris, data.len())?, "md2 triangles");
    let tris = (0..num_tris)
        .map(|_| DTriangle::read(&mut r))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ModelError::format(name))?;

    for (i, tri) in tris.iter().enumerate() {
        let xyz_ok = tri.index_xyz.iter().all(|&v| v >= 0 && (v as usize) < num_xyz);
        let st_ok = tri.index_st.iter().all(|&v| v >= 0 && (v as usize) < num_st);
        if !xyz_ok || !st_ok {
            return Err(ModelError::bad_alias(name, format!("triangle {} has bad indexes", i)));
        }
    }

    // unique (position, texcoord) pairs
    let mut unique: HashMap<(i16, i16, i16), u32> = HashMap::new();
    let mut sources: Vec<(usize, DStVert)> = Vec::new();
    let mut indexes = Vec::with_capacity(num_tris * 3);
    for tri in &tris {
        for j in 0..3 {
            let xyz = tri.index_xyz[j];
            let coord = st[tri.index_st[j] as usize];
            let index = *unique.entry((xyz, coord.s, coord.t)).or_insert_with(|| {
                sources.push((xyz as usize, coord));
                (sources.len() - 1) as u32
            });
            indexes.push(index);
        }
    }

    let num_verts = sources.len();
    if num_verts >= MAX_ALIAS_VERTS {
        return Err(ModelError::TooManyVertices { name: name.to_string(), count: num_verts });
    }
    if num_verts >= WARN_ALIAS_VERTS {
        log::warn!("model {} has more than {} verts", name, WARN_ALIAS_VERTS);
    }

    let (sw, sh) = (hdr.skinwidth as f32, hdr.skinheight as f32);
    let texcoords = sources
        .iter()
        .map(|(_, c)| [(c.s as f32 + 0.5) / sw, (c.t as f32 + 0.5) / sh])
        .collect();

    // frames
    let ofs_frames = offset(name, "frames", hdr.ofs_frames, data.len())?;
    let mut mins = [0.0; 3];
    let mut maxs = [0.0; 3];
    clear_bounds(&mut mins, &mut maxs);
    let mut frames = Vec::with_capacity(num_frames);
    let mut vertexes = Vec::with_capacity(num_frames * num_verts);

    for i in 0..num_frames {
        let mut r = LeReader::at(data, ofs_frames + i * framesize, "md2 frame");
        let frame = DAliasFrame::read(&mut r, num_xyz).map_err(ModelError::format(name))?;

        let fmins = frame.translate;
        let fmaxs = [
            frame.translate[0] + 255.0 * frame.scale[0],
            frame.translate[1] + 255.0 * frame.scale[1],
            frame.translate[2] + 255.0 * frame.scale[2],
        ];
        add_point_to_bounds(&fmins, &mut mins, &mut maxs);
        add_point_to_bounds(&fmaxs, &mut mins, &mut maxs);

        // translate is applied when the frame is interpolated
        let points: Vec<Vec3> = frame
            .verts
            .iter()
            .map(|v| {
                [
                    v.v[0] as f32 * frame.scale[0],
                    v.v[1] as f32 * frame.scale[1],
                    v.v[2] as f32 * frame.scale[2],
                ]
            })
            .collect();
        let normals = vertex_normals(&points, &tris);

        vertexes.extend(sources.iter().map(|&(xyz, _)| AliasVertex {
            point: points[xyz],
            normal: normals[xyz],
        }));

        frames.push(AliasFrame {
            name: frame.name,
            scale: frame.scale,
            translate: frame.translate,
            mins: fmins,
            maxs: fmaxs,
            radius: radius_from_bounds(&fmins, &fmaxs),
        });
    }

    let mesh = AliasMesh {
        name: name.to_string(),
        num_verts,
        num_tris,
        indexes,
        texcoords,
        frames,
        vertexes,
        skins,
        static_arrays: None,
    };

    let tags = match tag {
        Some(bytes) => Some(load_tags(name, bytes, num_frames)?),
        None => None,
    };
    let anims = match anm {
        Some(text) => parse_anims(name, text, num_frames)?,
        None => Vec::new(),
    };

    let mut alias = AliasModel {
        num_frames,
        meshes: vec![mesh],
        anims,
        tags,
    };
    build_static_arrays(&mut alias);

    log::info!(
        "model {}: {} frames, {} verts, {} tris, {} anims",
        name,
        num_frames,
        num_verts,
        num_tris,
        alias.anims.len()
    );

    Ok(Model {
        name: name.to_string(),
        mins,
        maxs,
        radius: radius_from_bounds(&mins, &maxs),
        kind: ModelKind::Alias(alias),
    })
}

/// Per-position normals, averaged over the faces sharing the position.
/// Triangles are wound clockwise when seen from the front.
fn vertex_normals(points: &[Vec3], tris: &[DTriangle]) -> Vec<Vec3> {
    let mut normals = vec![[0.0f32; 3]; points.len()];
    for tri in tris {
        let [a, b, c] = tri.index_xyz.map(|i| i as usize);
        let n = cross_product(&vector_subtract(&points[c], &points[a]), &vector_subtract(&points[b], &points[a]));
        for i in [a, b, c] {
            normals[i] = vector_add(&normals[i], &n);
        }
    }
    for n in &mut normals {
        vector_normalize(n);
    }
    normals
}

/// Loads a tag file: named attachment matrices, one per tag and frame.
pub fn load_tags(name: &str, data: &[u8], model_frames: usize) -> Result<AliasTagData, ModelError> {
    let hdr = DTagHeader::parse(data).map_err(ModelError::format(name))?;

    if hdr.num_tags <= 0 {
        return Err(ModelError::bad_tags(name, "tag file has no tags"));
    }
    if hdr.num_frames <= 0 {
        return Err(ModelError::bad_tags(name, "tag file has no frames"));
    }
    let num_tags = hdr.num_tags as usize;
    let num_frames = hdr.num_frames as usize;

    if data.len() != hdr.ofs_end as usize {
        return Err(ModelError::bad_tags(
            name,
            format!("tagfile is broken - expected: {}, offsets tell us to read: {}", data.len(), hdr.ofs_end),
        ));
    }
    if hdr.ofs_names as usize != TAG_HEADER_SIZE {
        return Err(ModelError::bad_tags(name, "invalid ofs_names"));
    }
    if hdr.ofs_tags as usize != TAG_HEADER_SIZE + num_tags * MD2_MAX_TAGNAME {
        return Err(ModelError::bad_tags(name, "invalid ofs_tags"));
    }
    if hdr.ofs_end as usize != hdr.ofs_tags as usize + num_tags * num_frames * TAG_DISK_MATRIX_SIZE {
        return Err(ModelError::bad_tags(name, "invalid ofs_end"));
    }
    if hdr.ofs_extractend as usize != hdr.ofs_tags as usize + num_tags * num_frames * TAG_MATRIX_SIZE {
        return Err(ModelError::bad_tags(name, "invalid ofs_extractend"));
    }

    if num_frames != model_frames {
        log::warn!(
            "found {} frames in tags for {} but model has {} frames",
            num_frames,
            name,
            model_frames
        );
    }

    let mut r = LeReader::at(data, TAG_HEADER_SIZE, "tag names");
    let names = (0..num_tags)
        .map(|_| r.name(MD2_MAX_TAGNAME))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ModelError::format(name))?;

    // 3x4 on disk, expanded to 4x4
    let mut r = LeReader::at(data, hdr.ofs_tags as usize, "tag matrices");
    let mut matrices = Vec::with_capacity(num_tags * num_frames);
    for _ in 0..num_tags * num_frames {
        let mut m: Mat4 = [0.0; 16];
        for col in 0..4 {
            let v = r.vec3().map_err(ModelError::format(name))?;
            m[col * 4..col * 4 + 3].copy_from_slice(&v);
        }
        m[15] = 1.0;
        matrices.push(m);
    }

    Ok(AliasTagData { names, num_frames, matrices })
}


#[cfg(test)]
mod tests {
    use super::test_md2::*;
    use super::*;
    use crate::r_image::ImageRegistry;
    use ufo_common::q_shared::MAT4_IDENTITY;

    fn textures() -> ImageRegistry {
        let mut reg = ImageRegistry::new(TextureInfo::new(0, 8, 8));
        reg.insert("models/test/skin", TextureInfo::new(5, 64, 32));
        reg
    }

    fn load(md2: &TestMd2) -> Result<Model, ModelError> {
        load_md2("models/test/quad.md2", &md2.to_bytes(), None, None, &mut textures())
    }

    // ---------------------------------------------------------
    // MD2
    // ---------------------------------------------------------

    #[test]
    fn test_load_quad_dedups_vertices() {
        let model = load(&quad_md2(2)).unwrap();
        let alias = model.alias().unwrap();
        let mesh = &alias.meshes[0];

        assert_eq!(alias.num_frames, 2);
        assert_eq!(mesh.num_tris, 2);
        assert_eq!(mesh.num_verts, 4);
        assert_eq!(mesh.indexes, vec![0, 1, 2, 0, 2, 3]);
        assert!(mesh.indexes.iter().all(|&i| (i as usize) < mesh.num_verts));
        assert_eq!(mesh.vertexes.len(), 8);
        assert_eq!(mesh.skins[0].image.handle.0, 5);
        assert!(mesh.static_arrays.is_none());
    }

    #[test]
    fn test_texcoords_use_skin_size() {
        let model = load(&quad_md2(1)).unwrap();
        let mesh = &model.alias().unwrap().meshes[0];
        assert_eq!(mesh.texcoords[0], [0.5 / 64.0, 0.5 / 32.0]);
        assert_eq!(mesh.texcoords[2], [63.5 / 64.0, 31.5 / 32.0]);
    }

    #[test]
    fn test_seams_split_shared_positions() {
        let mut md2 = quad_md2(1);
        // same position 0, different texture coordinate
        md2.st.push([5, 5]);
        md2.tris[1].1 = [4, 2, 3];
        let model = load(&md2).unwrap();
        assert_eq!(model.alias().unwrap().meshes[0].num_verts, 5);
    }

    #[test]
    fn test_frame_bounds_and_vertices() {
        let model = load(&quad_md2(2)).unwrap();
        let mesh = &model.alias().unwrap().meshes[0];
        assert_eq!(model.mins, [0.0; 3]);
        assert_eq!(model.maxs, [255.0; 3]);
        assert_eq!(mesh.frame_vertexes(1)[2].point, [10.0, 10.0, 10.0]);
        assert_eq!(mesh.frames[1].name, "frame1");
    }

    #[test]
    fn test_normals_face_front() {
        let model = load(&quad_md2(1)).unwrap();
        let mesh = &model.alias().unwrap().meshes[0];
        for v in mesh.frame_vertexes(0) {
            assert!((v.normal[2] + 1.0).abs() < 1e-6, "{:?}", v.normal);
        }
    }

    #[test]
    fn test_single_frame_caches_static_arrays() {
        let model = load(&quad_md2(1)).unwrap();
        let arrays = model.alias().unwrap().meshes[0].static_arrays.as_ref().unwrap();
        assert_eq!(arrays.vertices.len(), 6);
        assert_eq!(arrays.vertices[4], [10.0, 10.0, 0.0]);
    }

    #[test]
    fn test_missing_skin_uses_placeholder() {
        let mut md2 = quad_md2(1);
        md2.skins = vec!["./other".to_string()];
        let model = load(&md2).unwrap();
        let skin = &model.alias().unwrap().meshes[0].skins[0];
        assert_eq!(skin.name, "models/test/other");
        assert_eq!(skin.image.handle.0, 0);
    }

    #[test]
    fn test_broken_models_are_rejected() {
        let mut bytes = quad_md2(1).to_bytes();
        bytes.push(0);
        assert!(matches!(
            load_md2("m", &bytes, None, None, &mut textures()),
            Err(ModelError::BadAliasModel { .. })
        ));

        let mut md2 = quad_md2(1);
        md2.skinheight = 0;
        assert!(matches!(load(&md2), Err(ModelError::BadAliasModel { .. })));

        let mut md2 = quad_md2(1);
        md2.tris[0].0 = [0, 1, 9];
        assert!(matches!(load(&md2), Err(ModelError::BadAliasModel { .. })));

        let mut bytes = quad_md2(1).to_bytes();
        bytes[4] = 7;
        assert!(matches!(
            load_md2("m", &bytes, None, None, &mut textures()),
            Err(ModelError::Format { .. })
        ));
    }

    // ---------------------------------------------------------
    // Tags
    // ---------------------------------------------------------

    #[test]
    fn test_tags_expand_to_4x4() {
        let bytes = tag_bytes(&["tag_rweapon"], &[translation(1.0, 2.0, 3.0), MAT4_IDENTITY], 2);
        let tags = load_tags("t", &bytes, 2).unwrap();
        assert_eq!(tags.find("tag_rweapon"), Some(0));
        assert_eq!(tags.find("tag_lweapon"), None);
        assert_eq!(*tags.matrix(0, 0), translation(1.0, 2.0, 3.0));
        assert_eq!(*tags.matrix(0, 1), MAT4_IDENTITY);
    }

    #[test]
    fn test_tag_header_inconsistencies() {
        let good = tag_bytes(&["a"], &[MAT4_IDENTITY], 1);

        let mut truncated = good.clone();
        truncated.pop();
        assert!(matches!(load_tags("t", &truncated, 1), Err(ModelError::BadTags { .. })));

        let mut bad_names = good.clone();
        bad_names[16..20].copy_from_slice(&40i32.to_le_bytes());
        assert!(matches!(load_tags("t", &bad_names, 1), Err(ModelError::BadTags { .. })));

        let mut no_tags = good.clone();
        no_tags[8..12].copy_from_slice(&0i32.to_le_bytes());
        assert!(matches!(load_tags("t", &no_tags, 1), Err(ModelError::BadTags { .. })));

        let mut version = good;
        version[4..8].copy_from_slice(&2i32.to_le_bytes());
        assert!(matches!(load_tags("t", &version, 1), Err(ModelError::Format { .. })));
    }

    #[test]
    fn test_tag_frame_mismatch_only_warns() {
        let bytes = tag_bytes(&["a"], &[MAT4_IDENTITY], 1);
        assert!(load_tags("t", &bytes, 4).is_ok());
    }

    #[test]
    fn test_md2_with_tags_and_anims() {
        let tags = tag_bytes(&["tag_head"], &[MAT4_IDENTITY, MAT4_IDENTITY], 2);
        let model = load_md2(
            "models/test/quad.md2",
            &quad_md2(2).to_bytes(),
            Some(&tags),
            Some("stand 0 1 10\n"),
            &mut textures(),
        )
        .unwrap();
        let alias = model.alias().unwrap();
        assert!(alias.tags.is_some());
        assert_eq!(alias.find_anim("stand").map(|a| a.to), Some(1));
    }
}
