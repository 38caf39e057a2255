// r_model_brush.rs — map tile loading: lumps to planes, surfaces, node tree and lightmaps

use ufo_common::q_shared::{
    add_point_to_bounds, clear_bounds, dot_product, radius_from_bounds, vector_add, vector_scale, CPlane, Vec3,
    SURF_WARP,
};
use ufo_common::qfiles::{
    BspFile, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DTexInfo, DVertex, LUMP_EDGES, LUMP_FACES, LUMP_LEAFS,
    LUMP_LIGHTING_DAY, LUMP_LIGHTING_NIGHT, LUMP_MODELS, LUMP_NODES, LUMP_PLANES, LUMP_SURFEDGES, LUMP_TEXINFO,
    LUMP_VERTEXES, PLANENUM_LEAF,
};

use crate::error::ModelError;
use crate::r_image::{ImageKind, TextureProvider};
use crate::r_lightmap::{build_blocks, BlockRequest, LightmapBuilder, LightmapSettings, SampleLayout};
use crate::r_model_types::{
    BspModel, BspNode, BspSubmodel, BspSurface, BspTexInfo, BspVertex, MSurfFlags, NodeKind,
};
use crate::r_surface::SurfacePass;

/// Largest accepted light quantisation; the scale is `1 << quant`.
const MAX_LIGHTQUANT: u8 = 8;

fn shift_vec(v: &Vec3, shift: &Vec3) -> Vec3 {
    vector_add(v, shift)
}

fn short_vec(v: &[i16; 3]) -> Vec3 {
    [v[0] as f32, v[1] as f32, v[2] as f32]
}

/// Loads one map tile. `day` picks the lighting lump, `shift` is the tile's
/// world offset. Lightmaps are packed into `lightmaps`, which is shared by
/// all tiles of a map.
pub fn load_map_tile(
    name: &str,
    data: &[u8],
    day: bool,
    shift: Vec3,
    textures: &mut dyn TextureProvider,
    lightmaps: &mut LightmapBuilder,
    settings: &LightmapSettings,
) -> Result<BspModel, ModelError> {
    let bsp = BspFile::parse(data).map_err(ModelError::format(name))?;

    let mut tile = BspModel {
        name: name.to_string(),
        shift,
        ..Default::default()
    };

    let vertexes: Vec<Vec3> = bsp
        .records::<DVertex>(LUMP_VERTEXES, "vertexes")
        .map_err(ModelError::format(name))?
        .iter()
        .map(|v| shift_vec(&v.point, &shift))
        .collect();
    let edges: Vec<DEdge> = bsp.records(LUMP_EDGES, "edges").map_err(ModelError::format(name))?;
    let surfedges: Vec<i32> = bsp.records(LUMP_SURFEDGES, "surfedges").map_err(ModelError::format(name))?;

    load_lighting(&mut tile, bsp.lump(if day { LUMP_LIGHTING_DAY } else { LUMP_LIGHTING_NIGHT }))?;
    load_planes(&mut tile, &bsp.records::<DPlane>(LUMP_PLANES, "planes").map_err(ModelError::format(name))?);
    load_texinfo(
        &mut tile,
        &bsp.records::<DTexInfo>(LUMP_TEXINFO, "texinfo").map_err(ModelError::format(name))?,
        textures,
    );

    let faces: Vec<DFace> = bsp.records(LUMP_FACES, "faces").map_err(ModelError::format(name))?;
    load_surfaces(&mut tile, &faces, &vertexes, &edges, &surfedges, day)?;
    create_lightmaps(&mut tile, lightmaps, settings)?;

    let nodes: Vec<DNode> = bsp.records(LUMP_NODES, "nodes").map_err(ModelError::format(name))?;
    let leafs: Vec<DLeaf> = bsp.records(LUMP_LEAFS, "leafs").map_err(ModelError::format(name))?;
    load_nodes(&mut tile, &nodes, &leafs)?;

    let models: Vec<DModel> = bsp.records(LUMP_MODELS, "models").map_err(ModelError::format(name))?;
    load_submodels(&mut tile, &models)?;

    clear_bounds(&mut tile.mins, &mut tile.maxs);
    for v in &tile.vertices {
        add_point_to_bounds(&v.position, &mut tile.mins, &mut tile.maxs);
    }

    log::info!(
        "map tile {}: {} surfaces, {} nodes, {} submodels",
        name,
        tile.surfaces.len(),
        tile.nodes.len(),
        tile.submodels.len()
    );
    Ok(tile)
}

fn load_lighting(tile: &mut BspModel, lump: &[u8]) -> Result<(), ModelError> {
    let Some(&quant) = lump.first() else {
        log::warn!("map tile {} has no lighting", tile.name);
        tile.lightdata = None;
        tile.lightmap_scale = 1 << 4;
        return Ok(());
    };
    if quant > MAX_LIGHTQUANT {
        return Err(ModelError::bad_map(&tile.name, format!("bad light quantisation {}", quant)));
    }
    tile.lightquant = quant;
    tile.lightmap_scale = 1 << quant;
    tile.lightdata = Some(lump.to_vec());
    Ok(())
}

fn load_planes(tile: &mut BspModel, planes: &[DPlane]) {
    tile.planes = planes
        .iter()
        .map(|p| CPlane::new(p.normal, p.dist + dot_product(&p.normal, &tile.shift)))
        .collect();
}

fn load_texinfo(tile: &mut BspModel, texinfo: &[DTexInfo], textures: &mut dyn TextureProvider) {
    tile.texinfo = texinfo
        .iter()
        .map(|ti| {
            let path = format!("textures/{}", ti.texture);
            let image = match textures.find_image(&path, ImageKind::World) {
                Some(image) => image,
                None => {
                    log::warn!("{}: couldn't load {}", tile.name, path);
                    textures.placeholder()
                }
            };
            BspTexInfo {
                vecs: ti.vecs,
                flags: ti.surface_flags,
                value: ti.value,
                image,
            }
        })
        .collect();
}

/// Texture-space bounds of a polygon snapped to the lightmap grid.
fn calc_surface_extents(points: &[Vec3], tex: &BspTexInfo, scale: i32) -> ([i32; 2], [i32; 2]) {
    let mut mins = [f32::MAX; 2];
    let mut maxs = [f32::MIN; 2];
    for p in points {
        for j in 0..2 {
            let val = tex.project(j, p);
            mins[j] = mins[j].min(val);
            maxs[j] = maxs[j].max(val);
        }
    }

    let scale_f = scale as f32;
    let mut stmins = [0; 2];
    let mut stmaxs = [0; 2];
    for j in 0..2 {
        let bmin = (mins[j] / scale_f).floor() as i32;
        let bmax = (maxs[j] / scale_f).ceil() as i32;
        stmins[j] = bmin * scale;
        stmaxs[j] = (bmax - bmin) * scale;
    }
    (stmins, stmaxs)
}

fn load_surfaces(
    tile: &mut BspModel,
    faces: &[DFace],
    vertexes: &[Vec3],
    edges: &[DEdge],
    surfedges: &[i32],
    day: bool,
) -> Result<(), ModelError> {
    let name = tile.name.clone();
    let scale = tile.lightmap_scale;
    let light_len = tile.lightdata.as_ref().map_or(0, Vec::len);

    tile.surfaces = Vec::with_capacity(faces.len());
    tile.vertices = Vec::new();

    for (i, face) in faces.iter().enumerate() {
        let plane = face.planenum as usize;
        if plane >= tile.planes.len() {
            return Err(ModelError::bad_map(&name, format!("face {} has bad plane {}", i, plane)));
        }
        let texinfo = face.texinfo as usize;
        let Some(tex) = tile.texinfo.get(texinfo).cloned() else {
            return Err(ModelError::bad_map(&name, format!("face {} has bad texinfo {}", i, face.texinfo)));
        };

        let numedges = face.numedges.max(0) as usize;
        let firstedge = face.firstedge.max(0) as usize;
        if numedges < 3 || firstedge + numedges > surfedges.len() {
            return Err(ModelError::bad_map(&name, format!("face {} has bad edges", i)));
        }

        let mut points = Vec::with_capacity(numedges);
        for &e in &surfedges[firstedge..firstedge + numedges] {
            let (edge, end) = if e >= 0 { (e as usize, 0) } else { (e.unsigned_abs() as usize, 1) };
            let v = edges
                .get(edge)
                .and_then(|edge| vertexes.get(edge.v[end] as usize))
                .ok_or_else(|| ModelError::bad_map(&name, format!("face {} has bad edge {}", i, e)))?;
            points.push(*v);
        }

        let mut flags = MSurfFlags::empty();
        if face.side != 0 {
            flags |= MSurfFlags::PLANEBACK;
        }
        if tex.flags & SURF_WARP == 0 {
            flags |= MSurfFlags::LIGHTMAP;
        }

        let (stmins, stmaxs) = calc_surface_extents(&points, &tex, scale);
        let mut mins = [0.0; 3];
        let mut maxs = [0.0; 3];
        clear_bounds(&mut mins, &mut maxs);
        for p in &points {
            add_point_to_bounds(p, &mut mins, &mut maxs);
        }

        let mut surf = BspSurface {
            plane,
            flags,
            texinfo,
            pass: SurfacePass::classify(tex.flags, tex.image.has_material),
            mins,
            maxs,
            center: vector_scale(&vector_add(&mins, &maxs), 0.5),
            stmins,
            stmaxs,
            stcenter: [
                stmaxs[0] as f32 / 2.0 + stmins[0] as f32,
                stmaxs[1] as f32 / 2.0 + stmins[1] as f32,
            ],
            lightmap_scale: scale,
            color: [1.0, 1.0, 1.0],
            first_vertex: tile.vertices.len(),
            num_vertices: points.len(),
            ..Default::default()
        };

        surf.styles = face.styles;

        let ofs = face.lightofs[day as usize];
        if ofs >= 0 && tile.lightdata.is_some() && flags.contains(MSurfFlags::LIGHTMAP) {
            let (w, h) = surf.lightmap_size();
            let maps = surf.styles.iter().take_while(|&&s| s != 255).count().max(1);
            let end = ofs as usize + maps * SampleLayout::Styles.map_bytes(w * h);
            if end > light_len {
                return Err(ModelError::bad_map(&name, format!("face {} lightmap runs past the lighting lump", i)));
            }
            surf.lightofs = Some(ofs as usize);
        }

        let normal = tile.planes[plane].normal;
        let normal = if flags.contains(MSurfFlags::PLANEBACK) {
            [-normal[0], -normal[1], -normal[2]]
        } else {
            normal
        };
        let (tw, th) = (tex.image.width.max(1) as f32, tex.image.height.max(1) as f32);
        tile.vertices.extend(points.iter().map(|p| BspVertex {
            position: *p,
            normal,
            texcoord: [tex.project(0, p) / tw, tex.project(1, p) / th],
            lm_texcoord: [0.0, 0.0],
        }));

        tile.surfaces.push(surf);
    }
    Ok(())
}

/// Builds and packs the lightmap blocks of every lightmapped surface, then
/// fills in the atlas texture coordinates of their vertices.
fn create_lightmaps(tile: &mut BspModel, lightmaps: &mut LightmapBuilder, settings: &LightmapSettings) -> Result<(), ModelError> {
    let lit: Vec<usize> = (0..tile.surfaces.len())
        .filter(|&i| tile.surfaces[i].flags.contains(MSurfFlags::LIGHTMAP))
        .collect();

    let blocks = {
        let lightdata = tile.lightdata.as_deref();
        let requests: Vec<BlockRequest<'_>> = lit
            .iter()
            .map(|&i| {
                let surf = &tile.surfaces[i];
                let (width, height) = surf.lightmap_size();
                BlockRequest {
                    width,
                    height,
                    styles: surf.styles,
                    layout: SampleLayout::Styles,
                    data: surf.lightofs.zip(lightdata).map(|(ofs, data)| &data[ofs..]),
                }
            })
            .collect();
        build_blocks(&requests, settings)
    };

    let size = lightmaps.size() as f32;
    for (&i, block) in lit.iter().zip(blocks) {
        let surf = &mut tile.surfaces[i];
        let scale = surf.lightmap_scale;
        let rect = lightmaps
            .add_block(&block, scale)
            .map_err(|source| ModelError::Lightmap { name: tile.name.clone(), source })?;

        surf.lightmap = Some(rect);
        surf.samples = block.samples;
        surf.color = block.color;

        let tex = &tile.texinfo[surf.texinfo];
        let scale = scale as f32;
        let verts = &mut tile.vertices[surf.first_vertex..surf.first_vertex + surf.num_vertices];
        for v in verts {
            let s = tex.project(0, &v.position) - surf.stmins[0] as f32 + rect.x as f32 * scale + scale / 2.0;
            let t = tex.project(1, &v.position) - surf.stmins[1] as f32 + rect.y as f32 * scale + scale / 2.0;
            v.lm_texcoord = [s / (size * scale), t / (size * scale)];
        }
    }
    Ok(())
}

fn load_nodes(tile: &mut BspModel, nodes: &[DNode], leafs: &[DLeaf]) -> Result<(), ModelError> {
    let name = tile.name.clone();
    let shift = tile.shift;
    let first_leaf = nodes.len();
    let total = nodes.len() + leafs.len();

    // children always come after their parent, which keeps the tree acyclic
    let child_index = |parent: usize, c: i32| -> Result<usize, ModelError> {
        let index = if c >= 0 { c as usize } else { first_leaf + (-(c + 1)) as usize };
        if index >= total {
            return Err(ModelError::bad_map(&name, format!("bad node child {}", c)));
        }
        if index <= parent {
            return Err(ModelError::bad_map(&name, format!("node {} points back to node {}", parent, index)));
        }
        Ok(index)
    };

    let mut out = Vec::with_capacity(total);
    for (i, node) in nodes.iter().enumerate() {
        let plane = if node.planenum == PLANENUM_LEAF {
            None
        } else if node.planenum >= 0 && (node.planenum as usize) < tile.planes.len() {
            Some(node.planenum as usize)
        } else {
            return Err(ModelError::bad_map(&name, format!("node {} has bad plane {}", i, node.planenum)));
        };

        let first_surface = node.firstface as usize;
        let num_surfaces = node.numfaces as usize;
        if first_surface + num_surfaces > tile.surfaces.len() {
            return Err(ModelError::bad_map(&name, format!("node {} has bad surfaces", i)));
        }

        out.push(BspNode {
            mins: shift_vec(&short_vec(&node.mins), &shift),
            maxs: shift_vec(&short_vec(&node.maxs), &shift),
            parent: None,
            kind: NodeKind::Node {
                plane,
                children: [child_index(i, node.children[0])?, child_index(i, node.children[1])?],
                first_surface,
                num_surfaces,
            },
        });
    }

    out.extend(leafs.iter().map(|leaf| BspNode {
        mins: shift_vec(&short_vec(&leaf.mins), &shift),
        maxs: shift_vec(&short_vec(&leaf.maxs), &shift),
        parent: None,
        kind: NodeKind::Leaf { contents: leaf.contents },
    }));

    for i in 0..first_leaf {
        if let NodeKind::Node { children, .. } = out[i].kind {
            for child in children {
                out[child].parent = Some(i);
            }
        }
    }

    tile.nodes = out;
    tile.first_leaf = first_leaf;
    Ok(())
}

fn load_submodels(tile: &mut BspModel, models: &[DModel]) -> Result<(), ModelError> {
    let shift = tile.shift;
    tile.submodels = Vec::with_capacity(models.len());

    for (i, m) in models.iter().enumerate() {
        // spread the bounds by one unit
        let mins = [m.mins[0] - 1.0 + shift[0], m.mins[1] - 1.0 + shift[1], m.mins[2] - 1.0 + shift[2]];
        let maxs = [m.maxs[0] + 1.0 + shift[0], m.maxs[1] + 1.0 + shift[1], m.maxs[2] + 1.0 + shift[2]];

        let headnode = m.headnode.max(0) as usize;
        let first_face = m.firstface.max(0) as usize;
        let num_faces = m.numfaces.max(0) as usize;
        if m.numfaces > 0 && headnode >= tile.nodes.len() {
            return Err(ModelError::bad_map(&tile.name, format!("submodel {} has bad headnode {}", i, m.headnode)));
        }
        if first_face + num_faces > tile.surfaces.len() {
            return Err(ModelError::bad_map(&tile.name, format!("submodel {} has bad faces", i)));
        }

        tile.submodels.push(BspSubmodel {
            mins,
            maxs,
            origin: shift_vec(&m.origin, &shift),
            radius: radius_from_bounds(&mins, &maxs),
            headnode,
            first_face,
            num_faces,
        });
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_map::*;
    use super::*;
    use crate::error::LightmapError;
    use crate::r_bsp::{get_level_surface_lists, setup_frustum};
    use crate::r_image::{ImageRegistry, TextureInfo};
    use crate::r_lightmap::light_point;
    use crate::r_local::{RefDef, RenderContext, RenderSettings};
    use crate::r_surface::SurfaceRef;

    fn textures() -> ImageRegistry {
        let mut reg = ImageRegistry::new(TextureInfo::new(0, 8, 8));
        reg.insert("textures/tex_wall", TextureInfo::new(1, 64, 64));
        reg
    }

    fn settings() -> LightmapSettings {
        LightmapSettings::from(&RenderSettings {
            max_lightmap: 128,
            ..Default::default()
        })
    }

    fn load(map: &TestMap, shift: Vec3) -> Result<BspModel, ModelError> {
        let mut lightmaps = LightmapBuilder::begin(128);
        load_map_tile("maps/test", &map.to_bytes(), true, shift, &mut textures(), &mut lightmaps, &settings())
    }

    // ---------------------------------------------------------
    // Loading
    // ---------------------------------------------------------

    #[test]
    fn test_load_split_map() {
        let tile = load(&split_map(), [0.0; 3]).unwrap();

        assert_eq!(tile.surfaces.len(), 2);
        assert_eq!(tile.nodes.len(), 3);
        assert_eq!(tile.first_leaf, 1);
        assert_eq!(tile.nodes[1].parent, Some(0));
        assert!(!tile.nodes[0].is_leaf() && tile.nodes[1].is_leaf());
        assert_eq!(tile.lightmap_scale, 16);
        assert_eq!(tile.vertices.len(), 8);

        let front = &tile.surfaces[0];
        assert!(front.flags.contains(MSurfFlags::LIGHTMAP));
        assert!(!front.flags.contains(MSurfFlags::PLANEBACK));
        assert!(tile.surfaces[1].flags.contains(MSurfFlags::PLANEBACK));
        assert_eq!(front.stmins, [-32, -32]);
        assert_eq!(front.stmaxs, [64, 64]);
        assert_eq!(front.lightmap_size(), (5, 5));
        assert_eq!(front.samples.len(), 75);
        assert_eq!(&front.samples[..3], &[100, 50, 25]);
        assert_eq!(tile.texinfo[0].image.handle.0, 1);

        let rect = tile.surfaces[1].lightmap.unwrap();
        assert_eq!((rect.x, rect.y, rect.width), (5, 0, 5));
        // the back face is drawn with a flipped normal
        assert_eq!(tile.vertices[4].normal, [-1.0, 0.0, 0.0]);
        // spread by one unit
        assert_eq!(tile.submodels[0].mins, [-33.0; 3]);
    }

    #[test]
    fn test_lightmap_texcoords_address_texel_centres() {
        let tile = load(&split_map(), [0.0; 3]).unwrap();
        let v = &tile.vertices[0]; // (0,-32,-32), the block's first corner
        let expected = 8.0 / (128.0 * 16.0);
        assert!((v.lm_texcoord[0] - expected).abs() < 1e-6);
        assert!((v.lm_texcoord[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_missing_texture_uses_placeholder() {
        let mut map = split_map();
        map.texinfo[0].2 = "tex_missing".to_string();
        let tile = load(&map, [0.0; 3]).unwrap();
        assert_eq!(tile.texinfo[0].image.handle.0, 0);
    }

    #[test]
    fn test_shift_moves_geometry_and_planes() {
        let tile = load(&split_map(), [128.0, 0.0, 0.0]).unwrap();
        assert_eq!(tile.planes[0].dist, 128.0);
        assert_eq!(tile.vertices[0].position, [128.0, -32.0, -32.0]);
        assert_eq!(tile.nodes[0].mins, [64.0, -64.0, -64.0]);
        assert_eq!(tile.mins[0], 128.0);
    }

    #[test]
    fn test_bad_maps_are_rejected() {
        let mut map = split_map();
        map.nodes[0].children = [-1, -9];
        assert!(matches!(load(&map, [0.0; 3]), Err(ModelError::BadMap { .. })));

        let mut map = split_map();
        map.faces[1].texinfo = 3;
        assert!(matches!(load(&map, [0.0; 3]), Err(ModelError::BadMap { .. })));

        let mut map = split_map();
        map.lighting.truncate(40);
        assert!(matches!(load(&map, [0.0; 3]), Err(ModelError::BadMap { .. })));

        let mut bytes = split_map().to_bytes();
        bytes[4] = 38;
        assert!(matches!(
            load_map_tile("maps/bad", &bytes, true, [0.0; 3], &mut textures(), &mut LightmapBuilder::begin(128), &settings()),
            Err(ModelError::Format { .. })
        ));
    }

    #[test]
    fn test_node_cycles_are_rejected() {
        let mut map = split_map();
        map.nodes[0].children = [0, -2];
        assert!(matches!(load(&map, [0.0; 3]), Err(ModelError::BadMap { .. })));

        // a second node pointing back at the root
        let mut map = split_map();
        map.nodes.push(TestNode {
            plane: 0,
            children: [0, -1],
            mins: [-64, -64, -64],
            maxs: [64, 64, 64],
            firstface: 0,
            numfaces: 0,
        });
        map.nodes[0].children = [1, -2];
        assert!(matches!(load(&map, [0.0; 3]), Err(ModelError::BadMap { .. })));
    }

    #[test]
    fn test_lightmap_too_large_for_atlas() {
        let mut map = floor_map(Some(&uniform_light([1, 1, 1])));
        // a 2048 unit face needs a 129 texel block at scale 16
        map.vertexes = vec![[-1024.0, -1024.0, 0.0], [1024.0, -1024.0, 0.0], [1024.0, 1024.0, 0.0], [-1024.0, 1024.0, 0.0]];
        map.faces[0].lightofs = -1;
        let err = load(&map, [0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Lightmap { source: LightmapError::BlockTooLarge { width: 129, height: 129, .. }, .. }
        ));
    }

    #[test]
    fn test_warp_surfaces_have_no_lightmap() {
        let mut map = split_map();
        map.texinfo[0].1 = SURF_WARP;
        let tile = load(&map, [0.0; 3]).unwrap();
        assert!(tile.surfaces.iter().all(|s| s.lightmap.is_none() && s.samples.is_empty()));
        assert_eq!(tile.surfaces[0].pass, SurfacePass::OpaqueWarp);
    }

    // ---------------------------------------------------------
    // End to end
    // ---------------------------------------------------------

    #[test]
    fn test_two_surface_map_front_face_only() {
        let mut tiles = vec![load(&split_map(), [0.0; 3]).unwrap()];
        let mut ctx = RenderContext::new();
        let refdef = RefDef {
            vieworg: [128.0, 0.0, 0.0],
            viewangles: [0.0, 180.0, 0.0],
            ..Default::default()
        };
        let settings = RenderSettings::default();
        setup_frustum(&mut ctx, &refdef, &settings);

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &settings);

        assert_eq!(tiles[0].surfaces[0].frame, ctx.frame);
        assert_eq!(tiles[0].surfaces[1].frame, 0);
        assert_eq!(ctx.buckets.get(SurfacePass::Opaque), &[SurfaceRef { tile: 0, surface: 0 }]);
        assert_eq!(ctx.buckets.total(), 1);
    }

    // ---------------------------------------------------------
    // Light sampling
    // ---------------------------------------------------------

    #[test]
    fn test_light_point_hits_floor() {
        let light = uniform_light([51, 102, 204]);
        let tiles = vec![load(&floor_map(Some(&light)), [0.0; 3]).unwrap()];
        let color = light_point(&tiles, &[], &[0.0, 0.0, 64.0]);
        assert!((color[0] - 0.2).abs() < 1e-6);
        assert!((color[1] - 0.4).abs() < 1e-6);
        assert!((color[2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_light_point_fallbacks() {
        let light = uniform_light([51, 102, 204]);
        let lit = vec![load(&floor_map(Some(&light)), [0.0; 3]).unwrap()];
        // trace starts below the floor and never reaches a surface
        assert_eq!(light_point(&lit, &[], &[0.0, 0.0, -16.0]), [0.5, 0.5, 0.5]);
        // too far above the floor
        assert_eq!(light_point(&lit, &[], &[0.0, 0.0, 300.0]), [0.5, 0.5, 0.5]);

        let dark = vec![load(&floor_map(None), [0.0; 3]).unwrap()];
        assert!(dark[0].lightdata.is_none());
        assert_eq!(light_point(&dark, &[], &[0.0, 0.0, 64.0]), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_light_point_through_brush_entity() {
        let light = uniform_light([255, 0, 0]);
        let tiles = vec![load(&floor_map(Some(&light)), [0.0; 3]).unwrap()];
        let target = crate::r_lightmap::BrushTraceTarget { tile: 0, submodel: 0, origin: [0.0, 0.0, 100.0] };
        // the entity copy of the floor sits at z = 100 and is hit first
        let color = light_point(&tiles, &[target], &[0.0, 0.0, 150.0]);
        assert_eq!(color, [1.0, 0.0, 0.0]);
    }
}
