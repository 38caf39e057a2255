// r_mesh.rs — alias model culling, lighting and drawing

use ufo_common::q_shared::{dot_product, matrix_multiply, matrix_origin, vector_add, vector_scale, Mat4, Vec3, Vec4};

use crate::r_draw::{DrawBackend, GlState};
use crate::r_entity::{bbox_corners, draw_bbox, Entity, EntityList, RenderFlags};
use crate::r_lightmap::{light_point, BrushTraceTarget};
use crate::r_local::RenderContext;
use crate::r_model_alias::fill_array_data;
use crate::r_model_types::{AliasArrays, BspModel, Model};

/// Per-axis scale with zero components treated as 1.
fn effective_scale(scale: &Vec3) -> Vec3 {
    let mut s = *scale;
    for v in &mut s {
        if *v == 0.0 {
            *v = 1.0;
        }
    }
    s
}

/// Culls when all eight corners of the scaled model bounds are behind
/// one common frustum plane. Tag-attached entities use the parent origin.
pub fn cull_mesh_model(ctx: &RenderContext, entities: &EntityList, e: &Entity, model: &Model) -> bool {
    let origin = e
        .tag_parent
        .and_then(|p| entities.get(p))
        .map_or(e.origin, |p| p.origin);

    let scale = effective_scale(&e.scale);
    let mins = [model.mins[0] * scale[0], model.mins[1] * scale[1], model.mins[2] * scale[2]];
    let maxs = [model.maxs[0] * scale[0], model.maxs[1] * scale[1], model.maxs[2] * scale[2]];

    let mut aggregate = !0u32;
    for corner in bbox_corners(&mins, &maxs) {
        let corner = vector_add(&origin, &corner);
        let mut mask = 0u32;
        for (j, plane) in ctx.frustum.planes.iter().enumerate() {
            if dot_product(&plane.normal, &corner) - plane.dist < 0.0 {
                mask |= 1 << j;
            }
        }
        aggregate &= mask;
    }

    aggregate != 0
}

/// Static light at the entity's position, pulsed for glowing entities.
pub fn mesh_light_color(
    tiles: &[BspModel],
    targets: &[BrushTraceTarget],
    e: &Entity,
    index: usize,
    transform: &Mat4,
    time: f32,
) -> Vec4 {
    let point = if e.tag_parent.is_some() {
        matrix_origin(transform)
    } else {
        e.origin
    };

    let mut color = light_point(tiles, targets, &point);
    if e.flags.contains(RenderFlags::GLOW) {
        let f = 1.0 + ((time + index as f32) * 6.0).sin();
        color = vector_scale(&color, 1.0 + f * 0.33);
    }
    [color[0], color[1], color[2], e.alpha]
}

#[rustfmt::skip]
fn scale_matrix(s: &Vec3) -> Mat4 {
    [
        s[0], 0.0, 0.0, 0.0,
        0.0, s[1], 0.0, 0.0,
        0.0, 0.0, s[2], 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Draws every mesh of an alias model between two keyframes. Single-frame
/// meshes use their cached streams; the rest are blended into `scratch`.
pub fn draw_alias_model<B: DrawBackend>(
    gl: &mut GlState<B>,
    ctx: &mut RenderContext,
    e: &Entity,
    model: &Model,
    transform: &Mat4,
    (frame, oldframe, backlerp): (usize, usize, f32),
    color: Option<Vec4>,
    show_box: bool,
    scratch: &mut AliasArrays,
) {
    let Some(alias) = model.alias() else {
        return;
    };

    let matrix = matrix_multiply(transform, &scale_matrix(&effective_scale(&e.scale)));
    gl.backend.push_matrix(&matrix);

    if color.is_some() {
        gl.color(color);
    }

    let skin = alias
        .meshes
        .first()
        .and_then(|m| m.skins.get(e.skinnum).or_else(|| m.skins.first()));
    if let Some(skin) = skin {
        gl.bind_texture(skin.image.handle);
    }

    for mesh in &alias.meshes {
        ctx.stats.alias_count += mesh.num_tris;
        match &mesh.static_arrays {
            Some(arrays) => gl.backend.draw_mesh(arrays),
            None => {
                fill_array_data(mesh, frame, oldframe, backlerp, scratch);
                gl.backend.draw_mesh(scratch);
            }
        }
    }

    if show_box {
        let bounds = alias.meshes.first().and_then(|m| m.frames.get(frame).or_else(|| m.frames.first()));
        if let Some(f) = bounds {
            draw_bbox(gl, &bbox_corners(&f.mins, &f.maxs));
        }
    }

    gl.backend.pop_matrix();
    gl.color(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_bsp::setup_frustum;
    use crate::r_draw::{CommandRecorder, DrawCommand, PrimitiveMode};
    use crate::r_image::{ImageRegistry, TextureHandle, TextureInfo};
    use crate::r_local::{RefDef, RenderSettings};
    use crate::r_model_md2::load_md2;
    use crate::r_model_md2::test_md2::quad_md2;
    use ufo_common::q_shared::MAT4_IDENTITY;

    fn quad(num_frames: usize) -> Model {
        let mut textures = ImageRegistry::new(TextureInfo::new(0, 8, 8));
        textures.insert("models/test/skin", TextureInfo::new(5, 64, 32));
        load_md2("models/test/quad.md2", &quad_md2(num_frames).to_bytes(), None, None, &mut textures).unwrap()
    }

    fn looking_down_x() -> RenderContext {
        let mut ctx = RenderContext::new();
        let refdef = RefDef { fov_x: 90.0, fov_y: 90.0, ..Default::default() };
        setup_frustum(&mut ctx, &refdef, &RenderSettings::default());
        ctx
    }

    #[test]
    fn test_cull_mesh_model() {
        let ctx = looking_down_x();
        let model = quad(1);
        let list = EntityList::new();

        let ahead = Entity { origin: [100.0, 0.0, 0.0], ..Default::default() };
        let behind = Entity { origin: [-100.0, 0.0, 0.0], ..Default::default() };
        assert!(!cull_mesh_model(&ctx, &list, &ahead, &model));
        assert!(cull_mesh_model(&ctx, &list, &behind, &model));
    }

    #[test]
    fn test_cull_uses_tag_parent_origin() {
        let ctx = looking_down_x();
        let model = quad(1);
        let mut list = EntityList::new();
        let parent = list.add(Entity { origin: [100.0, 0.0, 0.0], ..Default::default() }).unwrap();

        let child = Entity {
            origin: [-500.0, 0.0, 0.0],
            tag_parent: Some(parent),
            ..Default::default()
        };
        assert!(!cull_mesh_model(&ctx, &list, &child, &model));
    }

    #[test]
    fn test_cull_scales_bounds() {
        let ctx = looking_down_x();
        let model = quad(1);
        let list = EntityList::new();
        // just behind the view, only reaches in front when scaled up
        let e = Entity { origin: [-15.0, 0.0, 0.0], scale: [2.0, 1.0, 1.0], ..Default::default() };
        assert!(!cull_mesh_model(&ctx, &list, &e, &model));
        let e = Entity { origin: [-15.0, 0.0, 0.0], ..Default::default() };
        assert!(cull_mesh_model(&ctx, &list, &e, &model));
    }

    #[test]
    fn test_light_color_glow_and_alpha() {
        let e = Entity { alpha: 0.5, ..Default::default() };
        assert_eq!(mesh_light_color(&[], &[], &e, 0, &MAT4_IDENTITY, 0.0), [1.0, 1.0, 1.0, 0.5]);

        let e = Entity { flags: RenderFlags::GLOW, ..Default::default() };
        let c = mesh_light_color(&[], &[], &e, 0, &MAT4_IDENTITY, 0.0);
        assert!((c[0] - 1.33).abs() < 1e-5);
    }

    #[test]
    fn test_draw_static_model() {
        let model = quad(1);
        let mut gl = GlState::new(CommandRecorder::new());
        gl.backend.clear();
        let mut ctx = RenderContext::new();
        let e = Entity::default();

        draw_alias_model(&mut gl, &mut ctx, &e, &model, &MAT4_IDENTITY, (0, 0, 0.0), Some([0.5, 0.5, 0.5, 1.0]), false, &mut AliasArrays::default());

        let cmds = &gl.backend.commands;
        assert_eq!(cmds[0], DrawCommand::PushMatrix(MAT4_IDENTITY));
        assert!(cmds.contains(&DrawCommand::BindTexture(crate::r_draw::TextureUnit::Diffuse, TextureHandle(5))));
        let static_arrays = model.alias().unwrap().meshes[0].static_arrays.clone().unwrap();
        assert!(cmds.contains(&DrawCommand::Mesh {
            vertices: static_arrays.vertices,
            normals: static_arrays.normals,
            texcoords: static_arrays.texcoords,
        }));
        assert_eq!(cmds[cmds.len() - 2], DrawCommand::PopMatrix);
        assert_eq!(cmds[cmds.len() - 1], DrawCommand::Color(None));
        assert_eq!(ctx.stats.alias_count, 2);
    }

    #[test]
    fn test_draw_interpolated_model_with_box() {
        let model = quad(2);
        let mut gl = GlState::new(CommandRecorder::new());
        gl.backend.clear();
        let mut ctx = RenderContext::new();
        let e = Entity { scale: [2.0, 0.0, 1.0], ..Default::default() };
        let mut scratch = AliasArrays::default();

        draw_alias_model(&mut gl, &mut ctx, &e, &model, &MAT4_IDENTITY, (1, 0, 0.5), None, true, &mut scratch);

        let cmds = &gl.backend.commands;
        let DrawCommand::PushMatrix(m) = cmds[0] else {
            panic!("expected a matrix push, got {:?}", cmds[0]);
        };
        assert_eq!((m[0], m[5], m[10]), (2.0, 1.0, 1.0));

        // halfway between z = 0 and z = 10
        assert_eq!(scratch.vertices.len(), 6);
        assert!(scratch.vertices.iter().all(|v| (v[2] - 5.0).abs() < 1e-5));

        let strips = cmds
            .iter()
            .filter(|c| matches!(c, DrawCommand::Primitive(PrimitiveMode::TriangleStrip, _)))
            .count();
        assert_eq!(strips, 2);
        assert!(!cmds.iter().any(|c| matches!(c, DrawCommand::Color(Some(_)))));
    }
}
