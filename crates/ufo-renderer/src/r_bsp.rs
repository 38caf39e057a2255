// r_bsp.rs — frustum setup, box culling, world node walk and brush model surfaces

use ufo_common::q_shared::{
    angle_vectors, box_on_plane_side, dot_product, rotate_point_around_vector, vector_add, vector_is_zero,
    vector_rotate, vector_subtract, CPlane, Mat4, Vec3, CONTENTS_SOLID, LEVEL_LASTVISIBLE, LEVEL_MAX, MAX_WORLD_WIDTH,
    PATHFINDING_HEIGHT, PLANE_ANYZ,
};

use crate::r_draw::{DrawBackend, GlState};
use crate::r_local::{RefDef, RenderContext, RenderSettings};
use crate::r_model_types::{BspModel, MSurfFlags, NodeKind};
use crate::r_surface::{draw_surfaces, SurfaceBuckets, SurfacePass, SurfaceRef};

pub const BACKFACE_EPSILON: f32 = 0.01;

// ============================================================
// Frustum
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    pub planes: [CPlane; 4],
}

impl Frustum {
    /// True when the box lies completely behind any one plane.
    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        self.planes.iter().any(|p| box_on_plane_side(mins, maxs, p) == 2)
    }
}

/// Computes the view axes and the four frustum planes for this frame.
pub fn setup_frustum(ctx: &mut RenderContext, refdef: &RefDef, settings: &RenderSettings) {
    let (forward, right, up) = angle_vectors(&refdef.viewangles);
    ctx.vieworg = refdef.vieworg;
    ctx.forward = forward;
    ctx.right = right;
    ctx.up = up;
    ctx.nocull = settings.nocull;
    ctx.isometric = settings.isometric;

    let normals = if settings.isometric {
        [
            right,
            [-right[0], -right[1], -right[2]],
            up,
            [-up[0], -up[1], -up[2]],
        ]
    } else {
        let half_x = 90.0 - refdef.fov_x / 2.0;
        let half_y = 90.0 - refdef.fov_y / 2.0;
        [
            rotate_point_around_vector(&up, &forward, -half_x),
            rotate_point_around_vector(&up, &forward, half_x),
            rotate_point_around_vector(&right, &forward, half_y),
            rotate_point_around_vector(&right, &forward, -half_y),
        ]
    };

    for (plane, normal) in ctx.frustum.planes.iter_mut().zip(normals) {
        *plane = CPlane::new(normal, dot_product(&refdef.vieworg, &normal));
        plane.plane_type = PLANE_ANYZ;
    }

    if settings.isometric {
        let spread = 10.0 * refdef.fov_x;
        let aspect = refdef.height as f32 / refdef.width.max(1) as f32;
        ctx.frustum.planes[0].dist -= spread;
        ctx.frustum.planes[1].dist -= spread;
        ctx.frustum.planes[2].dist -= spread * aspect;
        ctx.frustum.planes[3].dist -= spread * aspect;
    }
}

/// Box test against the frustum, bypassed by `r_nocull`.
pub fn cull_box(ctx: &RenderContext, mins: &Vec3, maxs: &Vec3) -> bool {
    if ctx.nocull {
        return false;
    }
    debug_assert!(
        (0..3).all(|i| maxs[i] - mins[i] <= 2.0 * MAX_WORLD_WIDTH),
        "box {:?} {:?} exceeds the world size",
        mins,
        maxs
    );
    ctx.frustum.cull_box(mins, maxs)
}

// ============================================================
// World walk
// ============================================================

/// Stamps a surface visible and files it into its bucket, once per frame.
fn mark_surface(frame: u64, tile: &mut BspModel, tile_index: usize, surface: usize, buckets: &mut SurfaceBuckets) {
    let surf = &mut tile.surfaces[surface];
    if surf.frame == frame {
        return;
    }
    surf.frame = frame;
    buckets.push(surf.pass, SurfaceRef { tile: tile_index, surface });
}

fn recursive_world_node(ctx: &mut RenderContext, tile: &mut BspModel, tile_index: usize, node: usize) {
    let Some(n) = tile.nodes.get(node) else {
        return;
    };
    if n.contents() == Some(CONTENTS_SOLID) {
        return;
    }
    if cull_box(ctx, &n.mins, &n.maxs) {
        return;
    }

    let (plane, children, first_surface, num_surfaces) = match n.kind {
        NodeKind::Leaf { .. } => return,
        NodeKind::Node { plane: None, children, .. } => {
            // pathfinding node, no plane to decide on
            recursive_world_node(ctx, tile, tile_index, children[0]);
            recursive_world_node(ctx, tile, tile_index, children[1]);
            return;
        }
        NodeKind::Node { plane: Some(plane), children, first_surface, num_surfaces } => {
            (plane, children, first_surface, num_surfaces)
        }
    };

    let p = &tile.planes[plane];
    let dot = if ctx.isometric {
        -dot_product(&ctx.forward, &p.normal)
    } else {
        p.distance(&ctx.vieworg)
    };

    let (side, backside) = if dot >= 0.0 { (0, false) } else { (1, true) };

    // front side first
    recursive_world_node(ctx, tile, tile_index, children[side]);

    for surface in first_surface..(first_surface + num_surfaces).min(tile.surfaces.len()) {
        if tile.surfaces[surface].flags.contains(MSurfFlags::PLANEBACK) == backside {
            mark_surface(ctx.frame, tile, tile_index, surface, &mut ctx.buckets);
        }
    }

    recursive_world_node(ctx, tile, tile_index, children[1 - side]);
}

/// Walks a level tree, skipping pathfinding nodes above the first real plane.
pub fn recurse_world(ctx: &mut RenderContext, tile: &mut BspModel, tile_index: usize, node: usize) {
    match tile.nodes.get(node).map(|n| &n.kind) {
        Some(&NodeKind::Node { plane: None, children, .. }) => {
            recurse_world(ctx, tile, tile_index, children[0]);
            recurse_world(ctx, tile, tile_index, children[1]);
        }
        Some(_) => recursive_world_node(ctx, tile, tile_index, node),
        None => {}
    }
}

fn walk_submodel(ctx: &mut RenderContext, tile: &mut BspModel, tile_index: usize, submodel: usize) {
    let Some(sub) = tile.submodels.get(submodel) else {
        return;
    };
    if sub.num_faces == 0 {
        return;
    }
    let headnode = sub.headnode;
    recurse_world(ctx, tile, tile_index, headnode);
}

/// Starts a new frame and fills the buckets with the visible surfaces of
/// every level up to `level`, plus level 0 which is always drawn.
pub fn get_level_surface_lists(ctx: &mut RenderContext, tiles: &mut [BspModel], level: usize, settings: &RenderSettings) {
    ctx.frame += 1;
    ctx.buckets.clear();

    if !settings.draw_world {
        return;
    }

    let mask = 1usize << level.min(PATHFINDING_HEIGHT - 1);

    for (tile_index, tile) in tiles.iter_mut().enumerate() {
        for i in 0..=LEVEL_LASTVISIBLE {
            if i != 0 && i & mask == 0 {
                continue;
            }
            walk_submodel(ctx, tile, tile_index, i);
        }

        if settings.draw_special_brushes {
            for i in LEVEL_LASTVISIBLE + 1..LEVEL_MAX {
                walk_submodel(ctx, tile, tile_index, i);
            }
        }
    }

    ctx.stats.bucket_surfaces = ctx.buckets.counts();
}

// ============================================================
// Brush submodel entities
// ============================================================

/// Box test for an inline brush model placed at `origin`.
pub fn cull_bsp_model(ctx: &RenderContext, num_faces: usize, mins: &Vec3, maxs: &Vec3, radius: f32, origin: &Vec3, angles: &Vec3) -> bool {
    if num_faces == 0 {
        return true;
    }

    if !vector_is_zero(angles) {
        let bmins = [origin[0] - radius, origin[1] - radius, origin[2] - radius];
        let bmaxs = [origin[0] + radius, origin[1] + radius, origin[2] + radius];
        cull_box(ctx, &bmins, &bmaxs)
    } else {
        cull_box(ctx, &vector_add(origin, mins), &vector_add(origin, maxs))
    }
}

/// View origin in the entity's local space.
pub fn model_origin(vieworg: &Vec3, origin: &Vec3, angles: &Vec3) -> Vec3 {
    let modelorg = vector_subtract(vieworg, origin);
    if vector_is_zero(angles) {
        return modelorg;
    }
    let (forward, right, up) = angle_vectors(angles);
    vector_rotate(&forward, &right, &up, &modelorg)
}

/// Buckets the faces of a submodel that face `modelorg`.
pub fn mark_brush_model_surfaces(
    frame: u64,
    tile: &mut BspModel,
    tile_index: usize,
    submodel: usize,
    modelorg: &Vec3,
    buckets: &mut SurfaceBuckets,
) {
    let Some(sub) = tile.submodels.get(submodel) else {
        return;
    };
    let range = sub.first_face..(sub.first_face + sub.num_faces).min(tile.surfaces.len());

    for surface in range {
        let surf = &tile.surfaces[surface];
        let dot = tile.planes[surf.plane].distance(modelorg);
        let back = surf.flags.contains(MSurfFlags::PLANEBACK);
        if (back && dot < -BACKFACE_EPSILON) || (!back && dot > BACKFACE_EPSILON) {
            mark_surface(frame, tile, tile_index, surface, buckets);
        }
    }
}

/// Draws an inline brush model with its entity transform.
pub fn draw_brush_model<B: DrawBackend>(
    gl: &mut GlState<B>,
    ctx: &mut RenderContext,
    tiles: &mut [BspModel],
    tile_index: usize,
    submodel: usize,
    transform: &Mat4,
    origin: &Vec3,
    angles: &Vec3,
) {
    let modelorg = model_origin(&ctx.vieworg, origin, angles);
    let mut buckets = SurfaceBuckets::new();
    if let Some(tile) = tiles.get_mut(tile_index) {
        mark_brush_model_surfaces(ctx.frame, tile, tile_index, submodel, &modelorg, &mut buckets);
    }

    gl.backend.push_matrix(transform);

    for pass in [SurfacePass::Opaque, SurfacePass::OpaqueWarp, SurfacePass::AlphaTest] {
        draw_surfaces(gl, tiles, pass, buckets.get(pass), &mut ctx.stats);
    }

    gl.enable_blend(true);
    for pass in [SurfacePass::Blend, SurfacePass::BlendWarp, SurfacePass::Material] {
        draw_surfaces(gl, tiles, pass, buckets.get(pass), &mut ctx.stats);
    }
    gl.enable_blend(false);

    gl.backend.pop_matrix();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_draw::{CommandRecorder, DrawCommand};
    use crate::r_image::TextureInfo;
    use crate::r_model_types::{BspNode, BspSubmodel, BspTexInfo, BspSurface};

    fn perspective_ctx(vieworg: Vec3, yaw: f32) -> RenderContext {
        let mut ctx = RenderContext::new();
        let refdef = RefDef {
            vieworg,
            viewangles: [0.0, yaw, 0.0],
            fov_x: 90.0,
            fov_y: 90.0,
            ..Default::default()
        };
        setup_frustum(&mut ctx, &refdef, &RenderSettings::default());
        ctx
    }

    /// One x=0 split with a front and a back surface and two empty leafs.
    fn split_tile() -> BspModel {
        let leaf = |contents| BspNode {
            mins: [-64.0; 3],
            maxs: [64.0; 3],
            parent: Some(0),
            kind: NodeKind::Leaf { contents },
        };
        BspModel {
            name: "split".to_string(),
            planes: vec![CPlane::new([1.0, 0.0, 0.0], 0.0)],
            texinfo: vec![BspTexInfo {
                vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
                flags: 0,
                value: 0,
                image: TextureInfo::new(7, 64, 64),
            }],
            surfaces: vec![
                BspSurface { plane: 0, num_vertices: 4, ..Default::default() },
                BspSurface {
                    plane: 0,
                    flags: MSurfFlags::PLANEBACK,
                    first_vertex: 4,
                    num_vertices: 4,
                    ..Default::default()
                },
            ],
            nodes: vec![
                BspNode {
                    mins: [-64.0; 3],
                    maxs: [64.0; 3],
                    parent: None,
                    kind: NodeKind::Node { plane: Some(0), children: [1, 2], first_surface: 0, num_surfaces: 2 },
                },
                leaf(0),
                leaf(0),
            ],
            first_leaf: 1,
            submodels: vec![BspSubmodel {
                mins: [-64.0; 3],
                maxs: [64.0; 3],
                origin: [0.0; 3],
                radius: 110.0,
                headnode: 0,
                first_face: 0,
                num_faces: 2,
            }],
            ..Default::default()
        }
    }

    // ---------------------------------------------------------
    // Culling
    // ---------------------------------------------------------

    #[test]
    fn test_cull_box_behind_and_in_front() {
        let ctx = perspective_ctx([0.0; 3], 0.0);
        // straight ahead
        assert!(!cull_box(&ctx, &[100.0, -8.0, -8.0], &[116.0, 8.0, 8.0]));
        // behind the viewer, outside the side planes
        assert!(cull_box(&ctx, &[-116.0, -8.0, -8.0], &[-100.0, 8.0, 8.0]));
        // far to the left of a 90 degree cone
        assert!(cull_box(&ctx, &[10.0, 200.0, -8.0], &[20.0, 220.0, 8.0]));
        // straddling every plane
        assert!(!cull_box(&ctx, &[-50.0; 3], &[50.0; 3]));
    }

    #[test]
    fn test_nocull_never_culls() {
        let mut ctx = perspective_ctx([0.0; 3], 0.0);
        ctx.nocull = true;
        assert!(!cull_box(&ctx, &[-116.0, -8.0, -8.0], &[-100.0, 8.0, 8.0]));
    }

    #[test]
    fn test_frustum_follows_yaw() {
        let ctx = perspective_ctx([0.0; 3], 90.0);
        assert!(!cull_box(&ctx, &[-8.0, 100.0, -8.0], &[8.0, 116.0, 8.0]));
        assert!(cull_box(&ctx, &[100.0, -8.0, -8.0], &[116.0, 8.0, 8.0]));
        assert!(cull_box(&ctx, &[-8.0, -116.0, -8.0], &[8.0, -100.0, 8.0]));
    }

    #[test]
    fn test_isometric_frustum_is_a_box() {
        let mut ctx = RenderContext::new();
        let refdef = RefDef {
            width: 100,
            height: 50,
            fov_x: 10.0,
            ..Default::default()
        };
        let settings = RenderSettings { isometric: true, ..Default::default() };
        setup_frustum(&mut ctx, &refdef, &settings);

        // 100 units either side horizontally, 50 vertically; depth is unbounded
        assert!(!cull_box(&ctx, &[-1000.0, -90.0, -40.0], &[-999.0, -80.0, -30.0]));
        assert!(cull_box(&ctx, &[0.0, 110.0, 0.0], &[1.0, 120.0, 1.0]));
        assert!(cull_box(&ctx, &[0.0, 0.0, 60.0], &[1.0, 1.0, 70.0]));
        assert!(ctx.frustum.planes.iter().all(|p| p.plane_type == PLANE_ANYZ));
    }

    #[test]
    fn test_cull_bsp_model_rotated_uses_radius() {
        let ctx = perspective_ctx([0.0; 3], 0.0);
        let origin = [100.0, 0.0, 0.0];
        assert!(cull_bsp_model(&ctx, 0, &[-1.0; 3], &[1.0; 3], 2.0, &origin, &[0.0; 3]));
        assert!(!cull_bsp_model(&ctx, 3, &[-1.0; 3], &[1.0; 3], 2.0, &origin, &[0.0; 3]));
        // unrotated bounds sit behind the viewer, the radius box does not
        let mins = [-300.0, -1.0, -1.0];
        let maxs = [-200.0, 1.0, 1.0];
        assert!(cull_bsp_model(&ctx, 3, &mins, &maxs, 4.0, &[0.0; 3], &[0.0; 3]));
        assert!(!cull_bsp_model(&ctx, 3, &mins, &maxs, 400.0, &[0.0; 3], &[0.0, 45.0, 0.0]));
    }

    // ---------------------------------------------------------
    // World walk
    // ---------------------------------------------------------

    #[test]
    fn test_walk_stamps_only_facing_surface() {
        let mut tiles = vec![split_tile()];
        let mut ctx = perspective_ctx([-128.0, 0.0, 0.0], 0.0);

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &RenderSettings::default());

        assert_eq!(ctx.frame, 1);
        // the viewer is behind the plane, so only the back surface faces it
        assert_eq!(tiles[0].surfaces[1].frame, ctx.frame);
        assert_eq!(tiles[0].surfaces[0].frame, 0);
        assert_eq!(ctx.buckets.get(SurfacePass::Opaque), &[SurfaceRef { tile: 0, surface: 1 }]);
        assert_eq!(ctx.stats.bucket_surfaces, [1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_walk_clears_buckets_each_frame() {
        let mut tiles = vec![split_tile()];
        let mut ctx = perspective_ctx([128.0, 0.0, 0.0], 180.0);
        let settings = RenderSettings::default();

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &settings);
        get_level_surface_lists(&mut ctx, &mut tiles, 0, &settings);

        assert_eq!(ctx.frame, 2);
        assert_eq!(ctx.buckets.total(), 1);
        assert_eq!(tiles[0].surfaces[0].frame, 2);
    }

    #[test]
    fn test_walk_disabled_still_advances_frame() {
        let mut tiles = vec![split_tile()];
        let mut ctx = perspective_ctx([-128.0, 0.0, 0.0], 0.0);
        let settings = RenderSettings { draw_world: false, ..Default::default() };

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &settings);
        assert_eq!(ctx.frame, 1);
        assert!(ctx.buckets.is_empty());
    }

    #[test]
    fn test_walk_skips_solid_leaf_and_pathfinding_nodes() {
        let mut tile = split_tile();
        // put a pathfinding node on top of the split
        tile.nodes.push(BspNode {
            mins: [-64.0; 3],
            maxs: [64.0; 3],
            parent: None,
            kind: NodeKind::Node { plane: None, children: [0, 1], first_surface: 0, num_surfaces: 0 },
        });
        tile.nodes[1].kind = NodeKind::Leaf { contents: CONTENTS_SOLID };
        tile.submodels[0].headnode = 3;
        let mut tiles = vec![tile];
        let mut ctx = perspective_ctx([-128.0, 0.0, 0.0], 0.0);

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &RenderSettings::default());
        assert_eq!(ctx.buckets.total(), 1);
        assert_eq!(tiles[0].surfaces[1].frame, ctx.frame);
    }

    #[test]
    fn test_level_mask_selects_submodels() {
        let mut tile = split_tile();
        // submodels 1..=3 share the tree of submodel 0 and start empty
        for _ in 1..4 {
            let mut sub = tile.submodels[0].clone();
            sub.num_faces = 0;
            tile.submodels.push(sub);
        }
        tile.submodels[0].num_faces = 0;
        tile.submodels[2].num_faces = 2; // visible only when level bit 1 is set
        let mut tiles = vec![tile];
        let mut ctx = perspective_ctx([-128.0, 0.0, 0.0], 0.0);
        let settings = RenderSettings::default();

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &settings);
        assert!(ctx.buckets.is_empty());

        get_level_surface_lists(&mut ctx, &mut tiles, 1, &settings);
        assert_eq!(ctx.buckets.total(), 1);
    }

    #[test]
    fn test_isometric_facing_uses_view_direction() {
        let mut tiles = vec![split_tile()];
        let mut ctx = RenderContext::new();
        let refdef = RefDef { vieworg: [-128.0, 0.0, 0.0], viewangles: [0.0, 180.0, 0.0], ..Default::default() };
        let settings = RenderSettings { isometric: true, nocull: true, ..Default::default() };
        setup_frustum(&mut ctx, &refdef, &settings);

        get_level_surface_lists(&mut ctx, &mut tiles, 0, &settings);
        // looking down -x means the +x side faces the camera regardless of position
        assert_eq!(ctx.buckets.get(SurfacePass::Opaque), &[SurfaceRef { tile: 0, surface: 0 }]);
    }

    // ---------------------------------------------------------
    // Brush models
    // ---------------------------------------------------------

    #[test]
    fn test_brush_model_draws_facing_surfaces_with_transform() {
        let mut tiles = vec![split_tile()];
        let mut ctx = perspective_ctx([128.0, 0.0, 0.0], 180.0);
        ctx.frame = 5;
        let mut gl = GlState::new(CommandRecorder::new());
        gl.backend.clear();

        let transform = ufo_common::q_shared::MAT4_IDENTITY;
        draw_brush_model(&mut gl, &mut ctx, &mut tiles, 0, 0, &transform, &[0.0; 3], &[0.0; 3]);

        assert_eq!(tiles[0].surfaces[0].frame, 5);
        assert_eq!(tiles[0].surfaces[1].frame, 0);
        assert_eq!(gl.backend.surfaces(), vec![(SurfacePass::Opaque, 0, 0)]);
        assert_eq!(gl.backend.commands.first(), Some(&DrawCommand::PushMatrix(transform)));
        assert_eq!(gl.backend.commands.last(), Some(&DrawCommand::PopMatrix));
        assert_eq!(ctx.stats.brush_count, 1);
    }

    #[test]
    fn test_model_origin_rotates_into_entity_space() {
        let org = model_origin(&[0.0, 10.0, 0.0], &[0.0; 3], &[0.0, 90.0, 0.0]);
        assert!((org[0] - 10.0).abs() < 1e-4);
        assert!(org[1].abs() < 1e-4);
    }
}
