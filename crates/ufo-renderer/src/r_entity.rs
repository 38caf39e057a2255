// r_entity.rs — per-frame entity list, transform resolution, entity chains and marker shapes

use std::collections::HashSet;
use std::f32::consts::FRAC_PI_2;

use bitflags::bitflags;
use ufo_common::q_shared::{angle_vectors, matrix_multiply, vector_is_zero, Mat4, Vec3, Vec4};

use crate::error::RenderError;
use crate::r_bsp::{cull_bsp_model, draw_brush_model};
use crate::r_draw::{DrawBackend, GlState, PolygonMode, PrimitiveMode};
use crate::r_lightmap::BrushTraceTarget;
use crate::r_local::{RdFlags, RefDef, RenderContext, RenderSettings, MAX_ENTITIES, PLAYER_WIDTH};
use crate::r_mesh::{cull_mesh_model, draw_alias_model, mesh_light_color};
use crate::r_model::ModelRegistry;
use crate::r_model_alias::{interpolate_tag, AnimStateId, AnimStatePool};
use crate::r_model_types::{AliasArrays, BspModel, Model, ModelId, ModelKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub usize);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RenderFlags: u32 {
        const TRANSLUCENT = 1 << 0;
        /// Field marker box.
        const BOX = 1 << 1;
        /// Pathing floor marker.
        const PATH = 1 << 2;
        /// Targeting arrow.
        const ARROW = 1 << 3;
        const SELECTED = 1 << 4;
        const MEMBER = 1 << 5;
        const ALLIED = 1 << 6;
        const ACTOR = 1 << 7;
        const HIGHLIGHT = 1 << 8;
        const GLOW = 1 << 9;
    }
}

/// One thing to draw this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// `None` draws the placeholder, or a marker shape when flagged.
    pub model: Option<ModelId>,
    pub origin: Vec3,
    /// Second point of marker shapes.
    pub oldorigin: Vec3,
    pub angles: Vec3,
    /// Zero components leave that axis unscaled.
    pub scale: Vec3,
    /// Box marker extents, relative to nothing: world coordinates.
    pub mins: Vec3,
    pub maxs: Vec3,
    pub tag_parent: Option<EntityId>,
    pub tagname: Option<String>,
    pub skinnum: usize,
    /// Marker colour.
    pub color: Vec3,
    pub alpha: f32,
    pub flags: RenderFlags,
    pub anim: Option<AnimStateId>,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            model: None,
            origin: [0.0; 3],
            oldorigin: [0.0; 3],
            angles: [0.0; 3],
            scale: [1.0; 3],
            mins: [0.0; 3],
            maxs: [0.0; 3],
            tag_parent: None,
            tagname: None,
            skinnum: 0,
            color: [1.0; 3],
            alpha: 1.0,
            flags: RenderFlags::empty(),
            anim: None,
        }
    }
}

impl Entity {
    /// Rotation columns forward, left, up plus the origin.
    #[rustfmt::skip]
    pub fn local_matrix(&self) -> Mat4 {
        let (forward, right, up) = angle_vectors(&self.angles);
        [
            forward[0], forward[1], forward[2], 0.0,
            -right[0], -right[1], -right[2], 0.0,
            up[0], up[1], up[2], 0.0,
            self.origin[0], self.origin[1], self.origin[2], 1.0,
        ]
    }

    fn marker_color(&self) -> Vec4 {
        [self.color[0], self.color[1], self.color[2], self.alpha]
    }
}

/// Keyframes an entity is drawn with; idle entities show frame 0.
pub fn entity_frames(e: &Entity, anims: &AnimStatePool) -> (usize, usize, f32) {
    e.anim
        .and_then(|id| anims.get(id))
        .map_or((0, 0, 0.0), |(_, s)| (s.frame, s.oldframe, s.backlerp))
}

// ============================================================
// Entity list
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum TransformState {
    Pending,
    Resolving,
    Done(Mat4),
}

/// The entities of the current frame, in insertion order.
#[derive(Debug, Default)]
pub struct EntityList {
    entities: Vec<Entity>,
    transforms: Vec<TransformState>,
    /// (parent model, tag) pairs already reported missing; kept across frames.
    missing_tags: HashSet<(Option<ModelId>, String)>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) -> Result<EntityId, RenderError> {
        if self.entities.len() >= MAX_ENTITIES {
            return Err(RenderError::TooManyEntities { max: MAX_ENTITIES });
        }
        self.entities.push(entity);
        self.transforms.push(TransformState::Pending);
        Ok(EntityId(self.entities.len() - 1))
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.transforms.clear();
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if let Some(t) = self.transforms.get_mut(id.0) {
            *t = TransformState::Pending;
        }
        self.entities.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().enumerate().map(|(i, e)| (EntityId(i), e))
    }

    /// Drops every cached transform. Only called between frames.
    pub fn invalidate_transforms(&mut self) {
        self.transforms.fill(TransformState::Pending);
    }

    /// World matrix of an entity, computed once per frame. Tag-attached
    /// entities compose parent × tag × local; a parent chain that leads
    /// back to an entity being resolved is an error.
    pub fn resolve_transform(
        &mut self,
        id: EntityId,
        models: &ModelRegistry,
        anims: &AnimStatePool,
    ) -> Result<Mat4, RenderError> {
        match self.transforms.get(id.0) {
            None => return Err(RenderError::UnknownEntity(id)),
            Some(TransformState::Done(m)) => return Ok(*m),
            Some(TransformState::Resolving) => return Err(RenderError::TransformRing(id)),
            Some(TransformState::Pending) => {}
        }
        self.transforms[id.0] = TransformState::Resolving;

        let local = self.entities[id.0].local_matrix();
        let matrix = match self.entities[id.0].tag_parent {
            Some(parent) => {
                let parent_matrix = self.resolve_transform(parent, models, anims)?;
                match self.tag_matrix(id, parent, models, anims) {
                    Some(tag) => matrix_multiply(&matrix_multiply(&parent_matrix, &tag), &local),
                    None => {
                        self.report_missing_tag(id, parent);
                        local
                    }
                }
            }
            None => local,
        };

        self.transforms[id.0] = TransformState::Done(matrix);
        Ok(matrix)
    }

    /// Interpolated tag of the parent's model the child is attached to.
    fn tag_matrix(&self, child: EntityId, parent: EntityId, models: &ModelRegistry, anims: &AnimStatePool) -> Option<Mat4> {
        let e = &self.entities[child.0];
        let p = &self.entities[parent.0];
        let tagname = e.tagname.as_deref().unwrap_or("");

        let tags = p
            .model
            .and_then(|m| models.get(m))
            .and_then(Model::alias)
            .and_then(|a| a.tags.as_ref());
        let (tags, index) = tags.and_then(|t| t.find(tagname).map(|i| (t, i)))?;

        let (frame, oldframe, backlerp) = entity_frames(p, anims);
        Some(interpolate_tag(tags, index, frame, oldframe, backlerp))
    }

    /// Warns once per parent model and tag name.
    fn report_missing_tag(&mut self, child: EntityId, parent: EntityId) {
        let tagname = self.entities[child.0].tagname.clone().unwrap_or_default();
        let model = self.entities[parent.0].model;
        if self.missing_tags.insert((model, tagname.clone())) {
            log::warn!("entity {}: parent {} has no tag '{}'", child.0, parent.0, tagname);
        }
    }

    /// Number of distinct missing tags reported so far.
    pub fn missing_tag_count(&self) -> usize {
        self.missing_tags.len()
    }

    /// The cached matrix, once resolved this frame.
    pub fn transform(&self, id: EntityId) -> Option<Mat4> {
        match self.transforms.get(id.0) {
            Some(TransformState::Done(m)) => Some(*m),
            _ => None,
        }
    }
}

// ============================================================
// Culling and chains
// ============================================================

/// Frustum test for one entity. Entities without a model are never culled.
pub fn cull_entity(ctx: &RenderContext, entities: &EntityList, e: &Entity, models: &ModelRegistry) -> bool {
    if ctx.nocull {
        return false;
    }
    let Some(model) = e.model.and_then(|m| models.get(m)) else {
        return false;
    };

    match &model.kind {
        ModelKind::BrushSubmodel { .. } => {
            cull_bsp_model(ctx, 1, &model.mins, &model.maxs, model.radius, &e.origin, &e.angles)
        }
        ModelKind::Alias(_) => cull_mesh_model(ctx, entities, e, model),
    }
}

/// Entities sorted by how they are drawn, in list order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EntityChains {
    pub bsp: Vec<EntityId>,
    pub opaque: Vec<EntityId>,
    pub blend: Vec<EntityId>,
    pub null: Vec<EntityId>,
}

impl EntityChains {
    pub fn push(&mut self, id: EntityId, e: &Entity, model: Option<&Model>) {
        let chain = match model.map(|m| &m.kind) {
            None if e.flags.intersects(RenderFlags::BOX | RenderFlags::PATH | RenderFlags::ARROW) => &mut self.blend,
            None => &mut self.null,
            Some(ModelKind::BrushSubmodel { .. }) => &mut self.bsp,
            Some(ModelKind::Alias(alias)) => {
                if alias.has_alpha() || e.flags.contains(RenderFlags::TRANSLUCENT) {
                    &mut self.blend
                } else {
                    &mut self.opaque
                }
            }
        };
        chain.push(id);
    }
}

// ============================================================
// Marker shapes
// ============================================================

pub const HIGHLIGHT_START_Z: f32 = 22.0;

const fn hl(x: f32, y: f32, z: f32) -> Vec3 {
    [x, y, HIGHLIGHT_START_Z + z]
}

/// Inverted pyramid drawn over highlighted actors.
pub const HIGHLIGHT_VERTICES: [Vec3; 18] = [
    hl(4.0, 4.0, 0.0),
    hl(0.0, 0.0, 16.0),
    hl(8.0, 0.0, 16.0),
    hl(4.0, 4.0, 0.0),
    hl(0.0, 0.0, 16.0),
    hl(0.0, 8.0, 16.0),
    hl(4.0, 4.0, 0.0),
    hl(0.0, 8.0, 16.0),
    hl(8.0, 8.0, 16.0),
    hl(4.0, 4.0, 0.0),
    hl(8.0, 8.0, 16.0),
    hl(8.0, 0.0, 16.0),
    hl(0.0, 0.0, 16.0),
    hl(0.0, 8.0, 16.0),
    hl(8.0, 0.0, 16.0),
    hl(0.0, 8.0, 16.0),
    hl(8.0, 0.0, 16.0),
    hl(8.0, 8.0, 16.0),
];

/// Team circle under the feet of selected, member and allied actors.
pub const SELECTION_CIRCLE: [Vec3; 9] = [
    [10.0, 0.0, -27.0],
    [7.0, -7.0, -27.0],
    [0.0, -10.0, -27.0],
    [-7.0, -7.0, -27.0],
    [-10.0, 0.0, -27.0],
    [-7.0, 7.0, -27.0],
    [0.0, 10.0, -27.0],
    [7.0, 7.0, -27.0],
    [10.0, 0.0, -27.0],
];

pub fn selection_color(flags: RenderFlags) -> Vec4 {
    if flags.contains(RenderFlags::MEMBER) {
        if flags.contains(RenderFlags::SELECTED) {
            [0.0, 1.0, 0.0, 1.0]
        } else {
            [0.0, 1.0, 0.0, 0.3]
        }
    } else if flags.contains(RenderFlags::ALLIED) {
        [0.0, 0.5, 1.0, 0.3]
    } else {
        [0.0, 1.0, 0.0, 1.0]
    }
}

/// Corner `i` takes mins on the axes whose bit is set.
pub fn bbox_corners(mins: &Vec3, maxs: &Vec3) -> [Vec3; 8] {
    let mut bbox = [[0.0; 3]; 8];
    for (i, corner) in bbox.iter_mut().enumerate() {
        for axis in 0..3 {
            corner[axis] = if i & (1 << axis) != 0 { mins[axis] } else { maxs[axis] };
        }
    }
    bbox
}

const BBOX_STRIP: [usize; 15] = [2, 1, 0, 1, 4, 5, 1, 7, 3, 2, 7, 6, 2, 4, 0];
const BBOX_BOTTOM: [usize; 3] = [4, 6, 7];

/// Top and sides, then the bottom, as two triangle strips.
pub fn bbox_strips(bbox: &[Vec3; 8]) -> (Vec<Vec3>, Vec<Vec3>) {
    (
        BBOX_STRIP.iter().map(|&i| bbox[i]).collect(),
        BBOX_BOTTOM.iter().map(|&i| bbox[i]).collect(),
    )
}

pub fn draw_bbox<B: DrawBackend>(gl: &mut GlState<B>, bbox: &[Vec3; 8]) {
    let (sides, bottom) = bbox_strips(bbox);
    gl.polygon_mode(PolygonMode::Line);
    gl.backend.draw_primitive(PrimitiveMode::TriangleStrip, &sides);
    gl.backend.draw_primitive(PrimitiveMode::TriangleStrip, &bottom);
    gl.polygon_mode(PolygonMode::Fill);
}

/// Walks a rectangle of `dx` by `dy` around `lower`/`upper`, one strip pair per corner.
fn rect_strip(mut lower: Vec3, mut upper: Vec3, dx: f32, dy: f32) -> Vec<Vec3> {
    let mut strip = Vec::with_capacity(10);
    strip.extend([lower, upper]);
    for (axis, delta) in [(0, dx), (1, dy), (0, -dx), (1, -dy)] {
        lower[axis] += delta;
        upper[axis] += delta;
        strip.extend([lower, upper]);
    }
    strip
}

/// Vertical wall strip from `origin` up to `oldorigin.z`, spanning the
/// xy offset between the two points.
pub fn box_strip(origin: &Vec3, oldorigin: &Vec3) -> Vec<Vec3> {
    let lower = *origin;
    let mut upper = *origin;
    upper[2] = oldorigin[2];
    rect_strip(lower, upper, oldorigin[0] - origin[0], oldorigin[1] - origin[1])
}

/// Pathing marker: a `PLAYER_WIDTH * 2` square column of height
/// `oldorigin.z`, plus its top edge.
pub fn floor_strips(origin: &Vec3, oldorigin: &Vec3) -> (Vec<Vec3>, Vec<Vec3>) {
    let dx = PLAYER_WIDTH * 2.0;
    let dy = oldorigin[2];

    let mut lower = *origin;
    let mut upper = *origin;
    upper[2] += dy;
    let walls = rect_strip(lower, upper, dx, dx);

    // rect_strip ends back at the start corner
    lower[2] += dy;
    upper[1] += dx;
    let mut top = vec![lower, upper];
    lower[0] += dx;
    upper[0] += dx;
    top.extend([lower, upper]);
    (walls, top)
}

/// Fan from `oldorigin` to three points around `origin`.
pub fn arrow_fan(origin: &Vec3, oldorigin: &Vec3) -> [Vec3; 4] {
    [
        *oldorigin,
        [origin[0] + 2.0, origin[1], origin[2]],
        [origin[0], origin[1] + 2.0, origin[2]],
        [origin[0], origin[1], origin[2] + 2.0],
    ]
}

/// The placeholder diamond: a lower and an upper fan around a ring of radius 16.
pub fn null_model_fans() -> (Vec<Vec3>, Vec<Vec3>) {
    let ring = |i: usize| {
        let a = i as f32 * FRAC_PI_2;
        [16.0 * a.cos(), 16.0 * a.sin(), 0.0]
    };
    let mut lower = vec![[0.0, 0.0, -16.0]];
    lower.extend((0..=4).map(ring));
    let mut upper = vec![[0.0, 0.0, 16.0]];
    upper.extend((0..=4).rev().map(ring));
    (lower, upper)
}

fn draw_box<B: DrawBackend>(gl: &mut GlState<B>, e: &Entity, wire: bool) {
    gl.enable_texturing(false);
    if !wire {
        gl.polygon_mode(PolygonMode::Line);
    }
    gl.color(Some(e.marker_color()));

    if !vector_is_zero(&e.mins) && !vector_is_zero(&e.maxs) {
        draw_bbox(gl, &bbox_corners(&e.mins, &e.maxs));
    } else {
        gl.backend.draw_primitive(PrimitiveMode::TriangleStrip, &box_strip(&e.origin, &e.oldorigin));
    }

    if !wire {
        gl.polygon_mode(PolygonMode::Fill);
    }
    gl.enable_texturing(true);
    gl.color(None);
}

fn draw_floor<B: DrawBackend>(gl: &mut GlState<B>, e: &Entity) {
    gl.enable_texturing(false);
    gl.color(Some(e.marker_color()));
    let (walls, top) = floor_strips(&e.origin, &e.oldorigin);
    gl.backend.draw_primitive(PrimitiveMode::TriangleStrip, &walls);
    gl.backend.draw_primitive(PrimitiveMode::TriangleStrip, &top);
    gl.enable_texturing(true);
    gl.color(None);
}

fn draw_arrow<B: DrawBackend>(gl: &mut GlState<B>, e: &Entity) {
    gl.enable_texturing(false);
    gl.color(Some(e.marker_color()));
    gl.backend.draw_primitive(PrimitiveMode::TriangleFan, &arrow_fan(&e.origin, &e.oldorigin));
    gl.enable_texturing(true);
    gl.color(None);
}

fn draw_null_model<B: DrawBackend>(gl: &mut GlState<B>, transform: &Mat4) {
    let (lower, upper) = null_model_fans();
    gl.backend.push_matrix(transform);
    gl.enable_texturing(false);
    gl.backend.draw_primitive(PrimitiveMode::TriangleFan, &lower);
    gl.backend.draw_primitive(PrimitiveMode::TriangleFan, &upper);
    gl.backend.pop_matrix();
    gl.enable_texturing(true);
}

fn draw_entity_effects<B: DrawBackend>(gl: &mut GlState<B>, entities: &EntityList, drawn: &[EntityId]) {
    let circle = RenderFlags::SELECTED | RenderFlags::ALLIED | RenderFlags::MEMBER;

    for &id in drawn {
        let (Some(e), Some(transform)) = (entities.get(id), entities.transform(id)) else {
            continue;
        };
        if !e.flags.intersects(circle | RenderFlags::HIGHLIGHT) {
            continue;
        }

        gl.backend.push_matrix(&transform);

        if e.flags.contains(RenderFlags::HIGHLIGHT) {
            gl.enable_texturing(false);
            gl.color(None);
            gl.backend.draw_primitive(PrimitiveMode::Triangles, &HIGHLIGHT_VERTICES);
            gl.enable_texturing(true);
        }

        if e.flags.intersects(circle) {
            gl.enable_depth_test(false);
            gl.enable_texturing(false);
            gl.color(Some(selection_color(e.flags)));
            gl.backend.draw_primitive(PrimitiveMode::LineStrip, &SELECTION_CIRCLE);
            gl.enable_texturing(true);
            gl.enable_depth_test(true);
        }

        gl.backend.pop_matrix();
    }

    gl.color(None);
}

// ============================================================
// Entity pass
// ============================================================

/// Read-only inputs of the entity pass.
pub struct EntityScene<'a> {
    pub models: &'a ModelRegistry,
    pub anims: &'a AnimStatePool,
    pub refdef: &'a RefDef,
    pub settings: &'a RenderSettings,
}

/// The mesh chains share this: markers first by flag, alias models otherwise.
fn draw_mesh_entities<B: DrawBackend>(
    gl: &mut GlState<B>,
    ctx: &mut RenderContext,
    tiles: &[BspModel],
    targets: &[BrushTraceTarget],
    entities: &EntityList,
    chain: &[EntityId],
    scene: &EntityScene<'_>,
    scratch: &mut AliasArrays,
) {
    for &id in chain {
        let Some(e) = entities.get(id) else {
            continue;
        };
        if e.flags.contains(RenderFlags::BOX) {
            draw_box(gl, e, scene.settings.wire);
        } else if e.flags.contains(RenderFlags::PATH) {
            draw_floor(gl, e);
        } else if e.flags.contains(RenderFlags::ARROW) {
            draw_arrow(gl, e);
        } else {
            let Some(model) = e.model.and_then(|m| scene.models.get(m)) else {
                continue;
            };
            let Some(transform) = entities.transform(id) else {
                continue;
            };
            let color = if scene.refdef.rdflags.contains(RdFlags::NOWORLDMODEL) {
                None
            } else {
                Some(mesh_light_color(tiles, targets, e, id.0, &transform, scene.refdef.time))
            };
            let frames = entity_frames(e, scene.anims);
            draw_alias_model(gl, ctx, e, model, &transform, frames, color, scene.settings.show_box, scratch);
        }
    }
}

/// Culls, chains and draws every entity of the frame.
pub fn draw_entities<B: DrawBackend>(
    gl: &mut GlState<B>,
    ctx: &mut RenderContext,
    tiles: &mut [BspModel],
    entities: &mut EntityList,
    scene: &EntityScene<'_>,
    scratch: &mut AliasArrays,
) -> Result<(), RenderError> {
    if !scene.settings.draw_entities {
        return Ok(());
    }

    let noworld = scene.refdef.rdflags.contains(RdFlags::NOWORLDMODEL);
    let mut chains = EntityChains::default();
    let mut drawn = Vec::with_capacity(entities.len());

    for i in 0..entities.len() {
        let id = EntityId(i);
        let e = &entities.entities[i];
        if !noworld && cull_entity(ctx, entities, e, scene.models) {
            ctx.stats.entities_culled += 1;
            continue;
        }

        entities.resolve_transform(id, scene.models, scene.anims)?;

        let e = &entities.entities[i];
        chains.push(id, e, e.model.and_then(|m| scene.models.get(m)));
        drawn.push(id);
    }
    ctx.stats.entities_drawn += drawn.len();

    let brushes: Vec<(EntityId, BrushTraceTarget)> = chains
        .bsp
        .iter()
        .filter_map(|&id| {
            let e = entities.get(id)?;
            match scene.models.get(e.model?)?.kind {
                ModelKind::BrushSubmodel { tile, submodel } => {
                    Some((id, BrushTraceTarget { tile, submodel, origin: e.origin }))
                }
                ModelKind::Alias(_) => None,
            }
        })
        .collect();

    for (id, target) in &brushes {
        let (Some(e), Some(transform)) = (entities.get(*id), entities.transform(*id)) else {
            continue;
        };
        draw_brush_model(gl, ctx, tiles, target.tile, target.submodel, &transform, &e.origin, &e.angles);
    }
    let targets: Vec<BrushTraceTarget> = brushes.into_iter().map(|(_, t)| t).collect();

    if !chains.opaque.is_empty() {
        if !noworld {
            gl.enable_lighting(true);
        }
        draw_mesh_entities(gl, ctx, tiles, &targets, entities, &chains.opaque, scene, scratch);
        if !noworld {
            gl.enable_lighting(false);
        }
    }

    if !chains.blend.is_empty() {
        gl.enable_blend(true);
        draw_mesh_entities(gl, ctx, tiles, &targets, entities, &chains.blend, scene, scratch);
        gl.enable_blend(false);
    }

    gl.color(None);
    for &id in &chains.null {
        if let Some(transform) = entities.transform(id) {
            draw_null_model(gl, &transform);
        }
    }

    gl.enable_blend(true);
    draw_entity_effects(gl, entities, &drawn);
    gl.enable_blend(false);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_draw::{CommandRecorder, DrawCommand};
    use crate::r_image::{ImageRegistry, TextureInfo};
    use crate::r_model::MemoryFiles;
    use crate::r_model_md2::test_md2::{quad_md2, tag_bytes, translation};
    use crate::r_model_types::BspSubmodel;
    use ufo_common::q_shared::{matrix_origin, MAT4_IDENTITY, NUM_REGULAR_MODELS};

    fn approx(a: Vec3, b: Vec3) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < 1e-4)
    }

    /// A soldier model with a `tag_rweapon` at (10,0,0) in both frames.
    fn soldier(models: &mut ModelRegistry) -> ModelId {
        let mut files = MemoryFiles::new();
        files.insert("models/soldier.md2", quad_md2(2).to_bytes());
        files.insert(
            "models/soldier.tag",
            tag_bytes(&["tag_rweapon"], &[translation(10.0, 0.0, 0.0); 2], 2),
        );
        let mut textures = ImageRegistry::new(TextureInfo::new(0, 8, 8));
        models.register_model("models/soldier.md2", &files, &mut textures).unwrap()
    }

    fn attach(list: &mut EntityList, parent: EntityId, tag: &str) -> EntityId {
        list.add(Entity {
            tag_parent: Some(parent),
            tagname: Some(tag.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    // ---------------------------------------------------------
    // Transforms
    // ---------------------------------------------------------

    #[test]
    fn test_local_matrix_translation() {
        let e = Entity { origin: [1.0, 2.0, 3.0], ..Default::default() };
        let m = e.local_matrix();
        assert_eq!(matrix_origin(&m), [1.0, 2.0, 3.0]);
        assert!(approx([m[0], m[1], m[2]], [1.0, 0.0, 0.0]));
        assert!(approx([m[4], m[5], m[6]], [0.0, 1.0, 0.0]));
        assert!(approx([m[8], m[9], m[10]], [0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_tag_composition() {
        let mut models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let model = soldier(&mut models);

        let mut list = EntityList::new();
        let parent = list.add(Entity { model: Some(model), ..Default::default() }).unwrap();
        let child = attach(&mut list, parent, "tag_rweapon");

        let m = list.resolve_transform(child, &models, &anims).unwrap();
        assert!(approx(matrix_origin(&m), [10.0, 0.0, 0.0]));

        list.get_mut(parent).unwrap().angles = [0.0, 90.0, 0.0];
        list.invalidate_transforms();
        let m = list.resolve_transform(child, &models, &anims).unwrap();
        assert!(approx(matrix_origin(&m), [0.0, 10.0, 0.0]));
    }

    #[test]
    fn test_missing_tag_uses_local_transform() {
        let mut models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let model = soldier(&mut models);

        let mut list = EntityList::new();
        let parent = list
            .add(Entity { model: Some(model), origin: [50.0, 0.0, 0.0], ..Default::default() })
            .unwrap();
        let child = attach(&mut list, parent, "tag_lweapon");
        list.get_mut(child).unwrap().origin = [1.0, 2.0, 3.0];

        let m = list.resolve_transform(child, &models, &anims).unwrap();
        assert!(approx(matrix_origin(&m), [1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_missing_tag_reported_once() {
        let mut models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let model = soldier(&mut models);

        let mut list = EntityList::new();
        for _ in 0..3 {
            let parent = list.add(Entity { model: Some(model), ..Default::default() }).unwrap();
            let child = attach(&mut list, parent, "tag_lweapon");
            list.resolve_transform(child, &models, &anims).unwrap();
            list.clear();
        }
        assert_eq!(list.missing_tag_count(), 1);

        let parent = list.add(Entity { model: Some(model), ..Default::default() }).unwrap();
        let child = attach(&mut list, parent, "tag_head");
        list.resolve_transform(child, &models, &anims).unwrap();
        assert_eq!(list.missing_tag_count(), 2);
    }

    #[test]
    fn test_transform_ring_is_an_error() {
        let models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let mut list = EntityList::new();
        let a = attach(&mut list, EntityId(1), "t");
        attach(&mut list, a, "t");

        assert!(matches!(
            list.resolve_transform(a, &models, &anims),
            Err(RenderError::TransformRing(EntityId(0)))
        ));
    }

    #[test]
    fn test_transform_cached_until_invalidated() {
        let models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let mut list = EntityList::new();
        let id = list.add(Entity::default()).unwrap();
        assert_eq!(list.transform(id), None);
        assert_eq!(list.resolve_transform(id, &models, &anims).unwrap(), MAT4_IDENTITY);
        assert_eq!(list.transform(id), Some(MAT4_IDENTITY));
        list.invalidate_transforms();
        assert_eq!(list.transform(id), None);
    }

    #[test]
    fn test_entity_capacity() {
        let mut list = EntityList::new();
        for _ in 0..MAX_ENTITIES {
            list.add(Entity::default()).unwrap();
        }
        assert!(matches!(
            list.add(Entity::default()),
            Err(RenderError::TooManyEntities { max: MAX_ENTITIES })
        ));
        assert!(matches!(
            list.resolve_transform(EntityId(MAX_ENTITIES), &ModelRegistry::new(), &AnimStatePool::new()),
            Err(RenderError::UnknownEntity(_))
        ));
    }

    // ---------------------------------------------------------
    // Chains
    // ---------------------------------------------------------

    #[test]
    fn test_chains() {
        let mut models = ModelRegistry::new();
        let model = soldier(&mut models);
        let tile = BspModel {
            submodels: vec![
                BspSubmodel {
                    mins: [0.0; 3],
                    maxs: [0.0; 3],
                    origin: [0.0; 3],
                    radius: 0.0,
                    headnode: 0,
                    first_face: 0,
                    num_faces: 0,
                };
                NUM_REGULAR_MODELS + 1
            ],
            ..Default::default()
        };
        models.register_inline_models(0, &tile);
        let brush = models.find("*1").unwrap();

        let mut chains = EntityChains::default();
        let with = |model: Option<ModelId>, flags| Entity { model, flags, ..Default::default() };
        let cases = [
            with(None, RenderFlags::empty()),
            with(None, RenderFlags::PATH),
            with(Some(brush), RenderFlags::empty()),
            with(Some(model), RenderFlags::empty()),
            with(Some(model), RenderFlags::TRANSLUCENT),
        ];
        for (i, e) in cases.iter().enumerate() {
            chains.push(EntityId(i), e, e.model.and_then(|m| models.get(m)));
        }

        assert_eq!(chains.null, vec![EntityId(0)]);
        assert_eq!(chains.blend, vec![EntityId(1), EntityId(4)]);
        assert_eq!(chains.bsp, vec![EntityId(2)]);
        assert_eq!(chains.opaque, vec![EntityId(3)]);
    }

    // ---------------------------------------------------------
    // Shapes
    // ---------------------------------------------------------

    #[test]
    fn test_bbox_corners() {
        let bbox = bbox_corners(&[-1.0, -2.0, -3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(bbox[0], [1.0, 2.0, 3.0]);
        assert_eq!(bbox[7], [-1.0, -2.0, -3.0]);
        assert_eq!(bbox[5], [-1.0, 2.0, -3.0]);
        let (sides, bottom) = bbox_strips(&bbox);
        assert_eq!(sides.len(), 15);
        assert_eq!(bottom, vec![bbox[4], bbox[6], bbox[7]]);
    }

    #[test]
    fn test_box_strip_walks_rectangle() {
        let strip = box_strip(&[0.0, 0.0, 0.0], &[4.0, 2.0, 8.0]);
        assert_eq!(strip.len(), 10);
        assert_eq!(strip[0], [0.0, 0.0, 0.0]);
        assert_eq!(strip[1], [0.0, 0.0, 8.0]);
        assert_eq!(strip[4], [4.0, 2.0, 0.0]);
        assert_eq!(strip[8], strip[0]);
    }

    #[test]
    fn test_floor_strips() {
        let (walls, top) = floor_strips(&[0.0, 0.0, 0.0], &[0.0, 0.0, 4.0]);
        assert_eq!(walls.len(), 10);
        assert_eq!(walls[4], [18.0, 18.0, 0.0]);
        assert_eq!(top, vec![[0.0, 0.0, 4.0], [0.0, 18.0, 4.0], [18.0, 0.0, 4.0], [18.0, 18.0, 4.0]]);
    }

    #[test]
    fn test_null_model_fans() {
        let (lower, upper) = null_model_fans();
        assert_eq!(lower.len(), 6);
        assert_eq!(upper.len(), 6);
        assert_eq!(lower[0], [0.0, 0.0, -16.0]);
        assert!(approx(lower[2], [0.0, 16.0, 0.0]));
        assert!(approx(upper[1], lower[5]));
    }

    #[test]
    fn test_selection_colors() {
        assert_eq!(selection_color(RenderFlags::MEMBER | RenderFlags::SELECTED), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(selection_color(RenderFlags::MEMBER), [0.0, 1.0, 0.0, 0.3]);
        assert_eq!(selection_color(RenderFlags::ALLIED), [0.0, 0.5, 1.0, 0.3]);
        assert_eq!(selection_color(RenderFlags::SELECTED), [0.0, 1.0, 0.0, 1.0]);
    }

    // ---------------------------------------------------------
    // Entity pass
    // ---------------------------------------------------------

    #[test]
    fn test_draw_entities_order() {
        let mut models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let model = soldier(&mut models);
        let refdef = RefDef { rdflags: RdFlags::NOWORLDMODEL, ..Default::default() };
        let settings = RenderSettings::default();
        let scene = EntityScene { models: &models, anims: &anims, refdef: &refdef, settings: &settings };

        let mut list = EntityList::new();
        list.add(Entity { flags: RenderFlags::HIGHLIGHT, ..Default::default() }).unwrap();
        list.add(Entity { model: Some(model), ..Default::default() }).unwrap();
        list.add(Entity { flags: RenderFlags::ARROW, ..Default::default() }).unwrap();

        let mut gl = GlState::new(CommandRecorder::new());
        gl.backend.clear();
        let mut ctx = RenderContext::new();
        draw_entities(&mut gl, &mut ctx, &mut [], &mut list, &scene, &mut AliasArrays::default()).unwrap();

        let cmds = &gl.backend.commands;
        let mesh = cmds.iter().position(|c| matches!(c, DrawCommand::Mesh { .. })).unwrap();
        let fan = cmds
            .iter()
            .position(|c| matches!(c, DrawCommand::Primitive(PrimitiveMode::TriangleFan, v) if v.len() == 4))
            .unwrap();
        let diamond = cmds
            .iter()
            .position(|c| matches!(c, DrawCommand::Primitive(PrimitiveMode::TriangleFan, v) if v.len() == 6))
            .unwrap();
        let highlight = cmds
            .iter()
            .position(|c| matches!(c, DrawCommand::Primitive(PrimitiveMode::Triangles, v) if v.len() == 18))
            .unwrap();

        assert!(mesh < fan && fan < diamond && diamond < highlight);
        assert_eq!(ctx.stats.entities_drawn, 3);
        assert!(!gl.blend_enabled());
        // no lighting toggles without a world
        assert!(!cmds.contains(&DrawCommand::Lighting(true)));
    }

    #[test]
    fn test_draw_entities_reports_ring() {
        let models = ModelRegistry::new();
        let anims = AnimStatePool::new();
        let refdef = RefDef::default();
        let settings = RenderSettings::default();
        let scene = EntityScene { models: &models, anims: &anims, refdef: &refdef, settings: &settings };

        let mut list = EntityList::new();
        list.add(Entity { tag_parent: Some(EntityId(0)), ..Default::default() }).unwrap();

        let mut gl = GlState::new(CommandRecorder::new());
        let mut ctx = RenderContext::new();
        assert!(matches!(
            draw_entities(&mut gl, &mut ctx, &mut [], &mut list, &scene, &mut AliasArrays::default()),
            Err(RenderError::TransformRing(EntityId(0)))
        ));
    }
}
