// r_main.rs — renderer state, map loading and the per-frame render loop

use image::RgbaImage;
use ufo_common::cvar::CvarContext;
use ufo_common::q_shared::Vec3;

use crate::error::RenderError;
use crate::r_bsp::{get_level_surface_lists, setup_frustum};
use crate::r_draw::{DrawBackend, GlState};
use crate::r_entity::{draw_entities, Entity, EntityId, EntityList, EntityScene};
use crate::r_image::{calc_day_and_night, filter_texture, ColorFilter, ImageKind, TextureProvider};
use crate::r_lightmap::{light_point, BrushTraceTarget, LightmapAtlas, LightmapBuilder, LightmapSettings};
use crate::r_local::{RdFlags, RefDef, RenderContext, RenderSettings, RenderStats};
use crate::r_model::{FileSource, ModelRegistry};
use crate::r_model_alias::{AnimState, AnimStateId, AnimStatePool};
use crate::r_model_brush::load_map_tile;
use crate::r_model_types::{AliasArrays, BspModel, ModelId, ModelKind};
use crate::r_particle::{draw_particles, Particle, ParticleId, ParticleList};
use crate::r_surface::{draw_bucket, SurfacePass};

/// One tile of a (possibly assembled) map.
#[derive(Debug, Clone, Copy)]
pub struct MapTileSource<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    /// World offset of the tile.
    pub shift: Vec3,
}

pub struct Renderer<B: DrawBackend> {
    gl: GlState<B>,
    cvars: CvarContext,
    settings: RenderSettings,
    ctx: RenderContext,
    tiles: Vec<BspModel>,
    atlas: LightmapAtlas,
    models: ModelRegistry,
    anims: AnimStatePool,
    entities: EntityList,
    particles: ParticleList,
    scratch: AliasArrays,
}

impl<B: DrawBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        let mut cvars = CvarContext::new();
        RenderSettings::register_cvars(&mut cvars);
        RenderSettings::check_variables(&mut cvars);
        let settings = RenderSettings::from_cvars(&cvars);

        Self {
            gl: GlState::new(backend),
            cvars,
            settings,
            ctx: RenderContext::new(),
            tiles: Vec::new(),
            atlas: LightmapAtlas::default(),
            models: ModelRegistry::new(),
            anims: AnimStatePool::new(),
            entities: EntityList::new(),
            particles: ParticleList::new(),
            scratch: AliasArrays::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.gl.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.gl.backend
    }

    pub fn cvars(&self) -> &CvarContext {
        &self.cvars
    }

    pub fn cvars_mut(&mut self) -> &mut CvarContext {
        &mut self.cvars
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn stats(&self) -> &RenderStats {
        &self.ctx.stats
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn tiles(&self) -> &[BspModel] {
        &self.tiles
    }

    pub fn atlas(&self) -> &LightmapAtlas {
        &self.atlas
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    // ============================================================
    // Map loading
    // ============================================================

    /// Loads all tiles of a map into one lightmap atlas. On failure the
    /// previous map stays in place.
    pub fn load_map(
        &mut self,
        sources: &[MapTileSource<'_>],
        day: bool,
        textures: &mut dyn TextureProvider,
    ) -> Result<(), RenderError> {
        self.cvars.get_latched_vars();
        RenderSettings::check_variables(&mut self.cvars);
        self.settings = RenderSettings::from_cvars(&self.cvars);
        let lm_settings = LightmapSettings::from(&self.settings);

        let mut lightmaps = LightmapBuilder::begin(lm_settings.size);
        let mut tiles = Vec::with_capacity(sources.len());
        for src in sources {
            let tile = load_map_tile(src.name, src.data, day, src.shift, textures, &mut lightmaps, &lm_settings)?;
            log::info!(
                "loaded map tile {}: {} surfaces, {} nodes, {} submodels",
                src.name,
                tile.surfaces.len(),
                tile.nodes.len(),
                tile.submodels.len()
            );
            tiles.push(tile);
        }
        let atlas = lightmaps.end();
        log::info!(
            "lightmaps: {} page(s) of {}x{}, {:.1}% used",
            atlas.page_count(),
            atlas.size,
            atlas.size,
            atlas.utilization() * 100.0
        );

        self.models.clear();
        self.anims.clear();
        self.entities.clear();
        self.particles.clear();

        for (i, tile) in tiles.iter().enumerate() {
            self.models.register_inline_models(i, tile);
            self.gl.backend.upload_tile_vertices(i, &tile.vertices);
        }
        for (i, page) in atlas.pages.iter().enumerate() {
            self.gl.backend.upload_lightmap_page(i, page);
        }
        for (i, page) in atlas.deluxe_pages.iter().enumerate() {
            self.gl.backend.upload_deluxemap_page(i, page);
        }
        self.gl.invalidate_bindings();

        self.ctx.stats.lightmap_pages = atlas.page_count();
        self.ctx.stats.lightmap_utilization = atlas.utilization();
        self.tiles = tiles;
        self.atlas = atlas;
        Ok(())
    }

    // ============================================================
    // Models and animation
    // ============================================================

    pub fn register_model(
        &mut self,
        name: &str,
        files: &dyn FileSource,
        textures: &mut dyn TextureProvider,
    ) -> Option<ModelId> {
        self.models.register_model(name, files, textures)
    }

    /// A fresh animation state for one entity instance of `model`.
    pub fn create_anim_state(&mut self, model: ModelId) -> Result<AnimStateId, RenderError> {
        if self.models.get(model).is_none() {
            return Err(RenderError::UnknownModel(model.0));
        }
        Ok(self.anims.create(model))
    }

    pub fn release_anim_state(&mut self, id: AnimStateId) {
        self.anims.release(id);
    }

    pub fn anim_state(&self, id: AnimStateId) -> Option<&AnimState> {
        self.anims.get(id).map(|(_, s)| s)
    }

    pub fn change_anim(&mut self, id: AnimStateId, anim: &str) -> Result<(), RenderError> {
        let (model, state) = self.anims.get_mut(id).ok_or(RenderError::UnknownAnimState(id.0))?;
        let model = self.models.get(model).ok_or(RenderError::UnknownModel(model.0))?;
        let alias = model.alias().ok_or_else(|| RenderError::NoAnimations(model.name.clone()))?;
        state.change(&model.name, alias, anim)
    }

    pub fn append_anim(&mut self, id: AnimStateId, anim: &str) -> Result<(), RenderError> {
        let (model, state) = self.anims.get_mut(id).ok_or(RenderError::UnknownAnimState(id.0))?;
        let model = self.models.get(model).ok_or(RenderError::UnknownModel(model.0))?;
        let alias = model.alias().ok_or_else(|| RenderError::NoAnimations(model.name.clone()))?;
        state.append(&model.name, alias, anim)
    }

    /// Name of the running sequence.
    pub fn anim_name(&self, id: AnimStateId) -> Option<&str> {
        let (model, state) = self.anims.get(id)?;
        state.current_name(self.models.get(model)?.alias()?)
    }

    // ============================================================
    // Scene
    // ============================================================

    pub fn add_entity(&mut self, entity: Entity) -> Result<EntityId, RenderError> {
        self.entities.add(entity)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn add_particle(&mut self, particle: Particle) -> Result<ParticleId, RenderError> {
        self.particles.add(particle)
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(id)
    }

    /// Drops the entities and particles of the last frame.
    pub fn clear_scene(&mut self) {
        self.entities.clear();
        self.particles.clear();
    }

    /// Static light below `point`, including the brush entities of the scene.
    pub fn light_point(&self, point: &Vec3) -> Vec3 {
        let targets: Vec<BrushTraceTarget> = self
            .entities
            .iter()
            .filter_map(|(_, e)| match self.models.get(e.model?)?.kind {
                ModelKind::BrushSubmodel { tile, submodel } => Some(BrushTraceTarget { tile, submodel, origin: e.origin }),
                ModelKind::Alias(_) => None,
            })
            .collect();
        light_point(&self.tiles, &targets, point)
    }

    /// Regenerates and uploads the day/night overlay for sun angle `q`.
    pub fn update_day_night(&mut self, q: f32) {
        let image = calc_day_and_night(q);
        self.gl.backend.upload_day_night(&image);
    }

    /// Applies the current brightness/contrast/monochrome/invert settings to
    /// a decoded image before upload. Returns its average colour.
    pub fn filter_image(&self, image: &mut RgbaImage, kind: ImageKind) -> Vec3 {
        filter_texture(image, kind, &ColorFilter::from(&self.settings))
    }

    // ============================================================
    // Frame
    // ============================================================

    /// Renders one frame and leaves the GPU in its default state.
    pub fn render_frame(&mut self, refdef: &RefDef, msec: f32) -> Result<(), RenderError> {
        RenderSettings::check_variables(&mut self.cvars);
        self.settings = RenderSettings::from_cvars(&self.cvars);
        self.ctx.stats.reset_frame();

        self.anims.advance_all(&self.models, msec);

        setup_frustum(&mut self.ctx, refdef, &self.settings);
        self.entities.invalidate_transforms();

        let noworld = refdef.rdflags.contains(RdFlags::NOWORLDMODEL);
        let walk = RenderSettings {
            draw_world: self.settings.draw_world && !noworld,
            ..self.settings.clone()
        };
        get_level_surface_lists(&mut self.ctx, &mut self.tiles, refdef.world_level, &walk);

        let result = self.draw_frame(refdef);
        self.gl.restore_default_state();
        result
    }

    fn draw_world_passes(&mut self, passes: &[SurfacePass]) {
        for &pass in passes {
            draw_bucket(&mut self.gl, &self.tiles, &self.ctx.buckets, pass, self.settings.wire, &mut self.ctx.stats);
        }
        self.gl.enable_blend(false);
    }

    fn draw_frame(&mut self, refdef: &RefDef) -> Result<(), RenderError> {
        self.draw_world_passes(&[SurfacePass::Opaque, SurfacePass::OpaqueWarp]);

        let scene = EntityScene {
            models: &self.models,
            anims: &self.anims,
            refdef,
            settings: &self.settings,
        };
        draw_entities(
            &mut self.gl,
            &mut self.ctx,
            &mut self.tiles,
            &mut self.entities,
            &scene,
            &mut self.scratch,
        )?;

        self.draw_world_passes(&[
            SurfacePass::AlphaTest,
            SurfacePass::Material,
            SurfacePass::Blend,
            SurfacePass::BlendWarp,
        ]);

        if !self.particles.is_empty() {
            self.gl.enable_blend(true);
            self.ctx.stats.particles_drawn += draw_particles(&mut self.gl, &self.ctx, &self.particles, refdef.world_level);
            self.gl.enable_blend(false);
        }
        Ok(())
    }
}
