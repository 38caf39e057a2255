// r_local.rs — renderer-wide settings, view definition and counters

use bitflags::bitflags;
use ufo_common::cvar::{CvarContext, CVAR_ARCHIVE, CVAR_LATCH};
use ufo_common::q_shared::Vec3;

use crate::r_bsp::Frustum;
use crate::r_surface::SurfaceBuckets;

// ============================================================
// Limits
// ============================================================

pub const MAX_ENTITIES: usize = 512;
pub const MAX_PTLS: usize = 2048;
pub const MAX_LIGHTMAP_PAGES: usize = 256;

/// Largest lightmap page edge in texels.
pub const LIGHTMAP_BLOCK_WIDTH: usize = 4096;
pub const LIGHTMAP_MIN_WIDTH: usize = 128;
pub const LIGHTMAP_DEFAULT_WIDTH: usize = 2048;

/// Bytes per texel in the atlas pages.
pub const LIGHTMAP_BLOCK_BYTES: usize = 4;
/// Bytes per texel in the map file and the per-surface cache.
pub const LIGHTMAP_BYTES: usize = 3;
/// Bytes per texel in the deluxemap pages.
pub const DELUXEMAP_BLOCK_BYTES: usize = 4;
/// Bytes per light direction in directional samples.
pub const DELUXEMAP_BYTES: usize = 3;

pub const PLAYER_WIDTH: f32 = 9.0;

// ============================================================
// View definition
// ============================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RdFlags: u32 {
        /// Sequence or menu rendering: no world, no entity culling.
        const NOWORLDMODEL = 1 << 0;
    }
}

/// What to draw this frame and from where.
#[derive(Debug, Clone, PartialEq)]
pub struct RefDef {
    pub width: u32,
    pub height: u32,
    pub fov_x: f32,
    pub fov_y: f32,
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    /// Seconds since client start, used for pulsing effects.
    pub time: f32,
    pub rdflags: RdFlags,
    /// Highest visible gameplay level (0-based).
    pub world_level: usize,
}

impl Default for RefDef {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            fov_x: 90.0,
            fov_y: 73.74,
            vieworg: [0.0; 3],
            viewangles: [0.0; 3],
            time: 0.0,
            rdflags: RdFlags::empty(),
            world_level: 0,
        }
    }
}

// ============================================================
// Settings
// ============================================================

/// Snapshot of the renderer cvars, taken once per frame and once per map load.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub nocull: bool,
    pub draw_world: bool,
    pub draw_entities: bool,
    pub draw_special_brushes: bool,
    pub isometric: bool,
    pub max_lightmap: usize,
    pub modulate: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub monochrome: i32,
    pub invert: i32,
    pub soften: bool,
    pub show_box: bool,
    pub wire: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            nocull: false,
            draw_world: true,
            draw_entities: true,
            draw_special_brushes: false,
            isometric: false,
            max_lightmap: LIGHTMAP_DEFAULT_WIDTH,
            modulate: 1.0,
            brightness: 1.0,
            contrast: 1.0,
            monochrome: 0,
            invert: 0,
            soften: true,
            show_box: false,
            wire: false,
        }
    }
}

impl RenderSettings {
    pub fn register_cvars(cvars: &mut CvarContext) {
        cvars.register("r_nocull", "0", 0);
        cvars.register("r_drawworld", "1", 0);
        cvars.register("r_drawentities", "1", 0);
        cvars.register("r_drawspecialbrushes", "0", 0);
        cvars.register("r_isometric", "0", CVAR_ARCHIVE);
        cvars.register("r_maxlightmap", &LIGHTMAP_DEFAULT_WIDTH.to_string(), CVAR_ARCHIVE | CVAR_LATCH);
        cvars.register("r_modulate", "1.0", CVAR_ARCHIVE);
        cvars.register("r_brightness", "1.0", CVAR_ARCHIVE);
        cvars.register("r_contrast", "1.0", CVAR_ARCHIVE);
        cvars.register("r_monochrome", "0", CVAR_ARCHIVE);
        cvars.register("r_invert", "0", CVAR_ARCHIVE);
        cvars.register("r_soften", "1", CVAR_ARCHIVE);
        cvars.register("r_showbox", "0", 0);
        cvars.register("r_wire", "0", 0);
    }

    /// Resets cvars holding values the renderer cannot use.
    pub fn check_variables(cvars: &mut CvarContext) {
        let size = cvars.variable_integer("r_maxlightmap");
        let valid = size > 0
            && (size as usize).is_power_of_two()
            && (LIGHTMAP_MIN_WIDTH..=LIGHTMAP_BLOCK_WIDTH).contains(&(size as usize));
        if !valid {
            log::warn!(
                "r_maxlightmap {} is not a power of two in {}..={}, resetting to {}",
                size,
                LIGHTMAP_MIN_WIDTH,
                LIGHTMAP_BLOCK_WIDTH,
                LIGHTMAP_DEFAULT_WIDTH
            );
            cvars.force_set("r_maxlightmap", &LIGHTMAP_DEFAULT_WIDTH.to_string());
        }
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let flag = |name: &str| cvars.variable_integer(name) != 0;
        Self {
            nocull: flag("r_nocull"),
            draw_world: flag("r_drawworld"),
            draw_entities: flag("r_drawentities"),
            draw_special_brushes: flag("r_drawspecialbrushes"),
            isometric: flag("r_isometric"),
            max_lightmap: cvars.variable_integer("r_maxlightmap").max(0) as usize,
            modulate: cvars.variable_value("r_modulate"),
            brightness: cvars.variable_value("r_brightness"),
            contrast: cvars.variable_value("r_contrast"),
            monochrome: cvars.variable_integer("r_monochrome"),
            invert: cvars.variable_integer("r_invert"),
            soften: flag("r_soften"),
            show_box: flag("r_showbox"),
            wire: flag("r_wire"),
        }
    }
}

// ============================================================
// Counters
// ============================================================

/// Read-only introspection counters for HUD and console overlays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// Surfaces per bucket in `SurfacePass::ALL` order.
    pub bucket_surfaces: [usize; 6],
    pub brush_count: usize,
    pub alias_count: usize,
    pub entities_drawn: usize,
    pub entities_culled: usize,
    pub particles_drawn: usize,
    pub lightmap_pages: usize,
    /// Fraction of atlas texels covered by lightmap blocks.
    pub lightmap_utilization: f32,
}

impl RenderStats {
    pub fn visible_surfaces(&self) -> usize {
        self.bucket_surfaces.iter().sum()
    }

    /// Clears the per-frame counters, keeping the load-time atlas figures.
    pub fn reset_frame(&mut self) {
        let pages = self.lightmap_pages;
        let utilization = self.lightmap_utilization;
        *self = Self::default();
        self.lightmap_pages = pages;
        self.lightmap_utilization = utilization;
    }
}

// ============================================================
// Per-frame context
// ============================================================

/// State shared by every stage of one frame. Created once, its fields are
/// reset at frame start and never mid-frame.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Visibility stamp; surfaces with `frame == this` are visible.
    pub frame: u64,
    pub frustum: Frustum,
    pub vieworg: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub nocull: bool,
    pub isometric: bool,
    pub buckets: SurfaceBuckets,
    pub stats: RenderStats,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }
}
