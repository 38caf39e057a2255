// r_surface.rs — render pass classification, per-frame surface buckets and bucket drawing

use ufo_common::q_shared::{SURF_ALPHATEST, SURF_TRANS33, SURF_TRANS66, SURF_WARP};

use crate::r_draw::{DrawBackend, GlState, PolygonMode, TextureUnit};
use crate::r_local::RenderStats;
use crate::r_model_types::BspModel;

/// The render pass a surface is drawn in. Decided once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfacePass {
    #[default]
    Opaque,
    OpaqueWarp,
    AlphaTest,
    Blend,
    BlendWarp,
    Material,
}

impl SurfacePass {
    pub const COUNT: usize = 6;

    pub const ALL: [SurfacePass; SurfacePass::COUNT] = [
        SurfacePass::Opaque,
        SurfacePass::OpaqueWarp,
        SurfacePass::AlphaTest,
        SurfacePass::Blend,
        SurfacePass::BlendWarp,
        SurfacePass::Material,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Maps texinfo surface flags to a pass. Material shaders win over
    /// everything, then blending, then warping, then alpha testing.
    pub fn classify(surface_flags: i32, has_material: bool) -> SurfacePass {
        let warp = surface_flags & SURF_WARP != 0;
        if has_material {
            SurfacePass::Material
        } else if surface_flags & (SURF_TRANS33 | SURF_TRANS66) != 0 {
            if warp {
                SurfacePass::BlendWarp
            } else {
                SurfacePass::Blend
            }
        } else if warp {
            SurfacePass::OpaqueWarp
        } else if surface_flags & SURF_ALPHATEST != 0 {
            SurfacePass::AlphaTest
        } else {
            SurfacePass::Opaque
        }
    }

    pub fn is_blended(self) -> bool {
        matches!(self, SurfacePass::Blend | SurfacePass::BlendWarp | SurfacePass::Material)
    }
}

/// A surface of one map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRef {
    pub tile: usize,
    pub surface: usize,
}

/// One growable list per pass. Cleared (not freed) at frame start.
#[derive(Debug, Default, Clone)]
pub struct SurfaceBuckets {
    lists: [Vec<SurfaceRef>; SurfacePass::COUNT],
}

impl SurfaceBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    pub fn push(&mut self, pass: SurfacePass, surface: SurfaceRef) {
        self.lists[pass.index()].push(surface);
    }

    pub fn get(&self, pass: SurfacePass) -> &[SurfaceRef] {
        &self.lists[pass.index()]
    }

    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn counts(&self) -> [usize; SurfacePass::COUNT] {
        let mut counts = [0; SurfacePass::COUNT];
        for (count, list) in counts.iter_mut().zip(&self.lists) {
            *count = list.len();
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }
}

// ============================================================
// Drawing
// ============================================================

/// Draws a list of surfaces with their diffuse texture and lightmap page.
pub fn draw_surfaces<B: DrawBackend>(
    gl: &mut GlState<B>,
    tiles: &[BspModel],
    pass: SurfacePass,
    list: &[SurfaceRef],
    stats: &mut RenderStats,
) {
    for r in list {
        let Some(surf) = tiles.get(r.tile).and_then(|t| t.surfaces.get(r.surface)) else {
            continue;
        };
        let Some(texinfo) = tiles[r.tile].texinfo.get(surf.texinfo) else {
            continue;
        };

        gl.bind_texture(texinfo.image.handle);
        if let Some(rect) = surf.lightmap {
            gl.select_texture(TextureUnit::Lightmap);
            gl.bind_lightmap(rect.page);
            gl.select_texture(TextureUnit::Diffuse);
        }

        gl.backend.draw_surface(pass, r.tile, surf.first_vertex, surf.num_vertices);
        stats.brush_count += 1;
    }
}

/// Draws one bucket with the blend state its pass requires.
pub fn draw_bucket<B: DrawBackend>(
    gl: &mut GlState<B>,
    tiles: &[BspModel],
    buckets: &SurfaceBuckets,
    pass: SurfacePass,
    wire: bool,
    stats: &mut RenderStats,
) {
    let list = buckets.get(pass);
    if list.is_empty() {
        return;
    }

    gl.enable_blend(pass.is_blended());
    if wire {
        gl.polygon_mode(PolygonMode::Line);
    }

    draw_surfaces(gl, tiles, pass, list, stats);

    if wire {
        gl.polygon_mode(PolygonMode::Fill);
    }
}
