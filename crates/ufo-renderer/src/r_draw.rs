// r_draw.rs — draw backend seam, recorded command stream and GPU state tracking

use image::{GrayImage, RgbaImage};
use ufo_common::q_shared::{Mat4, Vec3, Vec4};

use crate::r_image::TextureHandle;
use crate::r_model_types::{AliasArrays, BspVertex};
use crate::r_surface::SurfacePass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUnit {
    Diffuse,
    Lightmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleFan,
    TriangleStrip,
}

/// Framebuffer blend equation for particles and effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Texture replaces the fragment colour.
    Replace,
    /// src alpha, one minus src alpha
    #[default]
    Blend,
    /// one, one
    Add,
    /// zero, src colour
    Filter,
    /// zero, one minus src colour
    InvFilter,
}

// ============================================================
// Backend trait
// ============================================================

/// Everything the core asks of the GPU. Implementations own the real
/// textures, buffers and pipelines; the core only produces calls.
pub trait DrawBackend {
    fn set_blend(&mut self, enabled: bool);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_lighting(&mut self, enabled: bool);
    fn set_texturing(&mut self, enabled: bool);
    fn set_polygon_mode(&mut self, mode: PolygonMode);
    fn select_texture_unit(&mut self, unit: TextureUnit);
    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle);
    /// Binds lightmap page `page` together with its deluxemap page.
    fn bind_lightmap(&mut self, page: usize);
    fn set_blend_func(&mut self, mode: BlendMode);
    /// `None` draws solid lines.
    fn set_line_stipple(&mut self, pattern: Option<u16>);
    /// `None` restores the default white colour.
    fn set_color(&mut self, color: Option<Vec4>);
    fn push_matrix(&mut self, matrix: &Mat4);
    fn pop_matrix(&mut self);

    /// Draws one surface out of a tile's uploaded vertex array.
    fn draw_surface(&mut self, pass: SurfacePass, tile: usize, first_vertex: usize, num_vertices: usize);
    /// Draws non-indexed triangles from flat streams.
    fn draw_mesh(&mut self, arrays: &AliasArrays);
    fn draw_primitive(&mut self, mode: PrimitiveMode, vertices: &[Vec3]);
    /// Textured quad; corners get texcoords (0,0) (0,1) (1,1) (1,0) in order.
    fn draw_sprite(&mut self, corners: &[Vec3; 4]);

    fn upload_lightmap_page(&mut self, page: usize, image: &RgbaImage);
    fn upload_deluxemap_page(&mut self, page: usize, image: &RgbaImage);
    fn upload_day_night(&mut self, image: &GrayImage);
    fn upload_tile_vertices(&mut self, tile: usize, vertices: &[BspVertex]);
}

// ============================================================
// Recording backend
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Blend(bool),
    DepthTest(bool),
    Lighting(bool),
    Texturing(bool),
    PolygonMode(PolygonMode),
    SelectTextureUnit(TextureUnit),
    BindTexture(TextureUnit, TextureHandle),
    BindLightmap(usize),
    BlendFunc(BlendMode),
    LineStipple(Option<u16>),
    Color(Option<Vec4>),
    PushMatrix(Mat4),
    PopMatrix,
    Surface {
        pass: SurfacePass,
        tile: usize,
        first_vertex: usize,
        num_vertices: usize,
    },
    Mesh {
        vertices: Vec<Vec3>,
        normals: Vec<Vec3>,
        texcoords: Vec<[f32; 2]>,
    },
    Primitive(PrimitiveMode, Vec<Vec3>),
    Sprite([Vec3; 4]),
    UploadLightmap { page: usize, width: u32, height: u32 },
    UploadDeluxemap { page: usize, width: u32, height: u32 },
    UploadDayNight { width: u32, height: u32 },
    UploadTileVertices { tile: usize, count: usize },
}

/// Backend that records every call; used by tools and tests.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    pub commands: Vec<DrawCommand>,
    /// Bytes of vertex data handed over by tile uploads.
    pub uploaded_vertex_bytes: usize,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Surfaces drawn, in order.
    pub fn surfaces(&self) -> Vec<(SurfacePass, usize, usize)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Surface { pass, tile, first_vertex, .. } => Some((*pass, *tile, *first_vertex)),
                _ => None,
            })
            .collect()
    }
}

impl DrawBackend for CommandRecorder {
    fn set_blend(&mut self, enabled: bool) {
        self.commands.push(DrawCommand::Blend(enabled));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.commands.push(DrawCommand::DepthTest(enabled));
    }

    fn set_lighting(&mut self, enabled: bool) {
        self.commands.push(DrawCommand::Lighting(enabled));
    }

    fn set_texturing(&mut self, enabled: bool) {
        self.commands.push(DrawCommand::Texturing(enabled));
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.commands.push(DrawCommand::PolygonMode(mode));
    }

    fn select_texture_unit(&mut self, unit: TextureUnit) {
        self.commands.push(DrawCommand::SelectTextureUnit(unit));
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle) {
        self.commands.push(DrawCommand::BindTexture(unit, texture));
    }

    fn bind_lightmap(&mut self, page: usize) {
        self.commands.push(DrawCommand::BindLightmap(page));
    }

    fn set_blend_func(&mut self, mode: BlendMode) {
        self.commands.push(DrawCommand::BlendFunc(mode));
    }

    fn set_line_stipple(&mut self, pattern: Option<u16>) {
        self.commands.push(DrawCommand::LineStipple(pattern));
    }

    fn set_color(&mut self, color: Option<Vec4>) {
        self.commands.push(DrawCommand::Color(color));
    }

    fn push_matrix(&mut self, matrix: &Mat4) {
        self.commands.push(DrawCommand::PushMatrix(*matrix));
    }

    fn pop_matrix(&mut self) {
        self.commands.push(DrawCommand::PopMatrix);
    }

    fn draw_surface(&mut self, pass: SurfacePass, tile: usize, first_vertex: usize, num_vertices: usize) {
        self.commands.push(DrawCommand::Surface { pass, tile, first_vertex, num_vertices });
    }

    fn draw_mesh(&mut self, arrays: &AliasArrays) {
        self.commands.push(DrawCommand::Mesh {
            vertices: arrays.vertices.clone(),
            normals: arrays.normals.clone(),
            texcoords: arrays.texcoords.clone(),
        });
    }

    fn draw_primitive(&mut self, mode: PrimitiveMode, vertices: &[Vec3]) {
        self.commands.push(DrawCommand::Primitive(mode, vertices.to_vec()));
    }

    fn draw_sprite(&mut self, corners: &[Vec3; 4]) {
        self.commands.push(DrawCommand::Sprite(*corners));
    }

    fn upload_lightmap_page(&mut self, page: usize, image: &RgbaImage) {
        self.commands.push(DrawCommand::UploadLightmap {
            page,
            width: image.width(),
            height: image.height(),
        });
    }

    fn upload_deluxemap_page(&mut self, page: usize, image: &RgbaImage) {
        self.commands.push(DrawCommand::UploadDeluxemap {
            page,
            width: image.width(),
            height: image.height(),
        });
    }

    fn upload_day_night(&mut self, image: &GrayImage) {
        self.commands.push(DrawCommand::UploadDayNight {
            width: image.width(),
            height: image.height(),
        });
    }

    fn upload_tile_vertices(&mut self, tile: usize, vertices: &[BspVertex]) {
        self.uploaded_vertex_bytes += bytemuck::cast_slice::<BspVertex, u8>(vertices).len();
        self.commands.push(DrawCommand::UploadTileVertices { tile, count: vertices.len() });
    }
}

// ============================================================
// State tracking
// ============================================================

/// Wraps a backend and filters redundant state transitions.
pub struct GlState<B> {
    pub backend: B,
    blend_enabled: bool,
    blend_func: BlendMode,
    depth_test: bool,
    lighting: bool,
    texturing: bool,
    polygon_mode: PolygonMode,
    active_unit: TextureUnit,
    bound: [Option<TextureHandle>; 2],
    lightmap: Option<usize>,
    color: Option<Vec4>,
}

fn unit_index(unit: TextureUnit) -> usize {
    match unit {
        TextureUnit::Diffuse => 0,
        TextureUnit::Lightmap => 1,
    }
}

impl<B: DrawBackend> GlState<B> {
    pub fn new(backend: B) -> Self {
        let mut state = Self {
            backend,
            blend_enabled: false,
            blend_func: BlendMode::Blend,
            depth_test: true,
            lighting: false,
            texturing: true,
            polygon_mode: PolygonMode::Fill,
            active_unit: TextureUnit::Diffuse,
            bound: [None, None],
            lightmap: None,
            color: None,
        };
        state.set_default_state();
        state
    }

    /// Forces every tracked state to its default, emitting all of them.
    pub fn set_default_state(&mut self) {
        self.blend_enabled = false;
        self.blend_func = BlendMode::Blend;
        self.depth_test = true;
        self.lighting = false;
        self.texturing = true;
        self.polygon_mode = PolygonMode::Fill;
        self.active_unit = TextureUnit::Diffuse;
        self.color = None;

        self.backend.set_blend(false);
        self.backend.set_blend_func(BlendMode::Blend);
        self.backend.set_depth_test(true);
        self.backend.set_lighting(false);
        self.backend.set_texturing(true);
        self.backend.set_polygon_mode(PolygonMode::Fill);
        self.backend.select_texture_unit(TextureUnit::Diffuse);
        self.backend.set_color(None);
    }

    /// Returns to the defaults, emitting only what differs.
    pub fn restore_default_state(&mut self) {
        self.enable_blend(false);
        self.blend_func(BlendMode::Blend);
        self.enable_depth_test(true);
        self.enable_lighting(false);
        self.enable_texturing(true);
        self.polygon_mode(PolygonMode::Fill);
        self.select_texture(TextureUnit::Diffuse);
        self.color(None);
    }

    pub fn blend_enabled(&self) -> bool {
        self.blend_enabled
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.depth_test
    }

    pub fn lighting_enabled(&self) -> bool {
        self.lighting
    }

    pub fn enable_blend(&mut self, enable: bool) {
        if self.blend_enabled == enable {
            return;
        }
        self.blend_enabled = enable;
        self.backend.set_blend(enable);
    }

    pub fn blend_func(&mut self, mode: BlendMode) {
        if self.blend_func == mode {
            return;
        }
        self.blend_func = mode;
        self.backend.set_blend_func(mode);
    }

    pub fn enable_depth_test(&mut self, enable: bool) {
        if self.depth_test == enable {
            return;
        }
        self.depth_test = enable;
        self.backend.set_depth_test(enable);
    }

    pub fn enable_lighting(&mut self, enable: bool) {
        if self.lighting == enable {
            return;
        }
        self.lighting = enable;
        self.backend.set_lighting(enable);
    }

    pub fn enable_texturing(&mut self, enable: bool) {
        if self.texturing == enable {
            return;
        }
        self.texturing = enable;
        self.backend.set_texturing(enable);
    }

    pub fn polygon_mode(&mut self, mode: PolygonMode) {
        if self.polygon_mode == mode {
            return;
        }
        self.polygon_mode = mode;
        self.backend.set_polygon_mode(mode);
    }

    pub fn select_texture(&mut self, unit: TextureUnit) {
        if self.active_unit == unit {
            return;
        }
        self.active_unit = unit;
        self.backend.select_texture_unit(unit);
    }

    pub fn bind_texture(&mut self, texture: TextureHandle) {
        let slot = &mut self.bound[unit_index(self.active_unit)];
        if *slot == Some(texture) {
            return;
        }
        *slot = Some(texture);
        self.backend.bind_texture(self.active_unit, texture);
    }

    pub fn bind_lightmap(&mut self, page: usize) {
        if self.lightmap == Some(page) {
            return;
        }
        self.lightmap = Some(page);
        self.backend.bind_lightmap(page);
    }

    pub fn color(&mut self, color: Option<Vec4>) {
        if self.color == color {
            return;
        }
        self.color = color;
        self.backend.set_color(color);
    }

    /// Forget cached bindings, e.g. after textures were re-uploaded.
    pub fn invalidate_bindings(&mut self) {
        self.bound = [None, None];
        self.lightmap = None;
    }
}
