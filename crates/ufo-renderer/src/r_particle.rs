// r_particle.rs — particle list and drawing: sprites, beams, lines and circles

use std::f32::consts::PI;

use ufo_common::q_shared::{angle_vectors, cross_product, vector_add, vector_normalize, vector_scale, Vec2, Vec3, Vec4};

use crate::error::RenderError;
use crate::r_draw::{BlendMode, DrawBackend, GlState, PrimitiveMode, TextureUnit};
use crate::r_image::TextureHandle;
use crate::r_local::{RenderContext, MAX_PTLS};

/// Circle segments per unit of radius and half turn.
const CIRCLE_ACCURACY: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleStyle {
    /// Sprite that always faces the viewer.
    #[default]
    Facing,
    /// Sprite oriented by the particle's angles.
    Rotated,
    /// Sprite stretched along the angles' forward axis, turned to the viewer.
    Beam,
    Axis,
    /// Line from `origin` to `end`.
    Line,
    /// Flat circle around `origin`; `size` is radius and thickness.
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub origin: Vec3,
    /// Second point of a line.
    pub end: Vec3,
    pub angles: Vec3,
    /// Sprite width and height.
    pub size: Vec2,
    /// Sprite offset along its up and right vectors.
    pub offset: Vec2,
    pub color: Vec4,
    pub style: ParticleStyle,
    pub blend: BlendMode,
    /// Bit `n` shows the particle on level `n`; 0 shows it everywhere.
    pub level_flags: u32,
    pub invisible: bool,
    pub pic: Option<TextureHandle>,
    pub stipple: Option<u16>,
    /// A child sprite is placed relative to its parent.
    pub parent: Option<ParticleId>,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            end: [0.0; 3],
            angles: [0.0; 3],
            size: [1.0, 1.0],
            offset: [0.0, 0.0],
            color: [1.0; 4],
            style: ParticleStyle::Facing,
            blend: BlendMode::Blend,
            level_flags: 0,
            invisible: false,
            pic: None,
            stipple: None,
            parent: None,
        }
    }
}

impl Particle {
    pub fn visible_on(&self, level: usize) -> bool {
        if self.level_flags == 0 {
            return true;
        }
        1u32.checked_shl(level as u32).is_some_and(|bit| self.level_flags & bit != 0)
    }
}

/// The particles of the current frame, capped at `MAX_PTLS`.
#[derive(Debug)]
pub struct ParticleList {
    particles: Vec<Particle>,
}

impl Default for ParticleList {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleList {
    pub fn new() -> Self {
        Self { particles: Vec::with_capacity(MAX_PTLS) }
    }

    pub fn add(&mut self, particle: Particle) -> Result<ParticleId, RenderError> {
        if self.particles.len() >= MAX_PTLS {
            return Err(RenderError::TooManyParticles { max: MAX_PTLS });
        }
        self.particles.push(particle);
        Ok(ParticleId(self.particles.len() - 1))
    }

    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id.0)
    }

    pub fn get_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(id.0)
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }
}

// ============================================================
// Geometry
// ============================================================

fn normalized(v: &Vec3) -> Vec3 {
    let mut n = *v;
    vector_normalize(&mut n);
    n
}

fn add_scaled(a: &Vec3, scale: f32, b: &Vec3) -> Vec3 {
    vector_add(a, &vector_scale(b, scale))
}

/// Scaled right and up vectors of a sprite. Lines and circles have none.
pub fn sprite_vectors(p: &Particle, ctx: &RenderContext) -> Option<(Vec3, Vec3)> {
    let (right, up) = match p.style {
        ParticleStyle::Facing => (ctx.right, ctx.up),
        ParticleStyle::Rotated => {
            let (_, right, up) = angle_vectors(&p.angles);
            (right, up)
        }
        ParticleStyle::Beam | ParticleStyle::Axis => {
            let (right, _, _) = angle_vectors(&p.angles);
            (right, normalized(&cross_product(&right, &ctx.forward)))
        }
        ParticleStyle::Line | ParticleStyle::Circle => return None,
    };
    Some((vector_scale(&right, p.size[0]), vector_scale(&up, p.size[1])))
}

/// Corners of a sprite centred on its (offset) origin, in fan order.
pub fn sprite_corners(p: &Particle, parent: Option<&Particle>, ctx: &RenderContext) -> Option<[Vec3; 4]> {
    let base = parent.unwrap_or(p);
    let (mut right, mut up) = sprite_vectors(base, ctx)?;
    let nup = normalized(&up);
    let nright = normalized(&right);

    let mut pos = add_scaled(&base.origin, base.offset[0], &nup);
    pos = add_scaled(&pos, base.offset[1], &nright);

    if parent.is_some() {
        (right, up) = sprite_vectors(p, ctx)?;
        pos = add_scaled(&pos, p.offset[0], &nup);
        pos = add_scaled(&pos, p.offset[1], &nright);
    }

    pos = add_scaled(&pos, -0.5, &up);
    pos = add_scaled(&pos, -0.5, &right);

    let top = vector_add(&pos, &up);
    let top_right = vector_add(&top, &right);
    let bottom_right = vector_add(&pos, &right);
    Some([pos, top, top_right, bottom_right])
}

/// Thin circles are a line loop, thick ones a strip of quads.
pub fn circle_points(p: &Particle) -> Option<(PrimitiveMode, Vec<Vec3>)> {
    let radius = p.size[0];
    let thickness = p.size[1].trunc();
    if radius <= 0.0 {
        return None;
    }
    let inner = (radius - thickness).max(0.0);
    let step = PI / (radius * CIRCLE_ACCURACY);
    let at = |r: f32, theta: f32| [p.origin[0] + r * theta.cos(), p.origin[1] + r * theta.sin(), p.origin[2]];

    let segments = (2.0 * radius * CIRCLE_ACCURACY).ceil() as usize;
    if thickness <= 1.0 {
        let points = (0..segments).map(|i| at(radius, i as f32 * step)).collect();
        Some((PrimitiveMode::LineLoop, points))
    } else {
        let mut points = Vec::with_capacity((segments + 1) * 4);
        for i in 0..=segments {
            let theta = i as f32 * step;
            points.push(at(radius, theta));
            points.push(at(radius, theta - step));
            points.push(at(inner, theta - step));
            points.push(at(inner, theta));
        }
        Some((PrimitiveMode::TriangleStrip, points))
    }
}

// ============================================================
// Drawing
// ============================================================

fn draw_untextured<B: DrawBackend>(gl: &mut GlState<B>, p: &Particle, mode: PrimitiveMode, points: &[Vec3]) {
    gl.enable_texturing(false);
    gl.color(Some(p.color));
    if p.stipple.is_some() {
        gl.backend.set_line_stipple(p.stipple);
    }
    gl.backend.draw_primitive(mode, points);
    if p.stipple.is_some() {
        gl.backend.set_line_stipple(None);
    }
    gl.enable_texturing(true);
}

/// Draws every visible particle with its own blend mode. Blending must
/// already be enabled. Returns how many were drawn.
pub fn draw_particles<B: DrawBackend>(
    gl: &mut GlState<B>,
    ctx: &RenderContext,
    particles: &ParticleList,
    world_level: usize,
) -> usize {
    let mut drawn = 0;
    for p in particles.iter() {
        if p.invisible || !p.visible_on(world_level) {
            continue;
        }
        gl.blend_func(p.blend);

        match p.style {
            ParticleStyle::Line => draw_untextured(gl, p, PrimitiveMode::LineStrip, &[p.origin, p.end]),
            ParticleStyle::Circle => {
                if let Some((mode, points)) = circle_points(p) {
                    draw_untextured(gl, p, mode, &points);
                }
            }
            _ => {}
        }

        if let Some(pic) = p.pic {
            let parent = p.parent.and_then(|id| particles.get(id));
            if let Some(corners) = sprite_corners(p, parent, ctx) {
                gl.select_texture(TextureUnit::Diffuse);
                gl.bind_texture(pic);
                gl.color(Some(p.color));
                gl.backend.draw_sprite(&corners);
            }
        }
        drawn += 1;
    }

    gl.blend_func(BlendMode::Blend);
    gl.color(None);
    drawn
}
