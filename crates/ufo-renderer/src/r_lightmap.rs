// r_lightmap.rs — lightmap and deluxemap block building, skyline atlas packing and point light sampling

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use ufo_common::q_shared::{Vec3, NUM_REGULAR_MODELS, PLANE_X, PLANE_Y, PLANE_Z};

use crate::error::LightmapError;
use crate::r_image::{filter_texture, soften_texture, ColorFilter, ImageKind};
use crate::r_local::{
    RenderSettings, DELUXEMAP_BLOCK_BYTES, DELUXEMAP_BYTES, LIGHTMAP_BLOCK_BYTES, LIGHTMAP_BYTES, MAX_LIGHTMAP_PAGES,
};
use crate::r_model_types::{BspModel, MSurfFlags, NodeKind};
use crate::r_surface::SurfacePass;

/// Blocks bigger than this many texels get softened.
const SOFTEN_MIN_TEXELS: usize = 1024;
const SOFTEN_PASSES: usize = 4;

/// Tiles with more lightmapped surfaces than this build their blocks in parallel.
pub const PARALLEL_BLOCK_THRESHOLD: usize = 64;

/// Depth of the downward light trace.
const LIGHT_TRACE_DEPTH: f32 = 256.0;

/// Deluxemap texel for light straight along the surface normal.
pub const FLAT_DIRECTION: Rgba<u8> = Rgba([127, 127, 255, 255]);

/// Where a surface's block ended up in the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightmapRect {
    pub page: usize,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

// ============================================================
// Skyline packer
// ============================================================

/// Per-column lowest free row of the page being filled.
#[derive(Debug, Clone)]
pub struct LightmapPacker {
    size: usize,
    allocated: Vec<usize>,
}

impl LightmapPacker {
    pub fn new(size: usize) -> Self {
        Self { size, allocated: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Finds the lowest spot for a `w`x`h` block, earliest column on ties.
    /// `Ok(None)` means the page is full for this block.
    pub fn alloc_block(&mut self, w: usize, h: usize) -> Result<Option<(usize, usize)>, LightmapError> {
        if w == 0 || h == 0 {
            return Err(LightmapError::InvalidBlock { width: w, height: h });
        }
        if w > self.size || h > self.size {
            return Ok(None);
        }

        let mut best = self.size;
        let mut spot = None;

        for x in 0..=self.size - w {
            let mut best2 = 0;
            let mut fits = true;
            for &column in &self.allocated[x..x + w] {
                if column >= best {
                    fits = false;
                    break;
                }
                best2 = best2.max(column);
            }
            if fits {
                spot = Some(x);
                best = best2;
            }
        }

        let Some(x) = spot else {
            return Ok(None);
        };
        if best + h > self.size {
            return Ok(None);
        }

        for column in &mut self.allocated[x..x + w] {
            *column = best + h;
        }
        Ok(Some((x, best)))
    }

    pub fn reset(&mut self) {
        self.allocated.iter_mut().for_each(|c| *c = 0);
    }
}

// ============================================================
// Per-surface blocks
// ============================================================

/// Lightmap settings captured at the start of a map load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightmapSettings {
    pub size: usize,
    pub modulate: f32,
    pub soften: bool,
    pub filter: ColorFilter,
}

impl From<&RenderSettings> for LightmapSettings {
    fn from(s: &RenderSettings) -> Self {
        Self {
            size: s.max_lightmap,
            modulate: s.modulate,
            soften: s.soften,
            filter: ColorFilter::from(s),
        }
    }
}

/// How a surface's samples are laid out in the lighting lump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleLayout {
    /// One RGB map per light style.
    #[default]
    Styles,
    /// A single map of RGB colour followed by XYZ light direction per texel.
    Directional,
}

impl SampleLayout {
    /// Bytes one map of `texels` occupies in the lump.
    pub fn map_bytes(self, texels: usize) -> usize {
        match self {
            SampleLayout::Styles => texels * LIGHTMAP_BYTES,
            SampleLayout::Directional => texels * (LIGHTMAP_BYTES + DELUXEMAP_BYTES),
        }
    }
}

/// A finished block, ready to be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct LightmapBlock {
    pub image: RgbaImage,
    /// Light directions, same size as `image`.
    pub deluxe: RgbaImage,
    /// RGB copy kept on the surface for point sampling.
    pub samples: Vec<u8>,
    pub color: Vec3,
}

impl LightmapBlock {
    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }
}

/// White block for surfaces without samples.
pub fn fullbright_block(width: usize, height: usize) -> LightmapBlock {
    LightmapBlock {
        image: RgbaImage::from_pixel(width as u32, height as u32, Rgba([255, 255, 255, 255])),
        deluxe: RgbaImage::from_pixel(width as u32, height as u32, FLAT_DIRECTION),
        samples: vec![255; width * height * LIGHTMAP_BYTES],
        color: [1.0, 1.0, 1.0],
    }
}

/// Sums the light styles of a surface, rescales overbright texels,
/// filters and optionally softens the result.
///
/// `data` starts at the surface's offset in the lighting lump and must hold
/// one `width*height` RGB map per active style.
pub fn build_block(width: usize, height: usize, data: &[u8], styles: &[u8; 4], settings: &LightmapSettings) -> LightmapBlock {
    let size = width * height;
    let mut accum = vec![0.0f32; size * LIGHTMAP_BYTES];

    for (map, _) in styles.iter().take_while(|&&s| s != 255).enumerate() {
        let start = map * size * LIGHTMAP_BYTES;
        let Some(src) = data.get(start..start + size * LIGHTMAP_BYTES) else {
            break;
        };
        for (acc, &b) in accum.iter_mut().zip(src) {
            *acc += b as f32 * settings.modulate;
        }
    }

    let mut image = RgbaImage::new(width as u32, height as u32);
    for (px, texel) in image.pixels_mut().zip(accum.chunks_exact(LIGHTMAP_BYTES)) {
        // negative lights clamp to black
        let mut r = (texel[0] as i32).max(0);
        let mut g = (texel[1] as i32).max(0);
        let mut b = (texel[2] as i32).max(0);

        let max = r.max(g).max(b);
        if max > 255 {
            r = r * 255 / max;
            g = g * 255 / max;
            b = b * 255 / max;
        }

        *px = Rgba([r as u8, g as u8, b as u8, 255]);
    }

    let deluxe = RgbaImage::from_pixel(width as u32, height as u32, FLAT_DIRECTION);
    finish_block(image, deluxe, false, settings)
}

/// Splits interleaved colour and direction samples into a lightmap and a
/// deluxemap block. Colours are taken as stored, without style summing.
pub fn build_directional_block(width: usize, height: usize, data: &[u8], settings: &LightmapSettings) -> LightmapBlock {
    let mut image = RgbaImage::from_pixel(width as u32, height as u32, Rgba([0, 0, 0, 255]));
    let mut deluxe = RgbaImage::from_pixel(width as u32, height as u32, FLAT_DIRECTION);

    let texels = image.pixels_mut().zip(deluxe.pixels_mut());
    for ((px, dir), sample) in texels.zip(data.chunks_exact(LIGHTMAP_BYTES + DELUXEMAP_BYTES)) {
        *px = Rgba([sample[0], sample[1], sample[2], 255]);
        *dir = Rgba([sample[3], sample[4], sample[5], 255]);
    }

    finish_block(image, deluxe, true, settings)
}

fn finish_block(mut image: RgbaImage, mut deluxe: RgbaImage, soften_deluxe: bool, settings: &LightmapSettings) -> LightmapBlock {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let color = filter_texture(&mut image, ImageKind::Lightmap, &settings.filter);

    if settings.soften && width * height > SOFTEN_MIN_TEXELS {
        for _ in 0..SOFTEN_PASSES {
            soften_texture(&mut image, width, height, LIGHTMAP_BLOCK_BYTES);
            if soften_deluxe {
                soften_texture(&mut deluxe, width, height, DELUXEMAP_BLOCK_BYTES);
            }
        }
    }

    let samples = image.pixels().flat_map(|p| [p[0], p[1], p[2]]).collect();
    LightmapBlock { image, deluxe, samples, color }
}

/// What a surface needs to have its block built.
#[derive(Debug, Clone, Copy)]
pub struct BlockRequest<'a> {
    pub width: usize,
    pub height: usize,
    pub styles: [u8; 4],
    pub layout: SampleLayout,
    /// `None` for fullbright.
    pub data: Option<&'a [u8]>,
}

/// Builds all blocks of a tile, in parallel above `PARALLEL_BLOCK_THRESHOLD`.
/// The output keeps the request order.
pub fn build_blocks(requests: &[BlockRequest<'_>], settings: &LightmapSettings) -> Vec<LightmapBlock> {
    let build = |req: &BlockRequest<'_>| match (req.data, req.layout) {
        (Some(data), SampleLayout::Styles) => build_block(req.width, req.height, data, &req.styles, settings),
        (Some(data), SampleLayout::Directional) => build_directional_block(req.width, req.height, data, settings),
        (None, _) => fullbright_block(req.width, req.height),
    };

    if requests.len() > PARALLEL_BLOCK_THRESHOLD {
        requests.par_iter().map(build).collect()
    } else {
        requests.iter().map(build).collect()
    }
}

// ============================================================
// Atlas building
// ============================================================

/// Packs blocks into pages; lives from the start to the end of a map load.
/// Every lightmap page has a deluxemap page with the same layout.
#[derive(Debug)]
pub struct LightmapBuilder {
    packer: LightmapPacker,
    current: RgbaImage,
    current_deluxe: RgbaImage,
    current_used: usize,
    pages: Vec<RgbaImage>,
    deluxe_pages: Vec<RgbaImage>,
    used_texels: usize,
}

impl LightmapBuilder {
    pub fn begin(size: usize) -> Self {
        Self {
            packer: LightmapPacker::new(size),
            current: RgbaImage::new(size as u32, size as u32),
            current_deluxe: RgbaImage::new(size as u32, size as u32),
            current_used: 0,
            pages: Vec::new(),
            deluxe_pages: Vec::new(),
            used_texels: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.packer.size()
    }

    fn finish_page(&mut self) -> Result<(), LightmapError> {
        if self.pages.len() + 1 >= MAX_LIGHTMAP_PAGES {
            return Err(LightmapError::TooManyPages { max: MAX_LIGHTMAP_PAGES });
        }
        let size = self.packer.size() as u32;
        let page = std::mem::replace(&mut self.current, RgbaImage::new(size, size));
        let deluxe = std::mem::replace(&mut self.current_deluxe, RgbaImage::new(size, size));
        self.pages.push(page);
        self.deluxe_pages.push(deluxe);
        self.current_used = 0;
        self.packer.reset();
        Ok(())
    }

    /// Places a block, starting a new page when the current one is full.
    pub fn add_block(&mut self, block: &LightmapBlock, lightmap_scale: i32) -> Result<LightmapRect, LightmapError> {
        let (w, h) = (block.width(), block.height());

        let (x, y) = match self.packer.alloc_block(w, h)? {
            Some(spot) => spot,
            None => {
                self.finish_page()?;
                self.packer.alloc_block(w, h)?.ok_or(LightmapError::BlockTooLarge {
                    width: w,
                    height: h,
                    scale: lightmap_scale,
                })?
            }
        };

        image::imageops::replace(&mut self.current, &block.image, x as i64, y as i64);
        image::imageops::replace(&mut self.current_deluxe, &block.deluxe, x as i64, y as i64);
        self.current_used += w * h;
        self.used_texels += w * h;

        log::debug!("lightmap block {}x{} at {},{} on page {}", w, h, x, y, self.pages.len());
        Ok(LightmapRect { page: self.pages.len(), x, y, width: w, height: h })
    }

    pub fn end(mut self) -> LightmapAtlas {
        if self.current_used > 0 {
            self.pages.push(self.current);
            self.deluxe_pages.push(self.current_deluxe);
        }
        log::debug!("lightmaps: {}", self.pages.len());
        LightmapAtlas {
            size: self.packer.size(),
            pages: self.pages,
            deluxe_pages: self.deluxe_pages,
            used_texels: self.used_texels,
        }
    }
}

/// Finished atlas pages. Immutable after the map load.
#[derive(Debug, Clone, Default)]
pub struct LightmapAtlas {
    pub size: usize,
    pub pages: Vec<RgbaImage>,
    /// One per lightmap page, at the same index.
    pub deluxe_pages: Vec<RgbaImage>,
    pub used_texels: usize,
}

impl LightmapAtlas {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Fraction of all page texels covered by blocks.
    pub fn utilization(&self) -> f32 {
        let total = self.pages.len() * self.size * self.size;
        if total == 0 {
            0.0
        } else {
            self.used_texels as f32 / total as f32
        }
    }
}

// ============================================================
// Point sampling
// ============================================================

/// A brush entity the light trace should also be traced through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushTraceTarget {
    pub tile: usize,
    pub submodel: usize,
    pub origin: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LightHit {
    point: Vec3,
    color: Vec3,
}

fn recursive_light_point(tile: &BspModel, node: usize, start: Vec3, end: Vec3) -> Option<LightHit> {
    let mut node = node;
    loop {
        let n = tile.nodes.get(node)?;
        let NodeKind::Node { plane: Some(plane), children, first_surface, num_surfaces } = n.kind else {
            return None;
        };
        let plane = tile.planes.get(plane)?;

        let mut mid = end;
        let side;
        match plane.plane_type {
            PLANE_X | PLANE_Y => {
                let t = plane.plane_type as usize;
                node = children[(start[t] < plane.dist) as usize];
                continue;
            }
            PLANE_Z => {
                let s = start[2] < plane.dist;
                if (end[2] < plane.dist) == s {
                    node = children[s as usize];
                    continue;
                }
                side = s as usize;
                mid[2] = plane.dist;
            }
            _ => {
                // the trace is vertical, x and y stay fixed
                let partial = start[0] * plane.normal[0] + start[1] * plane.normal[1];
                let front = partial + start[2] * plane.normal[2];
                let back = partial + end[2] * plane.normal[2];
                let s = front < plane.dist;
                if (back < plane.dist) == s {
                    node = children[s as usize];
                    continue;
                }
                side = s as usize;
                mid[2] = start[2] + (end[2] - start[2]) * (front - plane.dist) / (front - back);
            }
        }

        if let Some(hit) = recursive_light_point(tile, children[side], start, mid) {
            return Some(hit);
        }

        for surf in tile.surfaces.iter().skip(first_surface).take(num_surfaces) {
            if !surf.flags.contains(MSurfFlags::LIGHTMAP) || surf.pass == SurfacePass::AlphaTest {
                continue;
            }
            let Some(tex) = tile.texinfo.get(surf.texinfo) else {
                continue;
            };

            let s = tex.project(0, &mid);
            let t = tex.project(1, &mid);
            if s < surf.stmins[0] as f32 || t < surf.stmins[1] as f32 {
                continue;
            }
            let mut ds = s - surf.stmins[0] as f32;
            let mut dt = t - surf.stmins[1] as f32;
            if ds > surf.stmaxs[0] as f32 || dt > surf.stmaxs[1] as f32 {
                continue;
            }

            let scale = surf.lightmap_scale.max(1) as f32;
            ds /= scale;
            dt /= scale;

            let smax = (surf.stmaxs[0] / surf.lightmap_scale.max(1) + 1) as usize;
            let sample = LIGHTMAP_BYTES * (dt as usize * smax + ds as usize);
            let Some(rgb) = surf.samples.get(sample..sample + LIGHTMAP_BYTES) else {
                continue;
            };

            return Some(LightHit {
                point: mid,
                color: [rgb[0] as f32 / 255.0, rgb[1] as f32 / 255.0, rgb[2] as f32 / 255.0],
            });
        }

        return recursive_light_point(tile, children[1 - side], mid, end);
    }
}

/// Static light colour below `point`: the first lightmapped surface hit by
/// a trace straight down, across all tiles and the given brush entities.
/// White when the map has no light data at all, mid grey when nothing is hit.
pub fn light_point(tiles: &[BspModel], brush_entities: &[BrushTraceTarget], point: &Vec3) -> Vec3 {
    if tiles.iter().all(|t| t.lightdata.is_none()) {
        return [1.0, 1.0, 1.0];
    }

    let dest = [point[0], point[1], point[2] - LIGHT_TRACE_DEPTH];
    let mut best: Option<(f32, Vec3)> = None;
    let mut consider = |hit: Option<LightHit>, height: f32| {
        if let Some(hit) = hit {
            let dist = height - hit.point[2];
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, hit.color));
            }
        }
    };

    for (j, tile) in tiles.iter().enumerate() {
        if tile.lightdata.is_none() {
            log::warn!("No light data in maptile {} ({})", j, tile.name);
            continue;
        }

        for submodel in tile.submodels.iter().take(NUM_REGULAR_MODELS) {
            if submodel.num_faces == 0 {
                continue;
            }
            consider(recursive_light_point(tile, submodel.headnode, *point, dest), point[2]);
        }

        for target in brush_entities.iter().filter(|t| t.tile == j) {
            let Some(submodel) = tile.submodels.get(target.submodel) else {
                continue;
            };
            let start = [point[0] - target.origin[0], point[1] - target.origin[1], point[2] - target.origin[2]];
            let end = [dest[0] - target.origin[0], dest[1] - target.origin[1], dest[2] - target.origin[2]];
            consider(recursive_light_point(tile, submodel.headnode, start, end), start[2]);
        }
    }

    best.map_or([0.5, 0.5, 0.5], |(_, color)| color)
}
