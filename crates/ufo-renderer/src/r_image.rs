// r_image.rs — texture handles, colour filtering, softening and the day/night overlay

use std::collections::HashMap;

use image::{GrayImage, RgbaImage};
use ufo_common::q_shared::Vec3;

use crate::r_local::RenderSettings;

// ============================================================
// Texture handles
// ============================================================

/// Backend texture id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u32);

/// What the renderer needs to know about an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub has_material: bool,
}

impl TextureInfo {
    pub fn new(handle: u32, width: u32, height: u32) -> Self {
        Self {
            handle: TextureHandle(handle),
            width,
            height,
            has_alpha: false,
            has_material: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    World,
    Effect,
    Material,
    Skin,
    Lightmap,
    Pic,
}

impl ImageKind {
    /// Bit tested against `r_monochrome` and `r_invert`.
    pub fn filter_mask(self) -> i32 {
        match self {
            ImageKind::World | ImageKind::Effect | ImageKind::Material | ImageKind::Skin => 1,
            ImageKind::Lightmap => 2,
            ImageKind::Pic => 0,
        }
    }
}

/// Resolves texture names to decoded and uploaded images.
pub trait TextureProvider {
    fn find_image(&mut self, name: &str, kind: ImageKind) -> Option<TextureInfo>;
    /// Checkerboard substitute for images that could not be found.
    fn placeholder(&self) -> TextureInfo;
}

/// Name table filled by the image loader as images are decoded and uploaded.
#[derive(Debug, Clone)]
pub struct ImageRegistry {
    images: HashMap<String, TextureInfo>,
    notexture: TextureInfo,
}

impl ImageRegistry {
    pub fn new(notexture: TextureInfo) -> Self {
        Self { images: HashMap::new(), notexture }
    }

    pub fn insert(&mut self, name: &str, info: TextureInfo) {
        self.images.insert(name.to_string(), info);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl TextureProvider for ImageRegistry {
    fn find_image(&mut self, name: &str, _kind: ImageKind) -> Option<TextureInfo> {
        self.images.get(name).copied()
    }

    fn placeholder(&self) -> TextureInfo {
        self.notexture
    }
}

// ============================================================
// Colour filtering
// ============================================================

/// Brightness, contrast, monochrome and invert settings applied at upload time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorFilter {
    pub brightness: f32,
    pub contrast: f32,
    pub monochrome: i32,
    pub invert: i32,
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self { brightness: 1.0, contrast: 1.0, monochrome: 0, invert: 0 }
    }
}

impl From<&RenderSettings> for ColorFilter {
    fn from(s: &RenderSettings) -> Self {
        Self {
            brightness: s.brightness,
            contrast: s.contrast,
            monochrome: s.monochrome,
            invert: s.invert,
        }
    }
}

/// Brightness then contrast around 0.5, on one byte channel.
pub fn filter_channel(value: u8, brightness: f32, contrast: f32) -> u8 {
    let mut f = value as f32 / 255.0;

    f = (f * brightness).clamp(0.0, 1.0);

    f -= 0.5;
    f *= contrast;
    f += 0.5;

    (f * 255.0).clamp(0.0, 255.0).round() as u8
}

/// Filters an RGBA image in place and returns its average colour in 0..1.
pub fn filter_texture(image: &mut RgbaImage, kind: ImageKind, filter: &ColorFilter) -> Vec3 {
    let mask = kind.filter_mask();
    let mut sum = [0u64; 3];

    for px in image.pixels_mut() {
        for j in 0..3 {
            px[j] = filter_channel(px[j], filter.brightness, filter.contrast);
        }

        if filter.monochrome & mask != 0 {
            let avg = ((px[0] as u32 + px[1] as u32 + px[2] as u32) / 3) as u8;
            px[0] = avg;
            px[1] = avg;
            px[2] = avg;
        }

        if filter.invert & mask != 0 {
            px[0] = 255 - px[0];
            px[1] = 255 - px[1];
            px[2] = 255 - px[2];
        }

        for j in 0..3 {
            sum[j] += px[j] as u64;
        }
    }

    let count = (image.width() as u64 * image.height() as u64).max(1) as f32;
    [
        sum[0] as f32 / count / 255.0,
        sum[1] as f32 / count / 255.0,
        sum[2] as f32 / count / 255.0,
    ]
}

/// Replaces every interior texel with the average of its four neighbours.
/// Border texels are left untouched.
pub fn soften_texture(data: &mut [u8], width: usize, height: usize, bpp: usize) {
    if width < 3 || height < 3 {
        return;
    }
    debug_assert!(data.len() >= width * height * bpp);

    let src = data.to_vec();
    let at = |x: usize, y: usize, k: usize| src[(y * width + x) * bpp + k] as u32;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            for k in 0..bpp {
                let sum = at(x, y - 1, k) + at(x, y + 1, k) + at(x - 1, y, k) + at(x + 1, y, k);
                data[(y * width + x) * bpp + k] = (sum / 4) as u8;
            }
        }
    }
}

// ============================================================
// Day and night overlay
// ============================================================

pub const DAN_WIDTH: u32 = 512;
pub const DAN_HEIGHT: u32 = 256;
/// Width of the twilight band.
pub const DAWN: f32 = 0.03;

const HIGH_LAT: f32 = 1.0;
const LOW_LAT: f32 = -1.0;
/// Sine and cosine of the planet's axial tilt.
const SIN_ALPHA: f32 = 0.39875;
const COS_ALPHA: f32 = 0.91706;

/// Alpha mask of the lit half of the globe for season/time angle `q`.
/// 255 is day, 0 is night, with a linear ramp across the terminator.
pub fn calc_day_and_night(q: f32) -> GrayImage {
    let dphi = 2.0 * std::f32::consts::PI / DAN_WIDTH as f32;
    let da = std::f32::consts::FRAC_PI_2 * (HIGH_LAT - LOW_LAT) / DAN_HEIGHT as f32;
    let (sin_q, cos_q) = q.sin_cos();

    let phis: Vec<(f32, f32)> = (0..DAN_WIDTH).map(|x| (x as f32 * dphi - q).sin_cos()).collect();

    GrayImage::from_fn(DAN_WIDTH, DAN_HEIGHT, |x, y| {
        let a = (std::f32::consts::FRAC_PI_2 * HIGH_LAT - y as f32 * da).sin();
        let root = (1.0 - a * a).max(0.0).sqrt();
        let (sin_phi, cos_phi) = phis[x as usize];
        let pos = sin_phi * root * sin_q - (a * SIN_ALPHA + cos_phi * root * COS_ALPHA) * cos_q;

        let alpha = if pos >= DAWN {
            255
        } else if pos <= -DAWN {
            0
        } else {
            (128.0 * (pos / DAWN + 1.0)) as u8
        };
        image::Luma([alpha])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------
    // Filtering
    // ---------------------------------------------------------

    #[test]
    fn test_filter_identity_for_all_bytes() {
        for v in 0..=255u8 {
            assert_eq!(filter_channel(v, 1.0, 1.0), v, "byte {}", v);
        }
    }

    #[test]
    fn test_filter_brightness_before_contrast() {
        // brightness clamps at 1.0 before contrast spreads the value
        assert_eq!(filter_channel(200, 2.0, 1.0), 255);
        assert_eq!(filter_channel(200, 2.0, 0.5), 191);
        // contrast 0 flattens everything to mid grey
        assert_eq!(filter_channel(10, 1.0, 0.0), 128);
        assert_eq!(filter_channel(250, 1.0, 0.0), 128);
    }

    #[test]
    fn test_filter_texture_monochrome_and_invert_masks() {
        let mut img = RgbaImage::from_pixel(2, 1, image::Rgba([30, 60, 90, 255]));
        let filter = ColorFilter { monochrome: 2, invert: 2, ..Default::default() };

        let mut world = img.clone();
        filter_texture(&mut world, ImageKind::World, &filter);
        assert_eq!(world.get_pixel(0, 0).0, [30, 60, 90, 255]);

        let color = filter_texture(&mut img, ImageKind::Lightmap, &filter);
        assert_eq!(img.get_pixel(1, 0).0, [195, 195, 195, 255]);
        assert!((color[0] - 195.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_filter_texture_average_color() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        let color = filter_texture(&mut img, ImageKind::World, &ColorFilter::default());
        assert!((color[0] - 0.5).abs() < 1e-6);
        assert_eq!(color[1], 0.0);
        assert!((color[2] - 0.5).abs() < 1e-6);
    }

    // ---------------------------------------------------------
    // Softening
    // ---------------------------------------------------------

    #[test]
    fn test_soften_only_touches_interior() {
        // 3x3 single channel, bright centre
        let mut data = vec![0, 40, 0, 80, 255, 120, 0, 160, 0];
        soften_texture(&mut data, 3, 3, 1);
        // (40 + 160 + 80 + 120) / 4
        assert_eq!(data[4], 100);
        assert_eq!(&data[..4], &[0, 40, 0, 80]);
        assert_eq!(&data[5..], &[120, 0, 160, 0]);
    }

    #[test]
    fn test_soften_reads_unmodified_neighbours() {
        let mut data = vec![0u8; 4 * 3];
        data[4 + 1] = 100; // (1,1)
        data[4 + 2] = 200; // (2,1)
        soften_texture(&mut data, 4, 3, 1);
        assert_eq!(data[5], 200 / 4);
        assert_eq!(data[6], 100 / 4);
    }

    #[test]
    fn test_soften_uniform_is_stable() {
        let mut data = vec![77u8; 5 * 5 * 4];
        soften_texture(&mut data, 5, 5, 4);
        assert!(data.iter().all(|&b| b == 77));
    }

    // ---------------------------------------------------------
    // Day and night
    // ---------------------------------------------------------

    #[test]
    fn test_day_and_night_has_both_halves() {
        let img = calc_day_and_night(0.0);
        assert_eq!(img.dimensions(), (DAN_WIDTH, DAN_HEIGHT));
        let day = img.pixels().filter(|p| p[0] == 255).count();
        let night = img.pixels().filter(|p| p[0] == 0).count();
        let total = (DAN_WIDTH * DAN_HEIGHT) as usize;
        assert!(day > total / 4 && night > total / 4);
        assert!(day + night < total);
    }

    #[test]
    fn test_day_and_night_moves_with_q() {
        assert_ne!(calc_day_and_night(0.0), calc_day_and_night(1.0));
    }
}
