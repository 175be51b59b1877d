use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;

use crate::config::LabelConfig;
use crate::geometry::Rect;

/// A preprocessed region ready for OCR, with the mapping back to the
/// source image.
#[derive(Clone, Debug)]
pub struct PreparedRegion {
    pub image: GrayImage,
    /// Clamped source rectangle the image was cut from
    pub origin: Rect,
    /// Rescale factor applied after cropping (prepared / source)
    pub scale: f32,
}

impl PreparedRegion {
    /// Maps a rectangle in prepared-image pixels back to source pixels.
    pub fn to_image_rect(&self, local: Rect) -> Rect {
        let unscale = |v: u32| (v as f32 / self.scale).round() as u32;
        let x = self.origin.x + unscale(local.x);
        let y = self.origin.y + unscale(local.y);
        Rect {
            x,
            y,
            width: unscale(local.width).max(1),
            height: unscale(local.height).max(1),
        }
        .clamp_to(self.origin.right(), self.origin.bottom())
        .unwrap_or(self.origin)
    }
}

/// Crops `rect` (clamped to the image) and converts it to grayscale.
pub fn crop_gray(img: &RgbImage, rect: Rect) -> Option<GrayImage> {
    let rect = rect.clamp_to(img.width(), img.height())?;
    let cropped = imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image();
    Some(imageops::grayscale(&cropped))
}

fn tile_histogram(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    hist
}

/// Clips the histogram at `limit` and spreads the excess over all bins.
fn clip_histogram(hist: &mut [u32; 256], limit: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    if remainder > 0 {
        let step = (256 / remainder).max(1);
        for bin in hist.iter_mut().step_by(step).take(remainder) {
            *bin += 1;
        }
    }
}

fn equalization_lut(hist: &[u32; 256], pixels: u32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (value, count) in hist.iter().enumerate() {
        cdf += count;
        lut[value] = ((cdf as f32 * 255.0 / pixels as f32).round()).min(255.0) as u8;
    }
    lut
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into at most `tiles` x `tiles` tiles; each tile gets a
/// clipped equalization table and pixels blend the four nearest tables
/// bilinearly.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(tiles.clamp(1, width));
    let tile_h = height.div_ceil(tiles.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(width), (y0 + tile_h).min(height));
            let pixels = (x1 - x0) * (y1 - y0);
            let mut hist = tile_histogram(gray, x0, y0, x1, y1);
            let limit = ((clip_limit * pixels as f32 / 256.0) as u32).max(1);
            clip_histogram(&mut hist, limit);
            luts.push(equalization_lut(&hist, pixels));
        }
    }

    // Neighbouring tile indices and blend weight along one axis
    let neighbours = |pos: u32, size: u32, count: u32| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / size as f32 - 0.5;
        let lo = f.floor().clamp(0.0, (count - 1) as f32);
        let hi = (lo + 1.0).min((count - 1) as f32);
        let weight = (f - lo).clamp(0.0, 1.0);
        (lo as usize, hi as usize, weight)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (x0, x1, wx) = neighbours(x, tile_w, tiles_x);
        let (y0, y1, wy) = neighbours(y, tile_h, tiles_y);
        let at = |tx: usize, ty: usize| luts[ty * tiles_x as usize + tx][v] as f32;
        let top = at(x0, y0) * (1.0 - wx) + at(x1, y0) * wx;
        let bottom = at(x0, y1) * (1.0 - wx) + at(x1, y1) * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Otsu binarization with dark text on a white background.
pub fn binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    let mut binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    // The background is the majority; make it white
    let dark = binary.pixels().filter(|p| p[0] == 0).count();
    if dark * 2 > binary.pixels().len() {
        imageops::invert(&mut binary);
    }
    binary
}

/// Median-filter denoising; radius 0 is a no-op.
pub fn denoise(gray: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return gray.clone();
    }
    median_filter(gray, radius, radius)
}

/// Resizes to `target_height`, preserving aspect ratio.
/// Returns the image and the scale factor applied.
pub fn rescale_to_height(gray: &GrayImage, target_height: u32) -> (GrayImage, f32) {
    let (width, height) = gray.dimensions();
    if height == 0 || height == target_height {
        return (gray.clone(), 1.0);
    }
    let scale = target_height as f32 / height as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let resized = imageops::resize(gray, new_width, target_height, FilterType::CatmullRom);
    (resized, scale)
}

fn prepare_region(
    img: &RgbImage,
    rect: Rect,
    config: &LabelConfig,
    target_height: Option<u32>,
) -> Option<PreparedRegion> {
    let origin = rect.clamp_to(img.width(), img.height())?;
    let gray = crop_gray(img, origin)?;
    let equalized = clahe(&gray, config.clahe_clip_limit, config.clahe_tiles);
    let binary = binarize(&equalized);
    let clean = denoise(&binary, config.denoise_radius);
    let (image, scale) = match target_height {
        Some(height) => rescale_to_height(&clean, height),
        None => (clean, 1.0),
    };
    Some(PreparedRegion {
        image,
        origin,
        scale,
    })
}

/// Full chain for one text line: crop, grayscale, CLAHE, Otsu, denoise,
/// rescale to `target_height`.
/// Returns `None` when the clamped region is empty.
pub fn prepare(img: &RgbImage, rect: Rect, config: &LabelConfig) -> Option<PreparedRegion> {
    prepare_region(img, rect, config, Some(config.target_height))
}

/// Same chain for a multi-line block. The block keeps its source scale,
/// since `target_height` is the height of a single line.
pub fn prepare_block(img: &RgbImage, rect: Rect, config: &LabelConfig) -> Option<PreparedRegion> {
    prepare_region(img, rect, config, None)
}
