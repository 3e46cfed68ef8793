//! Image operations for previews: fit, flatten, stitch and JPEG encode

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageResult, Rgb, RgbImage};

/// JPEG quality of every generated preview
pub const JPEG_QUALITY: u8 = 85;

/// Vertical gap between stitched pages
pub const PAGE_SPACING: u32 = 20;

/// Width used when stitching without a target size
pub const DEFAULT_STITCH_WIDTH: u32 = 800;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Composite any alpha channel onto a white background
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut out = RgbImage::from_pixel(rgba.width(), rgba.height(), WHITE);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Shrink to fit inside `max_w` x `max_h`, keeping aspect ratio
///
/// Images already inside the box are returned unchanged (never enlarged).
pub fn fit_within(image: RgbImage, max_w: u32, max_h: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w <= max_w && h <= max_h {
        return image;
    }
    let scale = f64::min(max_w as f64 / w as f64, max_h as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    imageops::resize(&image, new_w, new_h, FilterType::Lanczos3)
}

/// Stack pages vertically at a common width with [`PAGE_SPACING`] between
pub fn stitch_pages(pages: &[RgbImage], width: u32) -> RgbImage {
    let resized: Vec<RgbImage> = pages
        .iter()
        .map(|page| {
            let (w, h) = page.dimensions();
            let new_h = ((h as f64 * width as f64 / w.max(1) as f64) as u32).max(1);
            imageops::resize(page, width, new_h, FilterType::Lanczos3)
        })
        .collect();

    let gaps = PAGE_SPACING * (resized.len().saturating_sub(1) as u32);
    let total_height = resized.iter().map(|p| p.height()).sum::<u32>() + gaps;
    let mut canvas = RgbImage::from_pixel(width, total_height.max(1), WHITE);

    let mut y = 0i64;
    for page in &resized {
        imageops::replace(&mut canvas, page, 0, y);
        y += (page.height() + PAGE_SPACING) as i64;
    }
    canvas
}

pub fn encode_jpeg(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(image)?;
    Ok(out)
}
