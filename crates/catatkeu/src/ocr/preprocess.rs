//! Image preparation for the recognition passes.
//!
//! All helpers are best-effort pure transforms over `image` buffers; only
//! opening the source file can fail upstream.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};

/// Global binarization threshold used for the base recognition image.
pub const BINARIZE_THRESHOLD: u8 = 210;

/// Minimum useful height for a top-half crop.
const MIN_CROP_HALF: u32 = 50;

/// Resizes to the target height, preserving aspect ratio, with Lanczos3.
pub fn resize_to_height(img: &DynamicImage, target_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if height == 0 {
        return img.clone();
    }
    let new_width = ((width as f64 * target_height as f64 / height as f64).round() as u32).max(1);
    img.resize_exact(new_width, target_height, FilterType::Lanczos3)
}

/// Produces the base recognition image: grayscale, contrast +15, unsharp 0.7,
/// upscaled to 1300 px height when shorter than 900 px, then binarized.
pub fn prepared_base(img: &DynamicImage) -> GrayImage {
    let mut gray = img.grayscale();
    gray = gray.adjust_contrast(15.0);
    gray = gray.unsharpen(0.7, 0);
    if gray.height() < 900 {
        gray = resize_to_height(&gray, 1300);
    }
    binarize(&gray.to_luma8(), BINARIZE_THRESHOLD)
}

/// Grayscale variant for the candidate-extractor base pass: no contrast or
/// binarization, upscaled to 1200 px height when shorter than 800 px.
pub fn prepared_plain_gray(img: &DynamicImage) -> GrayImage {
    let mut gray = img.grayscale();
    if gray.height() < 800 {
        gray = resize_to_height(&gray, 1200);
    }
    gray.to_luma8()
}

/// Global threshold: pixels at or below `threshold` become black.
pub fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel.0[0] <= threshold { 0 } else { 255 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Mean adaptive threshold over a square window using an integral image.
/// The window is forced odd and at least 3; a pixel darker than the window
/// mean minus `bias` becomes black.
pub fn adaptive_threshold(img: &GrayImage, window: u32, bias: i64) -> GrayImage {
    let window = window.max(3) | 1;
    let (width, height) = (img.width() as usize, img.height() as usize);
    let mut out = GrayImage::from_pixel(img.width(), img.height(), Luma([255]));
    if width == 0 || height == 0 {
        return out;
    }
    let half = (window / 2) as usize;

    let mut integral = vec![0i64; width * height];
    for y in 0..height {
        let mut row_sum = 0i64;
        for x in 0..width {
            row_sum += i64::from(img.get_pixel(x as u32, y as u32).0[0]);
            let idx = y * width + x;
            integral[idx] = if y == 0 {
                row_sum
            } else {
                integral[(y - 1) * width + x] + row_sum
            };
        }
    }

    for y in 0..height {
        for x in 0..width {
            let x0 = x.saturating_sub(half);
            let y0 = y.saturating_sub(half);
            let x1 = (x + half).min(width - 1);
            let y1 = (y + half).min(height - 1);
            let a = integral[y0 * width + x0];
            let b = integral[y0 * width + x1];
            let c = integral[y1 * width + x0];
            let d = integral[y1 * width + x1];
            let sum = d - b - c + a;
            let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as i64;
            let mean = sum / area;
            let threshold = (mean - bias).max(0);
            let pixel = i64::from(img.get_pixel(x as u32, y as u32).0[0]);
            if pixel < threshold {
                out.put_pixel(x as u32, y as u32, Luma([0]));
            }
        }
    }
    out
}

/// 4-neighborhood dilation of black pixels, applied `radius` times.
pub fn dilate(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    let (width, height) = (img.width(), img.height());
    let mut current = img.clone();
    for _ in 0..radius {
        let mut next = GrayImage::from_pixel(width, height, Luma([255]));
        for y in 0..height {
            for x in 0..width {
                let black = [(0i64, 0i64), (1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .any(|(dx, dy)| {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        nx >= 0
                            && ny >= 0
                            && nx < width as i64
                            && ny < height as i64
                            && current.get_pixel(nx as u32, ny as u32).0[0] == 0
                    });
                if black {
                    next.put_pixel(x, y, Luma([0]));
                }
            }
        }
        current = next;
    }
    current
}

/// Inverts a grayscale image, for light-on-dark screenshots.
pub fn invert(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = 255 - pixel.0[0];
    }
    out
}

/// Crops the top half of the image when the half is taller than 50 px.
pub fn top_half(img: &GrayImage) -> Option<GrayImage> {
    let half = img.height() / 2;
    if half <= MIN_CROP_HALF {
        return None;
    }
    Some(image::imageops::crop_imm(img, 0, 0, img.width(), half).to_image())
}

/// Splits the image into `cols` vertical slices; the last slice absorbs any
/// remainder.
pub fn column_slices(img: &GrayImage, cols: u32) -> Vec<GrayImage> {
    let width = img.width();
    let height = img.height();
    if cols == 0 || width < cols {
        return Vec::new();
    }
    let col_width = width / cols;
    (0..cols)
        .map(|i| {
            let x0 = i * col_width;
            let x1 = if i == cols - 1 { width } else { x0 + col_width };
            image::imageops::crop_imm(img, x0, 0, x1 - x0, height).to_image()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_of(pixels: &[&[u8]]) -> GrayImage {
        let height = pixels.len() as u32;
        let width = pixels[0].len() as u32;
        let mut img = GrayImage::new(width, height);
        for (y, row) in pixels.iter().enumerate() {
            for (x, &value) in row.iter().enumerate() {
                img.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
        img
    }

    #[test]
    fn test_binarize_threshold() {
        let img = gray_of(&[&[0, 100, 210, 211, 255]]);
        let out = binarize(&img, 210);
        let values: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 0, 0, 255, 255]);
    }

    #[test]
    fn test_adaptive_threshold_flat_image_stays_white() {
        let img = GrayImage::from_pixel(8, 8, Luma([200]));
        let out = adaptive_threshold(&img, 3, 7);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_adaptive_threshold_dark_spot_on_light() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([240]));
        img.put_pixel(4, 4, Luma([10]));
        let out = adaptive_threshold(&img, 5, 7);
        assert_eq!(out.get_pixel(4, 4).0[0], 0);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_adaptive_threshold_forces_odd_window() {
        // Even and sub-minimum windows are legal inputs.
        let img = GrayImage::from_pixel(4, 4, Luma([128]));
        let _ = adaptive_threshold(&img, 2, 7);
        let _ = adaptive_threshold(&img, 4, 7);
    }

    #[test]
    fn test_dilate_grows_black_cross() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([255]));
        img.put_pixel(2, 2, Luma([0]));
        let out = dilate(&img, 1);
        for (x, y) in [(2, 2), (1, 2), (3, 2), (2, 1), (2, 3)] {
            assert_eq!(out.get_pixel(x, y).0[0], 0, "({}, {})", x, y);
        }
        assert_eq!(out.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn test_dilate_zero_radius_is_identity() {
        let mut img = GrayImage::from_pixel(3, 3, Luma([255]));
        img.put_pixel(1, 1, Luma([0]));
        let out = dilate(&img, 0);
        assert_eq!(out.get_pixel(1, 1).0[0], 0);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_invert() {
        let img = gray_of(&[&[0, 255, 100]]);
        let out = invert(&img);
        let values: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![255, 0, 155]);
    }

    #[test]
    fn test_top_half_skips_short_images() {
        let img = GrayImage::new(10, 100);
        assert!(top_half(&img).is_none());
        let img = GrayImage::new(10, 102);
        let crop = top_half(&img).unwrap();
        assert_eq!(crop.height(), 51);
        assert_eq!(crop.width(), 10);
    }

    #[test]
    fn test_column_slices_cover_full_width() {
        let img = GrayImage::new(10, 4);
        let slices = column_slices(&img, 4);
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].width(), 2);
        // The last slice absorbs the remainder.
        assert_eq!(slices[3].width(), 4);
        assert_eq!(slices.iter().map(|s| s.width()).sum::<u32>(), 10);
    }

    #[test]
    fn test_resize_to_height_preserves_aspect() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(100, 50));
        let out = resize_to_height(&img, 100);
        assert_eq!(out.height(), 100);
        assert_eq!(out.width(), 200);
    }

    #[test]
    fn test_prepared_base_upscales_small_images() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(60, 30, Luma([128])));
        let out = prepared_base(&img);
        assert_eq!(out.height(), 1300);
    }

    #[test]
    fn test_prepared_plain_gray_leaves_tall_images() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 900, Luma([128])));
        let out = prepared_plain_gray(&img);
        assert_eq!(out.height(), 900);
    }
}
