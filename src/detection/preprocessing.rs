use std::collections::VecDeque;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::edges::canny;
use imageproc::filter::{box_filter, gaussian_blur_f32, median_filter};
use imageproc::morphology::{dilate, erode};

use crate::params::{AdaptiveMethod, MorphShape};

/// Single-channel `f32` raster, used for distance maps.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Sigma picked for a square Gaussian kernel of `ksize` when none is given.
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    let ksize = ksize.max(1) as f32;
    0.3 * ((ksize - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur sized by kernel width rather than sigma.
pub fn gaussian_blur_kernel(img: &GrayImage, ksize: u32) -> GrayImage {
    apply_blur(img, sigma_for_kernel(ksize).max(0.1))
}

/// Median blur with an odd square aperture.
pub fn median_blur(img: &GrayImage, ksize: u32) -> GrayImage {
    let radius = ksize / 2;
    median_filter(img, radius, radius)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Binarize at `level`; dark pixels become foreground when `inverted`.
pub fn binarize(img: &GrayImage, level: u8, inverted: bool) -> GrayImage {
    let kind = if inverted {
        ThresholdType::BinaryInverted
    } else {
        ThresholdType::Binary
    };
    threshold(img, level, kind)
}

/// Otsu binarization with dark objects as foreground.
pub fn otsu_binarize_inv(img: &GrayImage) -> GrayImage {
    threshold(img, otsu_level(img), ThresholdType::BinaryInverted)
}

/// Locally adaptive binarization, dark objects as foreground.
///
/// A pixel is foreground when it is at least `c` darker than the local
/// mean (box or Gaussian weighted) of its `block_size` neighbourhood.
pub fn adaptive_threshold_inv(
    img: &GrayImage,
    block_size: u32,
    c: f64,
    method: AdaptiveMethod,
) -> GrayImage {
    let block_size = odd_block_size(block_size);
    let local = match method {
        AdaptiveMethod::Mean => {
            let radius = block_size / 2;
            box_filter(img, radius, radius)
        }
        AdaptiveMethod::Gaussian => gaussian_blur_kernel(img, block_size),
    };

    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        let threshold = local.get_pixel(x, y)[0] as f64 - c;
        let on = p[0] as f64 <= threshold;
        out.put_pixel(x, y, Luma([if on { FOREGROUND } else { BACKGROUND }]));
    }
    out
}

fn odd_block_size(block_size: u32) -> u32 {
    let block_size = block_size.max(3);
    if block_size % 2 == 0 {
        block_size + 1
    } else {
        block_size
    }
}

/// Distance norm approximating a structuring element shape.
pub fn shape_norm(shape: MorphShape) -> Norm {
    match shape {
        MorphShape::Rect => Norm::LInf,
        MorphShape::Cross => Norm::L1,
        MorphShape::Ellipse => Norm::L2,
    }
}

/// Radius of a `ksize` wide kernel; sizes 0 and 1 are the identity.
fn kernel_radius(ksize: u8) -> u8 {
    ksize / 2
}

/// Morphological opening: `iterations` erosions followed by as many dilations.
pub fn open(img: &GrayImage, shape: MorphShape, ksize: u8, iterations: u32) -> GrayImage {
    let norm = shape_norm(shape);
    let k = kernel_radius(ksize);
    let mut out = img.clone();
    for _ in 0..iterations.max(1) {
        out = erode(&out, norm, k);
    }
    for _ in 0..iterations.max(1) {
        out = dilate(&out, norm, k);
    }
    out
}

/// Morphological closing: dilations followed by erosions.
pub fn close(img: &GrayImage, shape: MorphShape, ksize: u8, iterations: u32) -> GrayImage {
    let norm = shape_norm(shape);
    let k = kernel_radius(ksize);
    let mut out = img.clone();
    for _ in 0..iterations.max(1) {
        out = dilate(&out, norm, k);
    }
    for _ in 0..iterations.max(1) {
        out = erode(&out, norm, k);
    }
    out
}

/// Euclidean distance from every foreground pixel to the nearest background
/// pixel. Background pixels map to zero.
pub fn distance_transform(binary: &GrayImage) -> FloatImage {
    let background = invert(binary);
    let squared = euclidean_squared_distance_transform(&background);
    let mut out = FloatImage::new(binary.width(), binary.height());
    for (x, y, p) in squared.enumerate_pixels() {
        out.put_pixel(x, y, Luma([p[0].sqrt() as f32]));
    }
    out
}

pub fn max_value(img: &FloatImage) -> f32 {
    img.pixels().map(|p| p[0]).fold(0.0, f32::max)
}

/// Foreground where the map is strictly above `fraction` of its maximum.
pub fn threshold_relative(img: &FloatImage, fraction: f32) -> GrayImage {
    let level = max_value(img) * fraction;
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        if p[0] > level {
            out.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    out
}

pub fn invert(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p[0] = 255 - p[0];
    }
    out
}

/// Per-pixel maximum of two masks of equal size.
pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        p[0] = p[0].max(b.get_pixel(x, y)[0]);
    }
    out
}

/// 4-connected flood fill of the region sharing the seed's value.
pub fn flood_fill(img: &mut GrayImage, seed: (u32, u32), value: u8) {
    let (width, height) = img.dimensions();
    if seed.0 >= width || seed.1 >= height {
        return;
    }
    let target = img.get_pixel(seed.0, seed.1)[0];
    if target == value {
        return;
    }

    let mut queue = VecDeque::new();
    img.put_pixel(seed.0, seed.1, Luma([value]));
    queue.push_back(seed);

    while let Some((x, y)) = queue.pop_front() {
        let neighbours = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbours {
            if nx < width && ny < height && img.get_pixel(nx, ny)[0] == target {
                img.put_pixel(nx, ny, Luma([value]));
                queue.push_back((nx, ny));
            }
        }
    }
}

/// Fill enclosed background holes of a binary mask.
///
/// The background reachable from the top-left corner is flooded, inverted
/// and merged back. Masks whose corner is foreground are returned unchanged.
pub fn fill_holes(mask: &GrayImage) -> GrayImage {
    if mask.width() == 0 || mask.height() == 0 || mask.get_pixel(0, 0)[0] != BACKGROUND {
        return mask.clone();
    }
    let mut flooded = mask.clone();
    flood_fill(&mut flooded, (0, 0), FOREGROUND);
    bitwise_or(mask, &invert(&flooded))
}

pub fn count_foreground(img: &GrayImage) -> usize {
    img.pixels().filter(|p| p[0] != BACKGROUND).count()
}
