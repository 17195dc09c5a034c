use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

use super::model::InputTensor;

/// Grey level used to pad letterboxed inputs.
pub const LETTERBOX_FILL: u8 = 114;

/// A square network input and where the original image sits inside it.
#[derive(Debug, Clone)]
pub struct Letterbox {
    pub image: RgbImage,
    pub target_size: u32,
    pub scale: f32,
    pub pad_left: u32,
    pub pad_top: u32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Resize preserving aspect ratio and paste centred on a square canvas.
pub fn letterbox(image: &DynamicImage, target_size: u32) -> Letterbox {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let scale = (target_size as f32 / width as f32).min(target_size as f32 / height as f32);
    let new_width = ((width as f32 * scale) as u32).clamp(1, target_size);
    let new_height = ((height as f32 * scale) as u32).clamp(1, target_size);

    let resized = imageops::resize(&rgb, new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([LETTERBOX_FILL; 3]));
    let pad_left = (target_size - new_width) / 2;
    let pad_top = (target_size - new_height) / 2;
    imageops::replace(&mut canvas, &resized, pad_left.into(), pad_top.into());

    log::debug!(
        "Letterbox {}x{} -> {}x{} (scale {:.3}, padding {}x{})",
        width,
        height,
        target_size,
        target_size,
        scale,
        pad_left,
        pad_top
    );

    Letterbox {
        image: canvas,
        target_size,
        scale,
        pad_left,
        pad_top,
        original_width: width,
        original_height: height,
    }
}

/// `1×3×H×W` tensor in RGB order, scaled to `[0, 1]`.
pub fn to_input_tensor(letterbox: &Letterbox) -> InputTensor {
    let (width, height) = letterbox.image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, p) in letterbox.image.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = p[c] as f32 / 255.0;
        }
    }
    InputTensor {
        shape: [1, 3, height as usize, width as usize],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_image_is_padded_vertically() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([10, 20, 30])));
        let lb = letterbox(&img, 100);

        assert_eq!(lb.image.dimensions(), (100, 100));
        assert_eq!(lb.pad_left, 0);
        assert_eq!(lb.pad_top, 25);
        assert_eq!(lb.image.get_pixel(50, 5), &Rgb([LETTERBOX_FILL; 3]));
        assert_eq!(lb.image.get_pixel(50, 50), &Rgb([10, 20, 30]));
    }

    #[test]
    fn tensor_is_planar_rgb() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 51])));
        let tensor = to_input_tensor(&letterbox(&img, 4));

        assert_eq!(tensor.shape, [1, 3, 4, 4]);
        assert_eq!(tensor.data[0], 1.0);
        assert_eq!(tensor.data[16], 0.0);
        assert!((tensor.data[32] - 0.2).abs() < 1e-6);
    }
}
