use cellscope::neural::model::{InferenceBackend, InputTensor, ModelOutput};
use cellscope::neural::InferenceError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tempfile::NamedTempFile;

/// Grey level of the synthetic slide background.
pub const BACKGROUND_LEVEL: u8 = 230;
/// Grey level of synthetic cells and printed marks.
pub const INK_LEVEL: u8 = 40;

/// Light canvas with dark filled discs, given as `(x, y, radius)`.
pub fn dark_discs(width: u32, height: u32, discs: &[(i32, i32, i32)]) -> DynamicImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([BACKGROUND_LEVEL]));
    for &(x, y, r) in discs {
        draw_filled_circle_mut(&mut img, (x, y), r, Luma([INK_LEVEL]));
    }
    DynamicImage::ImageLuma8(img)
}

/// A single disc of radius 30 centred at (100, 100) on a 300x300 canvas.
pub fn single_disc() -> DynamicImage {
    dark_discs(300, 300, &[(100, 100, 30)])
}

/// Blank light canvas.
pub fn blank(width: u32, height: u32) -> DynamicImage {
    dark_discs(width, height, &[])
}

/// 400x300 image with a 100px scale bar near the bottom and a "100" label
/// drawn above it as simple stroked glyphs.
pub fn scale_bar_image() -> DynamicImage {
    let mut img = GrayImage::from_pixel(400, 300, Luma([BACKGROUND_LEVEL]));
    let ink = Luma([INK_LEVEL]);

    // bar: x 150..250, y 260..264
    draw_filled_rect_mut(&mut img, Rect::at(150, 260).of_size(100, 4), ink);

    // "1"
    draw_filled_rect_mut(&mut img, Rect::at(183, 230).of_size(2, 20), ink);
    // "0" "0" as two-pixel stroked boxes
    for x in [189, 205] {
        draw_hollow_rect_mut(&mut img, Rect::at(x, 230).of_size(12, 20), ink);
        draw_hollow_rect_mut(&mut img, Rect::at(x + 1, 231).of_size(10, 18), ink);
    }

    DynamicImage::ImageLuma8(img)
}

/// Saves an image as a temporary PNG.
/// The file will be automatically cleaned up when dropped.
pub fn save_temp_png(img: &DynamicImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Backend returning a fixed output regardless of its input.
pub struct FakeBackend {
    pub output: ModelOutput,
}

impl InferenceBackend for FakeBackend {
    fn run(&self, input: &InputTensor) -> Result<ModelOutput, InferenceError> {
        assert_eq!(input.shape[0], 1);
        assert_eq!(input.shape[1], 3);
        Ok(self.output.clone())
    }

    fn backend_name(&self) -> &str {
        "fake"
    }
}

/// `classes × size × size` probability planes; every disc `(class, x, y, r)`
/// is painted with probability 0.9 into its class plane.
pub fn class_planes(classes: usize, size: usize, discs: &[(usize, i32, i32, i32)]) -> Vec<f32> {
    let mut data = vec![0.0f32; classes * size * size];
    for &(class, cx, cy, r) in discs {
        for y in 0..size {
            for x in 0..size {
                let dx = x as i32 - cx;
                let dy = y as i32 - cy;
                if dx * dx + dy * dy <= r * r {
                    data[class * size * size + y * size + x] = 0.9;
                }
            }
        }
    }
    data
}

/// Centre distance check with a pixel tolerance.
pub fn near(cell: &cellscope::Cell, x: f64, y: f64, tolerance: f64) -> bool {
    (cell.center_x - x).abs() <= tolerance && (cell.center_y - y).abs() <= tolerance
}
