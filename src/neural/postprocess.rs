use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use super::model::ModelOutput;
use super::preprocess::Letterbox;
use super::InferenceError;
use crate::detection::contours::{circularity, contour_area, find_external_contours};
use crate::detection::preprocessing::{self, FOREGROUND};
use crate::models::LabeledContour;
use crate::params::{MorphShape, NeuralNetParams};

/// Per-class probability planes of one image, `classes × height × width`.
#[derive(Debug, Clone)]
pub struct ClassMasks {
    pub classes: usize,
    pub height: usize,
    pub width: usize,
    data: Vec<f32>,
}

impl ClassMasks {
    /// Drop a leading batch dimension and check the remaining rank.
    pub fn from_output(output: ModelOutput) -> Result<Self, InferenceError> {
        let ModelOutput { shape, data } = output;
        let dims: &[usize] = if shape.len() == 4 { &shape[1..] } else { &shape };
        if dims.len() != 3 {
            return Err(InferenceError::UnexpectedRank(shape.len()));
        }

        let (classes, height, width) = (dims[0], dims[1], dims[2]);
        let len = classes * height * width;
        if data.len() < len {
            return Err(InferenceError::Backend(format!(
                "output holds {} values, shape {:?} needs {}",
                data.len(),
                shape,
                len
            )));
        }

        let mut data = data;
        // first batch entry only
        data.truncate(len);
        Ok(Self {
            classes,
            height,
            width,
            data,
        })
    }

    pub fn plane(&self, class_id: usize) -> &[f32] {
        let size = self.height * self.width;
        &self.data[class_id * size..(class_id + 1) * size]
    }

    /// Pixels strictly above `threshold` become foreground.
    pub fn binarize(&self, class_id: usize, threshold: f32) -> GrayImage {
        let mut mask = GrayImage::new(self.width as u32, self.height as u32);
        for (i, &v) in self.plane(class_id).iter().enumerate() {
            if v > threshold {
                let x = (i % self.width) as u32;
                let y = (i / self.width) as u32;
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        mask
    }
}

/// Close then open with an elliptic kernel, then optionally fill holes.
pub fn clean_mask(mask: &GrayImage, kernel_size: u8, fill_holes: bool) -> GrayImage {
    let mut result = mask.clone();
    if kernel_size > 0 {
        result = preprocessing::close(&result, MorphShape::Ellipse, kernel_size, 1);
        result = preprocessing::open(&result, MorphShape::Ellipse, kernel_size, 1);
    }
    if fill_holes {
        result = preprocessing::fill_holes(&result);
    }
    result
}

/// Cut the letterbox padding out of a mask and scale it back to the size of
/// the original image. `None` when the padding region falls outside the mask.
pub fn unletterbox_mask(mask: &GrayImage, letterbox: &Letterbox) -> Option<GrayImage> {
    let (mask_w, mask_h) = mask.dimensions();
    let input = letterbox.target_size.max(1);
    let content_w = input.saturating_sub(2 * letterbox.pad_left);
    let content_h = input.saturating_sub(2 * letterbox.pad_top);

    let x = letterbox.pad_left * mask_w / input;
    let y = letterbox.pad_top * mask_h / input;
    let w = content_w * mask_w / input;
    let h = content_h * mask_h / input;
    if w == 0 || h == 0 || x + w > mask_w || y + h > mask_h {
        return None;
    }

    let cropped = imageops::crop_imm(mask, x, y, w, h).to_image();
    Some(imageops::resize(
        &cropped,
        letterbox.original_width,
        letterbox.original_height,
        FilterType::Nearest,
    ))
}

/// Decode every cell class into labelled contours in original image
/// coordinates. Class 0 is background.
pub fn decode_classes(
    masks: &ClassMasks,
    letterbox: &Letterbox,
    params: &NeuralNetParams,
) -> Vec<LabeledContour> {
    let last_class = masks.classes.saturating_sub(1).min(params.num_classes as usize);
    let mut regions = Vec::new();

    for class_id in 1..=last_class {
        let binary = masks.binarize(class_id, params.confidence_threshold);
        let cleaned = if params.fill_holes || params.morph_kernel_size > 0 {
            clean_mask(&binary, params.morph_kernel_size, params.fill_holes)
        } else {
            binary
        };

        let Some(mask) = unletterbox_mask(&cleaned, letterbox) else {
            log::warn!("Class {}: padding region lies outside the output mask", class_id);
            continue;
        };

        let class_name = params.class_name(class_id as u32);
        let before = regions.len();
        for contour in find_external_contours(&mask) {
            if !passes_size_filter(&contour, params) {
                continue;
            }
            regions.push(LabeledContour {
                points: contour,
                class_id: class_id as u32,
                class_name: class_name.clone(),
                confidence: params.confidence_threshold,
            });
        }
        log::debug!(
            "Class {} ({}): {} foreground pixels, {} regions",
            class_id,
            class_name,
            preprocessing::count_foreground(&mask),
            regions.len() - before
        );
    }

    regions
}

fn passes_size_filter(contour: &[imageproc::point::Point<i32>], params: &NeuralNetParams) -> bool {
    let area = contour_area(contour);
    if area < params.min_cell_size || area > params.max_cell_size {
        return false;
    }
    if params.filters_circularity() {
        let c = circularity(contour);
        if c < params.min_circularity || c > params.max_circularity {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_rank_two_output() {
        let output = ModelOutput {
            shape: vec![4, 4],
            data: vec![0.0; 16],
        };
        assert!(matches!(
            ClassMasks::from_output(output),
            Err(InferenceError::UnexpectedRank(2))
        ));
    }

    #[test]
    fn squeezes_batch_dimension() {
        let output = ModelOutput {
            shape: vec![1, 2, 3, 4],
            data: (0..24).map(|v| v as f32).collect(),
        };
        let masks = ClassMasks::from_output(output).unwrap();
        assert_eq!((masks.classes, masks.height, masks.width), (2, 3, 4));
        assert_eq!(masks.plane(1)[0], 12.0);
    }
}
