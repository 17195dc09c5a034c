//! Integration tests for scale-bar calibration.
//!
//! Tests cover:
//! - Locating the bar and reading its label with the blob heuristic
//! - Custom label readers and the fallback value
//! - Uncalibrated images
//! - Applying the factor to detected cells

mod common;

use approx::assert_abs_diff_eq;
use cellscope::calibration::{self, FALLBACK_SCALE_VALUE};
use cellscope::{LineSegment, ScaleValueSource};
use image::{imageops, DynamicImage, GrayImage};

use common::*;

struct FixedValue(Option<f64>);

impl ScaleValueSource for FixedValue {
    fn name(&self) -> &str {
        "fixed"
    }

    fn read_value(&self, _gray: &GrayImage, _line: &LineSegment) -> Option<f64> {
        self.0
    }
}

#[test]
fn test_measure_reads_bar_and_label() {
    // 1. Synthetic slide with a 100px bar labelled "100"
    let image = scale_bar_image();

    // 2. Measure with the default heuristic
    let bar = ScaleCalibrator::new()
        .measure(&image, &DetectionContext::new())
        .expect("Scale bar should be found");

    // 3. Bar geometry in full-image coordinates
    assert_abs_diff_eq!(bar.line.length(), 100.0, epsilon = 3.0);
    assert!(bar.line.y1 > 255.0 && bar.line.y1 < 268.0, "Bar at y {}", bar.line.y1);
    assert!(bar.line.is_near_horizontal(5.0));

    // 4. Label value and factor
    assert!(bar.value_recognized);
    assert_eq!(bar.value, 100.0);
    assert_abs_diff_eq!(bar.factor, 0.1 / bar.line.length(), epsilon = 1e-12);
}

#[test]
fn test_custom_source_value_is_used() {
    let calibrator = ScaleCalibrator::with_source(Box::new(FixedValue(Some(50.0))));
    let bar = calibrator
        .measure(&scale_bar_image(), &DetectionContext::new())
        .expect("Scale bar should be found");

    assert_eq!(bar.value, 50.0);
    assert!(bar.value_recognized);
}

#[test]
fn test_unreadable_label_falls_back() {
    // 1. Reader that never recognizes anything
    let calibrator = ScaleCalibrator::with_source(Box::new(FixedValue(None)));

    // 2. Bar is still measured with the fallback value
    let bar = calibrator
        .measure(&scale_bar_image(), &DetectionContext::new())
        .expect("Scale bar should be found");
    assert!(!bar.value_recognized);
    assert_eq!(bar.value, FALLBACK_SCALE_VALUE);

    // 3. Non-positive readings count as unrecognized
    let zero = ScaleCalibrator::with_source(Box::new(FixedValue(Some(0.0))));
    let bar = zero
        .measure(&scale_bar_image(), &DetectionContext::new())
        .expect("Scale bar should be found");
    assert!(!bar.value_recognized);
}

#[test]
fn test_image_without_bar_is_uncalibrated() {
    let calibrator = ScaleCalibrator::new();
    let ctx = DetectionContext::new();

    assert!(calibrator.measure(&blank(400, 300), &ctx).is_none());
    assert_eq!(calibrator.calibrate(&blank(400, 300), &ctx), 0.0);

    // A bar in the top half is outside the search band
    let flipped = DynamicImage::ImageLuma8(imageops::flip_vertical(&scale_bar_image().to_luma8()));
    assert_eq!(calibrator.calibrate(&flipped, &ctx), 0.0);
}

#[test]
fn test_factor_applies_to_cells() {
    // 1. Cells of known diameter
    let mut cells = vec![Cell::new(10.0, 10.0, 5.0, 78.5), Cell::new(50.0, 50.0, 20.0, 1256.6)];

    // 2. 100 units over 200 px
    let factor = calibration::scale_factor(100.0, 200.0);
    assert_abs_diff_eq!(factor, 0.0005, epsilon = 1e-12);
    calibration::apply_to_cells(&mut cells, factor);

    // 3. Physical diameter follows the pixel diameter
    for cell in &cells {
        assert!(cell.is_calibrated());
        assert_abs_diff_eq!(cell.diameter_unit, cell.diameter_px * factor, epsilon = 1e-12);
    }
    assert_eq!(calibration::scale_factor(100.0, 0.0), 0.0);
}
