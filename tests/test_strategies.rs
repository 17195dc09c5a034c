//! Integration tests for the classic segmentation strategies.
//!
//! Tests cover:
//! - Contour and adaptive threshold detection of an isolated cell
//! - Watershed separation of touching cells
//! - Morphology, blob and Hough detection on synthetic slides
//! - Area bounds and overlap invariants of the returned cells
//! - Debug image output per strategy
//! - Empty and blank inputs

mod common;

use approx::assert_abs_diff_eq;
use image::DynamicImage;

use common::*;

fn detect(image: &DynamicImage, algorithm: DetectionAlgorithm) -> Vec<Cell> {
    let params = DetectionParams::default().with_algorithm(algorithm);
    CellDetector::new().detect_cells(image, &params, &DetectionContext::new())
}

#[test]
fn test_contour_detects_isolated_cell() {
    // 1. One dark disc on a light slide
    let image = single_disc();

    // 2. Detect with the contour strategy
    let cells = detect(&image, DetectionAlgorithm::ContourBased);

    // 3. Exactly one cell, centred on the disc
    assert_eq!(cells.len(), 1, "Expected one cell, got {:?}", cells.len());
    let cell = &cells[0];
    assert_abs_diff_eq!(cell.radius, 30.0, epsilon = 2.0);
    assert_abs_diff_eq!(cell.center_x, 100.0, epsilon = 2.0);
    assert_abs_diff_eq!(cell.center_y, 100.0, epsilon = 2.0);
    assert_abs_diff_eq!(cell.diameter_px, cell.radius * 2.0, epsilon = 1e-9);

    // 4. Crop and provenance defaults
    assert!(cell.cropped_image.is_some(), "Cell should carry its crop");
    assert!(!cell.is_calibrated());
    assert_eq!(cell.diameter_unit, 0.0);
}

#[test]
fn test_adaptive_threshold_detects_isolated_cell() {
    let image = single_disc();
    let cells = detect(&image, DetectionAlgorithm::AdaptiveThreshold);

    assert_eq!(cells.len(), 1);
    assert!(near(&cells[0], 100.0, 100.0, 3.0));
}

#[test]
fn test_watershed_splits_touching_cells() {
    // 1. Two discs whose rims touch
    let image = dark_discs(200, 120, &[(50, 50, 30), (105, 50, 30)]);

    // 2. Detect with watershed
    let mut cells = detect(&image, DetectionAlgorithm::Watershed);
    cells.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));

    // 3. Two cells, one per disc
    assert_eq!(cells.len(), 2, "Touching discs should be split");
    assert!(cells[0].center_x < 78.0, "Left cell at {}", cells[0].center_x);
    assert!(cells[1].center_x > 78.0, "Right cell at {}", cells[1].center_x);
}

#[test]
fn test_watershed_marker_cap_merges_basins() {
    let image = dark_discs(200, 120, &[(50, 50, 30), (105, 50, 30)]);
    let mut params = DetectionParams::default().with_algorithm(DetectionAlgorithm::Watershed);
    params.watershed.markers = 1;
    params.max_circularity = 1.0;
    params.min_circularity = 0.0;

    let regions = CellDetector::new()
        .detect_regions(&image, &params, &DetectionContext::new())
        .expect("Watershed should not fail");

    assert_eq!(regions.len(), 1, "A single marker floods one basin");
}

#[test]
fn test_morphology_detects_separated_cells() {
    let image = dark_discs(300, 150, &[(70, 75, 35), (220, 75, 35)]);
    let mut params = DetectionParams::default().with_algorithm(DetectionAlgorithm::Morphology);
    params.min_cell_area = 100.0;

    let cells = CellDetector::new().detect_cells(&image, &params, &DetectionContext::new());

    assert_eq!(cells.len(), 2);
    for cell in &cells {
        assert!(near(cell, 70.0, 75.0, 3.0) || near(cell, 220.0, 75.0, 3.0));
    }
}

#[test]
fn test_blob_detects_dark_cells() {
    let image = dark_discs(300, 150, &[(70, 75, 25), (220, 75, 25)]);
    let cells = detect(&image, DetectionAlgorithm::BlobDetection);

    assert_eq!(cells.len(), 2);
    for cell in &cells {
        assert!(near(cell, 70.0, 75.0, 2.0) || near(cell, 220.0, 75.0, 2.0));
        assert_abs_diff_eq!(cell.radius, 25.0, epsilon = 3.0);
    }
}

#[test]
fn test_hough_detects_circles() {
    // 1. Two discs of radius 40, inside the default radius band
    let image = dark_discs(300, 200, &[(80, 100, 40), (220, 100, 40)]);

    // 2. Default algorithm is Hough circles
    let params = DetectionParams::default();
    assert_eq!(params.algorithm, DetectionAlgorithm::HoughCircles);
    let mut cells = CellDetector::new().detect_cells(&image, &params, &DetectionContext::new());
    cells.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));

    // 3. One circle per disc with the drawn radius
    assert_eq!(cells.len(), 2);
    assert!(near(&cells[0], 80.0, 100.0, 3.0));
    assert!(near(&cells[1], 220.0, 100.0, 3.0));
    for cell in &cells {
        assert_abs_diff_eq!(cell.radius, 40.0, epsilon = 3.0);
        assert_abs_diff_eq!(cell.area, std::f64::consts::PI * cell.radius * cell.radius, epsilon = 1e-6);
    }
}

#[test]
fn test_classic_results_respect_area_and_overlap_invariants() {
    let image = dark_discs(400, 200, &[(60, 60, 30), (180, 70, 35), (320, 120, 40)]);

    for algorithm in DetectionAlgorithm::ALL {
        if !algorithm.is_classic() {
            continue;
        }
        let params = DetectionParams::default().with_algorithm(algorithm);
        let cells = CellDetector::new().detect_cells(&image, &params, &DetectionContext::new());

        for cell in &cells {
            assert!(
                params.area_in_range(cell.area),
                "{:?}: area {} outside bounds",
                algorithm,
                cell.area
            );
        }
        for (i, a) in cells.iter().enumerate() {
            for b in cells.iter().skip(i + 1) {
                let min_distance = (a.radius + b.radius) * (1.0 - params.overlap_threshold);
                assert!(a.distance_to(b) >= min_distance, "{:?}: overlapping survivors", algorithm);
            }
        }
    }
}

#[test]
fn test_detection_is_deterministic() {
    let image = dark_discs(300, 150, &[(70, 75, 30), (220, 75, 30)]);
    for algorithm in [DetectionAlgorithm::ContourBased, DetectionAlgorithm::HoughCircles] {
        let first = detect(&image, algorithm);
        let second = detect(&image, algorithm);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.center(), b.center());
            assert_eq!(a.radius, b.radius);
        }
    }
}

#[test]
fn test_blank_and_empty_images_give_no_cells() {
    let blank_image = blank(200, 200);
    let empty_image = DynamicImage::new_luma8(0, 0);

    for algorithm in DetectionAlgorithm::ALL {
        if !algorithm.is_classic() {
            continue;
        }
        assert!(detect(&blank_image, algorithm).is_empty(), "{:?} found cells on a blank slide", algorithm);
        assert!(detect(&empty_image, algorithm).is_empty());
    }
}

#[test]
fn test_neural_algorithm_without_model_gives_no_cells() {
    let cells = detect(&single_disc(), DetectionAlgorithm::NeuralNetwork);
    assert!(cells.is_empty());
}

#[test]
fn test_debug_images_written_per_stage() -> anyhow::Result<()> {
    // 1. Fresh debug directory
    let temp_dir = tempfile::tempdir()?;
    let debug_dir = temp_dir.path().join("debug");
    let ctx = DetectionContext::new().with_debug(debug_dir.clone())?;
    assert!(ctx.debug_enabled());

    // 2. Run two strategies
    let image = single_disc();
    let detector = CellDetector::new();
    for algorithm in [DetectionAlgorithm::ContourBased, DetectionAlgorithm::Watershed] {
        let params = DetectionParams::default().with_algorithm(algorithm);
        detector.detect_cells(&image, &params, &ctx);
    }

    // 3. Stage images land in per-strategy folders
    assert!(debug_dir.join("contour").join("01_binary.png").exists());
    assert!(debug_dir.join("contour").join("02_cleaned.png").exists());
    assert!(debug_dir.join("watershed").join("03_labels.png").exists());

    Ok(())
}
