//! Integration tests for neural segmentation with an in-memory backend.
//!
//! Tests cover:
//! - Decoding class masks back to image coordinates
//! - Class names and confidence of decoded cells
//! - IoU suppression of duplicate detections across classes
//! - Unsupported output shapes and missing models
//! - Running the network through the cell detector

mod common;

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use cellscope::neural::model::ModelOutput;
use cellscope::{InferenceError, NeuralNetDetector, NeuralNetParams};

use common::*;

fn detector(classes: usize, size: usize, discs: &[(usize, i32, i32, i32)]) -> NeuralNetDetector {
    NeuralNetDetector::with_backend(Box::new(FakeBackend {
        output: ModelOutput {
            shape: vec![1, classes, size, size],
            data: class_planes(classes, size, discs),
        },
    }))
}

fn small_params() -> NeuralNetParams {
    NeuralNetParams {
        input_size: 64,
        max_cell_size: 5000.0,
        ..NeuralNetParams::default()
    }
}

#[test]
fn test_mask_maps_back_to_image_coordinates() {
    // 1. Class-1 disc at the centre of a 64x64 output
    let detector = detector(2, 64, &[(1, 32, 32, 10)]);
    assert!(detector.is_model_loaded());

    // 2. A 128x128 image letterboxes at scale 0.5 without padding
    let image = blank(128, 128);
    let mut params = small_params();
    params.class_names = BTreeMap::from([(1, "Lymphocyte".to_string())]);
    let cells = detector.detect_cells(&image, &params);

    // 3. One cell, twice the mask size, labelled with its class
    assert_eq!(cells.len(), 1);
    let cell = &cells[0];
    assert!(near(cell, 64.0, 64.0, 2.0), "Centre ({}, {})", cell.center_x, cell.center_y);
    assert_abs_diff_eq!(cell.radius, 20.0, epsilon = 2.5);
    assert_eq!(cell.class_id, 1);
    assert_eq!(cell.class_name, "Lymphocyte");
    assert_eq!(cell.confidence, params.confidence_threshold);
}

#[test]
fn test_background_plane_is_ignored() {
    // Only the background plane fires
    let detector = detector(2, 64, &[(0, 32, 32, 10)]);
    let cells = detector.detect_cells(&blank(128, 128), &small_params());
    assert!(cells.is_empty());
}

#[test]
fn test_size_filter_drops_small_regions() {
    let detector = detector(2, 64, &[(1, 16, 16, 10), (1, 50, 50, 1)]);
    let cells = detector.detect_cells(&blank(128, 128), &small_params());

    assert_eq!(cells.len(), 1, "The tiny region is below min_cell_size");
    assert!(near(&cells[0], 32.0, 32.0, 2.0));
    assert_eq!(cells[0].class_name, "Class 1");
}

#[test]
fn test_duplicate_class_detections_are_suppressed() {
    // 1. Two classes fire on the same disc
    let detector = detector(3, 64, &[(1, 32, 32, 10), (2, 32, 32, 10)]);

    // 2. With NMS one cell survives
    let cells = detector.detect_cells(&blank(128, 128), &small_params());
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].class_id, 1);

    // 3. Without NMS both are reported
    let params = NeuralNetParams {
        nms_threshold: 0.0,
        ..small_params()
    };
    assert_eq!(detector.detect_cells(&blank(128, 128), &params).len(), 2);
}

#[test]
fn test_unexpected_output_rank_is_an_error() {
    let detector = NeuralNetDetector::with_backend(Box::new(FakeBackend {
        output: ModelOutput {
            shape: vec![64, 64],
            data: vec![0.0; 64 * 64],
        },
    }));

    let result = detector.detect_regions(&blank(128, 128), &small_params());
    assert!(matches!(result, Err(InferenceError::UnexpectedRank(2))));
    assert!(detector.detect_cells(&blank(128, 128), &small_params()).is_empty());
}

#[test]
fn test_missing_model_reports_errors() -> anyhow::Result<()> {
    // 1. No model loaded
    let mut detector = NeuralNetDetector::new();
    assert!(!detector.is_model_loaded());
    assert_eq!(detector.model_info(), "No model loaded");
    let result = detector.detect_regions(&single_disc(), &small_params());
    assert!(matches!(result, Err(InferenceError::ModelNotLoaded)));

    // 2. Loading a missing file fails and leaves the detector unloaded
    let temp_dir = tempfile::tempdir()?;
    let missing = temp_dir.path().join("absent.rten");
    let err = detector.load_model(&missing, false).unwrap_err();
    assert!(matches!(err, InferenceError::ModelNotFound(ref p) if p == &missing));
    assert!(!detector.is_model_loaded());

    Ok(())
}

#[test]
fn test_cell_detector_runs_neural_strategy() {
    // 1. Detector holding an in-memory network
    let cell_detector = CellDetector::new().with_neural(detector(2, 64, &[(1, 32, 32, 10)]));
    assert!(cell_detector.neural().is_some_and(|n| n.model_info().contains("<in-memory>")));

    // 2. Neural algorithm selected in the detection parameters
    let mut params = DetectionParams::default().with_algorithm(DetectionAlgorithm::NeuralNetwork);
    params.neural = small_params();
    let cells = cell_detector.detect_cells(&blank(128, 128), &params, &DetectionContext::new());

    // 3. Same result as the network on its own
    assert_eq!(cells.len(), 1);
    assert!(near(&cells[0], 64.0, 64.0, 2.0));
    assert!(cells[0].cropped_image.is_some());
}
