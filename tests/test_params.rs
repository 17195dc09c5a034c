//! Integration tests for detection parameters and the detection context.
//!
//! Tests cover:
//! - Partial JSON parameter files fall back to defaults
//! - Saving and reloading parameters
//! - Invalid and missing parameter files
//! - Debug directory validation

mod common;

use std::io::Write;

use cellscope::params::MorphShape;

use common::*;

#[test]
fn test_partial_json_uses_defaults() -> anyhow::Result<()> {
    // 1. Parameter file naming only a few fields
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{
            "algorithm": "watershed",
            "min_cell_area": 120.0,
            "morphology": {{ "shape": "rect" }},
            "neural": {{ "class_names": {{ "1": "Neutrophil" }} }}
        }}"#
    )?;

    // 2. Load it
    let params = DetectionParams::from_json_file(file.path())?;

    // 3. Named fields are set, everything else is default
    let defaults = DetectionParams::default();
    assert_eq!(params.algorithm, DetectionAlgorithm::Watershed);
    assert_eq!(params.min_cell_area, 120.0);
    assert_eq!(params.max_cell_area, defaults.max_cell_area);
    assert_eq!(params.morphology.shape, MorphShape::Rect);
    assert_eq!(params.morphology.kernel_size, defaults.morphology.kernel_size);
    assert_eq!(params.hough, defaults.hough);
    assert_eq!(params.neural.class_name(1), "Neutrophil");
    assert_eq!(params.neural.class_name(2), "Class 2");

    Ok(())
}

#[test]
fn test_params_survive_save_and_load() -> anyhow::Result<()> {
    // 1. Non-default parameters
    let mut params = DetectionParams::default().with_algorithm(DetectionAlgorithm::BlobDetection);
    params.blob.min_repeatability = 4;
    params.hough.param2 = 22.0;
    params.neural.class_names.insert(3, "Monocyte".to_string());

    // 2. Write and read back
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("params.json");
    std::fs::write(&path, params.to_json()?)?;
    let loaded = DetectionParams::from_json_file(&path)?;

    // 3. Identical
    assert_eq!(loaded, params);

    Ok(())
}

#[test]
fn test_invalid_parameter_files_are_errors() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "{{ \"algorithm\": \"not_an_algorithm\" }}")?;
    let err = DetectionParams::from_json_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid parameter file"));

    let temp_dir = tempfile::tempdir()?;
    let err = DetectionParams::from_json_file(temp_dir.path().join("missing.json")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read parameter file"));

    Ok(())
}

#[test]
fn test_algorithm_names_are_stable() -> anyhow::Result<()> {
    let names: Vec<String> = DetectionAlgorithm::ALL
        .iter()
        .map(|a| serde_json::to_value(a).map(|v| v.as_str().unwrap_or_default().to_string()))
        .collect::<Result<_, _>>()?;

    assert_eq!(
        names,
        [
            "hough_circles",
            "contour_based",
            "watershed",
            "morphology",
            "adaptive_threshold",
            "blob_detection",
            "neural_network"
        ]
    );
    assert!(DetectionAlgorithm::ALL.iter().filter(|a| !a.is_classic()).count() == 1);

    Ok(())
}

#[test]
fn test_debug_directory_must_be_empty() -> anyhow::Result<()> {
    // 1. Non-empty directory is rejected
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(temp_dir.path().join("leftover.png"), b"x")?;
    assert!(DetectionContext::new().with_debug(temp_dir.path().to_path_buf()).is_err());

    // 2. Missing directory is created
    let fresh = temp_dir.path().join("nested").join("debug");
    let ctx = DetectionContext::new().with_debug(fresh.clone())?;
    assert!(fresh.is_dir());
    assert!(ctx.debug_enabled());

    // 3. Default context writes nothing
    assert!(!DetectionContext::new().debug_enabled());

    Ok(())
}
