use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};

use crate::calibration::{self, ScaleCalibrator};
use crate::detection::CellDetector;
use crate::models::Cell;
use crate::params::DetectionParams;
use crate::pipeline::DetectionContext;

/// Cells found in one image.
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Physical units per pixel, `0.0` when uncalibrated.
    pub calibration_factor: f64,
    pub cells: Vec<Cell>,
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image {}: {}", path.display(), e))
}

/// Detect cells in one decoded image, stamp provenance and apply the
/// calibration factor when a calibrator is given. Debug images are prefixed
/// with the file stem of `source`.
pub fn process_image(
    image: &DynamicImage,
    source: &str,
    params: &DetectionParams,
    detector: &CellDetector,
    calibrator: Option<&ScaleCalibrator>,
    ctx: &DetectionContext,
) -> (Vec<Cell>, f64) {
    let ctx = &ctx.for_image(Path::new(source));
    let mut cells = detector.detect_cells(image, params, ctx);
    for cell in &mut cells {
        cell.source_image_path = source.to_string();
    }

    let factor = calibrator.map_or(0.0, |c| c.calibrate(image, ctx));
    if factor > 0.0 {
        calibration::apply_to_cells(&mut cells, factor);
    }
    (cells, factor)
}

/// Process images one after another. Unreadable images are logged and
/// skipped.
pub fn process_images(
    paths: &[PathBuf],
    params: &DetectionParams,
    detector: &CellDetector,
    calibrator: Option<&ScaleCalibrator>,
    ctx: &DetectionContext,
) -> Vec<ImageReport> {
    let mut reports = Vec::new();
    for (i, path) in paths.iter().enumerate() {
        log::info!("Processing image {} of {}: {}", i + 1, paths.len(), path.display());
        let image = match load_image(path) {
            Ok(image) => image,
            Err(e) => {
                log::error!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };

        let source = path.display().to_string();
        let (cells, calibration_factor) = process_image(&image, &source, params, detector, calibrator, ctx);
        reports.push(ImageReport {
            path: path.clone(),
            width: image.width(),
            height: image.height(),
            calibration_factor,
            cells,
        });
    }
    reports
}
