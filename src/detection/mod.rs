pub mod blob;
pub mod circles;
pub mod contours;
pub mod mapper;
pub mod preprocessing;
pub mod strategies;
pub mod watershed;

use std::path::Path;

use anyhow::Result;
use image::{DynamicImage, GenericImageView};

use crate::models::{Cell, Region};
use crate::neural::{self, NeuralNetDetector};
use crate::overlap;
use crate::params::DetectionParams;
use crate::pipeline::DetectionContext;
use strategies::strategy_for;

/// Main detection orchestrator.
///
/// Runs the selected strategy, maps its regions to cells and resolves
/// overlaps. Holds the neural detector so a model is loaded once and reused.
#[derive(Default)]
pub struct CellDetector {
    neural: Option<NeuralNetDetector>,
}

impl CellDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_neural(mut self, detector: NeuralNetDetector) -> Self {
        self.neural = Some(detector);
        self
    }

    /// Load a neural model for the `NeuralNetwork` algorithm.
    pub fn load_model<P: AsRef<Path>>(&mut self, path: P, use_gpu: bool) -> Result<()> {
        let detector = self.neural.get_or_insert_with(NeuralNetDetector::new);
        detector.load_model(path, use_gpu)?;
        Ok(())
    }

    pub fn neural(&self) -> Option<&NeuralNetDetector> {
        self.neural.as_ref()
    }

    /// Candidate regions of the configured strategy, before any filtering.
    pub fn detect_regions(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let strategy = strategy_for(params.algorithm, self.neural.as_ref());
        log::debug!("Running {} strategy", strategy.name());
        strategy.detect(image, params, ctx)
    }

    /// Detect cells in an image.
    ///
    /// Never fails: empty images and strategy errors are logged and give an
    /// empty list.
    pub fn detect_cells(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Vec<Cell> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            log::warn!("Cannot detect cells: image is empty");
            return Vec::new();
        }

        let regions = match self.detect_regions(image, params, ctx) {
            Ok(regions) => regions,
            Err(e) => {
                log::error!("{} detection failed: {:#}", params.algorithm.description(), e);
                return Vec::new();
            }
        };
        log::debug!("{} candidate regions", regions.len());

        let cells: Vec<Cell> = regions
            .iter()
            .filter_map(|region| mapper::region_to_cell(image, region))
            .collect();

        let cells = if params.algorithm.is_classic() {
            let filtered = filter_by_area(cells, params);
            log::debug!("{} cells after area filter", filtered.len());
            overlap::resolve_by_distance(filtered, params.overlap_threshold)
        } else {
            neural::suppress_overlaps(cells, &params.neural)
        };

        log::info!(
            "{}: {} cells detected in {}x{} image",
            params.algorithm.description(),
            cells.len(),
            width,
            height
        );
        cells
    }
}

/// Keep cells whose area lies within the configured bounds.
pub fn filter_by_area(cells: Vec<Cell>, params: &DetectionParams) -> Vec<Cell> {
    cells
        .into_iter()
        .filter(|cell| params.area_in_range(cell.area))
        .collect()
}
