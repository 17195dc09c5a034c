//! Neural segmentation: letterboxed forward pass through a loaded model,
//! per-class mask decoding and IoU suppression.

pub mod model;
pub mod postprocess;
pub mod preprocess;

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};
use thiserror::Error;

use crate::detection::mapper;
use crate::models::{Cell, LabeledContour};
use crate::overlap;
use crate::params::NeuralNetParams;
use model::{InferenceBackend, RtenBackend};
use postprocess::ClassMasks;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("model file does not exist: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("input image is empty")]
    EmptyImage,

    #[error("unexpected output rank {0}, expected 3 (or 4 with a batch dimension)")]
    UnexpectedRank(usize),

    #[error("inference backend error: {0}")]
    Backend(String),
}

/// Cell detector backed by a segmentation network.
///
/// The model is loaded once and only read afterwards; concurrent callers
/// must serialize their use of one detector.
#[derive(Default)]
pub struct NeuralNetDetector {
    backend: Option<Box<dyn InferenceBackend>>,
    model_path: Option<PathBuf>,
}

impl NeuralNetDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector over an already constructed backend.
    pub fn with_backend(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend: Some(backend),
            model_path: None,
        }
    }

    /// Load an `.rten` model. GPU execution is not available; the flag is
    /// accepted and inference falls back to the CPU.
    pub fn load_model<P: AsRef<Path>>(&mut self, path: P, use_gpu: bool) -> Result<(), InferenceError> {
        let path = path.as_ref();
        log::info!("Loading neural network model from {}", path.display());

        let backend = match RtenBackend::load(path) {
            Ok(backend) => backend,
            Err(e) => {
                log::error!("Failed to load model {}: {}", path.display(), e);
                self.backend = None;
                self.model_path = None;
                return Err(e);
            }
        };

        if use_gpu {
            log::info!("GPU acceleration requested but unavailable, using CPU backend");
        }

        self.backend = Some(Box::new(backend));
        self.model_path = Some(path.to_path_buf());
        log::info!("Model loaded successfully");
        Ok(())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model_info(&self) -> String {
        let Some(backend) = &self.backend else {
            return "No model loaded".to_string();
        };
        let path = self
            .model_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<in-memory>".to_string());
        format!("Model: {}\nBackend: {}", path, backend.backend_name())
    }

    /// Run the network and decode labelled regions in image coordinates.
    pub fn detect_regions(
        &self,
        image: &DynamicImage,
        params: &NeuralNetParams,
    ) -> Result<Vec<LabeledContour>, InferenceError> {
        let backend = self.backend.as_ref().ok_or(InferenceError::ModelNotLoaded)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::EmptyImage);
        }

        log::info!("Starting neural network detection on image {}x{}", width, height);
        let letterbox = preprocess::letterbox(image, params.input_size.max(1));
        let input = preprocess::to_input_tensor(&letterbox);
        let output = backend.run(&input)?;
        log::debug!("Network output shape {:?}", output.shape);

        let masks = ClassMasks::from_output(output)?;
        Ok(postprocess::decode_classes(&masks, &letterbox, params))
    }

    /// Full neural detection. Errors are logged and yield an empty list.
    pub fn detect_cells(&self, image: &DynamicImage, params: &NeuralNetParams) -> Vec<Cell> {
        let regions = match self.detect_regions(image, params) {
            Ok(regions) => regions,
            Err(e) => {
                log::error!("Cannot detect cells: {}", e);
                return Vec::new();
            }
        };

        let cells: Vec<Cell> = regions
            .iter()
            .filter_map(|r| mapper::cell_from_labeled(image, r))
            .collect();
        let cells = suppress_overlaps(cells, params);
        log::info!("Neural network detection completed: {} cells found", cells.len());
        cells
    }
}

/// IoU suppression of overlapping neural detections when enabled.
pub fn suppress_overlaps(cells: Vec<Cell>, params: &NeuralNetParams) -> Vec<Cell> {
    if params.nms_threshold > 0.0 && cells.len() > 1 {
        let kept = overlap::resolve_by_iou(cells, params.nms_threshold as f64);
        log::debug!("After NMS: {} cells", kept.len());
        kept
    } else {
        cells
    }
}
