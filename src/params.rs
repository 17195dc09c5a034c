use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Detection algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionAlgorithm {
    #[default]
    HoughCircles,
    ContourBased,
    Watershed,
    Morphology,
    AdaptiveThreshold,
    BlobDetection,
    NeuralNetwork,
}

impl DetectionAlgorithm {
    pub const ALL: [DetectionAlgorithm; 7] = [
        DetectionAlgorithm::HoughCircles,
        DetectionAlgorithm::ContourBased,
        DetectionAlgorithm::Watershed,
        DetectionAlgorithm::Morphology,
        DetectionAlgorithm::AdaptiveThreshold,
        DetectionAlgorithm::BlobDetection,
        DetectionAlgorithm::NeuralNetwork,
    ];

    /// Human-readable description of the algorithm.
    pub fn description(self) -> &'static str {
        match self {
            DetectionAlgorithm::HoughCircles => "Hough transform for circles",
            DetectionAlgorithm::ContourBased => "Contour-based detection",
            DetectionAlgorithm::Watershed => "Watershed segmentation",
            DetectionAlgorithm::Morphology => "Morphological operations",
            DetectionAlgorithm::AdaptiveThreshold => "Adaptive threshold",
            DetectionAlgorithm::BlobDetection => "Blob detector",
            DetectionAlgorithm::NeuralNetwork => "Neural network segmentation",
        }
    }

    /// Whether the algorithm goes through the distance-based overlap policy.
    pub fn is_classic(self) -> bool {
        !matches!(self, DetectionAlgorithm::NeuralNetwork)
    }
}

/// Structuring element shape for morphological operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphShape {
    Rect,
    Cross,
    #[default]
    Ellipse,
}

/// Local threshold estimate used by adaptive binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    Mean,
    #[default]
    Gaussian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    pub min_perimeter: f64,
    pub max_perimeter: f64,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            min_perimeter: 50.0,
            max_perimeter: 800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatershedParams {
    /// Number of markers to keep, strongest first; `0` keeps every seed.
    pub markers: usize,
    pub min_distance: f64,
}

impl Default for WatershedParams {
    fn default() -> Self {
        Self {
            markers: 0,
            min_distance: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyParams {
    pub kernel_size: u8,
    pub iterations: u32,
    pub shape: MorphShape,
}

impl Default for MorphologyParams {
    fn default() -> Self {
        Self {
            kernel_size: 5,
            iterations: 2,
            shape: MorphShape::Ellipse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveParams {
    /// Odd neighbourhood size.
    pub block_size: u32,
    pub c: f64,
    pub method: AdaptiveMethod,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            block_size: 11,
            c: 2.0,
            method: AdaptiveMethod::Gaussian,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub threshold_step: f32,
    pub min_repeatability: usize,
    pub min_convexity: f64,
    pub min_dist_between_blobs: f64,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            min_threshold: 50.0,
            max_threshold: 220.0,
            threshold_step: 10.0,
            min_repeatability: 2,
            min_convexity: 0.8,
            min_dist_between_blobs: 10.0,
        }
    }
}

/// Gradient Hough circle transform parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughParams {
    /// Inverse accumulator resolution.
    pub dp: f64,
    /// Minimum distance between detected centres.
    pub min_dist: f64,
    /// Upper Canny threshold; the lower one is half of it.
    pub param1: f64,
    /// Accumulator threshold for centres.
    pub param2: f64,
    pub min_radius: u32,
    pub max_radius: u32,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            dp: 1.0,
            min_dist: 30.0,
            param1: 90.0,
            param2: 50.0,
            min_radius: 30,
            max_radius: 150,
        }
    }
}

/// Parameters for the neural segmentation strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralNetParams {
    pub model_path: String,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub min_cell_size: f64,
    pub max_cell_size: f64,
    pub nms_threshold: f32,
    pub use_gpu: bool,
    /// Number of cell classes, background excluded.
    pub num_classes: u32,
    pub class_names: BTreeMap<u32, String>,
    pub fill_holes: bool,
    pub morph_kernel_size: u8,
    /// `0.0` disables the lower circularity bound.
    pub min_circularity: f64,
    pub max_circularity: f64,
}

impl Default for NeuralNetParams {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            input_size: 512,
            confidence_threshold: 0.5,
            min_cell_size: 50.0,
            max_cell_size: 1000.0,
            nms_threshold: 0.3,
            use_gpu: false,
            num_classes: 3,
            class_names: BTreeMap::new(),
            fill_holes: true,
            morph_kernel_size: 3,
            min_circularity: 0.0,
            max_circularity: 1.0,
        }
    }
}

impl NeuralNetParams {
    pub fn class_name(&self, class_id: u32) -> String {
        self.class_names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("Class {}", class_id))
    }

    pub fn filters_circularity(&self) -> bool {
        self.min_circularity > 0.0 || self.max_circularity < 1.0
    }
}

/// Configuration of a single detection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    pub algorithm: DetectionAlgorithm,

    pub min_cell_area: f64,
    pub max_cell_area: f64,
    pub min_circularity: f64,
    pub max_circularity: f64,
    /// Fraction of the radius sum two classic detections may overlap by.
    pub overlap_threshold: f64,

    pub contour: ContourParams,
    pub watershed: WatershedParams,
    pub morphology: MorphologyParams,
    pub adaptive: AdaptiveParams,
    pub blob: BlobParams,
    pub hough: HoughParams,
    pub neural: NeuralNetParams,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            algorithm: DetectionAlgorithm::HoughCircles,
            min_cell_area: 500.0,
            max_cell_area: 15000.0,
            min_circularity: 0.3,
            max_circularity: 1.0,
            overlap_threshold: 0.3,
            contour: ContourParams::default(),
            watershed: WatershedParams::default(),
            morphology: MorphologyParams::default(),
            adaptive: AdaptiveParams::default(),
            blob: BlobParams::default(),
            hough: HoughParams::default(),
            neural: NeuralNetParams::default(),
        }
    }
}

impl DetectionParams {
    pub fn with_algorithm(mut self, algorithm: DetectionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn area_in_range(&self, area: f64) -> bool {
        area >= self.min_cell_area && area <= self.max_cell_area
    }

    pub fn circularity_in_range(&self, circularity: f64) -> bool {
        circularity >= self.min_circularity && circularity <= self.max_circularity
    }

    /// Load parameters from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid parameter file {}", path.display()))
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
