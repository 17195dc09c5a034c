pub mod batch;
pub mod calibration;
pub mod detection;
pub mod models;
pub mod neural;
pub mod optimizer;
pub mod overlap;
pub mod params;
pub mod pipeline;

pub use calibration::{ScaleBar, ScaleCalibrator, ScaleValueSource};
pub use detection::CellDetector;
pub use models::{Cell, Circle, KeyPoint, LabeledContour, LineSegment, Region};
pub use neural::{InferenceError, NeuralNetDetector};
pub use optimizer::{AutoFitOptimizer, AutoFitResult, FitOutcome, MatchingPolicy, OptimizerConfig};
pub use params::{DetectionAlgorithm, DetectionParams, NeuralNetParams};
pub use pipeline::{DebugConfig, DetectionContext};
