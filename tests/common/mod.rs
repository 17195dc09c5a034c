#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from cellscope for tests
pub use cellscope::{
    Cell, CellDetector, DetectionAlgorithm, DetectionContext, DetectionParams, ScaleCalibrator,
};
