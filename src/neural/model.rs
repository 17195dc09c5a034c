use std::path::{Path, PathBuf};

use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::InferenceError;

/// NCHW input tensor handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

/// Raw network output, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Something that can run a forward pass on a prepared input tensor.
pub trait InferenceBackend {
    fn run(&self, input: &InputTensor) -> Result<ModelOutput, InferenceError>;

    /// Short backend label for model info output.
    fn backend_name(&self) -> &str;
}

/// CPU inference through an `.rten` model.
pub struct RtenBackend {
    model: Model,
    path: PathBuf,
}

impl RtenBackend {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        if !path.exists() {
            return Err(InferenceError::ModelNotFound(path.to_path_buf()));
        }
        let model =
            Model::load_file(path).map_err(|e| InferenceError::Backend(format!("failed to load model: {}", e)))?;
        Ok(Self {
            model,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InferenceBackend for RtenBackend {
    fn run(&self, input: &InputTensor) -> Result<ModelOutput, InferenceError> {
        let tensor = Tensor::from_data(&input.shape, input.data.clone());
        let output = self
            .model
            .run_one(tensor.view().into(), None)
            .map_err(|e| InferenceError::Backend(format!("forward pass failed: {}", e)))?;
        let output: Tensor<f32> = output
            .try_into()
            .map_err(|_| InferenceError::Backend("model output is not a float tensor".to_string()))?;

        Ok(ModelOutput {
            shape: output.shape().to_vec(),
            data: output.to_vec(),
        })
    }

    fn backend_name(&self) -> &str {
        "CPU"
    }
}
