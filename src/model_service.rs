use crate::{detection::Detection, labels::LabelsError};
use async_trait::async_trait;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    MissingModel(String),
    #[error("Failed to load labels: {0}")]
    Labels(#[from] LabelsError),
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
    #[error("Inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn detect(&self, image: DynamicImage) -> Result<Vec<Detection>, ModelError>;
}
