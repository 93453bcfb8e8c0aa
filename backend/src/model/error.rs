use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no weights file named {filename} found under {roots:?}")]
    WeightsNotFound { filename: String, roots: Vec<PathBuf> },
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("invalid input image: {0}")]
    Input(String),
    #[error("inference failed: {0}")]
    Inference(String),
}
