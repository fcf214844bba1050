use thiserror::Error;

/// Errors raised while loading the decoder or driving the viewer.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Checkpoint or architecture file could not be loaded. Fatal at startup.
    #[error("Failed to load model from {path}: {message}")]
    Load { path: String, message: String },

    /// Startup configuration is inconsistent with the loaded decoder.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Latent vector length does not match what the decoder expects.
    #[error("Latent shape mismatch: decoder expects {expected} dimensions, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The decoder failed or produced inconsistent head outputs.
    #[error("Inference failed: {message}")]
    Inference { message: String },

    /// A control or coordinate index is outside the controllable range.
    #[error("Index {index} out of range for {len} controls")]
    Index { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, ViewerError>;

impl ViewerError {
    pub(crate) fn inference(context: &str, err: impl std::fmt::Display) -> Self {
        ViewerError::Inference {
            message: format!("{context}: {err}"),
        }
    }
}
