//! Error types for upscale-gan-rs.
//!
//! Every failure in a training run is fatal: nothing in the crate retries, and
//! the CLI reports the error on stderr before exiting non-zero.
//!
//! # Example
//!
//! ```rust
//! use upscale_gan_rs::{UpscaleConfig, UpscaleError};
//!
//! let mut config = UpscaleConfig::default_with_root("data/train_30fps");
//! config.data.scale = 4;
//!
//! match config.validate() {
//!     Err(UpscaleError::Config(msg)) => assert!(msg.contains("scale")),
//!     other => panic!("expected a config error, got {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Result type alias for upscale-gan-rs operations.
pub type Result<T> = std::result::Result<T, UpscaleError>;

/// Errors that can occur while indexing frames, building models or training.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpscaleError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Frame directory or dataset error.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Image decode / encode error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Tensor shape did not match what the training protocol expects.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Expected shape.
        expected: String,
        /// Actual shape.
        got: String,
    },

    /// Model construction or loading error.
    #[error("model error: {0}")]
    Model(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// Checkpoint error.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Completion hook failed.
    #[error("completion hook error: {0}")]
    Hook(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Progress bar template error.
    #[error("template error: {0}")]
    Template(String),
}

impl UpscaleError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl std::fmt::Debug, got: impl std::fmt::Debug) -> Self {
        Self::ShapeMismatch {
            expected: format!("{expected:?}"),
            got: format!("{got:?}"),
        }
    }

    /// Create a dataset error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<indicatif::style::TemplateError> for UpscaleError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        UpscaleError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_display() {
        let error = UpscaleError::Config("batch_size must be > 0".to_string());
        assert_eq!(
            error.to_string(),
            "configuration error: batch_size must be > 0"
        );
    }

    #[test]
    fn test_shape_mismatch_helper() {
        let error = UpscaleError::shape_mismatch([9, 1, 4, 4], [9, 1, 3, 4]);
        assert_eq!(
            error.to_string(),
            "shape mismatch: expected [9, 1, 4, 4], got [9, 1, 3, 4]"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "frames missing");
        let error: UpscaleError = io_error.into();
        assert!(matches!(error, UpscaleError::Io(_)));
        assert!(error.to_string().contains("frames missing"));
    }

    #[test]
    fn test_config_parse_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("a: b: :::").unwrap_err();
        let error: UpscaleError = yaml_error.into();
        assert!(error.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_candle_error_conversion() {
        use candle_core::{DType, Device, Tensor};

        let a = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        let b = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        let error: UpscaleError = a.broadcast_add(&b).unwrap_err().into();
        assert!(error.to_string().contains("candle error"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let error: UpscaleError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(error.source().is_some());
    }
}
