//! Error types for the pixpair workspace.

use thiserror::Error;

use crate::types::CropBounds;

/// Main error type for pixpair.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error
    #[error("Image processing error: {0}")]
    Image(String),

    /// A sample pair could not be decoded
    #[error("Failed to read sample (input: {input}, label: {label}): {source}")]
    SampleRead {
        input: String,
        label: String,
        #[source]
        source: Box<Error>,
    },

    /// Input and label lists loaded together differ in length
    #[error("Input/label length mismatch: {inputs} inputs vs {labels} labels")]
    LengthMismatch { inputs: usize, labels: usize },

    /// A crop would leave an empty image
    #[error("Crop {bounds} leaves no pixels of a {width}x{height} image")]
    DegenerateCrop {
        width: u32,
        height: u32,
        bounds: CropBounds,
    },

    /// Model error
    #[error("Model error: {0}")]
    Model(String),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Training error
    #[error("Training error: {0}")]
    Training(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Already exists error
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for pixpair operations.
pub type Result<T> = std::result::Result<T, Error>;
