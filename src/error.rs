//! Error types shared by the codec adapter, the compressor and the PDF path.

use thiserror::Error;

use crate::codec::{InputFormat, OutputCodec};

#[derive(Error, Debug)]
pub enum CompressError {
    /// No available decoder recognises the input signature.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The signature matched but the decoder failed partway.
    #[error("Corrupt {format} data in {name}: {reason}")]
    CorruptData {
        name: String,
        format: InputFormat,
        reason: String,
    },

    #[error("Failed to encode {codec} at quality {quality}: {reason}")]
    EncodeFailure {
        codec: OutputCodec,
        quality: u8,
        reason: String,
    },

    #[error("Invalid budget: {0}")]
    InvalidBudget(String),

    #[error("Invalid search configuration: {0}")]
    InvalidConfig(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for CompressError {
    fn from(e: lopdf::Error) -> Self {
        CompressError::Pdf(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CompressError>;
