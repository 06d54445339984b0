use miniz_oxide::inflate::TINFLStatus;
use thiserror::Error;

/// Errors reported by the GIF and PNG decoding pipelines.
///
/// Every error is terminal for the decode that raised it: no partial
/// [`AnimatedImage`](crate::AnimatedImage) is ever handed back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The input file could not be read.
    #[error("i/o error reading the input")]
    Io(#[from] std::io::Error),

    /// The byte stream ended in the middle of a structure.
    #[error("input ended unexpectedly while reading {0}")]
    InputTooShort(&'static str),

    /// The leading bytes match neither the PNG signature nor a GIF header.
    #[error("input is neither a GIF nor a PNG stream")]
    UnknownFormat,

    /// The stream is structurally readable but semantically illegal.
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),

    /// An LZW code stream or a PNG filter byte violated the algorithm's
    /// constraints.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(&'static str),

    /// The feature is recognized but not implemented.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// The zlib stream inside a PNG could not be inflated.
    #[error("zlib inflate failed with status {0:?}")]
    DecompressionFailure(TINFLStatus),
}
