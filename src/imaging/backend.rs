//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines what the optimizer needs from pixel
//! code: identify, transcode, and a capability check per output format.
//! Sources are handed over as bytes because they usually arrive from the
//! network rather than from disk.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. A recording mock lives in this module's tests.

use super::params::{OutputFormat, TranscodeParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Output format {0} is not supported by this backend")]
    Unsupported(OutputFormat),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Read the native dimensions of an encoded image.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Whether this backend can encode `format`.
    fn supports(&self, format: OutputFormat) -> bool;

    /// Decode `source` once and write every variant.
    ///
    /// Returns the byte size of each written file, in the order of `variants`.
    fn transcode(
        &self,
        source: &[u8],
        variants: &[TranscodeParams],
    ) -> Result<Vec<u64>, BackendError>;
}
