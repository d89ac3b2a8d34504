//! Size-targeted image compression.
//!
//! Decode any supported image, then either encode it once at a baseline
//! quality or search for the best quality (and, if needed, resolution) that
//! fits a byte budget. Scanned PDFs are handled page by page on top of the
//! same search.

pub mod batch;
pub mod codec;
pub mod compressor;
pub mod error;
pub mod pdf;
pub mod size;
mod wasm;

pub use batch::{compress_batch, BatchInput, BatchItem, BatchSummary};
pub use codec::{
    decode, encode, CodecAdapter, CodecRegistry, ColorMode, DecodedImage, Encode, InputFormat,
    OutputCodec,
};
pub use compressor::{
    compress, BudgetOutcome, CompressionRequest, CompressionResult, Compressor, SearchConfig,
};
pub use error::{CompressError, Result};
pub use size::{format_file_size, Budget, SizeUnit};
pub use wasm::{compress_image, compress_pdf};
