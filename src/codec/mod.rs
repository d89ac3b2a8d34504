//! Codec adapter: signature-based decoding into [`DecodedImage`] and
//! encoding into any [`OutputCodec`] at a given quality.

mod adapter;
mod format;
mod registry;

pub use adapter::{
    clamp_quality, encode, flatten_opaque, CodecAdapter, Encode, MAX_QUALITY, MIN_QUALITY, WHITE,
};
pub use format::{ColorMode, InputFormat, OutputCodec};
pub use registry::{decode, CodecRegistry, DecodedImage, FormatDecoder};
