//! Browser entry points.

use wasm_bindgen::prelude::*;

use crate::codec::OutputCodec;
use crate::compressor::{compress, CompressionRequest, SearchConfig};
use crate::pdf::recompress_pdf;
use crate::size::Budget;

fn budget_from_kb(max_kb: Option<f64>) -> Option<Budget> {
    max_kb.map(Budget::kb)
}

/// Compress an image to `format` ("jpeg", "png", "webp", "bmp", "tiff"),
/// optionally within `max_kb` kilobytes.
#[wasm_bindgen]
pub fn compress_image(
    input: &[u8],
    format: &str,
    quality: u8,
    max_kb: Option<f64>,
) -> Result<Vec<u8>, JsError> {
    let codec: OutputCodec = format.parse().map_err(|e| JsError::new(&format!("{}", e)))?;
    let result = compress(input, codec, quality, budget_from_kb(max_kb))
        .map_err(|e| JsError::new(&format!("Failed to compress image: {}", e)))?;
    Ok(result.bytes)
}

/// Re-encode every page of a scanned PDF as a JPEG at `dpi`.
#[wasm_bindgen]
pub fn compress_pdf(
    input: &[u8],
    quality: u8,
    dpi: u32,
    max_kb: Option<f64>,
) -> Result<Vec<u8>, JsError> {
    let mut request = CompressionRequest::new(OutputCodec::Jpeg, quality);
    if let Some(budget) = budget_from_kb(max_kb) {
        request = request
            .with_budget(budget)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
    }
    recompress_pdf(input, dpi, &request, &SearchConfig::default())
        .map_err(|e| JsError::new(&format!("Failed to compress PDF: {}", e)))
}
