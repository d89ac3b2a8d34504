//! PDF pages as independent compression requests.
//!
//! Pages are rasterized in order, compressed in parallel, and gathered back
//! in page order. A document budget is a total, shared evenly by the pages.

mod assemble;
mod rasterize;

pub use assemble::{assemble_pdf, CompressedPage};
pub use rasterize::{PageRasterizer, ScannedPageRasterizer};

use log::info;
use rayon::prelude::*;

use crate::codec::DecodedImage;
use crate::compressor::{CompressionRequest, CompressionResult, Compressor, SearchConfig};
use crate::error::{CompressError, Result};

pub const DEFAULT_DPI: u32 = 150;

/// Split a document budget across `pages`, at least one byte each.
fn per_page_request(request: &CompressionRequest, pages: usize) -> CompressionRequest {
    let mut page_request = *request;
    if let Some(total) = request.budget {
        page_request.budget = Some((total / pages.max(1) as u64).max(1));
    }
    page_request
}

/// Compress already rendered pages, one result per page in page order.
///
/// The first failing page fails the whole document.
pub fn compress_pages(
    pages: &[DecodedImage],
    request: &CompressionRequest,
    config: &SearchConfig,
) -> Result<Vec<CompressionResult>> {
    let compressor = Compressor::new(*config);
    let page_request = per_page_request(request, pages.len());

    pages
        .par_iter()
        .map(|page| compressor.compress(page, &page_request))
        .collect()
}

/// Render every page of `rasterizer` at `dpi` and compress it.
pub fn compress_document<R: PageRasterizer + ?Sized>(
    rasterizer: &R,
    dpi: u32,
    request: &CompressionRequest,
    config: &SearchConfig,
) -> Result<Vec<CompressedPage>> {
    if dpi == 0 {
        return Err(CompressError::Pdf("dpi must be positive".into()));
    }
    let pages = (0..rasterizer.page_count())
        .map(|index| rasterizer.render(index, dpi))
        .collect::<Result<Vec<_>>>()?;
    info!("rendered {} page(s) at {} dpi", pages.len(), dpi);

    let results = compress_pages(&pages, request, config)?;
    Ok(results
        .into_iter()
        .map(|result| CompressedPage {
            codec: request.codec,
            result,
        })
        .collect())
}

/// Rasterize a scanned PDF, compress its pages and write a new PDF.
pub fn recompress_pdf(
    input: &[u8],
    dpi: u32,
    request: &CompressionRequest,
    config: &SearchConfig,
) -> Result<Vec<u8>> {
    let rasterizer = ScannedPageRasterizer::from_bytes(input)?;
    let pages = compress_document(&rasterizer, dpi, request, config)?;
    assemble_pdf(&pages, dpi)
}
