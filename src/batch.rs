//! Independent compression of several named inputs.
//!
//! Items run in parallel on the rayon pool. Each item carries its own
//! `Result`, so a corrupt upload never stops the rest of the batch.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use rayon::prelude::*;

use crate::codec::{CodecRegistry, OutputCodec};
use crate::compressor::{CompressionRequest, CompressionResult, Compressor, SearchConfig};
use crate::error::Result;
use crate::size::{format_file_size, format_reduction, reduction_percent};

/// A named input, typically an uploaded file.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BatchInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug)]
pub struct BatchItem {
    pub name: String,
    pub codec: OutputCodec,
    pub original_size: u64,
    pub result: Result<CompressionResult>,
}

impl BatchItem {
    /// `compressed_<stem>.<ext>`, where the stem is the name up to its first dot.
    pub fn output_file_name(&self) -> String {
        output_file_name(&self.name, self.codec)
    }

    /// Write the compressed bytes into `dir`. Failed items write nothing.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Ok(result) = &self.result else {
            return Ok(None);
        };
        let path = dir.join(self.output_file_name());
        fs::write(&path, &result.bytes)?;
        Ok(Some(path))
    }

    /// One-line description, e.g. `photo.png: 1.20 MB -> 80.00 KB (93.3%)`.
    pub fn describe(&self) -> String {
        match &self.result {
            Ok(result) => {
                let mut line = format!(
                    "{}: {} -> {} ({})",
                    self.name,
                    format_file_size(self.original_size),
                    format_file_size(result.byte_count as u64),
                    format_reduction(self.original_size, result.byte_count as u64)
                );
                if !result.budget_met() {
                    line.push_str(" [budget not met]");
                }
                line
            }
            Err(e) => format!("{}: failed: {}", self.name, e),
        }
    }
}

pub fn output_file_name(name: &str, codec: OutputCodec) -> String {
    let file = Path::new(name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(name);
    let stem = file.split('.').next().unwrap_or(file);
    format!("compressed_{}.{}", stem, codec.extension())
}

/// Totals over the successful items of a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub files: usize,
    pub failed: usize,
    pub total_original: u64,
    pub total_compressed: u64,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem]) -> Self {
        let mut summary = BatchSummary {
            files: 0,
            failed: 0,
            total_original: 0,
            total_compressed: 0,
        };
        for item in items {
            match &item.result {
                Ok(result) => {
                    summary.files += 1;
                    summary.total_original += item.original_size;
                    summary.total_compressed += result.byte_count as u64;
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.total_original, self.total_compressed)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} file(s) processed, {} failed: {} -> {} (saved {})",
            self.files,
            self.failed,
            format_file_size(self.total_original),
            format_file_size(self.total_compressed),
            format_reduction(self.total_original, self.total_compressed)
        )
    }
}

/// Compress every input with the same request, preserving input order.
pub fn compress_batch(
    inputs: &[BatchInput],
    request: &CompressionRequest,
    config: &SearchConfig,
) -> Vec<BatchItem> {
    let registry = CodecRegistry::default();
    let compressor = Compressor::new(*config);

    inputs
        .par_iter()
        .map(|input| {
            let result = registry
                .decode_named(&input.name, &input.bytes)
                .and_then(|image| compressor.compress(&image, request));
            if let Err(e) = &result {
                warn!("Failed to process {}: {}", input.name, e);
            }
            BatchItem {
                name: input.name.clone(),
                codec: request.codec,
                original_size: input.bytes.len() as u64,
                result,
            }
        })
        .collect()
}
