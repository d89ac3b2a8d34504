use image::{DynamicImage, GenericImageView};
use log::debug;

use super::format::{ColorMode, InputFormat};
use crate::error::{CompressError, Result};

/// An in-memory raster produced by decoding input bytes.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub color_mode: ColorMode,
    pub format: Option<InputFormat>,
}

impl DecodedImage {
    /// Wrap an already decoded raster, e.g. a rendered PDF page.
    pub fn from_image(image: DynamicImage) -> Self {
        let color_mode = ColorMode::of(&image);
        Self {
            image,
            color_mode,
            format: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// A decoder for one input format.
///
/// Decoders advertise availability so that optional formats can be
/// registered without special-casing them at the call site.
pub trait FormatDecoder: Send + Sync {
    fn format(&self) -> InputFormat;

    fn is_available(&self) -> bool;

    fn decode(&self, bytes: &[u8]) -> std::result::Result<DynamicImage, String>;
}

/// Decoder backed by the `image` crate.
struct BuiltinDecoder {
    format: InputFormat,
}

impl FormatDecoder for BuiltinDecoder {
    fn format(&self) -> InputFormat {
        self.format
    }

    fn is_available(&self) -> bool {
        self.format.image_format().is_some()
    }

    fn decode(&self, bytes: &[u8]) -> std::result::Result<DynamicImage, String> {
        let format = self
            .format
            .image_format()
            .ok_or_else(|| format!("no built-in decoder for {}", self.format))?;
        image::load_from_memory_with_format(bytes, format).map_err(|e| e.to_string())
    }
}

/// HEIC/HEIF placeholder. No HEVC decoder is linked into this crate, so the
/// entry only exists to report the format as recognised but unavailable.
struct HeifDecoder;

impl FormatDecoder for HeifDecoder {
    fn format(&self) -> InputFormat {
        InputFormat::Heif
    }

    fn is_available(&self) -> bool {
        false
    }

    fn decode(&self, _bytes: &[u8]) -> std::result::Result<DynamicImage, String> {
        Err("HEIF decoding is not available in this build".to_string())
    }
}

/// Capability-checked set of decoders, consulted by signature.
pub struct CodecRegistry {
    decoders: Vec<Box<dyn FormatDecoder>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for format in [
            InputFormat::Jpeg,
            InputFormat::Png,
            InputFormat::WebP,
            InputFormat::Bmp,
            InputFormat::Tiff,
        ] {
            registry.register(Box::new(BuiltinDecoder { format }));
        }
        registry.register(Box::new(HeifDecoder));
        registry
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Add a decoder. A later registration for the same format takes
    /// precedence over earlier ones.
    pub fn register(&mut self, decoder: Box<dyn FormatDecoder>) {
        self.decoders.insert(0, decoder);
    }

    pub fn is_available(&self, format: InputFormat) -> bool {
        self.find(format).is_some()
    }

    /// Formats that currently have a usable decoder.
    pub fn available_formats(&self) -> Vec<InputFormat> {
        let mut formats: Vec<InputFormat> = Vec::new();
        for decoder in &self.decoders {
            if decoder.is_available() && !formats.contains(&decoder.format()) {
                formats.push(decoder.format());
            }
        }
        formats
    }

    fn find(&self, format: InputFormat) -> Option<&dyn FormatDecoder> {
        self.decoders
            .iter()
            .find(|d| d.format() == format && d.is_available())
            .map(|d| d.as_ref())
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        self.decode_named("<memory>", bytes)
    }

    /// Decode `bytes`, naming the input `name` in any error.
    pub fn decode_named(&self, name: &str, bytes: &[u8]) -> Result<DecodedImage> {
        let format = InputFormat::sniff(bytes)
            .ok_or_else(|| CompressError::UnsupportedFormat(name.to_string()))?;
        let decoder = self
            .find(format)
            .ok_or_else(|| CompressError::UnsupportedFormat(format!("{} ({})", name, format)))?;

        let image = decoder
            .decode(bytes)
            .map_err(|reason| CompressError::CorruptData {
                name: name.to_string(),
                format,
                reason,
            })?;

        let color_mode = if ColorMode::is_indexed_source(format, bytes) {
            ColorMode::Palette
        } else {
            ColorMode::of(&image)
        };
        debug!(
            "decoded {} as {} {}x{} ({:?})",
            name,
            format,
            image.width(),
            image.height(),
            color_mode
        );

        Ok(DecodedImage {
            image,
            color_mode,
            format: Some(format),
        })
    }
}

/// Decode with the default registry.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage> {
    CodecRegistry::default().decode(bytes)
}
