use std::fmt;
use std::str::FromStr;

use image::{ColorType, DynamicImage, ImageFormat};

use crate::error::CompressError;

/// Target codec of a compression request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputCodec {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Tiff,
}

impl OutputCodec {
    pub const ALL: [OutputCodec; 5] = [
        OutputCodec::Jpeg,
        OutputCodec::Png,
        OutputCodec::WebP,
        OutputCodec::Bmp,
        OutputCodec::Tiff,
    ];

    /// Whether the quality parameter changes the encoded output.
    pub fn has_quality_axis(&self) -> bool {
        matches!(self, OutputCodec::Jpeg | OutputCodec::WebP)
    }

    /// Whether the codec can store an alpha channel.
    pub fn supports_alpha(&self) -> bool {
        !matches!(self, OutputCodec::Jpeg)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputCodec::Jpeg => "jpg",
            OutputCodec::Png => "png",
            OutputCodec::WebP => "webp",
            OutputCodec::Bmp => "bmp",
            OutputCodec::Tiff => "tiff",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputCodec::Jpeg => "image/jpeg",
            OutputCodec::Png => "image/png",
            OutputCodec::WebP => "image/webp",
            OutputCodec::Bmp => "image/bmp",
            OutputCodec::Tiff => "image/tiff",
        }
    }
}

impl fmt::Display for OutputCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputCodec::Jpeg => "JPEG",
            OutputCodec::Png => "PNG",
            OutputCodec::WebP => "WEBP",
            OutputCodec::Bmp => "BMP",
            OutputCodec::Tiff => "TIFF",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputCodec {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputCodec::Jpeg),
            "png" => Ok(OutputCodec::Png),
            "webp" => Ok(OutputCodec::WebP),
            "bmp" => Ok(OutputCodec::Bmp),
            "tif" | "tiff" => Ok(OutputCodec::Tiff),
            other => Err(CompressError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Formats recognised on the decode side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Tiff,
    Heif,
}

const HEIF_BRANDS: [&[u8; 4]; 8] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

impl InputFormat {
    /// Identify the format from the leading bytes of an encoded image.
    pub fn sniff(bytes: &[u8]) -> Option<InputFormat> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(InputFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(InputFormat::Png)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(InputFormat::WebP)
        } else if bytes.starts_with(b"BM") {
            Some(InputFormat::Bmp)
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Some(InputFormat::Tiff)
        } else if bytes.len() >= 12
            && &bytes[4..8] == b"ftyp"
            && HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == *brand)
        {
            Some(InputFormat::Heif)
        } else {
            None
        }
    }

    /// The `image` crate format used to decode this input, if it has one.
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            InputFormat::Jpeg => Some(ImageFormat::Jpeg),
            InputFormat::Png => Some(ImageFormat::Png),
            InputFormat::WebP => Some(ImageFormat::WebP),
            InputFormat::Bmp => Some(ImageFormat::Bmp),
            InputFormat::Tiff => Some(ImageFormat::Tiff),
            InputFormat::Heif => None,
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputFormat::Jpeg => "JPEG",
            InputFormat::Png => "PNG",
            InputFormat::WebP => "WEBP",
            InputFormat::Bmp => "BMP",
            InputFormat::Tiff => "TIFF",
            InputFormat::Heif => "HEIF",
        };
        f.write_str(name)
    }
}

/// Pixel colour mode of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Rgb,
    Rgba,
    Palette,
    Grayscale,
    GrayscaleAlpha,
}

impl ColorMode {
    pub fn of(image: &DynamicImage) -> ColorMode {
        match image.color() {
            ColorType::L8 | ColorType::L16 => ColorMode::Grayscale,
            ColorType::La8 | ColorType::La16 => ColorMode::GrayscaleAlpha,
            color if color.has_alpha() => ColorMode::Rgba,
            _ => ColorMode::Rgb,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, ColorMode::Rgba | ColorMode::GrayscaleAlpha)
    }

    /// True when the source was stored as indexed colour.
    ///
    /// PNG colour type 3 (IHDR byte 25) and BMP files with at most 8 bits per
    /// pixel (little-endian u16 at offset 28).
    pub(crate) fn is_indexed_source(format: InputFormat, bytes: &[u8]) -> bool {
        match format {
            InputFormat::Png => bytes.get(25) == Some(&3),
            InputFormat::Bmp => match (bytes.get(28), bytes.get(29)) {
                (Some(lo), Some(hi)) => u16::from_le_bytes([*lo, *hi]) <= 8,
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_known_signatures() {
        assert_eq!(InputFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(InputFormat::Jpeg));
        assert_eq!(
            InputFormat::sniff(b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR"),
            Some(InputFormat::Png)
        );
        assert_eq!(InputFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(InputFormat::WebP));
        assert_eq!(InputFormat::sniff(b"BM\0\0\0\0"), Some(InputFormat::Bmp));
        assert_eq!(InputFormat::sniff(b"II*\0\x08\0\0\0"), Some(InputFormat::Tiff));
        assert_eq!(InputFormat::sniff(b"MM\0*\0\0\0\x08"), Some(InputFormat::Tiff));
        assert_eq!(
            InputFormat::sniff(b"\0\0\0\x18ftypheic\0\0\0\0"),
            Some(InputFormat::Heif)
        );
    }

    #[test]
    fn test_sniff_rejects_unknown() {
        assert_eq!(InputFormat::sniff(b"GIF89a"), None);
        assert_eq!(InputFormat::sniff(b""), None);
        assert_eq!(InputFormat::sniff(b"\0\0\0\x18ftypisom"), None);
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("JPG".parse::<OutputCodec>().unwrap(), OutputCodec::Jpeg);
        assert_eq!("jpeg".parse::<OutputCodec>().unwrap(), OutputCodec::Jpeg);
        assert_eq!("tif".parse::<OutputCodec>().unwrap(), OutputCodec::Tiff);
        assert!(matches!(
            "gif".parse::<OutputCodec>(),
            Err(CompressError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_quality_axis() {
        assert!(OutputCodec::Jpeg.has_quality_axis());
        assert!(OutputCodec::WebP.has_quality_axis());
        assert!(!OutputCodec::Png.has_quality_axis());
        assert!(!OutputCodec::Bmp.has_quality_axis());
        assert!(!OutputCodec::Tiff.has_quality_axis());
    }
}
