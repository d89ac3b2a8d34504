use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};

use super::format::OutputCodec;
use crate::error::{CompressError, Result};

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Background used when flattening transparency for opaque codecs.
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Produces encoded bytes for a raster. The size-targeted search drives any
/// implementation of this trait.
pub trait Encode: Send + Sync {
    fn encode(&self, image: &DynamicImage, codec: OutputCodec, quality: u8) -> Result<Vec<u8>>;
}

/// Encoder backed by `image` (JPEG, PNG, BMP, TIFF) and libwebp (WEBP).
#[derive(Debug, Clone, Copy)]
pub struct CodecAdapter {
    pub background: Rgb<u8>,
}

impl Default for CodecAdapter {
    fn default() -> Self {
        Self { background: WHITE }
    }
}

impl CodecAdapter {
    pub fn with_background(background: Rgb<u8>) -> Self {
        Self { background }
    }
}

impl Encode for CodecAdapter {
    fn encode(&self, image: &DynamicImage, codec: OutputCodec, quality: u8) -> Result<Vec<u8>> {
        let quality = clamp_quality(quality);
        let fail = |reason: String| CompressError::EncodeFailure {
            codec,
            quality,
            reason,
        };

        let mut buffer = Vec::new();
        match codec {
            OutputCodec::Jpeg => {
                let flat = flatten_opaque(image, self.background);
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                flat.write_with_encoder(encoder)
                    .map_err(|e| fail(e.to_string()))?;
            }
            OutputCodec::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                png_compatible(image)
                    .write_with_encoder(encoder)
                    .map_err(|e| fail(e.to_string()))?;
            }
            OutputCodec::WebP => {
                buffer = encode_webp(image, quality).map_err(fail)?;
            }
            OutputCodec::Bmp => {
                eight_bit(image)
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Bmp)
                    .map_err(|e| fail(e.to_string()))?;
            }
            OutputCodec::Tiff => {
                eight_bit(image)
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Tiff)
                    .map_err(|e| fail(e.to_string()))?;
            }
        }

        Ok(buffer)
    }
}

/// Encode with the default adapter (white background).
pub fn encode(image: &DynamicImage, codec: OutputCodec, quality: u8) -> Result<Vec<u8>> {
    CodecAdapter::default().encode(image, codec, quality)
}

fn encode_webp(image: &DynamicImage, quality: u8) -> std::result::Result<Vec<u8>, String> {
    let (w, h) = (image.width(), image.height());
    let memory = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode_simple(false, quality as f32)
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode_simple(false, quality as f32)
    }
    .map_err(|e| format!("libwebp rejected {}x{}: {:?}", w, h, e))?;
    if memory.is_empty() {
        return Err(format!("libwebp produced no output for {}x{}", w, h));
    }
    Ok(memory.to_vec())
}

/// Compose the image over `background` and drop the alpha channel.
///
/// Grayscale sources stay grayscale; everything else becomes 8-bit RGB.
pub fn flatten_opaque(image: &DynamicImage, background: Rgb<u8>) -> DynamicImage {
    match image.color() {
        ColorType::L8 => image.clone(),
        ColorType::L16 => DynamicImage::ImageLuma8(image.to_luma8()),
        ColorType::La8 | ColorType::La16 => {
            let la = image.to_luma_alpha8();
            let bg = luma_of(background);
            let gray = GrayImage::from_fn(la.width(), la.height(), |x, y| {
                let p = la.get_pixel(x, y);
                image::Luma([blend(p[0], bg, p[1])])
            });
            DynamicImage::ImageLuma8(gray)
        }
        color if color.has_alpha() => {
            let rgba = image.to_rgba8();
            let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                let p = rgba.get_pixel(x, y);
                Rgb([
                    blend(p[0], background[0], p[3]),
                    blend(p[1], background[1], p[3]),
                    blend(p[2], background[2], p[3]),
                ])
            });
            DynamicImage::ImageRgb8(rgb)
        }
        ColorType::Rgb8 => image.clone(),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

fn blend(fg: u8, bg: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((fg as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8
}

fn luma_of(c: Rgb<u8>) -> u8 {
    // Rec. 601 weights, matching image's own conversion.
    ((c[0] as u32 * 299 + c[1] as u32 * 587 + c[2] as u32 * 114 + 500) / 1000) as u8
}

/// PNG takes 8/16-bit gray, gray-alpha, RGB and RGBA as is.
fn png_compatible(image: &DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::Rgb32F => DynamicImage::ImageRgb16(image.to_rgb16()),
        ColorType::Rgba32F => DynamicImage::ImageRgba16(image.to_rgba16()),
        _ => image.clone(),
    }
}

/// BMP and TIFF writers are given 8-bit gray, RGB or RGBA.
fn eight_bit(image: &DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 | ColorType::Rgba8 => image.clone(),
        ColorType::L16 => DynamicImage::ImageLuma8(image.to_luma8()),
        color if color.has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, ColorMode};
    use image::{LumaA, Rgba, RgbaImage};

    fn translucent(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 7) as u8, (y * 5) as u8, 90, if x % 2 == 0 { 0 } else { 255 }])
        }))
    }

    #[test]
    fn test_blend_extremes() {
        assert_eq!(blend(10, 255, 255), 10);
        assert_eq!(blend(10, 255, 0), 255);
        assert_eq!(blend(0, 255, 128), 127);
    }

    #[test]
    fn test_flatten_composes_over_background() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let flat = flatten_opaque(&img, Rgb([10, 20, 30]));

        assert_eq!(flat.color(), ColorType::Rgb8);
        assert_eq!(flat.to_rgb8().get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_flatten_gray_alpha_stays_gray() {
        let img = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(2, 2, LumaA([0u8, 0])));
        let flat = flatten_opaque(&img, WHITE);

        assert_eq!(flat.color(), ColorType::L8);
        assert_eq!(flat.to_luma8().get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_jpeg_output_is_opaque() {
        let bytes = encode(&translucent(24, 16), OutputCodec::Jpeg, 80).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.dimensions(), (24, 16));
        assert_eq!(decoded.color_mode, ColorMode::Rgb);
    }

    #[test]
    fn test_alpha_codecs_keep_alpha() {
        for codec in [OutputCodec::Png, OutputCodec::WebP, OutputCodec::Tiff] {
            let bytes = encode(&translucent(12, 9), codec, 75).unwrap();
            let decoded = decode(&bytes).unwrap();

            assert_eq!(decoded.dimensions(), (12, 9), "{codec}");
            assert!(decoded.color_mode.has_alpha(), "{codec}");
        }
    }

    #[test]
    fn test_bmp_round_trip_dimensions() {
        let bytes = encode(&translucent(12, 9), OutputCodec::Bmp, 75).unwrap();
        assert!(bytes.starts_with(b"BM"));
        assert_eq!(decode(&bytes).unwrap().dimensions(), (12, 9));
    }

    #[test]
    fn test_lower_jpeg_quality_is_smaller() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8])
        }));
        let high = encode(&img, OutputCodec::Jpeg, 95).unwrap();
        let low = encode(&img, OutputCodec::Jpeg, 10).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_webp_too_wide_is_encode_failure() {
        // libwebp caps each dimension at 16383.
        let img = DynamicImage::ImageRgb8(RgbImage::new(17000, 1));
        let err = encode(&img, OutputCodec::WebP, 80).unwrap_err();
        assert!(matches!(
            err,
            CompressError::EncodeFailure {
                codec: OutputCodec::WebP,
                quality: 80,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_quality_is_clamped() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));
        let zero = encode(&img, OutputCodec::Jpeg, 0).unwrap();
        let one = encode(&img, OutputCodec::Jpeg, 1).unwrap();
        assert_eq!(zero, one);
        assert_eq!(clamp_quality(250), 100);
    }
}
