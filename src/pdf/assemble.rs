use std::io::Write;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::codec::{decode, flatten_opaque, ColorMode, OutputCodec, WHITE};
use crate::compressor::CompressionResult;
use crate::error::{CompressError, Result};

/// A compressed page ready to be placed into a document.
#[derive(Debug, Clone)]
pub struct CompressedPage {
    pub codec: OutputCodec,
    pub result: CompressionResult,
}

/// Build an image-only PDF with one page per compressed raster.
///
/// Pages are sized so the raster covers them at `dpi`. JPEG pages are
/// embedded as-is (DCTDecode); other codecs are decoded and stored as
/// Flate-compressed 8-bit RGB, with transparency composed over white.
pub fn assemble_pdf(pages: &[CompressedPage], dpi: u32) -> Result<Vec<u8>> {
    if dpi == 0 {
        return Err(CompressError::Pdf("dpi must be positive".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let (w, h) = (page.result.width, page.result.height);
        let image_stream = image_xobject(page)?;
        let image_id = doc.add_object(image_stream);

        let w_pt = w as f32 * 72.0 / dpi as f32;
        let h_pt = h as f32 * 72.0 / dpi as f32;
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(w_pt.into()),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(h_pt.into()),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(w_pt.into()),
                Object::Real(h_pt.into()),
            ],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

fn image_xobject(page: &CompressedPage) -> Result<Stream> {
    let (w, h) = (page.result.width, page.result.height);
    let decoded = decode(&page.result.bytes)?;
    let (filter, color_space, content) = if page.codec == OutputCodec::Jpeg {
        let color_space = if decoded.color_mode == ColorMode::Grayscale {
            "DeviceGray"
        } else {
            "DeviceRGB"
        };
        ("DCTDecode", color_space, page.result.bytes.clone())
    } else {
        let rgb = flatten_opaque(&decoded.image, WHITE).to_rgb8();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(rgb.as_raw())?;
        ("FlateDecode", "DeviceRGB", encoder.finish()?)
    };

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w as i64,
            "Height" => h as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8i64,
            "Filter" => filter,
        },
        content,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::compressor::BudgetOutcome;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Read;

    #[test]
    fn test_transparent_png_page_is_flattened_to_white() {
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 4, Rgba([0, 0, 0, 0])));
        let bytes = encode(&clear, OutputCodec::Png, 80).unwrap();
        let page = CompressedPage {
            codec: OutputCodec::Png,
            result: CompressionResult {
                byte_count: bytes.len(),
                bytes,
                quality: 80,
                scale: 1.0,
                width: 6,
                height: 4,
                attempts: 1,
                outcome: BudgetOutcome::NoBudget,
            },
        };

        let stream = image_xobject(&page).unwrap();
        let mut samples = Vec::new();
        flate2::read::ZlibDecoder::new(&stream.content[..])
            .read_to_end(&mut samples)
            .unwrap();
        assert_eq!(samples.len(), 6 * 4 * 3);
        assert!(samples.iter().all(|&v| v == 255));
    }
}
