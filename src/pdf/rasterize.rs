use std::io::Read;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use log::debug;

use crate::codec::DecodedImage;
use crate::error::{CompressError, Result};

/// Source of page rasters for the PDF path.
pub trait PageRasterizer {
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) at `dpi` pixels per inch.
    fn render(&self, index: usize, dpi: u32) -> Result<DecodedImage>;
}

/// Rasterizer for scanned documents: each page is represented by the largest
/// image drawn on it, resampled to the page's MediaBox at the requested DPI.
pub struct ScannedPageRasterizer {
    doc: Document,
    pages: Vec<ObjectId>,
}

impl ScannedPageRasterizer {
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let mut doc = Document::load_from(std::io::Cursor::new(input))?;
        if doc.is_encrypted() {
            // Many scanners emit PDFs encrypted with an empty user password.
            if let Err(e) = doc.decrypt(b"") {
                debug!("Failed to decrypt with empty password: {:?}", e);
            }
        }
        let pages = doc.get_pages().into_values().collect();
        Ok(Self { doc, pages })
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn dict_entry<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        dict.get(key).ok().and_then(|o| self.resolve(o))
    }

    fn page_dict(&self, index: usize) -> Result<&Dictionary> {
        let id = self
            .pages
            .get(index)
            .ok_or_else(|| CompressError::Pdf(format!("page {} out of range", index + 1)))?;
        Ok(self.doc.get_object(*id)?.as_dict()?)
    }

    /// Inherited page attribute lookup through the `Parent` chain.
    fn inherited<'a>(&'a self, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = page;
        for _ in 0..32 {
            if let Some(value) = self.dict_entry(current, key) {
                return Some(value);
            }
            current = self.dict_entry(current, b"Parent")?.as_dict().ok()?;
        }
        None
    }

    /// Page size in points, from MediaBox.
    fn page_size(&self, page: &Dictionary) -> Option<(f32, f32)> {
        let values = self.inherited(page, b"MediaBox")?.as_array().ok()?;
        if values.len() != 4 {
            return None;
        }
        let nums: Vec<f32> = values
            .iter()
            .filter_map(|v| self.resolve(v).and_then(number))
            .collect();
        if nums.len() != 4 {
            return None;
        }
        Some(((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
    }

    /// The image XObject with the most pixels in the page resources.
    fn largest_image<'a>(&'a self, page: &'a Dictionary) -> Option<&'a Stream> {
        let resources = self.inherited(page, b"Resources")?.as_dict().ok()?;
        let xobjects = self.dict_entry(resources, b"XObject")?.as_dict().ok()?;

        xobjects
            .iter()
            .filter_map(|(_, obj)| self.resolve(obj)?.as_stream().ok())
            .filter(|stream| {
                matches!(stream.dict.get(b"Subtype").and_then(|s| s.as_name()), Ok(name) if name == b"Image")
            })
            .max_by_key(|stream| {
                let w = stream.dict.get(b"Width").and_then(|o| o.as_i64()).unwrap_or(0);
                let h = stream.dict.get(b"Height").and_then(|o| o.as_i64()).unwrap_or(0);
                w * h
            })
    }

    fn decode_image(&self, stream: &Stream) -> Result<DynamicImage> {
        let filter = stream.dict.get(b"Filter").ok().and_then(|f| self.resolve(f));
        let is_jpeg = match filter {
            Some(Object::Name(name)) => name == b"DCTDecode",
            Some(Object::Array(arr)) => arr.iter().any(|o| matches!(o, Object::Name(n) if n == b"DCTDecode")),
            _ => false,
        };

        if is_jpeg {
            return image::load_from_memory(&stream.content)
                .map_err(|e| CompressError::Pdf(format!("embedded JPEG: {}", e)));
        }

        let content = decompress_stream(stream)?;
        let width = stream.dict.get(b"Width").and_then(|o| o.as_i64()).unwrap_or(0) as u32;
        let height = stream.dict.get(b"Height").and_then(|o| o.as_i64()).unwrap_or(0) as u32;
        let bits = stream
            .dict
            .get(b"BitsPerComponent")
            .and_then(|o| o.as_i64())
            .unwrap_or(8);
        if bits != 8 {
            return Err(CompressError::Pdf(format!(
                "unsupported {} bits per component",
                bits
            )));
        }

        let color_space = stream
            .dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_name().ok());
        let pixels = (width as usize) * (height as usize);
        let components = match color_space {
            Some(b"DeviceGray") => 1,
            Some(b"DeviceRGB") => 3,
            Some(b"DeviceCMYK") => 4,
            _ if pixels > 0 && content.len() == pixels => 1,
            _ if pixels > 0 && content.len() == pixels * 4 => 4,
            _ => 3,
        };

        let image = match components {
            1 => GrayImage::from_raw(width, height, content).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, content).map(DynamicImage::ImageRgb8),
            _ => RgbImage::from_raw(width, height, cmyk_to_rgb(&content)).map(DynamicImage::ImageRgb8),
        };
        image.ok_or_else(|| {
            CompressError::Pdf(format!(
                "sample data does not match {}x{} with {} components",
                width, height, components
            ))
        })
    }
}

impl PageRasterizer for ScannedPageRasterizer {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn render(&self, index: usize, dpi: u32) -> Result<DecodedImage> {
        let page = self.page_dict(index)?;
        let stream = self.largest_image(page).ok_or_else(|| {
            CompressError::Pdf(format!("page {} has no raster content", index + 1))
        })?;
        let image = self.decode_image(stream)?;

        let image = match self.page_size(page) {
            Some((w_pt, h_pt)) if dpi > 0 => {
                let w = ((w_pt / 72.0 * dpi as f32).round() as u32).max(1);
                let h = ((h_pt / 72.0 * dpi as f32).round() as u32).max(1);
                if (w, h) == (image.width(), image.height()) {
                    image
                } else {
                    debug!(
                        "page {}: resampling {}x{} -> {}x{} at {} dpi",
                        index + 1,
                        image.width(),
                        image.height(),
                        w,
                        h,
                        dpi
                    );
                    image.resize_exact(w, h, FilterType::Lanczos3)
                }
            }
            _ => image,
        };

        Ok(DecodedImage::from_image(image))
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn decompress_stream(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    match stream.decompressed_content() {
        Ok(c) => Ok(c),
        Err(e) => {
            let is_flate = matches!(stream.dict.get(b"Filter"), Ok(Object::Name(name)) if name == b"FlateDecode");
            if !is_flate {
                return Err(CompressError::Pdf(format!("decompression failed: {:?}", e)));
            }
            // lopdf rejects some streams with trailing garbage that zlib accepts.
            let mut decoder = flate2::read::ZlibDecoder::new(&stream.content[..]);
            let mut buffer = Vec::new();
            decoder.read_to_end(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn cmyk_to_rgb(content: &[u8]) -> Vec<u8> {
    content
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let k = 1.0 - cmyk[3] as f32 / 255.0;
            [
                ((1.0 - cmyk[0] as f32 / 255.0) * k * 255.0) as u8,
                ((1.0 - cmyk[1] as f32 / 255.0) * k * 255.0) as u8,
                ((1.0 - cmyk[2] as f32 / 255.0) * k * 255.0) as u8,
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_cmyk_to_rgb() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
        assert_eq!(cmyk_to_rgb(&[255, 0, 255, 0]), vec![0, 255, 0]);
    }

    fn image_stream(w: i64, h: i64) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![128u8; (w * h) as usize],
        )
    }

    #[test]
    fn test_largest_image_wins() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let small = doc.add_object(image_stream(4, 4));
        let large = doc.add_object(image_stream(12, 6));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Small" => small, "Large" => large },
            },
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(12), Object::Integer(6)],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 1i64,
                "Kids" => vec![Object::from(page_id)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let rasterizer = ScannedPageRasterizer::from_bytes(&bytes).unwrap();
        let page = rasterizer.page_dict(0).unwrap();
        let stream = rasterizer.largest_image(page).unwrap();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 12);

        let rendered = rasterizer.render(0, 72).unwrap();
        assert_eq!(rendered.dimensions(), (12, 6));
    }

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            ScannedPageRasterizer::from_bytes(b"definitely not a pdf"),
            Err(CompressError::Pdf(_))
        ));
    }
}
