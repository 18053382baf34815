//! Image encoding: rendered page → base64 JPEG wrapped in [`PageImage`].
//!
//! Vision APIs accept images as base64 data-URIs embedded in the JSON
//! request body. JPEG is chosen over PNG because scanned expense reports are
//! photographic: at quality 85 the printed digits and table rules stay crisp
//! while the payload lands at roughly a third of the lossless size, which
//! matters when five multi-page documents travel through one API quota.

use std::fmt;
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use tracing::debug;

/// One rasterised page, encoded and ready for the model call.
///
/// Carries its `(document, page)` origin so responses can be associated with
/// the right page no matter what order the model calls complete in.
#[derive(Clone)]
pub struct PageImage {
    /// 0-indexed document within the batch.
    pub document: usize,
    /// 0-indexed page within the document.
    pub page: usize,
    /// Base64-encoded JPEG payload.
    pub data: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Render as the `data:` URL embedded in the API request body.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("document", &self.document)
            .field("page", &self.page)
            .field("media_type", &self.media_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data", &format_args!("{} bytes base64", self.data.len()))
            .finish()
    }
}

/// Encode a rendered page as base64 JPEG at the given quality (1–100).
///
/// The bitmap is converted to RGB first; JPEG has no alpha channel and
/// pdfium hands back RGBA bitmaps.
pub fn encode_page(
    document: usize,
    page: usize,
    img: &DynamicImage,
    quality: u8,
) -> Result<PageImage, image::ImageError> {
    let rgb = img.to_rgb8();

    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder.write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded page {} of document {} → {} bytes base64",
        page + 1,
        document,
        b64.len()
    );

    Ok(PageImage {
        document,
        page,
        data: b64,
        media_type: "image/jpeg".to_string(),
        width: rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let page = encode_page(0, 0, &red_image(10, 10), 85).expect("encode should succeed");
        assert_eq!(page.media_type, "image/jpeg");
        assert_eq!((page.width, page.height), (10, 10));
        // Verify it's valid base64 holding a JPEG
        let decoded = STANDARD.decode(&page.data).expect("valid base64");
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn data_url_has_jpeg_prefix() {
        let page = encode_page(1, 2, &red_image(4, 4), 85).unwrap();
        let url = page.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(url.len() > "data:image/jpeg;base64,".len());
    }

    #[test]
    fn quality_extremes_encode() {
        assert!(encode_page(0, 0, &red_image(8, 8), 1).is_ok());
        assert!(encode_page(0, 0, &red_image(8, 8), 100).is_ok());
    }

    #[test]
    fn origin_is_preserved() {
        let page = encode_page(3, 7, &red_image(4, 4), 85).unwrap();
        assert_eq!(page.document, 3);
        assert_eq!(page.page, 7);
    }

    #[test]
    fn debug_elides_payload() {
        let page = encode_page(0, 0, &red_image(16, 16), 85).unwrap();
        let dbg = format!("{page:?}");
        assert!(dbg.contains("bytes base64"));
        assert!(!dbg.contains(&page.data));
    }
}
