//! PDF rasterisation: render every page of each document via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a synchronous C++ library with thread-local state; calling it
//! from an async task would pin a Tokio worker for the whole render. The
//! entire batch is therefore handed to one `spawn_blocking` task, which owns
//! a `Pdfium` instance for its duration. Encoding happens on the same
//! thread: shipping raw bitmaps back across the task boundary would copy
//! megabytes per page for no benefit.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A3 landscape report sheet at a fixed DPI can
//! produce a far larger bitmap than an A5 receipt. `max_rendered_pixels`
//! caps the longest edge regardless of physical size, keeping memory bounded
//! and matching the image-size sweet spot for current vision models (around
//! 1,024–2,048 px).

use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::config::ExtractionConfig;
use crate::error::Pdf2ExpenseError;
use crate::pipeline::encode::{encode_page, PageImage};
use crate::pipeline::input::SourceDocument;

/// Rasterise every page of every document, in submission order.
///
/// The output is all pages of document 1 in page order, then document 2's,
/// and so on; each [`PageImage`] carries its `(document, page)` origin.
///
/// Rasterisation is all-or-nothing per document: a failure on any page
/// discards the pages already rendered for that document and aborts the run.
/// Partially rendered documents never reach the model.
pub async fn rasterise_documents(
    documents: &[SourceDocument],
    config: &ExtractionConfig,
) -> Result<Vec<PageImage>, Pdf2ExpenseError> {
    let inputs: Vec<(String, Vec<u8>)> = documents
        .iter()
        .map(|d| (d.name.clone(), d.bytes.clone()))
        .collect();
    let max_pixels = config.max_rendered_pixels;
    let quality = config.jpeg_quality;

    tokio::task::spawn_blocking(move || rasterise_blocking(&inputs, max_pixels, quality))
        .await
        .map_err(|e| Pdf2ExpenseError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of batch rasterisation.
fn rasterise_blocking(
    inputs: &[(String, Vec<u8>)],
    max_pixels: u32,
    quality: u8,
) -> Result<Vec<PageImage>, Pdf2ExpenseError> {
    let pdfium = Pdfium::default();

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut pages_out = Vec::new();

    for (doc_index, (name, bytes)) in inputs.iter().enumerate() {
        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                Pdf2ExpenseError::PasswordProtected { name: name.clone() }
            } else {
                Pdf2ExpenseError::CorruptDocument {
                    name: name.clone(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(Pdf2ExpenseError::EmptyDocument { name: name.clone() });
        }
        info!("Document '{}' loaded: {} page(s)", name, total_pages);

        // Staging buffer: the document's pages join the output only once the
        // whole document rendered.
        let mut staged = Vec::with_capacity(total_pages);

        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| Pdf2ExpenseError::RasterisationFailed {
                    name: name.clone(),
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2ExpenseError::RasterisationFailed {
                    name: name.clone(),
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {}/{} of '{}' → {}x{} px",
                idx + 1,
                total_pages,
                name,
                image.width(),
                image.height()
            );

            let encoded = encode_page(doc_index, idx, &image, quality).map_err(|e| {
                Pdf2ExpenseError::EncodingFailed {
                    name: name.clone(),
                    page: idx + 1,
                    detail: e.to_string(),
                }
            })?;
            staged.push(encoded);
        }

        pages_out.extend(staged);
    }

    Ok(pages_out)
}
