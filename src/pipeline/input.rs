//! Batch admission: the checks every submitted document passes before any
//! rasterisation work starts.
//!
//! ## Why check the magic bytes here?
//!
//! pdfium reports corrupt input with an opaque internal error code. Checking
//! `%PDF` during admission turns "load failed" into "this file is a ZIP
//! archive renamed to .pdf" while the original file name is still at hand.
//! The media-type and size limits exist for the same reason upload endpoints
//! have them: rejecting a 200 MB scan before rendering it is the difference
//! between an error message and an OOM kill.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::Pdf2ExpenseError;

/// The only media type the pipeline accepts.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// One submitted document, held fully in memory.
#[derive(Clone)]
pub struct SourceDocument {
    /// Original file name as submitted; reused for stored-object naming.
    pub name: String,
    /// Declared media type; must be `application/pdf` to pass admission.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Wrap in-memory bytes as a PDF document.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: PDF_MEDIA_TYPE.to_string(),
            bytes,
        }
    }

    /// Override the declared media type (admission will reject non-PDF).
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Read a document from disk.
    ///
    /// The media type is inferred from the `.pdf` extension; other
    /// extensions are carried as `application/octet-stream` and rejected
    /// during admission with a message naming the file.
    pub fn from_path(path: &Path) -> Result<Self, Pdf2ExpenseError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Pdf2ExpenseError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Pdf2ExpenseError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Pdf2ExpenseError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
        })?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        let media_type = if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        {
            PDF_MEDIA_TYPE.to_string()
        } else {
            "application/octet-stream".to_string()
        };

        Ok(Self {
            name,
            media_type,
            bytes,
        })
    }

    /// Read a document from any seekable reader, restoring the read position
    /// afterwards.
    ///
    /// Host applications hand over open upload handles that they re-read
    /// later (for storage, checksumming, ...), so the cursor is put back
    /// exactly where it was found.
    pub fn from_reader<R: Read + Seek>(
        reader: &mut R,
        name: impl Into<String>,
    ) -> Result<Self, Pdf2ExpenseError> {
        let position = reader
            .stream_position()
            .map_err(|e| Pdf2ExpenseError::Internal(format!("Failed to query reader: {}", e)))?;

        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| Pdf2ExpenseError::Internal(format!("Failed to rewind reader: {}", e)))?;

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Pdf2ExpenseError::Internal(format!("Failed to read document: {}", e)))?;

        reader
            .seek(SeekFrom::Start(position))
            .map_err(|e| Pdf2ExpenseError::Internal(format!("Failed to restore reader: {}", e)))?;

        Ok(Self::new(name, bytes))
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .finish()
    }
}

/// Admission checks for a submitted batch.
///
/// Checked in order: batch size, then per document the media type, the size
/// limit, and the `%PDF` magic. The first violation aborts the run; nothing
/// has been rendered or uploaded at that point.
pub fn validate_batch(
    documents: &[SourceDocument],
    config: &ExtractionConfig,
) -> Result<(), Pdf2ExpenseError> {
    if documents.len() > config.max_documents {
        return Err(Pdf2ExpenseError::TooManyDocuments {
            count: documents.len(),
            max: config.max_documents,
        });
    }

    for doc in documents {
        if doc.media_type != PDF_MEDIA_TYPE {
            return Err(Pdf2ExpenseError::UnsupportedMediaType {
                name: doc.name.clone(),
                media_type: doc.media_type.clone(),
            });
        }
        if doc.bytes.len() > config.max_document_bytes {
            return Err(Pdf2ExpenseError::DocumentTooLarge {
                name: doc.name.clone(),
                size: doc.bytes.len(),
                max: config.max_document_bytes,
            });
        }
        if doc.bytes.len() < 4 || &doc.bytes[..4] != b"%PDF" {
            let mut magic = [0u8; 4];
            let n = doc.bytes.len().min(4);
            magic[..n].copy_from_slice(&doc.bytes[..n]);
            return Err(Pdf2ExpenseError::NotAPdf {
                name: doc.name.clone(),
                magic,
            });
        }
    }

    debug!("Batch admitted: {} document(s)", documents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pdf_doc(name: &str) -> SourceDocument {
        SourceDocument::new(name, b"%PDF-1.4 fake content".to_vec())
    }

    #[test]
    fn from_reader_restores_position() {
        let mut cursor = Cursor::new(b"%PDF-1.4 content".to_vec());
        cursor.set_position(7);

        let doc = SourceDocument::from_reader(&mut cursor, "report.pdf").unwrap();
        assert_eq!(doc.bytes, b"%PDF-1.4 content");
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn valid_batch_is_admitted() {
        let docs = vec![pdf_doc("a.pdf"), pdf_doc("b.pdf")];
        let config = ExtractionConfig::default();
        assert!(validate_batch(&docs, &config).is_ok());
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let docs: Vec<_> = (0..6).map(|i| pdf_doc(&format!("f{i}.pdf"))).collect();
        let config = ExtractionConfig::default();
        let err = validate_batch(&docs, &config).unwrap_err();
        assert!(matches!(
            err,
            Pdf2ExpenseError::TooManyDocuments { count: 6, max: 5 }
        ));
    }

    #[test]
    fn wrong_media_type_is_rejected() {
        let docs = vec![pdf_doc("scan.png").with_media_type("image/png")];
        let config = ExtractionConfig::default();
        let err = validate_batch(&docs, &config).unwrap_err();
        assert!(matches!(
            err,
            Pdf2ExpenseError::UnsupportedMediaType { .. }
        ));
    }

    #[test]
    fn oversized_document_is_rejected() {
        let mut doc = pdf_doc("big.pdf");
        doc.bytes = {
            let mut b = b"%PDF".to_vec();
            b.resize(11 * 1024 * 1024, 0);
            b
        };
        let config = ExtractionConfig::default();
        let err = validate_batch(&[doc], &config).unwrap_err();
        assert!(matches!(err, Pdf2ExpenseError::DocumentTooLarge { .. }));
    }

    #[test]
    fn missing_magic_is_rejected() {
        let doc = SourceDocument::new("zip.pdf", b"PK\x03\x04rest".to_vec());
        let config = ExtractionConfig::default();
        let err = validate_batch(&[doc], &config).unwrap_err();
        assert!(matches!(err, Pdf2ExpenseError::NotAPdf { .. }));
    }

    #[test]
    fn tiny_payload_is_rejected() {
        let doc = SourceDocument::new("stub.pdf", b"%P".to_vec());
        let config = ExtractionConfig::default();
        assert!(matches!(
            validate_batch(&[doc], &config),
            Err(Pdf2ExpenseError::NotAPdf { .. })
        ));
    }

    #[test]
    fn debug_elides_payload() {
        let doc = pdf_doc("a.pdf");
        let dbg = format!("{doc:?}");
        assert!(dbg.contains("a.pdf"));
        assert!(dbg.contains("21 bytes"));
        assert!(!dbg.contains("fake content"));
    }
}
