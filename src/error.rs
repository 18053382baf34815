//! Error types for the pdf2expense library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2ExpenseError`] — **Fatal**: the extraction cannot proceed at all
//!   (bad input document, oversized batch, model not configured). Returned as
//!   `Err(Pdf2ExpenseError)` from the top-level `extract_*` functions.
//!
//! * [`ExtractionError`] — **Non-fatal**: a single page's model call failed
//!   (transport glitch, timeout, empty answer) but all other pages are fine.
//!   Stored inside [`crate::output::PageExtraction`] so callers can inspect
//!   partial success rather than losing the whole batch to one bad page.
//!
//! Upload failures get their own type, [`UploadError`], because they carry a
//! different contract: a failed upload rolls back the whole batch before the
//! error surfaces, so by the time the caller sees it there is nothing partial
//! left in storage.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

/// All fatal errors returned by the pdf2expense library.
///
/// Page-level failures use [`ExtractionError`] and are stored in
/// [`crate::output::PageExtraction`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2ExpenseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The batch exceeds the configured document limit.
    #[error("Batch of {count} documents exceeds the limit of {max}.\nSubmit fewer files per run, or raise max_documents in the configuration.")]
    TooManyDocuments { count: usize, max: usize },

    /// A document was submitted with a media type other than application/pdf.
    #[error("Document '{name}' has unsupported media type '{media_type}'.\nOnly application/pdf is accepted.")]
    UnsupportedMediaType { name: String, media_type: String },

    /// A document exceeds the per-file size limit.
    #[error("Document '{name}' is {size} bytes, over the {max}-byte limit.\nSplit the report or raise max_document_bytes in the configuration.")]
    DocumentTooLarge { name: String, size: usize, max: usize },

    /// The payload was read but does not start with the PDF magic.
    #[error("Document '{name}' is not a valid PDF.\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document '{name}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptDocument { name: String, detail: String },

    /// The document is encrypted; password handling is not supported here.
    #[error("Document '{name}' is password-protected.\nDecrypt it before submission: qpdf --decrypt --password=<PW> input.pdf output.pdf")]
    PasswordProtected { name: String },

    /// The document parsed but contains no pages.
    #[error("Document '{name}' contains no pages")]
    EmptyDocument { name: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page} of '{name}': {detail}")]
    RasterisationFailed {
        name: String,
        page: usize,
        detail: String,
    },

    /// JPEG/base64 encoding of a rendered page failed.
    #[error("Image encoding failed for page {page} of '{name}': {detail}")]
    EncodingFailed {
        name: String,
        page: usize,
        detail: String,
    },

    // ── Model errors ──────────────────────────────────────────────────────
    /// No vision model was injected and none could be built from the environment.
    #[error("No vision model is configured.\n{hint}")]
    ModelNotConfigured { hint: String },

    // ── Upload errors ─────────────────────────────────────────────────────
    /// A batch upload failed; the batch has already been rolled back.
    #[error(transparent)]
    Upload(#[from] UploadError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the JSON report file.
    #[error("Failed to write report file '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page's model call.
///
/// Stored alongside [`crate::output::PageExtraction`] when a page fails.
/// The overall extraction continues; a page that fails contributes zero
/// records. `page` is the 1-based ordinal across the whole batch, matching
/// the log output.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// Model call failed after all retries.
    #[error("Page {page}: model call failed after {attempts} attempts: {detail}")]
    CallFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// Model call timed out; timeouts count as transport failures.
    #[error("Page {page}: model call timed out after {elapsed_ms}ms")]
    Timeout { page: usize, elapsed_ms: u64 },

    /// Authentication failure (401/403); not retried, a new attempt with the
    /// same credentials cannot succeed.
    #[error("Page {page}: authentication failed for provider '{provider}': {detail}")]
    Auth {
        page: usize,
        provider: String,
        detail: String,
    },

    /// The model returned an empty or whitespace-only answer after retries.
    #[error("Page {page}: model returned an empty answer")]
    EmptyResponse { page: usize },
}

/// Terminal failure of a batch upload.
///
/// By the time this error surfaces, every file stored before the failure has
/// been deleted again (compensating rollback); failed deletes are logged as
/// warnings and never replace this error.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Storing one file failed, aborting and reversing the batch.
    #[error("Upload of '{name}' failed: {source}\nAll files stored earlier in this batch have been removed.")]
    FileUpload {
        name: String,
        #[source]
        source: StorageError,
    },
}
