//! # pdf2expense
//!
//! Extract structured travel-expense records from PDF reports using vision
//! language models.
//!
//! ## Why this crate?
//!
//! Travel reports arrive as PDFs in whatever layout the booking tool or
//! scanner produced: tabular statements next to receipts photographed at an
//! angle. Text-layer extraction falls apart on those. Instead this crate
//! rasterises each page to a JPEG and lets a vision model read it the way a
//! human reviewer would, then recovers the model's free-form answer into
//! typed expense records with validated amounts and an exact grand total.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF batch
//!  │
//!  ├─ 1. Admit      file count, size, media type, %PDF magic
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode     JPEG → base64 data URL
//!  ├─ 4. Model      concurrent vision calls with retry/backoff
//!  ├─ 5. Recover    pull JSON out of noisy answers (5 ordered strategies)
//!  └─ 6. Aggregate  validated records, exact total, per-page stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2expense::{extract_expenses_from_paths, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model built from OPENAI_API_KEY unless one is supplied explicitly
//!     let config = ExtractionConfig::default();
//!     let output = extract_expenses_from_paths(&["report.pdf"], &config).await?;
//!     for record in &output.records {
//!         println!("{}  {}  {:>10.2}", record.date, record.category, record.amount);
//!     }
//!     println!("total: {:.2}", output.total_amount);
//!     Ok(())
//! }
//! ```
//!
//! ## Storing report files
//!
//! Independent of extraction, [`UploadManager`] stores a submitted batch in
//! an object store with all-or-nothing semantics: the first failed store
//! deletes everything stored before it (newest first) and surfaces the
//! original error. Pair it with [`ReportPayload`] to hand both the stored
//! file URLs and the extracted records to a downstream service.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2expense` binary (clap, indicatif, anyhow, tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf2expense = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod storage;
pub mod upload;
pub mod vision;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ExtractionError, Pdf2ExpenseError, UploadError};
pub use extract::{
    extract_expenses, extract_expenses_from_paths, extract_expenses_sync, extract_to_file,
};
pub use output::{
    DocumentSummary, ExpenseRecord, ExtractionOutput, ExtractionStats, PageExtraction,
    PageOutcome, ReportPayload,
};
pub use pipeline::input::SourceDocument;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{ExtractionSchema, FieldSpec};
pub use storage::{MemoryObjectStore, ObjectStore, StorageError, StoredFile};
pub use upload::UploadManager;
pub use vision::{CompletionOptions, OpenAiVisionClient, VisionError, VisionModel};
