//! Batch extraction entry points.
//!
//! ## Failure model
//!
//! A run has two failure planes. Batch-fatal problems (an admission reject,
//! an unreadable PDF, no model configured) abort with an error before any
//! model call is made. Page-level problems never do: a page whose model call
//! fails after retries, or whose answer yields no JSON, is recorded in the
//! output and the run carries on. Zero records with a zero total is a valid
//! result; plenty of real statements contain no expense lines.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::config::ExtractionConfig;
use crate::error::Pdf2ExpenseError;
use crate::output::{
    DocumentSummary, ExtractionOutput, ExtractionStats, PageExtraction, PageOutcome,
};
use crate::pipeline::encode::PageImage;
use crate::pipeline::input::{self, SourceDocument};
use crate::pipeline::{aggregate, llm, render};
use crate::prompts;
use crate::vision::{OpenAiVisionClient, VisionModel};

/// Extract expense records from a batch of PDF documents.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `documents` — In-memory PDF documents, at most `config.max_documents`
/// * `config` — Extraction configuration
///
/// # Returns
/// `Ok(ExtractionOutput)` on success, even if some or all pages failed
/// (check `output.stats.failed_pages` or [`ExtractionOutput::has_failures`]).
///
/// # Errors
/// Returns `Err(Pdf2ExpenseError)` only for batch-fatal errors:
/// - Admission rejects (too many files, wrong media type, oversized, not a PDF)
/// - A document Pdfium cannot open, or with zero pages
/// - No vision model configured
pub async fn extract_expenses(
    documents: &[SourceDocument],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2ExpenseError> {
    let total_start = Instant::now();
    info!("Starting extraction of {} document(s)", documents.len());

    // ── Step 1: Admission checks ─────────────────────────────────────────
    input::validate_batch(documents, config)?;

    // ── Step 2: Resolve the vision model ─────────────────────────────────
    let model = resolve_model(config)?;
    debug!("Using vision provider '{}'", model.provider_name());

    // ── Step 3: Rasterise every document ─────────────────────────────────
    let render_start = Instant::now();
    let images = render::rasterise_documents(documents, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} page(s) across {} document(s) in {}ms",
        images.len(),
        documents.len(),
        render_duration_ms
    );

    // ── Step 4: Prepare the system prompt ────────────────────────────────
    // Composed once per run; every page shares the same schema.
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| prompts::extraction_system_prompt(&config.schema));

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(images.len());
    }

    // ── Step 5: Run pages through the model ──────────────────────────────
    let llm_start = Instant::now();
    let mut pages = process_pages(&model, &images, &system_prompt, config).await;
    let extraction_duration_ms = llm_start.elapsed().as_millis() as u64;

    // Answers land out of order under concurrency; restore document order.
    pages.sort_by_key(|p| (p.document, p.page));

    // ── Step 6: Aggregate records ────────────────────────────────────────
    let (records, total_amount) = aggregate::aggregate_pages(&pages);

    // ── Step 7: Compute stats ────────────────────────────────────────────
    let stats = tally_stats(
        documents.len(),
        &pages,
        records.len(),
        render_duration_ms,
        extraction_duration_ms,
        total_start.elapsed().as_millis() as u64,
    );

    info!(
        "Extraction complete: {} record(s), total {:.2}, {}/{} page(s) recovered, {}ms",
        stats.total_records,
        total_amount,
        stats.recovered_pages,
        stats.total_pages,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        let succeeded = pages.iter().filter(|p| p.error.is_none()).count();
        cb.on_extraction_complete(pages.len(), succeeded);
    }

    Ok(ExtractionOutput {
        records,
        total_amount,
        documents: summarise_documents(documents, &pages),
        pages,
        stats,
    })
}

/// Extract expenses from PDF files on disk.
///
/// Convenience wrapper that reads each path into a [`SourceDocument`]
/// (inferring the media type from the extension) and calls
/// [`extract_expenses`].
pub async fn extract_expenses_from_paths<P: AsRef<Path>>(
    paths: &[P],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2ExpenseError> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        documents.push(SourceDocument::from_path(path.as_ref())?);
    }
    extract_expenses(&documents, config).await
}

/// Extract expenses and write the full output as JSON to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    documents: &[SourceDocument],
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionStats, Pdf2ExpenseError> {
    let output = extract_expenses(documents, config).await?;
    let path = output_path.as_ref();

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Pdf2ExpenseError::Internal(format!("serialising output: {e}")))?;

    // Atomic write: write to temp, then rename
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Pdf2ExpenseError::ReportWriteFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(|e| {
        Pdf2ExpenseError::ReportWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        Pdf2ExpenseError::ReportWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`extract_expenses`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_expenses_sync(
    documents: &[SourceDocument],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2ExpenseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2ExpenseError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(extract_expenses(documents, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the vision model, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.vision_model`) — the caller constructed
///    and configured the model entirely; we use it as-is. Useful in tests or
///    when the caller needs custom middleware (caching, rate-limiting).
///
/// 2. **Environment key** (`OPENAI_API_KEY`) — builds an
///    [`OpenAiVisionClient`] from the key. `config.model` overrides the
///    default model name and `OPENAI_BASE_URL` re-points the endpoint
///    (Azure front-ends, corporate proxies, local gateways).
///
/// Anything less configured than that is an error: extraction cannot run
/// without a model, and failing here is clearer than failing on page one.
fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, Pdf2ExpenseError> {
    // 1) User-provided model takes priority
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    // 2) OpenAI-compatible client from the environment
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            let mut client = OpenAiVisionClient::new(key);
            if let Some(ref model) = config.model {
                client = client.with_model(model.clone());
            }
            if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
                if !base_url.is_empty() {
                    client = client.with_base_url(base_url);
                }
            }
            return Ok(Arc::new(client));
        }
    }

    Err(Pdf2ExpenseError::ModelNotConfigured {
        hint: "Set OPENAI_API_KEY (and optionally OPENAI_BASE_URL), or supply one with \
               ExtractionConfig::builder().vision_model(...)."
            .to_string(),
    })
}

/// Process all pages through the model, `config.concurrency` at a time.
///
/// Page ordinals are 1-based across the whole batch and drive the progress
/// callbacks; results come back in completion order and are re-sorted by the
/// caller.
async fn process_pages(
    model: &Arc<dyn VisionModel>,
    images: &[PageImage],
    system_prompt: &str,
    config: &ExtractionConfig,
) -> Vec<PageExtraction> {
    let total_pages = images.len();
    stream::iter(images.iter().enumerate().map(|(i, image)| {
        let model = Arc::clone(model);
        let ordinal = i + 1;
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(ordinal, total_pages);
            }
            let result = llm::process_page(&model, image, ordinal, system_prompt, config).await;
            if let Some(ref cb) = config.progress_callback {
                match &result.error {
                    None => cb.on_page_complete(ordinal, total_pages, result.records.len()),
                    Some(e) => cb.on_page_error(ordinal, total_pages, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await
}

fn summarise_documents(
    documents: &[SourceDocument],
    pages: &[PageExtraction],
) -> Vec<DocumentSummary> {
    documents
        .iter()
        .enumerate()
        .map(|(idx, doc)| DocumentSummary {
            name: doc.name.clone(),
            size_bytes: doc.bytes.len(),
            page_count: pages.iter().filter(|p| p.document == idx).count(),
        })
        .collect()
}

fn tally_stats(
    total_documents: usize,
    pages: &[PageExtraction],
    total_records: usize,
    render_duration_ms: u64,
    extraction_duration_ms: u64,
    total_duration_ms: u64,
) -> ExtractionStats {
    let mut stats = ExtractionStats {
        total_documents,
        total_pages: pages.len(),
        total_records,
        render_duration_ms,
        extraction_duration_ms,
        total_duration_ms,
        ..ExtractionStats::default()
    };
    for page in pages {
        stats.dropped_records += page.dropped_records;
        match page.outcome() {
            PageOutcome::Recovered => stats.recovered_pages += 1,
            PageOutcome::NoStructure => stats.empty_pages += 1,
            PageOutcome::Failed => stats.failed_pages += 1,
        }
    }
    stats
}
