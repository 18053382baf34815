//! Model interaction: drive one page's vision call with retry/backoff.
//!
//! This module turns an encoded page image into a model call and hands the
//! raw answer straight to the recovery parser. It is intentionally thin —
//! the prompt lives in [`crate::prompts`] and the record validation in
//! [`crate::pipeline::aggregate`], so retry and error handling can change
//! without touching either.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from model APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s, totalling < 4 s of back-off per page.
//! Authentication failures break out of the loop immediately — retrying a
//! rejected key cannot succeed.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::output::PageExtraction;
use crate::pipeline::aggregate::recover_page_records;
use crate::pipeline::encode::PageImage;
use crate::vision::{CompletionOptions, VisionError, VisionModel};

/// Run one page through the model, returning its full extraction outcome.
///
/// `ordinal` is the 1-based page number across the whole batch, used in logs
/// and page-level errors; the `(document, page)` origin travels on the image
/// itself. `system_prompt` is prepared once per run by the orchestrator so
/// the schema is not re-serialised per page.
///
/// ## Return Value
///
/// Always returns a `PageExtraction` — never propagates the error upward, so
/// a single bad page doesn't abort the batch. Callers check the `error`
/// field (or [`PageExtraction::outcome`]) to decide what to do with the page.
pub async fn process_page(
    model: &Arc<dyn VisionModel>,
    image: &PageImage,
    ordinal: usize,
    system_prompt: &str,
    config: &ExtractionConfig,
) -> PageExtraction {
    let start = Instant::now();
    let options = build_options(config);

    let mut last_err: Option<ExtractionError> = None;
    let mut attempts = 0u32;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                ordinal, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts = attempt + 1;

        match model.complete(system_prompt, image, &options).await {
            Ok(text) if !text.trim().is_empty() => {
                let duration = start.elapsed();
                debug!(
                    "Page {}: answered with {} chars in {:?}",
                    ordinal,
                    text.len(),
                    duration
                );

                let recovery = recover_page_records(&text, &config.schema);
                if !recovery.structure_found {
                    warn!("Page {}: no JSON structure recovered from the answer", ordinal);
                }

                return PageExtraction {
                    document: image.document,
                    page: image.page,
                    records: recovery.records,
                    dropped_records: recovery.dropped,
                    structure_found: recovery.structure_found,
                    raw_response: Some(text),
                    attempts,
                    duration_ms: duration.as_millis() as u64,
                    error: None,
                };
            }
            Ok(_) => {
                // Some backends answer 200 with a blank choice; treat it like
                // a transient failure and retry.
                warn!(
                    "Page {}: attempt {} returned an empty answer",
                    ordinal,
                    attempt + 1
                );
                last_err = Some(ExtractionError::EmptyResponse { page: ordinal });
            }
            Err(e) => {
                warn!("Page {}: attempt {} failed: {}", ordinal, attempt + 1, e);
                let retryable = e.is_retryable();
                last_err = Some(to_page_error(e, ordinal, attempts));
                if !retryable {
                    break;
                }
            }
        }
    }

    // All retries exhausted (or a non-retryable failure broke out early).
    let duration = start.elapsed();
    PageExtraction {
        document: image.document,
        page: image.page,
        records: Vec::new(),
        dropped_records: 0,
        structure_found: false,
        raw_response: None,
        attempts,
        duration_ms: duration.as_millis() as u64,
        error: Some(last_err.unwrap_or_else(|| ExtractionError::CallFailed {
            page: ordinal,
            attempts,
            detail: "unknown error".to_string(),
        })),
    }
}

/// Map a model-call failure onto the page-level error tier.
fn to_page_error(err: VisionError, page: usize, attempts: u32) -> ExtractionError {
    match err {
        VisionError::Timeout { elapsed_ms } => ExtractionError::Timeout { page, elapsed_ms },
        VisionError::Auth { provider, detail } => ExtractionError::Auth {
            page,
            provider,
            detail,
        },
        VisionError::EmptyResponse => ExtractionError::EmptyResponse { page },
        other => ExtractionError::CallFailed {
            page,
            attempts,
            detail: other.to_string(),
        },
    }
}

/// Build per-call options from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        timeout: std::time::Duration::from_secs(config.api_timeout_secs),
    }
}
