//! Result types produced by the extraction pipeline.
//!
//! Everything here is serde-serialisable so the CLI can emit the whole run as
//! JSON and host applications can persist it directly. Per-page outcomes are
//! kept alongside the merged record list: a page that failed or recovered
//! nothing is visible in [`ExtractionOutput::pages`], never silently absent.

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::storage::StoredFile;

/// One validated expense record.
///
/// Field validation happens during aggregation; a constructed
/// `ExpenseRecord` always carries the four required fields with a finite,
/// non-negative amount quantised to two decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Identifier printed on the report, when the model found one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub date: String,
    pub category: String,
    pub description: String,
    pub amount: f64,
}

/// Three-way outcome of a single page.
///
/// `Failed` and `NoStructure` both contribute zero records, but they mean
/// different things to a user: the first is "the model call broke", the
/// second is "the model answered and we found no JSON in it" (often a page
/// with no expenses at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    /// The model call failed after retries; see [`PageExtraction::error`].
    Failed,
    /// The model answered but no JSON structure could be recovered.
    NoStructure,
    /// A JSON structure was recovered (its record list may still be empty).
    Recovered,
}

/// Outcome of one page's extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageExtraction {
    /// 0-indexed position of the source document within the batch.
    pub document: usize,
    /// 0-indexed page within that document.
    pub page: usize,
    /// Valid records this page contributed.
    pub records: Vec<ExpenseRecord>,
    /// Records recovered but dropped during validation (missing fields,
    /// non-numeric amount, negative amount).
    pub dropped_records: usize,
    /// Whether the recovery parser found any JSON structure in the answer.
    pub structure_found: bool,
    /// The model's raw answer, kept for diagnosis. None when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Model-call attempts made (1 = first try succeeded).
    pub attempts: u32,
    /// Wall-clock time spent on this page's model call, including retries.
    pub duration_ms: u64,
    /// Set when the model call failed after all retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionError>,
}

impl PageExtraction {
    /// Classify this page into its three-way outcome.
    pub fn outcome(&self) -> PageOutcome {
        if self.error.is_some() {
            PageOutcome::Failed
        } else if !self.structure_found {
            PageOutcome::NoStructure
        } else {
            PageOutcome::Recovered
        }
    }
}

/// Per-document admission summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub name: String,
    pub size_bytes: usize,
    pub page_count: usize,
}

/// Aggregate statistics for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_documents: usize,
    pub total_pages: usize,
    /// Pages whose answer yielded a JSON structure.
    pub recovered_pages: usize,
    /// Pages whose answer carried no recoverable JSON.
    pub empty_pages: usize,
    /// Pages whose model call failed after retries.
    pub failed_pages: usize,
    pub total_records: usize,
    pub dropped_records: usize,
    pub render_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Complete result of an extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// All valid records, in stable (document, page) order.
    pub records: Vec<ExpenseRecord>,
    /// Exact sum of all record amounts.
    pub total_amount: f64,
    pub documents: Vec<DocumentSummary>,
    pub pages: Vec<PageExtraction>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Whether any page's model call failed.
    pub fn has_failures(&self) -> bool {
        self.stats.failed_pages > 0
    }

    /// Iterate over the pages whose model call failed.
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageExtraction> {
        self.pages.iter().filter(|p| p.error.is_some())
    }
}

/// The payload persisted after a confirmed report is uploaded: stored file
/// references plus the validated expenses and their total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub documents: Vec<StoredFile>,
    pub expenses: Vec<ExpenseRecord>,
    pub total_amount: f64,
}

impl ReportPayload {
    /// Assemble the payload from stored files and a finished extraction.
    pub fn new(documents: Vec<StoredFile>, output: &ExtractionOutput) -> Self {
        Self {
            documents,
            expenses: output.records.clone(),
            total_amount: output.total_amount,
        }
    }
}
