//! Configuration types for expense extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::Pdf2ExpenseError;
use crate::progress::ProgressCallback;
use crate::schema::ExtractionSchema;
use crate::vision::VisionModel;
use std::fmt;
use std::sync::Arc;

/// Configuration for an expense-extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2expense::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o")
///     .concurrency(4)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Maximum rendered page dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps either dimension, scaling the other proportionally, so pdfium
    /// never allocates more than roughly `max_rendered_pixels²` bytes of
    /// pixels per page. 2000 px keeps receipt-sized print legible to a vision
    /// model while the JPEG stays well under typical API upload limits.
    /// Raise it for dense small-font reports; lower it to cut upload size.
    pub max_rendered_pixels: u32,

    /// JPEG quality for the encoded page image, 1–100. Default: 85.
    ///
    /// 85 keeps printed digits and table rules crisp while producing files a
    /// third the size of quality 100. Below ~60 the compression artefacts
    /// start costing the model accuracy on small amounts ("8" vs "6").
    pub jpeg_quality: u8,

    /// Number of concurrent model calls. Default: 1 (sequential).
    ///
    /// Vision APIs are rate- and cost-limited, and expense batches are small
    /// (a handful of pages), so sequential is the safe default. Raising this
    /// fans pages out up to the given limit; results are re-sorted into page
    /// order before aggregation either way.
    pub concurrency: usize,

    /// Model identifier, e.g. "gpt-4o". If None, the client default is used.
    pub model: Option<String>,

    /// Pre-constructed vision model. Takes precedence over environment-based
    /// client construction.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Schema serialised into the system prompt and enforced during
    /// aggregation. Default: [`ExtractionSchema::travel_expenses()`].
    pub schema: ExtractionSchema,

    /// Custom system prompt. If None, the built-in prompt with the serialised
    /// schema is used. Overriding this without mentioning the schema will
    /// break extraction; it exists for prompt experiments, not routine use.
    pub system_prompt: Option<String>,

    /// Sampling temperature for the model call. Default: 0.1.
    ///
    /// Low temperature makes the model deterministic and faithful to what it
    /// sees on the page. Higher values introduce creativity that worsens
    /// transcription accuracy.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 2500.
    ///
    /// A dense expense table runs to a few hundred tokens of JSON; 2500
    /// leaves room for the occasional model that insists on prose around the
    /// data. Setting it too low truncates the JSON mid-array, which the
    /// recovery parser cannot repair.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient model failure. Default: 3.
    ///
    /// Most 5xx and timeout errors are transient. Authentication errors are
    /// not retried; they surface in the page result immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    ///
    /// A timeout is treated as the same failure class as a transport error:
    /// retried, then recorded on the page.
    pub api_timeout_secs: u64,

    /// Per-document size limit in bytes. Default: 10 MiB.
    pub max_document_bytes: usize,

    /// Maximum number of documents per batch. Default: 5.
    pub max_documents: usize,

    /// Progress callback invoked at pipeline milestones. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            jpeg_quality: 85,
            concurrency: 1,
            model: None,
            vision_model: None,
            schema: ExtractionSchema::travel_expenses(),
            system_prompt: None,
            temperature: 0.1,
            max_tokens: 2500,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            max_document_bytes: 10 * 1024 * 1024,
            max_documents: 5,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field(
                "vision_model",
                &self.vision_model.as_ref().map(|_| "<dyn VisionModel>"),
            )
            .field("schema", &self.schema)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("max_documents", &self.max_documents)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(512, 4096);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn schema(mut self, schema: ExtractionSchema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_document_bytes(mut self, bytes: usize) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn max_documents(mut self, n: usize) -> Self {
        self.config.max_documents = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Fields are public, so values that bypassed the clamping setters are
    /// re-checked here.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2ExpenseError> {
        let c = &self.config;
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(Pdf2ExpenseError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2ExpenseError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2ExpenseError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2ExpenseError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_documents == 0 {
            return Err(Pdf2ExpenseError::InvalidConfig(
                "max_documents must be ≥ 1".into(),
            ));
        }
        if !c.schema.declares_required_expense_fields() {
            return Err(Pdf2ExpenseError::InvalidConfig(
                "Schema must declare date, category, description and amount as required".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.max_rendered_pixels, 2000);
        assert_eq!(c.jpeg_quality, 85);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_tokens, 2500);
        assert!((c.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(c.max_document_bytes, 10 * 1024 * 1024);
        assert_eq!(c.max_documents, 5);
    }

    #[test]
    fn setters_clamp_out_of_range_values() {
        let c = ExtractionConfig::builder()
            .jpeg_quality(200)
            .temperature(5.0)
            .concurrency(0)
            .max_rendered_pixels(10)
            .build()
            .unwrap();
        assert_eq!(c.jpeg_quality, 100);
        assert!((c.temperature - 2.0).abs() < f32::EPSILON);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_rendered_pixels, 512);
    }

    #[test]
    fn build_rejects_schema_without_required_fields() {
        let mut schema = ExtractionSchema::travel_expenses();
        schema.required.clear();
        let err = ExtractionConfig::builder().schema(schema).build();
        assert!(matches!(err, Err(Pdf2ExpenseError::InvalidConfig(_))));
    }

    #[test]
    fn build_rejects_zero_max_tokens() {
        let err = ExtractionConfig::builder().max_tokens(0).build();
        assert!(matches!(err, Err(Pdf2ExpenseError::InvalidConfig(_))));
    }
}
