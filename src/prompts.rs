//! System prompt for schema-constrained expense extraction.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the extraction behaviour (e.g.
//!    tightening the null-handling rule) requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the prompt directly without
//!    calling a real model, making prompt regressions easy to catch.
//!
//! Callers can override the whole prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the text here is used
//! only when no override is provided.

use crate::schema::ExtractionSchema;

/// Fixed preamble of the extraction system prompt.
///
/// The serialised schema is appended to this text; together they form the
/// system message for every page call. The model is told to answer with JSON
/// only, but answers are still treated as untrusted and run through
/// [`crate::pipeline::recover`].
pub const EXTRACTION_PROMPT_PREAMBLE: &str = "You are an AI assistant that extracts information \
from travel reports and maps it to a specific JSON schema. Return only the JSON data without \
any additional explanations. If you can't find specific information, use null for that field. \
Here is the schema to follow: ";

/// Build the system prompt for the given schema.
pub fn extraction_system_prompt(schema: &ExtractionSchema) -> String {
    format!("{}{}", EXTRACTION_PROMPT_PREAMBLE, schema.to_prompt_json())
}
