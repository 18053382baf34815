//! Structured recovery: pull a well-formed JSON value out of noisy model text.
//!
//! ## Why is recovery necessary?
//!
//! The prompt tells the model to answer with JSON only, but vision models are
//! an untrusted text source and routinely disobey in small ways:
//!
//! - Wrapping the JSON in ` ```json ... ``` ` fences
//! - Prefacing it with "Here are the extracted expenses:"
//! - Trailing it with a summary sentence
//! - Emitting stray brackets inside the surrounding prose
//!
//! Rather than one regex-laden branch, recovery is an ordered chain of pure
//! functions `&str → Option<Value>`, composed by first-success selection.
//! Each strategy is independently testable, and a new strategy can be added
//! without touching the existing ones.
//!
//! ## Strategy Order
//!
//! Cheapest and most precise first:
//!
//! 1. Direct parse of the trimmed text
//! 2. Strip code-fence markers, keep their content, parse the cleaned text
//! 3. First `[...]` span, then first `{...}` span, parsed as-is
//! 4. Balanced-bracket scan collecting complete top-level spans
//! 5. Give up: log the head of the answer and return `None`
//!
//! Recovery never fails loudly. A page whose answer yields nothing simply
//! contributes zero records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Recover a JSON value from free-form model output.
///
/// Applies the strategies in order and returns the first success. Pure and
/// stateless: calling it twice on the same text yields the same result.
/// Scalar JSON (`"5"`, `null`, `true`) is accepted by the direct parse and
/// passed through; record validation downstream rejects what it cannot use.
pub fn recover_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    parse_direct(trimmed)
        .or_else(|| parse_unfenced(text))
        .or_else(|| parse_first_bracketed_span(text))
        .or_else(|| parse_balanced_spans(text))
        .or_else(|| {
            warn!(
                "No JSON structure recovered; answer began: {:?}",
                head(text, 100)
            );
            None
        })
}

/// First `n` characters of the text, for log lines.
fn head(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

// ── Strategy 1: Direct parse ─────────────────────────────────────────────────

fn parse_direct(trimmed: &str) -> Option<Value> {
    serde_json::from_str(trimmed).ok()
}

// ── Strategy 2: Strip code fences ────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\n?(.*?)\n?```").unwrap());

/// Remove fence markers while keeping their content, then parse the whole
/// cleaned text. Succeeds when the answer is exactly one fenced JSON block
/// (with at most whitespace around it); fenced JSON buried in prose falls
/// through to the span strategies.
fn parse_unfenced(text: &str) -> Option<Value> {
    let cleaned = RE_FENCE.replace_all(text, "${1}");
    serde_json::from_str(cleaned.trim()).ok()
}

// ── Strategy 3: First bracketed span ─────────────────────────────────────────

static RE_ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*?\]").unwrap());
static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*?\}").unwrap());

/// Try the first non-greedy `[...]` span, then the first `{...}` span.
///
/// Arrays get priority: the expected answer shape is an array of records,
/// and an object span that happens to start earlier is usually a fragment
/// of it. One attempt per span kind; a span that fails to parse is not
/// re-expanded.
fn parse_first_bracketed_span(text: &str) -> Option<Value> {
    if let Some(m) = RE_ARRAY_SPAN.find(text) {
        if let Ok(value) = serde_json::from_str(m.as_str()) {
            return Some(value);
        }
    }
    if let Some(m) = RE_OBJECT_SPAN.find(text) {
        if let Ok(value) = serde_json::from_str(m.as_str()) {
            return Some(value);
        }
    }
    None
}

// ── Strategy 4: Balanced-bracket scan ────────────────────────────────────────

/// Single pass over the text collecting every complete top-level bracketed
/// span, then parse the candidates in order of appearance.
///
/// A span starts when an opener arrives on an empty stack. Closers arriving
/// on an empty stack are ignored, as are closers that don't type-match the
/// top of the stack; model prose is full of stray brackets and one must not
/// derail the scan. Bracket characters inside JSON string literals
/// (respecting backslash escapes) don't count.
fn parse_balanced_spans(text: &str) -> Option<Value> {
    let mut candidates: Vec<&str> = Vec::new();
    let mut stack: Vec<char> = Vec::new();
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        // String tracking applies only inside a span; quotes in surrounding
        // prose must not flip the state.
        if !stack.is_empty() {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' if in_string => {
                    escaped = true;
                    continue;
                }
                '"' => {
                    in_string = !in_string;
                    continue;
                }
                _ if in_string => continue,
                _ => {}
            }
        }

        match ch {
            '{' | '[' => {
                if stack.is_empty() {
                    start = i;
                    in_string = false;
                    escaped = false;
                }
                stack.push(ch);
            }
            '}' | ']' => {
                let matches_top = matches!(
                    (stack.last(), ch),
                    (Some('{'), '}') | (Some('['), ']')
                );
                if matches_top {
                    stack.pop();
                    if stack.is_empty() {
                        candidates.push(&text[start..i + ch.len_utf8()]);
                    }
                }
            }
            _ => {}
        }
    }

    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
}
