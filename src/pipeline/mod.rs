//! Pipeline stages for travel-expense extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ recover ──▶ aggregate
//! (admission) (pdfium)  (base64)  (vision) (JSON)      (validate + total)
//! ```
//!
//! 1. [`input`]     — admission checks on the submitted document batch
//! 2. [`render`]    — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]    — JPEG-encode and base64-wrap each rendered page for the
//!    multimodal API request body
//! 4. [`llm`]       — drive the model call with retry/backoff; the only stage
//!    with network I/O
//! 5. [`recover`]   — pull a well-formed JSON value out of the model's noisy
//!    text answer
//! 6. [`aggregate`] — validate recovered records against the schema and sum
//!    the amounts exactly

pub mod aggregate;
pub mod encode;
pub mod input;
pub mod llm;
pub mod recover;
pub mod render;
