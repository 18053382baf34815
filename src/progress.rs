//! Progress events emitted while a batch is extracted.
//!
//! The pipeline reports milestones through the
//! [`ExtractionProgressCallback`] trait instead of a channel: the host
//! decides what a "progress update" means for it (a terminal bar, a
//! WebSocket frame, a row update) and the library stays ignorant of the
//! transport. The CLI's indicatif bar is one such implementation.
//!
//! All methods default to no-ops, so an implementation overrides only the
//! events it cares about:
//!
//! ```rust
//! use pdf2expense::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! #[derive(Default)]
//! struct RecordCounter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for RecordCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, records: usize) {
//!         let so_far = self.0.fetch_add(records, Ordering::SeqCst) + records;
//!         eprintln!("page {page_num}/{total_pages}: {so_far} record(s) so far");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(RecordCounter::default()))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Receiver for per-page extraction events.
///
/// With `concurrency > 1` the page-level methods fire from different tasks
/// at the same time, so implementations guard shared state with atomics or a
/// mutex. `page_num` is the 1-based ordinal across the whole batch, matching
/// the log output and page-level errors.
pub trait ExtractionProgressCallback: Send + Sync {
    /// All pages are rendered; model calls are about to start.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// A page's model call is about to be sent.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// A page's answer came back and was recovered and validated;
    /// `records` is the number of valid expense records it contributed.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, records: usize) {
        let _ = (page_num, total_pages, records);
    }

    /// A page's model call failed after all retries; `error` is the
    /// human-readable terminal error.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Every page has been attempted; `success_count` is the number whose
    /// model call completed without error.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Callback that ignores every event; the default when none is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The callback type as stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records the event stream as strings so ordering is assertable.
    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
        records_seen: AtomicUsize,
    }

    impl ExtractionProgressCallback for EventLog {
        fn on_extraction_start(&self, total_pages: usize) {
            self.events.lock().unwrap().push(format!("start:{total_pages}"));
        }

        fn on_page_start(&self, page_num: usize, _total_pages: usize) {
            self.events.lock().unwrap().push(format!("page:{page_num}"));
        }

        fn on_page_complete(&self, page_num: usize, _total_pages: usize, records: usize) {
            self.records_seen.fetch_add(records, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("done:{page_num}"));
        }

        fn on_page_error(&self, page_num: usize, _total_pages: usize, _error: &str) {
            self.events.lock().unwrap().push(format!("fail:{page_num}"));
        }

        fn on_extraction_complete(&self, _total_pages: usize, success_count: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete:{success_count}"));
        }
    }

    #[test]
    fn noop_accepts_every_event() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 3);
        cb.on_page_error(2, 2, "timeout");
        cb.on_extraction_complete(2, 1);
    }

    #[test]
    fn events_arrive_in_pipeline_order() {
        let log = EventLog::default();
        log.on_extraction_start(2);
        log.on_page_start(1, 2);
        log.on_page_complete(1, 2, 4);
        log.on_page_start(2, 2);
        log.on_page_error(2, 2, "connection reset");
        log.on_extraction_complete(2, 1);

        let events = log.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start:2", "page:1", "done:1", "page:2", "fail:2", "complete:1"]
        );
        assert_eq!(log.records_seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn works_behind_the_arc_alias() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_extraction_start(1);
        cb.on_page_complete(1, 1, 0);
    }
}
