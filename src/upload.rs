//! Transactional batch upload with compensating rollback.
//!
//! Storing a batch of report files is all-or-nothing from the caller's point
//! of view: either every file ends up in the object store, or none does.
//! Object stores offer no multi-object transaction, so atomicity is
//! approximated with a commit log: every successful `put` is recorded, and
//! the first failure unwinds the log by deleting what was stored, newest
//! first, before the error is returned.
//!
//! Rollback is best-effort. A delete that fails is logged as a warning and
//! skipped; escalating it would bury the upload failure the caller actually
//! needs to see.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::UploadError;
use crate::pipeline::input::SourceDocument;
use crate::storage::{ObjectStore, StoredFile};

/// Build a collision-resistant object name from the original file name.
///
/// Timestamped and salted so that re-submitting the same report, or two
/// users submitting `report.pdf` in the same second, never overwrites a
/// stored object. The original name stays at the end for human listings.
fn unique_object_name(original: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let salt = Uuid::new_v4().simple().to_string();
    format!("{stamp}_{}_{original}", &salt[..8])
}

/// Record of the objects stored so far in one batch, for rollback.
#[derive(Debug, Default)]
struct CommitLog {
    urls: Vec<String>,
}

impl CommitLog {
    fn record(&mut self, url: String) {
        self.urls.push(url);
    }

    fn len(&self) -> usize {
        self.urls.len()
    }

    /// Delete every recorded object, newest first, draining the log.
    ///
    /// Reverse order mirrors how a transaction unwinds: at any point during
    /// rollback, what remains stored is a prefix of the batch.
    async fn unwind(&mut self, store: &dyn ObjectStore) {
        while let Some(url) = self.urls.pop() {
            if let Err(err) = store.delete(&url).await {
                warn!("Rollback delete of '{url}' failed: {err}");
            }
        }
    }
}

/// Stores document batches atomically against an [`ObjectStore`].
///
/// The manager is stateless between calls and can be shared; each
/// [`upload_batch`](UploadManager::upload_batch) call generates fresh object
/// names, so a retried batch never collides with the remains of an earlier
/// attempt.
pub struct UploadManager {
    store: Arc<dyn ObjectStore>,
}

impl UploadManager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Store every document in the batch, or none of them.
    ///
    /// Documents are stored in order. On the first `put` failure the
    /// already-stored objects are deleted again (newest first) and the
    /// failure is returned; delete errors during rollback are logged as
    /// warnings and never replace it.
    ///
    /// On success the returned [`StoredFile`]s carry the *original* file
    /// names alongside the storage URLs, in submission order.
    pub async fn upload_batch(
        &self,
        documents: &[SourceDocument],
    ) -> Result<Vec<StoredFile>, UploadError> {
        let mut log = CommitLog::default();
        let mut stored = Vec::with_capacity(documents.len());

        for doc in documents {
            let object_name = unique_object_name(&doc.name);
            debug!("Storing '{}' as '{object_name}'", doc.name);
            match self
                .store
                .put(&object_name, &doc.bytes, &doc.media_type)
                .await
            {
                Ok(url) => {
                    log.record(url.clone());
                    stored.push(StoredFile {
                        name: doc.name.clone(),
                        size: doc.bytes.len(),
                        url,
                    });
                }
                Err(source) => {
                    warn!(
                        "Upload of '{}' failed; removing {} stored file(s)",
                        doc.name,
                        log.len()
                    );
                    log.unwind(self.store.as_ref()).await;
                    return Err(UploadError::FileUpload {
                        name: doc.name.clone(),
                        source,
                    });
                }
            }
        }

        info!("Stored {} file(s)", stored.len());
        Ok(stored)
    }
}

impl fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadManager").finish_non_exhaustive()
    }
}
