use bytes::Bytes;
use std::fmt;
use std::path::Path;

use crate::domain::bundle::{PlannedUpload, human_size};
use crate::domain::storage::ArtifactStore;
use crate::domain::utils::retry::RetryPolicy;
use crate::error::{Error, Result};

pub const BUNDLE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploaded { attempts: u32, bytes: u64 },
    /// The key already existed; nothing was transferred.
    AlreadyPresent,
}

/// Uploads bundles at most once per destination key.
///
/// Bundles are immutable: a key that exists is never overwritten, even if the
/// local file differs.
#[derive(Debug, Clone)]
pub struct BundleUploadGuard {
    store: ArtifactStore,
    retry: RetryPolicy,
}

impl BundleUploadGuard {
    pub fn new(store: ArtifactStore, retry: RetryPolicy) -> Self {
        BundleUploadGuard { store, retry }
    }

    pub async fn ensure_uploaded(&self, local_path: &Path, key: &str) -> Result<UploadStatus> {
        if self.store.exists(key).await? {
            log::info!("{} already present, skipping upload", self.store.uri(key));
            return Ok(UploadStatus::AlreadyPresent);
        }

        let body = tokio::fs::read(local_path).await.map(Bytes::from).map_err(|e| Error::UploadError {
            key: self.store.uri(key),
            attempts: 0,
            message: format!("cannot read {}: {}", local_path.display(), e),
        })?;
        let bytes = body.len() as u64;
        let label = format!("Upload of {}", local_path.display());

        let (_, attempts) = self
            .retry
            .run(&label, |_| self.store.put(key, body.clone(), Some(BUNDLE_CONTENT_TYPE)))
            .await
            .map_err(|exhausted| Error::UploadError {
                key: self.store.uri(key),
                attempts: exhausted.attempts,
                message: exhausted.last_error.to_string(),
            })?;

        log::info!("Uploaded {} to {} ({})", local_path.display(), self.store.uri(key), human_size(bytes));
        Ok(UploadStatus::Uploaded { attempts, bytes })
    }

    /// Uploads every planned bundle in order, continuing past failures.
    pub async fn upload_all(&self, plan: &[PlannedUpload]) -> UploadSummary {
        let mut summary = UploadSummary::default();
        for planned in plan {
            log::info!("Uploading {}", planned);
            match self.ensure_uploaded(&planned.bundle.path, &planned.key).await {
                Ok(status) => summary.succeeded.push((planned.bundle.file_name.clone(), self.store.uri(&planned.key), status)),
                Err(e) => {
                    log::error!("Failed to upload {}: {}", planned.bundle.file_name, e);
                    summary.failed.push((planned.bundle.file_name.clone(), e));
                }
            }
        }
        summary
    }
}

#[derive(Debug, Default)]
pub struct UploadSummary {
    pub succeeded: Vec<(String, String, UploadStatus)>,
    pub failed: Vec<(String, Error)>,
}

impl UploadSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Upload Summary ===")?;
        if !self.succeeded.is_empty() {
            writeln!(f, "Successful uploads:")?;
            for (file, uri, status) in &self.succeeded {
                match status {
                    UploadStatus::Uploaded { attempts, .. } => writeln!(f, "  - {} -> {} (attempts: {})", file, uri, attempts)?,
                    UploadStatus::AlreadyPresent => writeln!(f, "  - {} -> {} (already present)", file, uri)?,
                }
            }
        }
        if !self.failed.is_empty() {
            writeln!(f, "Failed uploads:")?;
            for (file, e) in &self.failed {
                writeln!(f, "  - {}: {}", file, e)?;
            }
        }
        Ok(())
    }
}
