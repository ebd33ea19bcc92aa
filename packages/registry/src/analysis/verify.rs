use std::fmt;

use common::retry::RetryPolicy;
use common::storage::{StorageVerifier, stat_with_retry};
use futures::future::join_all;
use tracing::warn;

use crate::entity::file;
use crate::error::RegistryError;

/// Files that failed verification against object storage, by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageReport {
    /// Not in storage, or storage could not be reached within the retry budget.
    pub missing: Vec<String>,
    pub size_mismatches: Vec<String>,
    pub checksum_mismatches: Vec<String>,
    /// Storage holds no checksum for the object.
    pub undefined_checksums: Vec<String>,
}

impl StorageReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.size_mismatches.is_empty()
            && self.checksum_mismatches.is_empty()
            && self.undefined_checksums.is_empty()
    }

    /// The refusal for this report, if any. The kind follows the first non-empty category
    /// in the order missing, size, checksum; the message lists all of them.
    pub fn into_error(self, analysis_id: &str) -> Option<RegistryError> {
        let analysis_id = analysis_id.to_string();
        if !self.missing.is_empty() {
            Some(RegistryError::MissingStorageObjects {
                analysis_id,
                report: self,
            })
        } else if !self.size_mismatches.is_empty() {
            Some(RegistryError::MismatchingStorageObjectSizes {
                analysis_id,
                report: self,
            })
        } else if !self.checksum_mismatches.is_empty() || !self.undefined_checksums.is_empty() {
            Some(RegistryError::MismatchingStorageObjectChecksums {
                analysis_id,
                report: self,
            })
        } else {
            None
        }
    }
}

impl fmt::Display for StorageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let categories = [
            ("missing storage objects", &self.missing),
            ("mismatching sizes", &self.size_mismatches),
            ("mismatching checksums", &self.checksum_mismatches),
            ("undefined checksums", &self.undefined_checksums),
        ];
        let parts: Vec<String> = categories
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| format!("{label} [{}]", ids.join(", ")))
            .collect();
        if parts.is_empty() {
            f.write_str("all files verified")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

/// Compare every file against what storage reports. Storage is queried for all files
/// concurrently; a file whose stat fails after retries counts as missing.
pub async fn verify_files(
    storage: &dyn StorageVerifier,
    files: &[file::Model],
    policy: &RetryPolicy,
    ignore_undefined_md5: bool,
) -> StorageReport {
    let stats = join_all(files.iter().map(|f| async move {
        let result = stat_with_retry(storage, &f.id, policy).await;
        (f, result)
    }))
    .await;

    let mut report = StorageReport::default();
    for (file, result) in stats {
        let object = match result {
            Ok(object) if object.exists => object,
            Ok(_) => {
                report.missing.push(file.id.clone());
                continue;
            }
            Err(e) => {
                warn!(object_id = %file.id, error = %e, "Storage unreachable, counting object as missing");
                report.missing.push(file.id.clone());
                continue;
            }
        };

        if object.size != Some(file.size) {
            report.size_mismatches.push(file.id.clone());
        }

        match (file.md5.as_deref(), object.md5.as_deref()) {
            (_, None) => {
                if !ignore_undefined_md5 {
                    report.undefined_checksums.push(file.id.clone());
                }
            }
            (Some(recorded), Some(stored)) if !recorded.eq_ignore_ascii_case(stored) => {
                report.checksum_mismatches.push(file.id.clone());
            }
            _ => {}
        }
    }
    report
}
