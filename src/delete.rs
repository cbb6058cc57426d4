//! Best-effort recursive delete
//!
//! Files are removed first, then sub-directories (recursively). A failing
//! child does not stop its siblings; its error is collected instead. The
//! directory itself is only removed when every child went away, otherwise
//! the collected failures are returned as one [`BridgeError::Aggregate`].

use crate::error::{BridgeError, Result};
use crate::storage::{Directory, File};

/// Delete `dir` and everything below it.
///
/// A directory that does not exist is left alone. Listing failures abort
/// immediately since there is nothing left to continue with.
pub fn delete_recursively<D: Directory>(dir: &D) -> Result<()> {
    if !dir.exists()? {
        tracing::debug!("Directory {} does not exist, nothing to delete", dir);
        return Ok(());
    }

    tracing::debug!("Deleting {} recursively", dir);
    let mut failures = Vec::new();

    let mut files = dir.list_files()?;
    files.extend(dir.list_special_files()?);
    for file in files {
        if let Err(e) = file.delete() {
            tracing::warn!("Cannot delete file {}: {}", file, e);
            failures.push(e);
        }
    }

    for sub in dir.list_sub_directories()? {
        if let Err(e) = delete_recursively(&sub) {
            tracing::warn!("Cannot delete directory {}: {}", sub, e);
            failures.push(e);
        }
    }

    if !failures.is_empty() {
        return Err(BridgeError::Aggregate {
            path: dir.full_path(),
            failures,
        });
    }

    dir.delete()
}
