//! File I/O utilities.
//!
//! Async and sync readers for the static resources a session consumes.

use crate::{InkgridError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Read a file asynchronously.
///
/// # Errors
///
/// Returns `InkgridError::Io` for I/O errors (these always bubble up).
pub async fn read_file_async(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    fs::read(path.as_ref()).await.map_err(InkgridError::Io)
}

/// Read a file synchronously.
///
/// # Errors
///
/// Returns `InkgridError::Io` for I/O errors (these always bubble up).
pub fn read_file_sync(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    std::fs::read(path.as_ref()).map_err(InkgridError::Io)
}

/// Directory that relative resources of `resource` are addressed from.
///
/// Bitmaps and the analysis resource live next to the index resource; a bare
/// file name resolves against the current directory.
pub fn resource_dir(resource: impl AsRef<Path>) -> PathBuf {
    match resource.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
