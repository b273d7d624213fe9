//! Moves finished downloads to their destination.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ClientError;
use crate::transport::filename::sanitize_filename;

/// Highest numeric suffix tried before giving up on a unique name.
const MAX_SUFFIX: usize = 1000;

/// Resolves a path in `dir` that does not exist yet, adding `_N` before the
/// extension on collision: `file.pdf`, `file_1.pdf`, `file_2.pdf`, ...
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.trim_matches('_').is_empty() {
            "download.bin".to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };
    for i in 1..MAX_SUFFIX {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

/// Moves `temp_path` to a unique path named `filename` under `destination_dir`,
/// creating the directory if needed. Falls back to copy and remove when a
/// rename crosses filesystems.
///
/// # Errors
///
/// Returns [`ClientError::Filesystem`] if the directory cannot be created or
/// the file cannot be moved. The temporary file is removed either way.
pub async fn place_download(
    temp_path: &Path,
    destination_dir: &Path,
    filename: &str,
) -> Result<PathBuf, ClientError> {
    if let Err(e) = tokio::fs::create_dir_all(destination_dir).await {
        let _ = tokio::fs::remove_file(temp_path).await;
        return Err(ClientError::filesystem(destination_dir, e));
    }

    let destination = resolve_unique_path(destination_dir, filename);
    debug!(from = %temp_path.display(), to = %destination.display(), "placing download");

    if tokio::fs::rename(temp_path, &destination).await.is_ok() {
        return Ok(destination);
    }

    let copied = tokio::fs::copy(temp_path, &destination).await;
    let _ = tokio::fs::remove_file(temp_path).await;
    match copied {
        Ok(_) => Ok(destination),
        Err(e) => {
            let _ = tokio::fs::remove_file(&destination).await;
            Err(ClientError::filesystem(destination, e))
        }
    }
}
