//! Utility functions for package files and the output directory

use crate::error::FetchError;
use crate::types::ArchiveEntry;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Extension given to package files
pub const PACKAGE_EXTENSION: &str = "zip";

/// Destination of a package inside the output directory
///
/// Package ids come from the remote service and end up as file names, so
/// anything that could escape `output_dir` is refused, as is an id with
/// surrounding whitespace (callers trim it first).
///
/// # Examples
///
/// ```
/// use cfdi_dl::utils::package_path;
/// use std::path::Path;
///
/// let path = package_path(Path::new("/out"), "4E80345D_01").unwrap();
/// assert_eq!(path, Path::new("/out/4E80345D_01.zip"));
/// assert!(package_path(Path::new("/out"), "../etc").is_err());
/// ```
pub fn package_path(output_dir: &Path, id: &str) -> Result<PathBuf, FetchError> {
    let unsafe_id = id.is_empty()
        || id.trim() != id
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0');
    if unsafe_id {
        return Err(FetchError::InvalidPackageId(id.to_string()));
    }
    Ok(output_dir.join(format!("{id}.{PACKAGE_EXTENSION}")))
}

/// Write `data` to `path` so that `path` either holds all of it or does not exist
///
/// The bytes go to a hidden sibling file first, which is renamed over `path`
/// once fully written and synced. On failure the sibling is removed.
pub async fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| std::io::Error::other(format!("invalid target path: {}", path.display())))?;
    let partial = path.with_file_name(format!(".{file_name}.part"));

    let result: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&partial, path).await
    }
    .await;

    if result.is_err() {
        // Best effort: the partial file may not even exist
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

/// Count the XML documents inside a package
///
/// Best effort: returns `None` when the bytes are not a readable ZIP archive.
/// Callers treat `None` as "unknown" and never as a failed download.
pub fn count_documents(data: &[u8]) -> Option<usize> {
    let archive = match zip::ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => archive,
        Err(e) => {
            tracing::debug!(error = %e, "package is not a readable ZIP archive");
            return None;
        }
    };

    let count = archive
        .file_names()
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .count();
    Some(count)
}

/// List the package archives present in `output_dir`, sorted by file name
pub fn list_archives(output_dir: &Path) -> std::io::Result<Vec<ArchiveEntry>> {
    let mut archives = Vec::new();

    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if !metadata.is_file() {
            continue;
        }

        let is_package = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION));
        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));

        if is_package && !is_hidden {
            archives.push(ArchiveEntry {
                path,
                size_bytes: metadata.len(),
            });
        }
    }

    archives.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(archives)
}
