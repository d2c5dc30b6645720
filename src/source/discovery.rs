use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised while locating input documents.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The input directory does not exist or is not a directory.
    #[error("input directory {0} not found")]
    MissingDirectory(PathBuf),
    /// The directory could not be listed.
    #[error("failed to list {path}: {source}")]
    Walk {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying walker failure.
        #[source]
        source: walkdir::Error,
    },
    /// The directory holds no PDF files.
    #[error("no PDF files found in {0}")]
    NoDocuments(PathBuf),
}

/// List the PDF files directly inside `dir`, sorted by file name.
///
/// Sorting makes the global page order, and therefore chunk boundaries, reproducible across
/// runs over the same directory.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !dir.is_dir() {
        return Err(DiscoveryError::MissingDirectory(dir.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| DiscoveryError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && has_pdf_extension(entry.path()) {
            documents.push(entry.into_path());
        }
    }

    if documents.is_empty() {
        return Err(DiscoveryError::NoDocuments(dir.to_path_buf()));
    }
    tracing::debug!(dir = %dir.display(), count = documents.len(), "Discovered documents");
    Ok(documents)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
