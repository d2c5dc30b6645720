//! Identifiers, metadata, and errors shared by the page source.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Position of a document in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentId(pub usize);

/// Flattened address of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRef {
    /// Owning document.
    pub document: DocumentId,
    /// 0-based index within the owning document.
    pub local_index: usize,
    /// 0-based index within the whole run.
    pub global_index: usize,
}

/// Cheap, static facts about a page, consulted before extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    /// File name of the owning document.
    pub source_name: String,
    /// 0-based index within the owning document.
    pub local_index: usize,
    /// Decoded content-stream length in bytes (0 when unavailable).
    pub size_hint: usize,
    /// Size of the owning document on disk.
    pub document_bytes: u64,
}

/// Structural facts about one page, reported by page diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageCharacteristics {
    /// Decoded content-stream length in bytes.
    pub content_bytes: usize,
    /// Number of content streams the page concatenates.
    pub content_streams: usize,
    /// Base font names (or resource names when no base font is declared).
    pub fonts: Vec<String>,
    /// Image XObjects in the page resources.
    pub image_count: usize,
    /// Annotation count.
    pub annotations: usize,
    /// Effective media box `[x0, y0, x1, y1]`, inherited if necessary.
    pub media_box: Option<[f64; 4]>,
    /// Effective rotation in degrees.
    pub rotation: i64,
}

/// Summary of a successfully loaded document, recorded in run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    /// Position in load order.
    pub id: DocumentId,
    /// Path the document was read from.
    pub path: PathBuf,
    /// File name used by the classifier and in logs.
    pub name: String,
    /// Size of the file on disk.
    pub byte_size: u64,
    /// Hex-encoded SHA-256 of the file contents.
    pub sha256: String,
    /// Number of pages contributed to the run.
    pub page_count: usize,
    /// Global index of the document's first page.
    pub first_global_page: usize,
}

/// A source document could not be used. The run continues without it.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Unreadable {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The bytes are not a parseable PDF container.
    #[error("{path} is not a valid PDF: {reason}")]
    InvalidContainer {
        /// Offending path.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },
    /// The document is encrypted and cannot be read without a password.
    #[error("{path} is encrypted")]
    Encrypted {
        /// Offending path.
        path: PathBuf,
    },
    /// The container parsed but holds no pages.
    #[error("{path} contains no pages")]
    NoPages {
        /// Offending path.
        path: PathBuf,
    },
}

impl LoadError {
    /// Path of the document that failed to load.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Unreadable { path, .. }
            | Self::InvalidContainer { path, .. }
            | Self::Encrypted { path }
            | Self::NoPages { path } => path,
        }
    }
}

/// A page index outside `[0, total_pages)` was requested. Indicates a planning bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page index {index} out of bounds (total pages: {total})")]
pub struct PageRangeError {
    /// Requested global index.
    pub index: usize,
    /// Number of pages in the source.
    pub total: usize,
}

/// Errors returned when fetching a page's encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageAccessError {
    /// Contract violation; fatal to the run.
    #[error(transparent)]
    Range(#[from] PageRangeError),
    /// The page exists but could not be re-encoded as a standalone document.
    #[error("page {index} could not be isolated: {reason}")]
    Isolation {
        /// Requested global index.
        index: usize,
        /// Encoder diagnostic.
        reason: String,
    },
}
