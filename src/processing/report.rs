use serde::Serialize;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::types::ChunkSummary;
use crate::config::ChunkingConfig;
use crate::metrics::MetricsSnapshot;
use crate::extraction::PageDiagnosis;
use crate::source::{DocumentInfo, LoadError, PageCharacteristics};

/// Outcome of one pipeline run, written alongside the chunk files.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// RFC 3339 start time.
    pub started_at: String,
    /// RFC 3339 finish time.
    pub finished_at: String,
    /// Planning parameters in effect.
    pub chunking: ChunkingConfig,
    /// Pages across every loaded document.
    pub total_pages: usize,
    /// Documents that contributed pages, in load order.
    pub documents: Vec<DocumentInfo>,
    /// Documents that were skipped.
    pub load_errors: Vec<LoadFailure>,
    /// One entry per assembled chunk, in plan order.
    pub chunks: Vec<ChunkSummary>,
    /// Chunks planned but never assembled because the run was aborted.
    pub chunks_not_started: usize,
    /// Whether a run-level abort stopped the run.
    pub interrupted: bool,
    /// Extraction counters at the end of the run.
    pub metrics: MetricsSnapshot,
}

impl RunReport {
    /// Pages that yielded no text in any chunk, deduplicated and sorted.
    pub fn failed_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self
            .chunks
            .iter()
            .flat_map(|chunk| chunk.failed_pages.iter().copied())
            .collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

/// Everything known about one page after running each tier on it once.
#[derive(Debug, Clone, Serialize)]
pub struct PageDiagnosisReport {
    /// Document the page belongs to.
    pub document: DocumentInfo,
    /// 1-based page number within the document.
    pub page_number: usize,
    /// Structural facts read from the page dictionary.
    pub characteristics: Option<PageCharacteristics>,
    /// Per-tier attempts and the classifier verdict.
    pub diagnosis: PageDiagnosis,
}

/// A document excluded from the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    /// Offending path.
    pub path: PathBuf,
    /// Human-readable cause.
    pub error: String,
}

impl From<&LoadError> for LoadFailure {
    fn from(error: &LoadError) -> Self {
        Self {
            path: error.path().to_path_buf(),
            error: error.to_string(),
        }
    }
}

/// Current UTC time formatted as RFC 3339.
pub(crate) fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
