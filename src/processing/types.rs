//! Core data types and error definitions for the segmentation pipeline.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use thiserror::Error;

use crate::config::{ConfigError, ConfigurationError};
use crate::extraction::{ExtractionAttempt, SkippedStrategy, StrategyError, StrategyKind};
use crate::source::{DiscoveryError, LoadError, PageAccessError, PageRangeError};

/// Errors that abort a run. Page- and document-local failures never appear here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Chunking, deadline, or breaker parameters are invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    /// Classifier patterns or other settings failed to load.
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    /// A planned page index fell outside the page source; indicates a planning bug.
    #[error("Chunk plan addressed a missing page: {0}")]
    PageRange(#[from] PageRangeError),
    /// Input documents could not be located.
    #[error("Failed to discover documents: {0}")]
    Discovery(#[from] DiscoveryError),
    /// Not a single input document could be loaded.
    #[error("None of the {attempted} input documents could be loaded")]
    NoReadableDocuments {
        /// Number of paths supplied.
        attempted: usize,
    },
    /// The extraction tiers could not be assembled.
    #[error("Failed to prepare extraction strategies: {0}")]
    Strategy(#[from] StrategyError),
    /// The single document named for diagnosis could not be loaded.
    #[error("Failed to load document: {0}")]
    Load(#[from] LoadError),
    /// A page could not be prepared for diagnosis.
    #[error("Failed to prepare page: {0}")]
    PageAccess(#[from] PageAccessError),
    /// A blocking task panicked or was cancelled by the runtime.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A half-open range of global page indices processed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkPlan {
    /// Position of this plan in the planned sequence.
    pub index: usize,
    /// First global page index (inclusive).
    pub start_page: usize,
    /// One past the last global page index (exclusive).
    pub end_page: usize,
}

impl ChunkPlan {
    /// Page indices covered by the plan.
    pub fn pages(&self) -> Range<usize> {
        self.start_page..self.end_page
    }

    /// Number of pages covered.
    pub fn len(&self) -> usize {
        self.end_page - self.start_page
    }

    /// Always false for a plan produced by the planner.
    pub fn is_empty(&self) -> bool {
        self.start_page >= self.end_page
    }

    /// One-based inclusive page label, e.g. `91-190`.
    pub fn page_label(&self) -> String {
        format!("{}-{}", self.start_page + 1, self.end_page)
    }
}

/// Why a page contributed no text to its chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PageFailure {
    /// Every tier was attempted or skipped without producing text.
    Exhausted {
        /// Strategies that ran, in order.
        attempts: Vec<ExtractionAttempt>,
        /// Strategies that were passed over, in order.
        skipped: Vec<SkippedStrategy>,
    },
    /// A run-level abort stopped the chunk before this page finished.
    Aborted,
    /// The page could not be re-encoded as a standalone document.
    Unreadable {
        /// Diagnostic from the page source.
        reason: String,
    },
}

impl PageFailure {
    /// Short label used in chunk headers and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exhausted { .. } => "no strategy produced text",
            Self::Aborted => "run aborted",
            Self::Unreadable { .. } => "page could not be isolated",
        }
    }
}

/// Assembled text of one chunk plus explicit accounting of every page that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkResult {
    /// The range this result covers.
    pub plan: ChunkPlan,
    /// Page-order concatenation of the non-empty page texts.
    pub text: String,
    /// Pages without usable text, keyed by global index.
    pub page_failures: BTreeMap<usize, PageFailure>,
    /// Strategy that produced each successful page.
    pub strategy_used: BTreeMap<usize, StrategyKind>,
    /// True when a run-level abort stopped assembly part-way.
    pub interrupted: bool,
}

impl ChunkResult {
    /// Global indices of the pages that yielded no text.
    pub fn failed_pages(&self) -> BTreeSet<usize> {
        self.page_failures.keys().copied().collect()
    }

    /// Whether any page yielded text.
    pub fn has_content(&self) -> bool {
        !self.text.is_empty()
    }

    /// Whether at least one page is missing from the text.
    pub fn is_partial(&self) -> bool {
        !self.page_failures.is_empty()
    }

    /// Condensed view for reports.
    pub fn summary(&self) -> ChunkSummary {
        let mut strategy_counts = BTreeMap::new();
        for strategy in self.strategy_used.values() {
            *strategy_counts.entry(*strategy).or_insert(0) += 1;
        }
        ChunkSummary {
            index: self.plan.index,
            start_page: self.plan.start_page,
            end_page: self.plan.end_page,
            text_chars: self.text.chars().count(),
            failed_pages: self.failed_pages().into_iter().collect(),
            strategy_counts,
            interrupted: self.interrupted,
            sink_error: None,
        }
    }
}

/// Per-chunk line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    /// Position of the chunk in the plan.
    pub index: usize,
    /// First global page index (inclusive).
    pub start_page: usize,
    /// One past the last global page index.
    pub end_page: usize,
    /// Characters of assembled text.
    pub text_chars: usize,
    /// Pages without usable text.
    pub failed_pages: Vec<usize>,
    /// Pages committed per strategy.
    pub strategy_counts: BTreeMap<StrategyKind, usize>,
    /// Whether a run-level abort cut this chunk short.
    pub interrupted: bool,
    /// Hand-off failure for this chunk, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_error: Option<String>,
}
