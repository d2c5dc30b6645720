//! Strategy identifiers, attempt records, and per-page results.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::classifier::{ProblematicReason, ProblematicityVerdict};
use crate::source::PageMetadata;

/// One text-extraction technique, in increasing cost/robustness order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Fast in-process content-stream walk.
    Primary,
    /// Robust structural parse in an isolated worker process.
    Secondary,
    /// Rasterisation followed by optical character recognition.
    Ocr,
}

impl StrategyKind {
    /// Every strategy in tier order.
    pub const ALL: [StrategyKind; 3] = [Self::Primary, Self::Secondary, Self::Ocr];

    /// Stable array slot for per-strategy tables.
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::Ocr => 2,
        }
    }

    /// Lower-case name used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Ocr => "ocr",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// States of the per-page extraction machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    /// No strategy considered yet.
    NotStarted,
    /// Considering the Primary strategy.
    TryingPrimary,
    /// Considering the Secondary strategy.
    TryingSecondary,
    /// Considering the OCR strategy.
    TryingOcr,
    /// Text committed, or every tier exhausted.
    Done,
}

impl ExtractionState {
    /// The state reached by escalating from this one.
    pub fn escalate(self) -> Self {
        match self {
            Self::NotStarted => Self::TryingPrimary,
            Self::TryingPrimary => Self::TryingSecondary,
            Self::TryingSecondary => Self::TryingOcr,
            Self::TryingOcr | Self::Done => Self::Done,
        }
    }

    /// Strategy considered in this state, if any.
    pub fn strategy(self) -> Option<StrategyKind> {
        match self {
            Self::TryingPrimary => Some(StrategyKind::Primary),
            Self::TryingSecondary => Some(StrategyKind::Secondary),
            Self::TryingOcr => Some(StrategyKind::Ocr),
            Self::NotStarted | Self::Done => None,
        }
    }
}

/// How a single strategy execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Non-empty text.
    Success,
    /// Ran to completion without usable text. Not a breaker failure.
    EmptyResult,
    /// Cancelled at its deadline.
    Timeout,
    /// Failed outright.
    Error,
}

impl AttemptOutcome {
    /// Whether this outcome counts towards the circuit breaker.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Timeout | Self::Error)
    }
}

/// Record of one strategy execution on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionAttempt {
    /// Strategy that ran.
    pub strategy: StrategyKind,
    /// How it ended.
    pub outcome: AttemptOutcome,
    /// Wall-clock time spent, including cancellation.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Characters of text returned (0 unless `Success`).
    pub text_length: usize,
    /// Error diagnostic, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Why a strategy was not attempted on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum SkipReason {
    /// The classifier flagged the page before extraction.
    Flagged(ProblematicReason),
    /// The circuit breaker disabled the strategy for the current chunk.
    CircuitOpen,
    /// The strategy is not installed or its tooling is missing.
    Unavailable,
    /// The strategy declined the page, e.g. a content stream too large to walk in-process.
    Declined,
}

/// A strategy that was passed over, with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedStrategy {
    /// Strategy passed over.
    pub strategy: StrategyKind,
    /// Why it was passed over.
    pub reason: SkipReason,
}

/// Final state of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// A strategy returned non-empty text.
    Extracted(StrategyKind),
    /// Every tier was attempted or skipped without producing text.
    Exhausted,
    /// A run-level abort stopped extraction of this page.
    Aborted,
}

/// Result of driving the tiered state machine over one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtraction {
    /// Global page index.
    pub page: usize,
    /// Committed text (empty unless extracted).
    pub text: String,
    /// Terminal status.
    pub status: PageStatus,
    /// Classifier verdict consulted before extraction.
    pub verdict: ProblematicityVerdict,
    /// Strategies that ran, in order.
    pub attempts: Vec<ExtractionAttempt>,
    /// Strategies that were passed over, in order.
    pub skipped: Vec<SkippedStrategy>,
}

impl PageExtraction {
    /// Strategy that produced the committed text, if any.
    pub fn strategy_used(&self) -> Option<StrategyKind> {
        match self.status {
            PageStatus::Extracted(kind) => Some(kind),
            PageStatus::Exhausted | PageStatus::Aborted => None,
        }
    }

    /// Whether `strategy` was actually executed on this page.
    pub fn attempted(&self, strategy: StrategyKind) -> bool {
        self.attempts
            .iter()
            .any(|attempt| attempt.strategy == strategy)
    }
}

/// Every available tier run once on a single page, for diagnostics.
///
/// Unlike [`PageExtraction`], a diagnosis does not stop at the first success and ignores the
/// classifier and the breaker, so each tier's behaviour on the page is visible.
#[derive(Debug, Clone, Serialize)]
pub struct PageDiagnosis {
    /// Global page index.
    pub page: usize,
    /// Metadata the classifier saw.
    pub metadata: PageMetadata,
    /// What the classifier would have decided during a run.
    pub verdict: ProblematicityVerdict,
    /// One attempt per tier that ran.
    pub attempts: Vec<ExtractionAttempt>,
    /// Tiers that could not run.
    pub skipped: Vec<SkippedStrategy>,
    /// Leading characters of each successful tier's text.
    pub samples: BTreeMap<StrategyKind, String>,
}

/// One page handed to a strategy: its identity, metadata, and standalone PDF bytes.
#[derive(Debug, Clone)]
pub struct PageInput {
    /// Global page index.
    pub global_index: usize,
    /// Static metadata used for classification and logging.
    pub metadata: PageMetadata,
    /// Single-page PDF produced by the page source.
    pub bytes: Arc<[u8]>,
}

/// Errors a strategy may return. Internal to extraction; never surfaced past the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The strategy ran and failed.
    #[error("extraction failed: {0}")]
    Failed(String),
    /// The strategy observed its cancellation token and stopped.
    #[error("extraction cancelled")]
    Cancelled,
    /// Required tooling is missing or could not be started.
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
    /// The unit of work panicked.
    #[error("extraction worker panicked: {0}")]
    Panicked(String),
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
