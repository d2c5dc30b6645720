use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::extraction::{AttemptOutcome, StrategyKind};

/// Thread-safe counters describing extraction activity.
#[derive(Default)]
pub struct ExtractionMetrics {
    strategies: [StrategyCounters; 3],
    skipped_by_breaker: AtomicU64,
    skipped_by_classifier: AtomicU64,
    pages_extracted: AtomicU64,
    pages_failed: AtomicU64,
    chunks_assembled: AtomicU64,
}

#[derive(Default)]
struct StrategyCounters {
    success: AtomicU64,
    empty: AtomicU64,
    timeout: AtomicU64,
    error: AtomicU64,
}

impl ExtractionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one strategy attempt.
    pub fn record_attempt(&self, strategy: StrategyKind, outcome: AttemptOutcome) {
        let counters = &self.strategies[strategy.index()];
        let counter = match outcome {
            AttemptOutcome::Success => &counters.success,
            AttemptOutcome::EmptyResult => &counters.empty,
            AttemptOutcome::Timeout => &counters.timeout,
            AttemptOutcome::Error => &counters.error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a strategy skipped because its breaker was open.
    pub fn record_breaker_skip(&self) {
        self.skipped_by_breaker.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Primary attempt skipped because the classifier flagged the page.
    pub fn record_classifier_skip(&self) {
        self.skipped_by_classifier.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the final state of one page.
    pub fn record_page(&self, succeeded: bool) {
        if succeeded {
            self.pages_extracted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pages_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished chunk.
    pub fn record_chunk(&self) {
        self.chunks_assembled.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let strategies = StrategyKind::ALL
            .into_iter()
            .map(|kind| {
                let counters = &self.strategies[kind.index()];
                (
                    kind,
                    StrategySnapshot {
                        success: counters.success.load(Ordering::Relaxed),
                        empty: counters.empty.load(Ordering::Relaxed),
                        timeout: counters.timeout.load(Ordering::Relaxed),
                        error: counters.error.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            strategies,
            skipped_by_breaker: self.skipped_by_breaker.load(Ordering::Relaxed),
            skipped_by_classifier: self.skipped_by_classifier.load(Ordering::Relaxed),
            pages_extracted: self.pages_extracted.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            chunks_assembled: self.chunks_assembled.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of extraction counters used for reporting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Attempt outcomes keyed by strategy.
    pub strategies: BTreeMap<StrategyKind, StrategySnapshot>,
    /// Attempts never made because the circuit breaker had disabled the strategy.
    pub skipped_by_breaker: u64,
    /// Primary attempts never made because the page was flagged in advance.
    pub skipped_by_classifier: u64,
    /// Pages that produced non-empty text.
    pub pages_extracted: u64,
    /// Pages that exhausted every tier.
    pub pages_failed: u64,
    /// Chunks assembled, interrupted ones included, whether or not the sink accepted them.
    pub chunks_assembled: u64,
}

/// Outcome counts for a single strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StrategySnapshot {
    /// Attempts that returned non-empty text.
    pub success: u64,
    /// Attempts that returned nothing usable.
    pub empty: u64,
    /// Attempts cancelled at their deadline.
    pub timeout: u64,
    /// Attempts that failed outright.
    pub error: u64,
}
