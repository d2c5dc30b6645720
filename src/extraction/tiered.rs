use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::breaker::{ChunkId, CircuitBreaker};
use super::strategy::{DeadlineRun, ExtractionStrategy, run_with_deadline};
use super::types::{
    AttemptOutcome, ExtractionState, PageDiagnosis, PageExtraction, PageInput, PageStatus,
    SkipReason, SkippedStrategy, StrategyKind,
};
use crate::classifier::ContentClassifier;
use crate::config::DeadlineConfig;
use crate::metrics::ExtractionMetrics;

/// Leading characters of each tier's text kept in a diagnosis.
const DIAGNOSIS_SAMPLE_CHARS: usize = 200;

/// Drives one page through Primary → Secondary → OCR until a tier yields text.
///
/// Every attempt is bounded by its tier's deadline, so a page can never take longer than the
/// sum of the three deadlines. A tier is passed over when the circuit breaker has disabled
/// it for the current chunk, when its tooling is unavailable, or (Primary only) when the
/// classifier flagged the page in advance.
pub struct TieredExtractor {
    strategies: [Option<Arc<dyn ExtractionStrategy>>; 3],
    deadlines: DeadlineConfig,
    classifier: Arc<dyn ContentClassifier>,
    metrics: Arc<ExtractionMetrics>,
}

impl TieredExtractor {
    /// Create an extractor with no strategies installed.
    pub fn new(
        classifier: Arc<dyn ContentClassifier>,
        deadlines: DeadlineConfig,
        metrics: Arc<ExtractionMetrics>,
    ) -> Self {
        Self {
            strategies: [None, None, None],
            deadlines,
            classifier,
            metrics,
        }
    }

    /// Install `strategy` in the tier it reports, replacing any previous one.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        let slot = strategy.kind().index();
        self.strategies[slot] = Some(strategy);
        self
    }

    /// Deadline applied to one attempt of `kind`.
    pub fn deadline(&self, kind: StrategyKind) -> Duration {
        match kind {
            StrategyKind::Primary => self.deadlines.primary,
            StrategyKind::Secondary => self.deadlines.secondary,
            StrategyKind::Ocr => self.deadlines.ocr,
        }
    }

    /// Tiers that are installed and report their tooling as present.
    pub fn available_strategies(&self) -> Vec<StrategyKind> {
        StrategyKind::ALL
            .into_iter()
            .filter(|kind| self.available(*kind).is_some())
            .collect()
    }

    fn available(&self, kind: StrategyKind) -> Option<&Arc<dyn ExtractionStrategy>> {
        self.strategies[kind.index()]
            .as_ref()
            .filter(|strategy| strategy.is_available())
    }

    /// Extract one page, recording failures against `breaker` under `chunk`.
    ///
    /// Returns `PageStatus::Aborted` as soon as `cancel` fires; otherwise the page either
    /// commits the first non-empty text or ends `Exhausted`.
    pub async fn extract_page(
        &self,
        page: Arc<PageInput>,
        chunk: ChunkId,
        breaker: &mut CircuitBreaker,
        cancel: &CancellationToken,
    ) -> PageExtraction {
        let verdict = self.classifier.classify(&page.metadata);
        if verdict.is_problematic {
            tracing::debug!(
                page = page.global_index,
                document = %page.metadata.source_name,
                reason = ?verdict.reason,
                "Page flagged by classifier"
            );
        }

        let mut result = PageExtraction {
            page: page.global_index,
            text: String::new(),
            status: PageStatus::Exhausted,
            verdict,
            attempts: Vec::new(),
            skipped: Vec::new(),
        };

        let mut state = ExtractionState::NotStarted;
        loop {
            state = state.escalate();
            let Some(kind) = state.strategy() else {
                break;
            };
            if cancel.is_cancelled() {
                result.status = PageStatus::Aborted;
                return result;
            }

            if breaker.is_disabled(chunk, kind) {
                self.metrics.record_breaker_skip();
                result.skipped.push(SkippedStrategy {
                    strategy: kind,
                    reason: SkipReason::CircuitOpen,
                });
                continue;
            }
            if kind == StrategyKind::Primary && verdict.skips_primary() {
                self.metrics.record_classifier_skip();
                result.skipped.push(SkippedStrategy {
                    strategy: kind,
                    reason: SkipReason::Flagged(verdict.reason),
                });
                continue;
            }
            let Some(strategy) = self.available(kind) else {
                result.skipped.push(SkippedStrategy {
                    strategy: kind,
                    reason: SkipReason::Unavailable,
                });
                continue;
            };
            if !strategy.accepts(&page) {
                tracing::debug!(
                    page = page.global_index,
                    strategy = %kind,
                    size_hint = page.metadata.size_hint,
                    "Strategy declined page"
                );
                result.skipped.push(SkippedStrategy {
                    strategy: kind,
                    reason: SkipReason::Declined,
                });
                continue;
            }

            let DeadlineRun { attempt, text } =
                run_with_deadline(strategy.as_ref(), page.clone(), self.deadline(kind), cancel)
                    .await;

            // An attempt cut short by a run-level abort says nothing about the strategy.
            if cancel.is_cancelled() && attempt.outcome != AttemptOutcome::Success {
                result.status = PageStatus::Aborted;
                return result;
            }

            self.metrics.record_attempt(kind, attempt.outcome);
            tracing::debug!(
                page = page.global_index,
                strategy = %kind,
                outcome = ?attempt.outcome,
                elapsed_ms = attempt.elapsed.as_millis() as u64,
                "Extraction attempt finished"
            );
            if attempt.outcome.is_failure() {
                breaker.record_failure(chunk, kind);
            }
            result.attempts.push(attempt);

            if let Some(text) = text {
                result.text = text;
                result.status = PageStatus::Extracted(kind);
                return result;
            }
        }

        tracing::warn!(
            page = page.global_index,
            document = %page.metadata.source_name,
            attempts = result.attempts.len(),
            "Every extraction tier failed for page"
        );
        result
    }

    /// Run every available tier once on `page`, each under its own deadline.
    ///
    /// Successful tiers do not end the diagnosis. Metrics and breakers are left untouched.
    pub async fn diagnose_page(
        &self,
        page: Arc<PageInput>,
        cancel: &CancellationToken,
    ) -> PageDiagnosis {
        let mut diagnosis = PageDiagnosis {
            page: page.global_index,
            metadata: page.metadata.clone(),
            verdict: self.classifier.classify(&page.metadata),
            attempts: Vec::new(),
            skipped: Vec::new(),
            samples: BTreeMap::new(),
        };

        for kind in StrategyKind::ALL {
            if cancel.is_cancelled() {
                break;
            }
            let reason = match self.available(kind) {
                None => Some(SkipReason::Unavailable),
                Some(strategy) if !strategy.accepts(&page) => Some(SkipReason::Declined),
                Some(strategy) => {
                    let deadline = self.deadline(kind);
                    let DeadlineRun { attempt, text } =
                        run_with_deadline(strategy.as_ref(), page.clone(), deadline, cancel).await;
                    if let Some(text) = text {
                        diagnosis
                            .samples
                            .insert(kind, text.chars().take(DIAGNOSIS_SAMPLE_CHARS).collect());
                    }
                    diagnosis.attempts.push(attempt);
                    None
                }
            };
            if let Some(reason) = reason {
                diagnosis.skipped.push(SkippedStrategy {
                    strategy: kind,
                    reason,
                });
            }
        }
        diagnosis
    }
}
