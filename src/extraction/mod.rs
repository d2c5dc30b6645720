//! Tiered per-page text extraction.
//!
//! Each page moves through a fixed escalation order, Primary → Secondary → OCR, with every
//! attempt bounded by a deadline and a per-chunk circuit breaker that disables a strategy
//! after repeated failures. Strategies are pluggable through [`ExtractionStrategy`]; the
//! production set is assembled by [`standard_extractor`].

mod breaker;
mod ocr;
mod primary;
mod process;
mod secondary;
mod strategy;
mod tiered;
pub mod types;

use std::sync::Arc;

pub use breaker::{ChunkId, CircuitBreaker};
pub use ocr::TesseractStrategy;
pub use primary::{ContentStreamStrategy, DEFAULT_MAX_CONTENT_BYTES};
pub use secondary::{
    WORKER_SUBCOMMAND, WorkerProcessStrategy, extract_structured_text, run_worker,
};
pub use strategy::ExtractionStrategy;
pub use tiered::TieredExtractor;
pub use types::{
    AttemptOutcome, ExtractionAttempt, ExtractionState, PageDiagnosis, PageExtraction, PageInput,
    PageStatus, SkipReason, SkippedStrategy, StrategyError, StrategyKind,
};

use crate::classifier::ContentClassifier;
use crate::config::Config;
use crate::metrics::ExtractionMetrics;

/// Build an extractor with the in-process content walker, the worker-process parser, and
/// OCR (probed for availability).
pub async fn standard_extractor(
    config: &Config,
    classifier: Arc<dyn ContentClassifier>,
    metrics: Arc<ExtractionMetrics>,
) -> Result<TieredExtractor, StrategyError> {
    let worker = WorkerProcessStrategy::current_exe()?;
    let ocr = TesseractStrategy::probe(&config.ocr).await;
    let extractor = TieredExtractor::new(classifier, config.deadlines, metrics)
        .with_strategy(Arc::new(ContentStreamStrategy::with_max_content_bytes(
            config.primary_max_content_bytes,
        )))
        .with_strategy(Arc::new(worker))
        .with_strategy(Arc::new(ocr));
    tracing::info!(
        strategies = ?extractor.available_strategies(),
        "Extraction tiers ready"
    );
    Ok(extractor)
}
