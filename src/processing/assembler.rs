use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::types::{ChunkPlan, ChunkResult, PageFailure};
use crate::extraction::{ChunkId, CircuitBreaker, PageInput, PageStatus, TieredExtractor};
use crate::metrics::ExtractionMetrics;
use crate::source::{PageAccessError, PageRangeError, PageSource};

/// Inserted between consecutive page texts in a chunk.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Runs the tiered extractor over every page of a plan and stitches the results together.
///
/// Pages are processed one at a time in ascending order. The assembler owns the circuit
/// breaker and resets it at the start of every chunk.
pub struct ChunkAssembler {
    source: Arc<PageSource>,
    extractor: Arc<TieredExtractor>,
    metrics: Arc<ExtractionMetrics>,
    breaker: CircuitBreaker,
}

impl ChunkAssembler {
    /// Create an assembler over `source`.
    pub fn new(
        source: Arc<PageSource>,
        extractor: Arc<TieredExtractor>,
        metrics: Arc<ExtractionMetrics>,
        breaker_threshold: u32,
    ) -> Self {
        Self {
            source,
            extractor,
            metrics,
            breaker: CircuitBreaker::new(breaker_threshold),
        }
    }

    /// Assemble one chunk.
    ///
    /// Page-local failures are recorded in the result. The only error is a plan that addresses
    /// a page the source does not have. A fired `cancel` stops assembly at the next page
    /// boundary; the partial result is returned with the remaining pages marked aborted.
    pub async fn assemble(
        &mut self,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<ChunkResult, PageRangeError> {
        let chunk = ChunkId(plan.index);
        self.breaker.begin_chunk(chunk);
        tracing::info!(
            chunk = plan.index,
            pages = %plan.page_label(),
            "Assembling chunk"
        );

        let mut texts = Vec::new();
        let mut page_failures = BTreeMap::new();
        let mut strategy_used = BTreeMap::new();
        let mut interrupted = false;

        for page in plan.pages() {
            if cancel.is_cancelled() {
                interrupted = true;
            }
            if interrupted {
                page_failures.insert(page, PageFailure::Aborted);
                continue;
            }

            let metadata = self.source.page_metadata(page)?;
            let bytes = match self.isolate(page).await {
                Ok(bytes) => bytes,
                Err(PageAccessError::Range(error)) => return Err(error),
                Err(PageAccessError::Isolation { reason, .. }) => {
                    tracing::warn!(page, reason = %reason, "Page could not be isolated");
                    self.metrics.record_page(false);
                    page_failures.insert(page, PageFailure::Unreadable { reason });
                    continue;
                }
            };

            let input = Arc::new(PageInput {
                global_index: page,
                metadata,
                bytes: Arc::from(bytes),
            });
            let extraction = self
                .extractor
                .extract_page(input, chunk, &mut self.breaker, cancel)
                .await;

            match extraction.status {
                PageStatus::Extracted(strategy) => {
                    self.metrics.record_page(true);
                    strategy_used.insert(page, strategy);
                    texts.push(extraction.text);
                }
                PageStatus::Exhausted => {
                    self.metrics.record_page(false);
                    page_failures.insert(
                        page,
                        PageFailure::Exhausted {
                            attempts: extraction.attempts,
                            skipped: extraction.skipped,
                        },
                    );
                }
                PageStatus::Aborted => {
                    interrupted = true;
                    page_failures.insert(page, PageFailure::Aborted);
                }
            }
        }

        self.metrics.record_chunk();
        let result = ChunkResult {
            plan,
            text: texts.join(PAGE_SEPARATOR),
            page_failures,
            strategy_used,
            interrupted,
        };
        if interrupted {
            tracing::warn!(chunk = plan.index, "Chunk interrupted by run abort");
        } else if result.is_partial() {
            tracing::warn!(
                chunk = plan.index,
                failed_pages = ?result.failed_pages(),
                open_breakers = ?self.breaker.open_strategies(),
                "Chunk assembled with unreadable pages"
            );
        } else {
            tracing::info!(
                chunk = plan.index,
                chars = result.text.len(),
                "Chunk assembled"
            );
        }
        Ok(result)
    }

    /// Re-encode a page as a standalone document on the blocking pool.
    async fn isolate(&self, page: usize) -> Result<Vec<u8>, PageAccessError> {
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || source.page_bytes(page))
            .await
            .unwrap_or_else(|error| {
                Err(PageAccessError::Isolation {
                    index: page,
                    reason: error.to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::HeuristicClassifier;
    use crate::config::{ClassifierConfig, DeadlineConfig};
    use crate::extraction::{ExtractionStrategy, StrategyError, StrategyKind};
    use crate::source::document::tests::make_pdf;
    use crate::source::{Document, DocumentId};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::time::Duration;

    /// Reads the isolated page back and returns its text, or nothing for pages marked "blank".
    struct Echo;

    #[async_trait]
    impl ExtractionStrategy for Echo {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Primary
        }

        async fn extract(
            &self,
            page: Arc<PageInput>,
            _cancel: CancellationToken,
        ) -> Result<String, StrategyError> {
            let pdf = lopdf::Document::load_mem(&page.bytes)
                .map_err(|error| StrategyError::Failed(error.to_string()))?;
            let page_id = *pdf.get_pages().values().next().unwrap();
            let content = pdf.get_page_content(page_id).unwrap();
            let content = String::from_utf8_lossy(&content);
            let start = content.find('(').unwrap() + 1;
            let end = content.find(')').unwrap();
            let text = &content[start..end];
            Ok(if text == "blank" { String::new() } else { text.to_string() })
        }
    }

    fn assembler(pages: &[&str]) -> (ChunkAssembler, Arc<ExtractionMetrics>) {
        let document =
            Document::from_bytes(DocumentId(0), Path::new("doc.pdf"), &make_pdf(pages)).unwrap();
        let source = Arc::new(PageSource::from_documents(vec![document]));
        let metrics = Arc::new(ExtractionMetrics::new());
        let classifier = HeuristicClassifier::new(&ClassifierConfig::default()).unwrap();
        let extractor = TieredExtractor::new(
            Arc::new(classifier),
            DeadlineConfig {
                primary: Duration::from_secs(5),
                secondary: Duration::from_secs(5),
                ocr: Duration::from_secs(5),
            },
            metrics.clone(),
        )
        .with_strategy(Arc::new(Echo));
        (
            ChunkAssembler::new(source, Arc::new(extractor), metrics.clone(), 3),
            metrics,
        )
    }

    fn plan(index: usize, start_page: usize, end_page: usize) -> ChunkPlan {
        ChunkPlan {
            index,
            start_page,
            end_page,
        }
    }

    #[tokio::test]
    async fn concatenates_non_empty_pages_in_order() {
        let (mut assembler, metrics) = assembler(&["one", "blank", "three", "four"]);
        let result = assembler
            .assemble(plan(0, 0, 4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.text, "one\n\nthree\n\nfour");
        assert_eq!(result.failed_pages().into_iter().collect::<Vec<_>>(), vec![1]);
        assert!(matches!(
            result.page_failures[&1],
            PageFailure::Exhausted { .. }
        ));
        assert_eq!(result.strategy_used.len(), 3);
        assert!(!result.interrupted);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pages_extracted, 3);
        assert_eq!(snapshot.pages_failed, 1);
        assert_eq!(snapshot.chunks_assembled, 1);
    }

    #[tokio::test]
    async fn fully_blank_chunk_still_returns_a_result() {
        let (mut assembler, _) = assembler(&["blank", "blank", "blank"]);
        let result = assembler
            .assemble(plan(2, 0, 3), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.text.is_empty());
        assert!(!result.has_content());
        assert_eq!(result.failed_pages(), (0..3).collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn plan_beyond_the_source_is_a_range_error() {
        let (mut assembler, _) = assembler(&["one", "two"]);
        let error = assembler
            .assemble(plan(0, 1, 5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(error, PageRangeError { index: 2, total: 2 });
    }

    #[tokio::test]
    async fn abort_marks_remaining_pages() {
        let (mut assembler, _) = assembler(&["one", "two", "three"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = assembler.assemble(plan(0, 0, 3), &cancel).await.unwrap();
        assert!(result.interrupted);
        assert!(result.text.is_empty());
        assert!(
            result
                .page_failures
                .values()
                .all(|failure| *failure == PageFailure::Aborted)
        );
    }
}
