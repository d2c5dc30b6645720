//! Pipeline service coordinating loading, planning, assembly, and hand-off.

use async_stream::stream;
use futures_core::Stream;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::assembler::ChunkAssembler;
use super::planner::ChunkPlanner;
use super::report::{LoadFailure, PageDiagnosisReport, RunReport, timestamp};
use super::types::{ChunkPlan, ChunkResult, PipelineError};
use crate::classifier::{ContentClassifier, HeuristicClassifier};
use crate::config::Config;
use crate::extraction::{PageInput, TieredExtractor, standard_extractor};
use crate::handoff::ChunkSink;
use crate::metrics::{ExtractionMetrics, MetricsSnapshot};
use crate::source::{LoadError, PageSource};

/// Documents loaded for one run, with the ones that were skipped.
pub struct LoadedSource {
    /// Page source over every readable document.
    pub source: Arc<PageSource>,
    /// Documents that could not be used.
    pub errors: Vec<LoadError>,
}

/// Runs the segmentation and extraction pipeline end to end.
///
/// Construct the service once per process and reuse it across runs; extraction counters
/// accumulate over its lifetime.
pub struct PipelineService {
    config: Config,
    planner: ChunkPlanner,
    extractor: Arc<TieredExtractor>,
    metrics: Arc<ExtractionMetrics>,
}

impl PipelineService {
    /// Build the service with the production strategies.
    pub async fn new(config: Config) -> Result<Self, PipelineError> {
        let metrics = Arc::new(ExtractionMetrics::new());
        let classifier = build_classifier(&config)?;
        let extractor = standard_extractor(&config, classifier, metrics.clone()).await?;
        Self::with_extractor(config, extractor, metrics)
    }

    /// Build the service around an already-configured extractor.
    ///
    /// `metrics` must be the accumulator the extractor records into.
    pub fn with_extractor(
        config: Config,
        extractor: TieredExtractor,
        metrics: Arc<ExtractionMetrics>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let planner = ChunkPlanner::new(config.chunking)?;
        Ok(Self {
            config,
            planner,
            extractor: Arc::new(extractor),
            metrics,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current extraction counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Load `paths` into a page source, failing only if none of them is readable.
    pub async fn load<P>(&self, paths: &[P]) -> Result<LoadedSource, PipelineError>
    where
        P: AsRef<Path>,
    {
        let owned: Vec<_> = paths.iter().map(|path| path.as_ref().to_path_buf()).collect();
        let attempted = owned.len();
        let (source, errors) = tokio::task::spawn_blocking(move || PageSource::load(&owned)).await?;
        if source.total_pages() == 0 {
            return Err(PipelineError::NoReadableDocuments { attempted });
        }
        tracing::info!(
            documents = attempted - errors.len(),
            skipped = errors.len(),
            total_pages = source.total_pages(),
            "Page source ready"
        );
        Ok(LoadedSource {
            source: Arc::new(source),
            errors,
        })
    }

    /// Run every available tier once on page `page_index` (0-based) of the PDF at `path`.
    ///
    /// Nothing is recorded in the service's metrics.
    pub async fn diagnose(
        &self,
        path: &Path,
        page_index: usize,
        cancel: &CancellationToken,
    ) -> Result<PageDiagnosisReport, PipelineError> {
        let owned = path.to_path_buf();
        let (source, mut errors) =
            tokio::task::spawn_blocking(move || PageSource::load(&[owned])).await?;
        if let Some(error) = errors.pop() {
            return Err(PipelineError::Load(error));
        }
        let source = Arc::new(source);
        let document = source
            .documents()
            .into_iter()
            .next()
            .ok_or(PipelineError::NoReadableDocuments { attempted: 1 })?;

        let metadata = source.page_metadata(page_index)?;
        let characteristics = source.page_characteristics(page_index)?;
        let isolated = source.clone();
        let bytes = tokio::task::spawn_blocking(move || isolated.page_bytes(page_index)).await??;

        let page = Arc::new(PageInput {
            global_index: page_index,
            metadata,
            bytes: Arc::from(bytes),
        });
        let diagnosis = self.extractor.diagnose_page(page, cancel).await;
        tracing::info!(
            document = %document.name,
            page = page_index + 1,
            attempts = diagnosis.attempts.len(),
            "Page diagnosed"
        );
        Ok(PageDiagnosisReport {
            document,
            page_number: page_index + 1,
            characteristics,
            diagnosis,
        })
    }

    /// Chunk plans for `source`.
    pub fn plan(&self, source: &PageSource) -> Vec<ChunkPlan> {
        self.planner.plan(source.total_pages())
    }

    /// Assemble every planned chunk of `source` as an ordered stream.
    ///
    /// The stream ends after the chunk during which `cancel` fired, or after the first fatal
    /// error.
    pub fn chunks(
        &self,
        source: Arc<PageSource>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<ChunkResult, PipelineError>> + Send + 'static {
        let plans = self.plan(&source);
        let mut assembler = ChunkAssembler::new(
            source,
            self.extractor.clone(),
            self.metrics.clone(),
            self.config.circuit_breaker_threshold,
        );

        stream! {
            for plan in plans {
                if cancel.is_cancelled() {
                    tracing::warn!(chunk = plan.index, "Run aborted before chunk started");
                    break;
                }
                match assembler.assemble(plan, &cancel).await {
                    Ok(result) => {
                        let interrupted = result.interrupted;
                        yield Ok(result);
                        if interrupted {
                            break;
                        }
                    }
                    Err(error) => {
                        yield Err(PipelineError::from(error));
                        break;
                    }
                }
            }
        }
    }

    /// Load, plan, assemble, and hand every chunk to `sink`, then report.
    pub async fn run<P>(
        &self,
        paths: &[P],
        sink: &dyn ChunkSink,
        cancel: CancellationToken,
    ) -> Result<RunReport, PipelineError>
    where
        P: AsRef<Path>,
    {
        let run_id = Uuid::new_v4();
        let started_at = timestamp();
        tracing::info!(%run_id, inputs = paths.len(), "Starting run");

        let LoadedSource { source, errors } = self.load(paths).await?;
        let plans = self.plan(&source);
        let total_chunks = plans.len();
        tracing::info!(
            %run_id,
            chunks = total_chunks,
            max_pages = self.config.chunking.max_pages_per_chunk,
            overlap = self.config.chunking.overlap_pages,
            "Planned chunks"
        );

        let mut summaries = Vec::with_capacity(total_chunks);
        let mut interrupted = false;
        {
            let chunks = self.chunks(source.clone(), cancel.clone());
            futures_util::pin_mut!(chunks);
            while let Some(chunk) = futures_util::StreamExt::next(&mut chunks).await {
                let chunk = chunk?;
                interrupted |= chunk.interrupted;
                let mut summary = chunk.summary();
                if let Err(error) = sink.accept(&chunk, total_chunks).await {
                    tracing::error!(
                        chunk = chunk.plan.index,
                        error = %error,
                        "Chunk hand-off failed"
                    );
                    summary.sink_error = Some(error.to_string());
                }
                summaries.push(summary);
            }
        }
        interrupted |= cancel.is_cancelled();

        let report = RunReport {
            run_id,
            started_at,
            finished_at: timestamp(),
            chunking: self.config.chunking,
            total_pages: source.total_pages(),
            documents: source.documents(),
            load_errors: errors.iter().map(LoadFailure::from).collect(),
            chunks_not_started: total_chunks - summaries.len(),
            chunks: summaries,
            interrupted,
            metrics: self.metrics.snapshot(),
        };
        if let Err(error) = sink.finish(&report).await {
            tracing::error!(error = %error, "Failed to hand off run report");
        }

        tracing::info!(
            %run_id,
            chunks = report.chunks.len(),
            failed_pages = report.failed_pages().len(),
            interrupted,
            "Run finished"
        );
        Ok(report)
    }
}

/// Compile the heuristic classifier from configuration.
pub fn build_classifier(config: &Config) -> Result<Arc<dyn ContentClassifier>, PipelineError> {
    Ok(Arc::new(HeuristicClassifier::new(&config.classifier)?))
}
