use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lopdf::{Object, Stream, dictionary};
use pdf_chunker::classifier::HeuristicClassifier;
use pdf_chunker::config::{ChunkingConfig, Config};
use pdf_chunker::extraction::{
    ContentStreamStrategy, ExtractionStrategy, PageInput, StrategyError, StrategyKind,
    TieredExtractor,
};
use pdf_chunker::handoff::{ChunkSink, DirectorySink, REPORT_FILE_NAME, SinkError};
use pdf_chunker::metrics::ExtractionMetrics;
use pdf_chunker::processing::{ChunkResult, PageFailure, PipelineService};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn set_env(key: &str, value: &str) {
    // SAFETY: only this test touches these variables, and it restores nothing other tests read.
    unsafe { std::env::set_var(key, value) }
}

/// Build a PDF with one `Tj` line per page; an empty string yields a page with no text.
fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let kids: Vec<Object> = pages
        .iter()
        .map(|text| {
            let content = format!("BT /F1 11 Tf 50 700 Td ({text}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            }))
        })
        .collect();
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, make_pdf(pages)).unwrap();
    path
}

/// Stand-in for a later tier that returns fixed text and counts calls.
struct Fixed {
    kind: StrategyKind,
    text: &'static str,
    calls: AtomicUsize,
}

impl Fixed {
    fn new(kind: StrategyKind, text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            text,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ExtractionStrategy for Fixed {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn extract(
        &self,
        _page: Arc<PageInput>,
        _cancel: CancellationToken,
    ) -> Result<String, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.to_string())
    }
}

fn config(max_pages: usize, overlap: usize) -> Config {
    let mut config = Config::default();
    config.chunking = ChunkingConfig {
        max_pages_per_chunk: max_pages,
        overlap_pages: overlap,
    };
    config.deadlines.primary = Duration::from_secs(10);
    config
}

fn service(config: Config, strategies: Vec<Arc<dyn ExtractionStrategy>>) -> PipelineService {
    let metrics = Arc::new(ExtractionMetrics::new());
    let classifier = HeuristicClassifier::new(&config.classifier).unwrap();
    let extractor = strategies.into_iter().fold(
        TieredExtractor::new(Arc::new(classifier), config.deadlines, metrics.clone()),
        TieredExtractor::with_strategy,
    );
    PipelineService::with_extractor(config, extractor, metrics).unwrap()
}

#[derive(Default)]
struct CollectingSink {
    chunks: Mutex<Vec<ChunkResult>>,
}

#[async_trait]
impl ChunkSink for CollectingSink {
    async fn accept(&self, chunk: &ChunkResult, _total_chunks: usize) -> Result<(), SinkError> {
        self.chunks.lock().await.push(chunk.clone());
        if chunk.plan.index == 0 {
            return Err(SinkError::Rejected("summariser unavailable".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn run_merges_documents_and_writes_chunk_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let first = write_pdf(input.path(), "a.pdf", &["alpha", "bravo", ""]);
    let second = write_pdf(input.path(), "b.pdf", &["delta", "echo"]);
    let broken = input.path().join("broken.pdf");
    std::fs::write(&broken, b"%PDF-1.4 truncated").unwrap();

    let service = service(
        config(3, 1),
        vec![Arc::new(ContentStreamStrategy::new())],
    );
    let sink = DirectorySink::new(output.path());
    let report = service
        .run(&[first, broken.clone(), second], &sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_pages, 5);
    assert_eq!(report.documents.len(), 2);
    assert_eq!(report.documents[1].first_global_page, 3);
    assert_eq!(report.load_errors.len(), 1);
    assert_eq!(report.load_errors[0].path, broken);
    assert_eq!(report.chunks.len(), 2);
    assert_eq!(report.failed_pages(), vec![2]);
    assert!(!report.interrupted);

    let first_chunk =
        std::fs::read_to_string(output.path().join("chunk_1_pages_1-3.txt")).unwrap();
    assert!(first_chunk.contains("alpha\n\nbravo"));
    assert!(first_chunk.contains("Unreadable pages: 3"));
    let second_chunk =
        std::fs::read_to_string(output.path().join("chunk_2_pages_3-5.txt")).unwrap();
    assert!(second_chunk.contains("delta\n\necho"));

    let json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output.path().join(REPORT_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(json["total_pages"], 5);
    assert_eq!(json["chunks"][0]["failed_pages"], serde_json::json!([2]));
    assert_eq!(json["metrics"]["pages_failed"], 2, "page 2 fails in both chunks");
}

#[tokio::test]
async fn known_bad_document_never_reaches_primary() {
    let input = tempfile::tempdir().unwrap();
    let path = write_pdf(input.path(), "Scan_0042.pdf", &["one", "two"]);
    let mut config = config(10, 2);
    config.classifier.known_bad_patterns = vec!["scan_".into()];

    let primary = Fixed::new(StrategyKind::Primary, "primary text");
    let secondary = Fixed::new(StrategyKind::Secondary, "secondary text");
    let service = service(config, vec![primary.clone(), secondary.clone()]);

    let sink = CollectingSink::default();
    let report = service
        .run(&[path], &sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 2);
    let chunks = sink.chunks.lock().await;
    assert_eq!(chunks[0].text, "secondary text\n\nsecondary text");
    assert!(
        chunks[0]
            .strategy_used
            .values()
            .all(|strategy| *strategy == StrategyKind::Secondary)
    );
    assert_eq!(
        report.chunks[0].sink_error.as_deref(),
        Some("chunk rejected: summariser unavailable")
    );
    assert_eq!(report.metrics.skipped_by_classifier, 2);
}

/// Returns text, and fires the run token once it has seen `trigger_page`.
struct AbortAfter {
    trigger_page: usize,
    run: CancellationToken,
}

#[async_trait]
impl ExtractionStrategy for AbortAfter {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Primary
    }

    async fn extract(
        &self,
        page: Arc<PageInput>,
        _cancel: CancellationToken,
    ) -> Result<String, StrategyError> {
        if page.global_index == self.trigger_page {
            self.run.cancel();
        }
        Ok(format!("page {}", page.global_index))
    }
}

#[tokio::test]
async fn abort_stops_at_the_next_page_boundary() {
    let input = tempfile::tempdir().unwrap();
    let path = write_pdf(input.path(), "long.pdf", &["p"; 8]);
    let run = CancellationToken::new();
    let service = service(
        config(4, 1),
        vec![Arc::new(AbortAfter {
            trigger_page: 1,
            run: run.clone(),
        })],
    );

    let sink = CollectingSink::default();
    let report = service.run(&[path], &sink, run).await.unwrap();

    assert!(report.interrupted);
    assert_eq!(report.chunks.len(), 1);
    assert_eq!(report.chunks_not_started, 2);

    let chunks = sink.chunks.lock().await;
    let chunk = &chunks[0];
    assert!(chunk.interrupted);
    assert_eq!(chunk.text, "page 0\n\npage 1");
    assert_eq!(
        chunk.failed_pages().into_iter().collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert!(
        chunk
            .page_failures
            .values()
            .all(|failure| *failure == PageFailure::Aborted)
    );
}

#[tokio::test]
async fn chunk_stream_yields_results_in_plan_order() {
    let input = tempfile::tempdir().unwrap();
    let path = write_pdf(
        input.path(),
        "stream.pdf",
        &["p0", "p1", "p2", "p3", "p4", "p5", "p6"],
    );
    let service = service(config(3, 1), vec![Arc::new(ContentStreamStrategy::new())]);
    let loaded = service.load(&[path]).await.unwrap();
    assert!(loaded.errors.is_empty());

    let results: Vec<ChunkResult> = service
        .chunks(loaded.source, CancellationToken::new())
        .map(|result| result.unwrap())
        .collect()
        .await;

    let ranges: Vec<(usize, usize)> = results
        .iter()
        .map(|chunk| (chunk.plan.start_page, chunk.plan.end_page))
        .collect();
    assert_eq!(ranges, vec![(0, 3), (2, 5), (4, 7)]);
    assert_eq!(results[1].text, "p2\n\np3\n\np4");
    assert!(results.iter().all(|chunk| !chunk.is_partial()));
}

#[tokio::test]
async fn unreadable_inputs_only_is_an_error() {
    let input = tempfile::tempdir().unwrap();
    let broken = input.path().join("broken.pdf");
    std::fs::write(&broken, b"not a pdf").unwrap();
    let service = service(config(3, 1), vec![]);

    let result = service
        .run(&[broken], &CollectingSink::default(), CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(pdf_chunker::processing::PipelineError::NoReadableDocuments { attempted: 1 })
    ));
}

#[tokio::test]
async fn diagnose_reports_every_tier_for_one_page() {
    let input = tempfile::tempdir().unwrap();
    let path = write_pdf(input.path(), "report.pdf", &["first", "second page"]);
    let secondary = Fixed::new(StrategyKind::Secondary, "worker text");
    let service = service(
        config(3, 1),
        vec![Arc::new(ContentStreamStrategy::new()), secondary.clone()],
    );

    let report = service
        .diagnose(&path, 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.document.name, "report.pdf");
    assert_eq!(report.page_number, 2);
    let characteristics = report.characteristics.unwrap();
    assert_eq!(characteristics.fonts, vec!["Courier"]);
    assert_eq!(characteristics.content_streams, 1);

    let diagnosis = &report.diagnosis;
    assert!(!diagnosis.verdict.is_problematic);
    let tiers: Vec<StrategyKind> = diagnosis.attempts.iter().map(|a| a.strategy).collect();
    assert_eq!(tiers, vec![StrategyKind::Primary, StrategyKind::Secondary]);
    assert_eq!(diagnosis.samples[&StrategyKind::Primary], "second page");
    assert_eq!(diagnosis.samples[&StrategyKind::Secondary], "worker text");
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);

    let missing = service.diagnose(&path, 5, &CancellationToken::new()).await;
    assert!(missing.is_err());
}

#[test]
fn config_reads_environment_overrides() {
    set_env("CHUNK_MAX_PAGES", "40");
    set_env("CHUNK_OVERLAP_PAGES", "5");
    set_env("KNOWN_BAD_FILENAME_PATTERNS", " Draft_, scan_ ,draft_");
    set_env("OCR_ENABLED", "off");
    set_env("PRIMARY_MAX_CONTENT_KB", "512");

    let config = Config::from_env().unwrap();
    assert_eq!(config.chunking.max_pages_per_chunk, 40);
    assert_eq!(config.chunking.overlap_pages, 5);
    assert_eq!(config.classifier.known_bad_patterns, vec!["draft_", "scan_"]);
    assert!(!config.ocr.enabled);
    assert_eq!(config.primary_max_content_bytes, 512 * 1024);
    config.validate().unwrap();
}
