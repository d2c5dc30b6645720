use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use pdf_chunker::config::{self, Config, sanitize_patterns};
use pdf_chunker::extraction::{WORKER_SUBCOMMAND, run_worker};
use pdf_chunker::handoff::{DirectorySink, REPORT_FILE_NAME};
use pdf_chunker::logging;
use pdf_chunker::processing::{self, PageDiagnosisReport, PipelineService};
use pdf_chunker::source::discover_documents;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "pdf-chunker",
    version,
    about = "Split PDFs into overlapping page chunks and extract their text resiliently"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract every chunk of the input documents into an output directory.
    Run(RunArgs),
    /// Print the chunk plan for a page count.
    Plan(PlanArgs),
    /// Run every extraction tier once on a single page and report how each behaved.
    Diagnose(DiagnoseArgs),
    /// Worker endpoint: read one PDF page on stdin, write its text to stdout.
    #[command(name = WORKER_SUBCOMMAND, hide = true)]
    ExtractPage,
}

#[derive(Args)]
struct ChunkingArgs {
    /// Nominal pages per chunk.
    #[arg(long)]
    max_pages: Option<usize>,
    /// Pages shared by consecutive chunks.
    #[arg(long)]
    overlap: Option<usize>,
}

#[derive(Args)]
struct RunArgs {
    /// Directory whose PDF files are processed in file-name order.
    #[arg(long, conflicts_with = "files")]
    input_dir: Option<PathBuf>,
    /// Explicit PDF files, processed in the order given.
    files: Vec<PathBuf>,
    /// Where chunk files and the run report are written.
    #[arg(long, default_value = "chunks")]
    output_dir: PathBuf,
    #[command(flatten)]
    chunking: ChunkingArgs,
    /// Primary strategy deadline in seconds.
    #[arg(long)]
    primary_timeout: Option<u64>,
    /// Secondary strategy deadline in seconds.
    #[arg(long)]
    secondary_timeout: Option<u64>,
    /// OCR strategy deadline in seconds.
    #[arg(long)]
    ocr_timeout: Option<u64>,
    /// Failures that disable a strategy for the rest of a chunk.
    #[arg(long)]
    breaker_threshold: Option<u32>,
    /// Extra known-bad filename substrings (comma separated).
    #[arg(long, value_delimiter = ',')]
    known_bad: Vec<String>,
    /// Never attempt OCR.
    #[arg(long)]
    no_ocr: bool,
}

#[derive(Args)]
struct PlanArgs {
    /// Total pages across every input document.
    #[arg(long)]
    total_pages: usize,
    #[command(flatten)]
    chunking: ChunkingArgs,
}

#[derive(Args)]
struct DiagnoseArgs {
    /// PDF containing the page.
    #[arg(long)]
    file: PathBuf,
    /// 1-based page number within the file.
    #[arg(long)]
    page: usize,
    /// Print the diagnosis as JSON instead of text.
    #[arg(long)]
    json: bool,
    /// Never attempt OCR.
    #[arg(long)]
    no_ocr: bool,
}

impl ChunkingArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(max_pages) = self.max_pages {
            config.chunking.max_pages_per_chunk = max_pages;
        }
        if let Some(overlap) = self.overlap {
            config.chunking.overlap_pages = overlap;
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        self.chunking.apply(config);
        if let Some(secs) = self.primary_timeout {
            config.deadlines.primary = Duration::from_secs(secs);
        }
        if let Some(secs) = self.secondary_timeout {
            config.deadlines.secondary = Duration::from_secs(secs);
        }
        if let Some(secs) = self.ocr_timeout {
            config.deadlines.ocr = Duration::from_secs(secs);
        }
        if let Some(threshold) = self.breaker_threshold {
            config.circuit_breaker_threshold = threshold;
        }
        if !self.known_bad.is_empty() {
            let combined = config
                .classifier
                .known_bad_patterns
                .iter()
                .chain(&self.known_bad);
            config.classifier.known_bad_patterns = sanitize_patterns(combined);
        }
        if self.no_ocr {
            config.ocr.enabled = false;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        // Stdout is the data channel here, so no logging is installed.
        Command::ExtractPage => run_worker(io::stdin().lock(), io::stdout().lock())
            .context("page extraction failed"),
        Command::Plan(args) => print_plan(&args),
        Command::Diagnose(args) => diagnose(&args),
        Command::Run(args) => run(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_plan(args: &PlanArgs) -> Result<()> {
    let config = config::load(|config| args.chunking.apply(config))
        .context("invalid chunking configuration")?;
    let plans = processing::plan(
        args.total_pages,
        config.chunking.max_pages_per_chunk,
        config.chunking.overlap_pages,
    )?;
    for plan in &plans {
        println!(
            "chunk {}: pages {} ({} pages)",
            plan.index + 1,
            plan.page_label(),
            plan.len()
        );
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let config =
        config::load(|config| args.apply(config)).context("failed to load configuration")?;
    logging::init_tracing(config.log_file.as_deref());

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(execute(config, args))
}

async fn execute(config: Config, args: RunArgs) -> Result<()> {
    let paths = match (&args.input_dir, args.files.is_empty()) {
        (Some(dir), _) => discover_documents(dir)?,
        (None, false) => args.files.clone(),
        (None, true) => bail!("pass --input-dir or at least one PDF file"),
    };

    let service = PipelineService::new(config)
        .await
        .context("failed to initialise pipeline")?;
    let sink = DirectorySink::new(&args.output_dir);
    let cancel = CancellationToken::new();

    let abort = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping at the next page boundary");
            abort.cancel();
        }
    });

    let report = service.run(&paths, &sink, cancel).await?;

    let failed = report.failed_pages();
    println!(
        "{} chunk(s) from {} page(s) written to {}",
        report.chunks.len(),
        report.total_pages,
        sink.dir().display()
    );
    if !report.load_errors.is_empty() {
        println!("{} document(s) skipped:", report.load_errors.len());
        for failure in &report.load_errors {
            println!("  {}: {}", failure.path.display(), failure.error);
        }
    }
    if !failed.is_empty() {
        println!("{} page(s) yielded no text", failed.len());
    }
    println!("Report: {}", sink.dir().join(REPORT_FILE_NAME).display());
    if report.interrupted {
        bail!(
            "run aborted; {} chunk(s) not started",
            report.chunks_not_started
        );
    }
    Ok(())
}

fn diagnose(args: &DiagnoseArgs) -> Result<()> {
    let Some(page_index) = args.page.checked_sub(1) else {
        bail!("page numbers start at 1");
    };
    let config = config::load(|config| {
        if args.no_ocr {
            config.ocr.enabled = false;
        }
    })
    .context("failed to load configuration")?;
    // JSON goes to stdout, so only the file layer may log alongside it.
    if !args.json {
        logging::init_tracing(config.log_file.as_deref());
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let report = runtime.block_on(async {
        let service = PipelineService::new(config)
            .await
            .context("failed to initialise pipeline")?;
        service
            .diagnose(&args.file, page_index, &CancellationToken::new())
            .await
            .with_context(|| format!("failed to diagnose {}", args.file.display()))
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_diagnosis(&report);
    }
    Ok(())
}

fn print_diagnosis(report: &PageDiagnosisReport) {
    let diagnosis = &report.diagnosis;
    println!(
        "Page {} of {} ({} pages, {} bytes)",
        report.page_number,
        report.document.name,
        report.document.page_count,
        report.document.byte_size
    );
    if diagnosis.verdict.is_problematic {
        println!("Classifier: flagged ({:?})", diagnosis.verdict.reason);
    } else {
        println!("Classifier: clean");
    }
    match &report.characteristics {
        Some(page) => {
            println!(
                "Content: {} bytes in {} stream(s), {} image(s), {} annotation(s), rotation {}",
                page.content_bytes,
                page.content_streams,
                page.image_count,
                page.annotations,
                page.rotation
            );
            if let Some([x0, y0, x1, y1]) = page.media_box {
                println!("Page size: {:.1} x {:.1}", x1 - x0, y1 - y0);
            }
            if !page.fonts.is_empty() {
                println!("Fonts: {}", page.fonts.join(", "));
            }
        }
        None => println!("Content: page dictionary unreadable"),
    }

    println!();
    for attempt in &diagnosis.attempts {
        println!(
            "{:<10} {:<12} {:>7} ms {:>7} chars{}",
            attempt.strategy,
            format!("{:?}", attempt.outcome),
            attempt.elapsed.as_millis(),
            attempt.text_length,
            attempt
                .detail
                .as_deref()
                .map(|detail| format!("  {detail}"))
                .unwrap_or_default()
        );
    }
    for skipped in &diagnosis.skipped {
        println!("{:<10} skipped ({:?})", skipped.strategy, skipped.reason);
    }
    for (strategy, sample) in &diagnosis.samples {
        println!("\n[{strategy}] {sample}");
    }
}
