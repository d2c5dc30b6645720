//! Robust structural extraction in a separate worker process.
//!
//! The parser behind this tier can loop or panic on malformed input, so it never runs inside
//! the pipeline process. The pipeline re-invokes its own executable with a hidden
//! subcommand, pipes the single-page PDF to its stdin, and reads text from its stdout. A
//! deadline or abort kills the worker.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::{run_to_completion, stdout_or_error};
use super::strategy::ExtractionStrategy;
use super::types::{PageInput, StrategyError, StrategyKind};

/// Name of the hidden CLI subcommand that serves one page.
pub const WORKER_SUBCOMMAND: &str = "extract-page";

/// Runs the structural parser in a child process, one page per process.
#[derive(Debug, Clone)]
pub struct WorkerProcessStrategy {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerProcessStrategy {
    /// Use an arbitrary worker command.
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invoke the running executable with [`WORKER_SUBCOMMAND`].
    pub fn current_exe() -> Result<Self, StrategyError> {
        let program = std::env::current_exe().map_err(|error| {
            StrategyError::Unavailable(format!("cannot locate executable: {error}"))
        })?;
        Ok(Self::new(program, vec![OsString::from(WORKER_SUBCOMMAND)]))
    }
}

#[async_trait]
impl ExtractionStrategy for WorkerProcessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Secondary
    }

    async fn extract(
        &self,
        page: Arc<PageInput>,
        cancel: CancellationToken,
    ) -> Result<String, StrategyError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        let output = run_to_completion(command, Some(&page.bytes[..]), &cancel).await?;
        stdout_or_error("extraction worker", output)
    }
}

/// Extract text from a PDF held in memory with the structural parser.
pub fn extract_structured_text(bytes: &[u8]) -> Result<String, StrategyError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map(|text| text.trim().to_string())
        .map_err(|error| StrategyError::Failed(error.to_string()))
}

/// Worker entry point: read a PDF from `input`, write its text to `output`.
pub fn run_worker(mut input: impl Read, mut output: impl Write) -> Result<(), StrategyError> {
    let io_failed = |error: std::io::Error| StrategyError::Failed(error.to_string());
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes).map_err(io_failed)?;
    let text = extract_structured_text(&bytes)?;
    output.write_all(text.as_bytes()).map_err(io_failed)?;
    output.flush().map_err(io_failed)
}
