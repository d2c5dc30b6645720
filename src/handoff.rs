//! Hand-off of assembled chunks to the downstream summarisation collaborator.
//!
//! The pipeline never calls a language model itself. It passes each [`ChunkResult`] to a
//! [`ChunkSink`] and moves on; a sink failure is recorded for that chunk and never stops the
//! run.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::processing::{ChunkResult, RunReport};

/// File name of the JSON run report written by [`DirectorySink`].
pub const REPORT_FILE_NAME: &str = "run_report.json";

/// Errors raised while handing a chunk or report downstream.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the output location failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The run report could not be serialised.
    #[error("failed to serialise run report: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The collaborator refused the chunk.
    #[error("chunk rejected: {0}")]
    Rejected(String),
}

/// Receives chunk results in plan order.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Accept one chunk. `total_chunks` is the number of planned chunks.
    async fn accept(&self, chunk: &ChunkResult, total_chunks: usize) -> Result<(), SinkError>;

    /// Called once after the last chunk with the final report.
    async fn finish(&self, _report: &RunReport) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes one text file per chunk plus `run_report.json` into a directory.
///
/// Chunks without usable content get a `.skipped` marker listing the unreadable pages, so the
/// summariser can flag the gap instead of summarising nothing.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Write into `dir`, creating it on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a chunk is written to.
    pub fn chunk_path(&self, chunk: &ChunkResult) -> PathBuf {
        let extension = if chunk.has_content() { "txt" } else { "skipped" };
        self.dir.join(format!(
            "chunk_{}_pages_{}.{extension}",
            chunk.plan.index + 1,
            chunk.plan.page_label()
        ))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), SinkError> {
        let io_error = |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(path, contents).await.map_err(io_error)
    }
}

/// Header plus body written for one chunk.
pub fn render_chunk(chunk: &ChunkResult, total_chunks: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Chunk {} of {} (Pages {})",
        chunk.plan.index + 1,
        total_chunks,
        chunk.plan.page_label()
    );
    out.push_str(&"=".repeat(50));
    out.push('\n');

    if chunk.is_partial() {
        let pages: Vec<String> = chunk
            .page_failures
            .iter()
            .map(|(page, failure)| format!("{} ({})", page + 1, failure.label()))
            .collect();
        let _ = writeln!(out, "Unreadable pages: {}", pages.join(", "));
    }
    if chunk.interrupted {
        out.push_str("Run aborted before this chunk finished.\n");
    }
    if !chunk.has_content() {
        out.push_str("No usable content was extracted from this chunk.\n");
        return out;
    }

    out.push('\n');
    out.push_str(&chunk.text);
    out.push('\n');
    out
}

#[async_trait]
impl ChunkSink for DirectorySink {
    async fn accept(&self, chunk: &ChunkResult, total_chunks: usize) -> Result<(), SinkError> {
        let path = self.chunk_path(chunk);
        self.write(&path, render_chunk(chunk, total_chunks).as_bytes())
            .await?;
        tracing::info!(chunk = chunk.plan.index, path = %path.display(), "Chunk written");
        Ok(())
    }

    async fn finish(&self, report: &RunReport) -> Result<(), SinkError> {
        let path = self.dir.join(REPORT_FILE_NAME);
        let json = serde_json::to_vec_pretty(report)?;
        self.write(&path, &json).await?;
        tracing::info!(path = %path.display(), "Run report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::StrategyKind;
    use crate::processing::{ChunkPlan, PageFailure};
    use std::collections::BTreeMap;

    fn chunk(text: &str, failures: &[usize]) -> ChunkResult {
        ChunkResult {
            plan: ChunkPlan {
                index: 1,
                start_page: 90,
                end_page: 190,
            },
            text: text.into(),
            page_failures: failures
                .iter()
                .map(|page| (*page, PageFailure::Aborted))
                .collect(),
            strategy_used: BTreeMap::from([(90, StrategyKind::Primary)]),
            interrupted: false,
        }
    }

    #[test]
    fn render_lists_unreadable_pages_one_based() {
        let rendered = render_chunk(&chunk("body", &[95, 120]), 3);
        assert!(rendered.starts_with("Chunk 2 of 3 (Pages 91-190)\n"));
        assert!(rendered.contains("Unreadable pages: 96 (run aborted), 121 (run aborted)"));
        assert!(rendered.ends_with("body\n"));
    }

    #[tokio::test]
    async fn writes_text_and_skipped_markers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));

        let full = chunk("body", &[]);
        sink.accept(&full, 3).await.unwrap();
        let written = dir.path().join("out").join("chunk_2_pages_91-190.txt");
        assert!(
            tokio::fs::read_to_string(&written)
                .await
                .unwrap()
                .contains("body")
        );

        let empty = chunk("", &[90, 91]);
        assert_eq!(
            sink.chunk_path(&empty),
            dir.path().join("out").join("chunk_2_pages_91-190.skipped")
        );
        sink.accept(&empty, 3).await.unwrap();
        let marker = tokio::fs::read_to_string(sink.chunk_path(&empty))
            .await
            .unwrap();
        assert!(marker.contains("No usable content"));
    }
}
