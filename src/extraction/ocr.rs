use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::process::{run_to_completion, stdout_or_error};
use super::strategy::ExtractionStrategy;
use super::types::{PageInput, StrategyError, StrategyKind};
use crate::config::OcrConfig;

/// Upper bound for each tool's version probe at startup.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rasterises the page with `pdftoppm` and recognises it with `tesseract`.
///
/// Both tools run as child processes inside a scratch directory that is removed when the
/// attempt ends, whether it succeeds, fails, or is cancelled.
#[derive(Debug, Clone)]
pub struct TesseractStrategy {
    config: OcrConfig,
    pdftoppm: PathBuf,
    tesseract: PathBuf,
    available: bool,
}

impl TesseractStrategy {
    /// Probe for both tools and build the strategy.
    ///
    /// The strategy reports itself unavailable when OCR is disabled in configuration or
    /// either tool cannot be started.
    pub async fn probe(config: &OcrConfig) -> Self {
        let mut strategy = Self::with_tools(config, "pdftoppm", "tesseract", false);
        if !config.enabled {
            tracing::info!("OCR disabled by configuration");
            return strategy;
        }
        let pdftoppm = tool_responds(&strategy.pdftoppm, "-v").await;
        let tesseract = tool_responds(&strategy.tesseract, "--version").await;
        strategy.available = pdftoppm && tesseract;
        if strategy.available {
            tracing::info!(language = %config.language, dpi = config.dpi, "OCR tier available");
        } else {
            tracing::warn!(pdftoppm, tesseract, "OCR tooling missing; OCR tier will be skipped");
        }
        strategy
    }

    /// Build the strategy with explicit tool paths and availability.
    pub fn with_tools(
        config: &OcrConfig,
        pdftoppm: impl Into<PathBuf>,
        tesseract: impl Into<PathBuf>,
        available: bool,
    ) -> Self {
        Self {
            config: config.clone(),
            pdftoppm: pdftoppm.into(),
            tesseract: tesseract.into(),
            available,
        }
    }
}

async fn tool_responds(program: &Path, version_flag: &str) -> bool {
    let mut command = Command::new(program);
    command.arg(version_flag);
    let cancel = CancellationToken::new();
    // Only the ability to start matters; `pdftoppm -v` exits non-zero on some builds.
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, run_to_completion(command, None, &cancel)).await,
        Ok(Ok(_))
    )
}

#[async_trait]
impl ExtractionStrategy for TesseractStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ocr
    }

    fn is_available(&self) -> bool {
        self.available && self.config.enabled
    }

    async fn extract(
        &self,
        page: Arc<PageInput>,
        cancel: CancellationToken,
    ) -> Result<String, StrategyError> {
        let io_failed = |error: std::io::Error| StrategyError::Failed(error.to_string());
        let scratch = tempfile::Builder::new()
            .prefix("pdf-chunker-ocr-")
            .tempdir()
            .map_err(io_failed)?;
        let pdf_path = scratch.path().join("page.pdf");
        let image_prefix = scratch.path().join("page");
        tokio::fs::write(&pdf_path, &page.bytes[..])
            .await
            .map_err(io_failed)?;

        let mut rasterise = Command::new(&self.pdftoppm);
        rasterise
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(self.config.dpi.to_string())
            .arg(&pdf_path)
            .arg(&image_prefix);
        let output = run_to_completion(rasterise, None, &cancel).await?;
        stdout_or_error("pdftoppm", output)?;

        let image_path = image_prefix.with_extension("png");
        if !image_path.exists() {
            return Err(StrategyError::Failed("pdftoppm produced no image".into()));
        }

        let mut recognise = Command::new(&self.tesseract);
        recognise
            .arg(&image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language);
        let output = run_to_completion(recognise, None, &cancel).await?;
        let text = stdout_or_error("tesseract", output)?;

        tracing::debug!(page = page.global_index, chars = text.len(), "OCR finished");
        Ok(text.replace('\x0c', "").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_config_is_unavailable_without_probing() {
        let config = OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        };
        let strategy = TesseractStrategy::probe(&config).await;
        assert!(!strategy.is_available());
        assert_eq!(strategy.kind(), StrategyKind::Ocr);
    }

    #[tokio::test]
    async fn missing_tools_are_unavailable() {
        let strategy = TesseractStrategy::with_tools(
            &OcrConfig::default(),
            "no-such-pdftoppm",
            "no-such-tesseract",
            false,
        );
        assert!(!tool_responds(&strategy.pdftoppm, "-v").await);
        assert!(!strategy.is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_rasteriser_surfaces_as_unavailable_error() {
        let strategy = TesseractStrategy::with_tools(
            &OcrConfig::default(),
            "no-such-pdftoppm",
            "no-such-tesseract",
            true,
        );
        let page = Arc::new(PageInput {
            global_index: 0,
            metadata: crate::source::PageMetadata {
                source_name: "scan.pdf".into(),
                local_index: 0,
                size_hint: 0,
                document_bytes: 0,
            },
            bytes: Arc::from(b"%PDF-1.4".to_vec()),
        });
        let error = strategy
            .extract(page, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, StrategyError::Unavailable(_)));
    }
}
