//! Fast in-process extraction by walking the page's content-stream text operators.

use async_trait::async_trait;
use lopdf::Object;
use lopdf::content::Content;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::strategy::ExtractionStrategy;
use super::types::{PageInput, StrategyError, StrategyKind};

/// Operators decoded between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// `TJ` kerning below this (in thousandths of an em) is treated as a word gap.
const WORD_GAP_THRESHOLD: f64 = -200.0;

/// Text with a smaller share of readable characters is reported as empty so extraction
/// escalates instead of committing garbage from an unsupported font encoding.
const MIN_READABLE_RATIO: f64 = 0.6;

/// Content streams larger than this are left to the worker-process tier by default.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 2 * 1024 * 1024;

/// Walks `Tj`/`TJ`/`'`/`"` operators of the page content on the blocking pool.
///
/// The operator walk checks its cancellation token every few hundred operators. Parsing and
/// tokenising the stream cannot observe the token, so pages whose content exceeds
/// `max_content_bytes` are declined; that bounds the work left running after a deadline.
#[derive(Debug, Clone, Copy)]
pub struct ContentStreamStrategy {
    max_content_bytes: usize,
}

impl Default for ContentStreamStrategy {
    fn default() -> Self {
        Self::with_max_content_bytes(DEFAULT_MAX_CONTENT_BYTES)
    }
}

impl ContentStreamStrategy {
    /// Create the strategy with the default content limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the strategy, declining pages whose content stream exceeds `max_content_bytes`.
    pub fn with_max_content_bytes(max_content_bytes: usize) -> Self {
        Self { max_content_bytes }
    }
}

#[async_trait]
impl ExtractionStrategy for ContentStreamStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Primary
    }

    fn accepts(&self, page: &PageInput) -> bool {
        page.metadata.size_hint <= self.max_content_bytes
    }

    async fn extract(
        &self,
        page: Arc<PageInput>,
        cancel: CancellationToken,
    ) -> Result<String, StrategyError> {
        if !self.accepts(&page) {
            return Err(too_large(page.metadata.size_hint, self.max_content_bytes));
        }
        let limit = self.max_content_bytes;
        tokio::task::spawn_blocking(move || extract_content_text(&page.bytes, limit, &cancel))
            .await
            .map_err(|error| StrategyError::Panicked(error.to_string()))?
    }
}

fn failed(error: lopdf::Error) -> StrategyError {
    StrategyError::Failed(error.to_string())
}

fn too_large(size: usize, limit: usize) -> StrategyError {
    StrategyError::Failed(format!(
        "content stream of {size} bytes exceeds the {limit} byte in-process limit"
    ))
}

fn check(cancel: &CancellationToken) -> Result<(), StrategyError> {
    if cancel.is_cancelled() {
        Err(StrategyError::Cancelled)
    } else {
        Ok(())
    }
}

/// Decode the text operators of the first page in `bytes`, refusing oversized content.
pub(crate) fn extract_content_text(
    bytes: &[u8],
    max_content_bytes: usize,
    cancel: &CancellationToken,
) -> Result<String, StrategyError> {
    let pdf = lopdf::Document::load_mem(bytes).map_err(failed)?;
    check(cancel)?;
    let page_id = pdf
        .get_pages()
        .into_values()
        .next()
        .ok_or_else(|| StrategyError::Failed("page tree is empty".into()))?;
    let raw = pdf.get_page_content(page_id).map_err(failed)?;
    if raw.len() > max_content_bytes {
        return Err(too_large(raw.len(), max_content_bytes));
    }
    check(cancel)?;
    let content = Content::decode(&raw).map_err(failed)?;

    let mut text = TextAccumulator::default();
    for (position, operation) in content.operations.iter().enumerate() {
        if position % CANCEL_CHECK_INTERVAL == 0 {
            check(cancel)?;
        }
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "Tj" => text.push_operand(operands.first()),
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match number(item) {
                            Some(offset) if offset < WORD_GAP_THRESHOLD => text.space(),
                            Some(_) => {}
                            None => text.push_operand(Some(item)),
                        }
                    }
                }
            }
            "'" => {
                text.newline();
                text.push_operand(operands.first());
            }
            "\"" => {
                text.newline();
                text.push_operand(operands.get(2));
            }
            "T*" | "ET" => text.newline(),
            "Td" | "TD" => {
                if operands.get(1).and_then(number).is_some_and(|ty| ty != 0.0) {
                    text.newline();
                } else {
                    text.space();
                }
            }
            _ => {}
        }
    }

    Ok(text.finish())
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

/// Collects decoded strings and tracks how much of the input looked like text.
#[derive(Default)]
struct TextAccumulator {
    out: String,
    decoded_chars: usize,
    unreadable_chars: usize,
}

impl TextAccumulator {
    fn push_operand(&mut self, operand: Option<&Object>) {
        if let Some(Object::String(bytes, _)) = operand {
            self.push_pdf_string(bytes);
        }
    }

    fn push_pdf_string(&mut self, bytes: &[u8]) {
        for ch in decode_pdf_string(bytes).chars() {
            self.decoded_chars += 1;
            if (ch.is_control() && !ch.is_whitespace()) || ch == char::REPLACEMENT_CHARACTER {
                self.unreadable_chars += 1;
            } else {
                self.out.push(ch);
            }
        }
    }

    fn space(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            while self.out.ends_with(' ') {
                self.out.pop();
            }
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        if self.decoded_chars == 0 {
            return String::new();
        }
        let readable = (self.decoded_chars - self.unreadable_chars) as f64;
        if readable / (self.decoded_chars as f64) < MIN_READABLE_RATIO {
            return String::new();
        }
        self.out.trim().to_string()
    }
}

/// Decode a PDF string: UTF-16BE when it carries a byte-order mark, Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|byte| char::from(*byte)).collect(),
    }
}
