use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::{AttemptOutcome, ExtractionAttempt, PageInput, StrategyError, StrategyKind};

/// A single way of turning a page into text.
///
/// Implementations must return promptly once `cancel` fires. Work that cannot observe the
/// token (a child process, a blocking library call) has to be run so that dropping the
/// returned future stops it.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Tier this strategy fills.
    fn kind(&self) -> StrategyKind;

    /// Whether the strategy's tooling is present. Unavailable strategies are skipped.
    fn is_available(&self) -> bool {
        true
    }

    /// Whether this strategy takes `page` at all. Declined pages move to the next tier
    /// without an attempt and without counting against the breaker.
    fn accepts(&self, _page: &PageInput) -> bool {
        true
    }

    /// Extract the text of one page. An empty string means "nothing usable".
    async fn extract(
        &self,
        page: Arc<PageInput>,
        cancel: CancellationToken,
    ) -> Result<String, StrategyError>;
}

/// Result of one deadline-bounded execution.
pub(crate) struct DeadlineRun {
    pub attempt: ExtractionAttempt,
    pub text: Option<String>,
}

/// Run `strategy` on `page` for at most `deadline`.
///
/// The strategy receives a child of `run_token`; it is cancelled when the deadline passes and
/// again once the attempt ends, so nothing started by the attempt outlives it. The future is
/// dropped on timeout, which kills child processes started with `kill_on_drop`.
pub(crate) async fn run_with_deadline(
    strategy: &dyn ExtractionStrategy,
    page: Arc<PageInput>,
    deadline: Duration,
    run_token: &CancellationToken,
) -> DeadlineRun {
    let kind = strategy.kind();
    let token = run_token.child_token();
    let started = Instant::now();

    let result = tokio::time::timeout(deadline, strategy.extract(page, token.clone())).await;
    token.cancel();
    let elapsed = started.elapsed();

    let (outcome, text, detail) = match result {
        Err(_) => (
            AttemptOutcome::Timeout,
            None,
            Some(format!("deadline of {}ms exceeded", deadline.as_millis())),
        ),
        Ok(Ok(text)) if text.trim().is_empty() => (AttemptOutcome::EmptyResult, None, None),
        Ok(Ok(text)) => (AttemptOutcome::Success, Some(text), None),
        Ok(Err(error)) => (AttemptOutcome::Error, None, Some(error.to_string())),
    };

    DeadlineRun {
        attempt: ExtractionAttempt {
            strategy: kind,
            outcome,
            elapsed,
            text_length: text.as_ref().map_or(0, |text| text.chars().count()),
            detail,
        },
        text,
    }
}
