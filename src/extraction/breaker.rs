use serde::Serialize;

use super::types::StrategyKind;

/// Identifies the chunk a breaker's counters belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChunkId(pub usize);

/// Per-chunk failure counters that disable a strategy after repeated timeouts or errors.
///
/// State never leaks across chunks: counters reset whenever a different chunk is begun or
/// referenced. Empty results are not failures and never reach the breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    chunk: Option<ChunkId>,
    failures: [u32; 3],
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` failures of one strategy.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            chunk: None,
            failures: [0; 3],
        }
    }

    /// Start tracking a new chunk, discarding every counter.
    pub fn begin_chunk(&mut self, chunk: ChunkId) {
        self.chunk = Some(chunk);
        self.failures = [0; 3];
    }

    /// Count a timeout or error. Returns `true` if this failure opened the breaker.
    pub fn record_failure(&mut self, chunk: ChunkId, strategy: StrategyKind) -> bool {
        if self.chunk != Some(chunk) {
            self.begin_chunk(chunk);
        }
        let count = &mut self.failures[strategy.index()];
        *count = count.saturating_add(1);
        let opened = *count == self.threshold;
        if opened {
            tracing::warn!(
                chunk = chunk.0,
                strategy = %strategy,
                failures = *count,
                "Circuit breaker opened; strategy disabled for the rest of the chunk"
            );
        }
        opened
    }

    /// Whether `strategy` is disabled for `chunk`.
    pub fn is_disabled(&self, chunk: ChunkId, strategy: StrategyKind) -> bool {
        self.chunk == Some(chunk) && self.failures[strategy.index()] >= self.threshold
    }

    /// Failures recorded for `strategy` in the current chunk.
    pub fn failures(&self, strategy: StrategyKind) -> u32 {
        self.failures[strategy.index()]
    }

    /// Strategies currently disabled, in tier order.
    pub fn open_strategies(&self) -> Vec<StrategyKind> {
        StrategyKind::ALL
            .into_iter()
            .filter(|kind| self.failures[kind.index()] >= self.threshold)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_threshold_for_that_strategy_only() {
        let mut breaker = CircuitBreaker::new(3);
        let chunk = ChunkId(0);
        breaker.begin_chunk(chunk);

        assert!(!breaker.record_failure(chunk, StrategyKind::Secondary));
        assert!(!breaker.record_failure(chunk, StrategyKind::Secondary));
        assert!(!breaker.is_disabled(chunk, StrategyKind::Secondary));
        assert!(breaker.record_failure(chunk, StrategyKind::Secondary));

        assert!(breaker.is_disabled(chunk, StrategyKind::Secondary));
        assert!(!breaker.is_disabled(chunk, StrategyKind::Primary));
        assert_eq!(breaker.open_strategies(), vec![StrategyKind::Secondary]);
    }

    #[test]
    fn state_resets_for_a_new_chunk() {
        let mut breaker = CircuitBreaker::new(1);
        breaker.begin_chunk(ChunkId(0));
        breaker.record_failure(ChunkId(0), StrategyKind::Primary);
        assert!(breaker.is_disabled(ChunkId(0), StrategyKind::Primary));

        assert!(!breaker.is_disabled(ChunkId(1), StrategyKind::Primary));
        breaker.begin_chunk(ChunkId(1));
        assert_eq!(breaker.failures(StrategyKind::Primary), 0);
        assert!(breaker.open_strategies().is_empty());
    }

    #[test]
    fn failure_for_an_unseen_chunk_starts_fresh_counters() {
        let mut breaker = CircuitBreaker::new(2);
        breaker.begin_chunk(ChunkId(4));
        breaker.record_failure(ChunkId(4), StrategyKind::Ocr);

        breaker.record_failure(ChunkId(5), StrategyKind::Ocr);
        assert_eq!(breaker.failures(StrategyKind::Ocr), 1);
        assert!(!breaker.is_disabled(ChunkId(5), StrategyKind::Ocr));
    }
}
