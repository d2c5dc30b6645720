//! Deterministic page-range planning with fixed overlap.

use crate::config::{ChunkingConfig, ConfigurationError};

use super::types::ChunkPlan;

/// Splits a page count into overlapping, ordered ranges.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    max_pages_per_chunk: usize,
    overlap_pages: usize,
}

impl ChunkPlanner {
    /// Validate the parameters and build a planner.
    pub fn new(config: ChunkingConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            max_pages_per_chunk: config.max_pages_per_chunk,
            overlap_pages: config.overlap_pages,
        })
    }

    /// Plan chunks over `total_pages`.
    pub fn plan(&self, total_pages: usize) -> Vec<ChunkPlan> {
        if total_pages == 0 {
            return Vec::new();
        }
        if total_pages <= self.max_pages_per_chunk {
            return vec![ChunkPlan {
                index: 0,
                start_page: 0,
                end_page: total_pages,
            }];
        }

        let mut plans = Vec::new();
        let mut start_page = 0;
        loop {
            let end_page = (start_page + self.max_pages_per_chunk).min(total_pages);
            plans.push(ChunkPlan {
                index: plans.len(),
                start_page,
                end_page,
            });
            // Once a plan reaches the last page, stepping back by the overlap would only
            // re-plan pages already covered.
            if end_page == total_pages {
                break;
            }
            start_page = end_page - self.overlap_pages;
        }
        plans
    }
}

/// Plan chunks in one call, rejecting impossible parameters.
pub fn plan(
    total_pages: usize,
    max_pages_per_chunk: usize,
    overlap_pages: usize,
) -> Result<Vec<ChunkPlan>, ConfigurationError> {
    let planner = ChunkPlanner::new(ChunkingConfig {
        max_pages_per_chunk,
        overlap_pages,
    })?;
    Ok(planner.plan(total_pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(plans: &[ChunkPlan]) -> Vec<(usize, usize)> {
        plans
            .iter()
            .map(|plan| (plan.start_page, plan.end_page))
            .collect()
    }

    #[test]
    fn overlapping_plans_for_a_long_sequence() {
        let plans = plan(250, 100, 10).unwrap();
        assert_eq!(bounds(&plans), vec![(0, 100), (90, 190), (180, 250)]);
        assert_eq!(
            plans.iter().map(|plan| plan.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn short_sequence_is_a_single_plan() {
        assert_eq!(bounds(&plan(50, 100, 10).unwrap()), vec![(0, 50)]);
        assert_eq!(bounds(&plan(100, 100, 10).unwrap()), vec![(0, 100)]);
    }

    #[test]
    fn no_pages_means_no_plans() {
        assert!(plan(0, 100, 10).unwrap().is_empty());
    }

    #[test]
    fn overlap_not_smaller_than_chunk_is_rejected() {
        assert_eq!(
            plan(250, 10, 10),
            Err(ConfigurationError::OverlapTooLarge {
                overlap: 10,
                max_pages: 10
            })
        );
        assert!(plan(250, 10, 25).is_err());
        assert_eq!(plan(250, 0, 0), Err(ConfigurationError::ZeroChunkSize));
    }

    #[test]
    fn plans_cover_every_page_with_exact_overlap() {
        for total in 1..=120 {
            for max in 1..=12 {
                for overlap in 0..max {
                    let plans = plan(total, max, overlap).unwrap();
                    assert_eq!(plans.first().map(|plan| plan.start_page), Some(0));
                    assert_eq!(plans.last().map(|plan| plan.end_page), Some(total));

                    for plan in &plans {
                        assert!(plan.start_page < plan.end_page);
                        assert!(plan.len() <= max);
                    }
                    for pair in plans.windows(2) {
                        let (previous, next) = (pair[0], pair[1]);
                        assert_eq!(previous.len(), max, "only the last plan may be short");
                        assert_eq!(next.start_page, previous.end_page - overlap);
                        assert!(next.end_page > previous.end_page, "plans always advance");
                    }
                }
            }
        }
    }
}
