//! Segmentation pipeline: chunk planning, chunk assembly, and run orchestration.

mod assembler;
pub mod planner;
mod report;
mod service;
pub mod types;

pub use assembler::{ChunkAssembler, PAGE_SEPARATOR};
pub use planner::{ChunkPlanner, plan};
pub use report::{LoadFailure, PageDiagnosisReport, RunReport};
pub use service::{LoadedSource, PipelineService, build_classifier};
pub use types::{ChunkPlan, ChunkResult, ChunkSummary, PageFailure, PipelineError};
