#![deny(missing_docs)]

//! Core library for the resilient PDF segmentation and extraction pipeline.

/// Heuristic pre-screening of documents and pages.
pub mod classifier;
/// Environment-driven configuration management.
pub mod config;
/// Tiered text extraction, deadlines, and circuit breaking.
pub mod extraction;
/// Hand-off of chunk results to downstream consumers.
pub mod handoff;
/// Structured logging and tracing setup.
pub mod logging;
/// Extraction metrics helpers.
pub mod metrics;
/// Chunk planning, assembly, and run orchestration.
pub mod processing;
/// Source documents and the flattened page index space.
pub mod source;
