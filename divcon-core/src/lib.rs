//! DivCon Core - staged orchestration of opinion analysis.
//!
//! This crate provides:
//! - The data model (opinions, topics, axes, anchors, scores)
//! - The [`Oracle`] seam to the external text-understanding service
//! - Building blocks: sampling, batching, bounded fan-out, merging,
//!   axis id namespacing, aggregation
//! - The [`StageCoordinator`] that sequences the four analysis stages
//! - Opinion loading, result persistence and the text summary

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod aggregator;
pub mod batcher;
pub mod citations;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod export;
pub mod merger;
pub mod model;
pub mod namespacer;
pub mod oracle;
pub mod report;
pub mod sampler;
pub mod store;

pub use aggregator::{aggregate, aggregate_by_axis, ScoreStatistics};
pub use coordinator::{AnalysisRun, RunDiagnostics, StageCoordinator};
pub use error::{PipelineError, Result};
pub use executor::{FailurePolicy, ParallelExecutor};
pub use export::{load_results, ResultWriter, SavedResults};
pub use merger::MergeStats;
pub use model::{
    AnchorSet, Axis, Classification, Opinion, Score, ScoreRecord, Topic, TopicDiscovery,
};
pub use oracle::Oracle;
pub use report::SummaryReport;
pub use store::load_opinions;
