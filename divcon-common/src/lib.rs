//! DivCon Common - Shared types and utilities for the DivCon analysis pipeline.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and the single-consumer progress channel
//! - Small string utilities used in log output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, FailurePolicy, InputConfig, ObservabilityConfig, OracleConfig, OutputConfig,
    PipelineConfig,
};
pub use error::{Error, Result, ResultExt};
pub use logging::{ProgressRecord, ProgressSink, ProgressWriter};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, FailurePolicy, PipelineConfig};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::{init_logging, spawn_progress_writer, ProgressSink};
    pub use crate::validation::{Validate, ValidationError};
}
