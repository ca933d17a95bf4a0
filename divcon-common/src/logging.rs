//! Logging utilities for the DivCon pipeline.
//!
//! Two pieces:
//! - [`init_logging`] installs the global `tracing` subscriber (pretty or JSON).
//! - The progress channel: worker tasks never write to the console directly.
//!   They push [`ProgressRecord`]s into a [`ProgressSink`]; a single
//!   [`ProgressWriter`] task drains the channel and emits the log lines.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules (hyper, reqwest, h2, rustls) are set to
//! `warn` level so the per-batch progress lines stay readable.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Target used for progress lines emitted by the writer task.
pub const PROGRESS_TARGET: &str = "divcon::progress";

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Build the default EnvFilter with noise suppression.
fn build_filter(log_level: &str) -> EnvFilter {
    // Try environment variable first (allows override)
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }

    EnvFilter::new(&directives)
}

/// Initialize logging with the given configuration.
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - "json" for structured JSON, anything else for human-readable
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::debug!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate a new run ID for correlating the log lines of one pipeline run.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Progress Channel
// ============================================================================

/// Severity of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Warn,
}

/// One progress line produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub level: ProgressLevel,
    /// Pipeline stage the record belongs to (e.g. "classify", "score")
    pub stage: String,
    pub message: String,
}

/// Cloneable handle workers use to report progress.
///
/// Sending never blocks and never fails loudly: once the writer is gone the
/// records are discarded.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressRecord>>,
}

impl ProgressSink {
    /// Wrap an existing sender.
    pub fn from_sender(tx: mpsc::UnboundedSender<ProgressRecord>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything (tests, library callers without a writer).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Report an informational line.
    pub fn info(&self, stage: &str, message: impl Into<String>) {
        self.send(ProgressLevel::Info, stage, message.into());
    }

    /// Report a warning line.
    pub fn warn(&self, stage: &str, message: impl Into<String>) {
        self.send(ProgressLevel::Warn, stage, message.into());
    }

    fn send(&self, level: ProgressLevel, stage: &str, message: String) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressRecord {
                level,
                stage: stage.to_string(),
                message,
            });
        }
    }
}

/// The single consumer of the progress channel.
pub struct ProgressWriter {
    handle: JoinHandle<usize>,
}

impl ProgressWriter {
    /// Wait until every sink has been dropped and the channel is drained.
    ///
    /// Returns the number of records written.
    pub async fn finish(self) -> usize {
        self.handle.await.unwrap_or(0)
    }
}

/// Spawn the writer task and return the sink feeding it.
///
/// Must be called inside a tokio runtime.
pub fn spawn_progress_writer() -> (ProgressSink, ProgressWriter) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressRecord>();

    let handle = tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(record) = rx.recv().await {
            emit(&record);
            written += 1;
        }
        written
    });

    (ProgressSink::from_sender(tx), ProgressWriter { handle })
}

fn emit(record: &ProgressRecord) {
    match record.level {
        ProgressLevel::Info => {
            tracing::info!(target: PROGRESS_TARGET, stage = %record.stage, "{}", record.message)
        }
        ProgressLevel::Warn => {
            tracing::warn!(target: PROGRESS_TARGET, stage = %record.stage, "{}", record.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_modules_list() {
        assert!(NOISY_MODULES.contains(&"hyper"));
        assert!(NOISY_MODULES.contains(&"reqwest"));
        assert!(NOISY_MODULES.contains(&"rustls"));
    }

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = ProgressSink::disabled();
        sink.info("classify", "nothing listens");
        sink.warn("classify", "still nothing");
    }

    #[test]
    fn test_sink_preserves_send_order_per_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProgressSink::from_sender(tx);
        sink.info("classify", "1-10 classified");
        sink.warn("axes", "topic T3 has no opinions");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, ProgressLevel::Info);
        assert_eq!(first.stage, "classify");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.level, ProgressLevel::Warn);
        assert_eq!(second.message, "topic T3 has no opinions");
    }

    #[tokio::test]
    async fn test_writer_drains_all_senders() {
        let (sink, writer) = spawn_progress_writer();

        let mut handles = Vec::new();
        for worker in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..5 {
                    sink.info("score", format!("worker {worker} batch {i}"));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drop(sink);

        assert_eq!(writer.finish().await, 20);
    }

    #[test]
    fn test_writer_finishes_when_sink_dropped_unused() {
        let written = tokio_test::block_on(async {
            let (sink, writer) = spawn_progress_writer();
            drop(sink);
            writer.finish().await
        });
        assert_eq!(written, 0);
    }
}
