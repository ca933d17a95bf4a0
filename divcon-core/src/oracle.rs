//! The text oracle seam.
//!
//! The coordinator only knows this trait. The LLM-backed implementation lives
//! in `divcon-oracle`; tests drive the pipeline with scripted fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{AnchorSet, Axis, Classification, Opinion, ScoreRecord, Topic, TopicDiscovery};

/// External text-understanding service.
///
/// One handle is shared by every worker task, so implementations must be
/// safe for concurrent calls. Timeouts are the implementation's concern.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Oracle name for logging (e.g. "openai:gpt-5-mini").
    fn name(&self) -> &str;

    /// Find the main topics in a sample of opinions.
    async fn discover_topics(&self, sample: &[Opinion]) -> Result<TopicDiscovery>;

    /// Assign each opinion in the batch to one of the topics.
    async fn classify(&self, topics: &[Topic], batch: &[Opinion]) -> Result<Vec<Classification>>;

    /// Find contested axes within one topic, in the oracle's order.
    async fn discover_axes(&self, topic: &Topic, sample: &[Opinion]) -> Result<Vec<Axis>>;

    /// Produce extreme statements for both poles of an axis.
    async fn generate_anchors(&self, axis: &Axis, sample: &[Opinion]) -> Result<AnchorSet>;

    /// Score each opinion in the batch against the axis.
    async fn score(
        &self,
        axis: &Axis,
        anchors: &AnchorSet,
        batch: &[Opinion],
    ) -> Result<Vec<ScoreRecord>>;
}
