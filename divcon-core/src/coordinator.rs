//! The staged pipeline.
//!
//! ```text
//! opinions ─ sample ─▶ discover_topics ─▶ topics
//! opinions ─ batch ─▶ [classify × W] ─ merge ─▶ opinions.topic_id
//! per topic ─ sample ─▶ [discover_axes × W] ─ namespace ─▶ axes
//! per axis ─▶ [generate_anchors ─▶ batch ─▶ [score × W_inner] ─ merge] × W ─▶ scores
//! ```
//!
//! All sampling happens here, on the coordinating task, before any work is
//! spawned. Worker tasks only call the oracle and report progress; every
//! shared collection is written while draining completions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use divcon_common::logging::generate_run_id;
use divcon_common::{PipelineConfig, ProgressSink};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::Instrument;

use crate::batcher::{batches, Batch};
use crate::citations::unresolved_citations;
use crate::error::{PipelineError, Result};
use crate::executor::{DrainReport, ParallelExecutor};
use crate::merger::{unclassified, ClassificationMerger, MergeStats, ScoreMerger};
use crate::model::{AnchorSet, Axis, Opinion, Score, Topic, STRENGTH_RANGE};
use crate::namespacer::namespace_axes;
use crate::oracle::Oracle;
use crate::sampler::sample;

const STAGE_TOPICS: &str = "topics";
const STAGE_CLASSIFY: &str = "classify";
const STAGE_AXES: &str = "axes";
const STAGE_ANCHORS: &str = "anchors";
const STAGE_SCORE: &str = "score";

/// Counters for everything the run absorbed instead of failing on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDiagnostics {
    /// Opinions no classification batch assigned to a topic
    pub unclassified: usize,
    pub classification: MergeStats,
    pub scoring: MergeStats,
    /// Topics without classified opinions, hence without axes
    pub skipped_topics: Vec<String>,
    /// `[ID:..]` citations in axis reasoning that name no opinion of the topic
    pub unresolved_citations: usize,
    /// (opinion, axis) pairs that never received a score record
    pub missing_scores: usize,
    /// Work items that failed under the continue policy
    pub failures: Vec<String>,
}

impl RunDiagnostics {
    fn record_failures(&mut self, stage: &str, report: DrainReport) {
        self.failures
            .extend(report.failures.into_iter().map(|e| format!("{stage}: {e}")));
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Input opinions, with `topic_id` set where classification succeeded
    pub opinions: Vec<Opinion>,
    /// Topics in discovery order
    pub topics: Vec<Topic>,
    pub topic_rationale: String,
    /// Namespaced axes keyed by topic id; topics without axes map to an empty list
    pub axes: BTreeMap<String, Vec<Axis>>,
    pub anchors: BTreeMap<String, AnchorSet>,
    /// Scores in merge order
    pub scores: Vec<Score>,
    pub diagnostics: RunDiagnostics,
}

impl AnalysisRun {
    pub fn axis_count(&self) -> usize {
        self.axes.values().map(Vec::len).sum()
    }
}

/// Result of one per-axis task.
struct AxisOutcome {
    axis_id: String,
    anchors: AnchorSet,
    scores: Vec<Score>,
    stats: MergeStats,
    missing: usize,
    report: DrainReport,
}

/// Sequences the four analysis stages.
pub struct StageCoordinator {
    oracle: Arc<dyn Oracle>,
    config: PipelineConfig,
    progress: ProgressSink,
    rng: StdRng,
    run_id: String,
}

impl StageCoordinator {
    /// Seeds the sampler from `config.seed` when set, from OS entropy otherwise.
    pub fn new(oracle: Arc<dyn Oracle>, config: PipelineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            oracle,
            config,
            progress: ProgressSink::disabled(),
            rng,
            run_id: generate_run_id(),
        }
    }

    /// Route worker progress lines into `sink`.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run all four stages over `opinions`.
    ///
    /// Any unrecovered oracle failure aborts the run; in-flight siblings are
    /// cancelled and nothing is checkpointed.
    pub async fn run(&mut self, opinions: Vec<Opinion>) -> Result<AnalysisRun> {
        let span = tracing::info_span!("pipeline", run_id = %self.run_id);
        self.run_stages(opinions).instrument(span).await
    }

    async fn run_stages(&mut self, mut opinions: Vec<Opinion>) -> Result<AnalysisRun> {
        if opinions.is_empty() {
            return Err(PipelineError::Input("no opinions to analyze".into()));
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut diagnostics = RunDiagnostics::default();

        tracing::info!(
            oracle = %self.oracle.name(),
            opinions = opinions.len(),
            workers = self.config.workers,
            policy = %self.config.failure_policy,
            "Starting analysis run"
        );

        let (topics, topic_rationale) = self
            .discover_topics(&opinions)
            .instrument(tracing::info_span!("stage", stage = STAGE_TOPICS))
            .await?;

        self.classify(&mut opinions, &topics, &mut diagnostics)
            .instrument(tracing::info_span!("stage", stage = STAGE_CLASSIFY))
            .await?;

        let by_topic = group_by_topic(&opinions);

        let axes = self
            .discover_axes(&topics, &by_topic, &mut diagnostics)
            .instrument(tracing::info_span!("stage", stage = STAGE_AXES))
            .await?;

        let (anchors, scores) = self
            .anchor_and_score(&axes, &by_topic, &mut diagnostics)
            .instrument(tracing::info_span!("stage", stage = STAGE_SCORE))
            .await?;

        let elapsed = clock.elapsed();
        tracing::info!(
            topics = topics.len(),
            axes = axes.values().map(Vec::len).sum::<usize>(),
            scores = scores.len(),
            unclassified = diagnostics.unclassified,
            failures = diagnostics.failures.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Analysis run complete"
        );

        Ok(AnalysisRun {
            run_id: self.run_id.clone(),
            started_at,
            elapsed,
            opinions,
            topics,
            topic_rationale,
            axes,
            anchors,
            scores,
            diagnostics,
        })
    }

    // ------------------------------------------------------------------------
    // Stage 1: topics
    // ------------------------------------------------------------------------

    async fn discover_topics(&mut self, opinions: &[Opinion]) -> Result<(Vec<Topic>, String)> {
        let sampled = sample(opinions, self.config.topic_sample_size, &mut self.rng);
        self.progress.info(
            STAGE_TOPICS,
            format!(
                "Discovering topics from {} of {} opinions",
                sampled.len(),
                opinions.len()
            ),
        );

        let discovery = self
            .oracle
            .discover_topics(&sampled)
            .await
            .map_err(|e| e.in_scope(format!("{} sampled opinions", sampled.len())))?;

        let topics = validate_topics(discovery.topics)?;
        for topic in &topics {
            tracing::info!(topic_id = %topic.id, name = %topic.name, "Topic discovered");
        }
        self.progress
            .info(STAGE_TOPICS, format!("Discovered {} topics", topics.len()));

        Ok((topics, discovery.reasoning))
    }

    // ------------------------------------------------------------------------
    // Stage 2: classification
    // ------------------------------------------------------------------------

    async fn classify(
        &mut self,
        opinions: &mut [Opinion],
        topics: &[Topic],
        diagnostics: &mut RunDiagnostics,
    ) -> Result<()> {
        let batches = batches(opinions, self.config.classify_batch_size)?;
        let shared_topics: Arc<[Topic]> = topics.into();
        let executor = ParallelExecutor::new(self.config.workers);

        tracing::info!(
            batches = batches.len(),
            batch_size = self.config.classify_batch_size,
            workers = executor.workers(),
            "Classifying opinions"
        );

        let mut work = Vec::with_capacity(batches.len());
        for batch in batches {
            let oracle = Arc::clone(&self.oracle);
            let topics = Arc::clone(&shared_topics);
            let progress = self.progress.clone();
            work.push(async move {
                let label = batch.label();
                let records = oracle
                    .classify(&topics, &batch.items)
                    .await
                    .map_err(|e| e.in_scope(format!("batch {label}")))?;
                progress.info(
                    STAGE_CLASSIFY,
                    format!("Classified opinions {label} ({} records)", records.len()),
                );
                Ok::<_, PipelineError>((batch_ids(&batch), records))
            });
        }

        let mut merger = ClassificationMerger::new(opinions, topics);
        let report = executor
            .spawn_all(work)
            .drain(self.config.failure_policy, |(ids, records)| {
                merger.merge(opinions, &ids, records);
                Ok(())
            })
            .await?;

        diagnostics.classification = merger.stats();
        diagnostics.unclassified = unclassified(opinions);
        diagnostics.record_failures(STAGE_CLASSIFY, report);

        if diagnostics.unclassified > 0 {
            self.progress.warn(
                STAGE_CLASSIFY,
                format!("{} opinions left unclassified", diagnostics.unclassified),
            );
        }
        tracing::info!(
            accepted = diagnostics.classification.accepted,
            dropped = diagnostics.classification.dropped(),
            unclassified = diagnostics.unclassified,
            "Classification merged"
        );

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Stage 3: axes
    // ------------------------------------------------------------------------

    async fn discover_axes(
        &mut self,
        topics: &[Topic],
        by_topic: &HashMap<String, Arc<Vec<Opinion>>>,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<BTreeMap<String, Vec<Axis>>> {
        let executor = ParallelExecutor::new(self.config.workers);
        let mut discovered: BTreeMap<String, Vec<Axis>> = BTreeMap::new();
        let mut work = Vec::with_capacity(topics.len());

        for topic in topics {
            let Some(topic_opinions) = by_topic.get(&topic.id) else {
                self.progress.warn(
                    STAGE_AXES,
                    format!("Topic {} has no classified opinions, skipping", topic.id),
                );
                diagnostics.skipped_topics.push(topic.id.clone());
                continue;
            };

            let sampled = sample(topic_opinions.as_slice(), self.config.axis_sample_size, &mut self.rng);
            let oracle = Arc::clone(&self.oracle);
            let progress = self.progress.clone();
            let topic = topic.clone();
            work.push(async move {
                let axes = oracle
                    .discover_axes(&topic, &sampled)
                    .await
                    .map_err(|e| e.in_scope(format!("topic {}", topic.id)))?;
                validate_strengths(&topic.id, &axes)?;
                progress.info(
                    STAGE_AXES,
                    format!("Topic {}: {} axes discovered", topic.id, axes.len()),
                );
                Ok::<_, PipelineError>((topic.id, axes))
            });
        }

        let report = executor
            .spawn_all(work)
            .drain(self.config.failure_policy, |(topic_id, axes)| {
                discovered.insert(topic_id, axes);
                Ok(())
            })
            .await?;
        diagnostics.record_failures(STAGE_AXES, report);

        for topic in topics {
            discovered.entry(topic.id.clone()).or_default();
        }

        // Only now that every branch is in can ids be rewritten.
        let (axes, renames) = namespace_axes(discovered);
        for (old, new) in &renames {
            tracing::debug!(provisional = %old, axis_id = %new, "Axis namespaced");
        }

        for (topic_id, topic_axes) in &axes {
            let Some(topic_opinions) = by_topic.get(topic_id) else {
                continue;
            };
            let known: HashSet<&str> = topic_opinions.iter().map(|o| o.id.as_str()).collect();
            for axis in topic_axes {
                let unresolved = unresolved_citations(&axis.reasoning, &known);
                if !unresolved.is_empty() {
                    tracing::debug!(axis_id = %axis.id, ?unresolved, "Axis cites opinions outside its topic");
                    diagnostics.unresolved_citations += unresolved.len();
                }
            }
        }

        tracing::info!(
            axes = renames.len(),
            skipped_topics = diagnostics.skipped_topics.len(),
            unresolved_citations = diagnostics.unresolved_citations,
            "Axis discovery complete"
        );

        Ok(axes)
    }

    // ------------------------------------------------------------------------
    // Stage 4: anchors and scores
    // ------------------------------------------------------------------------

    async fn anchor_and_score(
        &mut self,
        axes: &BTreeMap<String, Vec<Axis>>,
        by_topic: &HashMap<String, Arc<Vec<Opinion>>>,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<(BTreeMap<String, AnchorSet>, Vec<Score>)> {
        let executor = ParallelExecutor::new(self.config.workers);
        let score_workers = self.config.score_workers;
        let policy = self.config.failure_policy;

        tracing::info!(
            axes = axes.values().map(Vec::len).sum::<usize>(),
            workers = executor.workers(),
            score_workers,
            max_in_flight_calls = self.config.max_in_flight_calls(),
            "Generating anchors and scoring opinions"
        );

        let mut work = Vec::new();
        // Pairs per axis; whatever is left after draining never got a task outcome
        let mut pending = HashMap::new();
        for (topic_id, topic_axes) in axes {
            let Some(topic_opinions) = by_topic.get(topic_id) else {
                continue;
            };

            for axis in topic_axes {
                let anchor_sample =
                    sample(topic_opinions.as_slice(), self.config.anchor_sample_size, &mut self.rng);
                let score_batches = batches(topic_opinions.as_slice(), self.config.score_batch_size)?;
                let merger = ScoreMerger::new(topic_id, axis, topic_opinions.as_slice())?;
                pending.insert(axis.id.clone(), topic_opinions.len());

                let oracle = Arc::clone(&self.oracle);
                let progress = self.progress.clone();
                let axis = axis.clone();
                work.push(score_axis(
                    oracle,
                    progress,
                    axis,
                    anchor_sample,
                    score_batches,
                    merger,
                    score_workers,
                    policy,
                ));
            }
        }

        let mut anchors = BTreeMap::new();
        let mut scores = Vec::new();
        let mut stats = MergeStats::default();
        let mut missing = 0;
        let mut inner_failures = Vec::new();

        let report = executor
            .spawn_all(work)
            .drain(policy, |outcome| {
                stats.absorb(&outcome.stats);
                missing += outcome.missing;
                pending.remove(&outcome.axis_id);
                inner_failures.push((outcome.axis_id.clone(), outcome.report));
                anchors.insert(outcome.axis_id, outcome.anchors);
                scores.extend(outcome.scores);
                Ok(())
            })
            .await?;
        missing += pending.values().sum::<usize>();

        diagnostics.scoring = stats;
        diagnostics.missing_scores = missing;
        for (axis_id, inner) in inner_failures {
            diagnostics.record_failures(&format!("{STAGE_SCORE} {axis_id}"), inner);
        }
        diagnostics.record_failures(STAGE_ANCHORS, report);

        tracing::info!(
            scores = scores.len(),
            dropped = stats.dropped(),
            missing_scores = missing,
            "Scoring merged"
        );

        Ok((anchors, scores))
    }
}

/// Anchors for one axis, then its scoring batches on an inner pool.
#[allow(clippy::too_many_arguments)]
async fn score_axis(
    oracle: Arc<dyn Oracle>,
    progress: ProgressSink,
    axis: Axis,
    anchor_sample: Vec<Opinion>,
    score_batches: Vec<Batch<Opinion>>,
    mut merger: ScoreMerger,
    score_workers: usize,
    policy: divcon_common::FailurePolicy,
) -> Result<AxisOutcome> {
    let anchors = oracle
        .generate_anchors(&axis, &anchor_sample)
        .await
        .map_err(|e| e.in_scope(format!("axis {}", axis.id)))?;
    progress.info(
        STAGE_ANCHORS,
        format!(
            "Axis {}: {} left / {} right anchors",
            axis.id,
            anchors.left_anchors.len(),
            anchors.right_anchors.len()
        ),
    );

    let axis = Arc::new(axis);
    let shared_anchors = Arc::new(anchors);
    let mut work = Vec::with_capacity(score_batches.len());
    for batch in score_batches {
        let oracle = Arc::clone(&oracle);
        let axis = Arc::clone(&axis);
        let anchors = Arc::clone(&shared_anchors);
        let progress = progress.clone();
        work.push(async move {
            let label = batch.label();
            let records = oracle
                .score(&axis, &anchors, &batch.items)
                .await
                .map_err(|e| e.in_scope(format!("axis {} batch {label}", axis.id)))?;
            progress.info(
                STAGE_SCORE,
                format!("Axis {}: scored opinions {label}", axis.id),
            );
            Ok::<_, PipelineError>((batch_ids(&batch), records))
        });
    }

    let mut scores = Vec::new();
    let report = ParallelExecutor::new(score_workers)
        .spawn_all(work)
        .drain(policy, |(ids, records)| {
            scores.extend(merger.merge(&ids, records));
            Ok(())
        })
        .await?;

    let anchors = Arc::try_unwrap(shared_anchors).unwrap_or_else(|shared| (*shared).clone());
    Ok(AxisOutcome {
        axis_id: axis.id.clone(),
        anchors,
        scores,
        stats: merger.stats(),
        missing: merger.missing(),
        report,
    })
}

fn batch_ids(batch: &Batch<Opinion>) -> Vec<String> {
    batch.items.iter().map(|o| o.id.clone()).collect()
}

/// Classified opinions per topic, in input order.
fn group_by_topic(opinions: &[Opinion]) -> HashMap<String, Arc<Vec<Opinion>>> {
    let mut grouped: HashMap<String, Vec<Opinion>> = HashMap::new();
    for opinion in opinions {
        if let Some(topic_id) = &opinion.topic_id {
            grouped
                .entry(topic_id.clone())
                .or_default()
                .push(opinion.clone());
        }
    }
    grouped
        .into_iter()
        .map(|(topic_id, group)| (topic_id, Arc::new(group)))
        .collect()
}

fn validate_topics(topics: Vec<Topic>) -> Result<Vec<Topic>> {
    if topics.is_empty() {
        return Err(PipelineError::invalid_response(
            "discover_topics",
            "no topics returned",
        ));
    }

    let mut seen = HashSet::new();
    topics
        .into_iter()
        .map(|mut topic| {
            topic.id = topic.id.trim().to_string();
            if topic.id.is_empty() {
                return Err(PipelineError::invalid_response(
                    "discover_topics",
                    format!("topic '{}' has an empty id", topic.name),
                ));
            }
            if !seen.insert(topic.id.clone()) {
                return Err(PipelineError::invalid_response(
                    "discover_topics",
                    format!("duplicate topic id {}", topic.id),
                ));
            }
            Ok(topic)
        })
        .collect()
}

fn validate_strengths(topic_id: &str, axes: &[Axis]) -> Result<()> {
    match axes.iter().find(|a| !STRENGTH_RANGE.contains(&a.strength)) {
        Some(axis) => Err(PipelineError::invalid_response(
            "discover_axes",
            format!(
                "topic {topic_id}: axis '{}' has strength {} outside 1-5",
                axis.name, axis.strength
            ),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: &str) -> Topic {
        Topic {
            id: id.into(),
            name: format!("name {id}"),
            description: String::new(),
        }
    }

    #[test]
    fn test_validate_topics_rejects_empty_and_duplicates() {
        assert!(validate_topics(Vec::new()).unwrap_err().is_oracle_failure());
        assert!(validate_topics(vec![topic("T1"), topic(" T1 ")])
            .unwrap_err()
            .to_string()
            .contains("duplicate topic id T1"));
        assert!(validate_topics(vec![topic("  ")]).is_err());

        let topics = validate_topics(vec![topic(" T1"), topic("T2")]).unwrap();
        assert_eq!(topics[0].id, "T1");
    }

    #[test]
    fn test_validate_strengths() {
        let axis = |strength| Axis {
            id: "a".into(),
            name: "Pace".into(),
            left_pole: "slow".into(),
            right_pole: "fast".into(),
            strength,
            reasoning: String::new(),
        };
        assert!(validate_strengths("T1", &[axis(1), axis(5)]).is_ok());
        assert!(validate_strengths("T1", &[axis(3), axis(0)]).is_err());
        assert!(validate_strengths("T1", &[axis(6)]).is_err());
    }

    #[test]
    fn test_group_by_topic_keeps_input_order() {
        let mut opinions = vec![
            Opinion::new("1", "a"),
            Opinion::new("2", "b"),
            Opinion::new("3", "c"),
        ];
        opinions[0].topic_id = Some("T2".into());
        opinions[2].topic_id = Some("T2".into());

        let grouped = group_by_topic(&opinions);
        let ids: Vec<_> = grouped["T2"].iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(!grouped.contains_key("T1"));
    }
}
