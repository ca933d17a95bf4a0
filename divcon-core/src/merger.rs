//! Fan-in merge of oracle records onto the canonical entity set.
//!
//! Every record must resolve inside the key space of the call that produced
//! it. Records that don't are dropped and counted by reason; they never turn
//! into errors. Mergers are owned by the task draining a [`Completions`] and
//! are never shared, so they need no locking.
//!
//! [`Completions`]: crate::executor::Completions

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::model::{Axis, Classification, Opinion, Score, ScoreRecord, Topic, SCORE_RANGE};
use crate::namespacer;

/// Accepted and dropped record counts for one merge scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub accepted: usize,
    /// Opinion id not part of the batch that was sent
    pub unknown_opinion: usize,
    /// Topic id not among the discovered topics
    pub unknown_topic: usize,
    /// Opinion already classified, or already scored on this axis
    pub duplicate: usize,
    /// Score present but outside 1..=6
    pub out_of_range: usize,
}

impl MergeStats {
    /// Total number of dropped records.
    pub fn dropped(&self) -> usize {
        self.unknown_opinion + self.unknown_topic + self.duplicate + self.out_of_range
    }

    /// Add another scope's counters to this one.
    pub fn absorb(&mut self, other: &MergeStats) {
        self.accepted += other.accepted;
        self.unknown_opinion += other.unknown_opinion;
        self.unknown_topic += other.unknown_topic;
        self.duplicate += other.duplicate;
        self.out_of_range += other.out_of_range;
    }
}

fn batch_key_space(batch_ids: &[String]) -> HashSet<&str> {
    batch_ids.iter().map(String::as_str).collect()
}

// ============================================================================
// Classification
// ============================================================================

/// Applies classification records onto the opinion collection.
///
/// Each opinion's `topic_id` is set at most once; the first record wins.
#[derive(Debug)]
pub struct ClassificationMerger {
    index: HashMap<String, usize>,
    topic_ids: HashSet<String>,
    stats: MergeStats,
}

impl ClassificationMerger {
    pub fn new(opinions: &[Opinion], topics: &[Topic]) -> Self {
        Self {
            index: opinions
                .iter()
                .enumerate()
                .map(|(i, o)| (o.id.clone(), i))
                .collect(),
            topic_ids: topics.iter().map(|t| t.id.clone()).collect(),
            stats: MergeStats::default(),
        }
    }

    /// Merge one batch's records. `batch_ids` are the opinion ids that were
    /// sent in that batch.
    pub fn merge(
        &mut self,
        opinions: &mut [Opinion],
        batch_ids: &[String],
        records: Vec<Classification>,
    ) {
        let in_batch = batch_key_space(batch_ids);

        for record in records {
            let opinion_id = record.opinion_id.trim();
            let topic_id = record.topic_id.trim();

            let Some(&idx) = self
                .index
                .get(opinion_id)
                .filter(|_| in_batch.contains(opinion_id))
            else {
                tracing::debug!(opinion_id, "Dropping classification for unknown opinion");
                self.stats.unknown_opinion += 1;
                continue;
            };

            if !self.topic_ids.contains(topic_id) {
                tracing::debug!(opinion_id, topic_id, "Dropping classification for unknown topic");
                self.stats.unknown_topic += 1;
                continue;
            }

            let opinion = &mut opinions[idx];
            if opinion.topic_id.is_some() {
                self.stats.duplicate += 1;
                continue;
            }

            opinion.topic_id = Some(topic_id.to_string());
            self.stats.accepted += 1;
        }
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }
}

/// Opinions that no batch response ever mentioned.
pub fn unclassified(opinions: &[Opinion]) -> usize {
    opinions.iter().filter(|o| o.topic_id.is_none()).count()
}

// ============================================================================
// Scoring
// ============================================================================

/// Turns scoring records for one axis into validated [`Score`]s.
#[derive(Debug)]
pub struct ScoreMerger {
    topic_id: String,
    axis_id: String,
    axis_name: String,
    comments: HashMap<String, String>,
    scored: HashSet<String>,
    stats: MergeStats,
}

impl ScoreMerger {
    /// Build the merger for `axis`, scored against the opinions of `topic_id`.
    ///
    /// Fails when the axis id does not belong to the topic: such a score
    /// would reference an axis outside its topic's axis set.
    pub fn new(topic_id: &str, axis: &Axis, topic_opinions: &[Opinion]) -> Result<Self> {
        if !namespacer::belongs_to(&axis.id, topic_id) {
            return Err(PipelineError::Internal(format!(
                "axis {} is not namespaced under topic {topic_id}",
                axis.id
            )));
        }

        Ok(Self {
            topic_id: topic_id.to_string(),
            axis_id: axis.id.clone(),
            axis_name: axis.name.clone(),
            comments: topic_opinions
                .iter()
                .map(|o| (o.id.clone(), o.comment.clone()))
                .collect(),
            scored: HashSet::new(),
            stats: MergeStats::default(),
        })
    }

    /// Validate one batch's records and return the accepted scores.
    pub fn merge(&mut self, batch_ids: &[String], records: Vec<ScoreRecord>) -> Vec<Score> {
        let in_batch = batch_key_space(batch_ids);
        let mut accepted = Vec::with_capacity(records.len());

        for record in records {
            let opinion_id = record.opinion_id.trim();

            let Some(comment) = self
                .comments
                .get(opinion_id)
                .filter(|_| in_batch.contains(opinion_id))
            else {
                tracing::debug!(opinion_id, axis_id = %self.axis_id, "Dropping score for unknown opinion");
                self.stats.unknown_opinion += 1;
                continue;
            };

            if self.scored.contains(opinion_id) {
                self.stats.duplicate += 1;
                continue;
            }

            let score = match record.score {
                None => None,
                Some(raw) => match u8::try_from(raw) {
                    Ok(value) if SCORE_RANGE.contains(&value) => Some(value),
                    _ => {
                        tracing::debug!(opinion_id, raw, axis_id = %self.axis_id, "Dropping out-of-range score");
                        self.stats.out_of_range += 1;
                        continue;
                    }
                },
            };

            self.scored.insert(opinion_id.to_string());
            self.stats.accepted += 1;
            accepted.push(Score {
                opinion_id: opinion_id.to_string(),
                comment: comment.clone(),
                topic_id: self.topic_id.clone(),
                axis_id: self.axis_id.clone(),
                axis_name: self.axis_name.clone(),
                score,
                excerpt: record.excerpt,
                reasoning: record.reasoning,
            });
        }

        accepted
    }

    /// Topic opinions that have no score record on this axis yet.
    pub fn missing(&self) -> usize {
        self.comments.len() - self.scored.len()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }
}
