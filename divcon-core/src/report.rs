//! Plain-text statistics summary (`summary.txt`).

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use crate::aggregator::{aggregate, aggregate_by_axis, ScoreStatistics};
use crate::coordinator::{AnalysisRun, RunDiagnostics};
use crate::merger::MergeStats;
use crate::model::{score_label, Axis, Score, Topic};

const RULE_WIDTH: usize = 60;

/// Renders the summary of a finished or reloaded run.
#[derive(Debug, Clone, Copy)]
pub struct SummaryReport<'a> {
    opinion_count: usize,
    topics: &'a [Topic],
    axes: &'a BTreeMap<String, Vec<Axis>>,
    scores: &'a [Score],
    diagnostics: Option<&'a RunDiagnostics>,
}

impl<'a> SummaryReport<'a> {
    pub fn new(
        opinion_count: usize,
        topics: &'a [Topic],
        axes: &'a BTreeMap<String, Vec<Axis>>,
        scores: &'a [Score],
    ) -> Self {
        Self {
            opinion_count,
            topics,
            axes,
            scores,
            diagnostics: None,
        }
    }

    /// Summary of a run, including its diagnostics.
    pub fn from_run(run: &'a AnalysisRun) -> Self {
        Self::new(run.opinions.len(), &run.topics, &run.axes, &run.scores)
            .with_diagnostics(&run.diagnostics)
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a RunDiagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "DivCon Analysis Summary")?;
        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(out)?;

        let axis_count: usize = self.axes.values().map(Vec::len).sum();
        writeln!(out, "Opinions: {}", self.opinion_count)?;
        writeln!(out, "Topics: {}", self.topics.len())?;
        writeln!(out, "Axes: {axis_count}")?;
        writeln!(out, "Scores: {}", self.scores.len())?;
        if let Some(diagnostics) = self.diagnostics {
            writeln!(out, "Unclassified opinions: {}", diagnostics.unclassified)?;
        }
        writeln!(out)?;

        writeln!(out, "Topics:")?;
        for topic in self.topics {
            writeln!(out, "  - [{}] {}", topic.id, topic.name)?;
        }
        writeln!(out)?;

        writeln!(out, "Axes:")?;
        for (topic_id, axes) in self.axes {
            let topic_name = self
                .topics
                .iter()
                .find(|t| &t.id == topic_id)
                .map_or(topic_id.as_str(), |t| t.name.as_str());
            writeln!(out, "  Topic: {topic_name}")?;
            for axis in axes {
                writeln!(
                    out,
                    "    - [{}] {} (strength {}/5 - {})",
                    axis.id,
                    axis.name,
                    axis.strength,
                    axis.strength_label()
                )?;
            }
        }
        writeln!(out)?;

        if !self.scores.is_empty() {
            writeln!(out, "Score distribution:")?;
            write_distribution(out, &aggregate(self.scores))?;
            writeln!(out)?;

            writeln!(out, "Per-axis distribution:")?;
            for (axis_id, stats) in aggregate_by_axis(self.scores) {
                writeln!(out, "  [{axis_id}] {}", axis_line(&stats))?;
            }
            writeln!(out)?;
        }

        if let Some(diagnostics) = self.diagnostics {
            write_diagnostics(out, diagnostics)?;
        }

        Ok(())
    }
}

impl fmt::Display for SummaryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn write_distribution(out: &mut String, stats: &ScoreStatistics) -> fmt::Result {
    if let (Some(mean), Some(median), Some(std_dev)) = (stats.mean, stats.median, stats.std_dev) {
        writeln!(out, "  Mean: {mean:.2}")?;
        writeln!(out, "  Median: {median:.1}")?;
        writeln!(out, "  Std dev: {std_dev:.2}")?;
        writeln!(out, "  Left-leaning (1-3): {}", stats.left_leaning())?;
        for score in 1..=3 {
            writeln!(out, "    - {} ({score}): {}", score_label(score), stats.bucket(score))?;
        }
        writeln!(out, "  Right-leaning (4-6): {}", stats.right_leaning())?;
        for score in 4..=6 {
            writeln!(out, "    - {} ({score}): {}", score_label(score), stats.bucket(score))?;
        }
    }
    if stats.no_answer > 0 {
        writeln!(out, "  No position: {}", stats.no_answer)?;
    }
    Ok(())
}

fn axis_line(stats: &ScoreStatistics) -> String {
    let moments = match (stats.mean, stats.median, stats.std_dev) {
        (Some(mean), Some(median), Some(std_dev)) => {
            format!("mean={mean:.2} median={median:.1} std={std_dev:.2}")
        }
        _ => "mean=- median=- std=-".to_string(),
    };
    format!(
        "n={} {moments} left={} right={} none={}",
        stats.total,
        stats.left_leaning(),
        stats.right_leaning(),
        stats.no_answer
    )
}

fn drop_line(stats: &MergeStats) -> String {
    format!(
        "{} (unknown opinion {}, unknown topic {}, duplicate {}, out of range {})",
        stats.dropped(),
        stats.unknown_opinion,
        stats.unknown_topic,
        stats.duplicate,
        stats.out_of_range
    )
}

fn write_diagnostics(out: &mut String, diagnostics: &RunDiagnostics) -> fmt::Result {
    writeln!(out, "Diagnostics:")?;
    writeln!(
        out,
        "  Dropped classification records: {}",
        drop_line(&diagnostics.classification)
    )?;
    writeln!(out, "  Dropped score records: {}", drop_line(&diagnostics.scoring))?;
    writeln!(out, "  Opinion/axis pairs without a score: {}", diagnostics.missing_scores)?;
    writeln!(out, "  Unresolved citations: {}", diagnostics.unresolved_citations)?;
    if !diagnostics.skipped_topics.is_empty() {
        writeln!(
            out,
            "  Skipped topics: {}",
            diagnostics.skipped_topics.join(", ")
        )?;
    }
    if !diagnostics.failures.is_empty() {
        writeln!(out, "  Failed work items: {}", diagnostics.failures.len())?;
        for failure in &diagnostics.failures {
            writeln!(out, "    - {failure}")?;
        }
    }
    Ok(())
}
