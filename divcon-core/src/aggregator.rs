//! Distribution statistics over merged scores. Pure, no I/O.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Score;

/// Counts and moments of one set of scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreStatistics {
    /// Number of score records
    pub total: usize,
    /// Records carrying a score
    pub answered: usize,
    /// Records without a score (no position on the axis)
    pub no_answer: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Population standard deviation
    pub std_dev: Option<f64>,
    /// `buckets[i]` counts score `i + 1`
    pub buckets: [usize; 6],
}

impl ScoreStatistics {
    /// Count of a single score value (1..=6).
    pub fn bucket(&self, score: u8) -> usize {
        match score {
            1..=6 => self.buckets[usize::from(score - 1)],
            _ => 0,
        }
    }

    /// Scores 1 to 3.
    pub fn left_leaning(&self) -> usize {
        self.buckets[..3].iter().sum()
    }

    /// Scores 4 to 6.
    pub fn right_leaning(&self) -> usize {
        self.buckets[3..].iter().sum()
    }
}

/// Statistics over a whole score list.
pub fn aggregate<'a, I>(scores: I) -> ScoreStatistics
where
    I: IntoIterator<Item = &'a Score>,
{
    let mut stats = ScoreStatistics::default();
    let mut present: Vec<u8> = Vec::new();

    for score in scores {
        stats.total += 1;
        match score.score {
            Some(value @ 1..=6) => {
                stats.buckets[usize::from(value - 1)] += 1;
                present.push(value);
            }
            // The merger never lets out-of-range values through.
            _ => stats.no_answer += 1,
        }
    }

    stats.answered = present.len();
    if present.is_empty() {
        return stats;
    }

    let n = present.len() as f64;
    let mean = present.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = present
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;

    present.sort_unstable();
    let mid = present.len() / 2;
    let median = if present.len() % 2 == 0 {
        (f64::from(present[mid - 1]) + f64::from(present[mid])) / 2.0
    } else {
        f64::from(present[mid])
    };

    stats.mean = Some(mean);
    stats.median = Some(median);
    stats.std_dev = Some(variance.sqrt());
    stats
}

/// Statistics per axis id.
pub fn aggregate_by_axis(scores: &[Score]) -> BTreeMap<String, ScoreStatistics> {
    let mut grouped: BTreeMap<&str, Vec<&Score>> = BTreeMap::new();
    for score in scores {
        grouped.entry(score.axis_id.as_str()).or_default().push(score);
    }

    grouped
        .into_iter()
        .map(|(axis_id, group)| (axis_id.to_string(), aggregate(group)))
        .collect()
}
