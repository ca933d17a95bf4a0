//! Result persistence.
//!
//! One directory per run:
//!
//! | File | Content |
//! |---|---|
//! | `topics.json` | topics in discovery order |
//! | `axes.json` | topic id → namespaced axes |
//! | `anchors.json` | axis id → anchor set |
//! | `scores.csv` | one row per score, UTF-8 with BOM |
//! | `summary.txt` | human-readable statistics |

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use divcon_common::{Result, ResultExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::coordinator::AnalysisRun;
use crate::model::{AnchorSet, Axis, Score, Topic};

pub const TOPICS_FILE: &str = "topics.json";
pub const AXES_FILE: &str = "axes.json";
pub const ANCHORS_FILE: &str = "anchors.json";
pub const SCORES_FILE: &str = "scores.csv";
pub const SUMMARY_FILE: &str = "summary.txt";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Export order: axis id ascending, then score ascending, absent scores last.
///
/// The sort is stable, so ties keep their merge order.
pub fn sort_for_export(scores: &mut [Score]) {
    scores.sort_by(|a, b| {
        a.axis_id
            .cmp(&b.axis_id)
            .then_with(|| match (a.score, b.score) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
}

/// Writes the artifacts of a run into one directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every artifact of `run`, with `summary` as the summary text.
    ///
    /// Returns the written paths.
    pub fn write_run(&self, run: &AnalysisRun, summary: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .context(format!("Failed to create output directory {}", self.dir.display()))?;

        let written = vec![
            self.write_topics(&run.topics)?,
            self.write_axes(&run.axes)?,
            self.write_anchors(&run.anchors)?,
            self.write_scores(&run.scores)?,
            self.write_summary(summary)?,
        ];

        tracing::info!(dir = %self.dir.display(), files = written.len(), "Results saved");
        Ok(written)
    }

    pub fn write_topics(&self, topics: &[Topic]) -> Result<PathBuf> {
        self.write_json(TOPICS_FILE, topics)
    }

    pub fn write_axes(&self, axes: &BTreeMap<String, Vec<Axis>>) -> Result<PathBuf> {
        self.write_json(AXES_FILE, axes)
    }

    pub fn write_anchors(&self, anchors: &BTreeMap<String, AnchorSet>) -> Result<PathBuf> {
        self.write_json(ANCHORS_FILE, anchors)
    }

    /// Write scores in export order.
    pub fn write_scores(&self, scores: &[Score]) -> Result<PathBuf> {
        let path = self.dir.join(SCORES_FILE);
        let mut sorted = scores.to_vec();
        sort_for_export(&mut sorted);

        let mut file = std::fs::File::create(&path)
            .context(format!("Failed to create {}", path.display()))?;
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::Writer::from_writer(file);
        if sorted.is_empty() {
            writer.write_record(SCORE_COLUMNS)?;
        }
        for score in &sorted {
            writer.serialize(score)?;
        }
        writer.flush()?;

        Ok(path)
    }

    pub fn write_summary(&self, summary: &str) -> Result<PathBuf> {
        let path = self.dir.join(SUMMARY_FILE);
        std::fs::write(&path, summary).context(format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, content).context(format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Header of `scores.csv`; matches the field order of [`Score`].
const SCORE_COLUMNS: [&str; 8] = [
    "opinion_id",
    "comment",
    "topic_id",
    "axis_id",
    "axis_name",
    "score",
    "excerpt",
    "reasoning",
];

/// Artifacts read back from an output directory.
#[derive(Debug, Clone)]
pub struct SavedResults {
    pub topics: Vec<Topic>,
    pub axes: BTreeMap<String, Vec<Axis>>,
    pub scores: Vec<Score>,
}

/// Reload topics, axes and scores written by [`ResultWriter`].
pub fn load_results(dir: &Path) -> Result<SavedResults> {
    let topics = read_json(&dir.join(TOPICS_FILE))?;
    let axes = read_json(&dir.join(AXES_FILE))?;

    let path = dir.join(SCORES_FILE);
    let bytes = std::fs::read(&path).context(format!("Failed to read {}", path.display()))?;
    let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
    let scores = csv::Reader::from_reader(content)
        .deserialize()
        .collect::<std::result::Result<Vec<Score>, _>>()
        .context(format!("Failed to parse {}", path.display()))?;

    Ok(SavedResults {
        topics,
        axes,
        scores,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(opinion_id: &str, axis_id: &str, value: Option<u8>) -> Score {
        Score {
            opinion_id: opinion_id.into(),
            comment: format!("comment {opinion_id}"),
            topic_id: "T1".into(),
            axis_id: axis_id.into(),
            axis_name: "Pace".into(),
            score: value,
            excerpt: String::new(),
            reasoning: "because".into(),
        }
    }

    fn order(scores: &[Score]) -> Vec<(&str, Option<u8>)> {
        scores
            .iter()
            .map(|s| (s.opinion_id.as_str(), s.score))
            .collect()
    }

    #[test]
    fn test_absent_scores_sort_last() {
        let mut scores = vec![
            score("A", "T1_A1", None),
            score("B", "T1_A1", Some(3)),
            score("C", "T1_A1", Some(1)),
        ];
        sort_for_export(&mut scores);
        assert_eq!(order(&scores), vec![("C", Some(1)), ("B", Some(3)), ("A", None)]);
    }

    #[test]
    fn test_sort_groups_by_axis_and_is_stable() {
        let mut scores = vec![
            score("1", "T2_A1", Some(2)),
            score("2", "T1_A2", None),
            score("3", "T1_A2", Some(5)),
            score("4", "T1_A2", Some(5)),
            score("5", "T1_A1", Some(6)),
        ];
        sort_for_export(&mut scores);
        let ids: Vec<_> = scores.iter().map(|s| s.opinion_id.as_str()).collect();
        assert_eq!(ids, vec!["5", "3", "4", "2", "1"]);
    }

    #[test]
    fn test_scores_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());
        let path = writer
            .write_scores(&[score("A", "T1_A1", None), score("B", "T1_A1", Some(4))])
            .unwrap();

        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "opinion_id,comment,topic_id,axis_id,axis_name,score,excerpt,reasoning"
        );
        assert_eq!(lines[1], "B,comment B,T1,T1_A1,Pace,4,,because");
        assert_eq!(lines[2], "A,comment A,T1,T1_A1,Pace,,,because");
    }

    #[test]
    fn test_empty_scores_still_have_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = ResultWriter::new(dir.path()).write_scores(&[]).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.trim_start_matches('\u{feff}').starts_with("opinion_id,comment"));
    }

    #[test]
    fn test_written_results_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let topics = vec![Topic {
            id: "T1".into(),
            name: "Transport".into(),
            description: "Getting around".into(),
        }];
        let mut axes = BTreeMap::new();
        axes.insert(
            "T1".to_string(),
            vec![Axis {
                id: "T1_A1".into(),
                name: "Pace".into(),
                left_pole: "slow".into(),
                right_pole: "fast".into(),
                strength: 3,
                reasoning: "[ID:A]".into(),
            }],
        );

        writer.write_topics(&topics).unwrap();
        writer.write_axes(&axes).unwrap();
        writer
            .write_scores(&[score("A", "T1_A1", Some(2)), score("B", "T1_A1", None)])
            .unwrap();

        let loaded = load_results(dir.path()).unwrap();
        assert_eq!(loaded.topics, topics);
        assert_eq!(loaded.axes, axes);
        assert_eq!(loaded.scores.len(), 2);
        assert_eq!(loaded.scores[0].score, Some(2));
        assert_eq!(loaded.scores[1].score, None);
        assert_eq!(loaded.scores[1].comment, "comment B");
    }

    #[test]
    fn test_load_results_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_results(dir.path()).unwrap_err();
        assert!(err.to_string().contains(TOPICS_FILE));
    }
}
