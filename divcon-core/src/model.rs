//! Data model shared by every stage.
//!
//! Field order on [`Score`] is the column order of the `scores.csv` export.

use serde::{Deserialize, Serialize};

/// Lowest and highest stance score.
pub const SCORE_RANGE: std::ops::RangeInclusive<u8> = 1..=6;

/// Lowest and highest axis strength.
pub const STRENGTH_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

// ============================================================================
// Opinions & Topics
// ============================================================================

/// A free-text opinion from the input corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    /// Externally assigned, unique identifier
    pub id: String,
    pub comment: String,
    /// Set once during classification; `None` means unclassified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
}

impl Opinion {
    pub fn new(id: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            comment: comment.into(),
            topic_id: None,
        }
    }
}

/// A discovered subject area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Topics returned by discovery, with the oracle's rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDiscovery {
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub reasoning: String,
}

/// One classification record as returned by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub opinion_id: String,
    pub topic_id: String,
}

// ============================================================================
// Axes & Anchors
// ============================================================================

/// A bipolar dimension of disagreement within a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    /// Provisional until namespaced, then `<topic_id>_A<n>`
    pub id: String,
    pub name: String,
    pub left_pole: String,
    pub right_pole: String,
    /// 1 (weak) to 5 (very strong)
    pub strength: u8,
    /// Rationale; cites opinions as `[ID:<opinion id>]`
    pub reasoning: String,
}

impl Axis {
    /// Human-readable label for the strength rating.
    pub fn strength_label(&self) -> &'static str {
        strength_label(self.strength)
    }
}

/// Label for an axis strength rating.
pub fn strength_label(strength: u8) -> &'static str {
    match strength {
        1 => "weak",
        2 => "slight",
        3 => "moderate",
        4 => "strong",
        5 => "very strong",
        _ => "unknown",
    }
}

/// Extreme exemplar statements for both poles of one axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSet {
    pub left_anchors: Vec<String>,
    pub right_anchors: Vec<String>,
}

// ============================================================================
// Scores
// ============================================================================

/// One scoring record as returned by the oracle, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub opinion_id: String,
    /// Raw value; anything outside 1..=6 is dropped by the merger
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub reasoning: String,
}

/// A validated stance score of one opinion on one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub opinion_id: String,
    /// Copy of the opinion text for downstream consumers
    pub comment: String,
    pub topic_id: String,
    pub axis_id: String,
    pub axis_name: String,
    /// `None` when the opinion does not take a position on the axis
    pub score: Option<u8>,
    pub excerpt: String,
    pub reasoning: String,
}

/// Label for a stance score.
pub fn score_label(score: u8) -> &'static str {
    match score {
        1 => "left pole",
        2 => "leaning left (strong)",
        3 => "leaning left (weak)",
        4 => "leaning right (weak)",
        5 => "leaning right (strong)",
        6 => "right pole",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(strength_label(5), "very strong");
        assert_eq!(strength_label(0), "unknown");
        assert_eq!(score_label(1), "left pole");
        assert_eq!(score_label(6), "right pole");
    }

    #[test]
    fn test_opinion_serializes_without_topic_until_classified() {
        let mut opinion = Opinion::new("12", "Keep nuclear plants running");
        let json = serde_json::to_value(&opinion).unwrap();
        assert!(json.get("topic_id").is_none());

        opinion.topic_id = Some("T1".into());
        let json = serde_json::to_value(&opinion).unwrap();
        assert_eq!(json["topic_id"], "T1");
    }

    #[test]
    fn test_score_record_tolerates_missing_fields() {
        let record: ScoreRecord =
            serde_json::from_str(r#"{ "opinion_id": "7", "score": null }"#).unwrap();
        assert_eq!(record.score, None);
        assert!(record.excerpt.is_empty());
    }
}
