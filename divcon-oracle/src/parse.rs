//! Reply parsing: locate the JSON object in the model's text and decode it.
//!
//! Models are asked for bare JSON but sometimes wrap it in a fenced block or
//! surround it with prose. Opinion and topic ids may come back as numbers
//! when the input ids look numeric; they are normalized to strings here.

use divcon_core::{
    AnchorSet, Axis, Classification, PipelineError, Result, ScoreRecord, Topic, TopicDiscovery,
};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Find the JSON object in `content`: a ```json fenced block first, then the
/// first balanced `{...}`.
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(start) = content.find("```json") {
        let start = start + "```json".len();
        if let Some(end) = content[start..].find("```") {
            return Some(content[start..start + end].trim());
        }
    }

    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and decode a reply for `operation`.
pub fn parse_reply<T: DeserializeOwned>(operation: &'static str, content: &str) -> Result<T> {
    let json = extract_json(content)
        .ok_or_else(|| PipelineError::invalid_response(operation, "no JSON object in reply"))?;
    serde_json::from_str(json)
        .map_err(|e| PipelineError::invalid_response(operation, format!("malformed JSON: {e}")))
}

// ============================================================================
// Lenient field decoders
// ============================================================================

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s.trim().to_string()),
        // `12.0` names opinion "12"
        Value::Number(n) => Ok(match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 => (f as i64).to_string(),
            _ => n.to_string(),
        }),
        other => Err(D::Error::custom(format!(
            "expected a string or numeric id, got {other}"
        ))),
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_score<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::String(ref s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("null") => {
            Ok(None)
        }
        ref v => integer(v)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an integer score, got {v}"))),
    }
}

fn lenient_strength<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u8, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let raw = integer(&value)
        .ok_or_else(|| D::Error::custom(format!("expected an integer strength, got {value}")))?;
    // Out-of-range values are rejected by the coordinator; 0 is never valid.
    Ok(u8::try_from(raw).unwrap_or(0))
}

// ============================================================================
// Reply shapes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TopicsReply {
    pub topics: Vec<TopicEntry>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
pub struct TopicEntry {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<TopicsReply> for TopicDiscovery {
    fn from(reply: TopicsReply) -> Self {
        Self {
            topics: reply
                .topics
                .into_iter()
                .map(|t| Topic {
                    id: t.id,
                    name: t.name,
                    description: t.description,
                })
                .collect(),
            reasoning: reply.reasoning,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassificationsReply {
    pub classifications: Vec<ClassificationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ClassificationEntry {
    #[serde(deserialize_with = "lenient_id")]
    pub opinion_id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub topic_id: String,
}

impl From<ClassificationsReply> for Vec<Classification> {
    fn from(reply: ClassificationsReply) -> Self {
        reply
            .classifications
            .into_iter()
            .map(|c| Classification {
                opinion_id: c.opinion_id,
                topic_id: c.topic_id,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct AxesReply {
    pub axes: Vec<AxisEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AxisEntry {
    /// Provisional; replaced once the topic round is done
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    pub name: String,
    pub left_pole: String,
    pub right_pole: String,
    #[serde(deserialize_with = "lenient_strength")]
    pub strength: u8,
    #[serde(default)]
    pub reasoning: String,
}

impl From<AxesReply> for Vec<Axis> {
    fn from(reply: AxesReply) -> Self {
        reply
            .axes
            .into_iter()
            .map(|a| Axis {
                id: a.id,
                name: a.name,
                left_pole: a.left_pole,
                right_pole: a.right_pole,
                strength: a.strength,
                reasoning: a.reasoning,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct AnchorsReply {
    #[serde(default)]
    pub left_anchors: Vec<String>,
    #[serde(default)]
    pub right_anchors: Vec<String>,
}

impl From<AnchorsReply> for AnchorSet {
    fn from(reply: AnchorsReply) -> Self {
        Self {
            left_anchors: reply.left_anchors,
            right_anchors: reply.right_anchors,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScoresReply {
    pub scores: Vec<ScoreEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreEntry {
    #[serde(deserialize_with = "lenient_id")]
    pub opinion_id: String,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<i64>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub reasoning: String,
}

impl From<ScoresReply> for Vec<ScoreRecord> {
    fn from(reply: ScoresReply) -> Self {
        reply
            .scores
            .into_iter()
            .map(|s| ScoreRecord {
                opinion_id: s.opinion_id,
                score: s.score,
                excerpt: s.excerpt,
                reasoning: s.reasoning,
            })
            .collect()
    }
}
