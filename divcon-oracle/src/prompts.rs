//! Prompt templates for the five oracle operations.
//!
//! Opinions are always rendered as `[<id>] <comment>` so the model can quote
//! ids back. Every template spells out the exact JSON shape expected.

use divcon_common::util::single_line;
use divcon_core::{AnchorSet, Axis, Opinion, Topic};

/// A system + user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn render_opinions(opinions: &[Opinion], separator: &str) -> String {
    opinions
        .iter()
        .map(|o| format!("[{}] {}", o.id, single_line(&o.comment)))
        .collect::<Vec<_>>()
        .join(separator)
}

fn render_anchors(prefix: char, anchors: &[String]) -> String {
    anchors
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{prefix}{}. {a}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn discover_topics(sample: &[Opinion]) -> Prompt {
    Prompt {
        system: "You are an expert analyst of public comments. Read the opinions and extract \
                 the main topics they discuss."
            .into(),
        user: format!(
            r#"Below are opinions submitted by members of the public.

Analyze them and extract the main topics (subjects of discussion).

[Opinions]
{opinions}

[Instructions]
1. Identify the main topics discussed in these opinions.
2. Decide the best number of topics yourself (3-7 is recommended).
3. Give each topic a short id (T1, T2, ...), a clear name and a description.

Reply with a JSON object only:
{{"topics": [{{"id": "T1", "name": "...", "description": "..."}}], "reasoning": "why these topics"}}"#,
            opinions = render_opinions(sample, "\n\n"),
        ),
    }
}

pub fn classify(topics: &[Topic], batch: &[Opinion]) -> Prompt {
    let topics_text = topics
        .iter()
        .map(|t| format!("[{}] {}: {}", t.id, t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: "Classify each opinion into the most appropriate topic. Use only the ids you \
                 are given."
            .into(),
        user: format!(
            r#"These topics are defined:

{topics_text}

Classify each of the following opinions into the most appropriate topic:

{opinions}

IMPORTANT: opinion_id and topic_id must be ids that appear in the lists above.

Reply with a JSON object only:
{{"classifications": [{{"opinion_id": "...", "topic_id": "..."}}]}}"#,
            opinions = render_opinions(batch, "\n"),
        ),
    }
}

pub fn discover_axes(topic: &Topic, sample: &[Opinion]) -> Prompt {
    Prompt {
        system: "You are an expert in analyzing the structure of disagreements.".into(),
        user: format!(
            r#"Below are public opinions on the topic "{name}".

{opinions}

[Task]
Find the axes along which people in this group of opinions disagree.

An axis of disagreement is:
- a dimension along which opinions are polarized
- an issue that forces a choice between A and B
- e.g. "Environmental protection vs economic growth", "Short-term gains vs long-term sustainability"

[Instructions]
1. Extract 2-4 main axes.
2. Give each axis a clear name in the form "A vs B", and name its left and right pole.
3. Rate the strength of the disagreement from 1 to 5:
   - 5: very strong (opinions are completely polarized)
   - 4: strong
   - 3: moderate
   - 2: slight
   - 1: weak
4. IMPORTANT: whenever the reasoning refers to a specific opinion, cite it as [ID:<id>].
   - Correct: "[ID:123] argues for faster expansion"
   - Correct: "[ID:456] represents the left pole and [ID:789] the right pole"
   - Wrong: "opinion 123 says...", "ID123 argues...", "comment [123]"

Reply with a JSON object only:
{{"axes": [{{"id": "A1", "name": "A vs B", "left_pole": "A", "right_pole": "B", "strength": 3, "reasoning": "..."}}]}}"#,
            name = topic.name,
            opinions = render_opinions(sample, "\n\n"),
        ),
    }
}

pub fn generate_anchors(axis: &Axis, sample: &[Opinion]) -> Prompt {
    Prompt {
        system: "Generate diverse, extreme statements. Use uncompromising, assertive language."
            .into(),
        user: format!(
            r#"Using the public opinions below as reference, write examples of extremely strong statements on the axis "{name}".

[Existing opinions (reference)]
{opinions}

[Task]
- Write 10 extreme statements for the LEFT pole ({left}).
- Write 10 extreme statements for the RIGHT pole ({right}).

[Example]
For the axis "Environmental protection vs economic growth":

Left pole (environmental protection):
- "Economic growth must stop entirely if that is what it takes to protect the environment."
- "Every business activity must be regulated immediately and nature restored to its original state."

Right pole (economic growth):
- "All environmental regulation should be abolished to maximize growth."
- "Industrial competitiveness comes first, whatever the environmental cost."

[Key points]
1. Keep the context of the existing opinions but make the wording more extreme.
2. Use strong words such as "completely", "all", "absolutely", "immediately".
3. No compromise and no conditions: every statement must be categorical.
4. Each statement should express extremity from a different angle.
5. Avoid repeating the same claim.

Reply with a JSON object only:
{{"left_anchors": ["..."], "right_anchors": ["..."]}}"#,
            name = axis.name,
            left = axis.left_pole,
            right = axis.right_pole,
            opinions = render_opinions(sample, "\n\n"),
        ),
    }
}

pub fn score(axis: &Axis, anchors: &AnchorSet, batch: &[Opinion]) -> Prompt {
    Prompt {
        system: "Score the opinions using the anchors as reference.".into(),
        user: format!(
            r#"Score the opinions below against the reference anchors.

[Axis] {name}
- Left pole (score 1): {left}
- Right pole (score 6): {right}

[Left pole anchors] (equivalent to score 1)
{left_anchors}

[Right pole anchors] (equivalent to score 6)
{right_anchors}

[Opinions to score]
{opinions}

[Task]
First decide whether each opinion takes a position on this axis:
- If it clearly takes a position, give it a score from 1 to 6.
- If it does not address the axis at all, or its position cannot be determined, set "score" to null.

Score meanings (there is no neutral midpoint):
- 1: left pole, very close to the left anchors
- 2: leaning left (strong), close to the left pole with some reservations
- 3: leaning left (weak), left of centre but moderate
- 4: leaning right (weak), right of centre but moderate
- 5: leaning right (strong), close to the right pole with some reservations
- 6: right pole, very close to the right anchors

"excerpt":
- When scored: quote the key passage(s) of the opinion that justify the score, verbatim, roughly 50-150 characters; summarize if it is long.
- When the score is null: use an empty string.

IMPORTANT: do not force a score on an opinion that does not address the axis; use null.

Reply with a JSON object only, one entry per opinion:
{{"scores": [{{"opinion_id": "...", "score": 3, "excerpt": "...", "reasoning": "..."}}]}}"#,
            name = axis.name,
            left = axis.left_pole,
            right = axis.right_pole,
            left_anchors = render_anchors('L', &anchors.left_anchors),
            right_anchors = render_anchors('R', &anchors.right_anchors),
            opinions = render_opinions(batch, "\n\n"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opinions() -> Vec<Opinion> {
        vec![
            Opinion::new("12", "Restart the reactors"),
            Opinion::new("40", "Solar on every roof"),
        ]
    }

    fn axis() -> Axis {
        Axis {
            id: "T1_A1".into(),
            name: "Nuclear vs renewables".into(),
            left_pole: "Nuclear".into(),
            right_pole: "Renewables".into(),
            strength: 4,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_opinions_are_rendered_with_ids() {
        let prompt = discover_topics(&opinions());
        assert!(prompt
            .user
            .contains("[12] Restart the reactors\n\n[40] Solar on every roof"));
        assert!(prompt.user.contains(r#"{"topics": [{"id": "T1""#));
    }

    #[test]
    fn test_multiline_comments_are_flattened() {
        let prompt = classify(&[], &[Opinion::new("3", "First line\n\n  second   line")]);
        assert!(prompt.user.contains("[3] First line second line\n"));
    }

    #[test]
    fn test_classify_lists_topics() {
        let topics = vec![Topic {
            id: "T1".into(),
            name: "Energy mix".into(),
            description: "Sources of electricity".into(),
        }];
        let prompt = classify(&topics, &opinions());
        assert!(prompt.user.contains("[T1] Energy mix: Sources of electricity"));
        assert!(prompt.user.contains("[12] Restart the reactors\n[40] Solar on every roof"));
    }

    #[test]
    fn test_axes_prompt_demands_citations() {
        let topic = Topic {
            id: "T1".into(),
            name: "Energy mix".into(),
            description: String::new(),
        };
        let prompt = discover_axes(&topic, &opinions());
        assert!(prompt.user.contains(r#"on the topic "Energy mix""#));
        assert!(prompt.user.contains("[ID:<id>]"));
    }

    #[test]
    fn test_score_prompt_numbers_anchors() {
        let anchors = AnchorSet {
            left_anchors: vec!["Only nuclear".into(), "Ban wind farms".into()],
            right_anchors: vec!["Close every reactor now".into()],
        };
        let prompt = score(&axis(), &anchors, &opinions());

        assert!(prompt.user.contains("L1. Only nuclear\nL2. Ban wind farms"));
        assert!(prompt.user.contains("R1. Close every reactor now"));
        assert!(prompt.user.contains("Right pole (score 6): Renewables"));
    }

    #[test]
    fn test_anchor_prompt_names_poles() {
        let prompt = generate_anchors(&axis(), &opinions());
        assert!(prompt.user.contains("LEFT pole (Nuclear)"));
        assert!(prompt.user.contains("RIGHT pole (Renewables)"));
    }
}
