//! Hierarchical axis identifiers.
//!
//! Axes come back from parallel per-topic discovery with whatever ids the
//! oracle chose. Once the whole round has finished they are rewritten to
//! `<topic_id>_A<n>`, `n` being the 1-based rank within the topic.

use std::collections::BTreeMap;

use crate::model::Axis;

const AXIS_SEPARATOR: &str = "_A";

/// Namespaced id of the `rank`-th (1-based) axis of `topic_id`.
pub fn axis_id(topic_id: &str, rank: usize) -> String {
    format!("{topic_id}{AXIS_SEPARATOR}{rank}")
}

/// Topic prefix of a namespaced axis id, if it has the expected shape.
pub fn owning_topic(axis_id: &str) -> Option<&str> {
    let (topic, rank) = axis_id.rsplit_once(AXIS_SEPARATOR)?;
    let valid_rank = !rank.is_empty() && rank.bytes().all(|b| b.is_ascii_digit());
    (valid_rank && !topic.is_empty()).then_some(topic)
}

/// True if `axis_id` is a namespaced id under `topic_id`.
pub fn belongs_to(axis_id: &str, topic_id: &str) -> bool {
    owning_topic(axis_id) == Some(topic_id)
}

/// Rewrite every axis id in place order. Apply exactly once per run.
///
/// Returns the renamed map and the `(old, new)` id pairs in rewrite order.
pub fn namespace_axes(
    axes_by_topic: BTreeMap<String, Vec<Axis>>,
) -> (BTreeMap<String, Vec<Axis>>, Vec<(String, String)>) {
    let mut renames = Vec::new();

    let renamed = axes_by_topic
        .into_iter()
        .map(|(topic_id, axes)| {
            let axes = axes
                .into_iter()
                .enumerate()
                .map(|(i, mut axis)| {
                    let new_id = axis_id(&topic_id, i + 1);
                    renames.push((std::mem::replace(&mut axis.id, new_id.clone()), new_id));
                    axis
                })
                .collect();
            (topic_id, axes)
        })
        .collect();

    (renamed, renames)
}
