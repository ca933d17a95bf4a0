//! `[ID:<opinion id>]` citations inside axis reasoning.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static CITATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ID:\s*([^\]\s]+)\s*\]").unwrap());

/// Cited opinion ids, in order of appearance (duplicates kept).
pub fn extract_cited_ids(text: &str) -> Vec<&str> {
    CITATION_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Cited ids that are not in `known`, deduplicated, in order of first appearance.
pub fn unresolved_citations<'a>(text: &'a str, known: &HashSet<&str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    extract_cited_ids(text)
        .into_iter()
        .filter(|id| !known.contains(id) && seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_ids_in_order() {
        let text = "Supporters [ID:12] and [ID: 7] disagree with [ID:abc-3].";
        assert_eq!(extract_cited_ids(text), vec!["12", "7", "abc-3"]);
    }

    #[test]
    fn test_ignores_malformed_markers() {
        assert!(extract_cited_ids("[ID:] [id:4] ID:5 [ID 6]").is_empty());
    }

    #[test]
    fn test_unresolved_are_deduplicated() {
        let known: HashSet<&str> = ["1", "2"].into_iter().collect();
        let text = "[ID:1] [ID:99] [ID:2] [ID:99] [ID:100]";
        assert_eq!(unresolved_citations(text, &known), vec!["99", "100"]);
    }
}
