//! Small string helpers for log output.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so multi-byte text (CJK opinions, emoji) is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Mask a secret for display, keeping a short prefix for recognisability.
pub fn redact_secret(secret: &str) -> String {
    const VISIBLE: usize = 4;
    if secret.chars().count() <= VISIBLE * 2 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    format!("{prefix}***")
}

/// Collapse runs of whitespace (including newlines) into single spaces.
///
/// Opinions are rendered one per line in oracle prompts and log lines.
pub fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("原発を最大限活用すべき", 3), "原発を...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
    }

    #[test]
    fn test_redact_secret() {
        assert_eq!(redact_secret("sk-proj-1234567890"), "sk-p***");
        assert_eq!(redact_secret("short"), "***");
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("a\n\n b\tc  "), "a b c");
    }
}
