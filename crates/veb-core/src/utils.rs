// ============== Text Helpers ==============

/// Cap `s` to `max_chars` characters, ellipsis included.
///
/// VK rejects `messages.send` payloads over the platform limit, so the cap is
/// a hard one: the "..." marker replaces the tail instead of extending it.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out = s.chars().take(keep).collect::<String>();
    out.push_str("...");
    out
}

/// Collapse whitespace runs (including newlines) into single spaces and trim.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_keeps_short_input() {
        assert_eq!(truncate_text("привет", 10), "привет");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn truncate_text_stays_within_cap() {
        let s = "x".repeat(100);
        let t = truncate_text(&s, 20);
        assert_eq!(t.chars().count(), 20);
        assert!(t.ends_with("..."));
    }

    #[test]
    fn truncate_text_counts_chars_not_bytes() {
        // Cyrillic is two bytes per char; the cap is still per char.
        let s = "б".repeat(50);
        let t = truncate_text(&s, 10);
        assert_eq!(t.chars().count(), 10);
    }

    #[test]
    fn squash_whitespace_flattens_runs() {
        assert_eq!(squash_whitespace("  a\n\n  b\tc  "), "a b c");
        assert_eq!(squash_whitespace(""), "");
    }
}
