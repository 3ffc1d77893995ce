//! Small string helpers shared across tool output formatting and logging.

/// Truncate `s` to at most `max_chars` characters, appending an ellipsis
/// marker when truncated. Operates on chars, not bytes, so it never splits a
/// multi-byte UTF-8 sequence.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_unchanged() {
        assert_eq!(truncate_str("hi", 10), "hi");
    }

    #[test]
    fn long_strings_are_truncated_with_ellipsis() {
        assert_eq!(truncate_str("abcdef", 3), "abc…");
    }

    #[test]
    fn respects_char_boundaries_not_bytes() {
        let s = "héllo wörld";
        let truncated = truncate_str(s, 4);
        assert_eq!(truncated.chars().count(), 5);
    }
}
