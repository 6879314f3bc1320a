use std::borrow::Cow;

/// Removes control characters that should never reach a record field.
///
/// Tabs and newlines are kept; everything else in the C0 range, DEL and the
/// C1 range is dropped. Returns `Cow::Borrowed` when nothing needs stripping.
///
/// # Examples
///
/// ```
/// use audioport::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("Episode\u{1b} 1"), "Episode 1");
/// assert_eq!(strip_control_chars("line\nbreak"), "line\nbreak");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_stripped = |c: char| c.is_control() && c != '\t' && c != '\n' && c != '\r';

    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|&c| !is_stripped(c)).collect())
}

/// Truncates a string to at most `max_chars` characters.
///
/// Counts Unicode scalar values, not bytes, so the cut never lands inside a
/// multi-byte character.
///
/// # Examples
///
/// ```
/// use audioport::util::truncate_chars;
///
/// assert_eq!(truncate_chars("abcdef", 3), "abc");
/// assert_eq!(truncate_chars("abc", 10), "abc");
/// assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_borrows_clean_input() {
        assert!(matches!(strip_control_chars("clean"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_removes_nul_and_del() {
        assert_eq!(strip_control_chars("a\u{0}b\u{7f}c"), "abc");
    }

    #[test]
    fn test_truncate_zero() {
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_truncate_exact_length() {
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let s = "é".repeat(900);
        let cut = truncate_chars(&s, 800);
        assert_eq!(cut.chars().count(), 800);
        assert_eq!(cut.len(), 1600);
    }
}
