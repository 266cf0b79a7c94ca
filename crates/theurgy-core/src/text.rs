//! UTF-8 safe truncation for log previews.
//!
//! Prompts and replies are only ever logged as short previews. Slicing a
//! `&str` at an arbitrary byte offset panics inside a multi-byte character,
//! so these helpers snap back to the nearest char boundary.

/// Longest prefix of `s` that fits in `max_bytes` without splitting a character.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate and append `suffix` when `s` exceeds `max_bytes` (suffix included in the budget).
pub fn truncate_with_suffix(s: &str, max_bytes: usize, suffix: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let prefix = truncate_str(s, max_bytes.saturating_sub(suffix.len()));
    format!("{prefix}{suffix}")
}

/// Maximum bytes of a logged text preview.
pub const PREVIEW_BYTES: usize = 120;

/// Single-line preview of free text for structured log fields.
pub fn preview(s: &str) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_suffix(&flat, PREVIEW_BYTES, "...")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn within_limit_is_unchanged() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn multibyte_boundary_snaps_back() {
        // 'é' is two bytes
        assert_eq!(truncate_str("café au lait", 4), "caf");
        assert_eq!(truncate_str("café au lait", 5), "café");
    }

    #[test]
    fn suffix_counts_toward_budget() {
        assert_eq!(truncate_with_suffix("hello world", 8, "..."), "hello...");
        assert_eq!(truncate_with_suffix("short", 8, "..."), "short");
    }

    #[test]
    fn preview_flattens_whitespace() {
        assert_eq!(preview("Hello\n  there.\tFriend"), "Hello there. Friend");
    }

    #[test]
    fn preview_is_bounded() {
        let long = "word ".repeat(100);
        let p = preview(&long);
        assert!(p.len() <= PREVIEW_BYTES);
        assert!(p.ends_with("..."));
    }

    proptest! {
        #[test]
        fn truncate_never_panics_and_is_prefix(s in "\\PC{0,64}", n in 0usize..80) {
            let t = truncate_str(&s, n);
            prop_assert!(t.len() <= n);
            prop_assert!(s.starts_with(t));
        }
    }
}
