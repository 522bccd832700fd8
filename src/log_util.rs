//! Smol utilities for logging

/// Make an Ascii-safe string
pub fn ascii_escape(s: &[u8]) -> String {
    s.iter().flat_map(|&b| std::ascii::escape_default(b)).map(char::from).collect()
}

/// Shortens a byte slice for a log line, escaping whatever remains
pub fn ascii_excerpt(s: &[u8], limit: usize) -> String {
    if s.len() <= limit {
        ascii_escape(s)
    }
    else {
        format!("{}... ({} more bytes)", ascii_escape(&s[.. limit]), s.len() - limit)
    }
}

#[test]
fn ascii_escape_passes_printables_through() {
    assert_eq!(ascii_escape(b"PHP Notice: x"), "PHP Notice: x");
}

#[test]
fn ascii_escape_escapes_control_and_high_bytes() {
    assert_eq!(ascii_escape(b"a\r\n\xff"), "a\\r\\n\\xff");
}

#[test]
fn ascii_excerpt_truncates_long_input() {
    assert_eq!(ascii_excerpt(b"abcdef", 3), "abc... (3 more bytes)");
    assert_eq!(ascii_excerpt(b"abc", 3), "abc");
}
