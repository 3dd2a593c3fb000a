//! Line format shared by the index and history files
//!
//! One entry per line, UTF-8, no escaping, no header. A line is a valid
//! entry when it is non-empty and holds no NUL or newline.

use std::collections::HashSet;

/// Check whether a string can be stored as one line
pub fn is_valid_entry(entry: &str) -> bool {
    !entry.is_empty() && !entry.contains(&['\0', '\n'][..])
}

/// Parse file content, dropping invalid lines and repeated entries
///
/// The first occurrence of a duplicate wins so file order (insertion order)
/// is preserved.
pub fn parse_lines(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .split('\n')
        .filter(|line| is_valid_entry(line))
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

/// Parse raw bytes, replacing invalid UTF-8 sequences
pub fn parse_bytes(bytes: &[u8]) -> Vec<String> {
    parse_lines(&String::from_utf8_lossy(bytes))
}

/// Render entries as newline-terminated lines
pub fn render_lines<S: AsRef<str>>(entries: &[S]) -> String {
    let capacity = entries.iter().map(|e| e.as_ref().len() + 1).sum();
    let mut out = String::with_capacity(capacity);
    for entry in entries {
        out.push_str(entry.as_ref());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_duplicates() {
        let parsed = parse_lines("/a.iso\n\n/b.iso\n/a.iso\n/c.iso");
        assert_eq!(parsed, vec!["/a.iso", "/b.iso", "/c.iso"]);
    }

    #[test]
    fn test_invalid_entries() {
        assert!(is_valid_entry("/isos/game.iso"));
        assert!(!is_valid_entry(""));
        assert!(!is_valid_entry("/bad\0path"));
        assert!(!is_valid_entry("/two\nlines"));
    }

    #[test]
    fn test_render_then_parse() {
        let entries = vec!["/x/1.iso".to_string(), "/x/2.iso".to_string()];
        let rendered = render_lines(&entries);
        assert_eq!(rendered, "/x/1.iso\n/x/2.iso\n");
        assert_eq!(parse_lines(&rendered), entries);
        assert_eq!(render_lines::<String>(&[]), "");
    }
}
