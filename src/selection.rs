//! Parsing of user selections
//!
//! A selection is a whitespace-separated list of 1-based positions in the
//! displayed list, or `a-b` ranges (descending ranges are allowed and keep
//! their order). Bad tokens are reported without discarding the good ones.

use crate::search::FilterStack;
use std::collections::{BTreeSet, HashSet};

/// Validated selection against a list of known length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// 1-based positions in the order they were given, without repeats
    pub indices: Vec<usize>,

    /// One message per rejected token
    pub errors: BTreeSet<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Map the positions to paths in the base list behind `stack`
    pub fn resolve(&self, stack: &FilterStack) -> Vec<String> {
        let base = stack.base();
        self.indices
            .iter()
            .filter_map(|&i| stack.original_index(i - 1))
            .filter_map(|i| base.get(i).cloned())
            .collect()
    }
}

/// Parse `text` against a list of `len` items
pub fn parse_selection(text: &str, len: usize) -> Selection {
    let mut selection = Selection::default();
    let mut seen = HashSet::new();

    for token in text.split_whitespace() {
        match parse_token(token, len) {
            Ok(positions) => {
                for position in positions {
                    if seen.insert(position) {
                        selection.indices.push(position);
                    }
                }
            }
            Err(message) => {
                selection.errors.insert(message);
            }
        }
    }

    selection
}

fn parse_token(token: &str, len: usize) -> Result<Vec<usize>, String> {
    if let Some((start, end)) = token.split_once('-') {
        let start = parse_position(start, token)?;
        let end = parse_position(end, token)?;
        if start > len || end > len {
            return Err(format!("Invalid range: '{}' (list has {} items)", token, len));
        }
        return Ok(if start <= end {
            (start..=end).collect()
        } else {
            (end..=start).rev().collect()
        });
    }

    let position = parse_position(token, token)?;
    if position > len {
        return Err(format!("Invalid index: '{}' (list has {} items)", token, len));
    }
    Ok(vec![position])
}

fn parse_position(text: &str, token: &str) -> Result<usize, String> {
    match text.parse::<usize>() {
        Ok(0) => Err(format!("Invalid index: '{}' (positions start at 1)", token)),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("Invalid input: '{}'", token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WorkerPool;
    use std::sync::Arc;

    #[test]
    fn test_single_and_ranges() {
        let selection = parse_selection("1 3-5 2", 10);
        assert_eq!(selection.indices, vec![1, 3, 4, 5, 2]);
        assert!(selection.errors.is_empty());
    }

    #[test]
    fn test_descending_range() {
        assert_eq!(parse_selection("5-3", 5).indices, vec![5, 4, 3]);
    }

    #[test]
    fn test_duplicates_dropped() {
        assert_eq!(parse_selection("2 1-3 2", 5).indices, vec![2, 1, 3]);
    }

    #[test]
    fn test_errors_do_not_abort() {
        let selection = parse_selection("0 1 abc 7 2-9 3", 5);
        assert_eq!(selection.indices, vec![1, 3]);
        assert_eq!(selection.errors.len(), 4);
    }

    #[test]
    fn test_empty_input() {
        let selection = parse_selection("   ", 5);
        assert!(selection.is_empty());
        assert!(selection.errors.is_empty());
    }

    #[test]
    fn test_resolve_through_filter() {
        let pool = WorkerPool::new(1).unwrap();
        let base: Arc<Vec<String>> = Arc::new(vec![
            "/a/alpha.iso".to_string(),
            "/a/beta.iso".to_string(),
            "/a/gamma.iso".to_string(),
            "/a/delta.iso".to_string(),
        ]);
        let mut stack = FilterStack::new(base);
        stack.apply(&pool, "ta").unwrap();
        assert_eq!(stack.len(), 2);

        let selection = parse_selection("2 1", stack.len());
        assert_eq!(selection.resolve(&stack), vec!["/a/delta.iso", "/a/beta.iso"]);
    }
}
