//! Multi-term list filtering
//!
//! A query is a `;`-separated list of terms with OR semantics. A term that
//! contains an uppercase character is matched case-sensitively; all other
//! terms match against a lowercased copy of each item.
//!
//! Filters stack: each layer filters the previous layer's result and keeps
//! a mapping from displayed positions back to positions in the base list,
//! so a selection made on a filtered view resolves to the right paths.

use super::boyer_moore::BoyerMoore;
use crate::error::WorkerError;
use crate::pool::{chunk_ranges, WorkerPool};
use std::sync::Arc;
use tracing::debug;

/// Lists shorter than this are filtered on the calling thread
const PARALLEL_THRESHOLD: usize = 2048;

#[derive(Debug, Clone)]
struct Term {
    matcher: BoyerMoore,
    case_sensitive: bool,
}

/// Parsed filter query
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    terms: Vec<Term>,
}

impl Query {
    pub fn parse(text: &str) -> Self {
        let terms = text
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Term {
                matcher: BoyerMoore::new(t),
                case_sensitive: t.chars().any(char::is_uppercase),
            })
            .collect();
        Self {
            text: text.trim().to_string(),
            terms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether any term occurs in `item`
    pub fn matches(&self, item: &str) -> bool {
        let mut lowered: Option<String> = None;
        self.terms.iter().any(|term| {
            if term.case_sensitive {
                term.matcher.is_match(item)
            } else {
                let lowered = lowered.get_or_insert_with(|| item.to_lowercase());
                term.matcher.is_match(lowered)
            }
        })
    }
}

/// Positions of matching items, in list order
pub fn filter_indices(pool: &WorkerPool, items: &Arc<Vec<String>>, query: &Arc<Query>) -> Result<Vec<usize>, WorkerError> {
    if query.is_empty() {
        return Ok(Vec::new());
    }

    if items.len() < PARALLEL_THRESHOLD || pool.size() == 1 {
        return Ok(matching_in(items, query, 0..items.len()));
    }

    let chunks = pool.run_bounded(chunk_ranges(items.len(), pool.size()).into_iter().map(|range| {
        let items = Arc::clone(items);
        let query = Arc::clone(query);
        move || matching_in(&items, &query, range)
    }));

    let mut indices = Vec::new();
    for chunk in chunks {
        indices.extend(chunk?);
    }
    Ok(indices)
}

fn matching_in(items: &[String], query: &Query, range: std::ops::Range<usize>) -> Vec<usize> {
    range.filter(|&i| query.matches(&items[i])).collect()
}

#[derive(Debug, Clone)]
struct FilterLayer {
    query: String,
    view: Arc<Vec<String>>,
    origin: Vec<usize>,
}

/// Stack of filters over a base list
#[derive(Debug, Clone)]
pub struct FilterStack {
    base: Arc<Vec<String>>,
    layers: Vec<FilterLayer>,
}

impl FilterStack {
    pub fn new(base: Arc<Vec<String>>) -> Self {
        Self {
            base,
            layers: Vec::new(),
        }
    }

    pub fn base(&self) -> &Arc<Vec<String>> {
        &self.base
    }

    /// The list currently displayed
    pub fn current(&self) -> &Arc<Vec<String>> {
        self.layers.last().map(|l| &l.view).unwrap_or(&self.base)
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Number of active filters
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Active filter texts, oldest first
    pub fn queries(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.query.as_str()).collect()
    }

    /// Filter the current view
    ///
    /// Returns the number of matches. With no match (or an empty query)
    /// the stack is left untouched and 0 is returned.
    pub fn apply(&mut self, pool: &WorkerPool, text: &str) -> Result<usize, WorkerError> {
        let query = Arc::new(Query::parse(text));
        if query.is_empty() {
            return Ok(0);
        }

        let current = Arc::clone(self.current());
        let hits = filter_indices(pool, &current, &query)?;
        if hits.is_empty() {
            debug!(query = query.text(), "Filter matched nothing");
            return Ok(0);
        }

        let view: Vec<String> = hits.iter().map(|&i| current[i].clone()).collect();
        let origin: Vec<usize> = match self.layers.last() {
            Some(layer) => hits.iter().map(|&i| layer.origin[i]).collect(),
            None => hits,
        };

        let count = view.len();
        debug!(query = query.text(), matches = count, depth = self.layers.len() + 1, "Filter applied");
        self.layers.push(FilterLayer {
            query: query.text().to_string(),
            view: Arc::new(view),
            origin,
        });
        Ok(count)
    }

    /// Undo the most recent filter
    pub fn pop(&mut self) -> bool {
        self.layers.pop().is_some()
    }

    /// Drop every filter
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Position in the base list of displayed item `displayed` (0-based)
    pub fn original_index(&self, displayed: usize) -> Option<usize> {
        match self.layers.last() {
            Some(layer) => layer.origin.get(displayed).copied(),
            None => (displayed < self.base.len()).then_some(displayed),
        }
    }
}
