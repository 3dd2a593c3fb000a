//! Natural-order sorting
//!
//! Numeric runs compare by value (`img2` < `img10`), everything else compares
//! case-insensitively. Ties fall back to leading-zero count, then case, then
//! raw bytes, so the order is total and sorting is deterministic.
//!
//! Large lists are sorted with an explicit parallel merge sort on the worker
//! pool: the list is cut into about `2 × workers` chunks, each chunk sorted
//! on a worker, then runs are merged pairwise in parallel rounds.

use crate::error::WorkerError;
use crate::pool::{chunk_ranges, WorkerPool};
use std::cmp::Ordering;

/// Lists shorter than this are sorted on the calling thread
const PARALLEL_THRESHOLD: usize = 4096;

/// Compare two strings in natural order
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut ia, mut ib) = (0, 0);
    let mut zeros = Ordering::Equal;
    let mut case = Ordering::Equal;

    loop {
        let (ca, cb) = match (a[ia..].chars().next(), b[ib..].chars().next()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => (ca, cb),
        };

        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let run_a = digit_run(&a[ia..]);
            let run_b = digit_run(&b[ib..]);
            ia += run_a.len();
            ib += run_b.len();

            let sig_a = run_a.trim_start_matches('0');
            let sig_b = run_b.trim_start_matches('0');
            match sig_a.len().cmp(&sig_b.len()).then_with(|| sig_a.cmp(sig_b)) {
                Ordering::Equal => {
                    if zeros == Ordering::Equal {
                        zeros = run_a.len().cmp(&run_b.len());
                    }
                }
                other => return other,
            }
        } else {
            ia += ca.len_utf8();
            ib += cb.len_utf8();
            match fold_case(ca).cmp(&fold_case(cb)) {
                Ordering::Equal => {
                    if case == Ordering::Equal {
                        case = ca.cmp(&cb);
                    }
                }
                other => return other,
            }
        }
    }

    zeros.then(case).then_with(|| a.cmp(b))
}

fn digit_run(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Sort in place on the calling thread
pub fn natural_sort(items: &mut [String]) {
    items.sort_by(|a, b| natural_cmp(a, b));
}

/// Sort on the worker pool
pub fn parallel_sort(pool: &WorkerPool, items: Vec<String>) -> Result<Vec<String>, WorkerError> {
    if items.len() < PARALLEL_THRESHOLD || pool.size() == 1 {
        let mut items = items;
        natural_sort(&mut items);
        return Ok(items);
    }

    let ranges = chunk_ranges(items.len(), pool.size() * 2);
    let mut chunks: Vec<Vec<String>> = Vec::with_capacity(ranges.len());
    let mut rest = items;
    for range in ranges.iter().rev() {
        chunks.push(rest.split_off(range.start));
    }
    chunks.reverse();

    let mut runs = pool
        .run_bounded(chunks.into_iter().map(|mut chunk| {
            move || {
                natural_sort(&mut chunk);
                chunk
            }
        }))
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    while runs.len() > 1 {
        let mut pairs = Vec::with_capacity(runs.len() / 2);
        let mut carry = None;
        let mut iter = runs.into_iter();
        loop {
            match (iter.next(), iter.next()) {
                (Some(left), Some(right)) => pairs.push((left, right)),
                (Some(left), None) => {
                    carry = Some(left);
                    break;
                }
                _ => break,
            }
        }

        let mut merged = pool
            .run_bounded(pairs.into_iter().map(|(left, right)| move || merge(left, right)))
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(last) = carry {
            merged.push(last);
        }
        runs = merged;
    }

    Ok(runs.pop().unwrap_or_default())
}

/// Stable merge of two sorted runs
fn merge(left: Vec<String>, right: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => natural_cmp(a, b) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        if let Some(item) = next {
            out.push(item);
        }
    }

    out
}
