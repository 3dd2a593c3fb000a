//! Filtering of in-memory path lists

pub mod boyer_moore;
pub mod filter;

pub use boyer_moore::BoyerMoore;
pub use filter::{filter_indices, FilterStack, Query};
