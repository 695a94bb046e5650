//! SplitFinder
//!
//! Computes the range partitioning that the work table is initialized from.
//! Two strategies produce the boundaries: sampling the whole key set, or the
//! store's statistics and split-vector facility. Both yield the same tiling
//! shape; only balance and cost differ.

pub mod finder;

pub use finder::{SplitFinder, SplitStrategy};
