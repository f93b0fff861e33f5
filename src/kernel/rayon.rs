//! Rayon dispatch for per-view work (feature-gated).
//!
//! Source views are independent until their matching costs are summed, so
//! feature extraction and per-view similarity can run on the pool. Results
//! are collected in view order and combined sequentially by the caller.

use crate::util::PatchMatchResult;
use rayon::prelude::*;

pub(crate) fn map_indices_par<T, F>(count: usize, f: F) -> PatchMatchResult<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> PatchMatchResult<T> + Sync + Send,
{
    (0..count).into_par_iter().map(f).collect()
}
