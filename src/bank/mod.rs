//! Base neighbor-offset patterns for propagation and evaluation.
//!
//! Patterns depend only on the neighbor count and dilation, so each one is
//! built once and cached for the lifetime of the process. Offsets are
//! `(dy, dx)` pairs in pixels; learned per-pixel residuals are added on top
//! by the grid builder.

mod grid;

pub use grid::{build_sampling_grid, SamplingGrid};

use crate::util::{NeighborRole, PatchMatchError, PatchMatchResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// One base offset in pixels, row first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NeighborOffset {
    pub dy: i32,
    pub dx: i32,
}

impl NeighborOffset {
    const fn new(dy: i32, dx: i32) -> Self {
        Self { dy, dx }
    }

    fn doubled(self) -> Self {
        Self::new(2 * self.dy, 2 * self.dx)
    }
}

type PatternKey = (NeighborRole, usize, i32);

fn cache() -> &'static Mutex<HashMap<PatternKey, Arc<[NeighborOffset]>>> {
    static CACHE: OnceLock<Mutex<HashMap<PatternKey, Arc<[NeighborOffset]>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cached(
    key: PatternKey,
    build: impl FnOnce() -> PatchMatchResult<Vec<NeighborOffset>>,
) -> PatchMatchResult<Arc<[NeighborOffset]>> {
    let mut table = cache()
        .lock()
        .map_err(|_| PatchMatchError::InvalidInput("offset pattern cache poisoned"))?;
    if let Some(pattern) = table.get(&key) {
        return Ok(Arc::clone(pattern));
    }
    let pattern: Arc<[NeighborOffset]> = build()?.into();
    table.insert(key, Arc::clone(&pattern));
    Ok(pattern)
}

/// The 3×3 ring around the center, row-major, center excluded.
fn ring(d: i32) -> [NeighborOffset; 8] {
    [
        NeighborOffset::new(-d, -d),
        NeighborOffset::new(-d, 0),
        NeighborOffset::new(-d, d),
        NeighborOffset::new(0, -d),
        NeighborOffset::new(0, d),
        NeighborOffset::new(d, -d),
        NeighborOffset::new(d, 0),
        NeighborOffset::new(d, d),
    ]
}

/// Propagation pattern for 0, 4, 8 or 16 neighbors at `dilation`.
///
/// The 16-neighbor pattern appends the 8-neighbor ring at twice the
/// distance. Zero neighbors yields an empty pattern.
pub fn propagation_offsets(
    count: usize,
    dilation: usize,
) -> PatchMatchResult<Arc<[NeighborOffset]>> {
    let d = dilation as i32;
    cached((NeighborRole::Propagation, count, d), || match count {
        0 => Ok(Vec::new()),
        4 => Ok(vec![
            NeighborOffset::new(-d, 0),
            NeighborOffset::new(0, -d),
            NeighborOffset::new(0, d),
            NeighborOffset::new(d, 0),
        ]),
        8 => Ok(ring(d).to_vec()),
        16 => {
            let base = ring(d);
            Ok(base.iter().copied().chain(base.iter().map(|o| o.doubled())).collect())
        }
        _ => Err(PatchMatchError::UnsupportedNeighbors {
            role: NeighborRole::Propagation,
            count,
        }),
    })
}

/// Evaluation pattern for 9 or 17 neighbors (center included) at
/// `dilation`, usually [`StageConfig::evaluation_dilation`].
///
/// The 17-neighbor pattern appends the non-center 3×3 entries of the
/// evaluation ring at twice `dilation`. Reference checkpoints trained with
/// 17 neighbors doubled the propagation ring instead (distance
/// `2 * propagation_range`), so their outer eight samples sit two pixels
/// further out than here.
///
/// [`StageConfig::evaluation_dilation`]: crate::config::StageConfig::evaluation_dilation
pub fn evaluation_offsets(
    count: usize,
    dilation: usize,
) -> PatchMatchResult<Arc<[NeighborOffset]>> {
    let d = dilation as i32;
    cached((NeighborRole::Evaluation, count, d), || {
        let base = ring(d);
        let mut pattern: Vec<NeighborOffset> = base[..4].to_vec();
        pattern.push(NeighborOffset::new(0, 0));
        pattern.extend_from_slice(&base[4..]);
        match count {
            9 => Ok(pattern),
            17 => {
                pattern.extend(base.iter().map(|o| o.doubled()));
                Ok(pattern)
            }
            _ => Err(PatchMatchError::UnsupportedNeighbors {
                role: NeighborRole::Evaluation,
                count,
            }),
        }
    })
}
