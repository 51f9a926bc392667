//! Entry point for partition assignment.
//!
//! The decomposition heuristic itself is an injected capability: anything
//! implementing [`Decomposer`] can drive a redistribution. The built-in
//! methods are deliberately simple — `block` (contiguous, weight-balanced)
//! and `random` (seeded, reproducible) — production setups plug real graph
//! partitioners in through the same trait and select them by name.

pub mod assignment;

pub use assignment::{PartitionAssignment, assignment_field};

use crate::error::RedistError;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub type PartId = usize;

/// Cell adjacency in CSR form, the input every decomposer consumes.
#[derive(Clone, Debug, Default)]
pub struct CellGraph {
    pub offsets: Vec<usize>,
    pub adjacency: Vec<usize>,
}

impl CellGraph {
    pub fn n_cells(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn neighbours(&self, c: usize) -> &[usize] {
        &self.adjacency[self.offsets[c]..self.offsets[c + 1]]
    }
}

/// A decomposition method: per cell, a destination partition id.
pub trait Decomposer {
    fn name(&self) -> &'static str;

    /// `weights` defaults to unit cost per cell. Implementations must
    /// cover the full `0..n_parts` id range semantically (empty partitions
    /// are allowed) and fail with a capability error before any
    /// communication if they cannot honor `n_parts`.
    fn decompose(
        &self,
        graph: &CellGraph,
        weights: Option<&[f64]>,
        n_parts: usize,
    ) -> Result<Vec<PartId>, RedistError>;
}

/// Look a method up by its configured name.
pub fn decomposer(name: &str) -> Result<Box<dyn Decomposer>, RedistError> {
    match name {
        "block" => Ok(Box::new(BlockDecomposer)),
        "random" => Ok(Box::new(RandomDecomposer::default())),
        other => Err(RedistError::UnknownDecomposer(other.to_string())),
    }
}

fn check_n_parts(name: &'static str, n_parts: usize) -> Result<(), RedistError> {
    if n_parts == 0 {
        return Err(RedistError::PartitionCountUnsupported {
            method: name.to_string(),
            requested: n_parts,
        });
    }
    Ok(())
}

/// Contiguous index ranges, cut so accumulated weight balances.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockDecomposer;

impl Decomposer for BlockDecomposer {
    fn name(&self) -> &'static str {
        "block"
    }

    fn decompose(
        &self,
        graph: &CellGraph,
        weights: Option<&[f64]>,
        n_parts: usize,
    ) -> Result<Vec<PartId>, RedistError> {
        check_n_parts(self.name(), n_parts)?;
        let n = graph.n_cells();
        if let Some(w) = weights {
            if w.len() != n {
                return Err(RedistError::BadAssignment(format!(
                    "weight field has {} entries for {n} cells",
                    w.len()
                )));
            }
        }
        let total: f64 = match weights {
            Some(w) => w.iter().sum(),
            None => n as f64,
        };
        let mut out = Vec::with_capacity(n);
        let mut acc = 0.0;
        for c in 0..n {
            acc += weights.map_or(1.0, |w| w[c]);
            // Cell lands in the partition whose weight quantile it fills.
            let p = ((acc / total.max(f64::MIN_POSITIVE)) * n_parts as f64).ceil() as usize;
            out.push(p.clamp(1, n_parts) - 1);
        }
        Ok(out)
    }
}

/// Uniform random assignment from a fixed seed; reproducible by
/// construction and useful as a worst-case stress method.
#[derive(Clone, Copy, Debug)]
pub struct RandomDecomposer {
    pub seed: u64,
}

impl Default for RandomDecomposer {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl Decomposer for RandomDecomposer {
    fn name(&self) -> &'static str {
        "random"
    }

    fn decompose(
        &self,
        graph: &CellGraph,
        _weights: Option<&[f64]>,
        n_parts: usize,
    ) -> Result<Vec<PartId>, RedistError> {
        check_n_parts(self.name(), n_parts)?;
        let mut rng = SmallRng::seed_from_u64(self.seed);
        Ok((0..graph.n_cells()).map(|_| rng.gen_range(0..n_parts)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: usize) -> CellGraph {
        let mut offsets = vec![0];
        let mut adjacency = Vec::new();
        for c in 0..n {
            if c > 0 {
                adjacency.push(c - 1);
            }
            if c + 1 < n {
                adjacency.push(c + 1);
            }
            offsets.push(adjacency.len());
        }
        CellGraph { offsets, adjacency }
    }

    #[test]
    fn unknown_method_is_a_capability_error() {
        assert!(matches!(
            decomposer("simulated-annealing"),
            Err(RedistError::UnknownDecomposer(_))
        ));
    }

    #[test]
    fn zero_parts_is_rejected_before_any_work() {
        let err = BlockDecomposer
            .decompose(&path_graph(4), None, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            RedistError::PartitionCountUnsupported { requested: 0, .. }
        ));
    }

    #[test]
    fn block_splits_evenly_without_weights() {
        let parts = BlockDecomposer.decompose(&path_graph(8), None, 2).unwrap();
        assert_eq!(parts, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn block_honours_weights() {
        // One heavy cell up front pushes the cut left.
        let w = vec![6.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let parts = BlockDecomposer
            .decompose(&path_graph(10), Some(&w), 2)
            .unwrap();
        assert_eq!(&parts[..2], &[0, 0]);
        assert!(parts[2..].iter().all(|&p| p == 1));
    }

    #[test]
    fn full_id_range_even_past_live_workers() {
        // More partitions than cells: ids stay within range, empties are
        // legitimate.
        let parts = BlockDecomposer.decompose(&path_graph(2), None, 4).unwrap();
        assert!(parts.iter().all(|&p| p < 4));
    }

    #[test]
    fn random_is_reproducible() {
        let g = path_graph(16);
        let a = RandomDecomposer { seed: 7 }.decompose(&g, None, 3).unwrap();
        let b = RandomDecomposer { seed: 7 }.decompose(&g, None, 3).unwrap();
        assert_eq!(a, b);
    }
}
