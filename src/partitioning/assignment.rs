//! Joint partition assignment over one or more meshes.
//!
//! Several related meshes (regions) can be decomposed together: their cell
//! graphs are unioned into one — cells renumbered contiguously, no
//! geometric stitching — decomposed once, and the result split back along
//! the union's index ranges. This component owns only that bookkeeping and
//! the optional per-cell weights; the algorithm is the injected
//! [`Decomposer`](super::Decomposer).

use crate::error::RedistError;
use crate::partitioning::{CellGraph, Decomposer, PartId};
use crate::topology::{Mesh, MeshView};

/// Per-cell destination ids for a set of jointly decomposed meshes.
#[derive(Debug)]
pub struct PartitionAssignment {
    pub n_parts: usize,
    /// One destination array per input mesh, index-aligned.
    pub per_mesh: Vec<Vec<PartId>>,
}

impl PartitionAssignment {
    /// Decompose `meshes` jointly into `n_parts` destinations.
    ///
    /// `weights` is optional per mesh; a missing entry means unit cost.
    pub fn compute(
        method: &dyn Decomposer,
        meshes: &[(&Mesh, &MeshView)],
        weights: &[Option<&[f64]>],
        n_parts: usize,
    ) -> Result<Self, RedistError> {
        if !weights.is_empty() && weights.len() != meshes.len() {
            return Err(RedistError::BadAssignment(format!(
                "{} weight arrays for {} meshes",
                weights.len(),
                meshes.len()
            )));
        }

        // Union of cell graphs: contiguous renumbering by mesh order.
        let mut starts = Vec::with_capacity(meshes.len() + 1);
        starts.push(0usize);
        for (mesh, _) in meshes {
            starts.push(starts.last().unwrap() + mesh.n_cells);
        }
        let total = *starts.last().unwrap();

        let mut offsets = Vec::with_capacity(total + 1);
        offsets.push(0usize);
        let mut adjacency = Vec::new();
        let mut unioned_weights = Vec::new();
        let mut any_weight = false;

        for (m, (mesh, view)) in meshes.iter().enumerate() {
            let (local_offsets, local_adj) = view.cell_graph(mesh);
            let shift = starts[m];
            for c in 0..mesh.n_cells {
                for &n in &local_adj[local_offsets[c]..local_offsets[c + 1]] {
                    adjacency.push(n + shift);
                }
                offsets.push(adjacency.len());
            }
            match weights.get(m).copied().flatten() {
                Some(w) => {
                    if w.len() != mesh.n_cells {
                        return Err(RedistError::FieldSizeMismatch {
                            name: "cell weights".into(),
                            got: w.len(),
                            expected: mesh.n_cells,
                        });
                    }
                    any_weight = true;
                    unioned_weights.extend_from_slice(w);
                }
                None => unioned_weights.extend(std::iter::repeat(1.0).take(mesh.n_cells)),
            }
        }

        let graph = CellGraph { offsets, adjacency };
        let combined = method.decompose(
            &graph,
            any_weight.then_some(unioned_weights.as_slice()),
            n_parts,
        )?;
        debug_assert_eq!(combined.len(), total);

        let per_mesh = starts
            .windows(2)
            .map(|w| combined[w[0]..w[1]].to_vec())
            .collect();
        Ok(Self { n_parts, per_mesh })
    }
}

/// The computed destination ids as a per-cell scalar field, for writing
/// next to the results so the decomposition can be visualized.
pub fn assignment_field(assignment: &[PartId]) -> crate::fields::Field {
    crate::fields::Field::cell_scalar(
        "partition-id",
        assignment.iter().map(|&p| p as f64).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshgen::block_mesh;
    use crate::partitioning::BlockDecomposer;

    #[test]
    fn joint_union_splits_back_by_ranges() {
        let (a, addr_a) = block_mesh(2, 1, 1);
        let (b, addr_b) = block_mesh(4, 1, 1);
        let _ = (addr_a, addr_b);
        let va = MeshView::build(&a).unwrap();
        let vb = MeshView::build(&b).unwrap();

        let assignment = PartitionAssignment::compute(
            &BlockDecomposer,
            &[(&a, &va), (&b, &vb)],
            &[],
            2,
        )
        .unwrap();

        assert_eq!(assignment.per_mesh.len(), 2);
        assert_eq!(assignment.per_mesh[0].len(), 2);
        assert_eq!(assignment.per_mesh[1].len(), 4);
        // Six cells split in two: the union's first three land in part 0.
        assert_eq!(assignment.per_mesh[0], vec![0, 0]);
        assert_eq!(assignment.per_mesh[1], vec![0, 1, 1, 1]);
    }

    #[test]
    fn weight_size_mismatch_is_rejected() {
        let (a, _) = block_mesh(2, 1, 1);
        let va = MeshView::build(&a).unwrap();
        let bad = vec![1.0; 5];
        let err = PartitionAssignment::compute(
            &BlockDecomposer,
            &[(&a, &va)],
            &[Some(bad.as_slice())],
            2,
        )
        .unwrap_err();
        assert!(matches!(err, RedistError::FieldSizeMismatch { .. }));
    }

    #[test]
    fn assignment_field_mirrors_the_ids() {
        let f = assignment_field(&[0, 2, 1]);
        assert_eq!(f.values, vec![0.0, 2.0, 1.0]);
    }
}
