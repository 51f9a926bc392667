//! Reconstruction: the move whose destination count is one.
//!
//! Merging every partition back into a single global description is an
//! ordinary move with every cell assigned to partition 0. The interesting
//! part happens in assembly: facing inter-partition halves arrive as two
//! contributions with the same canonical face id, reunite into internal
//! faces, and the side owned by the lowest global cell id survives as the
//! owner. What this module adds is the check that the merge actually
//! happened — a half without its partner is an integrity error, never a
//! shrug.

use crate::comm::Communicator;
use crate::error::RedistError;
use crate::fields::migrate::{FieldMigrator, NewGroupPolicy};
use crate::fields::{CellSet, Field, LabelField, ParticleCloud};
use crate::partitioning::PartId;
use crate::redistribute::{MeshPiece, MoveResult, move_mesh};
use crate::topology::BoundaryKind;

/// Merge this rank's pieces (with every other rank's, collectively) into
/// one global piece on rank 0.
///
/// Ranks other than 0 come out holding no pieces. Fails with
/// [`RedistError::UnmergedInterfaces`] if any inter-partition face
/// survives the merge.
pub fn reconstruct_mesh<C: Communicator>(
    comm: &C,
    pieces: Vec<MeshPiece>,
) -> Result<MoveResult, RedistError> {
    let assignments: Vec<Vec<PartId>> = pieces
        .iter()
        .map(|p| vec![0; p.mesh.n_cells])
        .collect();
    let result = move_mesh(comm, pieces, &assignments, 1)?;

    for piece in &result.pieces {
        let leftovers: usize = piece
            .mesh
            .groups
            .iter()
            .filter(|g| matches!(g.kind, BoundaryKind::InterPartition { .. }))
            .map(|g| g.len)
            .sum();
        if leftovers > 0 {
            return Err(RedistError::UnmergedInterfaces(leftovers));
        }
    }
    Ok(result)
}

/// Field migration onto a reconstructed mesh.
///
/// A thin rename over [`FieldMigrator`]: the maps already point every
/// value at partition 0, and reunited faces resolve their two incoming
/// halves through the map's flip bits, so oriented fields come out in the
/// surviving owner's sign convention.
pub struct FieldReconstructor<'a, C: Communicator> {
    migrator: FieldMigrator<'a, C>,
}

impl<'a, C: Communicator> FieldReconstructor<'a, C> {
    pub fn new(comm: &'a C, result: &'a MoveResult) -> Self {
        Self {
            migrator: FieldMigrator::new(comm, result),
        }
    }

    /// Merge one logical field; rank 0 gets the global field, every other
    /// rank `None`.
    pub fn reconstruct(
        &self,
        parts: Vec<Field>,
        policy: &NewGroupPolicy,
    ) -> Result<Option<Field>, RedistError> {
        Ok(self.migrator.migrate(parts, policy)?.into_iter().next())
    }

    pub fn reconstruct_labels(
        &self,
        parts: Vec<LabelField>,
    ) -> Result<Option<LabelField>, RedistError> {
        Ok(self.migrator.migrate_labels(parts)?.into_iter().next())
    }

    pub fn reconstruct_particles(
        &self,
        clouds: Vec<ParticleCloud>,
    ) -> Result<Option<ParticleCloud>, RedistError> {
        Ok(self.migrator.migrate_particles(clouds)?.into_iter().next())
    }

    pub fn reconstruct_cell_sets(
        &self,
        sets: Vec<Vec<CellSet>>,
    ) -> Result<Option<Vec<CellSet>>, RedistError> {
        Ok(self.migrator.migrate_cell_sets(sets)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::meshgen::block_mesh;

    #[test]
    fn split_then_merge_restores_the_cell_count() {
        let comm = NoComm::default();
        let (mesh, addressing) = block_mesh(2, 2, 2);
        let n_faces = mesh.n_faces();
        let piece = MeshPiece {
            part: 0,
            mesh,
            addressing,
        };

        let assign: Vec<usize> = (0..8).map(|c| c % 2).collect();
        let split = move_mesh(&comm, vec![piece], &[assign], 2).unwrap();
        assert_eq!(split.pieces.len(), 2);

        let merged = reconstruct_mesh(
            &comm,
            split.pieces.into_iter().map(|p| p.into_piece()).collect(),
        )
        .unwrap();

        assert_eq!(merged.pieces.len(), 1);
        let global = &merged.pieces[0];
        assert_eq!(global.mesh.n_cells, 8);
        assert_eq!(global.mesh.n_faces(), n_faces);
        assert!(global.mesh.interface_groups().next().is_none());
    }

    #[test]
    fn merged_owners_take_the_lowest_global_id() {
        let comm = NoComm::default();
        let (mesh, addressing) = block_mesh(2, 1, 1);
        let piece = MeshPiece {
            part: 0,
            mesh,
            addressing,
        };
        let split = move_mesh(&comm, vec![piece], &[vec![0, 1]], 2).unwrap();
        let merged = reconstruct_mesh(
            &comm,
            split.pieces.into_iter().map(|p| p.into_piece()).collect(),
        )
        .unwrap();

        let global = &merged.pieces[0];
        for f in 0..global.mesh.n_internal_faces() {
            let o = global.addressing.cells[global.mesh.owner[f]];
            let n = global.addressing.cells[global.mesh.neighbour[f]];
            assert!(o < n, "face {f}: owner {o} neighbour {n}");
        }
    }
}
