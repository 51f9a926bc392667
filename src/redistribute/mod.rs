//! MeshMover: relocating topology between partitions.
//!
//! A move takes the pieces this rank holds, a per-cell destination
//! assignment, and a target partition count, and produces the pieces this
//! rank holds afterwards together with the distribution maps realizing the
//! move. Topology travels as per-destination chunks ([`chunks`]); receivers
//! merge them deterministically ([`assemble`]); coupled groups are verified
//! by canonical key ([`coupled`]); the old/new boundary-group
//! correspondence is recorded ([`reconcile`]).
//!
//! Partitions are placed on ranks by `part % comm.size()`, before and
//! after a move, so a target count beyond the live worker count simply
//! stacks several pieces on one rank. Positions and connectivity are
//! relabeled only, never recomputed.

pub(crate) mod assemble;
pub(crate) mod chunks;
pub(crate) mod coupled;
pub mod reconcile;

pub use reconcile::{GroupReconciliation, reconcile};

use crate::comm::Communicator;
use crate::distmap::DistributionMap;
use crate::error::RedistError;
use crate::partitioning::PartId;
use crate::topology::{BoundaryGroup, GlobalAddressing, Mesh};
use hashbrown::HashMap;

/// One partition held by this rank before a move.
///
/// Lives on rank `part % comm.size()`. Consumed by [`move_mesh`]: the
/// topology transfers to its destinations within that one call and the
/// sender keeps no handle to it.
#[derive(Clone, Debug)]
pub struct MeshPiece {
    pub part: usize,
    pub mesh: Mesh,
    pub addressing: GlobalAddressing,
}

/// One partition held by this rank after a move.
#[derive(Clone, Debug)]
pub struct MovedPiece {
    pub part: usize,
    pub mesh: Mesh,
    pub addressing: GlobalAddressing,
    /// Per boundary-local face: true when the face was internal before the
    /// move and now sits in a freshly synthesized inter-partition group.
    pub fresh_boundary: Vec<bool>,
}

impl MovedPiece {
    /// Strip the move-local extras so the piece can feed the next move.
    pub fn into_piece(self) -> MeshPiece {
        MeshPiece {
            part: self.part,
            mesh: self.mesh,
            addressing: self.addressing,
        }
    }
}

/// The cell, face, and point schedules realizing one move.
///
/// All three share entity alignment with the moved pieces in rank
/// concatenation order, so any per-entity array migrates by the matching
/// map alone.
#[derive(Clone, Debug)]
pub struct MoveMaps {
    pub cells: DistributionMap,
    pub faces: DistributionMap,
    pub points: DistributionMap,
}

/// Shape of an old piece, retained across a move.
///
/// The topology itself is consumed by the move; this is what field
/// migration still needs from the pre-move side: entity counts, the
/// boundary layout, cell provenance for marker reattachment, and each
/// cell's destination.
#[derive(Clone, Debug)]
pub struct PieceProfile {
    pub part: usize,
    pub n_cells: usize,
    pub n_internal_faces: usize,
    pub n_faces: usize,
    pub groups: Vec<BoundaryGroup>,
    pub cell_ids: Vec<u64>,
    pub cell_dest: Vec<PartId>,
}

impl PieceProfile {
    pub fn n_boundary_faces(&self) -> usize {
        self.n_faces - self.n_internal_faces
    }
}

/// Everything one move produces on this rank.
#[derive(Clone, Debug)]
pub struct MoveResult {
    pub pieces: Vec<MovedPiece>,
    pub maps: MoveMaps,
    /// Per moved piece, the fate of each of its boundary groups.
    pub reconciliations: Vec<Vec<GroupReconciliation>>,
    /// Per input piece, the shape it had before the move.
    pub profiles: Vec<PieceProfile>,
}

/// Relocate `pieces` according to `assignments` into `n_new` partitions.
///
/// Collective: every rank must call with its own pieces and the matching
/// per-piece assignment arrays. Consumes the pieces — ownership of the
/// topology transfers to the destinations within this call.
///
/// Produces one [`MovedPiece`] per destination partition placed on this
/// rank, each containing its assigned cells plus all closing points and
/// faces; a synthesized inter-partition group pair for every face now
/// separating two destinations, ordered identically on both sides; and
/// the validated [`MoveMaps`] realizing the move.
pub fn move_mesh<C: Communicator>(
    comm: &C,
    pieces: Vec<MeshPiece>,
    assignments: &[Vec<PartId>],
    n_new: usize,
) -> Result<MoveResult, RedistError> {
    let n_ranks = comm.size();
    let rank = comm.rank();

    if n_new == 0 {
        return Err(RedistError::BadAssignment(
            "target partition count is zero".into(),
        ));
    }
    if assignments.len() != pieces.len() {
        return Err(RedistError::BadAssignment(format!(
            "{} assignment arrays for {} pieces",
            assignments.len(),
            pieces.len()
        )));
    }
    for (piece, assign) in pieces.iter().zip(assignments) {
        piece.mesh.validate()?;
        piece.addressing.validate(&piece.mesh)?;
        if assign.len() != piece.mesh.n_cells {
            return Err(RedistError::BadAssignment(format!(
                "partition {} has {} cells but {} destinations",
                piece.part,
                piece.mesh.n_cells,
                assign.len()
            )));
        }
        if let Some(&d) = assign.iter().find(|&&d| d >= n_new) {
            return Err(RedistError::BadAssignment(format!(
                "partition {} assigns a cell to {d}, target count is {n_new}",
                piece.part
            )));
        }
    }

    // Piece-concatenation bases of this rank's entity spaces; the maps'
    // sub tables index into these.
    let mut cell_offsets = Vec::with_capacity(pieces.len());
    let mut face_offsets = Vec::with_capacity(pieces.len());
    let mut point_offsets = Vec::with_capacity(pieces.len());
    let (mut cells, mut faces, mut points) = (0usize, 0usize, 0usize);
    for piece in &pieces {
        cell_offsets.push(cells);
        face_offsets.push(faces);
        point_offsets.push(points);
        cells += piece.mesh.n_cells;
        faces += piece.mesh.n_faces();
        points += piece.mesh.n_points();
    }

    let profiles: Vec<PieceProfile> = pieces
        .iter()
        .zip(assignments)
        .map(|(piece, assign)| PieceProfile {
            part: piece.part,
            n_cells: piece.mesh.n_cells,
            n_internal_faces: piece.mesh.n_internal_faces(),
            n_faces: piece.mesh.n_faces(),
            groups: piece.mesh.groups.clone(),
            cell_ids: piece.addressing.cells.clone(),
            cell_dest: assign.clone(),
        })
        .collect();
    let old_groups: HashMap<usize, Vec<BoundaryGroup>> = pieces
        .iter()
        .map(|p| (p.part, p.mesh.groups.clone()))
        .collect();

    // Sender side: learn where the far side of every existing interface
    // face is headed, then slice the pieces into per-destination chunks.
    let nei_dests = chunks::exchange_interface_destinations(comm, &pieces, assignments)?;
    let chunked = chunks::extract_chunks(
        &pieces,
        assignments,
        &nei_dests,
        &cell_offsets,
        &face_offsets,
        &point_offsets,
    )?;
    drop(pieces);

    let [sub_cells, sub_faces, sub_points] = chunks::sub_tables(&chunked, n_ranks);

    // Ship the chunks. from_destinations keeps ties in original order, so
    // the (dest, source)-sorted chunk list streams exactly as the sub
    // tables assume.
    let chunk_dests: Vec<usize> = chunked
        .iter()
        .map(|(c, _)| c.dest as usize % n_ranks)
        .collect();
    let records: Vec<chunks::MeshChunk> = chunked.into_iter().map(|(c, _)| c).collect();
    let chunk_map = DistributionMap::from_destinations(comm, &chunk_dests)?;
    let received = chunk_map.distribute_records(comm, records)?;

    let assembled = assemble::assemble(rank, n_ranks, n_new, received)?;

    let maps = MoveMaps {
        cells: DistributionMap::from_tables(
            n_ranks,
            sub_cells,
            assembled.cell_construct,
            assembled.n_cells,
        ),
        faces: DistributionMap::from_tables(
            n_ranks,
            sub_faces,
            assembled.face_construct,
            assembled.n_faces,
        ),
        points: DistributionMap::from_tables(
            n_ranks,
            sub_points,
            assembled.point_construct,
            assembled.n_points,
        ),
    };
    maps.cells.validate(comm)?;
    maps.faces.validate(comm)?;
    maps.points.validate(comm)?;

    coupled::verify_coupled(comm, &assembled.pieces)?;

    let reconciliations = assembled
        .pieces
        .iter()
        .map(|p| {
            reconcile(
                old_groups.get(&p.part).map(|g| g.as_slice()),
                &p.mesh,
                &p.addressing.groups,
            )
        })
        .collect();

    report_balance(comm, &assembled.pieces)?;

    Ok(MoveResult {
        pieces: assembled.pieces,
        maps,
        reconciliations,
        profiles,
    })
}

/// Post-move cell counts, gathered to rank 0 through the map primitive.
/// Imbalance and empty ranks are worth a warning, never an error: empty
/// partitions are legitimate.
fn report_balance<C: Communicator>(comm: &C, pieces: &[MovedPiece]) -> Result<(), RedistError> {
    let local: u64 = pieces.iter().map(|p| p.mesh.n_cells as u64).sum();
    let map = DistributionMap::from_destinations(comm, &[0])?;
    let counts = map.distribute(comm, vec![local])?;
    if comm.rank() == 0 {
        let total: u64 = counts.iter().sum();
        let avg = total as f64 / counts.len() as f64;
        for (r, &n) in counts.iter().enumerate() {
            if n == 0 {
                log::warn!("rank {r} holds no cells after the move");
            }
        }
        if let Some(&max) = counts.iter().max() {
            if avg > 0.0 && max as f64 > 2.0 * avg {
                log::warn!(
                    "unbalanced move: heaviest rank carries {max} cells against an average of {avg:.1}"
                );
            }
        }
        log::info!("redistributed {total} cells across {} ranks", counts.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::meshgen::block_mesh;
    use crate::topology::BoundaryKind;

    fn single_piece(nx: usize, ny: usize, nz: usize) -> MeshPiece {
        let (mesh, addressing) = block_mesh(nx, ny, nz);
        MeshPiece {
            part: 0,
            mesh,
            addressing,
        }
    }

    #[test]
    fn identity_move_is_a_no_op() {
        let comm = NoComm::default();
        let piece = single_piece(2, 2, 1);
        let before = piece.mesh.clone();

        let result = move_mesh(&comm, vec![piece], &[vec![0; 4]], 1).unwrap();
        assert_eq!(result.pieces.len(), 1);
        let after = &result.pieces[0].mesh;

        assert_eq!(after.n_cells, before.n_cells);
        assert_eq!(after.n_internal_faces(), before.n_internal_faces());
        assert_eq!(after.groups.len(), before.groups.len());
        assert!(
            result.reconciliations[0]
                .iter()
                .all(|r| matches!(r, GroupReconciliation::Same { .. }))
        );
        // Provenance is the identity: cells come back in global order.
        assert_eq!(
            result.pieces[0].addressing.cells,
            (0..before.n_cells as u64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn one_rank_can_hold_both_halves_of_a_split() {
        // Two destination partitions on a single-rank world: the mover
        // stacks both pieces locally and still synthesizes the pair.
        let comm = NoComm::default();
        let piece = single_piece(2, 1, 1);
        let assign = vec![0, 1];

        let result = move_mesh(&comm, vec![piece], &[assign], 2).unwrap();
        assert_eq!(result.pieces.len(), 2);

        for (moved, nei) in result.pieces.iter().zip([1usize, 0]) {
            assert_eq!(moved.mesh.n_cells, 1);
            let interfaces: Vec<_> = moved.mesh.interface_groups().collect();
            assert_eq!(interfaces.len(), 1);
            let (gi, neighbour) = interfaces[0];
            assert_eq!(neighbour, nei);
            assert_eq!(moved.mesh.groups[gi].len, 1);
        }

        // Both halves carry the canonical id of the split face.
        let a = &result.pieces[0];
        let b = &result.pieces[1];
        let ga = a.mesh.interface_groups().next().unwrap().0;
        let gb = b.mesh.interface_groups().next().unwrap().0;
        let fa = a.mesh.groups[ga].start;
        let fb = b.mesh.groups[gb].start;
        assert_eq!(a.addressing.faces[fa].id, b.addressing.faces[fb].id);
    }

    #[test]
    fn maps_line_up_with_the_moved_pieces() {
        let comm = NoComm::default();
        let piece = single_piece(2, 2, 1);
        let result = move_mesh(&comm, vec![piece], &[vec![0, 0, 1, 1]], 2).unwrap();

        let n_cells: usize = result.pieces.iter().map(|p| p.mesh.n_cells).sum();
        let n_faces: usize = result.pieces.iter().map(|p| p.mesh.n_faces()).sum();
        let n_points: usize = result.pieces.iter().map(|p| p.mesh.n_points()).sum();
        assert_eq!(result.maps.cells.construct_size(), n_cells);
        assert_eq!(result.maps.faces.construct_size(), n_faces);
        assert_eq!(result.maps.points.construct_size(), n_points);
    }

    #[test]
    fn fresh_boundary_marks_exactly_the_new_halves() {
        let comm = NoComm::default();
        let piece = single_piece(2, 1, 1);
        let result = move_mesh(&comm, vec![piece], &[vec![0, 1]], 2).unwrap();

        for moved in &result.pieces {
            for (k, &fresh) in moved.fresh_boundary.iter().enumerate() {
                let f = moved.mesh.n_internal_faces() + k;
                let gi = moved.mesh.group_of(f).unwrap();
                let created = matches!(
                    moved.mesh.groups[gi].kind,
                    BoundaryKind::InterPartition { .. }
                );
                assert_eq!(fresh, created, "face {f}");
            }
        }
    }

    #[test]
    fn destination_out_of_range_is_rejected_up_front() {
        let comm = NoComm::default();
        let piece = single_piece(2, 1, 1);
        let err = move_mesh(&comm, vec![piece], &[vec![0, 5]], 2).unwrap_err();
        assert!(matches!(err, RedistError::BadAssignment(_)));
    }

    #[test]
    fn profile_snapshot_survives_the_move() {
        let comm = NoComm::default();
        let piece = single_piece(2, 1, 1);
        let n_faces = piece.mesh.n_faces();
        let result = move_mesh(&comm, vec![piece], &[vec![1, 0]], 2).unwrap();

        assert_eq!(result.profiles.len(), 1);
        let profile = &result.profiles[0];
        assert_eq!(profile.n_cells, 2);
        assert_eq!(profile.n_faces, n_faces);
        assert_eq!(profile.cell_dest, vec![1, 0]);
        assert_eq!(profile.cell_ids, vec![0, 1]);
    }
}
