//! Shared helpers for the multi-rank integration tests.
//!
//! Worlds are real: one thread per rank, each running the full collective
//! pipeline over its own `ThreadComm`. The closure returns whatever the
//! test wants to inspect; results come back rank-ordered.
#![allow(dead_code)]

use mesh_redist::comm::ThreadComm;
use mesh_redist::partitioning::PartId;
use mesh_redist::redistribute::{MeshPiece, MoveResult, move_mesh};
use mesh_redist::topology::{GlobalAddressing, Mesh};
use std::sync::Arc;

pub fn spawn_world<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, &ThreadComm) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = ThreadComm::world(n)
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            let f = f.clone();
            std::thread::spawn(move || f(rank, &comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Scatter a global mesh held by rank 0 (as partition 0) onto the world.
///
/// Every rank calls this; ranks other than 0 pass `None` and contribute
/// no pieces.
pub fn scatter_from_root(
    comm: &ThreadComm,
    global: Option<(Mesh, GlobalAddressing)>,
    assign: &[PartId],
    n_new: usize,
) -> MoveResult {
    let (pieces, assignments) = match global {
        Some((mesh, addressing)) => (
            vec![MeshPiece {
                part: 0,
                mesh,
                addressing,
            }],
            vec![assign.to_vec()],
        ),
        None => (Vec::new(), Vec::new()),
    };
    move_mesh(comm, pieces, &assignments, n_new).unwrap()
}

/// Per-piece destination arrays from a global per-cell assignment, looked
/// up through each piece's cell provenance.
pub fn per_piece_assignment(result: &MoveResult, global: &[PartId]) -> Vec<Vec<PartId>> {
    result
        .pieces
        .iter()
        .map(|p| {
            p.addressing
                .cells
                .iter()
                .map(|&gid| global[gid as usize])
                .collect()
        })
        .collect()
}
