//! End-to-end redistribution scenarios on real multi-rank worlds.

mod common;

use common::{per_piece_assignment, scatter_from_root, spawn_world};
use mesh_redist::fields::{Field, FieldMigrator, NewGroupPolicy};
use mesh_redist::meshgen::block_mesh;
use mesh_redist::redistribute::{GroupReconciliation, move_mesh};
use mesh_redist::reconstruct::reconstruct_mesh;
use mesh_redist::topology::BoundaryKind;
use serial_test::serial;

#[test]
#[serial]
fn eight_cell_block_split_in_two_and_merged_back() {
    // 2x2x2 block cut along x: one interface pair, four faces per side,
    // and the merge restores all eight cells.
    let out = spawn_world(2, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh(2, 2, 2));
        let assign: Vec<usize> = (0..8).map(|c| c % 2).collect();
        let moved = scatter_from_root(comm, global, &assign, 2);

        assert_eq!(moved.pieces.len(), 1);
        let piece = &moved.pieces[0];
        assert_eq!(piece.part, rank);
        assert_eq!(piece.mesh.n_cells, 4);

        let interfaces: Vec<_> = piece.mesh.interface_groups().collect();
        assert_eq!(interfaces.len(), 1);
        let (gi, neighbour) = interfaces[0];
        assert_eq!(neighbour, 1 - rank);
        assert_eq!(piece.mesh.groups[gi].len, 4);

        let ids: Vec<u64> = piece.mesh.groups[gi]
            .range()
            .map(|f| piece.addressing.faces[f].id)
            .collect();

        let merged = reconstruct_mesh(
            comm,
            moved.pieces.into_iter().map(|p| p.into_piece()).collect(),
        )
        .unwrap();
        let n_cells_back = merged.pieces.first().map(|p| p.mesh.n_cells);

        (ids, n_cells_back)
    });

    // Both halves list the cut in the same canonical order.
    assert_eq!(out[0].0, out[1].0);
    assert_eq!(out[0].1, Some(8));
    assert_eq!(out[1].1, None);
}

#[test]
#[serial]
fn four_partitions_onto_two_targets_keep_ascending_provenance() {
    let global_assign = [0usize, 1, 0, 1, 1, 0, 1, 0];
    let out = spawn_world(2, move |rank, comm| {
        let global = (rank == 0).then(|| block_mesh(8, 1, 1));
        let quarters: Vec<usize> = (0..8).map(|c| c / 2).collect();
        let first = scatter_from_root(comm, global, &quarters, 4);
        assert_eq!(first.pieces.len(), 2);

        let assignments = per_piece_assignment(&first, &global_assign);
        let second = move_mesh(
            comm,
            first.pieces.into_iter().map(|p| p.into_piece()).collect(),
            &assignments,
            2,
        )
        .unwrap();

        assert_eq!(second.pieces.len(), 1);
        second.pieces[0].addressing.cells.clone()
    });

    for (target, provenance) in out.iter().enumerate() {
        let expected: Vec<u64> = global_assign
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p == target)
            .map(|(gid, _)| gid as u64)
            .collect();
        assert_eq!(provenance, &expected, "target {target}");
    }
}

#[test]
#[serial]
fn identity_redistribution_is_a_no_op() {
    let out = spawn_world(2, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh(2, 2, 2));
        let assign: Vec<usize> = (0..8).map(|c| c % 2).collect();
        let first = scatter_from_root(comm, global, &assign, 2);

        let before = first.pieces[0].clone();
        let assignments: Vec<Vec<usize>> = first
            .pieces
            .iter()
            .map(|p| vec![p.part; p.mesh.n_cells])
            .collect();
        let second = move_mesh(
            comm,
            first.pieces.into_iter().map(|p| p.into_piece()).collect(),
            &assignments,
            2,
        )
        .unwrap();

        let after = &second.pieces[0];
        assert_eq!(after.mesh.points, before.mesh.points);
        assert_eq!(after.mesh.faces, before.mesh.faces);
        assert_eq!(after.mesh.owner, before.mesh.owner);
        assert_eq!(after.mesh.neighbour, before.mesh.neighbour);
        assert_eq!(after.mesh.groups, before.mesh.groups);
        assert_eq!(after.addressing.cells, before.addressing.cells);
        assert_eq!(after.addressing.faces, before.addressing.faces);

        // No new groups: every group reconciles to its old self.
        second.reconciliations[0]
            .iter()
            .all(|r| matches!(r, GroupReconciliation::Same { .. }))
    });
    assert!(out.into_iter().all(|same| same));
}

#[test]
#[serial]
fn cell_sums_are_conserved_across_count_changes() {
    let original_sum: f64 = (0..9).map(|c| 1.5 * c as f64 + 0.25).sum();
    let sums = spawn_world(3, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh(3, 3, 1));
        // Deliberately lopsided first cut, then a 3 -> 2 shrink.
        let first_assign: Vec<usize> = (0..9).map(|c| if c < 6 { 0 } else { c % 3 }).collect();
        let first = scatter_from_root(comm, global, &first_assign, 3);

        let migrator = FieldMigrator::new(comm, &first);
        let parts = if rank == 0 {
            vec![Field::cell_scalar(
                "rho",
                (0..9).map(|c| 1.5 * c as f64 + 0.25).collect(),
            )]
        } else {
            Vec::new()
        };
        let fields = migrator.migrate(parts, &NewGroupPolicy::Zero).unwrap();
        let first_sum: f64 = fields.iter().flat_map(|f| &f.values).sum();

        let shrink: Vec<usize> = (0..9).map(|c| c % 2).collect();
        let assignments = per_piece_assignment(&first, &shrink);
        let second = move_mesh(
            comm,
            first.pieces.into_iter().map(|p| p.into_piece()).collect(),
            &assignments,
            2,
        )
        .unwrap();
        let migrator = FieldMigrator::new(comm, &second);
        let fields = migrator.migrate(fields, &NewGroupPolicy::Zero).unwrap();
        let second_sum: f64 = fields.iter().flat_map(|f| &f.values).sum();

        (first_sum, second_sum)
    });

    let total_first: f64 = sums.iter().map(|s| s.0).sum();
    let total_second: f64 = sums.iter().map(|s| s.1).sum();
    assert_eq!(total_first, original_sum);
    assert_eq!(total_second, original_sum);
}

#[test]
#[serial]
fn flux_values_negate_across_every_synthesized_pair() {
    let out = spawn_world(2, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh(2, 2, 2));
        let assign: Vec<usize> = (0..8).map(|c| c % 2).collect();
        let moved = scatter_from_root(comm, global, &assign, 2);

        let migrator = FieldMigrator::new(comm, &moved);
        let parts = if rank == 0 {
            let (mesh, _) = block_mesh(2, 2, 2);
            vec![Field::surface_scalar(
                "phi",
                (0..mesh.n_faces()).map(|f| 0.5 * f as f64 - 3.0).collect(),
                true,
            )]
        } else {
            Vec::new()
        };
        let fields = migrator.migrate(parts, &NewGroupPolicy::Zero).unwrap();

        let piece = &moved.pieces[0];
        let (gi, _) = piece.mesh.interface_groups().next().unwrap();
        piece.mesh.groups[gi]
            .range()
            .map(|f| fields[0].values[f])
            .collect::<Vec<f64>>()
    });

    assert_eq!(out[0].len(), 4);
    for (a, b) in out[0].iter().zip(&out[1]) {
        assert_eq!(*a, -*b);
        assert_ne!(*a, 0.0);
    }
}

#[test]
#[serial]
fn growing_the_world_leaves_legitimate_empty_ranks() {
    // Three ranks, two destination partitions: rank 2 ends empty and the
    // pipeline carries on.
    let out = spawn_world(3, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh(2, 1, 1));
        let moved = scatter_from_root(comm, global, &[0, 1], 2);
        (
            moved.pieces.len(),
            moved.pieces.iter().map(|p| p.mesh.n_cells).sum::<usize>(),
        )
    });
    assert_eq!(out[0], (1, 1));
    assert_eq!(out[1], (1, 1));
    assert_eq!(out[2], (0, 0));
}

#[test]
#[serial]
fn periodic_pairs_survive_redistribution() {
    use mesh_redist::meshgen::block_mesh_periodic_x;

    let out = spawn_world(2, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh_periodic_x(2, 2, 1));
        let assign: Vec<usize> = (0..4).map(|c| c % 2).collect();
        let moved = scatter_from_root(comm, global, &assign, 2);

        // Both periodic halves keep their groups; the coupled-key check
        // inside the move already verified every face found its partner.
        let piece = &moved.pieces[0];
        piece
            .mesh
            .groups
            .iter()
            .filter(|g| matches!(g.kind, BoundaryKind::Periodic { .. }))
            .count()
    });
    assert_eq!(out, vec![2, 2]);
}

#[test]
#[serial]
fn fresh_periodic_halves_copy_from_their_partners() {
    use mesh_redist::meshgen::block_mesh_periodic_x;

    let out = spawn_world(2, |rank, comm| {
        let global = (rank == 0).then(|| block_mesh_periodic_x(2, 2, 1));
        // Cut along x: every xlo face stays on partition 0, every xhi
        // face lands on the brand-new partition 1.
        let assign = vec![0, 1, 0, 1];
        let moved = scatter_from_root(comm, global, &assign, 2);

        let migrator = FieldMigrator::new(comm, &moved);
        let parts = if rank == 0 {
            let (mesh, _) = block_mesh_periodic_x(2, 2, 1);
            let internal = mesh.n_internal_faces();
            let mut q = vec![0.0; mesh.n_boundary_faces()];
            let lo = mesh.groups.iter().find(|g| g.name == "xlo").unwrap();
            for (k, f) in lo.range().enumerate() {
                q[f - internal] = 100.0 + k as f64;
            }
            vec![Field::boundary_scalar("q", q)]
        } else {
            Vec::new()
        };
        let fields = migrator
            .migrate(parts, &NewGroupPolicy::PeriodicPartner)
            .unwrap();

        let piece = &moved.pieces[0];
        let internal = piece.mesh.n_internal_faces();
        let hi = piece.mesh.groups.iter().find(|g| g.name == "xhi").unwrap();
        hi.range()
            .map(|f| {
                let k = piece.addressing.coupling_keys[f] & 0xffff;
                (fields[0].values[f - internal], 100.0 + k as f64)
            })
            .collect::<Vec<_>>()
    });

    // Partition 0 keeps no xhi faces; partition 1's, reconciled with no
    // predecessor, take their coupled partners' values.
    assert!(out[0].is_empty());
    assert_eq!(out[1].len(), 2);
    for (got, want) in &out[1] {
        assert_eq!(got, want);
    }
}

#[test]
#[serial]
fn indirect_couplings_survive_redistribution() {
    use mesh_redist::meshgen::block_mesh_periodic_x;
    use mesh_redist::topology::GlobalAddressing;

    // An indirect group coupled onto a plain target: the target carries
    // the pair's keys, so the move can verify the coupling even though
    // the two groups may land on different partitions.
    let out = spawn_world(2, |rank, comm| {
        let global = (rank == 0).then(|| {
            let (mut mesh, _) = block_mesh_periodic_x(2, 2, 1);
            for g in &mut mesh.groups {
                if g.name == "xlo" {
                    g.kind = BoundaryKind::Indirect { target: "xhi".into() };
                } else if g.name == "xhi" {
                    g.kind = BoundaryKind::Plain;
                }
            }
            let addressing = GlobalAddressing::identity(&mesh);
            (mesh, addressing)
        });
        // Cut along y so both x walls split across the partitions.
        let assign = vec![0, 0, 1, 1];
        let moved = scatter_from_root(comm, global, &assign, 2);

        let piece = &moved.pieces[0];
        let indirect = piece
            .mesh
            .groups
            .iter()
            .find(|g| matches!(g.kind, BoundaryKind::Indirect { .. }))
            .expect("indirect group kept");
        let target = piece
            .mesh
            .groups
            .iter()
            .find(|g| g.name == "xhi")
            .expect("target group kept");
        (indirect.len, target.len)
    });
    // The y-cut splits both x walls: one coupled face of each per side.
    assert_eq!(out, vec![(1, 1), (1, 1)]);
}
