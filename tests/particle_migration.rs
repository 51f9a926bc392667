//! Markers follow their cells across partitions.

mod common;

use common::{scatter_from_root, spawn_world};
use mesh_redist::fields::{FieldMigrator, Particle, ParticleCloud};
use mesh_redist::meshgen::block_mesh;
use mesh_redist::redistribute::move_mesh;
use serial_test::serial;

#[test]
#[serial]
fn a_particle_follows_its_cell_to_another_partition() {
    let out = spawn_world(2, |rank, comm| {
        // Both ranks start with one two-cell partition; the particle sits
        // on partition 0's cell 0, which moves to partition 1.
        let global = (rank == 0).then(|| block_mesh(4, 1, 1));
        let halves: Vec<usize> = (0..4).map(|c| c / 2).collect();
        let first = scatter_from_root(comm, global, &halves, 2);
        assert_eq!(first.pieces[0].mesh.n_cells, 2);

        let marked_cell = first.pieces[0]
            .addressing
            .cells
            .iter()
            .position(|&gid| gid == 0);

        let mut cloud = ParticleCloud::new("tracers");
        if rank == 0 {
            cloud.push(
                marked_cell.unwrap(),
                Particle {
                    id: 7,
                    values: vec![3.25, -1.0],
                },
            );
        }

        // Cell 0 defects to partition 1; everything else stays put.
        let assignments: Vec<Vec<usize>> = first
            .pieces
            .iter()
            .map(|p| {
                p.addressing
                    .cells
                    .iter()
                    .map(|&gid| if gid == 0 { 1 } else { p.part })
                    .collect()
            })
            .collect();
        let second = move_mesh(
            comm,
            first.pieces.iter().cloned().map(|p| p.into_piece()).collect(),
            &assignments,
            2,
        )
        .unwrap();

        let migrator = FieldMigrator::new(comm, &second);
        let clouds = migrator.migrate_particles(vec![cloud]).unwrap();

        let piece = &second.pieces[0];
        let cloud = &clouds[0];
        let attachments: Vec<(u64, u64)> = cloud
            .cells
            .iter()
            .zip(&cloud.particles)
            .map(|(&local, p)| (piece.addressing.cells[local], p.id))
            .collect();
        (cloud.len(), attachments, cloud.particles.clone())
    });

    // Partition 0 ends with zero particles, partition 1 with exactly one,
    // attached to the migrated cell's new local index, payload unchanged.
    assert_eq!(out[0].0, 0);
    assert_eq!(out[1].0, 1);
    assert_eq!(out[1].1, vec![(0, 7)]);
    assert_eq!(out[1].2[0].values, vec![3.25, -1.0]);
}
