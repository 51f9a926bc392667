//! Structured hexahedral block meshes for tests, demos, and benches.
//!
//! Faces come out in the canonical layout the rest of the crate assumes:
//! internal faces first, swept cell-ascending with neighbours ascending,
//! then boundary blocks side by side. Unit spacing; geometry is only ever
//! relabeled downstream, so the coordinates just need to be distinct.

use crate::topology::{BoundaryGroup, BoundaryKind, Face, GlobalAddressing, Mesh};

struct BlockBuilder {
    nx: usize,
    ny: usize,
    nz: usize,
}

impl BlockBuilder {
    fn vertex(&self, i: usize, j: usize, k: usize) -> usize {
        (k * (self.ny + 1) + j) * (self.nx + 1) + i
    }

    fn px_loop(&self, i: usize, j: usize, k: usize) -> Vec<usize> {
        vec![
            self.vertex(i, j, k),
            self.vertex(i, j + 1, k),
            self.vertex(i, j + 1, k + 1),
            self.vertex(i, j, k + 1),
        ]
    }

    fn py_loop(&self, i: usize, j: usize, k: usize) -> Vec<usize> {
        vec![
            self.vertex(i, j, k),
            self.vertex(i, j, k + 1),
            self.vertex(i + 1, j, k + 1),
            self.vertex(i + 1, j, k),
        ]
    }

    fn pz_loop(&self, i: usize, j: usize, k: usize) -> Vec<usize> {
        vec![
            self.vertex(i, j, k),
            self.vertex(i + 1, j, k),
            self.vertex(i + 1, j + 1, k),
            self.vertex(i, j + 1, k),
        ]
    }
}

fn build(nx: usize, ny: usize, nz: usize, periodic_x: bool) -> (Mesh, GlobalAddressing) {
    assert!(nx > 0 && ny > 0 && nz > 0);
    let b = BlockBuilder { nx, ny, nz };

    let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                points.push([i as f64, j as f64, k as f64]);
            }
        }
    }

    let mut faces = Vec::new();
    let mut owner = Vec::new();
    let mut neighbour = Vec::new();

    let cell = |i: usize, j: usize, k: usize| (k * ny + j) * nx + i;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let c = cell(i, j, k);
                if i + 1 < nx {
                    faces.push(Face::new(b.px_loop(i + 1, j, k)));
                    owner.push(c);
                    neighbour.push(cell(i + 1, j, k));
                }
                if j + 1 < ny {
                    faces.push(Face::new(b.py_loop(i, j + 1, k)));
                    owner.push(c);
                    neighbour.push(cell(i, j + 1, k));
                }
                if k + 1 < nz {
                    faces.push(Face::new(b.pz_loop(i, j, k + 1)));
                    owner.push(c);
                    neighbour.push(cell(i, j, k + 1));
                }
            }
        }
    }

    let mut groups = Vec::new();
    let push_side = |faces: &mut Vec<Face>, owner: &mut Vec<usize>, side: u8| {
        let start = faces.len();
        match side {
            0 => {
                for k in 0..nz {
                    for j in 0..ny {
                        let mut f = Face::new(b.px_loop(0, j, k));
                        f.points.reverse();
                        faces.push(f);
                        owner.push(cell(0, j, k));
                    }
                }
            }
            1 => {
                for k in 0..nz {
                    for j in 0..ny {
                        faces.push(Face::new(b.px_loop(nx, j, k)));
                        owner.push(cell(nx - 1, j, k));
                    }
                }
            }
            2 => {
                for k in 0..nz {
                    for i in 0..nx {
                        let mut f = Face::new(b.py_loop(i, 0, k));
                        f.points.reverse();
                        faces.push(f);
                        owner.push(cell(i, 0, k));
                    }
                }
            }
            3 => {
                for k in 0..nz {
                    for i in 0..nx {
                        faces.push(Face::new(b.py_loop(i, ny, k)));
                        owner.push(cell(i, ny - 1, k));
                    }
                }
            }
            4 => {
                for j in 0..ny {
                    for i in 0..nx {
                        let mut f = Face::new(b.pz_loop(i, j, 0));
                        f.points.reverse();
                        faces.push(f);
                        owner.push(cell(i, j, 0));
                    }
                }
            }
            _ => {
                for j in 0..ny {
                    for i in 0..nx {
                        faces.push(Face::new(b.pz_loop(i, j, nz)));
                        owner.push(cell(i, j, nz - 1));
                    }
                }
            }
        }
        (start, faces.len() - start)
    };

    if periodic_x {
        // Walls first, then the periodic pair; pair faces share their
        // (j, k) sweep order, so positional keys line up across the pair.
        let start = faces.len();
        for side in 2u8..6 {
            push_side(&mut faces, &mut owner, side);
        }
        groups.push(BoundaryGroup {
            name: "walls".into(),
            kind: BoundaryKind::Plain,
            start,
            len: faces.len() - start,
        });
        let (start, len) = push_side(&mut faces, &mut owner, 0);
        groups.push(BoundaryGroup {
            name: "xlo".into(),
            kind: BoundaryKind::Periodic { partner: "xhi".into() },
            start,
            len,
        });
        let (start, len) = push_side(&mut faces, &mut owner, 1);
        groups.push(BoundaryGroup {
            name: "xhi".into(),
            kind: BoundaryKind::Periodic { partner: "xlo".into() },
            start,
            len,
        });
    } else {
        let start = faces.len();
        for side in 0u8..6 {
            push_side(&mut faces, &mut owner, side);
        }
        groups.push(BoundaryGroup {
            name: "walls".into(),
            kind: BoundaryKind::Plain,
            start,
            len: faces.len() - start,
        });
    }

    let mesh = Mesh {
        points,
        faces,
        owner,
        neighbour,
        n_cells: nx * ny * nz,
        groups,
    };
    let addressing = GlobalAddressing::identity(&mesh);
    (mesh, addressing)
}

/// A unit-spaced `nx × ny × nz` hex block with one plain `walls` group.
pub fn block_mesh(nx: usize, ny: usize, nz: usize) -> (Mesh, GlobalAddressing) {
    build(nx, ny, nz, false)
}

/// Same block with the two x-normal walls as a periodic pair
/// (`xlo`/`xhi`) and the rest under `walls`.
pub fn block_mesh_periodic_x(nx: usize, ny: usize, nz: usize) -> (Mesh, GlobalAddressing) {
    build(nx, ny, nz, true)
}
