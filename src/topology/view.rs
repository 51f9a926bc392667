//! MeshView: derived addressing, computed once per mesh version.
//!
//! Everything downstream (decomposition, chunk extraction) needs the
//! inverse tables a `Mesh` does not store: cell-to-face closure, face
//! classification, cell adjacency. A view is built once from a validated
//! mesh and never mutated; a new mesh version means a new view.

use crate::error::RedistError;
use crate::topology::mesh::Mesh;

/// Immutable derived addressing for one mesh.
#[derive(Clone, Debug)]
pub struct MeshView {
    n_cells: usize,
    /// CSR cell-to-face closure.
    cell_face_offsets: Vec<usize>,
    cell_faces: Vec<usize>,
    /// Group index per face; `None` for internal faces.
    face_group: Vec<Option<usize>>,
}

impl MeshView {
    pub fn build(mesh: &Mesh) -> Result<Self, RedistError> {
        mesh.validate()?;

        let mut counts = vec![0usize; mesh.n_cells];
        for &c in &mesh.owner {
            counts[c] += 1;
        }
        for &c in &mesh.neighbour {
            counts[c] += 1;
        }
        let mut cell_face_offsets = Vec::with_capacity(mesh.n_cells + 1);
        cell_face_offsets.push(0);
        for &n in &counts {
            cell_face_offsets.push(cell_face_offsets.last().unwrap() + n);
        }

        let mut cursor = cell_face_offsets[..mesh.n_cells].to_vec();
        let mut cell_faces = vec![0usize; cell_face_offsets[mesh.n_cells]];
        // Ascending face order per cell: owner arrays run over all faces in
        // index order, neighbour entries interleave in the same sweep.
        for f in 0..mesh.n_faces() {
            let o = mesh.owner[f];
            cell_faces[cursor[o]] = f;
            cursor[o] += 1;
            if f < mesh.n_internal_faces() {
                let n = mesh.neighbour[f];
                cell_faces[cursor[n]] = f;
                cursor[n] += 1;
            }
        }

        let face_group = (0..mesh.n_faces()).map(|f| mesh.group_of(f)).collect();

        Ok(Self {
            n_cells: mesh.n_cells,
            cell_face_offsets,
            cell_faces,
            face_group,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Faces closing cell `c`, ascending.
    pub fn faces_of(&self, c: usize) -> &[usize] {
        &self.cell_faces[self.cell_face_offsets[c]..self.cell_face_offsets[c + 1]]
    }

    /// Group index of a face (`None` for internal).
    pub fn group_of(&self, face: usize) -> Option<usize> {
        self.face_group[face]
    }

    /// Cell adjacency as CSR, for graph decomposition. Edges follow
    /// internal faces only; coupled boundaries do not join the graph.
    pub fn cell_graph(&self, mesh: &Mesh) -> (Vec<usize>, Vec<usize>) {
        let mut counts = vec![0usize; self.n_cells];
        for f in 0..mesh.n_internal_faces() {
            counts[mesh.owner[f]] += 1;
            counts[mesh.neighbour[f]] += 1;
        }
        let mut offsets = Vec::with_capacity(self.n_cells + 1);
        offsets.push(0);
        for &n in &counts {
            offsets.push(offsets.last().unwrap() + n);
        }
        let mut cursor = offsets[..self.n_cells].to_vec();
        let mut adjacency = vec![0usize; offsets[self.n_cells]];
        for f in 0..mesh.n_internal_faces() {
            let (o, n) = (mesh.owner[f], mesh.neighbour[f]);
            adjacency[cursor[o]] = n;
            cursor[o] += 1;
            adjacency[cursor[n]] = o;
            cursor[n] += 1;
        }
        (offsets, adjacency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshgen::block_mesh;

    #[test]
    fn closure_covers_every_cell_with_six_faces() {
        let (mesh, _) = block_mesh(2, 2, 2);
        let view = MeshView::build(&mesh).unwrap();
        for c in 0..mesh.n_cells {
            assert_eq!(view.faces_of(c).len(), 6, "cell {c}");
        }
    }

    #[test]
    fn face_groups_match_the_mesh() {
        let (mesh, _) = block_mesh(2, 1, 1);
        let view = MeshView::build(&mesh).unwrap();
        for f in 0..mesh.n_faces() {
            assert_eq!(view.group_of(f), mesh.group_of(f));
        }
    }

    #[test]
    fn cell_graph_of_a_line_is_a_path() {
        let (mesh, _) = block_mesh(3, 1, 1);
        let view = MeshView::build(&mesh).unwrap();
        let (offsets, adj) = view.cell_graph(&mesh);
        assert_eq!(&adj[offsets[0]..offsets[1]], &[1]);
        let mut mid: Vec<usize> = adj[offsets[1]..offsets[2]].to_vec();
        mid.sort_unstable();
        assert_eq!(mid, vec![0, 2]);
        assert_eq!(&adj[offsets[2]..offsets[3]], &[1]);
    }
}
