//! The partition-local mesh: points, faces, cells, boundary groups.
//!
//! A `Mesh` is one partition's view of the domain. Cells are implicit
//! (faces name them through `owner`/`neighbour`); faces are ordered point
//! loops, oriented outward from their owner. The face array splits into
//! one internal block followed by contiguous boundary-group blocks that
//! exactly tile the rest — the layout every component of this crate leans
//! on, so [`Mesh::validate`] enforces it before a mesh is trusted.

use crate::error::RedistError;
use serde::{Deserialize, Serialize};

/// An ordered point-index loop, outward from the owner cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Face {
    pub points: Vec<usize>,
}

impl Face {
    pub fn new(points: Vec<usize>) -> Self {
        Self { points }
    }

    /// The same face seen from the other side.
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self { points }
    }
}

/// What a boundary group represents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Ordinary exterior boundary.
    Plain,
    /// One half of a partitioning cut; `neighbour` is the partition on the
    /// other side. Faces are ordered identically on both halves.
    InterPartition { neighbour: usize },
    /// One half of a periodic pair; `partner` names the other group.
    Periodic { partner: String },
    /// Derived/indirect coupling onto another group.
    Indirect { target: String },
}

impl BoundaryKind {
    /// Groups whose faces carry canonical coupling keys.
    pub fn is_coupled(&self) -> bool {
        !matches!(self, BoundaryKind::Plain)
    }
}

/// A contiguous range of non-internal faces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryGroup {
    pub name: String,
    pub kind: BoundaryKind,
    pub start: usize,
    pub len: usize,
}

impl BoundaryGroup {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// One partition of the domain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub points: Vec<[f64; 3]>,
    pub faces: Vec<Face>,
    /// Owner cell per face.
    pub owner: Vec<usize>,
    /// Neighbour cell per internal face; internal faces come first, so
    /// `neighbour.len()` is the internal face count.
    pub neighbour: Vec<usize>,
    pub n_cells: usize,
    pub groups: Vec<BoundaryGroup>,
}

impl Mesh {
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn n_internal_faces(&self) -> usize {
        self.neighbour.len()
    }

    pub fn n_boundary_faces(&self) -> usize {
        self.faces.len() - self.neighbour.len()
    }

    pub fn is_internal(&self, face: usize) -> bool {
        face < self.neighbour.len()
    }

    /// Check the structural invariants.
    ///
    /// Every face has exactly one owner and at most one neighbour by
    /// representation; what is left to verify is index validity, face
    /// degeneracy, and the internal-then-groups layout.
    pub fn validate(&self) -> Result<(), RedistError> {
        for (f, face) in self.faces.iter().enumerate() {
            if face.points.len() < 3 {
                return Err(RedistError::DegenerateFace(f));
            }
            for &p in &face.points {
                if p >= self.points.len() {
                    return Err(RedistError::PointOutOfRange {
                        face: f,
                        point: p,
                        n_points: self.points.len(),
                    });
                }
            }
        }
        if self.owner.len() != self.faces.len() {
            return Err(RedistError::AddressingSizeMismatch {
                what: "owner",
                got: self.owner.len(),
                expected: self.faces.len(),
            });
        }
        for (f, &c) in self.owner.iter().enumerate() {
            if c >= self.n_cells {
                return Err(RedistError::CellOutOfRange {
                    face: f,
                    cell: c,
                    n_cells: self.n_cells,
                });
            }
        }
        for (f, &c) in self.neighbour.iter().enumerate() {
            if c >= self.n_cells {
                return Err(RedistError::CellOutOfRange {
                    face: f,
                    cell: c,
                    n_cells: self.n_cells,
                });
            }
        }

        let mut at = self.neighbour.len();
        for g in &self.groups {
            if g.start != at {
                return Err(RedistError::NonContiguousGroups {
                    group: g.name.clone(),
                    at: g.start,
                });
            }
            at += g.len;
        }
        if at != self.faces.len() {
            return Err(RedistError::NonContiguousGroups {
                group: "<end>".into(),
                at,
            });
        }
        Ok(())
    }

    /// Group owning a boundary face, if any.
    pub fn group_of(&self, face: usize) -> Option<usize> {
        if self.is_internal(face) {
            return None;
        }
        self.groups
            .iter()
            .position(|g| g.range().contains(&face))
    }

    /// Iterate inter-partition groups with their neighbour partitions.
    pub fn interface_groups(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.groups.iter().enumerate().filter_map(|(i, g)| {
            if let BoundaryKind::InterPartition { neighbour } = g.kind {
                Some((i, neighbour))
            } else {
                None
            }
        })
    }
}
