//! Field data attached to a mesh: values, shapes, locations, markers.
//!
//! One field type covers the whole closed shape × location space instead
//! of one concrete type per combination; migration is written once against
//! these tags. Flux-like quantities set `oriented` and carry the
//! owner-relative sign convention the flip machinery maintains.

pub mod migrate;
pub mod particles;

pub use migrate::{FieldMigrator, NewGroupPolicy};
pub use particles::{Particle, ParticleCloud};

use crate::error::RedistError;
use crate::topology::Mesh;
use serde::{Deserialize, Serialize};

/// Value shape per entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldShape {
    Scalar,
    Vector,
    Tensor,
}

impl FieldShape {
    pub fn n_comps(self) -> usize {
        match self {
            FieldShape::Scalar => 1,
            FieldShape::Vector => 3,
            FieldShape::Tensor => 9,
        }
    }
}

/// Where the values live.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldLocation {
    /// One value per cell.
    Cells,
    /// One value per face, internal block first — the whole surface.
    Faces,
    /// One value per boundary face, group blocks in mesh order.
    Boundary,
}

impl FieldLocation {
    pub fn n_entities(self, mesh: &Mesh) -> usize {
        match self {
            FieldLocation::Cells => mesh.n_cells,
            FieldLocation::Faces => mesh.n_faces(),
            FieldLocation::Boundary => mesh.n_boundary_faces(),
        }
    }
}

/// A numeric field: flat values, each entity's components contiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub shape: FieldShape,
    pub location: FieldLocation,
    /// Carries an owner-relative sign; flips apply on orientation change.
    pub oriented: bool,
    pub values: Vec<f64>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        shape: FieldShape,
        location: FieldLocation,
        oriented: bool,
        values: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            location,
            oriented,
            values,
        }
    }

    pub fn cell_scalar(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, FieldShape::Scalar, FieldLocation::Cells, false, values)
    }

    /// A whole-surface scalar; `oriented` marks flux-like quantities.
    pub fn surface_scalar(name: impl Into<String>, values: Vec<f64>, oriented: bool) -> Self {
        Self::new(name, FieldShape::Scalar, FieldLocation::Faces, oriented, values)
    }

    pub fn boundary_scalar(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, FieldShape::Scalar, FieldLocation::Boundary, false, values)
    }

    pub fn n_entities(&self) -> usize {
        self.values.len() / self.shape.n_comps()
    }

    /// Reject a field whose size disagrees with its mesh — before any
    /// communication touches it.
    pub fn validate(&self, mesh: &Mesh) -> Result<(), RedistError> {
        let expected = self.location.n_entities(mesh) * self.shape.n_comps();
        if self.values.len() != expected {
            return Err(RedistError::FieldSizeMismatch {
                name: self.name.clone(),
                got: self.values.len(),
                expected,
            });
        }
        Ok(())
    }
}

/// A discrete marker field: integer labels, never flipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelField {
    pub name: String,
    pub location: FieldLocation,
    pub values: Vec<i64>,
}

impl LabelField {
    pub fn cells(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            location: FieldLocation::Cells,
            values,
        }
    }

    pub fn validate(&self, mesh: &Mesh) -> Result<(), RedistError> {
        let expected = self.location.n_entities(mesh);
        if self.values.len() != expected {
            return Err(RedistError::FieldSizeMismatch {
                name: self.name.clone(),
                got: self.values.len(),
                expected,
            });
        }
        Ok(())
    }
}

/// A named auxiliary cell subset migrated alongside the mesh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSet {
    pub name: String,
    pub cells: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshgen::block_mesh;

    #[test]
    fn size_mismatch_is_rejected() {
        let (mesh, _) = block_mesh(2, 2, 2);
        let bad = Field::cell_scalar("rho", vec![0.0; 7]);
        let err = bad.validate(&mesh).unwrap_err();
        assert!(matches!(
            err,
            RedistError::FieldSizeMismatch { got: 7, expected: 8, .. }
        ));
        Field::cell_scalar("rho", vec![0.0; 8]).validate(&mesh).unwrap();
    }

    #[test]
    fn vector_fields_count_components() {
        let (mesh, _) = block_mesh(2, 1, 1);
        let f = Field::new(
            "U",
            FieldShape::Vector,
            FieldLocation::Cells,
            false,
            vec![0.0; 6],
        );
        f.validate(&mesh).unwrap();
        assert_eq!(f.n_entities(), 2);
    }

    #[test]
    fn boundary_location_counts_boundary_faces() {
        let (mesh, _) = block_mesh(1, 1, 1);
        let f = Field::boundary_scalar("q", vec![0.0; 6]);
        f.validate(&mesh).unwrap();
    }
}
