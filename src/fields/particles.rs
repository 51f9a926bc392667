//! Discrete markers bound to cells, migrating with them.

use crate::error::RedistError;
use crate::topology::Mesh;
use serde::{Deserialize, Serialize};

/// One marker: an identity plus arbitrary payload values. The owning cell
/// lives in the cloud's parallel array so payloads stay untouched by moves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: u64,
    pub values: Vec<f64>,
}

/// All markers of one partition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleCloud {
    pub name: String,
    /// Owning local cell per particle.
    pub cells: Vec<usize>,
    pub particles: Vec<Particle>,
}

impl ParticleCloud {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: Vec::new(),
            particles: Vec::new(),
        }
    }

    pub fn push(&mut self, cell: usize, particle: Particle) {
        self.cells.push(cell);
        self.particles.push(particle);
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn validate(&self, mesh: &Mesh) -> Result<(), RedistError> {
        if self.cells.len() != self.particles.len() {
            return Err(RedistError::FieldSizeMismatch {
                name: self.name.clone(),
                got: self.cells.len(),
                expected: self.particles.len(),
            });
        }
        for (i, &c) in self.cells.iter().enumerate() {
            if c >= mesh.n_cells {
                return Err(RedistError::ParticleCellOutOfRange {
                    particle: i,
                    cell: c,
                    n_cells: mesh.n_cells,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshgen::block_mesh;

    #[test]
    fn cloud_attachment_is_validated() {
        let (mesh, _) = block_mesh(2, 1, 1);
        let mut cloud = ParticleCloud::new("tracers");
        cloud.push(1, Particle { id: 9, values: vec![0.25] });
        cloud.validate(&mesh).unwrap();

        cloud.push(5, Particle { id: 10, values: vec![] });
        assert!(cloud.validate(&mesh).is_err());
    }
}
