//! Global addressing: where every local entity came from.
//!
//! Each partition carries, alongside its `Mesh`, the pre-move global id of
//! every cell, face, and point, plus the origin of every boundary group.
//! These arrays are both the provenance artifact written after a move and
//! the input the next move's canonical-identity matching runs on. Face
//! origins carry a flip bit: set when the local orientation is reversed
//! with respect to the face's canonical (pre-decomposition) orientation,
//! which happens exactly when the local owner is the canonical neighbour.
//!
//! The on-disk encoding reuses the sign bit, storing `±(id + 1)` per face
//! and [`GROUP_NEW`] for groups with no predecessor.

use crate::error::RedistError;
use crate::topology::mesh::{BoundaryKind, Mesh};
use serde::{Deserialize, Serialize};

/// Sentinel in the encoded group provenance array: created by the move,
/// no predecessor group.
pub const GROUP_NEW: i64 = -1;

/// Pre-move identity of one face.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceOrigin {
    /// Canonical global face id.
    pub id: u64,
    /// Local orientation is reversed w.r.t. the canonical one.
    pub flipped: bool,
}

impl FaceOrigin {
    pub fn upright(id: u64) -> Self {
        Self { id, flipped: false }
    }

    /// Sign-bit encoding used by the store: `id + 1`, negated when flipped.
    pub fn encode(self) -> i64 {
        let raw = (self.id + 1) as i64;
        if self.flipped { -raw } else { raw }
    }

    pub fn decode(raw: i64) -> Self {
        Self {
            id: (raw.unsigned_abs() - 1),
            flipped: raw < 0,
        }
    }
}

/// Where a boundary group came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupOrigin {
    /// Ordinal of the group in the original global group table.
    Original { ordinal: usize },
    /// Synthesized by a move (inter-partition halves).
    Created,
}

impl GroupOrigin {
    pub fn encode(self) -> i64 {
        match self {
            GroupOrigin::Original { ordinal } => ordinal as i64,
            GroupOrigin::Created => GROUP_NEW,
        }
    }
}

/// Per-entity provenance for one partition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GlobalAddressing {
    pub cells: Vec<u64>,
    pub faces: Vec<FaceOrigin>,
    pub points: Vec<u64>,
    pub groups: Vec<GroupOrigin>,
    /// Canonical coupling key per face; meaningful only for faces of
    /// periodic/indirect groups (inter-partition halves use the face id
    /// itself). Zero elsewhere.
    pub coupling_keys: Vec<u64>,
}

impl GlobalAddressing {
    /// Identity addressing for a freshly built, undecomposed mesh: global
    /// ids are the local indices, coupled pairs get positional keys.
    pub fn identity(mesh: &Mesh) -> Self {
        let mut coupling_keys = vec![0u64; mesh.n_faces()];
        for (gi, g) in mesh.groups.iter().enumerate() {
            let partner = match &g.kind {
                BoundaryKind::Periodic { partner } => partner,
                BoundaryKind::Indirect { target } => target,
                _ => continue,
            };
            // Face k of a coupled group couples with face k of its
            // partner; salt the key with the pair's lower ordinal so
            // distinct pairs never collide.
            let partner_ix = mesh.groups.iter().position(|o| &o.name == partner);
            let salt = partner_ix.map_or(gi, |p| gi.min(p)) as u64;
            for (k, f) in g.range().enumerate() {
                coupling_keys[f] = (salt << 40) | k as u64;
            }
            // An indirect target is ordinarily a plain group that assigns
            // no keys of its own, so it takes the pair's here.
            if let (BoundaryKind::Indirect { .. }, Some(p)) = (&g.kind, partner_ix) {
                if !mesh.groups[p].kind.is_coupled() {
                    for (k, f) in mesh.groups[p].range().enumerate() {
                        coupling_keys[f] = (salt << 40) | k as u64;
                    }
                }
            }
        }
        Self {
            cells: (0..mesh.n_cells as u64).collect(),
            faces: (0..mesh.n_faces() as u64).map(FaceOrigin::upright).collect(),
            points: (0..mesh.n_points() as u64).collect(),
            groups: (0..mesh.groups.len())
                .map(|ordinal| GroupOrigin::Original { ordinal })
                .collect(),
            coupling_keys,
        }
    }

    /// Check the arrays cover the mesh they describe.
    pub fn validate(&self, mesh: &Mesh) -> Result<(), RedistError> {
        let expect = [
            ("cell addressing", self.cells.len(), mesh.n_cells),
            ("face addressing", self.faces.len(), mesh.n_faces()),
            ("point addressing", self.points.len(), mesh.n_points()),
            ("group addressing", self.groups.len(), mesh.groups.len()),
            ("coupling keys", self.coupling_keys.len(), mesh.n_faces()),
        ];
        for (what, got, expected) in expect {
            if got != expected {
                return Err(RedistError::AddressingSizeMismatch { what, got, expected });
            }
        }
        Ok(())
    }

    /// The four integer provenance arrays in store encoding.
    pub fn encoded(&self) -> EncodedAddressing {
        EncodedAddressing {
            cells: self.cells.iter().map(|&c| c as i64).collect(),
            faces: self.faces.iter().map(|f| f.encode()).collect(),
            points: self.points.iter().map(|&p| p as i64).collect(),
            groups: self.groups.iter().map(|g| g.encode()).collect(),
        }
    }
}

/// Integer provenance arrays as persisted by the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncodedAddressing {
    pub cells: Vec<i64>,
    pub faces: Vec<i64>,
    pub points: Vec<i64>,
    pub groups: Vec<i64>,
}
