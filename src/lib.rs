#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-redist
//!
//! mesh-redist redistributes a large unstructured mesh — points, faces, cells,
//! boundary groups — and every data field attached to it across a set of worker
//! processes, and merges per-worker partial results back into one global
//! description. The worker count may change between runs in either direction;
//! each invocation is a full repartitioning, built on point-to-point
//! non-blocking exchanges that never materialize the whole mesh on one worker.
//!
//! ## Features
//! - [`distmap::DistributionMap`]: the index-addressed migration primitive —
//!   deterministic receipt ordering, optional per-entry sign flips, a combining
//!   operator for agglomerated addressing
//! - [`partitioning`]: pluggable decomposition through the
//!   [`Decomposer`](partitioning::Decomposer) trait, with joint decomposition
//!   of several meshes as one graph union
//! - [`redistribute::move_mesh`]: the mesh mover — relocates topology,
//!   synthesizes matching inter-partition group pairs, records boundary-group
//!   reconciliation and full per-entity provenance
//! - [`fields::FieldMigrator`] / [`reconstruct::FieldReconstructor`]: one
//!   generic migration over value shape and storage location, orientation
//!   flips for flux-like quantities, particle and cell-set companions
//! - Pluggable communication backends (serial, in-process threads, MPI) behind
//!   one non-blocking [`comm::Communicator`] façade
//!
//! ## Determinism
//!
//! Every schedule is deterministic: maps stream entries in ascending
//! destination with ties by original index, receivers slot by declared order
//! rather than arrival order, and both halves of every synthesized interface
//! sort by canonical global face id. Randomized decomposition uses `SmallRng`
//! with explicit seeds, so identical inputs give identical partitionings.
//!
//! ## Usage
//! Add `mesh-redist` as a dependency in your `Cargo.toml` and enable features
//! as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-redist = "0.4"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! A redistribution runs PartitionAssignment → move_mesh → FieldMigrator, all
//! sharing the one set of maps the move produced; reconstruction is the same
//! pipeline with the target count fixed at one.

pub mod comm;
pub mod distmap;
pub mod error;
pub mod fields;
pub mod meshgen;
pub mod partitioning;
pub mod reconstruct;
pub mod redistribute;
pub mod store;
pub mod topology;

pub use error::RedistError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::distmap::{Combine, DistributionMap, MapEntry};
    pub use crate::error::RedistError;
    pub use crate::fields::{
        CellSet, Field, FieldLocation, FieldMigrator, FieldShape, LabelField, NewGroupPolicy,
        Particle, ParticleCloud,
    };
    pub use crate::partitioning::{
        BlockDecomposer, CellGraph, Decomposer, PartId, PartitionAssignment, RandomDecomposer,
        assignment_field, decomposer,
    };
    pub use crate::reconstruct::{FieldReconstructor, reconstruct_mesh};
    pub use crate::redistribute::{
        GroupReconciliation, MeshPiece, MoveMaps, MoveResult, MovedPiece, PieceProfile, move_mesh,
    };
    pub use crate::store::{Store, persist_or_warn};
    pub use crate::topology::{
        BoundaryGroup, BoundaryKind, Face, FaceOrigin, GlobalAddressing, GroupOrigin, Mesh,
        MeshView,
    };
}
