//! RedistError: unified error type for mesh-redist public APIs.
//!
//! Every fatal condition in a redistribution maps onto one of these
//! variants. Integrity errors mean the global topology (or a map realizing
//! it) is inconsistent and no worker can safely continue; capability errors
//! are configuration mistakes detected before any communication starts.
//! Resource conditions (empty partitions, imbalance) and store I/O failures
//! are *not* errors here — they are logged and the pipeline continues.

use thiserror::Error;

/// Unified error type for mesh-redist operations.
#[derive(Debug, Error)]
pub enum RedistError {
    /// A distribution map's send table disagrees with the peer's receive
    /// table. Detected by [`crate::distmap::DistributionMap::validate`].
    #[error(
        "distribution map mismatch with rank {rank}: sending {sent} entries, peer constructs {constructed}"
    )]
    MapCountMismatch {
        rank: usize,
        sent: usize,
        constructed: usize,
    },

    /// A field's value count disagrees with the mesh it claims to live on.
    /// Rejected before any communication.
    #[error("field `{name}` carries {got} values but its mesh expects {expected}")]
    FieldSizeMismatch {
        name: String,
        got: usize,
        expected: usize,
    },

    /// A coupled (periodic/indirect/inter-partition) face found no partner
    /// with an equal canonical key anywhere in the new partitioning.
    #[error("no partner face with canonical key {key} for coupled group `{group}`")]
    UnmatchedCoupledFace { group: String, key: u64 },

    /// A face references a cell outside the mesh's cell range.
    #[error("face {face} references cell {cell} but the mesh has {n_cells} cells")]
    CellOutOfRange {
        face: usize,
        cell: usize,
        n_cells: usize,
    },

    /// A face references a point outside the mesh's point range.
    #[error("face {face} references point {point} but the mesh has {n_points} points")]
    PointOutOfRange {
        face: usize,
        point: usize,
        n_points: usize,
    },

    /// A face loop has fewer than three points.
    #[error("face {0} is degenerate (fewer than 3 points)")]
    DegenerateFace(usize),

    /// Boundary groups do not contiguously tile the non-internal face range.
    #[error("boundary group `{group}` breaks the contiguous boundary layout at face {at}")]
    NonContiguousGroups { group: String, at: usize },

    /// Addressing arrays disagree with the mesh they describe.
    #[error("global addressing for `{what}` has {got} entries, mesh has {expected}")]
    AddressingSizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    /// A particle claims a cell outside its partition.
    #[error("particle {particle} attached to cell {cell} but the mesh has {n_cells} cells")]
    ParticleCellOutOfRange {
        particle: usize,
        cell: usize,
        n_cells: usize,
    },

    /// Requested decomposition method is not registered.
    #[error("unknown decomposition method `{0}`")]
    UnknownDecomposer(String),

    /// The decomposition method cannot honor the requested partition count.
    #[error("decomposition method `{method}` cannot produce {requested} partitions")]
    PartitionCountUnsupported { method: String, requested: usize },

    /// An assignment array disagrees with the mesh it partitions, or names a
    /// destination outside `0..n_new`.
    #[error("assignment error: {0}")]
    BadAssignment(String),

    /// A point-to-point exchange with a peer failed or delivered a buffer of
    /// the wrong size.
    #[error("communication with rank {neighbor} failed: {reason}")]
    Comm { neighbor: usize, reason: String },

    /// Record (de)serialization failed on the wire.
    #[error("record codec failure: {0}")]
    Codec(String),

    /// Inter-partition halves survived a reconstruction to one partition.
    #[error("{0} inter-partition faces remained after reconstruction to a single partition")]
    UnmergedInterfaces(usize),

    /// Store I/O failure. Callers persisting artifacts treat this as
    /// non-fatal and log it; see [`crate::store::persist_or_warn`].
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RedistError {
    /// Wrap a bincode failure on the wire path.
    pub(crate) fn codec(err: impl std::fmt::Display) -> Self {
        RedistError::Codec(err.to_string())
    }
}
