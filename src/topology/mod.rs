//! Mesh topology: faces, cells, boundary groups, and global addressing.

pub mod global;
pub mod mesh;
pub mod view;

pub use global::{EncodedAddressing, FaceOrigin, GlobalAddressing, GroupOrigin, GROUP_NEW};
pub use mesh::{BoundaryGroup, BoundaryKind, Face, Mesh};
pub use view::MeshView;
