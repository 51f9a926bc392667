//! Boundary-group reconciliation across one move.
//!
//! For each new group of a partition this records whether it is the same
//! group as before (possibly at a different index), a freshly created
//! inter-partition group, or has no predecessor on this partition. The
//! records are persisted artifacts for downstream consumers — computed
//! once per move, they move no data themselves.

use crate::topology::{BoundaryGroup, BoundaryKind, GroupOrigin, Mesh};
use serde::{Deserialize, Serialize};

/// Fate of one post-move boundary group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupReconciliation {
    /// Same identity as the pre-move group at `old_index`.
    Same { old_index: usize },
    /// Synthesized by the move; `neighbour` is the partition across it.
    Created { neighbour: usize },
    /// No pre-move counterpart on this partition.
    NoPredecessor,
}

/// Reconcile one partition's new group list against its old one.
///
/// `old_groups` is `None` when the partition did not exist before the
/// move. Identity is by name: a recreated inter-partition group with an
/// unchanged name reconciles as `Same`, which is what keeps a P→P
/// identity move free of new groups.
pub fn reconcile(
    old_groups: Option<&[BoundaryGroup]>,
    new_mesh: &Mesh,
    new_origins: &[GroupOrigin],
) -> Vec<GroupReconciliation> {
    new_mesh
        .groups
        .iter()
        .zip(new_origins)
        .map(|(g, origin)| {
            if let Some(old) = old_groups {
                if let Some(old_index) = old.iter().position(|o| o.name == g.name) {
                    return GroupReconciliation::Same { old_index };
                }
            }
            match (origin, &g.kind) {
                (GroupOrigin::Created, BoundaryKind::InterPartition { neighbour }) => {
                    GroupReconciliation::Created {
                        neighbour: *neighbour,
                    }
                }
                _ => GroupReconciliation::NoPredecessor,
            }
        })
        .collect()
}
