//! Per-partition artifact store.
//!
//! Each partition writes into `<root>/partition<p>/<time-tag>/`: the mesh
//! itself, the boundary-group reconciliation records, and the four integer
//! provenance arrays in their sign-bit encoding. Time tags increase
//! monotonically per store root, so successive redistributions never
//! overwrite each other.
//!
//! Store failures do not fail a redistribution — by the time anything is
//! written the in-memory move has already succeeded. Callers wrap writes
//! in [`persist_or_warn`].

use crate::error::RedistError;
use crate::redistribute::{GroupReconciliation, MovedPiece};
use crate::topology::{EncodedAddressing, Mesh};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Handle on one artifact root directory.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The next unused time tag under this root: one past the highest tag
    /// any partition has written so far, starting at 1.
    pub fn next_time_tag(&self) -> Result<u64, RedistError> {
        let mut highest = 0u64;
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            for tagged in fs::read_dir(entry.path())? {
                let tagged = tagged?;
                if let Some(tag) = tagged
                    .file_name()
                    .to_str()
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    highest = highest.max(tag);
                }
            }
        }
        Ok(highest + 1)
    }

    /// Directory one partition writes into at one tag.
    pub fn partition_dir(&self, part: usize, tag: u64) -> PathBuf {
        self.root.join(format!("partition{part}")).join(tag.to_string())
    }

    /// Write one moved piece's artifacts: `mesh.json`, `reconcile.json`,
    /// and `provenance.json`.
    pub fn write_piece(
        &self,
        tag: u64,
        piece: &MovedPiece,
        reconciliation: &[GroupReconciliation],
    ) -> Result<(), RedistError> {
        let dir = self.partition_dir(piece.part, tag);
        fs::create_dir_all(&dir)?;
        write_json(&dir.join("mesh.json"), &piece.mesh)?;
        write_json(&dir.join("reconcile.json"), &reconciliation)?;
        write_json(&dir.join("provenance.json"), &piece.addressing.encoded())?;
        Ok(())
    }

    /// Write an extra artifact (a field, a particle cloud) next to a
    /// partition's mesh.
    pub fn write_artifact<T: Serialize>(
        &self,
        part: usize,
        tag: u64,
        name: &str,
        value: &T,
    ) -> Result<(), RedistError> {
        let dir = self.partition_dir(part, tag);
        fs::create_dir_all(&dir)?;
        write_json(&dir.join(format!("{name}.json")), value)
    }

    pub fn read_mesh(&self, part: usize, tag: u64) -> Result<Mesh, RedistError> {
        read_json(&self.partition_dir(part, tag).join("mesh.json"))
    }

    pub fn read_reconciliation(
        &self,
        part: usize,
        tag: u64,
    ) -> Result<Vec<GroupReconciliation>, RedistError> {
        read_json(&self.partition_dir(part, tag).join("reconcile.json"))
    }

    pub fn read_provenance(&self, part: usize, tag: u64) -> Result<EncodedAddressing, RedistError> {
        read_json(&self.partition_dir(part, tag).join("provenance.json"))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RedistError> {
    let bytes = serde_json::to_vec(value).map_err(RedistError::codec)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RedistError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(RedistError::codec)
}

/// Log a failed artifact write and move on; the redistribution itself has
/// already succeeded when persistence starts.
pub fn persist_or_warn(result: Result<(), RedistError>, what: &str) {
    if let Err(err) = result {
        log::warn!("could not persist {what}: {err}");
    }
}
