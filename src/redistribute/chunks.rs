//! Sender side of a move: slicing source pieces into per-destination
//! mesh chunks.
//!
//! A chunk is the self-describing record one source partition sends to one
//! destination partition: the assigned cells, every face touching them,
//! the points closing those faces, all named by global ids so receivers
//! can merge chunks from different sources without any shared state. Faces
//! stream in source-index order and points in first-use order — the
//! sub-map side tables rely on exactly that order.

use crate::comm::Communicator;
use crate::distmap::{DistributionMap, MapEntry};
use crate::error::RedistError;
use crate::partitioning::PartId;
use crate::redistribute::MeshPiece;
use crate::topology::{BoundaryKind, GlobalAddressing, GroupOrigin, Mesh};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Original group table entry, shipped with every chunk so destinations
/// can rebuild the full group list even when they held no source piece.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct GroupDef {
    pub name: String,
    pub kind: GroupDefKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum GroupDefKind {
    Plain,
    Periodic { partner: String },
    Indirect { target: String },
}

impl GroupDefKind {
    pub(crate) fn to_boundary_kind(&self) -> BoundaryKind {
        match self {
            GroupDefKind::Plain => BoundaryKind::Plain,
            GroupDefKind::Periodic { partner } => BoundaryKind::Periodic {
                partner: partner.clone(),
            },
            GroupDefKind::Indirect { target } => BoundaryKind::Indirect {
                target: target.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ChunkPoint {
    pub id: u64,
    pub pos: [f64; 3],
}

/// The far side of a chunked face, as the sender knows it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum OtherSide {
    /// Source-internal face: the neighbour cell and its destination.
    Internal { cell: u64, dest: u32 },
    /// Existing inter-partition half: the remote owner's destination.
    Interface { nei_dest: u32 },
    /// Exterior face of an original group (`key` is the canonical
    /// coupling key, zero for plain groups).
    Exterior { ordinal: u32, key: u64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ChunkFace {
    /// Canonical global face id; both halves of a split face share it.
    pub id: u64,
    /// Stored orientation is reversed w.r.t. canonical.
    pub flipped: bool,
    /// Global point ids, outward from `owner`.
    pub verts: Vec<u64>,
    pub owner: u64,
    pub owner_dest: u32,
    pub other: OtherSide,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct MeshChunk {
    pub dest: u32,
    pub source: u32,
    pub groups: Vec<GroupDef>,
    pub cells: Vec<u64>,
    pub points: Vec<ChunkPoint>,
    pub faces: Vec<ChunkFace>,
}

/// Source-local indices behind a chunk's streams, for the sub tables.
/// Indices are already offset into the rank's piece-concatenated spaces.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChunkLocals {
    pub cells: Vec<usize>,
    pub faces: Vec<usize>,
    pub points: Vec<usize>,
}

/// Positional record exchanged across existing inter-partition halves so
/// each side learns where the remote owner cell is headed.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct InterfaceDest {
    from: u32,
    to: u32,
    pos: u64,
    dest: u32,
}

/// For every inter-partition group of every piece, learn the destination
/// partition of the cell on the other side of each face, positionally.
pub(crate) fn exchange_interface_destinations<C: Communicator>(
    comm: &C,
    pieces: &[MeshPiece],
    assignments: &[Vec<PartId>],
) -> Result<Vec<Vec<Vec<u32>>>, RedistError> {
    let w = comm.size();

    let mut records = Vec::new();
    let mut dests = Vec::new();
    for (piece, assign) in pieces.iter().zip(assignments) {
        for (gi, nei) in piece.mesh.interface_groups() {
            let g = &piece.mesh.groups[gi];
            for (pos, f) in g.range().enumerate() {
                records.push(InterfaceDest {
                    from: piece.part as u32,
                    to: nei as u32,
                    pos: pos as u64,
                    dest: assign[piece.mesh.owner[f]] as u32,
                });
                dests.push(nei % w);
            }
        }
    }

    let map = DistributionMap::from_destinations(comm, &dests)?;
    let incoming = map.distribute_records(comm, records)?;

    let mut out: Vec<Vec<Vec<u32>>> = pieces
        .iter()
        .map(|p| {
            p.mesh
                .groups
                .iter()
                .map(|g| {
                    if matches!(g.kind, BoundaryKind::InterPartition { .. }) {
                        vec![u32::MAX; g.len]
                    } else {
                        Vec::new()
                    }
                })
                .collect()
        })
        .collect();

    for rec in incoming {
        let (pi, piece) = pieces
            .iter()
            .enumerate()
            .find(|(_, p)| p.part == rec.to as usize)
            .ok_or_else(|| RedistError::Comm {
                neighbor: rec.from as usize % w,
                reason: format!("interface record for partition {} not held here", rec.to),
            })?;
        let gi = piece
            .mesh
            .groups
            .iter()
            .position(|g| {
                matches!(g.kind, BoundaryKind::InterPartition { neighbour } if neighbour == rec.from as usize)
            })
            .ok_or_else(|| RedistError::UnmatchedCoupledFace {
                group: format!("interface{}to{}", rec.to, rec.from),
                key: rec.pos,
            })?;
        let slot = out[pi][gi].get_mut(rec.pos as usize).ok_or_else(|| {
            RedistError::UnmatchedCoupledFace {
                group: piece.mesh.groups[gi].name.clone(),
                key: rec.pos,
            }
        })?;
        *slot = rec.dest;
    }

    for (pi, piece) in pieces.iter().enumerate() {
        for (gi, g) in piece.mesh.groups.iter().enumerate() {
            if let Some(pos) = out[pi][gi].iter().position(|&d| d == u32::MAX) {
                return Err(RedistError::UnmatchedCoupledFace {
                    group: g.name.clone(),
                    key: pos as u64,
                });
            }
        }
    }
    Ok(out)
}

/// The original group table carried by every chunk of a piece.
fn group_table(piece: &MeshPiece) -> Vec<GroupDef> {
    // Ordinal-indexed: created interface groups are skipped, originals
    // land at their ordinal.
    let max_ordinal = piece
        .addressing
        .groups
        .iter()
        .filter_map(|g| match g {
            GroupOrigin::Original { ordinal } => Some(*ordinal),
            GroupOrigin::Created => None,
        })
        .max();
    let Some(max_ordinal) = max_ordinal else {
        return Vec::new();
    };
    let mut table = vec![
        GroupDef {
            name: String::new(),
            kind: GroupDefKind::Plain,
        };
        max_ordinal + 1
    ];
    for (g, origin) in piece.mesh.groups.iter().zip(&piece.addressing.groups) {
        let GroupOrigin::Original { ordinal } = origin else {
            continue;
        };
        table[*ordinal] = GroupDef {
            name: g.name.clone(),
            kind: match &g.kind {
                BoundaryKind::Plain | BoundaryKind::InterPartition { .. } => GroupDefKind::Plain,
                BoundaryKind::Periodic { partner } => GroupDefKind::Periodic {
                    partner: partner.clone(),
                },
                BoundaryKind::Indirect { target } => GroupDefKind::Indirect {
                    target: target.clone(),
                },
            },
        };
    }
    table
}

/// Per-piece chunking state: one builder per destination touched.
struct PieceChunker {
    part: u32,
    group_defs: Vec<GroupDef>,
    n_points: usize,
    by_dest: HashMap<u32, usize>,
    built: Vec<(MeshChunk, ChunkLocals, Vec<bool>)>,
}

impl PieceChunker {
    fn new(part: u32, group_defs: Vec<GroupDef>, n_points: usize) -> Self {
        Self {
            part,
            group_defs,
            n_points,
            by_dest: HashMap::new(),
            built: Vec::new(),
        }
    }

    fn index_for(&mut self, dest: u32) -> usize {
        if let Some(&i) = self.by_dest.get(&dest) {
            return i;
        }
        self.built.push((
            MeshChunk {
                dest,
                source: self.part,
                groups: self.group_defs.clone(),
                cells: Vec::new(),
                points: Vec::new(),
                faces: Vec::new(),
            },
            ChunkLocals::default(),
            vec![false; self.n_points],
        ));
        let i = self.built.len() - 1;
        self.by_dest.insert(dest, i);
        i
    }

    fn push_cell(&mut self, dest: u32, gid: u64, local: usize) {
        let i = self.index_for(dest);
        self.built[i].0.cells.push(gid);
        self.built[i].1.cells.push(local);
    }

    fn push_face(
        &mut self,
        dest: u32,
        face: ChunkFace,
        mesh: &Mesh,
        addr: &GlobalAddressing,
        f: usize,
        face_offset: usize,
        point_offset: usize,
    ) {
        let i = self.index_for(dest);
        let (chunk, locals, seen) = &mut self.built[i];
        for &p in &mesh.faces[f].points {
            if !seen[p] {
                seen[p] = true;
                chunk.points.push(ChunkPoint {
                    id: addr.points[p],
                    pos: mesh.points[p],
                });
                locals.points.push(point_offset + p);
            }
        }
        chunk.faces.push(face);
        locals.faces.push(face_offset + f);
    }
}

/// Slice this rank's pieces into per-destination chunks.
///
/// Returns the chunks sorted by `(dest, source)` — the canonical send
/// order — with their source-local index tables. `offsets` are the
/// piece-concatenation bases of the rank's cell/face/point spaces.
pub(crate) fn extract_chunks(
    pieces: &[MeshPiece],
    assignments: &[Vec<PartId>],
    nei_dests: &[Vec<Vec<u32>>],
    cell_offsets: &[usize],
    face_offsets: &[usize],
    point_offsets: &[usize],
) -> Result<Vec<(MeshChunk, ChunkLocals)>, RedistError> {
    let mut chunks: Vec<(MeshChunk, ChunkLocals)> = Vec::new();

    for (pi, (piece, assign)) in pieces.iter().zip(assignments).enumerate() {
        let mesh = &piece.mesh;
        let addr = &piece.addressing;
        let mut chunker =
            PieceChunker::new(piece.part as u32, group_table(piece), mesh.n_points());

        for (c, &d) in assign.iter().enumerate() {
            chunker.push_cell(d as u32, addr.cells[c], cell_offsets[pi] + c);
        }

        for f in 0..mesh.n_faces() {
            let o = mesh.owner[f];
            let base = ChunkFace {
                id: addr.faces[f].id,
                flipped: addr.faces[f].flipped,
                verts: mesh.faces[f].points.iter().map(|&p| addr.points[p]).collect(),
                owner: addr.cells[o],
                owner_dest: assign[o] as u32,
                other: OtherSide::Exterior { ordinal: 0, key: 0 },
            };

            if mesh.is_internal(f) {
                let n = mesh.neighbour[f];
                let (od, nd) = (assign[o] as u32, assign[n] as u32);
                let full = ChunkFace {
                    other: OtherSide::Internal {
                        cell: addr.cells[n],
                        dest: nd,
                    },
                    ..base
                };
                if nd != od {
                    chunker.push_face(
                        nd,
                        full.clone(),
                        mesh,
                        addr,
                        f,
                        face_offsets[pi],
                        point_offsets[pi],
                    );
                }
                chunker.push_face(od, full, mesh, addr, f, face_offsets[pi], point_offsets[pi]);
            } else {
                let gi = mesh.group_of(f).expect("boundary face without group");
                let g = &mesh.groups[gi];
                let other = match &g.kind {
                    BoundaryKind::InterPartition { .. } => OtherSide::Interface {
                        nei_dest: nei_dests[pi][gi][f - g.start],
                    },
                    // Plain faces carry key 0 unless an indirect group
                    // couples onto theirs, in which case the pair's key
                    // must survive the move with them.
                    _ => OtherSide::Exterior {
                        ordinal: ordinal_of(addr, gi)?,
                        key: addr.coupling_keys[f],
                    },
                };
                chunker.push_face(
                    assign[o] as u32,
                    ChunkFace { other, ..base },
                    mesh,
                    addr,
                    f,
                    face_offsets[pi],
                    point_offsets[pi],
                );
            }
        }

        chunks.extend(chunker.built.into_iter().map(|(c, l, _)| (c, l)));
    }

    chunks.sort_by_key(|(c, _)| (c.dest, c.source));
    Ok(chunks)
}

fn ordinal_of(addr: &GlobalAddressing, gi: usize) -> Result<u32, RedistError> {
    match addr.groups[gi] {
        GroupOrigin::Original { ordinal } => Ok(ordinal as u32),
        GroupOrigin::Created => Err(RedistError::BadAssignment(format!(
            "group {gi} is a created interface but carries exterior faces"
        ))),
    }
}

/// Sub tables for the cell/face/point maps, in chunk send order.
pub(crate) fn sub_tables(
    chunks: &[(MeshChunk, ChunkLocals)],
    n_ranks: usize,
) -> [Vec<Vec<MapEntry>>; 3] {
    let mut cells = vec![Vec::new(); n_ranks];
    let mut faces = vec![Vec::new(); n_ranks];
    let mut points = vec![Vec::new(); n_ranks];
    for (chunk, locals) in chunks {
        let r = chunk.dest as usize % n_ranks;
        cells[r].extend(locals.cells.iter().map(|&i| MapEntry::plain(i)));
        faces[r].extend(locals.faces.iter().map(|&i| MapEntry::plain(i)));
        points[r].extend(locals.points.iter().map(|&i| MapEntry::plain(i)));
    }
    [cells, faces, points]
}
