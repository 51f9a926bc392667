//! Receiver side of a move: merging mesh chunks into destination pieces.
//!
//! Chunks for one destination partition are merged in ascending source
//! order. Points and faces dedupe by global id; a face arriving from two
//! sources is the reunion of a split pair and becomes internal again, with
//! the surviving owner side resolved by lowest global cell id. Faces whose
//! two cells now land on different destinations become the new
//! inter-partition groups, sorted by canonical id so both halves come out
//! in the same order without any extra exchange.

use crate::distmap::MapEntry;
use crate::error::RedistError;
use crate::redistribute::MovedPiece;
use crate::redistribute::chunks::{GroupDef, MeshChunk, OtherSide};
use crate::topology::{
    BoundaryGroup, BoundaryKind, Face, FaceOrigin, GlobalAddressing, GroupOrigin, Mesh,
};
use hashbrown::HashMap;

/// One face contribution: which stream position delivered it.
struct Contribution {
    rank: usize,
    pos: usize,
    face: crate::redistribute::chunks::ChunkFace,
}

enum Placed {
    Internal { owner: usize, nbr: usize },
    Exterior { ordinal: usize },
    Interface { nei: usize },
}

struct FaceBuild {
    id: u64,
    /// Global point ids, outward from the final owner.
    verts: Vec<u64>,
    placed: Placed,
    owner_local: usize,
    flip_prov: bool,
    fresh: bool,
    key: u64,
    /// (rank, stream position, construct flip) per contribution.
    entries: Vec<(usize, usize, bool)>,
}

/// Everything a rank derives from its received chunks.
pub(crate) struct Assembled {
    pub pieces: Vec<MovedPiece>,
    pub cell_construct: Vec<Vec<MapEntry>>,
    pub face_construct: Vec<Vec<MapEntry>>,
    pub point_construct: Vec<Vec<MapEntry>>,
    pub n_cells: usize,
    pub n_faces: usize,
    pub n_points: usize,
}

pub(crate) fn assemble(
    rank: usize,
    n_ranks: usize,
    n_new: usize,
    chunks: Vec<MeshChunk>,
) -> Result<Assembled, RedistError> {
    // Stream bases per source rank: chunks arrive in declared receipt
    // order (source rank ascending, then the sender's send order), so one
    // pass with per-rank counters recovers every stream position.
    let mut cell_base = vec![0usize; n_ranks];
    let mut face_base = vec![0usize; n_ranks];
    let mut point_base = vec![0usize; n_ranks];
    let mut tagged = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let s = chunk.source as usize % n_ranks;
        if chunk.dest as usize % n_ranks != rank {
            return Err(RedistError::Comm {
                neighbor: s,
                reason: format!("chunk for partition {} misrouted", chunk.dest),
            });
        }
        let bases = (cell_base[s], face_base[s], point_base[s]);
        cell_base[s] += chunk.cells.len();
        face_base[s] += chunk.faces.len();
        point_base[s] += chunk.points.len();
        tagged.push((s, bases, chunk));
    }

    // Ordinal-indexed union of the senders' group tables. Tables agree
    // where they overlap; a slot one sender left blank (it never held that
    // group's faces) fills from whichever sender did.
    let mut group_defs: Vec<GroupDef> = Vec::new();
    for (_, _, chunk) in &tagged {
        for (ordinal, def) in chunk.groups.iter().enumerate() {
            if ordinal >= group_defs.len() {
                group_defs.push(def.clone());
            } else if group_defs[ordinal].name.is_empty() && !def.name.is_empty() {
                group_defs[ordinal] = def.clone();
            }
        }
    }

    // Construct tuples, sorted into per-rank stream order at the end.
    let mut cell_tuples: Vec<(usize, usize, usize, bool)> = Vec::new();
    let mut face_tuples: Vec<(usize, usize, usize, bool)> = Vec::new();
    let mut point_tuples: Vec<(usize, usize, usize, bool)> = Vec::new();

    let mut parts: Vec<usize> = (0..n_new).filter(|p| p % n_ranks == rank).collect();
    parts.sort_unstable();

    let mut pieces = Vec::new();
    let (mut cells_done, mut faces_done, mut points_done) = (0usize, 0usize, 0usize);

    for &part in &parts {
        let mut mine: Vec<usize> = (0..tagged.len())
            .filter(|&i| tagged[i].2.dest as usize == part)
            .collect();
        mine.sort_by_key(|&i| tagged[i].2.source);

        // Cells.
        let mut cell_prov = Vec::new();
        let mut cell_of: HashMap<u64, usize> = HashMap::new();
        for &ti in &mine {
            let (s, (cb, _, _), chunk) = &tagged[ti];
            for (k, &gid) in chunk.cells.iter().enumerate() {
                let local = cell_prov.len();
                cell_prov.push(gid);
                cell_of.insert(gid, local);
                cell_tuples.push((*s, cb + k, cells_done + local, false));
            }
        }

        // Points, deduped by global id. Slots stay in arrival numbering
        // until the face sweep below fixes the final order.
        let mut point_prov = Vec::new();
        let mut positions = Vec::new();
        let mut point_of: HashMap<u64, usize> = HashMap::new();
        let mut piece_point_tuples: Vec<(usize, usize, usize)> = Vec::new();
        for &ti in &mine {
            let (s, (_, _, pb), chunk) = &tagged[ti];
            for (k, pt) in chunk.points.iter().enumerate() {
                let local = *point_of.entry(pt.id).or_insert_with(|| {
                    point_prov.push(pt.id);
                    positions.push(pt.pos);
                    point_prov.len() - 1
                });
                piece_point_tuples.push((*s, pb + k, local));
            }
        }

        // Face contributions, grouped by canonical id in first-seen order.
        let mut face_order: Vec<u64> = Vec::new();
        let mut contribs: HashMap<u64, Vec<Contribution>> = HashMap::new();
        for &ti in &mine {
            let (s, (_, fb, _), chunk) = &tagged[ti];
            for (k, face) in chunk.faces.iter().enumerate() {
                let entry = contribs.entry(face.id).or_insert_with(|| {
                    face_order.push(face.id);
                    Vec::new()
                });
                entry.push(Contribution {
                    rank: *s,
                    pos: fb + k,
                    face: face.clone(),
                });
            }
        }

        let mut builds = Vec::with_capacity(face_order.len());
        for id in &face_order {
            let cs = contribs.remove(id).expect("face id collected above");
            builds.push(classify_face(part, *id, cs, &cell_of)?);
        }

        // Final face order: internal upper-triangular, then original
        // groups by ordinal, then interfaces by neighbour partition.
        let (mut internal, mut exterior, mut interface) = (Vec::new(), Vec::new(), Vec::new());
        for b in builds {
            match b.placed {
                Placed::Internal { .. } => internal.push(b),
                Placed::Exterior { .. } => exterior.push(b),
                Placed::Interface { .. } => interface.push(b),
            }
        }
        internal.sort_by_key(|b| match b.placed {
            Placed::Internal { owner, nbr } => (owner, nbr, b.id),
            _ => unreachable!(),
        });
        exterior.sort_by_key(|b| match b.placed {
            Placed::Exterior { ordinal } => (ordinal, b.key, b.id),
            _ => unreachable!(),
        });
        interface.sort_by_key(|b| match b.placed {
            Placed::Interface { nei } => (nei, b.id),
            _ => unreachable!(),
        });

        // Lay the piece out.
        let n_internal = internal.len();
        let mut faces = Vec::new();
        let mut owner = Vec::new();
        let mut neighbour = Vec::new();
        let mut face_prov = Vec::new();
        let mut coupling_keys = Vec::new();
        let mut fresh_boundary = Vec::new();
        let mut groups = Vec::new();
        let mut group_origins = Vec::new();

        let place = |b: &FaceBuild,
                         faces: &mut Vec<Face>,
                         owner: &mut Vec<usize>,
                         face_prov: &mut Vec<FaceOrigin>,
                         coupling_keys: &mut Vec<u64>,
                         face_tuples: &mut Vec<(usize, usize, usize, bool)>|
         -> Result<(), RedistError> {
            let slot = faces_done + faces.len();
            let pts = b
                .verts
                .iter()
                .map(|gid| {
                    point_of.get(gid).copied().ok_or_else(|| RedistError::Comm {
                        neighbor: rank,
                        reason: format!("face {} references unreceived point {gid}", b.id),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            faces.push(Face::new(pts));
            owner.push(b.owner_local);
            face_prov.push(FaceOrigin {
                id: b.id,
                flipped: b.flip_prov,
            });
            coupling_keys.push(b.key);
            for &(r, pos, flip) in &b.entries {
                face_tuples.push((r, pos, slot, flip));
            }
            Ok(())
        };

        for b in &internal {
            let Placed::Internal { nbr, .. } = b.placed else {
                unreachable!()
            };
            place(
                b,
                &mut faces,
                &mut owner,
                &mut face_prov,
                &mut coupling_keys,
                &mut face_tuples,
            )?;
            neighbour.push(nbr);
        }

        // Original groups, all of them, empty or not.
        for (ordinal, def) in group_defs.iter().enumerate() {
            let start = faces.len();
            for b in exterior.iter().filter(|b| {
                matches!(b.placed, Placed::Exterior { ordinal: o } if o == ordinal)
            }) {
                place(
                    b,
                    &mut faces,
                    &mut owner,
                    &mut face_prov,
                    &mut coupling_keys,
                    &mut face_tuples,
                )?;
                fresh_boundary.push(b.fresh);
            }
            groups.push(BoundaryGroup {
                name: def.name.clone(),
                kind: def.kind.to_boundary_kind(),
                start,
                len: faces.len() - start,
            });
            group_origins.push(GroupOrigin::Original { ordinal });
        }

        // Fresh inter-partition groups, neighbour ascending.
        let mut at = 0;
        while at < interface.len() {
            let Placed::Interface { nei } = interface[at].placed else {
                unreachable!()
            };
            let start = faces.len();
            while at < interface.len()
                && matches!(interface[at].placed, Placed::Interface { nei: n } if n == nei)
            {
                let b = &interface[at];
                place(
                    b,
                    &mut faces,
                    &mut owner,
                    &mut face_prov,
                    &mut coupling_keys,
                    &mut face_tuples,
                )?;
                fresh_boundary.push(b.fresh);
                at += 1;
            }
            groups.push(BoundaryGroup {
                name: format!("interface{part}to{nei}"),
                kind: BoundaryKind::InterPartition { neighbour: nei },
                start,
                len: faces.len() - start,
            });
            group_origins.push(GroupOrigin::Created);
        }

        // Renumber points into first-use order of the final face sweep.
        // Arrival numbering follows the sender's sweep, which later moves
        // do not see; first-use numbering depends only on the piece's own
        // topology, so an identity move reproduces it exactly.
        let mut new_of_old = vec![usize::MAX; positions.len()];
        let mut next = 0usize;
        for face in &faces {
            for &p in &face.points {
                if new_of_old[p] == usize::MAX {
                    new_of_old[p] = next;
                    next += 1;
                }
            }
        }
        for slot in &mut new_of_old {
            if *slot == usize::MAX {
                *slot = next;
                next += 1;
            }
        }
        for face in &mut faces {
            for p in &mut face.points {
                *p = new_of_old[*p];
            }
        }
        let mut reordered_positions = vec![[0.0f64; 3]; positions.len()];
        let mut reordered_prov = vec![0u64; point_prov.len()];
        for (old, &new) in new_of_old.iter().enumerate() {
            reordered_positions[new] = positions[old];
            reordered_prov[new] = point_prov[old];
        }
        for (s, pos, local) in piece_point_tuples {
            point_tuples.push((s, pos, points_done + new_of_old[local], false));
        }

        let mesh = Mesh {
            points: reordered_positions,
            faces,
            owner,
            neighbour,
            n_cells: cell_prov.len(),
            groups,
        };
        if mesh.n_cells == 0 {
            log::warn!("partition {part} ends this move with zero cells");
        }
        mesh.validate()?;

        let addressing = GlobalAddressing {
            cells: cell_prov,
            faces: face_prov,
            points: reordered_prov,
            groups: group_origins,
            coupling_keys,
        };
        addressing.validate(&mesh)?;

        cells_done += mesh.n_cells;
        faces_done += mesh.n_faces();
        points_done += mesh.n_points();

        pieces.push(MovedPiece {
            part,
            mesh,
            addressing,
            fresh_boundary,
        });
    }

    Ok(Assembled {
        cell_construct: tuples_to_tables(cell_tuples, n_ranks)?,
        face_construct: tuples_to_tables(face_tuples, n_ranks)?,
        point_construct: tuples_to_tables(point_tuples, n_ranks)?,
        n_cells: cells_done,
        n_faces: faces_done,
        n_points: points_done,
        pieces,
    })
}

/// Decide what one face becomes on destination partition `part`.
fn classify_face(
    part: usize,
    id: u64,
    cs: Vec<Contribution>,
    cell_of: &HashMap<u64, usize>,
) -> Result<FaceBuild, RedistError> {
    let local = |gid: u64| -> Result<usize, RedistError> {
        cell_of.get(&gid).copied().ok_or_else(|| RedistError::Comm {
            neighbor: 0,
            reason: format!("face {id} references cell {gid} not assigned to partition {part}"),
        })
    };

    if cs.len() == 2 {
        // Reunion of a split pair: both halves' owners are local. The
        // canonical owner (lowest global id) side survives.
        let min_gid = cs.iter().map(|c| c.face.owner).min().unwrap();
        let max_gid = cs.iter().map(|c| c.face.owner).max().unwrap();
        let winner = cs
            .iter()
            .find(|c| c.face.owner == min_gid)
            .expect("min owner present");
        if min_gid == max_gid {
            return Err(RedistError::UnmatchedCoupledFace {
                group: format!("face {id}"),
                key: id,
            });
        }
        return Ok(FaceBuild {
            id,
            verts: winner.face.verts.clone(),
            placed: Placed::Internal {
                owner: local(min_gid)?,
                nbr: local(max_gid)?,
            },
            owner_local: local(min_gid)?,
            flip_prov: winner.face.flipped,
            fresh: false,
            key: 0,
            entries: cs
                .iter()
                .map(|c| (c.rank, c.pos, c.face.owner != min_gid))
                .collect(),
        });
    }

    let c = cs.into_iter().next().expect("at least one contribution");
    let f = &c.face;
    let owner_here = f.owner_dest as usize == part;

    match &f.other {
        OtherSide::Internal { cell, dest } => {
            let nbr_here = *dest as usize == part;
            if owner_here && nbr_here {
                // Stays internal; the stored owner already has the lower
                // global id.
                Ok(FaceBuild {
                    id,
                    verts: f.verts.clone(),
                    placed: Placed::Internal {
                        owner: local(f.owner)?,
                        nbr: local(*cell)?,
                    },
                    owner_local: local(f.owner)?,
                    flip_prov: f.flipped,
                    fresh: false,
                    key: 0,
                    entries: vec![(c.rank, c.pos, false)],
                })
            } else if owner_here {
                // Split: this side keeps the canonical orientation.
                Ok(FaceBuild {
                    id,
                    verts: f.verts.clone(),
                    placed: Placed::Interface {
                        nei: *dest as usize,
                    },
                    owner_local: local(f.owner)?,
                    flip_prov: f.flipped,
                    fresh: true,
                    key: 0,
                    entries: vec![(c.rank, c.pos, false)],
                })
            } else {
                // Split: this side faces the other way.
                let mut verts = f.verts.clone();
                verts.reverse();
                Ok(FaceBuild {
                    id,
                    verts,
                    placed: Placed::Interface {
                        nei: f.owner_dest as usize,
                    },
                    owner_local: local(*cell)?,
                    flip_prov: !f.flipped,
                    fresh: true,
                    key: 0,
                    entries: vec![(c.rank, c.pos, true)],
                })
            }
        }
        OtherSide::Interface { nei_dest } => {
            if *nei_dest as usize == part {
                // The partner half should have arrived as a second
                // contribution; a lone half here means the pair broke.
                return Err(RedistError::UnmatchedCoupledFace {
                    group: format!("interface face {id}"),
                    key: id,
                });
            }
            Ok(FaceBuild {
                id,
                verts: f.verts.clone(),
                placed: Placed::Interface {
                    nei: *nei_dest as usize,
                },
                owner_local: local(f.owner)?,
                flip_prov: f.flipped,
                fresh: false,
                key: 0,
                entries: vec![(c.rank, c.pos, false)],
            })
        }
        OtherSide::Exterior { ordinal, key } => Ok(FaceBuild {
            id,
            verts: f.verts.clone(),
            placed: Placed::Exterior {
                ordinal: *ordinal as usize,
            },
            owner_local: local(f.owner)?,
            flip_prov: f.flipped,
            fresh: false,
            key: *key,
            entries: vec![(c.rank, c.pos, false)],
        }),
    }
}

/// Sort construct tuples into per-rank stream order and check the streams
/// are gap-free.
fn tuples_to_tables(
    mut tuples: Vec<(usize, usize, usize, bool)>,
    n_ranks: usize,
) -> Result<Vec<Vec<MapEntry>>, RedistError> {
    tuples.sort_unstable_by_key(|&(r, pos, _, _)| (r, pos));
    let mut tables = vec![Vec::new(); n_ranks];
    for (r, pos, slot, flip) in tuples {
        if pos != tables[r].len() {
            return Err(RedistError::Comm {
                neighbor: r,
                reason: format!(
                    "construct stream from rank {r} has a gap at position {pos}"
                ),
            });
        }
        tables[r].push(MapEntry { index: slot, flip });
    }
    Ok(tables)
}
