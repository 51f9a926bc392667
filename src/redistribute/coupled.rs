//! Canonical-key checks and lookups across coupled boundary groups.
//!
//! Periodic and indirect couplings are resolved by key equality, never by
//! geometry: each face of a coupled pair carries the canonical key it was
//! born with, and the partner is whatever face holds the equal key on the
//! other side — wherever the move put it. Keys are checked on a home rank
//! (`key % n_ranks`), so the verification is itself point-to-point. A
//! missing partner is a fatal integrity error; there is no degraded
//! warn-and-continue mode.

use crate::comm::Communicator;
use crate::distmap::DistributionMap;
use crate::error::RedistError;
use crate::redistribute::MovedPiece;
use crate::topology::BoundaryKind;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// One side of a coupled pair, published to the key's home rank.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct KeyClaim {
    pair: String,
    key: u64,
    /// 0 for the lexicographically lower group name, 1 for the other.
    side: u8,
    group: String,
}

pub(crate) fn pair_identity(name: &str, partner: &str) -> (String, u8) {
    if name <= partner {
        (format!("{name}\u{1}{partner}"), 0)
    } else {
        (format!("{partner}\u{1}{name}"), 1)
    }
}

/// Collect the coupled faces of every piece as home-routed claims.
///
/// A plain group that an indirect group couples onto claims for the pair
/// too; it carries the pair's keys without being coupled itself.
fn claims(pieces: &[MovedPiece], n_ranks: usize) -> (Vec<KeyClaim>, Vec<usize>) {
    let mut records = Vec::new();
    let mut dests = Vec::new();
    for piece in pieces {
        let targeted: HashMap<&str, &str> = piece
            .mesh
            .groups
            .iter()
            .filter_map(|g| match &g.kind {
                BoundaryKind::Indirect { target } => Some((target.as_str(), g.name.as_str())),
                _ => None,
            })
            .collect();
        for g in &piece.mesh.groups {
            let partner = match &g.kind {
                BoundaryKind::Periodic { partner } => partner.as_str(),
                BoundaryKind::Indirect { target } => target.as_str(),
                BoundaryKind::Plain => match targeted.get(g.name.as_str()) {
                    Some(&indirect) => indirect,
                    None => continue,
                },
                BoundaryKind::InterPartition { .. } => continue,
            };
            let (pair, side) = pair_identity(&g.name, partner);
            for f in g.range() {
                let key = piece.addressing.coupling_keys[f];
                records.push(KeyClaim {
                    pair: pair.clone(),
                    key,
                    side,
                    group: g.name.clone(),
                });
                dests.push((key % n_ranks as u64) as usize);
            }
        }
    }
    (records, dests)
}

/// Verify every coupled face still has exactly one partner with its key.
///
/// Runs after assembly on every rank; the detecting home rank fails the
/// job. Couplings are between two distinctly named groups; a group
/// naming itself as its own partner cannot pass the census.
pub(crate) fn verify_coupled<C: Communicator>(
    comm: &C,
    pieces: &[MovedPiece],
) -> Result<(), RedistError> {
    let (records, dests) = claims(pieces, comm.size());
    let map = DistributionMap::from_destinations(comm, &dests)?;
    let incoming = map.distribute_records(comm, records)?;

    let mut seen: HashMap<(String, u64), [usize; 2]> = HashMap::new();
    for claim in &incoming {
        let counts = seen.entry((claim.pair.clone(), claim.key)).or_insert([0, 0]);
        counts[claim.side as usize] += 1;
    }
    for claim in incoming {
        let counts = seen[&(claim.pair.clone(), claim.key)];
        if counts != [1, 1] {
            return Err(RedistError::UnmatchedCoupledFace {
                group: claim.group,
                key: claim.key,
            });
        }
    }
    Ok(())
}

/// A request for the partner-side value of one coupled face.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct PartnerQuery {
    pair: String,
    key: u64,
    side: u8,
    group: String,
}

/// A published value for one side of a coupled face.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct PartnerValue {
    pair: String,
    key: u64,
    side: u8,
    value: Vec<f64>,
}

/// Fetch, for each query `(group, boundary-face)` pair, the value held by
/// the coupled partner face.
///
/// `donors` are `(pair, key, side, value)` tuples from faces that do hold
/// values; queries are answered through the reversed query map so every
/// requester gets its partner's value back in query order. A query whose
/// partner published nothing is fatal.
pub(crate) fn fetch_partner_values<C: Communicator>(
    comm: &C,
    queries: Vec<(String, String, u64, u8)>,
    donors: Vec<(String, u64, u8, Vec<f64>)>,
) -> Result<Vec<Vec<f64>>, RedistError> {
    let n_ranks = comm.size() as u64;

    let query_records: Vec<PartnerQuery> = queries
        .iter()
        .map(|(group, pair, key, side)| PartnerQuery {
            pair: pair.clone(),
            key: *key,
            side: *side,
            group: group.clone(),
        })
        .collect();
    let query_dests: Vec<usize> = queries.iter().map(|q| (q.2 % n_ranks) as usize).collect();
    let query_map = DistributionMap::from_destinations(comm, &query_dests)?;
    let home_queries = query_map.distribute_records(comm, query_records)?;

    let donor_records: Vec<PartnerValue> = donors
        .iter()
        .map(|(pair, key, side, value)| PartnerValue {
            pair: pair.clone(),
            key: *key,
            side: *side,
            value: value.clone(),
        })
        .collect();
    let donor_dests: Vec<usize> = donors.iter().map(|d| (d.1 % n_ranks) as usize).collect();
    let donor_map = DistributionMap::from_destinations(comm, &donor_dests)?;
    let home_donors = donor_map.distribute_records(comm, donor_records)?;

    let mut published: HashMap<(String, u64, u8), Vec<f64>> = HashMap::new();
    for d in home_donors {
        published.insert((d.pair, d.key, d.side), d.value);
    }

    let answers: Vec<Vec<f64>> = home_queries
        .iter()
        .map(|q| {
            published
                .get(&(q.pair.clone(), q.key, 1 - q.side))
                .cloned()
                .ok_or_else(|| RedistError::UnmatchedCoupledFace {
                    group: q.group.clone(),
                    key: q.key,
                })
        })
        .collect::<Result<_, _>>()?;

    // Route the answers back along the query map.
    let reply_map = query_map.reverse(queries.len());
    reply_map.distribute_records(comm, answers)
}
