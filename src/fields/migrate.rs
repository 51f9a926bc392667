//! Field migration across one move.
//!
//! One migration operation covers the whole shape × location space: the
//! value shape picks the wire element ([`f64`], `[f64; 3]`, `[f64; 9]`)
//! and the storage location picks the map (cells or faces) plus the
//! boundary bookkeeping. Orientation flips ride the face map's flip bits
//! and apply only to fields marked `oriented`; markers migrate through the
//! same maps without flips; particles travel with their owning cell and
//! reattach at its new local index.
//!
//! All methods are collective: every rank of the move's world must call
//! them in the same order with the same [`NewGroupPolicy`].

use crate::comm::Communicator;
use crate::distmap::{Combine, DistributionMap};
use crate::error::RedistError;
use crate::fields::{CellSet, Field, FieldLocation, FieldShape, LabelField, Particle, ParticleCloud};
use crate::redistribute::coupled;
use crate::redistribute::{GroupReconciliation, MoveResult, MovedPiece, PieceProfile};
use crate::topology::BoundaryKind;
use hashbrown::HashMap;
use itertools::izip;
use serde::{Deserialize, Serialize};

/// How a boundary-group block with no migrated values initializes.
///
/// Applies to groups reconciled as `Created` (fresh inter-partition
/// halves) or `NoPredecessor`. Whole-surface fields never need it — a
/// fresh half inherits the old internal value through the face map.
#[derive(Clone, Debug, PartialEq)]
pub enum NewGroupPolicy {
    /// All components zero.
    Zero,
    /// One value per component, replicated over the block.
    Uniform(Vec<f64>),
    /// Copy from the coupled periodic partner by canonical key; groups
    /// without a periodic partner fall back to zero.
    PeriodicPartner,
}

/// What every rank must agree on before a field's payload moves.
type FieldSpec = (String, FieldShape, FieldLocation, bool);

/// Migrates fields, markers, particles, and cell sets along one move.
pub struct FieldMigrator<'a, C: Communicator> {
    comm: &'a C,
    result: &'a MoveResult,
}

impl<'a, C: Communicator> FieldMigrator<'a, C> {
    pub fn new(comm: &'a C, result: &'a MoveResult) -> Self {
        Self { comm, result }
    }

    fn profiles(&self) -> &[PieceProfile] {
        &self.result.profiles
    }

    fn pieces(&self) -> &[MovedPiece] {
        &self.result.pieces
    }

    /// Move one logical field, given as one part per old piece, onto the
    /// new partitioning, one part per new piece.
    ///
    /// A rank whose partitions are all new passes no parts; the field's
    /// shape and location are agreed across the world before any payload
    /// moves, so every rank joins the exchange on the same map.
    pub fn migrate(
        &self,
        parts: Vec<Field>,
        policy: &NewGroupPolicy,
    ) -> Result<Vec<Field>, RedistError> {
        let local = self.check_parts(&parts)?;
        let Some((name, shape, location, oriented)) = self.agree_spec(local)? else {
            // Nothing anywhere holds this field, so nothing can arrive.
            return Ok(self
                .pieces()
                .iter()
                .map(|p| {
                    Field::new(
                        "",
                        FieldShape::Scalar,
                        FieldLocation::Cells,
                        false,
                        vec![0.0; p.mesh.n_cells],
                    )
                })
                .collect());
        };
        let n_comps = shape.n_comps();

        let values = match location {
            FieldLocation::Cells | FieldLocation::Faces => {
                let flat: Vec<f64> = parts.into_iter().flat_map(|f| f.values).collect();
                let map = self.map_for(location);
                distribute_shaped(self.comm, map, shape, flat, oriented)?
            }
            FieldLocation::Boundary => {
                // Boundary values ride the face map inside a whole-surface
                // work array; internal slots carry zeros and are dropped
                // again on the other side.
                let mut work = Vec::new();
                for (profile, part) in izip!(self.profiles(), &parts) {
                    work.extend(std::iter::repeat(0.0).take(profile.n_internal_faces * n_comps));
                    work.extend_from_slice(&part.values);
                }
                drop(parts);
                let moved =
                    distribute_shaped(self.comm, &self.result.maps.faces, shape, work, oriented)?;
                self.strip_internal(&moved, n_comps)
            }
        };

        let mut out = self.split_new(values, location, n_comps, &name, shape, oriented);
        if location == FieldLocation::Boundary {
            self.apply_policy(&mut out, shape, policy)?;
        }
        Ok(out)
    }

    /// Move a discrete marker field. Labels never flip; a boundary block
    /// with no predecessor comes out zeroed.
    pub fn migrate_labels(&self, parts: Vec<LabelField>) -> Result<Vec<LabelField>, RedistError> {
        if parts.len() != self.profiles().len() {
            return Err(RedistError::BadAssignment(format!(
                "{} label parts for {} pieces",
                parts.len(),
                self.profiles().len()
            )));
        }
        let local = parts
            .first()
            .map(|p| (p.name.clone(), p.location));
        for (profile, part) in izip!(self.profiles(), &parts) {
            let expected = entity_count(profile, part.location);
            if part.values.len() != expected
                || Some(part.location) != local.as_ref().map(|(_, l)| *l)
            {
                return Err(RedistError::FieldSizeMismatch {
                    name: part.name.clone(),
                    got: part.values.len(),
                    expected,
                });
            }
        }
        let Some((name, location)) = self.agree_spec(local)? else {
            return Ok(self
                .pieces()
                .iter()
                .map(|p| LabelField {
                    name: String::new(),
                    location: FieldLocation::Cells,
                    values: vec![0; p.mesh.n_cells],
                })
                .collect());
        };

        let values = match location {
            FieldLocation::Cells | FieldLocation::Faces => {
                let flat: Vec<i64> = parts.into_iter().flat_map(|p| p.values).collect();
                self.map_for(location).distribute(self.comm, flat)?
            }
            FieldLocation::Boundary => {
                let mut work = Vec::new();
                for (profile, part) in izip!(self.profiles(), &parts) {
                    work.extend(std::iter::repeat(0i64).take(profile.n_internal_faces));
                    work.extend_from_slice(&part.values);
                }
                let moved = self.result.maps.faces.distribute(self.comm, work)?;
                self.strip_internal(&moved, 1)
            }
        };

        let mut out = Vec::with_capacity(self.pieces().len());
        let mut at = 0;
        for piece in self.pieces() {
            let n = match location {
                FieldLocation::Cells => piece.mesh.n_cells,
                FieldLocation::Faces => piece.mesh.n_faces(),
                FieldLocation::Boundary => piece.mesh.n_boundary_faces(),
            };
            out.push(LabelField {
                name: name.clone(),
                location,
                values: values[at..at + n].to_vec(),
            });
            at += n;
        }
        Ok(out)
    }

    /// Move particle clouds: each particle follows its owning cell and
    /// reattaches at the cell's new local index, payload untouched.
    pub fn migrate_particles(
        &self,
        clouds: Vec<ParticleCloud>,
    ) -> Result<Vec<ParticleCloud>, RedistError> {
        if clouds.len() != self.profiles().len() {
            return Err(RedistError::BadAssignment(format!(
                "{} particle clouds for {} pieces",
                clouds.len(),
                self.profiles().len()
            )));
        }
        let n_ranks = self.comm.size();

        let mut records = Vec::new();
        let mut dests = Vec::new();
        for (profile, cloud) in izip!(self.profiles(), clouds) {
            let ParticleCloud {
                name,
                cells,
                particles,
            } = cloud;
            if cells.len() != particles.len() {
                return Err(RedistError::FieldSizeMismatch {
                    name,
                    got: cells.len(),
                    expected: particles.len(),
                });
            }
            for (i, (cell, particle)) in cells.into_iter().zip(particles).enumerate() {
                if cell >= profile.n_cells {
                    return Err(RedistError::ParticleCellOutOfRange {
                        particle: i,
                        cell,
                        n_cells: profile.n_cells,
                    });
                }
                dests.push(profile.cell_dest[cell] % n_ranks);
                records.push(TravelingParticle {
                    name: name.clone(),
                    cell: profile.cell_ids[cell],
                    particle,
                });
            }
        }

        let map = DistributionMap::from_destinations(self.comm, &dests)?;
        let arrived = map.distribute_records(self.comm, records)?;

        // Reattachment table: global cell id to (piece, local index).
        let mut cell_home: HashMap<u64, (usize, usize)> = HashMap::new();
        for (pi, piece) in self.pieces().iter().enumerate() {
            for (local, &gid) in piece.addressing.cells.iter().enumerate() {
                cell_home.insert(gid, (pi, local));
            }
        }

        let mut out: Vec<ParticleCloud> = self
            .pieces()
            .iter()
            .map(|_| ParticleCloud::default())
            .collect();
        for record in arrived {
            let &(pi, local) =
                cell_home
                    .get(&record.cell)
                    .ok_or_else(|| RedistError::BadAssignment(format!(
                        "particle owner cell {} did not arrive on this rank",
                        record.cell
                    )))?;
            if out[pi].name.is_empty() {
                out[pi].name = record.name;
            }
            out[pi].cells.push(local);
            out[pi].particles.push(record.particle);
        }
        Ok(out)
    }

    /// Move named auxiliary cell subsets alongside the mesh.
    pub fn migrate_cell_sets(
        &self,
        sets: Vec<Vec<CellSet>>,
    ) -> Result<Vec<Vec<CellSet>>, RedistError> {
        if sets.len() != self.profiles().len() {
            return Err(RedistError::BadAssignment(format!(
                "{} cell-set lists for {} pieces",
                sets.len(),
                self.profiles().len()
            )));
        }
        let n_ranks = self.comm.size();

        let mut records = Vec::new();
        let mut dests = Vec::new();
        for (profile, list) in izip!(self.profiles(), sets) {
            for set in list {
                for &cell in &set.cells {
                    if cell >= profile.n_cells {
                        return Err(RedistError::BadAssignment(format!(
                            "cell set `{}` names cell {cell}, partition {} has {} cells",
                            set.name, profile.part, profile.n_cells
                        )));
                    }
                    dests.push(profile.cell_dest[cell] % n_ranks);
                    records.push((set.name.clone(), profile.cell_ids[cell]));
                }
            }
        }

        let map = DistributionMap::from_destinations(self.comm, &dests)?;
        let arrived = map.distribute_records(self.comm, records)?;

        let mut cell_home: HashMap<u64, (usize, usize)> = HashMap::new();
        for (pi, piece) in self.pieces().iter().enumerate() {
            for (local, &gid) in piece.addressing.cells.iter().enumerate() {
                cell_home.insert(gid, (pi, local));
            }
        }

        let mut grouped: Vec<HashMap<String, Vec<usize>>> =
            self.pieces().iter().map(|_| HashMap::new()).collect();
        for (name, gid) in arrived {
            let &(pi, local) = cell_home.get(&gid).ok_or_else(|| {
                RedistError::BadAssignment(format!(
                    "cell set member {gid} did not arrive on this rank"
                ))
            })?;
            grouped[pi].entry(name).or_default().push(local);
        }

        Ok(grouped
            .into_iter()
            .map(|by_name| {
                let mut list: Vec<CellSet> = by_name
                    .into_iter()
                    .map(|(name, mut cells)| {
                        cells.sort_unstable();
                        CellSet { name, cells }
                    })
                    .collect();
                list.sort_by(|a, b| a.name.cmp(&b.name));
                list
            })
            .collect())
    }

    fn map_for(&self, location: FieldLocation) -> &DistributionMap {
        match location {
            FieldLocation::Cells => &self.result.maps.cells,
            FieldLocation::Faces | FieldLocation::Boundary => &self.result.maps.faces,
        }
    }

    /// Reject anything inconsistent before a single byte moves. `None`
    /// when this rank holds no parts (all of its partitions are new).
    fn check_parts(&self, parts: &[Field]) -> Result<Option<FieldSpec>, RedistError> {
        if parts.len() != self.profiles().len() {
            return Err(RedistError::BadAssignment(format!(
                "{} field parts for {} pieces",
                parts.len(),
                self.profiles().len()
            )));
        }
        let Some(first) = parts.first() else {
            return Ok(None);
        };
        let (name, shape, location, oriented) =
            (first.name.clone(), first.shape, first.location, first.oriented);
        for (profile, part) in izip!(self.profiles(), parts) {
            if part.shape != shape || part.location != location || part.oriented != oriented {
                return Err(RedistError::BadAssignment(format!(
                    "field `{}` parts disagree on shape, location, or orientation",
                    part.name
                )));
            }
            let expected = entity_count(profile, location) * shape.n_comps();
            if part.values.len() != expected {
                return Err(RedistError::FieldSizeMismatch {
                    name: part.name.clone(),
                    got: part.values.len(),
                    expected,
                });
            }
        }
        Ok(Some((name, shape, location, oriented)))
    }

    /// Agree one value across the world: every rank publishes its local
    /// claim to rank 0, which checks that all claims match and answers
    /// everyone along the reversed map. Ranks without a claim (no old
    /// pieces) learn the result; disagreement is fatal.
    fn agree_spec<T>(&self, local: Option<T>) -> Result<Option<T>, RedistError>
    where
        T: Serialize + serde::de::DeserializeOwned + Clone + PartialEq,
    {
        let gather = DistributionMap::from_destinations(self.comm, &[0])?;
        let claims = gather.distribute_records(self.comm, vec![local])?;

        let agreed = if self.comm.rank() == 0 {
            let mut chosen: Option<T> = None;
            for claim in claims.iter().flatten() {
                match &chosen {
                    None => chosen = Some(claim.clone()),
                    Some(c) if c == claim => {}
                    Some(_) => {
                        return Err(RedistError::BadAssignment(
                            "field parts disagree across ranks".into(),
                        ));
                    }
                }
            }
            chosen
        } else {
            None
        };

        let reply = gather.reverse(1);
        let data = if self.comm.rank() == 0 {
            vec![agreed; claims.len()]
        } else {
            Vec::new()
        };
        let mut answers = reply.distribute_records(self.comm, data)?;
        Ok(answers.pop().flatten())
    }

    /// Keep only the boundary blocks of a whole-surface array, in new
    /// piece concatenation order.
    fn strip_internal<T: Copy>(&self, moved: &[T], n_comps: usize) -> Vec<T> {
        let mut out = Vec::new();
        let mut at = 0;
        for piece in self.pieces() {
            let internal = piece.mesh.n_internal_faces() * n_comps;
            let all = piece.mesh.n_faces() * n_comps;
            out.extend_from_slice(&moved[at + internal..at + all]);
            at += all;
        }
        out
    }

    fn split_new(
        &self,
        values: Vec<f64>,
        location: FieldLocation,
        n_comps: usize,
        name: &str,
        shape: FieldShape,
        oriented: bool,
    ) -> Vec<Field> {
        let mut out = Vec::with_capacity(self.pieces().len());
        let mut at = 0;
        for piece in self.pieces() {
            let n = location.n_entities(&piece.mesh) * n_comps;
            out.push(Field::new(
                name,
                shape,
                location,
                oriented,
                values[at..at + n].to_vec(),
            ));
            at += n;
        }
        out
    }

    /// Overwrite the blocks of groups without migrated values.
    ///
    /// `PeriodicPartner` is itself collective (a key exchange answers the
    /// queries), so every rank takes this path together even with nothing
    /// to fill.
    fn apply_policy(
        &self,
        fields: &mut [Field],
        shape: FieldShape,
        policy: &NewGroupPolicy,
    ) -> Result<(), RedistError> {
        let n_comps = shape.n_comps();
        if let NewGroupPolicy::Uniform(defaults) = policy {
            if defaults.len() != n_comps {
                return Err(RedistError::FieldSizeMismatch {
                    name: "uniform group default".into(),
                    got: defaults.len(),
                    expected: n_comps,
                });
            }
        }

        let mut queries = Vec::new();
        let mut query_slots = Vec::new();
        let mut donors = Vec::new();

        for (pi, (piece, recs)) in
            izip!(self.pieces(), &self.result.reconciliations).enumerate()
        {
            let internal = piece.mesh.n_internal_faces();
            for (group, rec) in piece.mesh.groups.iter().zip(recs) {
                let fresh = matches!(
                    rec,
                    GroupReconciliation::Created { .. } | GroupReconciliation::NoPredecessor
                );
                let periodic_partner = match &group.kind {
                    BoundaryKind::Periodic { partner } => Some(partner),
                    _ => None,
                };
                if !fresh {
                    // A settled periodic group can donate its values to a
                    // partner that starts from nothing.
                    if let (Some(partner), NewGroupPolicy::PeriodicPartner) =
                        (periodic_partner, policy)
                    {
                        let (pair, side) = coupled::pair_identity(&group.name, partner);
                        for f in group.range() {
                            let local = (f - internal) * n_comps;
                            donors.push((
                                pair.clone(),
                                piece.addressing.coupling_keys[f],
                                side,
                                fields[pi].values[local..local + n_comps].to_vec(),
                            ));
                        }
                    }
                    continue;
                }
                for f in group.range() {
                    let local = (f - internal) * n_comps;
                    match (policy, periodic_partner) {
                        (NewGroupPolicy::Uniform(defaults), _) => {
                            fields[pi].values[local..local + n_comps]
                                .copy_from_slice(defaults);
                        }
                        (NewGroupPolicy::PeriodicPartner, Some(partner)) => {
                            let (pair, side) = coupled::pair_identity(&group.name, partner);
                            queries.push((
                                group.name.clone(),
                                pair,
                                piece.addressing.coupling_keys[f],
                                side,
                            ));
                            query_slots.push((pi, local));
                        }
                        _ => {
                            fields[pi].values[local..local + n_comps].fill(0.0);
                        }
                    }
                }
            }
        }

        if *policy == NewGroupPolicy::PeriodicPartner {
            let answers = coupled::fetch_partner_values(self.comm, queries, donors)?;
            for ((pi, local), value) in query_slots.into_iter().zip(answers) {
                if value.len() != n_comps {
                    return Err(RedistError::FieldSizeMismatch {
                        name: "periodic partner value".into(),
                        got: value.len(),
                        expected: n_comps,
                    });
                }
                fields[pi].values[local..local + n_comps].copy_from_slice(&value);
            }
        }
        Ok(())
    }
}

/// One particle on the wire, keyed by its owner's global cell id.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct TravelingParticle {
    name: String,
    cell: u64,
    particle: Particle,
}

fn entity_count(profile: &PieceProfile, location: FieldLocation) -> usize {
    match location {
        FieldLocation::Cells => profile.n_cells,
        FieldLocation::Faces => profile.n_faces,
        FieldLocation::Boundary => profile.n_boundary_faces(),
    }
}

/// Route a flat component array through `map` with the element width the
/// shape dictates.
fn distribute_shaped<C: Communicator>(
    comm: &C,
    map: &DistributionMap,
    shape: FieldShape,
    values: Vec<f64>,
    oriented: bool,
) -> Result<Vec<f64>, RedistError> {
    match shape {
        FieldShape::Scalar => map.distribute_with(comm, values, oriented, Combine::Replace),
        FieldShape::Vector => {
            let packed: Vec<[f64; 3]> = values
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            let moved = map.distribute_with(comm, packed, oriented, Combine::Replace)?;
            Ok(moved.into_iter().flatten().collect())
        }
        FieldShape::Tensor => {
            let packed: Vec<[f64; 9]> = values
                .chunks_exact(9)
                .map(|c| {
                    let mut t = [0.0; 9];
                    t.copy_from_slice(c);
                    t
                })
                .collect();
            let moved = map.distribute_with(comm, packed, oriented, Combine::Replace)?;
            Ok(moved.into_iter().flatten().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::meshgen::block_mesh;
    use crate::redistribute::{MeshPiece, move_mesh};

    fn moved_pair() -> (NoComm, MoveResult) {
        let comm = NoComm::default();
        let (mesh, addressing) = block_mesh(2, 1, 1);
        let piece = MeshPiece {
            part: 0,
            mesh,
            addressing,
        };
        let result = move_mesh(&comm, vec![piece], &[vec![0, 1]], 2).unwrap();
        (comm, result)
    }

    #[test]
    fn cell_scalars_follow_their_cells() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);

        let rho = Field::cell_scalar("rho", vec![10.0, 20.0]);
        let parts = migrator.migrate(vec![rho], &NewGroupPolicy::Zero).unwrap();
        assert_eq!(parts.len(), 2);
        for (piece, part) in result.pieces.iter().zip(&parts) {
            assert_eq!(part.values.len(), piece.mesh.n_cells);
            for (local, &gid) in piece.addressing.cells.iter().enumerate() {
                assert_eq!(part.values[local], 10.0 * (gid + 1) as f64);
            }
        }
    }

    #[test]
    fn oriented_surface_values_disagree_in_sign_across_the_cut() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);

        let (mesh, _) = block_mesh(2, 1, 1);
        let phi = Field::surface_scalar(
            "phi",
            (0..mesh.n_faces()).map(|f| f as f64 + 1.0).collect(),
            true,
        );
        let parts = migrator.migrate(vec![phi], &NewGroupPolicy::Zero).unwrap();

        // The split face appears once per half; oriented values negate.
        let mut halves = Vec::new();
        for (piece, part) in result.pieces.iter().zip(&parts) {
            let (gi, _) = piece.mesh.interface_groups().next().unwrap();
            let f = piece.mesh.groups[gi].start;
            halves.push(part.values[f]);
        }
        assert_eq!(halves[0], -halves[1]);
        assert_eq!(halves[0].abs(), 1.0);
    }

    #[test]
    fn boundary_blocks_with_no_history_take_the_policy_value() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);

        let (mesh, _) = block_mesh(2, 1, 1);
        let q = Field::boundary_scalar("q", vec![5.0; mesh.n_boundary_faces()]);
        let parts = migrator
            .migrate(vec![q], &NewGroupPolicy::Uniform(vec![-3.0]))
            .unwrap();

        // Partition 0 existed before the move: its original groups keep
        // their migrated values and only the fresh half takes the default.
        // Partition 1 is brand new, so every one of its groups starts from
        // the default.
        for ((piece, recs), part) in result
            .pieces
            .iter()
            .zip(&result.reconciliations)
            .zip(&parts)
        {
            let internal = piece.mesh.n_internal_faces();
            for (g, rec) in piece.mesh.groups.iter().zip(recs) {
                let expect = match rec {
                    GroupReconciliation::Same { .. } => 5.0,
                    _ => -3.0,
                };
                for f in g.range() {
                    assert_eq!(part.values[f - internal], expect, "face {f}");
                }
            }
        }
        assert!(
            result.reconciliations[1]
                .iter()
                .all(|r| !matches!(r, GroupReconciliation::Same { .. }))
        );
    }

    #[test]
    fn mismatched_part_count_is_rejected() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);
        let err = migrator.migrate(vec![], &NewGroupPolicy::Zero).unwrap_err();
        assert!(matches!(err, RedistError::BadAssignment(_)));
    }

    #[test]
    fn labels_migrate_without_flips() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);

        let zone = LabelField::cells("zone", vec![7, -7]);
        let parts = migrator.migrate_labels(vec![zone]).unwrap();
        for (piece, part) in result.pieces.iter().zip(&parts) {
            for (local, &gid) in piece.addressing.cells.iter().enumerate() {
                let expect = if gid == 0 { 7 } else { -7 };
                assert_eq!(part.values[local], expect);
            }
        }
    }

    #[test]
    fn particles_reattach_at_the_new_local_index() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);

        let mut cloud = ParticleCloud::new("tracers");
        cloud.push(1, Particle { id: 42, values: vec![0.5, 2.5] });
        let clouds = migrator.migrate_particles(vec![cloud]).unwrap();

        let total: usize = clouds.iter().map(|c| c.len()).sum();
        assert_eq!(total, 1);
        for (piece, cloud) in result.pieces.iter().zip(&clouds) {
            for (&local, particle) in cloud.cells.iter().zip(&cloud.particles) {
                assert_eq!(piece.addressing.cells[local], 1);
                assert_eq!(particle.id, 42);
                assert_eq!(particle.values, vec![0.5, 2.5]);
            }
        }
    }

    #[test]
    fn cell_sets_keep_their_members() {
        let (comm, result) = moved_pair();
        let migrator = FieldMigrator::new(&comm, &result);

        let sets = vec![vec![CellSet {
            name: "refined".into(),
            cells: vec![0, 1],
        }]];
        let out = migrator.migrate_cell_sets(sets).unwrap();

        let mut gids = Vec::new();
        for (piece, list) in result.pieces.iter().zip(&out) {
            for set in list {
                assert_eq!(set.name, "refined");
                gids.extend(set.cells.iter().map(|&c| piece.addressing.cells[c]));
            }
        }
        gids.sort_unstable();
        assert_eq!(gids, vec![0, 1]);
    }
}
