//! DistributionMap: the index-addressed migration primitive.
//!
//! A map describes one redistribution as a pair of tables per peer rank:
//! `sub_map[r]` lists the local entries to send to `r` (in stream order)
//! and `construct_map[r]` maps each entry received from `r` onto a local
//! slot of the post-move array. [`DistributionMap::distribute`], invoked
//! on every rank, delivers to each rank exactly the entries destined for
//! it, ordered by declared receipt order — source rank ascending, then the
//! sender's stream position — never by network arrival.
//!
//! Entries carry an optional flip bit. Flips negate orientation-sensitive
//! (flux-like) values when a face's owner side changes across the move;
//! callers opt in per payload via the `oriented` switch, so markers and
//! plain scalars pass through untouched by the same map.
//!
//! The exchange itself is two-phase and non-blocking: post every receive,
//! post every send, then wait for the full set before reading the result.
//! It is collective but not a barrier — ranks may enter at different times,
//! but every rank must eventually enter or its peers block forever.

use crate::comm::wire::{self, WireCount};
use crate::comm::{Communicator, Wait};
use crate::error::RedistError;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// One entry of a sub or construct table.
///
/// On the sub side `index` addresses the pre-move local array; on the
/// construct side it addresses the post-move slot written by the
/// corresponding stream position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MapEntry {
    pub index: usize,
    pub flip: bool,
}

impl MapEntry {
    pub fn plain(index: usize) -> Self {
        Self { index, flip: false }
    }
    pub fn flipped(index: usize) -> Self {
        Self { index, flip: true }
    }
}

/// How a slot receiving several contributions resolves them.
///
/// `Replace` is the positional default: contributions to a shared slot are
/// equal by construction (the flip bit reconciles the two halves of an
/// orientation change), so last-write wins is sound. `Add` accumulates,
/// for agglomerated addressing and merge moves.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Combine {
    Replace,
    Add,
}

/// Component math every distributable payload provides.
///
/// `flipped` is the owner-side sign convention for flux-like quantities;
/// label payloads are orientation-free and return themselves.
pub trait WireValue: Pod {
    fn flipped(self) -> Self;
    fn accumulate(&mut self, other: Self);
}

impl WireValue for f64 {
    fn flipped(self) -> Self {
        -self
    }
    fn accumulate(&mut self, other: Self) {
        *self += other;
    }
}

impl WireValue for i64 {
    fn flipped(self) -> Self {
        self
    }
    fn accumulate(&mut self, other: Self) {
        *self += other;
    }
}

impl WireValue for u64 {
    fn flipped(self) -> Self {
        self
    }
    fn accumulate(&mut self, other: Self) {
        *self = other;
    }
}

impl WireValue for [f64; 3] {
    fn flipped(mut self) -> Self {
        for c in &mut self {
            *c = -*c;
        }
        self
    }
    fn accumulate(&mut self, other: Self) {
        for (c, o) in self.iter_mut().zip(other) {
            *c += o;
        }
    }
}

impl WireValue for [f64; 9] {
    fn flipped(mut self) -> Self {
        for c in &mut self {
            *c = -*c;
        }
        self
    }
    fn accumulate(&mut self, other: Self) {
        for (c, o) in self.iter_mut().zip(other) {
            *c += o;
        }
    }
}

/// The point-to-point communication schedule realizing one redistribution.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DistributionMap {
    n_ranks: usize,
    construct_size: usize,
    sub_map: Vec<Vec<MapEntry>>,
    construct_map: Vec<Vec<MapEntry>>,
}

impl DistributionMap {
    /// Build a map from a per-entity destination-rank array.
    ///
    /// Deterministic regardless of input order: entries are streamed in
    /// ascending destination, ties broken by original index, so independent
    /// arrays sharing one map stay entity-aligned. Exchanges send counts
    /// with every peer to size the construct side.
    pub fn from_destinations<C: Communicator>(
        comm: &C,
        dests: &[usize],
    ) -> Result<Self, RedistError> {
        let n_ranks = comm.size();
        let me = comm.rank();

        let mut sub_map = vec![Vec::new(); n_ranks];
        for (i, &d) in dests.iter().enumerate() {
            if d >= n_ranks {
                return Err(RedistError::BadAssignment(format!(
                    "entry {i} destined for rank {d}, world has {n_ranks}"
                )));
            }
            sub_map[d].push(MapEntry::plain(i));
        }

        // Symmetric count exchange: every peer tells us how many entries it
        // streams our way.
        let tag = comm.alloc_tags(1);
        let mut recvs = Vec::with_capacity(n_ranks.saturating_sub(1));
        for peer in (0..n_ranks).filter(|&p| p != me) {
            recvs.push((peer, comm.irecv(peer, tag, std::mem::size_of::<WireCount>())));
        }
        let mut sends = Vec::with_capacity(n_ranks.saturating_sub(1));
        for peer in (0..n_ranks).filter(|&p| p != me) {
            let count = WireCount::new(sub_map[peer].len());
            sends.push(comm.isend(peer, tag, wire::cast_slice(std::slice::from_ref(&count))));
        }

        let mut incoming = vec![0usize; n_ranks];
        incoming[me] = sub_map[me].len();
        for (peer, h) in recvs {
            let bytes = h.wait().ok_or_else(|| RedistError::Comm {
                neighbor: peer,
                reason: "count exchange receive failed".into(),
            })?;
            incoming[peer] = wire::decode_count(peer, &bytes)?;
        }
        for s in sends {
            let _ = s.wait();
        }

        // Construct slots in declared receipt order: rank ascending, then
        // stream position.
        let mut construct_map = vec![Vec::new(); n_ranks];
        let mut slot = 0usize;
        for (peer, &n) in incoming.iter().enumerate() {
            construct_map[peer] = (0..n)
                .map(|k| MapEntry::plain(slot + k))
                .collect();
            slot += n;
        }

        Ok(Self {
            n_ranks,
            construct_size: slot,
            sub_map,
            construct_map,
        })
    }

    /// Build a map from explicit tables (the mesh mover assembles both
    /// sides itself). `validate` cross-checks the tables against the peers'
    /// before the map is trusted with data.
    pub fn from_tables(
        n_ranks: usize,
        sub_map: Vec<Vec<MapEntry>>,
        construct_map: Vec<Vec<MapEntry>>,
        construct_size: usize,
    ) -> Self {
        debug_assert_eq!(sub_map.len(), n_ranks);
        debug_assert_eq!(construct_map.len(), n_ranks);
        Self {
            n_ranks,
            construct_size,
            sub_map,
            construct_map,
        }
    }

    /// Post-move local entry count.
    pub fn construct_size(&self) -> usize {
        self.construct_size
    }

    /// The same schedule run backwards: construct slots become the send
    /// side, sub entries the receive side. `source_size` is the pre-move
    /// local entity count the reversed map constructs into. Flip bits are
    /// preserved, so an oriented payload returns in its original sign
    /// convention.
    pub fn reverse(&self, source_size: usize) -> Self {
        Self {
            n_ranks: self.n_ranks,
            construct_size: source_size,
            sub_map: self.construct_map.clone(),
            construct_map: self.sub_map.clone(),
        }
    }

    /// Entries this rank streams to `peer`.
    pub fn sub_entries(&self, peer: usize) -> &[MapEntry] {
        &self.sub_map[peer]
    }

    /// Slot table for the stream arriving from `peer`.
    pub fn construct_entries(&self, peer: usize) -> &[MapEntry] {
        &self.construct_map[peer]
    }

    /// Cross-check sub/construct totals with every peer.
    ///
    /// A disagreement anywhere means the two sides of the schedule were
    /// built from different topologies; no data exchange is safe after
    /// that, so the whole job must abort.
    pub fn validate<C: Communicator>(&self, comm: &C) -> Result<(), RedistError> {
        let me = comm.rank();
        let tag = comm.alloc_tags(1);

        let mut recvs = Vec::new();
        for peer in (0..self.n_ranks).filter(|&p| p != me) {
            recvs.push((peer, comm.irecv(peer, tag, std::mem::size_of::<WireCount>())));
        }
        let mut sends = Vec::new();
        for peer in (0..self.n_ranks).filter(|&p| p != me) {
            let count = WireCount::new(self.sub_map[peer].len());
            sends.push(comm.isend(peer, tag, wire::cast_slice(std::slice::from_ref(&count))));
        }

        let mut result = Ok(());
        for (peer, h) in recvs {
            let bytes = h.wait().ok_or_else(|| RedistError::Comm {
                neighbor: peer,
                reason: "table validation receive failed".into(),
            })?;
            let sent = wire::decode_count(peer, &bytes)?;
            let constructed = self.construct_map[peer].len();
            if sent != constructed && result.is_ok() {
                result = Err(RedistError::MapCountMismatch {
                    rank: peer,
                    sent,
                    constructed,
                });
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        if self.sub_map[me].len() != self.construct_map[me].len() {
            return Err(RedistError::MapCountMismatch {
                rank: me,
                sent: self.sub_map[me].len(),
                constructed: self.construct_map[me].len(),
            });
        }
        result
    }

    /// Move a fixed-size payload through the map.
    ///
    /// Consumes `data`: after the call returns, the sender holds no handle
    /// to the migrated values — ownership transfers within this one
    /// exchange. Positional single-writer semantics, no flips.
    pub fn distribute<T, C>(&self, comm: &C, data: Vec<T>) -> Result<Vec<T>, RedistError>
    where
        T: WireValue,
        C: Communicator,
    {
        self.distribute_with(comm, data, false, Combine::Replace)
    }

    /// [`Self::distribute`] with explicit orientation and combine control.
    ///
    /// `oriented` payloads are negated wherever an entry's flip bit is set:
    /// on the sub side while packing, on the construct side while slotting.
    pub fn distribute_with<T, C>(
        &self,
        comm: &C,
        data: Vec<T>,
        oriented: bool,
        combine: Combine,
    ) -> Result<Vec<T>, RedistError>
    where
        T: WireValue,
        C: Communicator,
    {
        let me = comm.rank();
        let tag = comm.alloc_tags(1);

        let mut recvs = Vec::new();
        for peer in (0..self.n_ranks).filter(|&p| p != me) {
            let n = self.construct_map[peer].len();
            if n > 0 {
                recvs.push((peer, comm.irecv(peer, tag, n * std::mem::size_of::<T>())));
            }
        }

        let mut sends = Vec::new();
        let mut send_bufs = Vec::new();
        for peer in (0..self.n_ranks).filter(|&p| p != me) {
            if self.sub_map[peer].is_empty() {
                continue;
            }
            let packed = self.pack(&data, peer, oriented);
            sends.push(comm.isend(peer, tag, wire::cast_slice(&packed)));
            send_bufs.push(packed);
        }

        let mut out = vec![T::zeroed(); self.construct_size];
        let mut written = vec![false; self.construct_size];

        // Rank-local stream bypasses the mailbox entirely.
        let local = self.pack(&data, me, oriented);
        drop(data);
        self.slot(&mut out, &mut written, me, &local, oriented, combine)?;

        for (peer, h) in recvs {
            let bytes = h.wait().ok_or_else(|| RedistError::Comm {
                neighbor: peer,
                reason: "payload receive failed".into(),
            })?;
            let vals: Vec<T> = wire::cast_vec_from(&bytes)?;
            if vals.len() != self.construct_map[peer].len() {
                return Err(RedistError::MapCountMismatch {
                    rank: peer,
                    sent: vals.len(),
                    constructed: self.construct_map[peer].len(),
                });
            }
            self.slot(&mut out, &mut written, peer, &vals, oriented, combine)?;
        }
        for s in sends {
            let _ = s.wait();
        }

        if combine == Combine::Replace {
            debug_assert!(
                written.iter().all(|&w| w),
                "positional map left unwritten construct slots"
            );
        }
        Ok(out)
    }

    /// Move variable-size records through the map (bincode on the wire).
    ///
    /// Ordering semantics are identical to [`Self::distribute`]; flips do
    /// not apply to records.
    pub fn distribute_records<T, C>(&self, comm: &C, data: Vec<T>) -> Result<Vec<T>, RedistError>
    where
        T: Serialize + DeserializeOwned + Clone,
        C: Communicator,
    {
        let me = comm.rank();
        let tag = comm.alloc_tags(2);
        let payload_tag = tag + 1;

        // Stage 1: byte counts. Record batches have no fixed element size,
        // so peers must learn the blob length before posting the receive.
        let mut size_recvs = Vec::new();
        for peer in (0..self.n_ranks).filter(|&p| p != me) {
            if !self.construct_map[peer].is_empty() {
                size_recvs.push((peer, comm.irecv(peer, tag, std::mem::size_of::<WireCount>())));
            }
        }
        let mut encoded = Vec::new();
        let mut size_sends = Vec::new();
        for peer in (0..self.n_ranks).filter(|&p| p != me) {
            if self.sub_map[peer].is_empty() {
                continue;
            }
            let batch: Vec<T> = self.sub_map[peer]
                .iter()
                .map(|e| data[e.index].clone())
                .collect();
            let bytes = wire::encode_records(&batch)?;
            let count = WireCount::new(bytes.len());
            size_sends.push(comm.isend(peer, tag, wire::cast_slice(std::slice::from_ref(&count))));
            encoded.push((peer, bytes));
        }

        // Stage 2: payloads.
        let mut payload_recvs = Vec::new();
        for (peer, h) in size_recvs {
            let bytes = h.wait().ok_or_else(|| RedistError::Comm {
                neighbor: peer,
                reason: "record size receive failed".into(),
            })?;
            let len = wire::decode_count(peer, &bytes)?;
            payload_recvs.push((peer, comm.irecv(peer, payload_tag, len)));
        }
        let mut payload_sends = Vec::new();
        for (peer, bytes) in &encoded {
            payload_sends.push(comm.isend(*peer, payload_tag, bytes));
        }

        let mut out: Vec<Option<T>> = vec![None; self.construct_size];
        for (e, s) in self.sub_map[me].iter().zip(self.construct_map[me].iter()) {
            out[s.index] = Some(data[e.index].clone());
        }
        drop(data);

        for (peer, h) in payload_recvs {
            let bytes = h.wait().ok_or_else(|| RedistError::Comm {
                neighbor: peer,
                reason: "record payload receive failed".into(),
            })?;
            let batch: Vec<T> = wire::decode_records(&bytes)?;
            if batch.len() != self.construct_map[peer].len() {
                return Err(RedistError::MapCountMismatch {
                    rank: peer,
                    sent: batch.len(),
                    constructed: self.construct_map[peer].len(),
                });
            }
            for (slot, rec) in self.construct_map[peer].iter().zip(batch) {
                out[slot.index] = Some(rec);
            }
        }
        for s in size_sends.into_iter().chain(payload_sends) {
            let _ = s.wait();
        }

        out.into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.ok_or_else(|| RedistError::Codec(format!("construct slot {i} received no record")))
            })
            .collect()
    }

    fn pack<T: WireValue>(&self, data: &[T], peer: usize, oriented: bool) -> Vec<T> {
        self.sub_map[peer]
            .iter()
            .map(|e| {
                let v = data[e.index];
                if oriented && e.flip { v.flipped() } else { v }
            })
            .collect()
    }

    fn slot<T: WireValue>(
        &self,
        out: &mut [T],
        written: &mut [bool],
        peer: usize,
        vals: &[T],
        oriented: bool,
        combine: Combine,
    ) -> Result<(), RedistError> {
        for (e, &v) in self.construct_map[peer].iter().zip(vals) {
            let v = if oriented && e.flip { v.flipped() } else { v };
            match combine {
                Combine::Replace => out[e.index] = v,
                Combine::Add => out[e.index].accumulate(v),
            }
            written[e.index] = true;
        }
        Ok(())
    }
}
