//! Communication plans moving multi-vector data between two maps.
//!
//! A plan pairs source elements with target elements holding the same global
//! index. Pairs on the same rank are copied directly; the rest travel through
//! one personalized exchange per call. `forward` runs source -> target,
//! `reverse` runs the same pairs target -> source.

use std::collections::HashMap;

use log::trace;

use crate::core::multivector::MultiVector;
use crate::error::MatError;
use crate::map::BlockMap;
use crate::parallel::Comm;

/// How arriving values combine with what the target already holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineMode {
    /// Overwrite.
    Insert,
    /// Accumulate.
    Add,
}

impl CombineMode {
    #[inline]
    fn apply(self, slot: &mut f64, value: f64) {
        match self {
            CombineMode::Insert => *slot = value,
            CombineMode::Add => *slot += value,
        }
    }
}

pub struct Redistributor<C: Comm> {
    source: BlockMap<C>,
    target: BlockMap<C>,
    /// (source lid, target lid) pairs on this rank.
    permutes: Vec<(usize, usize)>,
    /// Per rank: source lids whose values are sent there on a forward move.
    sends: Vec<Vec<usize>>,
    /// Per rank: target lids filled from there, in the sender's order.
    recvs: Vec<Vec<usize>>,
}

/// Lowest rank listing each of `wanted` in `map`, with its position there.
/// Indices no rank lists are absent from the result. Collective.
///
/// Owners are found through a directory: global index `g` is registered on
/// rank `g mod size`, which answers the queries for it. Each rank holds its
/// own indices plus its share of the directory, never the whole index set.
fn locate_owners<C: Comm>(map: &BlockMap<C>, wanted: &[i64]) -> HashMap<i64, (usize, usize)> {
    let comm = map.comm();
    let size = comm.size();
    let home = |gid: i64| gid.rem_euclid(size as i64) as usize;

    let mut registrations = vec![Vec::new(); size];
    for (lid, &gid) in map.my_global_ids().iter().enumerate() {
        registrations[home(gid)].extend([gid, lid as i64]);
    }
    // senders arrive in rank order, so the first registration is the lowest rank
    let mut directory = HashMap::new();
    for (rank, pairs) in comm.exchange(registrations).iter().enumerate() {
        for pair in pairs.chunks_exact(2) {
            directory.entry(pair[0]).or_insert((rank, pair[1] as usize));
        }
    }

    let mut queries = vec![Vec::new(); size];
    for &gid in wanted {
        queries[home(gid)].push(gid);
    }
    let answers: Vec<Vec<i64>> = comm
        .exchange(queries.clone())
        .iter()
        .map(|gids| {
            gids.iter()
                .flat_map(|gid| match directory.get(gid) {
                    Some(&(rank, lid)) => [rank as i64, lid as i64],
                    None => [-1, 0],
                })
                .collect()
        })
        .collect();

    let mut owners = HashMap::with_capacity(wanted.len());
    for (asked, reply) in queries.iter().zip(comm.exchange(answers)) {
        for (&gid, answer) in asked.iter().zip(reply.chunks_exact(2)) {
            if answer[0] >= 0 {
                owners.insert(gid, (answer[0] as usize, answer[1] as usize));
            }
        }
    }
    owners
}

fn not_held_by<C: Comm>(gids: &[i64], map: &BlockMap<C>) -> Vec<i64> {
    gids.iter().copied().filter(|&gid| !map.my_gid(gid)).collect()
}

fn to_wire(lids: Vec<Vec<usize>>) -> Vec<Vec<u64>> {
    lids.into_iter()
        .map(|l| l.into_iter().map(|x| x as u64).collect())
        .collect()
}

fn from_wire(lids: Vec<Vec<u64>>) -> Vec<Vec<usize>> {
    lids.into_iter()
        .map(|l| l.into_iter().map(|x| x as usize).collect())
        .collect()
}

impl<C: Comm> Redistributor<C> {
    /// Pull plan: every target element receives exactly one source value,
    /// taken locally when this rank owns the index in `source`, otherwise
    /// from the lowest rank that does. Collective.
    ///
    /// Fails on every rank if any rank holds a target index that no rank
    /// owns in `source`.
    pub fn import(source: &BlockMap<C>, target: &BlockMap<C>) -> Result<Self, MatError> {
        let comm = source.comm();
        let size = comm.size();
        let owners = locate_owners(source, &not_held_by(target.my_global_ids(), source));

        let mut permutes = Vec::new();
        let mut requests = vec![Vec::new(); size];
        let mut recvs = vec![Vec::new(); size];
        let mut missing = None;
        for (tgt_lid, &gid) in target.my_global_ids().iter().enumerate() {
            if let Some(src_lid) = source.lid(gid) {
                permutes.push((src_lid, tgt_lid));
            } else if let Some(&(rank, src_lid)) = owners.get(&gid) {
                requests[rank].push(src_lid);
                recvs[rank].push(tgt_lid);
            } else if missing.is_none() {
                missing = Some(gid);
            }
        }

        // Agree on failure before the exchange so no rank is left waiting.
        let flags = comm.all_gather(&[i64::from(missing.is_some()), missing.unwrap_or(0)]);
        if let Some(gid) = flags.iter().find(|f| f[0] == 1).map(|f| f[1]) {
            return Err(MatError::MissingGlobalIndex(gid));
        }

        let sends = from_wire(comm.exchange(to_wire(requests)));
        trace!(
            "import plan: {} local, {} remote, {} exported",
            permutes.len(),
            recvs.iter().map(Vec::len).sum::<usize>(),
            sends.iter().map(Vec::len).sum::<usize>()
        );
        Ok(Redistributor { source: source.clone(), target: target.clone(), permutes, sends, recvs })
    }

    /// Push plan: every source element is delivered to one target element
    /// with the same global index, on this rank when possible, otherwise on
    /// the lowest rank owning it in `target`. Source indices absent from
    /// `target` are dropped. Collective.
    pub fn export(source: &BlockMap<C>, target: &BlockMap<C>) -> Result<Self, MatError> {
        let comm = source.comm();
        let size = comm.size();
        let owners = locate_owners(target, &not_held_by(source.my_global_ids(), target));

        let mut permutes = Vec::new();
        let mut sends = vec![Vec::new(); size];
        let mut notices = vec![Vec::new(); size];
        let mut dropped = 0usize;
        for (src_lid, &gid) in source.my_global_ids().iter().enumerate() {
            if let Some(tgt_lid) = target.lid(gid) {
                permutes.push((src_lid, tgt_lid));
            } else if let Some(&(rank, tgt_lid)) = owners.get(&gid) {
                sends[rank].push(src_lid);
                notices[rank].push(tgt_lid);
            } else {
                dropped += 1;
            }
        }

        let recvs = from_wire(comm.exchange(to_wire(notices)));
        trace!(
            "export plan: {} local, {} sent, {} received, {} dropped",
            permutes.len(),
            sends.iter().map(Vec::len).sum::<usize>(),
            recvs.iter().map(Vec::len).sum::<usize>(),
            dropped
        );
        Ok(Redistributor { source: source.clone(), target: target.clone(), permutes, sends, recvs })
    }

    pub fn source_map(&self) -> &BlockMap<C> {
        &self.source
    }

    pub fn target_map(&self) -> &BlockMap<C> {
        &self.target
    }

    /// Pairs resolved without communication.
    pub fn num_local(&self) -> usize {
        self.permutes.len()
    }

    /// Target elements filled by other ranks on a forward move.
    pub fn num_remote(&self) -> usize {
        self.recvs.iter().map(Vec::len).sum()
    }

    /// Source elements shipped to other ranks on a forward move.
    pub fn num_sent(&self) -> usize {
        self.sends.iter().map(Vec::len).sum()
    }

    /// Moves `src` (over the source map) into `tgt` (over the target map).
    /// Collective.
    pub fn forward(&self, src: &MultiVector<C>, tgt: &mut MultiVector<C>, mode: CombineMode) -> Result<(), MatError> {
        self.check(src, &self.source, tgt, &self.target)?;
        self.transfer(src, tgt, mode, false)
    }

    /// Moves `src` (over the target map) back into `tgt` (over the source
    /// map) along the same pairs. Collective.
    pub fn reverse(&self, src: &MultiVector<C>, tgt: &mut MultiVector<C>, mode: CombineMode) -> Result<(), MatError> {
        self.check(src, &self.target, tgt, &self.source)?;
        self.transfer(src, tgt, mode, true)
    }

    fn check(&self, src: &MultiVector<C>, src_map: &BlockMap<C>, tgt: &MultiVector<C>, tgt_map: &BlockMap<C>) -> Result<(), MatError> {
        if src.num_vectors() != tgt.num_vectors() {
            return Err(MatError::VectorCountMismatch { x: src.num_vectors(), y: tgt.num_vectors() });
        }
        for (v, map) in [(src, src_map), (tgt, tgt_map)] {
            if v.my_length() != map.num_my_elements() {
                return Err(MatError::LengthMismatch { expected: map.num_my_elements(), found: v.my_length() });
            }
        }
        Ok(())
    }

    fn transfer(&self, from: &MultiVector<C>, to: &mut MultiVector<C>, mode: CombineMode, reversed: bool) -> Result<(), MatError> {
        let (send_lids, recv_lids) = if reversed { (&self.recvs, &self.sends) } else { (&self.sends, &self.recvs) };
        let nv = from.num_vectors();

        let outgoing: Vec<Vec<f64>> = send_lids
            .iter()
            .map(|lids| {
                let mut buf = Vec::with_capacity(lids.len() * nv);
                for k in 0..nv {
                    let col = from.column(k);
                    buf.extend(lids.iter().map(|&l| col[l]));
                }
                buf
            })
            .collect();
        let incoming = self.source.comm().exchange(outgoing);

        for k in 0..nv {
            let src = from.column(k);
            let dst = to.column_mut(k);
            for &(s, t) in &self.permutes {
                let (a, b) = if reversed { (t, s) } else { (s, t) };
                mode.apply(&mut dst[b], src[a]);
            }
            for (lids, buf) in recv_lids.iter().zip(&incoming) {
                let n = lids.len();
                let vals = buf
                    .get(k * n..(k + 1) * n)
                    .ok_or(MatError::LengthMismatch { expected: nv * n, found: buf.len() })?;
                for (&l, &v) in lids.iter().zip(vals) {
                    mode.apply(&mut dst[l], v);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};

    #[test]
    fn serial_import_permutes_locally() {
        let src = BlockMap::from_global_ids(vec![0, 1, 2], SerialComm).unwrap();
        let tgt = BlockMap::from_global_ids(vec![2, 0], SerialComm).unwrap();
        let plan = Redistributor::import(&src, &tgt).unwrap();
        assert_eq!((plan.num_local(), plan.num_remote()), (2, 0));

        let x = MultiVector::from_columns(src, vec![vec![10.0, 11.0, 12.0]]).unwrap();
        let mut y = MultiVector::new(tgt, 1);
        plan.forward(&x, &mut y, CombineMode::Insert).unwrap();
        assert_eq!(y.column(0), &[12.0, 10.0]);
    }

    #[test]
    fn directory_finds_lowest_owner() {
        let found = ThreadComm::run(3, |comm| {
            let gids = match comm.rank() {
                0 => vec![7, -4],
                1 => vec![3, 7, 10],
                _ => vec![-4, 3],
            };
            let map = BlockMap::from_global_ids(gids, comm.clone()).unwrap();
            let wanted: Vec<i64> = if comm.rank() == 2 { vec![7, 10, 11] } else { vec![] };
            let mut owners: Vec<_> = locate_owners(&map, &wanted).into_iter().collect();
            owners.sort();
            owners
        });
        assert!(found[0].is_empty() && found[1].is_empty());
        // 7 is listed by ranks 0 and 1; 11 by nobody
        assert_eq!(found[2], vec![(7, (0, 0)), (10, (1, 2))]);
    }

    #[test]
    fn import_of_unknown_index_fails() {
        let src = BlockMap::from_global_ids(vec![0, 1], SerialComm).unwrap();
        let tgt = BlockMap::from_global_ids(vec![1, 5], SerialComm).unwrap();
        let err = Redistributor::import(&src, &tgt).err();
        assert_eq!(err, Some(MatError::MissingGlobalIndex(5)));
    }

    #[test]
    fn export_drops_unmatched_and_reverse_adds_back() {
        let src = BlockMap::from_global_ids(vec![0, 1, 9], SerialComm).unwrap();
        let tgt = BlockMap::from_global_ids(vec![1, 0], SerialComm).unwrap();
        let plan = Redistributor::export(&src, &tgt).unwrap();
        assert_eq!(plan.num_local(), 2);

        let x = MultiVector::from_columns(src.clone(), vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let mut y = MultiVector::new(tgt, 1);
        plan.forward(&x, &mut y, CombineMode::Add).unwrap();
        assert_eq!(y.column(0), &[2.0, 1.0]);

        let mut back = MultiVector::from_columns(src, vec![vec![1.0, 1.0, 1.0]]).unwrap();
        plan.reverse(&y, &mut back, CombineMode::Add).unwrap();
        assert_eq!(back.column(0), &[2.0, 3.0, 1.0]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let a = BlockMap::linear(3, SerialComm);
        let b = BlockMap::linear(4, SerialComm);
        let plan = Redistributor::import(&a, &a).unwrap();
        let x = MultiVector::new(a.clone(), 1);
        let mut y = MultiVector::new(b, 1);
        assert_eq!(
            plan.forward(&x, &mut y, CombineMode::Insert),
            Err(MatError::LengthMismatch { expected: 3, found: 4 })
        );
    }
}
