//! Communication engine for cell-centered boundary values.
//!
//! A round runs `init_recv` → `pack_and_send` → `recv_and_unpack` (retried
//! until `Complete`) → `clear_send` / `clear_recv`. Routes are computed once
//! from the [`BlockPack`]: a neighbor on this rank is filled by packing
//! straight into its receive buffer, any other neighbor through the
//! [`Transport`] with the tag of the receiving `(local id, slot)`.

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::algs::communicator::{Delivery, ProcessContext, Transport, Wait};
use crate::algs::wire::{CommTag, expect_exact_len};
use crate::bvals::buffer::{BufferKind, BufferStatus, Lane};
use crate::bvals::index_ranges::{ArraySel, IndexBox};
use crate::bvals::kernels::{PackJob, run_pack_jobs, unpack_cells};
use crate::bvals::pool::BufferPool;
use crate::data::Real;
use crate::data::array::{BlockArray, CellVars};
use crate::data::indices::RegionIndices;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshHaloError;
use crate::topology::direction::{Direction, DirectionClass};
use crate::topology::neighbor::{BlockPack, Refinement};

/// Result of one non-blocking task step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Complete,
    /// Not everything has arrived; call again later.
    Incomplete,
    /// Fatal; the run must abort.
    Fail,
}

impl TaskStatus {
    /// Flatten a fallible step into a status, logging the failure.
    pub fn from_result(op: &str, result: Result<TaskStatus, MeshHaloError>) -> TaskStatus {
        match result {
            Ok(status) => status,
            Err(e) => {
                log::error!("{op} failed: {e}");
                TaskStatus::Fail
            }
        }
    }

    pub fn is_complete(self) -> bool {
        self == TaskStatus::Complete
    }
}

/// A block's coarse chunk and the coarse array shape.
type CoarseChunk<'a> = (&'a mut [Real], [usize; 5]);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Target {
    /// Receiving block `dm` on this rank, its slot `dest`.
    Local { dm: usize, dest: usize },
    Remote { rank: usize, tag: CommTag },
}

#[derive(Clone, Debug)]
struct SendRoute {
    m: usize,
    slot: usize,
    variant: Refinement,
    range: IndexBox,
    len: usize,
    target: Target,
}

#[derive(Clone, Debug)]
struct RecvRoute {
    m: usize,
    slot: usize,
    variant: Refinement,
    range: IndexBox,
    len: usize,
    /// `None` when the sender lives on this rank.
    source: Option<(usize, CommTag)>,
}

#[derive(Debug)]
struct Channel<C> {
    transport: C,
    send: Vec<SendRoute>,
    recv: Vec<RecvRoute>,
}

/// Boundary-value exchange for one rank's block pack.
#[derive(Debug)]
pub struct BoundaryValues<T: Transport> {
    pack: BlockPack,
    pool: BufferPool<T::Request>,
    vars: Channel<T>,
    flux: Channel<T>,
    /// Indices into `vars.recv`, grouped by receiving block.
    recv_by_block: Vec<Vec<usize>>,
    needs_coarse: bool,
}

impl<T: Transport> BoundaryValues<T> {
    /// Allocate buffers for `nvar` cell variables and `nflx` flux variables
    /// and compute every route of `pack`.
    pub fn new(
        ctx: &ProcessContext<T>,
        pack: BlockPack,
        indcs: RegionIndices,
        nvar: usize,
        nflx: usize,
    ) -> Result<Self, MeshHaloError> {
        pack.validate()?;
        if ctx.rank() != pack.rank || ctx.size() != pack.nranks() {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "transport is rank {} of {}, pack is rank {} of {}",
                ctx.rank(),
                ctx.size(),
                pack.rank,
                pack.nranks()
            )));
        }
        if pack.ndim != indcs.ndim() {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "{}-D pack with {}-D block extents",
                pack.ndim,
                indcs.ndim()
            )));
        }
        if pack.is_multilevel() {
            indcs.check_multilevel()?;
        }
        ctx.check_tag_range(pack.nmb_eachrank.iter().copied().max().unwrap_or(0))?;
        let pool = BufferPool::allocate(indcs, pack.nmb(), nvar, nflx)?;

        let mut vars_send = Vec::new();
        let mut vars_recv = Vec::new();
        let mut flux_send = Vec::new();
        let mut flux_recv = Vec::new();
        let mut claimed = HashSet::new();
        for m in 0..pack.nmb() {
            for slot in 0..pool.nslots() {
                let Some(nb) = pack.neighbor(m, slot) else { continue };
                let variant = pack.refinement(m, nb);
                let face = Direction::from_slot(slot)?.class() == DirectionClass::Face;
                let len = pool.transfer_len(slot, variant)?;
                let target = if nb.rank == pack.rank {
                    let dm = pack.local_index(nb.gid).ok_or(MeshHaloError::MissingBlock(nb.gid))?;
                    if !claimed.insert((dm, nb.dest)) {
                        return Err(MeshHaloError::DuplicateDestination {
                            block: dm,
                            slot: nb.dest,
                        });
                    }
                    let back = Refinement::between(pack.levels[dm], pack.levels[m]);
                    let expected = pool.transfer_len(nb.dest, back)?;
                    if expected != len {
                        return Err(MeshHaloError::BufferSizeMismatch {
                            slot: nb.dest,
                            variant: back.name(),
                            expected,
                            actual: len,
                        });
                    }
                    Target::Local { dm, dest: nb.dest }
                } else {
                    Target::Remote {
                        rank: nb.rank,
                        tag: CommTag::for_buffer(pack.remote_local_id(nb), nb.dest),
                    }
                };
                let source =
                    (nb.rank != pack.rank).then(|| (nb.rank, CommTag::for_buffer(m, slot)));

                vars_send.push(SendRoute {
                    m,
                    slot,
                    variant,
                    range: pool.send_buffer(slot)?.range(variant).clone(),
                    len,
                    target,
                });
                vars_recv.push(RecvRoute {
                    m,
                    slot,
                    variant,
                    range: pool.recv_buffer(slot)?.range(variant).clone(),
                    len,
                    source,
                });
                if nflx > 0 && face && variant == Refinement::Coarser {
                    flux_send.push(SendRoute {
                        m,
                        slot,
                        variant,
                        range: IndexBox::default(),
                        len: pool.flux_len(slot)?,
                        target,
                    });
                }
                if nflx > 0 && face && variant == Refinement::Finer {
                    flux_recv.push(RecvRoute {
                        m,
                        slot,
                        variant,
                        range: IndexBox::default(),
                        len: pool.flux_len(slot)?,
                        source,
                    });
                }
            }
        }

        let mut recv_by_block = vec![Vec::new(); pack.nmb()];
        for (n, r) in vars_recv.iter().enumerate() {
            recv_by_block[r.m].push(n);
        }
        let needs_coarse = vars_send
            .iter()
            .any(|r| r.variant == Refinement::Coarser);
        let nlocal = vars_send
            .iter()
            .filter(|r| matches!(r.target, Target::Local { .. }))
            .count();
        log::debug!(
            "rank {}: {} blocks, {} routes ({nlocal} local), {} flux sends, {} flux receives",
            pack.rank,
            pack.nmb(),
            vars_send.len(),
            flux_send.len(),
            flux_recv.len()
        );

        Ok(Self {
            pack,
            pool,
            vars: Channel {
                transport: ctx.channel(),
                send: vars_send,
                recv: vars_recv,
            },
            flux: Channel {
                transport: ctx.channel(),
                send: flux_send,
                recv: flux_recv,
            },
            recv_by_block,
            needs_coarse,
        })
    }

    pub fn pack(&self) -> &BlockPack {
        &self.pack
    }

    pub fn pool(&self) -> &BufferPool<T::Request> {
        &self.pool
    }

    /// Whether some neighbor is coarser, so packing reads `coarse_u`.
    pub fn needs_coarse(&self) -> bool {
        self.needs_coarse
    }

    /// Status of the receive buffer of block `m` in `slot`.
    pub fn recv_status(
        &self,
        kind: BufferKind,
        m: usize,
        slot: usize,
    ) -> Result<BufferStatus, MeshHaloError> {
        self.check_block(m)?;
        Ok(self.pool.recv_buffer(slot)?.lane(kind).status(m))
    }

    /// Status of the send buffer of block `m` in `slot`.
    pub fn send_status(
        &self,
        kind: BufferKind,
        m: usize,
        slot: usize,
    ) -> Result<BufferStatus, MeshHaloError> {
        self.check_block(m)?;
        Ok(self.pool.send_buffer(slot)?.lane(kind).status(m))
    }

    fn check_block(&self, m: usize) -> Result<(), MeshHaloError> {
        if m >= self.pack.nmb() {
            return Err(MeshHaloError::MissingBlock(m));
        }
        Ok(())
    }

    fn channel(&self, kind: BufferKind) -> &Channel<T> {
        match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        }
    }

    /// Mark every receive buffer with a neighbor `Waiting` and post the
    /// cross-rank receives.
    pub fn init_recv(&mut self, kind: BufferKind) -> Result<(), MeshHaloError> {
        let channel = match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        };
        for r in &channel.recv {
            let lane = self.pool.recv[r.slot].lane_mut(kind);
            if lane.pending_mut(r.m).is_some() {
                return Err(MeshHaloError::Invariant(format!(
                    "block {} slot {}: previous receive not cleared",
                    r.m, r.slot
                )));
            }
            lane.set_status(r.m, BufferStatus::Waiting);
            if let Some((rank, tag)) = r.source {
                *lane.pending_mut(r.m) = Some(channel.transport.irecv(rank, tag, r.len)?);
            }
        }
        self.pool.debug_assert_invariants();
        Ok(())
    }

    /// Pack every boundary of `vars` and send it.
    ///
    /// Same-rank neighbors receive their data immediately; their receive
    /// buffers must have been posted with [`init_recv`](Self::init_recv).
    pub fn pack_and_send(&mut self, vars: &CellVars) -> Result<TaskStatus, MeshHaloError> {
        let coarse = self.check_vars(vars)?;
        self.check_targets(BufferKind::Vars)?;

        let targets = claim_targets(&mut self.pool, BufferKind::Vars, &self.vars.send)?;
        let mut jobs = Vec::with_capacity(targets.len());
        for (r, out) in targets {
            let src = source_array(&vars.u, coarse, r.variant)?;
            jobs.push(PackJob {
                dims: src.dims(),
                block: src.block(r.m),
                range: &r.range,
                out,
            });
        }
        run_pack_jobs(jobs);

        self.post_sends(BufferKind::Vars)?;
        self.pool.debug_assert_invariants();
        Ok(TaskStatus::Complete)
    }

    /// Fill the flux buffers toward coarser face neighbors and send them.
    ///
    /// `fill(m, slot, out)` writes the flux payload of block `m` across `slot`.
    pub fn send_flux_payloads<F>(&mut self, fill: F) -> Result<TaskStatus, MeshHaloError>
    where
        F: Fn(usize, usize, &mut [Real]) + Sync,
    {
        self.check_targets(BufferKind::Flux)?;
        claim_targets(&mut self.pool, BufferKind::Flux, &self.flux.send)?
            .into_par_iter()
            .for_each(|(r, out)| fill(r.m, r.slot, out));

        self.post_sends(BufferKind::Flux)?;
        Ok(TaskStatus::Complete)
    }

    fn check_targets(&self, kind: BufferKind) -> Result<(), MeshHaloError> {
        for r in &self.channel(kind).send {
            match r.target {
                Target::Local { dm, dest } => {
                    if self.pool.recv[dest].lane(kind).status(dm) != BufferStatus::Waiting {
                        return Err(MeshHaloError::ReceiveNotPosted { block: dm, slot: dest });
                    }
                }
                Target::Remote { .. } => {
                    if self.pool.send[r.slot].lane(kind).pending_blocks().any(|m| m == r.m) {
                        return Err(MeshHaloError::Invariant(format!(
                            "block {} slot {}: previous send not cleared",
                            r.m, r.slot
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn post_sends(&mut self, kind: BufferKind) -> Result<(), MeshHaloError> {
        let channel = match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        };
        for r in &channel.send {
            match r.target {
                Target::Local { dm, dest } => {
                    self.pool.recv[dest].lane_mut(kind).set_status(dm, BufferStatus::Ready);
                }
                Target::Remote { rank, tag } => {
                    let lane = self.pool.send[r.slot].lane_mut(kind);
                    let request = channel.transport.isend(rank, tag, &lane.chunk(r.m)[..r.len])?;
                    *lane.pending_mut(r.m) = Some(request);
                    lane.set_status(r.m, BufferStatus::Waiting);
                }
            }
        }
        Ok(())
    }

    /// Observe finished receives without blocking.
    ///
    /// `Incomplete` while any posted receive of `kind` is still in flight.
    pub fn try_complete(&mut self, kind: BufferKind) -> Result<TaskStatus, MeshHaloError> {
        let channel = match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        };
        let mut complete = true;
        for r in &channel.recv {
            let lane = self.pool.recv[r.slot].lane_mut(kind);
            match lane.status(r.m) {
                BufferStatus::Ready => continue,
                BufferStatus::Undefined => {
                    return Err(MeshHaloError::ReceiveNotPosted { block: r.m, slot: r.slot });
                }
                BufferStatus::Waiting => {}
            }
            let outcome = match lane.pending_mut(r.m).as_mut() {
                Some(request) => request.test()?,
                // local sender has not packed yet
                None => None,
            };
            match outcome {
                Some(delivery) => {
                    *lane.pending_mut(r.m) = None;
                    store_delivery(lane, r, delivery)?;
                }
                None => complete = false,
            }
        }
        Ok(if complete {
            TaskStatus::Complete
        } else {
            TaskStatus::Incomplete
        })
    }

    /// Block until every posted receive of `kind` finishes.
    pub fn clear_recv(&mut self, kind: BufferKind) -> Result<(), MeshHaloError> {
        let channel = match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        };
        for r in &channel.recv {
            let lane = self.pool.recv[r.slot].lane_mut(kind);
            if let Some(request) = lane.pending_mut(r.m).take() {
                let delivery = request.wait()?;
                store_delivery(lane, r, delivery)?;
            }
        }
        Ok(())
    }

    /// Block until every receive of `kind` is `Ready`.
    ///
    /// A same-rank buffer still `Waiting` here can never complete and is
    /// reported as [`MeshHaloError::NotReady`].
    pub fn wait_all(&mut self, kind: BufferKind) -> Result<(), MeshHaloError> {
        self.clear_recv(kind)?;
        for r in &self.channel(kind).recv {
            if self.pool.recv[r.slot].lane(kind).status(r.m) != BufferStatus::Ready {
                return Err(MeshHaloError::NotReady { block: r.m, slot: r.slot });
            }
        }
        Ok(())
    }

    /// Block until every posted send of `kind` finishes, so its buffer can be reused.
    pub fn clear_send(&mut self, kind: BufferKind) -> Result<(), MeshHaloError> {
        let channel = match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        };
        for r in &channel.send {
            let lane = self.pool.send[r.slot].lane_mut(kind);
            if let Some(request) = lane.pending_mut(r.m).take() {
                match request.wait()? {
                    Delivery::Sent => lane.set_status(r.m, BufferStatus::Ready),
                    Delivery::Received(_) => {
                        return Err(MeshHaloError::Invariant(format!(
                            "send handle of block {} slot {} completed as a receive",
                            r.m, r.slot
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Unpack every completed receive into `vars`.
    ///
    /// Returns `Incomplete`, leaving `vars` untouched, until all receives of
    /// the round have arrived. Data from coarser neighbors lands in the ghost
    /// zones of `coarse_u`.
    pub fn recv_and_unpack(&mut self, vars: &mut CellVars) -> Result<TaskStatus, MeshHaloError> {
        self.check_vars(vars)?;
        if self.try_complete(BufferKind::Vars)? == TaskStatus::Incomplete {
            return Ok(TaskStatus::Incomplete);
        }

        let mut work: Vec<Vec<(ArraySel, &IndexBox, &[Real])>> = vec![Vec::new(); self.pack.nmb()];
        for (m, routes) in self.recv_by_block.iter().enumerate() {
            for &n in routes {
                let r = &self.vars.recv[n];
                let payload = self.pool.recv[r.slot].vars.payload(m, r.slot, r.len)?;
                work[m].push((ArraySel::for_variant(r.variant), &r.range, payload));
            }
        }

        let fdims = vars.u.dims();
        let unpack_block = |m: usize, fine: &mut [Real], mut coarse: Option<CoarseChunk<'_>>| {
            for (sel, range, payload) in &work[m] {
                match (sel, coarse.as_mut()) {
                    (ArraySel::Fine, _) => {
                        unpack_cells(fdims, fine, range, payload);
                    }
                    (ArraySel::Coarse, Some((chunk, cdims))) => {
                        unpack_cells(*cdims, chunk, range, payload);
                    }
                    (ArraySel::Coarse, None) => {
                        return Err(MeshHaloError::InvalidConfig(
                            "coarser neighbor needs a coarse array".into(),
                        ));
                    }
                }
            }
            Ok(())
        };
        let CellVars { u, coarse_u } = vars;
        match coarse_u.as_mut() {
            Some(c) => {
                let cdims = c.dims();
                u.par_blocks_mut()
                    .zip(c.par_blocks_mut())
                    .enumerate()
                    .try_for_each(|(m, (f, c))| unpack_block(m, f, Some((c, cdims))))?;
            }
            None => {
                u.par_blocks_mut()
                    .enumerate()
                    .try_for_each(|(m, f)| unpack_block(m, f, None))?;
            }
        }
        Ok(TaskStatus::Complete)
    }

    /// Hand every completed flux payload to `consume(m, slot, payload)`.
    pub fn recv_flux_payloads<F>(&mut self, mut consume: F) -> Result<TaskStatus, MeshHaloError>
    where
        F: FnMut(usize, usize, &[Real]),
    {
        if self.try_complete(BufferKind::Flux)? == TaskStatus::Incomplete {
            return Ok(TaskStatus::Incomplete);
        }
        for r in &self.flux.recv {
            consume(r.m, r.slot, self.pool.recv[r.slot].flux.payload(r.m, r.slot, r.len)?);
        }
        Ok(TaskStatus::Complete)
    }

    /// Check `vars` against the pool and return the coarse array when needed.
    fn check_vars<'a>(&self, vars: &'a CellVars) -> Result<Option<&'a BlockArray>, MeshHaloError> {
        let indcs = self.pool.indices();
        let (nk, nj, ni) = indcs.cell_dims();
        let expected = [self.pool.nmb(), self.pool.nvar(), nk, nj, ni];
        if vars.u.dims() != expected {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "field array {:?}, buffers sized for {expected:?}",
                vars.u.dims()
            )));
        }
        match (&vars.coarse_u, self.needs_coarse) {
            (Some(c), _) => {
                let (ck, cj, ci) = indcs.coarse().cell_dims();
                let cexpected = [self.pool.nmb(), self.pool.nvar(), ck, cj, ci];
                if c.dims() != cexpected {
                    return Err(MeshHaloError::InvalidGeometry(format!(
                        "coarse array {:?}, expected {cexpected:?}",
                        c.dims()
                    )));
                }
                Ok(Some(c))
            }
            (None, true) => Err(MeshHaloError::InvalidConfig(
                "multi-level pack needs a coarse array".into(),
            )),
            (None, false) => Ok(None),
        }
    }
}

/// Pair every send route with the buffer chunk it writes: the receiver's
/// own receive buffer for a same-rank neighbor, else this block's send buffer.
fn claim_targets<'a, R>(
    pool: &'a mut BufferPool<R>,
    kind: BufferKind,
    routes: &'a [SendRoute],
) -> Result<Vec<(&'a SendRoute, &'a mut [Real])>, MeshHaloError> {
    let mut send_chunks: HashMap<(usize, usize), &mut [Real]> = HashMap::new();
    for (slot, b) in pool.send.iter_mut().enumerate() {
        for (m, c) in b.lane_mut(kind).chunks_mut().into_iter().enumerate() {
            send_chunks.insert((slot, m), c);
        }
    }
    let mut recv_chunks: HashMap<(usize, usize), &mut [Real]> = HashMap::new();
    for (slot, b) in pool.recv.iter_mut().enumerate() {
        for (m, c) in b.lane_mut(kind).chunks_mut().into_iter().enumerate() {
            recv_chunks.insert((slot, m), c);
        }
    }
    routes
        .iter()
        .map(|r| {
            let (chunk, block, slot) = match r.target {
                Target::Local { dm, dest } => (recv_chunks.remove(&(dest, dm)), dm, dest),
                Target::Remote { .. } => (send_chunks.remove(&(r.slot, r.m)), r.m, r.slot),
            };
            let chunk = chunk.ok_or(MeshHaloError::DuplicateDestination { block, slot })?;
            Ok((r, &mut chunk[..r.len]))
        })
        .collect()
}

fn source_array<'a>(
    fine: &'a BlockArray,
    coarse: Option<&'a BlockArray>,
    variant: Refinement,
) -> Result<&'a BlockArray, MeshHaloError> {
    match ArraySel::for_variant(variant) {
        ArraySel::Fine => Ok(fine),
        ArraySel::Coarse => coarse.ok_or_else(|| {
            MeshHaloError::InvalidConfig("coarser neighbor needs a coarse array".into())
        }),
    }
}

fn store_delivery<R>(
    lane: &mut Lane<R>,
    r: &RecvRoute,
    delivery: Delivery,
) -> Result<(), MeshHaloError> {
    match delivery {
        Delivery::Received(payload) => {
            let peer = r.source.map_or(0, |(rank, _)| rank);
            expect_exact_len(peer, payload.len(), r.len)?;
            lane.chunk_mut(r.m)[..r.len].copy_from_slice(&payload);
            lane.set_status(r.m, BufferStatus::Ready);
            Ok(())
        }
        Delivery::Sent => Err(MeshHaloError::Invariant(format!(
            "receive handle of block {} slot {} completed as a send",
            r.m, r.slot
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoTransport;
    use crate::topology::direction::{NEIGHBOR_SLOTS, X2_LOWER_FACE, X2_UPPER_FACE};
    use crate::topology::lattice::{Periodicity, UniformLattice};
    use crate::topology::neighbor::NeighborDescriptor;

    fn serial_engine(
        nblocks: [usize; 3],
        nvar: usize,
    ) -> (BoundaryValues<NoTransport>, RegionIndices) {
        let idx = RegionIndices::new(4, 4, 1, 2).unwrap();
        let lat = UniformLattice::new(nblocks, Periodicity::all()).unwrap();
        let pack = lat.block_pack(2, 0, 1).unwrap();
        let ctx = ProcessContext::new(NoTransport);
        (BoundaryValues::new(&ctx, pack, idx, nvar, 0).unwrap(), idx)
    }

    #[test]
    fn pack_requires_posted_receives() {
        let (mut bv, idx) = serial_engine([2, 1, 1], 1);
        let vars = CellVars::new(2, 1, &idx, false);
        assert!(matches!(
            bv.pack_and_send(&vars),
            Err(MeshHaloError::ReceiveNotPosted { .. })
        ));
    }

    #[test]
    fn periodic_pair_fills_ghosts() {
        let (mut bv, idx) = serial_engine([2, 1, 1], 1);
        let mut vars = CellVars::new(2, 1, &idx, false);
        vars.u.fill_with(|m, _, _, j, i| (m * 100 + j * 10 + i) as Real);
        bv.init_recv(BufferKind::Vars).unwrap();
        assert_eq!(bv.pack_and_send(&vars).unwrap(), TaskStatus::Complete);
        assert_eq!(bv.recv_and_unpack(&mut vars).unwrap(), TaskStatus::Complete);
        // block 0's +x1 ghosts come from block 1's first interior columns
        assert_eq!(vars.u.at(0, 0, 0, 3, 6), 132.0);
        assert_eq!(vars.u.at(0, 0, 0, 3, 7), 133.0);
        // x2 is periodic onto itself: lower ghost row 1 is interior row 5
        assert_eq!(vars.u.at(1, 0, 0, 1, 2), 152.0);
        // corners wrap too
        assert_eq!(vars.u.at(0, 0, 0, 0, 0), 144.0);
    }

    #[test]
    fn unpack_is_incomplete_until_local_pack() {
        let (mut bv, idx) = serial_engine([1, 1, 1], 2);
        let mut vars = CellVars::new(1, 2, &idx, false);
        vars.u.fill_with(|_, v, _, j, i| (v * 1000 + j * 10 + i) as Real);
        let before = vars.clone();
        bv.init_recv(BufferKind::Vars).unwrap();
        assert_eq!(bv.recv_and_unpack(&mut vars).unwrap(), TaskStatus::Incomplete);
        assert_eq!(vars, before);
        assert_eq!(
            bv.recv_status(BufferKind::Vars, 0, X2_LOWER_FACE).unwrap(),
            BufferStatus::Waiting
        );
        assert!(matches!(
            bv.wait_all(BufferKind::Vars),
            Err(MeshHaloError::NotReady { .. })
        ));
    }

    #[test]
    fn duplicate_local_destination_is_rejected() {
        let idx = RegionIndices::new(4, 4, 1, 2).unwrap();
        let mut neighbors = vec![[None; NEIGHBOR_SLOTS]; 2];
        let nb = |gid| NeighborDescriptor {
            gid,
            rank: 0,
            level: 0,
            dest: X2_UPPER_FACE,
        };
        neighbors[0][X2_LOWER_FACE] = Some(nb(1));
        neighbors[0][X2_UPPER_FACE] = Some(nb(1));
        let pack = BlockPack {
            ndim: 2,
            rank: 0,
            gids_eachrank: vec![0],
            nmb_eachrank: vec![2],
            levels: vec![0, 0],
            neighbors,
        };
        let ctx = ProcessContext::new(NoTransport);
        assert!(matches!(
            BoundaryValues::new(&ctx, pack, idx, 1, 0),
            Err(MeshHaloError::DuplicateDestination { block: 1, slot: X2_UPPER_FACE })
        ));
    }

    #[test]
    fn failures_flatten_to_fail() {
        let err = Err(MeshHaloError::MissingBlock(3));
        assert_eq!(TaskStatus::from_result("unpack", err), TaskStatus::Fail);
        assert!(TaskStatus::from_result("unpack", Ok(TaskStatus::Complete)).is_complete());
    }
}
