//! Orbital advection across the x2 faces of a shearing box.
//!
//! Every block trades the `ng + max_integer_shift` rows nearest each x2
//! face with its two x2 neighbors, which must sit at the same level. Buffer
//! `0` holds rows from the lower neighbor (slot 8), buffer `1` rows from the
//! upper one (slot 12); rows this block packs for its lower neighbor land in
//! that neighbor's buffer `1` and vice versa.
//!
//! Once both buffers are `Ready`, every x1 column is shifted along x2 by the
//! local orbital displacement: cell-centered data is remapped in place,
//! face-centered data through effective EMFs and a constrained-transport
//! update (see [`crate::shearing::ct`]).

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::algs::communicator::{Delivery, ProcessContext, Transport, Wait};
use crate::algs::wire::{CommTag, expect_exact_len};
use crate::bvals::buffer::{BufferStatus, Lane};
use crate::bvals::engine::TaskStatus;
use crate::bvals::index_ranges::IndexBox;
use crate::bvals::kernels::{PackJob, chunk_offset, run_pack_jobs};
use crate::data::Real;
use crate::data::array::{BlockArray, EdgeField, FaceField};
use crate::data::indices::{BlockSize, RegionIndices, cell_center_x, left_edge_x};
use crate::mesh_error::MeshHaloError;
use crate::shearing::ct::{ct_update, shifted_face_flux};
use crate::shearing::remap::{ReconstructionMethod, load_shifted, remap_fluxes};
use crate::shearing::shift::{OrbitalState, ShiftSplit};
use crate::topology::direction::{X2_LOWER_FACE, X2_UPPER_FACE};
use crate::topology::neighbor::BlockPack;

/// Slots of the lower and upper x2 faces, indexed by buffer number.
pub const SHEAR_SLOTS: [usize; 2] = [X2_LOWER_FACE, X2_UPPER_FACE];

/// Which field an orbital exchange carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShearKind {
    /// Cell-centered variables.
    Cell,
    /// Face-centered magnetic field (`B3` and `B1`).
    Face,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Target {
    /// Buffer `1 - n` of block `dm` on this rank.
    Local { dm: usize },
    Remote { rank: usize, tag: CommTag },
}

#[derive(Copy, Clone, Debug)]
struct ShearRoute {
    m: usize,
    /// 0: rows toward the lower neighbor, 1: toward the upper one.
    n: usize,
    target: Target,
    /// Sender of buffer `n` of block `m` when it lives on another rank.
    source: Option<(usize, CommTag)>,
}

/// Where row `s` of a column is read from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Row {
    Lower(usize),
    Interior(usize),
    Upper(usize),
}

#[derive(Clone, Debug)]
struct ShearGeometry {
    is: usize,
    ie: usize,
    js: usize,
    je: usize,
    ks: usize,
    ke: usize,
    /// Column length including ghosts.
    nj: usize,
    /// Rows exchanged per face.
    rows: usize,
    cc_send: [IndexBox; 2],
    b3_send: [IndexBox; 2],
    b1_send: [IndexBox; 2],
}

impl ShearGeometry {
    fn new(indcs: &RegionIndices, max_shift: usize) -> Result<Self, MeshHaloError> {
        let [ax, ay, az] = indcs.axes;
        let rows = ay.ng + max_shift;
        if rows > ay.n {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "{} x2 rows cannot supply {rows} shifted rows",
                ay.n
            )));
        }
        let (is, ie, js, je, ks, ke) = (ax.s(), ax.e(), ay.s(), ay.e(), az.s(), az.e());
        let send_rows = [js..js + rows, je - rows..je];
        let boxes = |k: std::ops::Range<usize>, i: std::ops::Range<usize>| {
            send_rows.clone().map(|j| IndexBox {
                k: k.clone(),
                j,
                i: i.clone(),
            })
        };
        Ok(Self {
            is,
            ie,
            js,
            je,
            ks,
            ke,
            nj: ay.ncells(),
            rows,
            cc_send: boxes(ks..ke, is..ie),
            b3_send: boxes(ks..ke + 1, is..ie),
            b1_send: boxes(ks..ke, is..ie + 1),
        })
    }

    fn cc_len(&self, nvar: usize) -> usize {
        nvar * self.cc_send[0].count()
    }

    fn b3_len(&self) -> usize {
        self.b3_send[0].count()
    }

    fn b1_len(&self) -> usize {
        self.b1_send[0].count()
    }

    fn locate(&self, s: isize) -> Row {
        let (js, je) = (self.js as isize, self.je as isize);
        debug_assert!(s >= js - self.rows as isize && s < je + self.rows as isize);
        if s < js {
            Row::Lower((s - js + self.rows as isize) as usize)
        } else if s >= je {
            Row::Upper((s - je) as usize)
        } else {
            Row::Interior(s as usize)
        }
    }

    /// Offset of `(v, k, row, i)` in a buffer laid out over
    /// `k ∈ [ks, ks+nk)`, `i ∈ [is, is+ni)`.
    #[inline]
    fn buffer_offset(&self, nk: usize, ni: usize, v: usize, k: usize, r: usize, i: usize) -> usize {
        ((v * nk + (k - self.ks)) * self.rows + r) * ni + (i - self.is)
    }
}

/// One field's lanes, transport context and routes.
#[derive(Debug)]
struct ShearChannel<C, R> {
    transport: C,
    routes: Vec<ShearRoute>,
    len: usize,
    send: [Lane<R>; 2],
    recv: [Lane<R>; 2],
}

impl<C: Transport> ShearChannel<C, C::Request> {
    fn new(transport: C, routes: Vec<ShearRoute>, nmb: usize, len: usize) -> Self {
        Self {
            transport,
            routes,
            len,
            send: [Lane::new(nmb, len), Lane::new(nmb, len)],
            recv: [Lane::new(nmb, len), Lane::new(nmb, len)],
        }
    }

    fn init_recv(&mut self) -> Result<(), MeshHaloError> {
        for r in &self.routes {
            let lane = &mut self.recv[r.n];
            if lane.pending_mut(r.m).is_some() {
                return Err(MeshHaloError::Invariant(format!(
                    "block {} slot {}: previous orbital receive not cleared",
                    r.m, SHEAR_SLOTS[r.n]
                )));
            }
            lane.set_status(r.m, BufferStatus::Waiting);
            if let Some((rank, tag)) = r.source {
                *lane.pending_mut(r.m) = Some(self.transport.irecv(rank, tag, self.len)?);
            }
        }
        Ok(())
    }

    /// Pair every route with the chunk its rows are packed into.
    fn claim_targets(&mut self) -> Result<Vec<(ShearRoute, &mut [Real])>, MeshHaloError> {
        for r in &self.routes {
            match r.target {
                Target::Local { dm } => {
                    if self.recv[1 - r.n].status(dm) != BufferStatus::Waiting {
                        return Err(MeshHaloError::ReceiveNotPosted {
                            block: dm,
                            slot: SHEAR_SLOTS[1 - r.n],
                        });
                    }
                }
                Target::Remote { .. } => {
                    if self.send[r.n].pending_blocks().any(|m| m == r.m) {
                        return Err(MeshHaloError::Invariant(format!(
                            "block {} slot {}: previous orbital send not cleared",
                            r.m, SHEAR_SLOTS[r.n]
                        )));
                    }
                }
            }
        }

        let len = self.len;
        let mut send_chunks: HashMap<(usize, usize), &mut [Real]> = HashMap::new();
        for (n, lane) in self.send.iter_mut().enumerate() {
            for (m, c) in lane.chunks_mut().into_iter().enumerate() {
                send_chunks.insert((n, m), c);
            }
        }
        let mut recv_chunks: HashMap<(usize, usize), &mut [Real]> = HashMap::new();
        for (n, lane) in self.recv.iter_mut().enumerate() {
            for (m, c) in lane.chunks_mut().into_iter().enumerate() {
                recv_chunks.insert((n, m), c);
            }
        }
        self.routes
            .iter()
            .map(|r| {
                let (chunk, block, n) = match r.target {
                    Target::Local { dm } => (recv_chunks.remove(&(1 - r.n, dm)), dm, 1 - r.n),
                    Target::Remote { .. } => (send_chunks.remove(&(r.n, r.m)), r.m, r.n),
                };
                let chunk = chunk.ok_or(MeshHaloError::DuplicateDestination {
                    block,
                    slot: SHEAR_SLOTS[n],
                })?;
                Ok((*r, &mut chunk[..len]))
            })
            .collect()
    }

    fn post_sends(&mut self) -> Result<(), MeshHaloError> {
        for r in &self.routes {
            match r.target {
                Target::Local { dm } => self.recv[1 - r.n].set_status(dm, BufferStatus::Ready),
                Target::Remote { rank, tag } => {
                    let lane = &mut self.send[r.n];
                    let request = self.transport.isend(rank, tag, &lane.chunk(r.m)[..self.len])?;
                    *lane.pending_mut(r.m) = Some(request);
                    lane.set_status(r.m, BufferStatus::Waiting);
                }
            }
        }
        Ok(())
    }

    fn try_complete(&mut self) -> Result<TaskStatus, MeshHaloError> {
        let mut complete = true;
        for r in &self.routes {
            let lane = &mut self.recv[r.n];
            match lane.status(r.m) {
                BufferStatus::Ready => continue,
                BufferStatus::Undefined => {
                    return Err(MeshHaloError::ReceiveNotPosted {
                        block: r.m,
                        slot: SHEAR_SLOTS[r.n],
                    });
                }
                BufferStatus::Waiting => {}
            }
            let outcome = match lane.pending_mut(r.m).as_mut() {
                Some(request) => request.test()?,
                None => None,
            };
            match outcome {
                Some(delivery) => {
                    *lane.pending_mut(r.m) = None;
                    store_delivery(lane, r, self.len, delivery)?;
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

    fn clear_recv(&mut self) -> Result<(), MeshHaloError> {
        for r in &self.routes {
            let lane = &mut self.recv[r.n];
            if let Some(request) = lane.pending_mut(r.m).take() {
                store_delivery(lane, r, self.len, request.wait()?)?;
            }
        }
        Ok(())
    }

    fn clear_send(&mut self) -> Result<(), MeshHaloError> {
        for r in &self.routes {
            let lane = &mut self.send[r.n];
            if let Some(request) = lane.pending_mut(r.m).take() {
                match request.wait()? {
                    Delivery::Sent => lane.set_status(r.m, BufferStatus::Ready),
                    Delivery::Received(_) => {
                        return Err(MeshHaloError::Invariant(format!(
                            "orbital send of block {} completed as a receive",
                            r.m
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Lower and upper payloads of every block, in block order.
    fn payloads(&self, nmb: usize) -> Result<Vec<[&[Real]; 2]>, MeshHaloError> {
        (0..nmb)
            .map(|m| {
                Ok([
                    self.recv[0].payload(m, SHEAR_SLOTS[0], self.len)?,
                    self.recv[1].payload(m, SHEAR_SLOTS[1], self.len)?,
                ])
            })
            .collect()
    }
}

fn store_delivery<R>(
    lane: &mut Lane<R>,
    r: &ShearRoute,
    len: usize,
    delivery: Delivery,
) -> Result<(), MeshHaloError> {
    match delivery {
        Delivery::Received(payload) => {
            let peer = r.source.map_or(0, |(rank, _)| rank);
            expect_exact_len(peer, payload.len(), len)?;
            lane.chunk_mut(r.m)[..len].copy_from_slice(&payload);
            lane.set_status(r.m, BufferStatus::Ready);
            Ok(())
        }
        Delivery::Sent => Err(MeshHaloError::Invariant(format!(
            "orbital receive of block {} completed as a send",
            r.m
        ))),
    }
}

/// Orbital-advection exchange and remap for one rank's block pack.
#[derive(Debug)]
pub struct OrbitalAdvection<T: Transport> {
    pack: BlockPack,
    indcs: RegionIndices,
    sizes: Vec<BlockSize>,
    state: OrbitalState,
    recon: ReconstructionMethod,
    nvar: usize,
    geom: ShearGeometry,
    cc: ShearChannel<T, T::Request>,
    fc: ShearChannel<T, T::Request>,
}

impl<T: Transport> OrbitalAdvection<T> {
    /// Check the pack and configuration and set up both orbital channels.
    ///
    /// `sizes[m]` is the physical extent of local block `m`; `nvar` the
    /// number of cell-centered variables remapped.
    pub fn new(
        ctx: &ProcessContext<T>,
        pack: BlockPack,
        indcs: RegionIndices,
        sizes: Vec<BlockSize>,
        state: OrbitalState,
        recon: ReconstructionMethod,
        nvar: usize,
    ) -> Result<Self, MeshHaloError> {
        pack.validate()?;
        if ctx.rank() != pack.rank || ctx.size() != pack.nranks() || pack.ndim != indcs.ndim() {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "transport rank {} of {}, pack rank {} of {} ({}-D), extents {}-D",
                ctx.rank(),
                ctx.size(),
                pack.rank,
                pack.nranks(),
                pack.ndim,
                indcs.ndim()
            )));
        }
        if !indcs.multi_d() {
            return Err(MeshHaloError::InvalidGeometry(
                "orbital advection needs a multi-dimensional mesh".into(),
            ));
        }
        recon.check_remap_support()?;
        if indcs.ng() < recon.stencil_depth() {
            return Err(MeshHaloError::InvalidConfig(format!(
                "{recon} remap needs {} ghost cells, blocks have {}",
                recon.stencil_depth(),
                indcs.ng()
            )));
        }
        if nvar == 0 {
            return Err(MeshHaloError::InvalidConfig(
                "orbital remap needs at least one variable".into(),
            ));
        }
        if sizes.len() != pack.nmb() {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "{} block sizes for {} blocks",
                sizes.len(),
                pack.nmb()
            )));
        }
        ctx.check_tag_range(pack.nmb_eachrank.iter().copied().max().unwrap_or(0))?;
        let geom = ShearGeometry::new(&indcs, state.max_integer_shift)?;

        let mut routes = Vec::with_capacity(2 * pack.nmb());
        let mut claimed = HashSet::new();
        for m in 0..pack.nmb() {
            for (n, &slot) in SHEAR_SLOTS.iter().enumerate() {
                let nb = pack.neighbor(m, slot).ok_or_else(|| {
                    MeshHaloError::TopologyMismatch(format!(
                        "block {m} has no x2 neighbor in slot {slot}"
                    ))
                })?;
                if nb.level != pack.levels[m] {
                    return Err(MeshHaloError::TopologyMismatch(format!(
                        "block {m}: x2 neighbor {} is at level {}, own level {}",
                        nb.gid, nb.level, pack.levels[m]
                    )));
                }
                let dn = 1 - n;
                if nb.dest != SHEAR_SLOTS[dn] {
                    return Err(MeshHaloError::TopologyMismatch(format!(
                        "block {m}: x2 neighbor {} receives in slot {}, expected {}",
                        nb.gid, nb.dest, SHEAR_SLOTS[dn]
                    )));
                }
                let target = if nb.rank == pack.rank {
                    let dm = pack.local_index(nb.gid).ok_or(MeshHaloError::MissingBlock(nb.gid))?;
                    if !claimed.insert((dm, dn)) {
                        return Err(MeshHaloError::DuplicateDestination {
                            block: dm,
                            slot: nb.dest,
                        });
                    }
                    Target::Local { dm }
                } else {
                    Target::Remote {
                        rank: nb.rank,
                        tag: CommTag::for_buffer(pack.remote_local_id(nb), nb.dest),
                    }
                };
                routes.push(ShearRoute {
                    m,
                    n,
                    target,
                    source: (nb.rank != pack.rank).then(|| (nb.rank, CommTag::for_buffer(m, slot))),
                });
            }
        }

        let nmb = pack.nmb();
        let cc = ShearChannel::new(ctx.channel(), routes.clone(), nmb, geom.cc_len(nvar));
        let fc = ShearChannel::new(ctx.channel(), routes, nmb, geom.b3_len() + geom.b1_len());
        log::debug!(
            "rank {}: orbital advection, {nmb} blocks, {} rows/face, {} / {} values/buffer",
            pack.rank,
            geom.rows,
            cc.len,
            fc.len
        );
        Ok(Self {
            pack,
            indcs,
            sizes,
            state,
            recon,
            nvar,
            geom,
            cc,
            fc,
        })
    }

    pub fn pack(&self) -> &BlockPack {
        &self.pack
    }

    pub fn state(&self) -> &OrbitalState {
        &self.state
    }

    pub fn reconstruction(&self) -> ReconstructionMethod {
        self.recon
    }

    /// Values exchanged per block and face.
    pub fn transfer_len(&self, kind: ShearKind) -> usize {
        self.channel(kind).len
    }

    /// Status of receive buffer `n` (0 lower, 1 upper) of block `m`.
    pub fn recv_status(
        &self,
        kind: ShearKind,
        m: usize,
        n: usize,
    ) -> Result<BufferStatus, MeshHaloError> {
        if m >= self.pack.nmb() {
            return Err(MeshHaloError::MissingBlock(m));
        }
        let lane = self
            .channel(kind)
            .recv
            .get(n)
            .ok_or(MeshHaloError::InvalidDirection(n))?;
        Ok(lane.status(m))
    }

    fn channel(&self, kind: ShearKind) -> &ShearChannel<T, T::Request> {
        match kind {
            ShearKind::Cell => &self.cc,
            ShearKind::Face => &self.fc,
        }
    }

    fn channel_mut(&mut self, kind: ShearKind) -> &mut ShearChannel<T, T::Request> {
        match kind {
            ShearKind::Cell => &mut self.cc,
            ShearKind::Face => &mut self.fc,
        }
    }

    /// Mark both buffers of every block `Waiting` and post cross-rank receives.
    pub fn init_recv(&mut self, kind: ShearKind) -> Result<(), MeshHaloError> {
        self.channel_mut(kind).init_recv()
    }

    /// Observe finished receives without blocking.
    pub fn try_complete(&mut self, kind: ShearKind) -> Result<TaskStatus, MeshHaloError> {
        self.channel_mut(kind).try_complete()
    }

    pub fn clear_recv(&mut self, kind: ShearKind) -> Result<(), MeshHaloError> {
        self.channel_mut(kind).clear_recv()
    }

    pub fn clear_send(&mut self, kind: ShearKind) -> Result<(), MeshHaloError> {
        self.channel_mut(kind).clear_send()
    }

    /// Pack the rows of cell-centered `u` nearest each x2 face and send them.
    pub fn pack_and_send_cc(&mut self, u: &BlockArray) -> Result<TaskStatus, MeshHaloError> {
        self.check_cc(u)?;
        let geom = &self.geom;
        let jobs = self
            .cc
            .claim_targets()?
            .into_iter()
            .map(|(r, out)| PackJob {
                dims: u.dims(),
                block: u.block(r.m),
                range: &geom.cc_send[r.n],
                out,
            })
            .collect();
        run_pack_jobs(jobs);
        self.cc.post_sends()?;
        Ok(TaskStatus::Complete)
    }

    /// Pack `B3` then `B1` rows nearest each x2 face and send them.
    pub fn pack_and_send_fc(&mut self, b: &FaceField) -> Result<TaskStatus, MeshHaloError> {
        self.check_fc(b)?;
        let geom = &self.geom;
        let len3 = geom.b3_len();
        let mut jobs = Vec::with_capacity(4 * self.pack.nmb());
        for (r, out) in self.fc.claim_targets()? {
            let (out3, out1) = out.split_at_mut(len3);
            jobs.push(PackJob {
                dims: b.x3f.dims(),
                block: b.x3f.block(r.m),
                range: &geom.b3_send[r.n],
                out: out3,
            });
            jobs.push(PackJob {
                dims: b.x1f.dims(),
                block: b.x1f.block(r.m),
                range: &geom.b1_send[r.n],
                out: out1,
            });
        }
        run_pack_jobs(jobs);
        self.fc.post_sends()?;
        Ok(TaskStatus::Complete)
    }

    /// Shift of every column of every block; `x_at` places column `c` along x1.
    fn column_shifts(
        &self,
        dt: Real,
        ncols: usize,
        x_at: fn(isize, usize, Real, Real) -> Real,
    ) -> Result<Vec<Vec<ShiftSplit>>, MeshHaloError> {
        let nx1 = self.geom.ie - self.geom.is;
        self.sizes
            .iter()
            .map(|size| {
                (0..ncols)
                    .map(|c| {
                        let x = x_at(c as isize, nx1, size.min[0], size.max[0]);
                        self.state.decompose(x, dt, size.dx[1])
                    })
                    .collect()
            })
            .collect()
    }

    /// Remap the interior of `u` by the orbital shift over `dt`.
    ///
    /// `Incomplete`, with `u` untouched, until both buffers of every block
    /// are `Ready`.
    pub fn recv_and_unpack_cc(
        &mut self,
        u: &mut BlockArray,
        dt: Real,
    ) -> Result<TaskStatus, MeshHaloError> {
        self.check_cc(u)?;
        if self.cc.try_complete()? == TaskStatus::Incomplete {
            return Ok(TaskStatus::Incomplete);
        }
        let g = &self.geom;
        let shifts = self.column_shifts(dt, g.ie - g.is, cell_center_x)?;
        let payloads = self.cc.payloads(self.pack.nmb())?;
        let recon = self.recon;
        let [_, nvar, nk, nj, ni] = u.dims();
        let (nk_int, nx1) = (g.ke - g.ks, g.ie - g.is);

        u.as_mut_slice()
            .par_chunks_mut(nk * nj * ni)
            .enumerate()
            .try_for_each_init(
                || (vec![0.0; g.nj], vec![0.0; g.nj + 1]),
                |(w, flx), (mv, chunk)| {
                    let (m, v) = (mv / nvar, mv % nvar);
                    let [lo, hi] = payloads[m];
                    for k in g.ks..g.ke {
                        for i in g.is..g.ie {
                            let split = shifts[m][i - g.is];
                            let at = |r| g.buffer_offset(nk_int, nx1, v, k, r, i);
                            let src = |s: isize| match g.locate(s) {
                                Row::Lower(r) => lo[at(r)],
                                Row::Interior(j) => chunk[(k * nj + j) * ni + i],
                                Row::Upper(r) => hi[at(r)],
                            };
                            load_shifted(&mut w[..], split.integer, src);
                            remap_fluxes(recon, g.js, g.je, split.fraction, &w[..], &mut flx[..])?;
                            for j in g.js..g.je {
                                chunk[(k * nj + j) * ni + i] = w[j] - (flx[j + 1] - flx[j]);
                            }
                        }
                    }
                    Ok::<(), MeshHaloError>(())
                },
            )?;
        Ok(TaskStatus::Complete)
    }

    /// Remap face-centered `b` by the orbital shift over `dt`.
    ///
    /// Effective EMFs of every block are written to `emf` (`x3e` from `B1`,
    /// `x1e` from `B3`) before any face is updated.
    pub fn recv_and_unpack_fc(
        &mut self,
        b: &mut FaceField,
        emf: &mut EdgeField,
        dt: Real,
    ) -> Result<TaskStatus, MeshHaloError> {
        self.check_fc(b)?;
        if emf.dims() != EdgeField::shapes(self.pack.nmb(), &self.indcs) {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "edge arrays {:?} / {:?} do not match the pack",
                emf.x1e.dims(),
                emf.x3e.dims()
            )));
        }
        if self.fc.try_complete()? == TaskStatus::Incomplete {
            return Ok(TaskStatus::Incomplete);
        }
        let g = &self.geom;
        let nx1 = g.ie - g.is;
        let b1_shifts = self.column_shifts(dt, nx1 + 1, left_edge_x)?;
        let b3_shifts = self.column_shifts(dt, nx1, cell_center_x)?;
        let payloads = self.fc.payloads(self.pack.nmb())?;
        let recon = self.recon;
        let len3 = g.b3_len();
        let nk_int = g.ke - g.ks;
        let (d1e, d3e) = (emf.x1e.dims(), emf.x3e.dims());

        let field = &*b;
        let EdgeField { x1e, x3e } = &mut *emf;
        x3e.par_blocks_mut()
            .zip(x1e.par_blocks_mut())
            .enumerate()
            .try_for_each_init(
                || (vec![0.0; g.nj], vec![0.0; g.nj + 1], vec![0.0; g.nj + 1]),
                |(w, flx, face), (m, (ez, ex))| {
                    let [lo, hi] = payloads[m];
                    let (lo3, lo1) = lo.split_at(len3);
                    let (hi3, hi1) = hi.split_at(len3);

                    for k in g.ks..g.ke {
                        for i in g.is..=g.ie {
                            let at = |r| g.buffer_offset(nk_int, nx1 + 1, 0, k, r, i);
                            let src = |s: isize| match g.locate(s) {
                                Row::Lower(r) => lo1[at(r)],
                                Row::Interior(j) => field.x1f.at(m, 0, k, j, i),
                                Row::Upper(r) => hi1[at(r)],
                            };
                            let split = b1_shifts[m][i - g.is];
                            shifted_face_flux(recon, g.js, g.je, split, src, w, flx, face)?;
                            for j in g.js..=g.je {
                                ez[chunk_offset(d3e, 0, k, j, i)] = face[j];
                            }
                        }
                    }
                    for k in g.ks..=g.ke {
                        for i in g.is..g.ie {
                            let at = |r| g.buffer_offset(nk_int + 1, nx1, 0, k, r, i);
                            let src = |s: isize| match g.locate(s) {
                                Row::Lower(r) => lo3[at(r)],
                                Row::Interior(j) => field.x3f.at(m, 0, k, j, i),
                                Row::Upper(r) => hi3[at(r)],
                            };
                            let split = b3_shifts[m][i - g.is];
                            shifted_face_flux(recon, g.js, g.je, split, src, w, flx, face)?;
                            for j in g.js..=g.je {
                                ex[chunk_offset(d1e, 0, k, j, i)] = -face[j];
                            }
                        }
                    }
                    Ok::<(), MeshHaloError>(())
                },
            )?;

        ct_update(b, emf, &self.indcs, &self.sizes)?;
        Ok(TaskStatus::Complete)
    }

    fn check_cc(&self, u: &BlockArray) -> Result<(), MeshHaloError> {
        let (nk, nj, ni) = self.indcs.cell_dims();
        let expected = [self.pack.nmb(), self.nvar, nk, nj, ni];
        if u.dims() != expected {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "field array {:?}, orbital buffers sized for {expected:?}",
                u.dims()
            )));
        }
        Ok(())
    }

    fn check_fc(&self, b: &FaceField) -> Result<(), MeshHaloError> {
        if b.dims() != FaceField::shapes(self.pack.nmb(), &self.indcs) {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "face arrays {:?} / {:?} / {:?} do not match the pack",
                b.x1f.dims(),
                b.x2f.dims(),
                b.x3f.dims()
            )));
        }
        Ok(())
    }
}
