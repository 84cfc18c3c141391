#![allow(dead_code)]
use std::thread;

use mesh_halo::algs::communicator::NoRequest;
use mesh_halo::prelude::*;

/// Marks cells nothing is supposed to write.
pub const SENTINEL: Real = -1.0e30;

/// Run `f` once per rank, each on its own thread, over one shared world.
pub fn run_ranks<R, F>(nranks: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(ProcessContext<LocalCopyTransport>) -> R + Sync,
{
    let world = LocalWorld::new(nranks);
    thread::scope(|s| {
        let handles: Vec<_> = (0..nranks)
            .map(|r| {
                let ctx = ProcessContext::new(world.transport(r).expect("rank inside world"));
                let f = &f;
                s.spawn(move || f(ctx))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Serial transport whose tags stop at 127, two blocks' worth.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShortTags;

impl Transport for ShortTags {
    type Request = NoRequest;

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn duplicate(&self) -> Self {
        ShortTags
    }

    fn max_tag(&self) -> i32 {
        127
    }

    fn isend(
        &self,
        peer: usize,
        tag: CommTag,
        payload: &[Real],
    ) -> Result<NoRequest, MeshHaloError> {
        NoTransport.isend(peer, tag, payload)
    }

    fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> Result<NoRequest, MeshHaloError> {
        NoTransport.irecv(peer, tag, len)
    }
}

/// One full cell-variable round, spinning until every receive has landed.
pub fn exchange_round<T: Transport>(
    bv: &mut BoundaryValues<T>,
    vars: &mut CellVars,
) -> Result<(), MeshHaloError> {
    bv.init_recv(BufferKind::Vars)?;
    bv.pack_and_send(vars)?;
    while bv.recv_and_unpack(vars)? == TaskStatus::Incomplete {
        thread::yield_now();
    }
    bv.clear_send(BufferKind::Vars)?;
    bv.clear_recv(BufferKind::Vars)?;
    Ok(())
}

/// Value of variable `v` at global cell `g`, wrapped onto the domain.
pub fn global_value(v: usize, g: [i64; 3], ncells: [i64; 3]) -> Real {
    let w: [i64; 3] = std::array::from_fn(|a| g[a].rem_euclid(ncells[a]));
    (v as i64 * 1_000_000 + w[2] * 10_000 + w[1] * 100 + w[0]) as Real
}

/// Global cell index of local cell `(k, j, i)` of block `gid`.
pub fn global_cell(
    lat: &UniformLattice,
    indcs: &RegionIndices,
    gid: usize,
    k: usize,
    j: usize,
    i: usize,
) -> [i64; 3] {
    let c = lat.coords(gid);
    let local = [i, j, k];
    std::array::from_fn(|a| {
        let ext = indcs.axis(a);
        (c[a] * ext.n) as i64 + local[a] as i64 - ext.s() as i64
    })
}

/// Interior cells in the whole lattice along each axis.
pub fn lattice_cells(lat: &UniformLattice, indcs: &RegionIndices) -> [i64; 3] {
    std::array::from_fn(|a| (lat.nblocks[a] * indcs.axis(a).n) as i64)
}

pub fn is_interior(indcs: &RegionIndices, k: usize, j: usize, i: usize) -> bool {
    [i, j, k]
        .iter()
        .enumerate()
        .all(|(a, &x)| (indcs.axis(a).s()..indcs.axis(a).e()).contains(&x))
}

/// Interior gets `global_value + bump`, ghosts get [`SENTINEL`].
pub fn fill_lattice(
    u: &mut BlockArray,
    lat: &UniformLattice,
    indcs: &RegionIndices,
    pack: &BlockPack,
    bump: Real,
) {
    let n = lattice_cells(lat, indcs);
    u.fill_with(|m, v, k, j, i| {
        if is_interior(indcs, k, j, i) {
            global_value(v, global_cell(lat, indcs, pack.gid(m), k, j, i), n) + bump
        } else {
            SENTINEL
        }
    });
}

/// Every cell holds the value of the global cell it covers, or [`SENTINEL`]
/// where it lies outside a non-periodic boundary.
pub fn assert_ghosts(
    u: &BlockArray,
    lat: &UniformLattice,
    indcs: &RegionIndices,
    pack: &BlockPack,
    bump: Real,
) {
    let n = lattice_cells(lat, indcs);
    let periodic = [lat.periodic.x1, lat.periodic.x2, lat.periodic.x3];
    let [_, nvar, nk, nj, ni] = u.dims();
    for m in 0..pack.nmb() {
        let gid = pack.gid(m);
        for v in 0..nvar {
            for k in 0..nk {
                for j in 0..nj {
                    for i in 0..ni {
                        let g = global_cell(lat, indcs, gid, k, j, i);
                        let outside = (0..3).any(|a| !periodic[a] && !(0..n[a]).contains(&g[a]));
                        let expected = if outside {
                            SENTINEL
                        } else {
                            global_value(v, g, n) + bump
                        };
                        assert_eq!(
                            u.at(m, v, k, j, i),
                            expected,
                            "rank {} gid {gid} var {v} cell ({k},{j},{i})",
                            pack.rank
                        );
                    }
                }
            }
        }
    }
}

/// Physical extents of the local blocks of `pack`.
pub fn block_sizes(
    lat: &UniformLattice,
    indcs: &RegionIndices,
    pack: &BlockPack,
) -> Vec<BlockSize> {
    (0..pack.nmb())
        .map(|m| lat.block_size(pack.gid(m), indcs))
        .collect()
}

/// Sort per-rank `(gid, data)` results into one list ordered by gid.
pub fn by_gid<T>(ranks: Vec<Vec<(usize, T)>>) -> Vec<T> {
    let mut all: Vec<(usize, T)> = ranks.into_iter().flatten().collect();
    all.sort_by_key(|(gid, _)| *gid);
    all.into_iter().map(|(_, t)| t).collect()
}

/// Bit patterns of a slice, for exact comparisons.
pub fn bits(values: &[Real]) -> Vec<u64> {
    values.iter().map(|x| x.to_bits()).collect()
}

/// One cell-centered orbital round, spinning until both x2 buffers are in.
pub fn remap_cells<T: Transport>(
    orb: &mut OrbitalAdvection<T>,
    u: &mut BlockArray,
    dt: Real,
) -> Result<(), MeshHaloError> {
    orb.init_recv(ShearKind::Cell)?;
    orb.pack_and_send_cc(u)?;
    while orb.recv_and_unpack_cc(u, dt)? == TaskStatus::Incomplete {
        thread::yield_now();
    }
    orb.clear_send(ShearKind::Cell)?;
    orb.clear_recv(ShearKind::Cell)?;
    Ok(())
}

/// One face-centered orbital round followed by the constrained-transport update.
pub fn remap_faces<T: Transport>(
    orb: &mut OrbitalAdvection<T>,
    b: &mut FaceField,
    emf: &mut EdgeField,
    dt: Real,
) -> Result<(), MeshHaloError> {
    orb.init_recv(ShearKind::Face)?;
    orb.pack_and_send_fc(b)?;
    while orb.recv_and_unpack_fc(b, emf, dt)? == TaskStatus::Incomplete {
        thread::yield_now();
    }
    orb.clear_send(ShearKind::Face)?;
    orb.clear_recv(ShearKind::Face)?;
    Ok(())
}

/// Orbital engine for the blocks `ctx` owns in `lat`.
pub fn orbital_engine<T: Transport>(
    ctx: &ProcessContext<T>,
    lat: &UniformLattice,
    indcs: RegionIndices,
    state: OrbitalState,
    recon: ReconstructionMethod,
    nvar: usize,
) -> Result<(OrbitalAdvection<T>, BlockPack), MeshHaloError> {
    let pack = lat.block_pack(indcs.ndim(), ctx.rank(), ctx.size())?;
    let sizes = block_sizes(lat, &indcs, &pack);
    let orb = OrbitalAdvection::new(ctx, pack.clone(), indcs, sizes, state, recon, nvar)?;
    Ok((orb, pack))
}
