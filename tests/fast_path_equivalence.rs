//! The same lattice exchanged on 1, 2, 3 and 8 ranks must give bit-identical
//! blocks: same-rank copies and transported payloads carry the same values.

mod util;

use mesh_halo::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use util::*;

fn seeded_fill(u: &mut BlockArray, indcs: &RegionIndices, pack: &BlockPack) {
    let [_, nvar, nk, nj, ni] = u.dims();
    for m in 0..pack.nmb() {
        let mut rng = SmallRng::seed_from_u64(pack.gid(m) as u64);
        for v in 0..nvar {
            for k in 0..nk {
                for j in 0..nj {
                    for i in 0..ni {
                        *u.at_mut(m, v, k, j, i) = if is_interior(indcs, k, j, i) {
                            rng.gen_range(-1.0..1.0)
                        } else {
                            0.0
                        };
                    }
                }
            }
        }
    }
}

fn exchanged_blocks(lat: &UniformLattice, indcs: RegionIndices, nranks: usize) -> Vec<Vec<u64>> {
    let per_rank = run_ranks(nranks, |ctx| {
        let pack = lat.block_pack(3, ctx.rank(), ctx.size()).unwrap();
        let mut bv = BoundaryValues::new(&ctx, pack.clone(), indcs, 2, 0).unwrap();
        let mut vars = CellVars::new(pack.nmb(), 2, &indcs, false);
        seeded_fill(&mut vars.u, &indcs, &pack);
        exchange_round(&mut bv, &mut vars).unwrap();
        (0..pack.nmb())
            .map(|m| (pack.gid(m), bits(vars.u.block(m))))
            .collect::<Vec<_>>()
    });
    by_gid(per_rank)
}

#[test]
fn rank_count_does_not_change_results() {
    let indcs = RegionIndices::new(4, 4, 4, 2).unwrap();
    let lat = UniformLattice::new([2, 2, 2], Periodicity::all()).unwrap();
    let serial = exchanged_blocks(&lat, indcs, 1);
    assert_eq!(serial.len(), 8);
    for nranks in [2, 3, 8] {
        let split = exchanged_blocks(&lat, indcs, nranks);
        assert_eq!(split.len(), serial.len());
        for (gid, (a, b)) in serial.iter().zip(&split).enumerate() {
            assert!(a == b, "gid {gid} differs between 1 and {nranks} ranks");
        }
    }
}

#[test]
fn serial_transport_matches_local_world() {
    let indcs = RegionIndices::new(4, 4, 4, 2).unwrap();
    let lat = UniformLattice::new([2, 2, 2], Periodicity::all()).unwrap();
    let pack = lat.block_pack(3, 0, 1).unwrap();
    let ctx = ProcessContext::new(NoTransport);
    let mut bv = BoundaryValues::new(&ctx, pack.clone(), indcs, 2, 0).unwrap();
    let mut vars = CellVars::new(pack.nmb(), 2, &indcs, false);
    seeded_fill(&mut vars.u, &indcs, &pack);
    exchange_round(&mut bv, &mut vars).unwrap();

    let threaded = exchanged_blocks(&lat, indcs, 1);
    for (m, block) in threaded.iter().enumerate() {
        assert_eq!(&bits(vars.u.block(m)), block);
    }
}
