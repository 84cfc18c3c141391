//! Two-level 2-D mesh: coarse block A on `[0,1]²`, fine blocks B and C on
//! the lower and upper halves of `[1,1.5] × [0,1]`, touching A's +x1 face.

mod util;

use mesh_halo::data::indices::cell_center_x;
use mesh_halo::prelude::*;
use mesh_halo::topology::NEIGHBOR_SLOTS;
use mesh_halo::topology::neighbor::NeighborTable;
use util::*;

const TOL: Real = 1e-12;

fn slot(ox1: i8, ox2: i8, f1: u8) -> usize {
    Direction::new(ox1, ox2, 0, f1, 0).unwrap().slot()
}

fn level(gid: usize) -> i32 {
    if gid == 0 { 0 } else { 1 }
}

fn bounds(gid: usize) -> ([Real; 3], [Real; 3]) {
    match gid {
        0 => ([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
        1 => ([1.0, 0.0, 0.0], [1.5, 0.5, 1.0]),
        _ => ([1.0, 0.5, 0.0], [1.5, 1.0, 1.0]),
    }
}

fn table(gid: usize, owner: impl Fn(usize) -> usize) -> NeighborTable {
    let mut t: NeighborTable = [None; NEIGHBOR_SLOTS];
    let mut link = |from: usize, to: usize, dest: usize| {
        t[from] = Some(NeighborDescriptor {
            gid: to,
            rank: owner(to),
            level: level(to),
            dest,
        });
    };
    match gid {
        0 => {
            link(slot(1, 0, 0), 1, slot(-1, 0, 0));
            link(slot(1, 0, 1), 2, slot(-1, 0, 0));
        }
        1 => {
            link(slot(-1, 0, 0), 0, slot(1, 0, 0));
            link(slot(0, 1, 0), 2, slot(0, -1, 0));
        }
        _ => {
            link(slot(-1, 0, 0), 0, slot(1, 0, 1));
            link(slot(0, -1, 0), 1, slot(0, 1, 0));
        }
    }
    t
}

/// The pack of `rank` when the three blocks sit on one rank or one per rank.
fn pack(rank: usize, nranks: usize) -> BlockPack {
    let owner = move |gid: usize| if nranks == 1 { 0 } else { gid };
    let gids: Vec<usize> = if nranks == 1 { vec![0, 1, 2] } else { vec![rank] };
    let layout = if nranks == 1 {
        (vec![0], vec![3])
    } else {
        (vec![0, 1, 2], vec![1, 1, 1])
    };
    BlockPack {
        ndim: 2,
        rank,
        gids_eachrank: layout.0,
        nmb_eachrank: layout.1,
        levels: gids.iter().map(|&g| level(g)).collect(),
        neighbors: gids.iter().map(|&g| table(g, owner)).collect(),
    }
}

fn linear(v: usize, x: Real, y: Real) -> Real {
    1.0 + 2.0 * x + 3.0 * y + 10.0 * v as Real
}

/// Position of cell `(j, i)` of a block spanning `bounds`, ghosts included.
fn center(indcs: &RegionIndices, gid: usize, j: usize, i: usize) -> (Real, Real) {
    let (min, max) = bounds(gid);
    let (ax, ay) = (indcs.axis(0), indcs.axis(1));
    (
        cell_center_x(i as isize - ax.s() as isize, ax.n, min[0], max[0]),
        cell_center_x(j as isize - ay.s() as isize, ay.n, min[1], max[1]),
    )
}

fn fill(vars: &mut CellVars, indcs: &RegionIndices, pack: &BlockPack) {
    vars.u.fill_with(|m, v, k, j, i| {
        if is_interior(indcs, k, j, i) {
            let (x, y) = center(indcs, pack.gid(m), j, i);
            linear(v, x, y)
        } else {
            SENTINEL
        }
    });
    restrict_cell_vars(vars, indcs).unwrap();
}

fn close(a: Real, b: Real) -> bool {
    (a - b).abs() < TOL
}

fn check_block(vars: &CellVars, indcs: &RegionIndices, m: usize, gid: usize) {
    let cindcs = indcs.coarse();
    let coarse = vars.coarse_u.as_ref().unwrap();
    let (ax, ay) = (indcs.axis(0), indcs.axis(1));
    for v in 0..vars.nvar() {
        match gid {
            0 => {
                // restricted data from B and C fills A's +x1 ghosts
                for j in ay.s()..ay.e() {
                    for i in ax.e()..ax.e() + ax.ng {
                        let (x, y) = center(indcs, 0, j, i);
                        let got = vars.u.at(m, v, 0, j, i);
                        assert!(close(got, linear(v, x, y)), "A ({j},{i}): {got}");
                    }
                }
                assert_eq!(vars.u.at(m, v, 0, ay.s(), ax.s() - 1), SENTINEL);
            }
            _ => {
                // A's data lands in the coarse ghosts facing it
                let (cx, cy) = (cindcs.axis(0), cindcs.axis(1));
                let (min, max) = bounds(gid);
                for cj in cy.s()..cy.e() {
                    for ci in cx.s() - cx.ng..cx.s() {
                        let x = cell_center_x(ci as isize - cx.s() as isize, cx.n, min[0], max[0]);
                        let y = cell_center_x(cj as isize - cy.s() as isize, cy.n, min[1], max[1]);
                        let got = coarse.at(m, v, 0, cj, ci);
                        assert!(close(got, linear(v, x, y)), "gid {gid} coarse ({cj},{ci}): {got}");
                    }
                }
                // fine ghosts toward the coarse block are not prolongated here
                assert_eq!(vars.u.at(m, v, 0, ay.s(), ax.s() - 1), SENTINEL);
                // same-level ghosts between B and C
                let rows = if gid == 1 {
                    ay.e()..ay.e() + ay.ng
                } else {
                    ay.s() - ay.ng..ay.s()
                };
                for j in rows {
                    for i in ax.s()..ax.e() {
                        let (x, y) = center(indcs, gid, j, i);
                        let got = vars.u.at(m, v, 0, j, i);
                        assert!(close(got, linear(v, x, y)), "gid {gid} fine ({j},{i}): {got}");
                    }
                }
            }
        }
    }
}

fn run(ctx: &ProcessContext<impl Transport>, indcs: RegionIndices) -> Vec<(usize, CellVars)> {
    let pack = pack(ctx.rank(), ctx.size());
    assert!(pack.is_multilevel());
    let mut bv = BoundaryValues::new(ctx, pack.clone(), indcs, 2, 0).unwrap();
    let mut vars = CellVars::new(pack.nmb(), 2, &indcs, true);
    fill(&mut vars, &indcs, &pack);
    exchange_round(&mut bv, &mut vars).unwrap();
    for m in 0..pack.nmb() {
        check_block(&vars, &indcs, m, pack.gid(m));
    }
    (0..pack.nmb()).map(|m| (pack.gid(m), vars.clone())).collect()
}

#[test]
fn coarse_and_fine_neighbors_on_one_rank() {
    let indcs = RegionIndices::new(8, 8, 1, 2).unwrap();
    let ctx = ProcessContext::new(NoTransport);
    let p = pack(0, 1);
    p.validate().unwrap();
    let bv = BoundaryValues::new(&ctx, p, indcs, 1, 0).unwrap();
    // B and C send restricted data, so packing reads the coarse array
    assert!(bv.needs_coarse());
    run(&ctx, indcs);
}

#[test]
fn coarse_and_fine_neighbors_across_ranks() {
    let indcs = RegionIndices::new(8, 8, 1, 2).unwrap();
    let serial = run(&ProcessContext::new(NoTransport), indcs);
    let split = run_ranks(3, |ctx| run(&ctx, indcs));
    for (rank, blocks) in split.iter().enumerate() {
        let (gid, vars) = &blocks[0];
        assert_eq!(*gid, rank);
        let whole = &serial[0].1;
        assert_eq!(bits(vars.u.block(0)), bits(whole.u.block(rank)), "gid {gid}");
        let coarse = vars.coarse_u.as_ref().unwrap();
        let whole_coarse = whole.coarse_u.as_ref().unwrap();
        assert_eq!(bits(coarse.block(0)), bits(whole_coarse.block(rank)), "gid {gid} coarse");
    }
}

#[test]
fn fine_blocks_send_flux_to_the_coarse_face() {
    let indcs = RegionIndices::new(8, 8, 1, 2).unwrap();
    let ctx = ProcessContext::new(NoTransport);
    let p = pack(0, 1);
    let mut bv = BoundaryValues::new(&ctx, p, indcs, 1, 2).unwrap();
    let len = bv.pool().flux_len(slot(-1, 0, 0)).unwrap();
    // two flux variables over half of the 8 cells along x2
    assert_eq!(len, 2 * 4);

    bv.init_recv(BufferKind::Flux).unwrap();
    bv.send_flux_payloads(|m, slot, out| {
        for (n, x) in out.iter_mut().enumerate() {
            *x = (100 * m + 10 * slot + n) as Real;
        }
    })
    .unwrap();

    let mut seen = Vec::new();
    let status = bv
        .recv_flux_payloads(|m, slot, payload| seen.push((m, slot, payload.to_vec())))
        .unwrap();
    assert_eq!(status, TaskStatus::Complete);
    seen.sort_by_key(|(m, slot, _)| (*m, *slot));
    assert_eq!(seen.len(), 2);
    let from_b: Vec<Real> = (0..len).map(|n| (100 + n) as Real).collect();
    let from_c: Vec<Real> = (0..len).map(|n| (200 + n) as Real).collect();
    assert_eq!(seen[0], (0, slot(1, 0, 0), from_b));
    assert_eq!(seen[1], (0, slot(1, 0, 1), from_c));
    assert_eq!(bv.recv_status(BufferKind::Flux, 0, slot(1, 0, 1)).unwrap(), BufferStatus::Ready);
}

#[test]
fn level_jumps_of_two_are_rejected() {
    let mut p = pack(0, 1);
    p.levels[0] = -1;
    assert!(matches!(p.validate(), Err(MeshHaloError::TopologyMismatch(_))));
}

#[test]
fn odd_block_sizes_cannot_go_multilevel() {
    let indcs = RegionIndices::new(6, 5, 1, 2).unwrap();
    let ctx = ProcessContext::new(NoTransport);
    assert!(matches!(
        BoundaryValues::new(&ctx, pack(0, 1), indcs, 1, 0),
        Err(MeshHaloError::InvalidGeometry(_))
    ));
}
