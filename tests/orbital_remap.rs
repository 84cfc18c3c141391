mod util;

use mesh_halo::prelude::*;
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use util::*;

/// `[-0.5, 0.5] × [0, n2]` with unit-tall blocks of 8 × 8 cells.
fn shearing_lattice(n2: usize) -> (UniformLattice, RegionIndices) {
    let lat = UniformLattice::new([2, n2, 1], Periodicity::all())
        .unwrap()
        .with_domain([-0.5, 0.0, 0.0], [0.5, n2 as Real, 1.0]);
    (lat, RegionIndices::new(8, 8, 1, 2).unwrap())
}

fn keplerian(recon: ReconstructionMethod, ly: Real) -> OrbitalState {
    let cfg = ShearingBoxConfig {
        qshear: 1.5,
        omega0: 1.0,
        max_jshift: None,
        reconstruction: recon,
    };
    OrbitalState::from_config(&cfg, [-0.5, 0.5], ly, 0.125, 0.4).unwrap()
}

fn random_fill(u: &mut BlockArray, pack: &BlockPack, seed: u64) {
    let [_, nvar, nk, nj, ni] = u.dims();
    for m in 0..pack.nmb() {
        let mut rng = SmallRng::seed_from_u64(seed ^ (pack.gid(m) as u64) << 32);
        for v in 0..nvar {
            for k in 0..nk {
                for j in 0..nj {
                    for i in 0..ni {
                        *u.at_mut(m, v, k, j, i) = rng.gen_range(0.0..1.0);
                    }
                }
            }
        }
    }
}

/// Interior total of every global x1 column: `[x1 block][v][i]`.
fn column_totals(
    u: &BlockArray,
    lat: &UniformLattice,
    indcs: &RegionIndices,
    pack: &BlockPack,
) -> Vec<Vec<Vec<Real>>> {
    let (ax, ay) = (indcs.axis(0), indcs.axis(1));
    let mut totals = vec![vec![vec![0.0; ax.n]; u.nvar()]; lat.nblocks[0]];
    for m in 0..pack.nmb() {
        let c = lat.coords(pack.gid(m))[0];
        for v in 0..u.nvar() {
            for j in ay.s()..ay.e() {
                for i in ax.s()..ax.e() {
                    totals[c][v][i - ax.s()] += u.at(m, v, 0, j, i);
                }
            }
        }
    }
    totals
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn remap_conserves_column_totals(
        seed in any::<u64>(),
        dt in 0.0f64..0.4,
        plm in any::<bool>(),
    ) {
        let recon = if plm { ReconstructionMethod::Plm } else { ReconstructionMethod::Dc };
        let (lat, indcs) = shearing_lattice(3);
        let ctx = ProcessContext::new(NoTransport);
        let (mut orb, pack) =
            orbital_engine(&ctx, &lat, indcs, keplerian(recon, 3.0), recon, 2).unwrap();
        let mut u = BlockArray::cell_centered(pack.nmb(), 2, &indcs);
        random_fill(&mut u, &pack, seed);

        let before = column_totals(&u, &lat, &indcs, &pack);
        remap_cells(&mut orb, &mut u, dt).unwrap();
        let after = column_totals(&u, &lat, &indcs, &pack);
        for (b, a) in before.iter().flatten().flatten().zip(after.iter().flatten().flatten()) {
            prop_assert!((b - a).abs() < 1e-11, "column total {b} became {a}");
        }
    }
}

#[test]
fn uniform_fields_stay_uniform() {
    let (lat, indcs) = shearing_lattice(2);
    let ctx = ProcessContext::new(NoTransport);
    for recon in [ReconstructionMethod::Dc, ReconstructionMethod::Plm] {
        let (mut orb, pack) =
            orbital_engine(&ctx, &lat, indcs, keplerian(recon, 2.0), recon, 1).unwrap();
        let mut u = BlockArray::cell_centered(pack.nmb(), 1, &indcs);
        u.fill_with(|_, _, _, _, _| 2.5);
        remap_cells(&mut orb, &mut u, 0.37).unwrap();
        assert!(u.as_slice().iter().all(|&x| x == 2.5), "{recon}");
    }
}

#[test]
fn zero_shear_is_a_no_op() {
    let (lat, indcs) = shearing_lattice(3);
    let state = OrbitalState::new(0.0, 1.0, 3.0, 2).unwrap();
    let recon = ReconstructionMethod::Plm;
    run_ranks(3, |ctx| {
        let (mut orb, pack) = orbital_engine(&ctx, &lat, indcs, state, recon, 3).unwrap();
        let mut u = BlockArray::cell_centered(pack.nmb(), 3, &indcs);
        random_fill(&mut u, &pack, 7);
        let before = u.clone();
        remap_cells(&mut orb, &mut u, 0.3).unwrap();
        assert_eq!(bits(u.as_slice()), bits(before.as_slice()));
    });
}

#[test]
fn whole_cell_shifts_wrap_across_blocks_and_ranks() {
    // two columns at x = 3 and x = 5; q = omega = 1 and dt = 1/8 shift them
    // by exactly -3 and -5 cells of 1/8
    let indcs = RegionIndices::new(2, 8, 1, 2).unwrap();
    let lat = UniformLattice::new([1, 3, 1], Periodicity::all())
        .unwrap()
        .with_domain([2.0, 0.0, 0.0], [6.0, 3.0, 1.0]);
    let state = OrbitalState::new(1.0, 1.0, 3.0, 5).unwrap();
    let n2 = 24;
    let per_rank = run_ranks(3, |ctx| {
        let (mut orb, pack) =
            orbital_engine(&ctx, &lat, indcs, state, ReconstructionMethod::Dc, 1).unwrap();
        let mut u = BlockArray::cell_centered(pack.nmb(), 1, &indcs);
        u.fill_with(|m, _, k, j, i| global_cell(&lat, &indcs, pack.gid(m), k, j, i)[1] as Real);
        remap_cells(&mut orb, &mut u, 0.125).unwrap();
        (0..pack.nmb())
            .map(|m| (pack.gid(m), u.block(m).to_vec()))
            .collect::<Vec<_>>()
    });
    for (gid, block) in by_gid(per_rank).iter().enumerate() {
        let ay = indcs.axis(1);
        let ni = indcs.axis(0).ncells();
        for j in ay.s()..ay.e() {
            let g = (8 * gid + j - ay.s()) as i64;
            for (c, shift) in [(0, 3), (1, 5)] {
                let i = indcs.axis(0).s() + c;
                let expected = ((g + shift) % n2) as Real;
                assert_eq!(block[j * ni + i], expected, "gid {gid} row {j} column {c}");
            }
        }
    }
}

#[test]
fn rank_count_does_not_change_the_remap() {
    let (lat, indcs) = shearing_lattice(3);
    let recon = ReconstructionMethod::Plm;
    let state = keplerian(recon, 3.0);
    let remapped = |nranks: usize| {
        by_gid(run_ranks(nranks, |ctx| {
            let (mut orb, pack) = orbital_engine(&ctx, &lat, indcs, state, recon, 2).unwrap();
            let mut u = BlockArray::cell_centered(pack.nmb(), 2, &indcs);
            random_fill(&mut u, &pack, 11);
            remap_cells(&mut orb, &mut u, 0.29).unwrap();
            (0..pack.nmb())
                .map(|m| (pack.gid(m), bits(u.block(m))))
                .collect::<Vec<_>>()
        }))
    };
    let serial = remapped(1);
    for nranks in [2, 3, 6] {
        assert!(remapped(nranks) == serial, "{nranks} ranks differ from one");
    }
}

#[test]
fn shifts_beyond_the_exchanged_rows_fail() {
    let (lat, indcs) = shearing_lattice(2);
    let state = OrbitalState::new(1.5, 1.0, 2.0, 1).unwrap();
    let ctx = ProcessContext::new(NoTransport);
    let recon = ReconstructionMethod::Dc;
    let (mut orb, pack) = orbital_engine(&ctx, &lat, indcs, state, recon, 1).unwrap();
    let mut u = BlockArray::cell_centered(pack.nmb(), 1, &indcs);
    orb.init_recv(ShearKind::Cell).unwrap();
    orb.pack_and_send_cc(&u).unwrap();
    assert!(matches!(
        orb.recv_and_unpack_cc(&mut u, 0.4),
        Err(MeshHaloError::ShiftOutOfRange { max: 1, .. })
    ));
}

#[test]
fn setup_rejects_what_the_remap_cannot_serve() {
    let (lat, indcs) = shearing_lattice(2);
    let ctx = ProcessContext::new(NoTransport);
    let state = keplerian(ReconstructionMethod::Plm, 2.0);

    let ppm = orbital_engine(&ctx, &lat, indcs, state, ReconstructionMethod::Ppm4, 1);
    assert!(matches!(ppm, Err(MeshHaloError::UnsupportedReconstruction(_))));

    // eight rows cannot hold two ghosts plus a shift of seven
    let wide = OrbitalState::new(1.5, 1.0, 2.0, 7).unwrap();
    let too_far = orbital_engine(&ctx, &lat, indcs, wide, ReconstructionMethod::Plm, 1);
    assert!(matches!(too_far, Err(MeshHaloError::InvalidGeometry(_))));

    let sheared_only = Periodicity {
        x2: false,
        ..Periodicity::all()
    };
    let open = UniformLattice::new([2, 2, 1], sheared_only).unwrap();
    let no_neighbor = orbital_engine(&ctx, &open, indcs, state, ReconstructionMethod::Plm, 1);
    assert!(matches!(no_neighbor, Err(MeshHaloError::TopologyMismatch(_))));
}

#[test]
fn config_drives_the_shift_bound() {
    let cfg: ShearingBoxConfig =
        serde_json::from_str(r#"{"qshear": 1.5, "reconstruction": "dc"}"#).unwrap();
    let state = OrbitalState::from_config(&cfg, [-0.5, 0.5], 3.0, 0.125, 0.4).unwrap();
    // |q omega| * 0.5 * 0.4 = 0.3 = 2.4 cells
    assert_eq!(state.max_integer_shift, 4);
    let pinned = ShearingBoxConfig {
        max_jshift: Some(2),
        ..cfg
    };
    assert_eq!(
        OrbitalState::from_config(&pinned, [-0.5, 0.5], 3.0, 0.125, 0.4).unwrap().max_integer_shift,
        2
    );
    assert!(OrbitalState::from_config(&cfg, [-0.5, 0.5], 0.25, 0.125, 0.4).is_err());
}

#[test]
fn packs_beyond_the_tag_range_are_rejected() {
    let ctx = ProcessContext::new(ShortTags);
    let (pair, indcs) = shearing_lattice(1);
    let state = keplerian(ReconstructionMethod::Dc, 1.0);
    assert!(orbital_engine(&ctx, &pair, indcs, state, ReconstructionMethod::Dc, 1).is_ok());

    let (quad, indcs) = shearing_lattice(2);
    let state = keplerian(ReconstructionMethod::Dc, 2.0);
    assert!(matches!(
        orbital_engine(&ctx, &quad, indcs, state, ReconstructionMethod::Dc, 1),
        Err(MeshHaloError::InvalidConfig(_))
    ));
}
