//! Uniform block lattices with optional periodic identification.
//!
//! Builds the [`BlockPack`] of every rank for a single-level mesh of
//! `nblocks[0] × nblocks[1] × nblocks[2]` blocks. Global ids run
//! x1-fastest and are dealt to ranks in contiguous runs, the first
//! `nblocks % nranks` ranks taking one extra block.

use serde::{Deserialize, Serialize};

use crate::data::Real;
use crate::data::indices::{BlockSize, RegionIndices};
use crate::mesh_error::MeshHaloError;
use crate::topology::direction::{NEIGHBOR_SLOTS, directions};
use crate::topology::neighbor::{BlockPack, NeighborDescriptor, NeighborTable};

/// Which axes wrap around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Periodicity {
    pub x1: bool,
    pub x2: bool,
    pub x3: bool,
}

impl Periodicity {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            x1: true,
            x2: true,
            x3: true,
        }
    }

    fn along(self, axis: usize) -> bool {
        [self.x1, self.x2, self.x3][axis]
    }
}

/// A single-level lattice of equally sized blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformLattice {
    pub nblocks: [usize; 3],
    pub periodic: Periodicity,
    /// Physical bounds of the whole domain.
    pub domain_min: [Real; 3],
    pub domain_max: [Real; 3],
}

impl UniformLattice {
    pub fn new(nblocks: [usize; 3], periodic: Periodicity) -> Result<Self, MeshHaloError> {
        if nblocks.contains(&0) {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "block counts {nblocks:?} must be positive"
            )));
        }
        Ok(Self {
            nblocks,
            periodic,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
        })
    }

    /// Set the physical extent of the domain.
    pub fn with_domain(mut self, min: [Real; 3], max: [Real; 3]) -> Self {
        self.domain_min = min;
        self.domain_max = max;
        self
    }

    pub fn total_blocks(&self) -> usize {
        self.nblocks.iter().product()
    }

    /// Lattice coordinates of a global id.
    pub fn coords(&self, gid: usize) -> [usize; 3] {
        let [n1, n2, _] = self.nblocks;
        [gid % n1, (gid / n1) % n2, gid / (n1 * n2)]
    }

    pub fn gid_at(&self, c: [usize; 3]) -> usize {
        let [n1, n2, _] = self.nblocks;
        (c[2] * n2 + c[1]) * n1 + c[0]
    }

    /// First global id and block count of every rank.
    pub fn distribute(&self, nranks: usize) -> Result<(Vec<usize>, Vec<usize>), MeshHaloError> {
        let total = self.total_blocks();
        if nranks == 0 || nranks > total {
            return Err(MeshHaloError::InvalidConfig(format!(
                "cannot deal {total} blocks to {nranks} ranks"
            )));
        }
        let (base, extra) = (total / nranks, total % nranks);
        let counts: Vec<usize> = (0..nranks).map(|r| base + usize::from(r < extra)).collect();
        let firsts = counts
            .iter()
            .scan(0, |acc, &n| {
                let first = *acc;
                *acc += n;
                Some(first)
            })
            .collect();
        Ok((firsts, counts))
    }

    /// Physical bounds of block `gid`.
    pub fn block_size(&self, gid: usize, indcs: &RegionIndices) -> BlockSize {
        let c = self.coords(gid);
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for a in 0..3 {
            let w = (self.domain_max[a] - self.domain_min[a]) / self.nblocks[a] as Real;
            min[a] = self.domain_min[a] + c[a] as Real * w;
            max[a] = min[a] + w;
        }
        BlockSize::new(min, max, indcs)
    }

    fn neighbor_coords(&self, c: [usize; 3], offset: [i8; 3]) -> Option<[usize; 3]> {
        let mut out = [0; 3];
        for a in 0..3 {
            let n = self.nblocks[a] as isize;
            let mut x = c[a] as isize + offset[a] as isize;
            if !(0..n).contains(&x) {
                if !self.periodic.along(a) {
                    return None;
                }
                x = x.rem_euclid(n);
            }
            out[a] = x as usize;
        }
        Some(out)
    }

    /// Build the pack owned by `rank` when the lattice is dealt to `nranks` ranks.
    pub fn block_pack(
        &self,
        ndim: usize,
        rank: usize,
        nranks: usize,
    ) -> Result<BlockPack, MeshHaloError> {
        if !(1..=3).contains(&ndim) || self.nblocks[ndim..].iter().any(|&n| n != 1) {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "{ndim}-D mesh cannot hold a {:?} block lattice",
                self.nblocks
            )));
        }
        let (gids_eachrank, nmb_eachrank) = self.distribute(nranks)?;
        if rank >= nranks {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "rank {rank} outside {nranks} ranks"
            )));
        }
        let owner = |gid: usize| {
            gids_eachrank
                .iter()
                .rposition(|&first| first <= gid)
                .unwrap_or(0)
        };

        let first = gids_eachrank[rank];
        let neighbors = (first..first + nmb_eachrank[rank])
            .map(|gid| {
                let c = self.coords(gid);
                let mut table: NeighborTable = [None; NEIGHBOR_SLOTS];
                for (slot, d) in directions(ndim) {
                    if d.quadrant_along(0) + d.quadrant_along(1) + d.quadrant_along(2) != 0 {
                        continue;
                    }
                    let Some(nc) = self.neighbor_coords(c, d.offsets()) else { continue };
                    let ngid = self.gid_at(nc);
                    table[slot] = Some(NeighborDescriptor {
                        gid: ngid,
                        rank: owner(ngid),
                        level: 0,
                        dest: d.reversed().slot(),
                    });
                }
                table
            })
            .collect::<Vec<_>>();

        let pack = BlockPack {
            ndim,
            rank,
            gids_eachrank,
            nmb_eachrank: nmb_eachrank.clone(),
            levels: vec![0; nmb_eachrank[rank]],
            neighbors,
        };
        pack.validate()?;
        log::debug!(
            "rank {rank}: {} of {} lattice blocks, periodic {:?}",
            pack.nmb(),
            self.total_blocks(),
            self.periodic
        );
        Ok(pack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::direction::{Direction, X2_LOWER_FACE, X2_UPPER_FACE};

    #[test]
    fn deals_blocks_contiguously() {
        let lat = UniformLattice::new([5, 1, 1], Periodicity::none()).unwrap();
        let (firsts, counts) = lat.distribute(2).unwrap();
        assert_eq!(firsts, vec![0, 3]);
        assert_eq!(counts, vec![3, 2]);
        assert!(lat.distribute(6).is_err());
    }

    #[test]
    fn outflow_edges_have_no_neighbor() {
        let lat = UniformLattice::new([2, 1, 1], Periodicity::none()).unwrap();
        let pack = lat.block_pack(1, 0, 1).unwrap();
        let lower = Direction::new(-1, 0, 0, 0, 0).unwrap().slot();
        let upper = Direction::new(1, 0, 0, 0, 0).unwrap().slot();
        assert!(pack.neighbor(0, lower).is_none());
        let nb = pack.neighbor(0, upper).unwrap();
        assert_eq!((nb.gid, nb.dest), (1, lower));
    }

    #[test]
    fn periodic_single_block_is_its_own_neighbor() {
        let lat = UniformLattice::new([1, 1, 1], Periodicity::all()).unwrap();
        let pack = lat.block_pack(2, 0, 1).unwrap();
        let lo = pack.neighbor(0, X2_LOWER_FACE).unwrap();
        let hi = pack.neighbor(0, X2_UPPER_FACE).unwrap();
        assert_eq!((lo.gid, lo.dest), (0, X2_UPPER_FACE));
        assert_eq!((hi.gid, hi.dest), (0, X2_LOWER_FACE));
        // same-level lattices never fill quadrant slots
        assert!(pack.neighbor(0, 1).is_none());
    }

    #[test]
    fn neighbor_ranks_follow_distribution() {
        let lat = UniformLattice::new([2, 2, 1], Periodicity::all()).unwrap();
        let pack = lat.block_pack(2, 1, 2).unwrap();
        assert_eq!(pack.first_gid(), 2);
        let lo = pack.neighbor(0, X2_LOWER_FACE).unwrap();
        assert_eq!((lo.gid, lo.rank), (0, 0));
        assert!(lat.block_pack(1, 0, 1).is_err());
    }

    #[test]
    fn block_bounds_tile_the_domain() {
        let lat = UniformLattice::new([2, 2, 1], Periodicity::none())
            .unwrap()
            .with_domain([-1.0, 0.0, 0.0], [1.0, 4.0, 1.0]);
        let idx = RegionIndices::new(4, 4, 1, 2).unwrap();
        let b = lat.block_size(3, &idx);
        assert_eq!(b.min, [0.0, 2.0, 0.0]);
        assert_eq!(b.max, [1.0, 4.0, 1.0]);
        assert_eq!(b.dx[0], 0.25);
    }
}
