//! The topology interface consumed by the exchange engines.
//!
//! Mesh construction and refinement live outside this crate; what reaches
//! the engines is a [`BlockPack`]: the blocks owned by this rank, their
//! refinement levels, and for every block a fixed table of optional
//! [`NeighborDescriptor`]s indexed by slot.

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshHaloError;
use crate::topology::direction::{NEIGHBOR_SLOTS, active_slots};

/// One neighbor relation as supplied by the mesh.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeighborDescriptor {
    /// Global id of the neighboring block.
    pub gid: usize,
    /// Rank owning the neighboring block.
    pub rank: usize,
    /// Refinement level of the neighboring block.
    pub level: i32,
    /// Slot of the neighbor's receive buffer that data from this block lands in.
    pub dest: usize,
}

/// Relative resolution of a neighbor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Refinement {
    /// Neighbor is one level coarser.
    Coarser,
    /// Same level.
    Same,
    /// Neighbor is one level finer.
    Finer,
}

impl Refinement {
    pub fn between(own_level: i32, neighbor_level: i32) -> Self {
        match neighbor_level.cmp(&own_level) {
            std::cmp::Ordering::Less => Refinement::Coarser,
            std::cmp::Ordering::Equal => Refinement::Same,
            std::cmp::Ordering::Greater => Refinement::Finer,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Refinement::Coarser => "coarser",
            Refinement::Same => "same",
            Refinement::Finer => "finer",
        }
    }
}

/// Per-block neighbor table.
pub type NeighborTable = [Option<NeighborDescriptor>; NEIGHBOR_SLOTS];

/// The blocks owned by one rank, with their neighbor tables.
///
/// Global ids are contiguous per rank: rank `r` owns
/// `gids_eachrank[r] .. gids_eachrank[r] + nmb_eachrank[r]`.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockPack {
    /// Mesh dimensionality (1, 2 or 3).
    pub ndim: usize,
    /// Rank that owns this pack.
    pub rank: usize,
    /// First global id on each rank.
    pub gids_eachrank: Vec<usize>,
    /// Number of blocks on each rank.
    pub nmb_eachrank: Vec<usize>,
    /// Refinement level of each local block.
    pub levels: Vec<i32>,
    /// Neighbor table of each local block.
    pub neighbors: Vec<NeighborTable>,
}

impl BlockPack {
    /// Number of blocks in this pack.
    pub fn nmb(&self) -> usize {
        self.levels.len()
    }

    /// Number of ranks in the run.
    pub fn nranks(&self) -> usize {
        self.gids_eachrank.len()
    }

    /// Global id of the first block on this rank.
    pub fn first_gid(&self) -> usize {
        self.gids_eachrank[self.rank]
    }

    /// Global id of local block `m`.
    pub fn gid(&self, m: usize) -> usize {
        self.first_gid() + m
    }

    /// Local index of `gid` if it lives on this rank.
    pub fn local_index(&self, gid: usize) -> Option<usize> {
        let first = self.first_gid();
        (gid >= first && gid < first + self.nmb()).then(|| gid - first)
    }

    /// Local id of a neighbor block on its owning rank.
    pub fn remote_local_id(&self, nb: &NeighborDescriptor) -> usize {
        nb.gid - self.gids_eachrank[nb.rank]
    }

    /// Neighbor of block `m` in `slot`, if any.
    #[inline]
    pub fn neighbor(&self, m: usize, slot: usize) -> Option<&NeighborDescriptor> {
        self.neighbors[m][slot].as_ref()
    }

    /// Relative resolution of a neighbor of block `m`.
    pub fn refinement(&self, m: usize, nb: &NeighborDescriptor) -> Refinement {
        Refinement::between(self.levels[m], nb.level)
    }

    /// Whether any two blocks in the mesh may differ in level.
    pub fn is_multilevel(&self) -> bool {
        self.neighbors.iter().enumerate().any(|(m, table)| {
            table
                .iter()
                .flatten()
                .any(|nb| nb.level != self.levels[m])
        })
    }

    /// Check the pack against the direction table and the rank layout.
    pub fn validate(&self) -> Result<(), MeshHaloError> {
        if !(1..=3).contains(&self.ndim) {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "ndim must be 1, 2 or 3, got {}",
                self.ndim
            )));
        }
        if self.nmb_eachrank.len() != self.nranks() || self.rank >= self.nranks() {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "rank {} outside a layout of {} ranks ({} block counts)",
                self.rank,
                self.nranks(),
                self.nmb_eachrank.len()
            )));
        }
        if self.neighbors.len() != self.nmb() || self.nmb_eachrank[self.rank] != self.nmb() {
            return Err(MeshHaloError::TopologyMismatch(format!(
                "{} levels, {} neighbor tables, {} blocks expected on rank {}",
                self.nmb(),
                self.neighbors.len(),
                self.nmb_eachrank[self.rank],
                self.rank
            )));
        }
        let nslots = active_slots(self.ndim);
        for (m, table) in self.neighbors.iter().enumerate() {
            for (slot, nb) in table.iter().enumerate() {
                let Some(nb) = nb else { continue };
                if slot >= nslots || nb.dest >= nslots {
                    return Err(MeshHaloError::InvalidDirection(slot.max(nb.dest)));
                }
                if nb.rank >= self.nranks() {
                    return Err(MeshHaloError::TopologyMismatch(format!(
                        "block {m} slot {slot}: neighbor rank {} out of range",
                        nb.rank
                    )));
                }
                let first = self.gids_eachrank[nb.rank];
                if nb.gid < first || nb.gid >= first + self.nmb_eachrank[nb.rank] {
                    return Err(MeshHaloError::MissingBlock(nb.gid));
                }
                if (nb.level - self.levels[m]).abs() > 1 {
                    return Err(MeshHaloError::TopologyMismatch(format!(
                        "block {m} slot {slot}: level jump {} -> {}",
                        self.levels[m], nb.level
                    )));
                }
            }
        }
        Ok(())
    }
}
