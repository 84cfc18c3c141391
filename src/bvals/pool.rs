//! Boundary buffer pool: one send and one receive buffer per active slot.
//!
//! Sized once per block collection. Element counts come from the geometric
//! extent of each direction and are cross-checked against the index ranges
//! used by the pack and unpack kernels; a disagreement is a configuration
//! error reported at allocation time.

use crate::bvals::buffer::{BoundaryBuffer, BufferCounts, BufferKind, BufferStatus};
use crate::bvals::index_ranges::{Role, element_count, flux_count, index_box};
use crate::data::indices::RegionIndices;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshHaloError;
use crate::topology::direction::directions;
use crate::topology::neighbor::Refinement;

const VARIANTS: [Refinement; 3] = [Refinement::Coarser, Refinement::Same, Refinement::Finer];

/// Send and receive buffers for every active slot of a block collection.
#[derive(Debug)]
pub struct BufferPool<R> {
    indcs: RegionIndices,
    nmb: usize,
    nvar: usize,
    nflx: usize,
    pub(crate) send: Vec<BoundaryBuffer<R>>,
    pub(crate) recv: Vec<BoundaryBuffer<R>>,
}

impl<R> BufferPool<R> {
    /// Allocate buffers for `nmb` blocks carrying `nvar` cell variables and
    /// `nflx` flux variables.
    pub fn allocate(
        indcs: RegionIndices,
        nmb: usize,
        nvar: usize,
        nflx: usize,
    ) -> Result<Self, MeshHaloError> {
        if nvar == 0 {
            return Err(MeshHaloError::InvalidConfig("pool needs at least one variable".into()));
        }
        let ndim = indcs.ndim();
        let mut send = Vec::new();
        let mut recv = Vec::new();
        for (slot, dir) in directions(ndim) {
            let counts = BufferCounts {
                coarser: element_count(&indcs, dir, Refinement::Coarser),
                same: element_count(&indcs, dir, Refinement::Same),
                finer: element_count(&indcs, dir, Refinement::Finer),
                flux: flux_count(&indcs, dir),
            };
            for (role, out) in [(Role::Send, &mut send), (Role::Recv, &mut recv)] {
                let ranges = VARIANTS.map(|v| index_box(&indcs, dir, v, role));
                for (v, range) in VARIANTS.iter().zip(&ranges) {
                    let expected = counts.for_variant(*v);
                    if range.count() != expected {
                        return Err(MeshHaloError::BufferSizeMismatch {
                            slot,
                            variant: v.name(),
                            expected,
                            actual: range.count(),
                        });
                    }
                }
                out.push(BoundaryBuffer::new(slot, counts, ranges, nmb, nvar, nflx));
            }
        }
        log::debug!(
            "buffer pool: {} slots x {nmb} blocks, {nvar} vars, {nflx} flux, {} values/side",
            send.len(),
            send.iter()
                .map(|b| b.vars.stride() * nmb + b.flux.stride() * nmb)
                .sum::<usize>()
        );
        Ok(Self {
            indcs,
            nmb,
            nvar,
            nflx,
            send,
            recv,
        })
    }

    pub fn indices(&self) -> &RegionIndices {
        &self.indcs
    }

    pub fn nmb(&self) -> usize {
        self.nmb
    }

    pub fn nvar(&self) -> usize {
        self.nvar
    }

    pub fn nflx(&self) -> usize {
        self.nflx
    }

    /// Number of slots (8, 24 or 56 by dimensionality).
    pub fn nslots(&self) -> usize {
        self.send.len()
    }

    pub fn send_buffer(&self, slot: usize) -> Result<&BoundaryBuffer<R>, MeshHaloError> {
        self.send.get(slot).ok_or(MeshHaloError::InvalidDirection(slot))
    }

    pub fn recv_buffer(&self, slot: usize) -> Result<&BoundaryBuffer<R>, MeshHaloError> {
        self.recv.get(slot).ok_or(MeshHaloError::InvalidDirection(slot))
    }

    /// Values moved per transfer for `slot` at the given refinement.
    pub fn transfer_len(&self, slot: usize, variant: Refinement) -> Result<usize, MeshHaloError> {
        Ok(self.nvar * self.send_buffer(slot)?.counts.for_variant(variant))
    }

    pub fn flux_len(&self, slot: usize) -> Result<usize, MeshHaloError> {
        Ok(self.nflx * self.send_buffer(slot)?.counts.flux)
    }
}

impl<R> DebugInvariants for BufferPool<R> {
    fn validate_invariants(&self) -> Result<(), MeshHaloError> {
        for (side, buffers) in [("send", &self.send), ("recv", &self.recv)] {
            for (slot, b) in buffers.iter().enumerate() {
                if b.slot != slot {
                    return Err(MeshHaloError::Invariant(format!(
                        "{side} buffer at position {slot} claims slot {}",
                        b.slot
                    )));
                }
                for (kind, per_var) in [
                    (BufferKind::Vars, self.nvar * b.counts.max_cells()),
                    (BufferKind::Flux, self.nflx * b.counts.flux),
                ] {
                    let lane = b.lane(kind);
                    if lane.stride() != per_var || lane.nmb() != self.nmb {
                        return Err(MeshHaloError::Invariant(format!(
                            "{side} slot {slot} {kind:?}: {} x {} storage, expected {} x {per_var}",
                            lane.nmb(),
                            lane.stride(),
                            self.nmb
                        )));
                    }
                    // an in-flight handle is only legal while the buffer waits
                    if let Some(m) = lane
                        .pending_blocks()
                        .find(|&m| lane.status(m) != BufferStatus::Waiting)
                    {
                        return Err(MeshHaloError::Invariant(format!(
                            "{side} slot {slot} {kind:?}: block {m} holds a handle while {:?}",
                            lane.status(m)
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
