//! Per-slot boundary buffers and their status lifecycle.

use crate::bvals::index_ranges::IndexBox;
use crate::data::Real;
use crate::mesh_error::MeshHaloError;
use crate::topology::neighbor::Refinement;

/// Lifecycle of one `(block, slot, kind)` buffer within an exchange round.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    /// Never used this round (or no neighbor in this slot).
    #[default]
    Undefined,
    /// A transfer is posted and has not been observed to finish.
    Waiting,
    /// Payload is complete and may be read.
    Ready,
}

/// What a buffer carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Cell-centered variables.
    Vars,
    /// Flux-correction values sent to coarser face neighbors.
    Flux,
}

/// Elements per variable for each relative refinement, plus the flux count.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferCounts {
    pub same: usize,
    pub coarser: usize,
    pub finer: usize,
    pub flux: usize,
}

impl BufferCounts {
    #[inline]
    pub fn for_variant(&self, variant: Refinement) -> usize {
        match variant {
            Refinement::Coarser => self.coarser,
            Refinement::Same => self.same,
            Refinement::Finer => self.finer,
        }
    }

    /// Largest per-variable count of the three refinement variants.
    pub fn max_cells(&self) -> usize {
        self.same.max(self.coarser).max(self.finer)
    }
}

/// Storage, status and in-flight handles of one buffer kind for every block.
///
/// Each block owns a fixed `stride`-long chunk of `data`; a transfer uses a
/// prefix of that chunk.
#[derive(Debug)]
pub struct Lane<R> {
    status: Vec<BufferStatus>,
    pending: Vec<Option<R>>,
    data: Vec<Real>,
    stride: usize,
}

impl<R> Lane<R> {
    pub fn new(nmb: usize, stride: usize) -> Self {
        Self {
            status: vec![BufferStatus::Undefined; nmb],
            pending: (0..nmb).map(|_| None).collect(),
            data: vec![0.0; nmb * stride],
            stride,
        }
    }

    pub fn nmb(&self) -> usize {
        self.status.len()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn status(&self, m: usize) -> BufferStatus {
        self.status[m]
    }

    #[inline]
    pub fn set_status(&mut self, m: usize, status: BufferStatus) {
        self.status[m] = status;
    }

    /// Complete payload of block `m`; refuses to hand it out unless `Ready`.
    pub fn payload(&self, m: usize, slot: usize, len: usize) -> Result<&[Real], MeshHaloError> {
        if self.status[m] != BufferStatus::Ready {
            return Err(MeshHaloError::NotReady { block: m, slot });
        }
        Ok(&self.chunk(m)[..len])
    }

    pub fn chunk(&self, m: usize) -> &[Real] {
        &self.data[m * self.stride..(m + 1) * self.stride]
    }

    pub fn chunk_mut(&mut self, m: usize) -> &mut [Real] {
        &mut self.data[m * self.stride..(m + 1) * self.stride]
    }

    /// One mutable chunk per block, for handing to parallel kernels.
    pub fn chunks_mut(&mut self) -> Vec<&mut [Real]> {
        if self.stride == 0 {
            return (0..self.nmb()).map(|_| <&mut [Real]>::default()).collect();
        }
        self.data.chunks_mut(self.stride).collect()
    }

    pub fn pending_mut(&mut self, m: usize) -> &mut Option<R> {
        &mut self.pending[m]
    }

    /// Blocks with a transfer still in flight.
    pub fn pending_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.pending
            .iter()
            .enumerate()
            .filter_map(|(m, p)| p.as_ref().map(|_| m))
    }
}

/// Buffers of one slot: index ranges for each refinement variant and the
/// variable and flux lanes.
#[derive(Debug)]
pub struct BoundaryBuffer<R> {
    pub slot: usize,
    pub counts: BufferCounts,
    ranges: [IndexBox; 3],
    pub vars: Lane<R>,
    pub flux: Lane<R>,
}

fn variant_index(variant: Refinement) -> usize {
    match variant {
        Refinement::Coarser => 0,
        Refinement::Same => 1,
        Refinement::Finer => 2,
    }
}

impl<R> BoundaryBuffer<R> {
    /// `ranges` are ordered coarser, same, finer.
    pub fn new(
        slot: usize,
        counts: BufferCounts,
        ranges: [IndexBox; 3],
        nmb: usize,
        nvar: usize,
        nflx: usize,
    ) -> Self {
        Self {
            slot,
            counts,
            ranges,
            vars: Lane::new(nmb, nvar * counts.max_cells()),
            flux: Lane::new(nmb, nflx * counts.flux),
        }
    }

    pub fn range(&self, variant: Refinement) -> &IndexBox {
        &self.ranges[variant_index(variant)]
    }

    pub fn lane(&self, kind: BufferKind) -> &Lane<R> {
        match kind {
            BufferKind::Vars => &self.vars,
            BufferKind::Flux => &self.flux,
        }
    }

    pub fn lane_mut(&mut self, kind: BufferKind) -> &mut Lane<R> {
        match kind {
            BufferKind::Vars => &mut self.vars,
            BufferKind::Flux => &mut self.flux,
        }
    }
}
