//! Pack and unpack kernels: field array <-> flat buffer.
//!
//! Buffer order is `(v, k, j, i)` over the range, `i` fastest. Kernels work
//! on one block chunk at a time so the engine can run blocks (and, for
//! packing, individual buffers) in parallel on disjoint memory.

use rayon::prelude::*;

use crate::bvals::index_ranges::IndexBox;
use crate::data::Real;

/// Offset of `(v, k, j, i)` inside a block chunk of shape `dims`.
#[inline]
pub fn chunk_offset(dims: [usize; 5], v: usize, k: usize, j: usize, i: usize) -> usize {
    let [_, _, nk, nj, ni] = dims;
    ((v * nk + k) * nj + j) * ni + i
}

/// Copy `range` of every variable of one block into `out`.
///
/// Returns the number of values written.
pub fn pack_cells(dims: [usize; 5], block: &[Real], range: &IndexBox, out: &mut [Real]) -> usize {
    let nvar = dims[1];
    let mut n = 0;
    for v in 0..nvar {
        for (k, j, i) in range.cells() {
            out[n] = block[chunk_offset(dims, v, k, j, i)];
            n += 1;
        }
    }
    n
}

/// Inverse of [`pack_cells`]: scatter `input` over `range` of one block.
pub fn unpack_cells(
    dims: [usize; 5],
    block: &mut [Real],
    range: &IndexBox,
    input: &[Real],
) -> usize {
    let nvar = dims[1];
    let mut n = 0;
    for v in 0..nvar {
        for (k, j, i) in range.cells() {
            block[chunk_offset(dims, v, k, j, i)] = input[n];
            n += 1;
        }
    }
    n
}

/// One buffer to fill: source block chunk, its shape, the range and the target.
pub struct PackJob<'a> {
    pub dims: [usize; 5],
    pub block: &'a [Real],
    pub range: &'a IndexBox,
    pub out: &'a mut [Real],
}

/// Run every pack job in parallel. Jobs write disjoint targets.
pub fn run_pack_jobs(jobs: Vec<PackJob<'_>>) {
    jobs.into_par_iter().for_each(|job| {
        let n = pack_cells(job.dims, job.block, job.range, job.out);
        debug_assert_eq!(n, job.dims[1] * job.range.count());
    });
}
