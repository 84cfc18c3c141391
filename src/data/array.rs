//! Flat, block-major field storage.
//!
//! [`BlockArray`] is a dense 5-D array indexed `(m, v, k, j, i)`: block,
//! variable, then the three spatial indices with `i` fastest. Each block's
//! data is one contiguous chunk, which is what the parallel kernels split
//! on.

use rayon::prelude::*;

use crate::data::Real;
use crate::data::indices::RegionIndices;

/// Dense `(nmb, nvar, nk, nj, ni)` array of reals.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockArray {
    dims: [usize; 5],
    data: Vec<Real>,
}

impl BlockArray {
    pub fn new(nmb: usize, nvar: usize, nk: usize, nj: usize, ni: usize) -> Self {
        Self {
            dims: [nmb, nvar, nk, nj, ni],
            data: vec![0.0; nmb * nvar * nk * nj * ni],
        }
    }

    /// Zeroed array of shape `dims`.
    pub fn zeros(dims: [usize; 5]) -> Self {
        let [nmb, nvar, nk, nj, ni] = dims;
        Self::new(nmb, nvar, nk, nj, ni)
    }

    /// Cell-centered array with `nvar` variables over the full (ghosted) block.
    pub fn cell_centered(nmb: usize, nvar: usize, indcs: &RegionIndices) -> Self {
        let (nk, nj, ni) = indcs.cell_dims();
        Self::new(nmb, nvar, nk, nj, ni)
    }

    #[inline]
    pub fn dims(&self) -> [usize; 5] {
        self.dims
    }

    #[inline]
    pub fn nmb(&self) -> usize {
        self.dims[0]
    }

    #[inline]
    pub fn nvar(&self) -> usize {
        self.dims[1]
    }

    /// Values per block.
    #[inline]
    pub fn block_len(&self) -> usize {
        self.dims[1] * self.dims[2] * self.dims[3] * self.dims[4]
    }

    /// Offset of `(v, k, j, i)` inside one block's chunk.
    #[inline]
    pub fn offset(&self, v: usize, k: usize, j: usize, i: usize) -> usize {
        let [_, _, nk, nj, ni] = self.dims;
        debug_assert!(k < nk && j < nj && i < ni);
        ((v * nk + k) * nj + j) * ni + i
    }

    #[inline]
    pub fn at(&self, m: usize, v: usize, k: usize, j: usize, i: usize) -> Real {
        self.data[m * self.block_len() + self.offset(v, k, j, i)]
    }

    #[inline]
    pub fn at_mut(&mut self, m: usize, v: usize, k: usize, j: usize, i: usize) -> &mut Real {
        let idx = m * self.block_len() + self.offset(v, k, j, i);
        &mut self.data[idx]
    }

    pub fn block(&self, m: usize) -> &[Real] {
        let len = self.block_len();
        &self.data[m * len..(m + 1) * len]
    }

    pub fn block_mut(&mut self, m: usize) -> &mut [Real] {
        let len = self.block_len();
        &mut self.data[m * len..(m + 1) * len]
    }

    /// Per-block mutable chunks, in parallel.
    pub fn par_blocks_mut(&mut self) -> rayon::slice::ChunksMut<'_, Real> {
        let len = self.block_len().max(1);
        self.data.par_chunks_mut(len)
    }

    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }

    /// Fill every entry from a function of its `(m, v, k, j, i)` index.
    pub fn fill_with<F>(&mut self, f: F)
    where
        F: Fn(usize, usize, usize, usize, usize) -> Real + Sync,
    {
        let [_, nvar, nk, nj, ni] = self.dims;
        self.par_blocks_mut().enumerate().for_each(|(m, chunk)| {
            let mut n = 0;
            for v in 0..nvar {
                for k in 0..nk {
                    for j in 0..nj {
                        for i in 0..ni {
                            chunk[n] = f(m, v, k, j, i);
                            n += 1;
                        }
                    }
                }
            }
        });
    }
}

/// Cell-centered variables of a pack, plus the restricted coarse copy used
/// when neighbors differ in level.
#[derive(Clone, Debug, PartialEq)]
pub struct CellVars {
    pub u: BlockArray,
    pub coarse_u: Option<BlockArray>,
}

impl CellVars {
    pub fn new(nmb: usize, nvar: usize, indcs: &RegionIndices, multilevel: bool) -> Self {
        Self {
            u: BlockArray::cell_centered(nmb, nvar, indcs),
            coarse_u: multilevel.then(|| BlockArray::cell_centered(nmb, nvar, &indcs.coarse())),
        }
    }

    pub fn nvar(&self) -> usize {
        self.u.nvar()
    }
}

/// Face-centered vector field; component `a` lives on faces normal to axis `a`.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceField {
    pub x1f: BlockArray,
    pub x2f: BlockArray,
    pub x3f: BlockArray,
}

impl FaceField {
    pub fn new(nmb: usize, indcs: &RegionIndices) -> Self {
        let [d1, d2, d3] = Self::shapes(nmb, indcs);
        Self {
            x1f: BlockArray::zeros(d1),
            x2f: BlockArray::zeros(d2),
            x3f: BlockArray::zeros(d3),
        }
    }

    /// Shapes of `x1f`, `x2f` and `x3f` for `nmb` blocks of `indcs`.
    pub fn shapes(nmb: usize, indcs: &RegionIndices) -> [[usize; 5]; 3] {
        let (nk, nj, ni) = indcs.cell_dims();
        [
            [nmb, 1, nk, nj, ni + 1],
            [nmb, 1, nk, nj + 1, ni],
            [nmb, 1, nk + 1, nj, ni],
        ]
    }

    pub fn dims(&self) -> [[usize; 5]; 3] {
        [self.x1f.dims(), self.x2f.dims(), self.x3f.dims()]
    }
}

/// Edge-centered field of the orbital remap: `x1e` on edges parallel to x1,
/// `x3e` on edges parallel to x3.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeField {
    pub x1e: BlockArray,
    pub x3e: BlockArray,
}

impl EdgeField {
    pub fn new(nmb: usize, indcs: &RegionIndices) -> Self {
        let [d1, d3] = Self::shapes(nmb, indcs);
        Self {
            x1e: BlockArray::zeros(d1),
            x3e: BlockArray::zeros(d3),
        }
    }

    /// Shapes of `x1e` and `x3e` for `nmb` blocks of `indcs`.
    pub fn shapes(nmb: usize, indcs: &RegionIndices) -> [[usize; 5]; 2] {
        let (nk, nj, ni) = indcs.cell_dims();
        [[nmb, 1, nk + 1, nj + 1, ni], [nmb, 1, nk, nj + 1, ni + 1]]
    }

    pub fn dims(&self) -> [[usize; 5]; 2] {
        [self.x1e.dims(), self.x3e.dims()]
    }
}
