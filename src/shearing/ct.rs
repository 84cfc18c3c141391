//! Effective EMFs of the orbital remap and the constrained-transport update.
//!
//! Face-centered field components are never remapped directly. Each column
//! of `B1` (x1 faces) and `B3` (x3 faces) yields, at every x2 face, the
//! amount of flux that crossed it during the shift: the fractional remap
//! flux plus the sum over the cells the integer shift moved across. Those
//! edge values are then differenced onto the faces so that every cell's
//! discrete divergence is left unchanged.
//!
//! Edge storage used here:
//! - `Ez` in `EdgeField::x3e` at `k ∈ [ks, ke)`, `j ∈ [js, je]`, `i ∈ [is, ie]`
//! - `Ex` in `EdgeField::x1e` at `k ∈ [ks, ke]`, `j ∈ [js, je]`, `i ∈ [is, ie)`

use rayon::prelude::*;

use crate::bvals::kernels::chunk_offset;
use crate::data::Real;
use crate::data::array::{EdgeField, FaceField};
use crate::data::indices::{BlockSize, RegionIndices};
use crate::mesh_error::MeshHaloError;
use crate::shearing::remap::{ReconstructionMethod, load_shifted, remap_fluxes};
use crate::shearing::shift::ShiftSplit;

/// Signed sum of the cells a whole-cell shift carries across face `j`.
///
/// Upward shifts move `src(j - shift) ..= src(j - 1)` across the face;
/// downward shifts move `src(j) ..= src(j - shift - 1)` the other way.
pub fn integer_shift_sum<S>(j: isize, shift: i64, src: S) -> Real
where
    S: Fn(isize) -> Real,
{
    let shift = shift as isize;
    if shift >= 0 {
        (j - shift..j).map(&src).sum()
    } else {
        -(j..j - shift).map(&src).sum::<Real>()
    }
}

/// Total flux through faces `js..=je` of one shifted column, written to `out[j]`.
///
/// `w` is scratch of the column length, `flx` at least one longer than `je`.
#[allow(clippy::too_many_arguments)]
pub fn shifted_face_flux<S>(
    method: ReconstructionMethod,
    js: usize,
    je: usize,
    split: ShiftSplit,
    src: S,
    w: &mut [Real],
    flx: &mut [Real],
    out: &mut [Real],
) -> Result<(), MeshHaloError>
where
    S: Fn(isize) -> Real,
{
    load_shifted(w, split.integer, &src);
    remap_fluxes(method, js, je, split.fraction, w, flx)?;
    for j in js..=je {
        out[j] = flx[j] + integer_shift_sum(j as isize, split.integer, &src);
    }
    Ok(())
}

fn check_shapes(
    b: &FaceField,
    emf: &EdgeField,
    indcs: &RegionIndices,
    nmb: usize,
) -> Result<(), MeshHaloError> {
    if b.dims() != FaceField::shapes(nmb, indcs) || emf.dims() != EdgeField::shapes(nmb, indcs) {
        return Err(MeshHaloError::InvalidGeometry(format!(
            "face/edge arrays do not match {nmb} blocks of {:?}",
            indcs.cell_dims()
        )));
    }
    Ok(())
}

/// Apply the edge values in `emf` to the face components of `b`.
///
/// `B1 -= ΔyEz`, `B2 += (dy/dx) ΔxEz - (dy/dz) ΔzEx` (the last term only in
/// 3-D), `B3 += ΔyEx`.
pub fn ct_update(
    b: &mut FaceField,
    emf: &EdgeField,
    indcs: &RegionIndices,
    sizes: &[BlockSize],
) -> Result<(), MeshHaloError> {
    check_shapes(b, emf, indcs, sizes.len())?;
    let [ax, ay, az] = indcs.axes;
    let (is, ie, js, je, ks, ke) = (ax.s(), ax.e(), ay.s(), ay.e(), az.s(), az.e());
    let three_d = indcs.three_d();
    let (d1, d2, d3) = (b.x1f.dims(), b.x2f.dims(), b.x3f.dims());

    let FaceField { x1f, x2f, x3f } = b;
    x1f.par_blocks_mut()
        .zip(x2f.par_blocks_mut())
        .zip(x3f.par_blocks_mut())
        .enumerate()
        .for_each(|(m, ((b1, b2), b3))| {
            let ez = |k, j, i| emf.x3e.at(m, 0, k, j, i);
            let ex = |k, j, i| emf.x1e.at(m, 0, k, j, i);
            let dx = sizes[m].dx;

            for k in ks..ke {
                for j in js..je {
                    for i in is..=ie {
                        b1[chunk_offset(d1, 0, k, j, i)] -= ez(k, j + 1, i) - ez(k, j, i);
                    }
                }
            }
            for k in ks..ke {
                for j in js..=je {
                    for i in is..ie {
                        let mut d = dx[1] / dx[0] * (ez(k, j, i + 1) - ez(k, j, i));
                        if three_d {
                            d -= dx[1] / dx[2] * (ex(k + 1, j, i) - ex(k, j, i));
                        }
                        b2[chunk_offset(d2, 0, k, j, i)] += d;
                    }
                }
            }
            for k in ks..=ke {
                for j in js..je {
                    for i in is..ie {
                        b3[chunk_offset(d3, 0, k, j, i)] += ex(k, j + 1, i) - ex(k, j, i);
                    }
                }
            }
        });
    Ok(())
}

/// Discrete divergence of `b` in cell `(k, j, i)` of block `m`.
pub fn divergence(
    b: &FaceField,
    indcs: &RegionIndices,
    size: &BlockSize,
    m: usize,
    k: usize,
    j: usize,
    i: usize,
) -> Real {
    let dx = size.dx;
    let mut div = (b.x1f.at(m, 0, k, j, i + 1) - b.x1f.at(m, 0, k, j, i)) / dx[0];
    if indcs.multi_d() {
        div += (b.x2f.at(m, 0, k, j + 1, i) - b.x2f.at(m, 0, k, j, i)) / dx[1];
    }
    if indcs.three_d() {
        div += (b.x3f.at(m, 0, k + 1, j, i) - b.x3f.at(m, 0, k, j, i)) / dx[2];
    }
    div
}
