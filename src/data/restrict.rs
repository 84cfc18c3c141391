//! Restriction of cell-centered data onto the coarse array.
//!
//! Blocks that border a coarser neighbor send restricted data, packed from
//! `CellVars::coarse_u`. Restriction is a plain volume average over the
//! `2^ndim` fine cells that make up each coarse cell, valid on a uniform
//! Cartesian block.

use rayon::prelude::*;

use crate::data::Real;
use crate::data::array::CellVars;
use crate::data::indices::RegionIndices;
use crate::mesh_error::MeshHaloError;

/// Overwrite the interior of `vars.coarse_u` with the volume average of `vars.u`.
pub fn restrict_cell_vars(vars: &mut CellVars, indcs: &RegionIndices) -> Result<(), MeshHaloError> {
    indcs.check_multilevel()?;
    let cindcs = indcs.coarse();
    let CellVars { u, coarse_u } = vars;
    let coarse = coarse_u.as_mut().ok_or_else(|| {
        MeshHaloError::InvalidConfig("restriction requires a coarse array".into())
    })?;
    if coarse.nmb() != u.nmb() || coarse.nvar() != u.nvar() {
        return Err(MeshHaloError::InvalidGeometry(format!(
            "coarse array {:?} does not match fine array {:?}",
            coarse.dims(),
            u.dims()
        )));
    }

    let [fx, fy, fz] = indcs.axes;
    let [cx, cy, cz] = cindcs.axes;
    // fine cells per coarse cell along each axis
    let step = |active: bool| if active { 2 } else { 1 };
    let (sx, sy, sz) = (step(fx.is_active()), step(fy.is_active()), step(fz.is_active()));
    let weight = 1.0 / (sx * sy * sz) as Real;
    let nvar = u.nvar();
    let u = &*u;
    let cdims = coarse.dims();
    let (cnk, cnj, cni) = (cdims[2], cdims[3], cdims[4]);

    coarse.par_blocks_mut().enumerate().for_each(|(m, chunk)| {
        for v in 0..nvar {
            for ck in cz.s()..cz.e() {
                let fk = fz.s() + sz * (ck - cz.s());
                for cj in cy.s()..cy.e() {
                    let fj = fy.s() + sy * (cj - cy.s());
                    for ci in cx.s()..cx.e() {
                        let fi = fx.s() + sx * (ci - cx.s());
                        let mut sum = 0.0;
                        for dk in 0..sz {
                            for dj in 0..sy {
                                for di in 0..sx {
                                    sum += u.at(m, v, fk + dk, fj + dj, fi + di);
                                }
                            }
                        }
                        chunk[((v * cnk + ck) * cnj + cj) * cni + ci] = weight * sum;
                    }
                }
            }
        }
    });
    Ok(())
}
