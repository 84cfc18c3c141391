//! Conservative 1-D remap of a shifted column by a fraction of a cell.
//!
//! After the integer part of the shift has been applied by indexing, the
//! remaining fraction `eps ∈ [0, 1)` of a cell is moved with upwind
//! "fluxes" at cell faces. Face `j` sits between cells `j - 1` and `j`;
//! the update `new(j) = w(j) - (flx(j+1) - flx(j))` telescopes, so the sum
//! over any run of cells changes only by its two boundary fluxes.

use std::fmt;
use std::str::FromStr;

use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshHaloError;

/// Reconstruction selector, as named in run configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionMethod {
    /// Donor cell (piecewise constant).
    Dc,
    /// Piecewise linear with a van Leer limiter.
    Plm,
    Ppm4,
    Ppmx,
    Wenoz,
}

impl ReconstructionMethod {
    pub fn name(self) -> &'static str {
        match self {
            ReconstructionMethod::Dc => "dc",
            ReconstructionMethod::Plm => "plm",
            ReconstructionMethod::Ppm4 => "ppm4",
            ReconstructionMethod::Ppmx => "ppmx",
            ReconstructionMethod::Wenoz => "wenoz",
        }
    }

    /// Ghost cells below the first flux face that the stencil reads.
    pub fn stencil_depth(self) -> usize {
        match self {
            ReconstructionMethod::Dc => 1,
            ReconstructionMethod::Plm => 2,
            ReconstructionMethod::Ppm4
            | ReconstructionMethod::Ppmx
            | ReconstructionMethod::Wenoz => 3,
        }
    }

    /// Reject selectors the remap has no flux function for.
    pub fn check_remap_support(self) -> Result<(), MeshHaloError> {
        match self {
            ReconstructionMethod::Dc | ReconstructionMethod::Plm => Ok(()),
            other => Err(MeshHaloError::UnsupportedReconstruction(other.name().into())),
        }
    }
}

impl fmt::Display for ReconstructionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReconstructionMethod {
    type Err = MeshHaloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dc" => Ok(ReconstructionMethod::Dc),
            "plm" => Ok(ReconstructionMethod::Plm),
            "ppm4" => Ok(ReconstructionMethod::Ppm4),
            "ppmx" => Ok(ReconstructionMethod::Ppmx),
            "wenoz" => Ok(ReconstructionMethod::Wenoz),
            other => Err(MeshHaloError::InvalidConfig(format!(
                "unknown reconstruction method `{other}`"
            ))),
        }
    }
}

/// Harmonic-mean (van Leer) limited slope.
#[inline]
pub fn van_leer<F: Float>(dql: F, dqr: F) -> F {
    let prod = dql * dqr;
    if prod > F::zero() {
        (prod + prod) / (dql + dqr)
    } else {
        F::zero()
    }
}

/// Donor-cell fluxes for faces `jl..=ju`.
pub fn donor_cell_fluxes<F: Float>(jl: usize, ju: usize, eps: F, w: &[F], flx: &mut [F]) {
    for j in jl..=ju {
        flx[j] = eps * w[j - 1];
    }
}

/// Piecewise-linear fluxes for faces `jl..=ju`; needs `w[jl - 2]`.
pub fn plm_fluxes<F: Float>(jl: usize, ju: usize, eps: F, w: &[F], flx: &mut [F]) {
    let half = F::one() / (F::one() + F::one());
    for j in jl..=ju {
        let c = j - 1;
        let dq = van_leer(w[c] - w[c - 1], w[c + 1] - w[c]);
        flx[j] = eps * (w[c] + half * (F::one() - eps) * dq);
    }
}

/// Fill `flx[jl..=ju]` with the remap fluxes of the selected method.
pub fn remap_fluxes<F: Float>(
    method: ReconstructionMethod,
    jl: usize,
    ju: usize,
    eps: F,
    w: &[F],
    flx: &mut [F],
) -> Result<(), MeshHaloError> {
    if jl < method.stencil_depth() || ju >= w.len() || flx.len() <= ju {
        return Err(MeshHaloError::InvalidGeometry(format!(
            "{method} fluxes over faces {jl}..={ju} do not fit a column of {} cells",
            w.len()
        )));
    }
    match method {
        ReconstructionMethod::Dc => donor_cell_fluxes(jl, ju, eps, w, flx),
        ReconstructionMethod::Plm => plm_fluxes(jl, ju, eps, w, flx),
        other => return Err(MeshHaloError::UnsupportedReconstruction(other.name().into())),
    }
    Ok(())
}

/// Fill `w` with the source column shifted up by `shift` cells:
/// `w[jj] = source(jj - shift)`.
pub fn load_shifted<F, S>(w: &mut [F], shift: i64, source: S)
where
    F: Float,
    S: Fn(isize) -> F,
{
    for (jj, slot) in w.iter_mut().enumerate() {
        *slot = source(jj as isize - shift as isize);
    }
}

/// Conservative update of cells `js..je` from the shifted column and fluxes.
pub fn apply_fluxes<F: Float>(js: usize, je: usize, w: &[F], flx: &[F], out: &mut [F]) {
    for j in js..je {
        out[j] = w[j] - (flx[j + 1] - flx[j]);
    }
}
