//! Orbital shift of a shearing box and its split into whole and fractional cells.

use crate::config::ShearingBoxConfig;
use crate::data::Real;
use crate::mesh_error::MeshHaloError;

/// A shift of `integer + fraction` cells, with `fraction ∈ [0, 1)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShiftSplit {
    pub integer: i64,
    pub fraction: Real,
}

/// Split `shift / dy` into `floor` and remainder.
///
/// Rounding can leave a remainder of exactly one; it is folded into the
/// integer part so the fraction stays strictly below one.
pub fn split_shift(shift: Real, dy: Real) -> ShiftSplit {
    let cells = shift / dy;
    let whole = cells.floor();
    let mut integer = whole as i64;
    let mut fraction = cells - whole;
    if fraction >= 1.0 {
        integer += 1;
        fraction = 0.0;
    }
    ShiftSplit { integer, fraction }
}

/// Shear parameters and the largest shift the exchanged rows can serve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OrbitalState {
    pub shear_rate: Real,
    pub angular_velocity: Real,
    /// Length of the periodic x2 domain.
    pub domain_length_y: Real,
    /// Largest `|integer shift|` a step may need.
    pub max_integer_shift: usize,
}

impl OrbitalState {
    pub fn new(
        shear_rate: Real,
        angular_velocity: Real,
        domain_length_y: Real,
        max_integer_shift: usize,
    ) -> Result<Self, MeshHaloError> {
        if !shear_rate.is_finite() || !angular_velocity.is_finite() {
            return Err(MeshHaloError::InvalidConfig(format!(
                "shear rate {shear_rate} and angular velocity {angular_velocity} must be finite"
            )));
        }
        if !(domain_length_y.is_finite() && domain_length_y > 0.0) {
            return Err(MeshHaloError::InvalidConfig(format!(
                "x2 domain length {domain_length_y} must be positive"
            )));
        }
        Ok(Self {
            shear_rate,
            angular_velocity,
            domain_length_y,
            max_integer_shift,
        })
    }

    /// Derive the state from configuration and the time-step bound.
    ///
    /// Without an explicit `max_jshift`, the bound is the largest shift any
    /// cell in `x1_range` can need in one step of at most `dt_max`, rounded up,
    /// plus one cell of slack for the fractional part.
    pub fn from_config(
        cfg: &ShearingBoxConfig,
        x1_range: [Real; 2],
        domain_length_y: Real,
        dy: Real,
        dt_max: Real,
    ) -> Result<Self, MeshHaloError> {
        cfg.validate()?;
        if !(dy > 0.0) || !(dt_max >= 0.0) {
            return Err(MeshHaloError::InvalidConfig(format!(
                "cell width {dy} and time-step bound {dt_max} must be positive"
            )));
        }
        let xmax = x1_range[0].abs().max(x1_range[1].abs());
        let distance = (cfg.qshear * cfg.omega0).abs() * xmax * dt_max;
        if distance >= domain_length_y {
            return Err(MeshHaloError::InvalidConfig(format!(
                "one step can shift by {distance}, a full x2 period is {domain_length_y}"
            )));
        }
        let needed = (distance / dy).ceil() as usize + 1;
        let max_integer_shift = match cfg.max_jshift {
            Some(m) => {
                if m < needed {
                    log::warn!(
                        "max_jshift {m} is below the {needed} cells a step of {dt_max} may need; \
                         long steps will fail with ShiftOutOfRange"
                    );
                }
                m
            }
            None => needed,
        };
        log::debug!(
            "orbital advection: q={} omega={} max shift {max_integer_shift} cells",
            cfg.qshear,
            cfg.omega0
        );
        Self::new(cfg.qshear, cfg.omega0, domain_length_y, max_integer_shift)
    }

    #[inline]
    pub fn qomega(&self) -> Real {
        self.shear_rate * self.angular_velocity
    }

    /// Displacement along x2 over `dt` of material at x1 position `x`.
    #[inline]
    pub fn shift(&self, x: Real, dt: Real) -> Real {
        -self.qomega() * x * dt
    }

    /// Shift at `x` over `dt` in cells of width `dy`, bounded by `max_integer_shift`.
    pub fn decompose(&self, x: Real, dt: Real, dy: Real) -> Result<ShiftSplit, MeshHaloError> {
        let shift = self.shift(x, dt);
        if !shift.is_finite() {
            return Err(MeshHaloError::InvalidConfig(format!(
                "non-finite shift at x={x}, dt={dt}"
            )));
        }
        let split = split_shift(shift, dy);
        if split.integer.unsigned_abs() > self.max_integer_shift as u64 {
            return Err(MeshHaloError::ShiftOutOfRange {
                shift: split.integer,
                max: self.max_integer_shift,
            });
        }
        Ok(split)
    }
}
