//! Receiver apertures.

use std::fmt;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::grid::RectGrid;

/// A receiving aperture that masks the arriving field.
pub trait Pupil: Send + Sync + fmt::Debug {
    /// Field after the aperture; samples outside it are zeroed.
    fn output(&self, field: &Array2<Complex64>) -> Array2<Complex64>;

    fn grid(&self) -> &RectGrid;
}

/// Hard-edged circular aperture of the given radius, optionally shifted
/// off axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CirclePupil {
    grid: RectGrid,
    radius: f64,
    shift_x: f64,
    shift_y: f64,
}

impl CirclePupil {
    pub fn new(grid: RectGrid, radius: f64) -> Result<Self, ChannelError> {
        Self::shifted(grid, radius, 0.0, 0.0)
    }

    /// Aperture centred at `(shift_x, shift_y)` in beam coordinates.
    pub fn shifted(
        grid: RectGrid,
        radius: f64,
        shift_x: f64,
        shift_y: f64,
    ) -> Result<Self, ChannelError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ChannelError::Config(format!(
                "aperture radius must be finite and positive, got {radius}"
            )));
        }
        if !shift_x.is_finite() || !shift_y.is_finite() {
            return Err(ChannelError::Config(
                "aperture shift must be finite".into(),
            ));
        }
        Ok(Self {
            grid,
            radius,
            shift_x,
            shift_y,
        })
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Boolean transmission mask, `(ny, nx)`.
    pub fn mask(&self) -> Array2<bool> {
        let x = self.grid.x();
        let y = self.grid.y();
        let r2 = self.radius * self.radius;
        Array2::from_shape_fn((self.grid.ny(), self.grid.nx()), |(i, j)| {
            let dx = x[[0, j]] - self.shift_x;
            let dy = y[[i, 0]] + self.shift_y;
            dx * dx + dy * dy <= r2
        })
    }
}

impl Pupil for CirclePupil {
    fn output(&self, field: &Array2<Complex64>) -> Array2<Complex64> {
        let mask = self.mask();
        let mut out = field.clone();
        for (v, pass) in out.iter_mut().zip(mask.iter()) {
            if !pass {
                *v = Complex64::new(0.0, 0.0);
            }
        }
        out
    }

    fn grid(&self) -> &RectGrid {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn grid() -> RectGrid {
        RectGrid::new(128, 1e-3).unwrap()
    }

    #[test]
    fn mask_area_approximates_the_disc() {
        let p = CirclePupil::new(grid(), 0.03).unwrap();
        let count = p.mask().iter().filter(|v| **v).count();
        let area = count as f64 * 1e-3 * 1e-3;
        assert_relative_eq!(area, PI * 0.03 * 0.03, max_relative = 0.02);
    }

    #[test]
    fn samples_outside_the_aperture_are_zeroed() {
        let p = CirclePupil::new(grid(), 0.01).unwrap();
        let field = Array2::from_elem((128, 128), Complex64::new(1.0, -0.5));
        let out = p.output(&field);
        let (i0, j0) = grid().origin_index();
        assert_eq!(out[[i0, j0]], Complex64::new(1.0, -0.5));
        assert_eq!(out[[0, 0]], Complex64::new(0.0, 0.0));
        let passed = out.iter().filter(|v| v.norm_sqr() > 0.0).count();
        assert_eq!(passed, p.mask().iter().filter(|v| **v).count());
    }

    #[test]
    fn shifting_moves_the_centre() {
        let p = CirclePupil::shifted(grid(), 0.005, 0.02, 0.0).unwrap();
        let mask = p.mask();
        let (i0, j0) = grid().origin_index();
        assert!(!mask[[i0, j0]]);
        assert!(mask[[i0, j0 + 20]]);
    }

    #[test]
    fn degenerate_apertures_are_rejected() {
        assert!(CirclePupil::new(grid(), 0.0).is_err());
        assert!(CirclePupil::new(grid(), -1.0).is_err());
        assert!(CirclePupil::shifted(grid(), 0.01, f64::NAN, 0.0).is_err());
    }
}
