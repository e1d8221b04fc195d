//! Sampled spatial domains.
//!
//! Two grid families cover everything the channel needs:
//!
//! - [`RectGrid`]: a uniformly sampled Cartesian window centred on the
//!   optical axis, together with its reciprocal (spatial-frequency) grid.
//!   Fields, phase screens and pupils all live on one of these.
//! - [`LogPolarGrid`]: a logarithmic radial partition of the frequency
//!   plane used by the sparse-spectrum screen generators, which sample a
//!   handful of plane-wave components per annulus instead of filling a
//!   full FFT grid.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Uniform Cartesian sampling grid.
///
/// An `nx x ny` window with pitch `delta` metres. Sample `j` along an axis
/// of `n` points sits at `(j - n/2) * delta`, so index `n/2` is the optical
/// axis for both parities and the window spans `n * delta` metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectGrid {
    nx: usize,
    ny: usize,
    delta: f64,
}

impl RectGrid {
    /// Square grid of `resolution x resolution` points with pitch `delta`.
    pub fn new(resolution: usize, delta: f64) -> Result<Self, ChannelError> {
        Self::rectangular(resolution, resolution, delta)
    }

    /// Rectangular grid of `nx` columns by `ny` rows with pitch `delta`.
    pub fn rectangular(nx: usize, ny: usize, delta: f64) -> Result<Self, ChannelError> {
        if nx == 0 || ny == 0 {
            return Err(ChannelError::Config(
                "grid resolution must be at least 1 point per axis".into(),
            ));
        }
        if !delta.is_finite() || delta <= 0.0 {
            return Err(ChannelError::Config(format!(
                "grid pitch must be finite and positive, got {delta}"
            )));
        }
        Ok(Self { nx, ny, delta })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Sample pitch in metres.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn is_square(&self) -> bool {
        self.nx == self.ny
    }

    /// Physical extent `(width, height)` of the window in metres.
    pub fn size(&self) -> (f64, f64) {
        (self.nx as f64 * self.delta, self.ny as f64 * self.delta)
    }

    /// `(row, col)` of the on-axis sample, where both coordinates are zero.
    pub fn origin_index(&self) -> (usize, usize) {
        (self.ny / 2, self.nx / 2)
    }

    fn coord(&self, idx: usize, n: usize) -> f64 {
        (idx as i64 - (n / 2) as i64) as f64 * self.delta
    }

    /// Horizontal coordinates as a `(1, nx)` row, ready to broadcast.
    pub fn x(&self) -> Array2<f64> {
        Array2::from_shape_fn((1, self.nx), |(_, j)| self.coord(j, self.nx))
    }

    /// Vertical coordinates as an `(ny, 1)` column, ready to broadcast.
    pub fn y(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.ny, 1), |(i, _)| self.coord(i, self.ny))
    }

    /// Squared radial distance `x^2 + y^2` at every sample, `(ny, nx)`.
    pub fn rho2(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.ny, self.nx), |(i, j)| {
            let x = self.coord(j, self.nx);
            let y = self.coord(i, self.ny);
            x * x + y * y
        })
    }

    /// Radial distance at every sample, `(ny, nx)`.
    pub fn rho(&self) -> Array2<f64> {
        self.rho2().mapv(f64::sqrt)
    }

    /// Reciprocal grid: square, `min(nx, ny)` points per axis, frequency
    /// pitch `1 / (min(nx, ny) * delta)` cycles per metre.
    pub fn reciprocal(&self) -> RectGrid {
        let n = self.nx.min(self.ny);
        RectGrid {
            nx: n,
            ny: n,
            delta: 1.0 / (n as f64 * self.delta),
        }
    }
}

/// Logarithmic radial partition of the frequency plane.
///
/// `points` frequencies are spaced evenly in `log f` between `f_min` and
/// `f_max` cycles per metre. Annulus `j` spans `(f_{j-1}, f_j]` with
/// `f_{-1} = 0`, so the partition tiles the whole disc of radius `f_max`
/// and the innermost annulus reaches down to (but excludes) zero
/// frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPolarGrid {
    points: usize,
    f_min: f64,
    f_max: f64,
}

impl LogPolarGrid {
    pub fn new(points: usize, f_min: f64, f_max: f64) -> Result<Self, ChannelError> {
        if points == 0 {
            return Err(ChannelError::Config(
                "log-polar grid needs at least one frequency point".into(),
            ));
        }
        if !(f_min.is_finite() && f_max.is_finite()) || f_min <= 0.0 || f_max <= f_min {
            return Err(ChannelError::Config(format!(
                "log-polar bounds must satisfy 0 < f_min < f_max, got [{f_min}, {f_max}]"
            )));
        }
        Ok(Self {
            points,
            f_min,
            f_max,
        })
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn f_min(&self) -> f64 {
        self.f_min
    }

    pub fn f_max(&self) -> f64 {
        self.f_max
    }

    /// Annulus boundary frequencies, log-spaced from `f_min` to `f_max`.
    pub fn base(&self) -> Vec<f64> {
        if self.points == 1 {
            return vec![self.f_min];
        }
        let lo = self.f_min.ln();
        let step = (self.f_max.ln() - lo) / (self.points - 1) as f64;
        (0..self.points)
            .map(|j| (lo + step * j as f64).exp())
            .collect()
    }

    /// Annulus bounds `(f_{j-1}, f_j]` with the innermost lower bound at 0.
    pub fn annuli(&self) -> Vec<(f64, f64)> {
        let base = self.base();
        let mut lo = 0.0;
        base.iter()
            .map(|&hi| {
                let pair = (lo, hi);
                lo = hi;
                pair
            })
            .collect()
    }

    /// One radius per annulus, distributed uniformly over the annulus
    /// area. The unit draw is taken from `(0, 1]` so a radius can reach
    /// the outer bound but never lands exactly on zero frequency.
    pub fn sample_rho(&self, rng: &mut StdRng) -> Vec<f64> {
        self.annuli()
            .iter()
            .map(|&(lo, hi)| {
                let u = 1.0 - rng.gen::<f64>();
                (lo * lo + u * (hi * hi - lo * lo)).sqrt()
            })
            .collect()
    }

    /// One azimuth per annulus, uniform over `[0, 2*pi)`.
    pub fn sample_theta(&self, rng: &mut StdRng) -> Vec<f64> {
        (0..self.points)
            .map(|_| 2.0 * std::f64::consts::PI * rng.gen::<f64>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn even_grid_coordinates_span_the_window() {
        let g = RectGrid::new(4, 0.5).unwrap();
        let x = g.x();
        assert_eq!(x.shape(), &[1, 4]);
        let vals: Vec<f64> = x.iter().copied().collect();
        assert_eq!(vals, vec![-1.0, -0.5, 0.0, 0.5]);
    }

    #[test]
    fn odd_grid_is_symmetric_about_the_axis() {
        let g = RectGrid::new(5, 1.0).unwrap();
        let vals: Vec<f64> = g.x().iter().copied().collect();
        assert_eq!(vals, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn origin_index_lands_on_zero() {
        for n in [4usize, 5, 8, 9] {
            let g = RectGrid::new(n, 0.31).unwrap();
            let (i0, j0) = g.origin_index();
            assert_eq!(g.x()[[0, j0]], 0.0);
            assert_eq!(g.y()[[i0, 0]], 0.0);
            assert_eq!(g.rho2()[[i0, j0]], 0.0);
        }
    }

    #[test]
    fn reciprocal_grid_spacing() {
        let g = RectGrid::rectangular(8, 6, 0.25).unwrap();
        let r = g.reciprocal();
        assert!(r.is_square());
        assert_eq!(r.nx(), 6);
        assert_relative_eq!(r.delta(), 1.0 / (6.0 * 0.25));
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        assert!(RectGrid::new(0, 1.0).is_err());
        assert!(RectGrid::new(8, 0.0).is_err());
        assert!(RectGrid::new(8, -1.0).is_err());
        assert!(RectGrid::new(8, f64::NAN).is_err());
    }

    #[test]
    fn log_polar_base_is_log_spaced() {
        let g = LogPolarGrid::new(5, 1e-2, 1e2).unwrap();
        let base = g.base();
        assert_eq!(base.len(), 5);
        assert_relative_eq!(base[0], 1e-2, max_relative = 1e-12);
        assert_relative_eq!(base[4], 1e2, max_relative = 1e-12);
        for w in base.windows(2) {
            assert_relative_eq!(w[1] / w[0], 10.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn annuli_tile_the_disc() {
        let g = LogPolarGrid::new(4, 0.5, 8.0).unwrap();
        let annuli = g.annuli();
        assert_eq!(annuli[0].0, 0.0);
        for w in annuli.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
        assert_relative_eq!(annuli[3].1, 8.0, max_relative = 1e-12);
    }

    #[test]
    fn sampled_radii_stay_inside_their_annulus_and_off_zero() {
        let g = LogPolarGrid::new(6, 1e-3, 1e3).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let rho = g.sample_rho(&mut rng);
            for (r, (lo, hi)) in rho.iter().zip(g.annuli()) {
                assert!(*r > lo || (lo == 0.0 && *r > 0.0));
                assert!(*r <= hi);
                assert!(*r > 0.0);
            }
        }
    }

    #[test]
    fn sampled_azimuths_cover_the_circle() {
        let g = LogPolarGrid::new(3, 1.0, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            for t in g.sample_theta(&mut rng) {
                assert!((0.0..2.0 * std::f64::consts::PI).contains(&t));
            }
        }
    }

    #[test]
    fn ill_formed_log_polar_bounds_are_rejected() {
        assert!(LogPolarGrid::new(0, 1.0, 2.0).is_err());
        assert!(LogPolarGrid::new(4, 0.0, 2.0).is_err());
        assert!(LogPolarGrid::new(4, 2.0, 2.0).is_err());
        assert!(LogPolarGrid::new(4, 3.0, 2.0).is_err());
    }
}
