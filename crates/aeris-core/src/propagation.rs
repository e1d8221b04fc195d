//! Angular-spectrum vacuum propagation.
//!
//! A field sampled on a square [`RectGrid`] advances a distance `d` by
//! multiplying its spectrum with the Fresnel transfer function,
//!
//! ```text
//! u'(r) = ifft2[ exp(i k d) exp(-i pi d lambda f^2) fft2[u](f) ],
//! ```
//!
//! where `f` runs over the reciprocal grid in cycles per metre. The
//! transfer function is unimodular, so the discrete energy
//! `sum |u|^2 delta^2` is conserved exactly. A zero distance returns the
//! field unchanged, and a negative distance applies the conjugate
//! transfer, undoing a forward step of the same length.

use std::f64::consts::PI;

use aeris_compute::SpectralBackend;
use ndarray::Array2;
use num_complex::Complex64;

use crate::error::ChannelError;
use crate::grid::RectGrid;

/// Propagate `field` through `distance` metres of vacuum.
///
/// The grid must be square and match the field's shape; the spectral
/// method wraps at the window edges, so callers choose windows with
/// enough guard band for their beams.
pub fn propagate(
    backend: &dyn SpectralBackend,
    field: &Array2<Complex64>,
    grid: &RectGrid,
    wavenumber: f64,
    distance: f64,
) -> Result<Array2<Complex64>, ChannelError> {
    if !grid.is_square() {
        return Err(ChannelError::Config(format!(
            "propagation requires a square grid, got {}x{}",
            grid.nx(),
            grid.ny()
        )));
    }
    if field.dim() != (grid.ny(), grid.nx()) {
        return Err(ChannelError::Config(format!(
            "field shape {:?} does not match the {}x{} grid",
            field.dim(),
            grid.ny(),
            grid.nx()
        )));
    }
    if !wavenumber.is_finite() || wavenumber <= 0.0 {
        return Err(ChannelError::Config(format!(
            "wavenumber must be finite and positive, got {wavenumber}"
        )));
    }
    if !distance.is_finite() {
        return Err(ChannelError::Config("propagation distance must be finite".into()));
    }
    if distance == 0.0 {
        return Ok(field.clone());
    }

    let recip = grid.reciprocal();
    let fx = recip.x();
    let fy = recip.y();
    let lambda = 2.0 * PI / wavenumber;
    let axial = Complex64::from_polar(1.0, wavenumber * distance);

    let mut spectrum = backend.fft2(field, grid.delta())?;
    for ((i, j), s) in spectrum.indexed_iter_mut() {
        let f2 = fx[[0, j]] * fx[[0, j]] + fy[[i, 0]] * fy[[i, 0]];
        *s *= axial * Complex64::from_polar(1.0, -PI * distance * lambda * f2);
    }
    backend.ifft2(&spectrum, recip.delta()).map_err(ChannelError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_compute::CpuBackend;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const WAVENUMBER: f64 = 2.0 * PI / 808e-9;

    fn random_field(n: usize, seed: u64) -> Array2<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((n, n), |_| {
            Complex64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5)
        })
    }

    fn energy(field: &Array2<Complex64>, delta: f64) -> f64 {
        field.iter().map(|v| v.norm_sqr()).sum::<f64>() * delta * delta
    }

    #[test]
    fn zero_distance_is_the_identity() {
        let backend = CpuBackend::new();
        let grid = RectGrid::new(16, 1e-3).unwrap();
        let field = random_field(16, 3);
        let out = propagate(&backend, &field, &grid, WAVENUMBER, 0.0).unwrap();
        assert_eq!(out, field);
    }

    #[test]
    fn energy_is_conserved() {
        let backend = CpuBackend::new();
        let grid = RectGrid::new(32, 2e-3).unwrap();
        let field = random_field(32, 11);
        let out = propagate(&backend, &field, &grid, WAVENUMBER, 750.0).unwrap();
        assert_relative_eq!(
            energy(&out, grid.delta()),
            energy(&field, grid.delta()),
            max_relative = 1e-12,
        );
    }

    #[test]
    fn negative_distance_undoes_a_forward_step() {
        let backend = CpuBackend::new();
        let grid = RectGrid::new(32, 1.5e-3).unwrap();
        let field = random_field(32, 29);
        let there = propagate(&backend, &field, &grid, WAVENUMBER, 420.0).unwrap();
        let back = propagate(&backend, &there, &grid, WAVENUMBER, -420.0).unwrap();
        for (a, b) in back.iter().zip(field.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-10);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn rectangular_grids_are_rejected() {
        let backend = CpuBackend::new();
        let grid = RectGrid::rectangular(16, 8, 1e-3).unwrap();
        let field = Array2::zeros((8, 16));
        assert!(propagate(&backend, &field, &grid, WAVENUMBER, 10.0).is_err());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let backend = CpuBackend::new();
        let grid = RectGrid::new(16, 1e-3).unwrap();
        let field = Array2::zeros((8, 8));
        assert!(propagate(&backend, &field, &grid, WAVENUMBER, 10.0).is_err());
    }
}
