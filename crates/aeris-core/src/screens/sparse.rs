//! Sparse-spectrum phase screen synthesis.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::ChannelError;
use crate::grid::{LogPolarGrid, RectGrid};
use crate::screens::PhaseScreen;
use crate::turbulence::TurbulenceModel;

/// Plane-wave superposition screen generator.
///
/// Each annulus of a [`LogPolarGrid`] contributes one component
/// `w_j (g1 + i g2) exp(2 pi i f_j . r)` with the frequency drawn
/// area-uniformly inside the annulus and the weight fixed at
/// construction to the square root of the annulus' phase variance,
///
/// ```text
/// w_j^2 = integral of 2 pi kappa Phi_phi(kappa) dkappa over the annulus.
/// ```
///
/// The per-point variance of a screen is exactly `sum w_j^2` and every
/// component carries a strictly positive frequency, so no piston term
/// appears. As with the FFT generator, real and imaginary parts of one
/// synthesis serve two [`generate`](PhaseScreen::generate) calls.
///
/// No transform is involved, so rectangular grids are fine and cost
/// scales with `points * nx * ny`.
#[derive(Debug, Clone)]
pub struct SparseScreen {
    grid: RectGrid,
    fgrid: LogPolarGrid,
    model: Arc<dyn TurbulenceModel>,
    wavenumber: f64,
    thickness: f64,
    weights: Vec<f64>,
    pending: Option<Array2<f64>>,
}

impl SparseScreen {
    pub fn new(
        grid: RectGrid,
        fgrid: LogPolarGrid,
        model: Arc<dyn TurbulenceModel>,
        wavenumber: f64,
        thickness: f64,
    ) -> Result<Self, ChannelError> {
        if !wavenumber.is_finite() || wavenumber <= 0.0 {
            return Err(ChannelError::Config(format!(
                "wavenumber must be finite and positive, got {wavenumber}"
            )));
        }
        if !thickness.is_finite() || thickness < 0.0 {
            return Err(ChannelError::Config(format!(
                "slab thickness must be finite and non-negative, got {thickness}"
            )));
        }
        let weights = fgrid
            .annuli()
            .iter()
            .map(|&(lo, hi)| {
                model
                    .phase_band_variance(2.0 * PI * lo, 2.0 * PI * hi, wavenumber, thickness)
                    .sqrt()
            })
            .collect();
        Ok(Self {
            grid,
            fgrid,
            model,
            wavenumber,
            thickness,
            weights,
            pending: None,
        })
    }

    /// Annulus weights `w_j`; their squares partition the phase variance.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn synthesize(&self, rng: &mut StdRng) -> Array2<Complex64> {
        let rho = self.fgrid.sample_rho(rng);
        let theta = self.fgrid.sample_theta(rng);
        let p = self.fgrid.points();
        let cn: Vec<Complex64> = (0..p)
            .map(|j| {
                let g1: f64 = rng.sample(StandardNormal);
                let g2: f64 = rng.sample(StandardNormal);
                Complex64::new(g1, g2) * self.weights[j]
            })
            .collect();

        let x = self.grid.x();
        let y = self.grid.y();
        let (ny, nx) = (self.grid.ny(), self.grid.nx());
        let mut left = Array2::<Complex64>::zeros((ny, p));
        for i in 0..ny {
            for j in 0..p {
                let fy = rho[j] * theta[j].sin();
                left[[i, j]] =
                    cn[j] * Complex64::from_polar(1.0, 2.0 * PI * fy * y[[i, 0]]);
            }
        }
        let mut right = Array2::<Complex64>::zeros((p, nx));
        for j in 0..p {
            let fx = rho[j] * theta[j].cos();
            for k in 0..nx {
                right[[j, k]] = Complex64::from_polar(1.0, 2.0 * PI * fx * x[[0, k]]);
            }
        }
        left.dot(&right)
    }
}

impl PhaseScreen for SparseScreen {
    fn generate(&mut self, rng: &mut StdRng) -> Result<Array2<f64>, ChannelError> {
        if let Some(screen) = self.pending.take() {
            return Ok(screen);
        }
        let complex = self.synthesize(rng);
        let real = complex.mapv(|v| v.re);
        self.pending = Some(complex.mapv(|v| v.im));
        Ok(real)
    }

    fn reset_trial(&mut self, _rng: &mut StdRng) {
        self.pending = None;
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn model(&self) -> Arc<dyn TurbulenceModel> {
        Arc::clone(&self.model)
    }

    fn grid(&self) -> &RectGrid {
        &self.grid
    }
}
