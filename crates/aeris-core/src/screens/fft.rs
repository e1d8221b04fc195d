//! FFT phase screen synthesis with subharmonic augmentation.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use aeris_compute::SpectralBackend;
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::ChannelError;
use crate::grid::RectGrid;
use crate::screens::PhaseScreen;
use crate::turbulence::TurbulenceModel;

/// Filtered-white-noise screen generator.
///
/// Every reciprocal-grid bin receives an independent circular Gaussian
/// coefficient scaled by `sqrt(Phi_phi(2 pi f)) 2 pi delta_f`, the zero
/// frequency bin is cleared, and an inverse transform yields a complex
/// map whose real and imaginary parts are two independent screens with
/// the target spectrum. Each synthesis therefore serves two
/// [`generate`](PhaseScreen::generate) calls.
///
/// The FFT window cannot represent fluctuations larger than itself; each
/// subharmonic level adds a 3x3 block of coefficients at one third the
/// frequency pitch of the previous level, evaluated directly on the
/// spatial grid. Two or three levels are enough to recover the outer
/// scale statistics when `L0` exceeds the window.
#[derive(Clone)]
pub struct FftScreen {
    grid: RectGrid,
    model: Arc<dyn TurbulenceModel>,
    wavenumber: f64,
    thickness: f64,
    subharmonics: usize,
    backend: Arc<dyn SpectralBackend>,
    pending: Option<Array2<f64>>,
}

impl FftScreen {
    pub fn new(
        grid: RectGrid,
        model: Arc<dyn TurbulenceModel>,
        backend: Arc<dyn SpectralBackend>,
        wavenumber: f64,
        thickness: f64,
        subharmonics: usize,
    ) -> Result<Self, ChannelError> {
        if !grid.is_square() {
            return Err(ChannelError::Config(format!(
                "FFT screen synthesis requires a square grid, got {}x{}",
                grid.nx(),
                grid.ny()
            )));
        }
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
        Ok(Self {
            grid,
            model,
            wavenumber,
            thickness,
            subharmonics,
            backend,
            pending: None,
        })
    }

    fn synthesize(&self, rng: &mut StdRng) -> Result<Array2<Complex64>, ChannelError> {
        let recip = self.grid.reciprocal();
        let n = recip.nx();
        let df = recip.delta();
        let fx = recip.x();
        let fy = recip.y();

        let mut cn = Array2::<Complex64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                let g1: f64 = rng.sample(StandardNormal);
                let g2: f64 = rng.sample(StandardNormal);
                let f = (fx[[0, j]] * fx[[0, j]] + fy[[i, 0]] * fy[[i, 0]]).sqrt();
                let amp = self
                    .model
                    .psd_phi_f(f, self.wavenumber, self.thickness)
                    .sqrt()
                    * 2.0
                    * PI
                    * df;
                cn[[i, j]] = Complex64::new(g1, g2) * amp;
            }
        }
        let (oi, oj) = recip.origin_index();
        cn[[oi, oj]] = Complex64::new(0.0, 0.0);

        // A unit frequency pitch makes the inverse transform a plain sum
        // over the coefficient bins.
        let mut screen = self.backend.ifft2(&cn, 1.0)?;

        if self.subharmonics > 0 {
            let x = self.grid.x();
            let y = self.grid.y();
            let (ny, nx) = (self.grid.ny(), self.grid.nx());
            for level in 1..=self.subharmonics {
                let dfp = df / 3f64.powi(level as i32);
                for i in 0..3usize {
                    for j in 0..3usize {
                        if i == 1 && j == 1 {
                            continue;
                        }
                        let fy_c = (i as f64 - 1.0) * dfp;
                        let fx_c = (j as f64 - 1.0) * dfp;
                        let g1: f64 = rng.sample(StandardNormal);
                        let g2: f64 = rng.sample(StandardNormal);
                        let f = (fx_c * fx_c + fy_c * fy_c).sqrt();
                        let amp = self
                            .model
                            .psd_phi_f(f, self.wavenumber, self.thickness)
                            .sqrt()
                            * 2.0
                            * PI
                            * dfp;
                        let c = Complex64::new(g1, g2) * amp;
                        let col_phase: Vec<Complex64> = (0..nx)
                            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * fx_c * x[[0, k]]))
                            .collect();
                        let row_phase: Vec<Complex64> = (0..ny)
                            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * fy_c * y[[k, 0]]))
                            .collect();
                        for (ii, rp) in row_phase.iter().enumerate() {
                            for (jj, cp) in col_phase.iter().enumerate() {
                                screen[[ii, jj]] += c * rp * cp;
                            }
                        }
                    }
                }
            }
        }

        let mean = screen.iter().sum::<Complex64>() / screen.len() as f64;
        screen.mapv_inplace(|v| v - mean);
        Ok(screen)
    }
}

impl PhaseScreen for FftScreen {
    fn generate(&mut self, rng: &mut StdRng) -> Result<Array2<f64>, ChannelError> {
        if let Some(screen) = self.pending.take() {
            return Ok(screen);
        }
        let complex = self.synthesize(rng)?;
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

impl fmt::Debug for FftScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftScreen")
            .field("grid", &self.grid)
            .field("thickness", &self.thickness)
            .field("subharmonics", &self.subharmonics)
            .finish_non_exhaustive()
    }
}
