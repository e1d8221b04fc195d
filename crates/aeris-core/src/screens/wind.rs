//! Wind-translated phase screens for time-resolved runs.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{s, Array2};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::ChannelError;
use crate::grid::{LogPolarGrid, RectGrid};
use crate::screens::PhaseScreen;
use crate::turbulence::TurbulenceModel;

/// One frozen sparse spectrum, prepared for repeated evaluation.
///
/// The row-phase factors and component coefficients are folded into a
/// single `(ny, points)` matrix at seeding time; evaluating the screen at
/// any offset is then one matrix product against offset-dependent column
/// phases.
#[derive(Debug, Clone)]
struct WindSpectrum {
    left: Array2<Complex64>,
    fx: Vec<f64>,
}

#[derive(Debug, Clone)]
struct WindCache {
    offset: f64,
    screen: Array2<f64>,
}

/// Frozen-flow screen generator.
///
/// Under Taylor's hypothesis a turbulent layer rides the wind without
/// evolving, so a time series of screens is one spatial realisation
/// sampled at a drifting horizontal offset. [`seed_spectrum`] draws the
/// realisation, made of sparse components exactly as in
/// [`SparseScreen`](crate::screens::SparseScreen); each
/// [`generate`](PhaseScreen::generate) call then evaluates it at
/// `offset = iteration * speed` and advances the iteration clock.
/// Generating without a seeded spectrum is an error, never an implicit
/// reseed.
///
/// When consecutive offsets differ by a whole number of grid columns the
/// previous screen is reused: surviving columns shift left and only the
/// freshly exposed ones are evaluated. The splice can be disabled with
/// [`without_spatial_cache`](WindScreen::without_spatial_cache) to check
/// it against direct evaluation.
#[derive(Debug, Clone)]
pub struct WindScreen {
    grid: RectGrid,
    fgrid: LogPolarGrid,
    model: Arc<dyn TurbulenceModel>,
    wavenumber: f64,
    thickness: f64,
    speed: f64,
    weights: Vec<f64>,
    spectrum: Option<WindSpectrum>,
    iteration: u64,
    cache: Option<WindCache>,
    spatial_cache: bool,
}

impl WindScreen {
    /// `speed` is the frozen-flow drift in metres per generated screen.
    pub fn new(
        grid: RectGrid,
        fgrid: LogPolarGrid,
        model: Arc<dyn TurbulenceModel>,
        wavenumber: f64,
        thickness: f64,
        speed: f64,
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
        if !speed.is_finite() {
            return Err(ChannelError::Config(format!(
                "wind speed must be finite, got {speed}"
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
            speed,
            weights,
            spectrum: None,
            iteration: 0,
            cache: None,
            spatial_cache: true,
        })
    }

    /// Disable the column splice; every screen is evaluated in full.
    pub fn without_spatial_cache(mut self) -> Self {
        self.spatial_cache = false;
        self
    }

    /// Draw the spatial realisation for a trial and rewind the iteration
    /// clock.
    pub fn seed_spectrum(&mut self, rng: &mut StdRng) {
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
        let y = self.grid.y();
        let ny = self.grid.ny();
        let mut left = Array2::<Complex64>::zeros((ny, p));
        for i in 0..ny {
            for j in 0..p {
                let fy = rho[j] * theta[j].sin();
                left[[i, j]] =
                    cn[j] * Complex64::from_polar(1.0, 2.0 * PI * fy * y[[i, 0]]);
            }
        }
        let fx = rho
            .iter()
            .zip(&theta)
            .map(|(r, t)| r * t.cos())
            .collect();
        self.spectrum = Some(WindSpectrum { left, fx });
        self.iteration = 0;
        self.cache = None;
    }

    /// Drop the seeded spectrum and every cached screen.
    pub fn clear_cache(&mut self) {
        self.spectrum = None;
        self.cache = None;
        self.iteration = 0;
    }

    /// Screens generated since the spectrum was seeded.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    fn columns(
        &self,
        spectrum: &WindSpectrum,
        offset: f64,
        range: std::ops::Range<usize>,
    ) -> Array2<f64> {
        let x = self.grid.x();
        let p = self.fgrid.points();
        let m = range.len();
        let mut right = Array2::<Complex64>::zeros((p, m));
        for j in 0..p {
            for (slot, k) in range.clone().enumerate() {
                right[[j, slot]] = Complex64::from_polar(
                    1.0,
                    2.0 * PI * spectrum.fx[j] * (x[[0, k]] + offset),
                );
            }
        }
        spectrum.left.dot(&right).mapv(|v| v.re)
    }

    fn evaluate(&self, spectrum: &WindSpectrum, offset: f64) -> Array2<f64> {
        let nx = self.grid.nx();
        if self.spatial_cache {
            if let Some(cache) = &self.cache {
                let delta = offset - cache.offset;
                let pitch = self.grid.delta();
                let steps = (delta / pitch).round();
                let aligned = (steps * pitch - delta).abs() < 1e-9 * delta.abs().max(1.0);
                if aligned && steps >= 0.0 && (steps as usize) < nx {
                    let m = steps as usize;
                    if m == 0 {
                        return cache.screen.clone();
                    }
                    let mut screen = Array2::<f64>::zeros((self.grid.ny(), nx));
                    screen
                        .slice_mut(s![.., ..nx - m])
                        .assign(&cache.screen.slice(s![.., m..]));
                    let fresh = self.columns(spectrum, offset, nx - m..nx);
                    screen.slice_mut(s![.., nx - m..]).assign(&fresh);
                    return screen;
                }
            }
        }
        self.columns(spectrum, offset, 0..nx)
    }
}

impl PhaseScreen for WindScreen {
    fn generate(&mut self, _rng: &mut StdRng) -> Result<Array2<f64>, ChannelError> {
        let spectrum = self
            .spectrum
            .as_ref()
            .ok_or(ChannelError::SpectrumNotSeeded)?;
        let offset = self.iteration as f64 * self.speed;
        let screen = self.evaluate(spectrum, offset);
        if self.spatial_cache {
            self.cache = Some(WindCache {
                offset,
                screen: screen.clone(),
            });
        }
        self.iteration += 1;
        Ok(screen)
    }

    fn reset_trial(&mut self, rng: &mut StdRng) {
        self.seed_spectrum(rng);
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
