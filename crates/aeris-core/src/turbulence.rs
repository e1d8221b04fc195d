//! Refractive-index turbulence spectra.
//!
//! A [`TurbulenceModel`] supplies the 3D refractive-index power spectrum
//! `Phi_n(kappa)` together with the quantities the screen generators and
//! the theory layer derive from it: the phase spectrum of a slab,
//!
//! ```text
//! Phi_phi(kappa) = 2 pi k^2 dz Phi_n(kappa),
//! ```
//!
//! band-limited phase variance for sparse-spectrum sampling, and the phase
//! structure function `D_phi(r)`. The structure function has a generic
//! quadrature fallback; models with a published closed form override it.
//!
//! Three spectra are provided: [`ModifiedVonKarman`] (inner and outer
//! scale rolloffs, closed-form structure function), banded [`Kolmogorov`]
//! and [`Tatarskii`].

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Points for the structure-function quadrature.
const SF_QUAD_POINTS: usize = 4096;
/// Points for band-variance quadrature.
const BAND_QUAD_POINTS: usize = 512;

/// Trapezoid rule on a log-spaced abscissa over `[lo, hi]`.
fn log_trapezoid(lo: f64, hi: f64, points: usize, f: impl Fn(f64) -> f64) -> f64 {
    debug_assert!(lo > 0.0 && hi > lo && points >= 2);
    let ln_lo = lo.ln();
    let step = (hi.ln() - ln_lo) / (points - 1) as f64;
    let mut acc = 0.0;
    let mut x_prev = lo;
    let mut g_prev = f(lo);
    for i in 1..points {
        let x = (ln_lo + step * i as f64).exp();
        let g = f(x);
        acc += 0.5 * (g_prev + g) * (x - x_prev);
        x_prev = x;
        g_prev = g;
    }
    acc
}

/// A 3D spectrum of refractive-index fluctuations and the phase statistics
/// it induces on a propagated slab.
///
/// `kappa` is angular spatial frequency in rad/m throughout; `wavenumber`
/// is the optical `k = 2 pi / lambda` and `thickness` the slab depth `dz`
/// in metres.
pub trait TurbulenceModel: Send + Sync + fmt::Debug {
    /// Structure parameter `Cn^2` in m^(-2/3).
    fn cn2(&self) -> f64;

    /// Inner scale `l0` in metres.
    fn inner_scale(&self) -> f64;

    /// Outer scale `L0` in metres.
    fn outer_scale(&self) -> f64;

    /// Refractive-index power spectrum `Phi_n(kappa)`.
    fn psd_n(&self, kappa: f64) -> f64;

    /// Frequency above which the spectrum carries negligible power;
    /// upper bound for numerical quadratures.
    fn kappa_cutoff(&self) -> f64;

    /// Phase power spectrum of a slab: `2 pi k^2 dz Phi_n(kappa)`.
    fn psd_phi(&self, kappa: f64, wavenumber: f64, thickness: f64) -> f64 {
        2.0 * PI * wavenumber * wavenumber * thickness * self.psd_n(kappa)
    }

    /// Phase power spectrum against cyclic frequency `f` in cycles/m,
    /// `Phi_phi(2 pi f)`.
    fn psd_phi_f(&self, f: f64, wavenumber: f64, thickness: f64) -> f64 {
        self.psd_phi(2.0 * PI * f, wavenumber, thickness)
    }

    /// Phase variance contributed by the annulus `kappa_lo < kappa <= kappa_hi`:
    ///
    /// ```text
    /// integral of 2 pi kappa Phi_phi(kappa) dkappa
    /// ```
    ///
    /// A `kappa_lo` of zero is clamped to a negligible positive bound; the
    /// integrand vanishes at the origin.
    fn phase_band_variance(
        &self,
        kappa_lo: f64,
        kappa_hi: f64,
        wavenumber: f64,
        thickness: f64,
    ) -> f64 {
        let lo = kappa_lo.max(kappa_hi * 1e-8);
        log_trapezoid(lo, kappa_hi, BAND_QUAD_POINTS, |kappa| {
            2.0 * PI * kappa * self.psd_phi(kappa, wavenumber, thickness)
        })
    }

    /// Phase structure function by quadrature:
    ///
    /// ```text
    /// D_phi(r) = 4 pi integral of kappa Phi_phi(kappa) (1 - J0(kappa r)) dkappa
    /// ```
    fn sf_phi_numeric(&self, r: f64, wavenumber: f64, thickness: f64) -> f64 {
        let hi = self.kappa_cutoff();
        let lo = 1e-2 * 2.0 * PI / self.outer_scale();
        4.0 * PI
            * log_trapezoid(lo, hi, SF_QUAD_POINTS, |kappa| {
                kappa
                    * self.psd_phi(kappa, wavenumber, thickness)
                    * (1.0 - libm::j0(kappa * r))
            })
    }

    /// Phase structure function `D_phi(r)`. Defaults to the quadrature;
    /// models with a closed form override it.
    fn sf_phi(&self, r: f64, wavenumber: f64, thickness: f64) -> f64 {
        self.sf_phi_numeric(r, wavenumber, thickness)
    }
}

fn validate_scales(cn2: f64, inner_scale: f64, outer_scale: f64) -> Result<(), ChannelError> {
    if !cn2.is_finite() || cn2 <= 0.0 {
        return Err(ChannelError::Config(format!(
            "Cn2 must be finite and positive, got {cn2}"
        )));
    }
    if !inner_scale.is_finite() || inner_scale <= 0.0 {
        return Err(ChannelError::Config(format!(
            "inner scale must be finite and positive, got {inner_scale}"
        )));
    }
    if !outer_scale.is_finite() || outer_scale <= inner_scale {
        return Err(ChannelError::Config(format!(
            "outer scale must exceed the inner scale, got l0={inner_scale}, L0={outer_scale}"
        )));
    }
    Ok(())
}

/// Modified von Karman spectrum,
///
/// ```text
/// Phi_n(kappa) = 0.033 Cn^2 exp(-(kappa/km)^2) / (kappa^2 + k0^2)^(11/6)
/// ```
///
/// with `km = 5.92 / l0` and `k0 = 2 pi / L0`. Finite at the origin and
/// Gaussian-damped past the inner scale, so every moment the generators
/// need converges without band limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModifiedVonKarman {
    cn2: f64,
    inner_scale: f64,
    outer_scale: f64,
}

impl ModifiedVonKarman {
    pub fn new(cn2: f64, inner_scale: f64, outer_scale: f64) -> Result<Self, ChannelError> {
        validate_scales(cn2, inner_scale, outer_scale)?;
        Ok(Self {
            cn2,
            inner_scale,
            outer_scale,
        })
    }

    fn km(&self) -> f64 {
        5.92 / self.inner_scale
    }

    fn k0(&self) -> f64 {
        2.0 * PI / self.outer_scale
    }
}

impl TurbulenceModel for ModifiedVonKarman {
    fn cn2(&self) -> f64 {
        self.cn2
    }

    fn inner_scale(&self) -> f64 {
        self.inner_scale
    }

    fn outer_scale(&self) -> f64 {
        self.outer_scale
    }

    fn psd_n(&self, kappa: f64) -> f64 {
        let km = self.km();
        let k0 = self.k0();
        0.033 * self.cn2 * (-(kappa / km).powi(2)).exp()
            / (kappa * kappa + k0 * k0).powf(11.0 / 6.0)
    }

    fn kappa_cutoff(&self) -> f64 {
        5.0 * self.km()
    }

    /// Closed-form structure function (Andrews' interpolation),
    ///
    /// ```text
    /// D_phi(r) = 7.75 r0^(-5/3) l0^(-1/3) r^2
    ///            [ (1 + 2.03 r^2/l0^2)^(-1/6) - 0.72 (k0 l0)^(1/3) ]
    /// ```
    ///
    /// with the slab coherence radius `r0 = (0.423 k^2 Cn^2 dz)^(-3/5)`.
    fn sf_phi(&self, r: f64, wavenumber: f64, thickness: f64) -> f64 {
        let r0 = (0.423 * wavenumber * wavenumber * self.cn2 * thickness).powf(-3.0 / 5.0);
        let l0 = self.inner_scale;
        7.75 * r0.powf(-5.0 / 3.0) * l0.powf(-1.0 / 3.0) * r * r
            * ((1.0 + 2.03 * r * r / (l0 * l0)).powf(-1.0 / 6.0)
                - 0.72 * (self.k0() * l0).powf(1.0 / 3.0))
    }
}

/// Band-limited Kolmogorov spectrum,
///
/// ```text
/// Phi_n(kappa) = 0.033 Cn^2 kappa^(-11/3)    for 1/L0 <= kappa < 1/l0
/// ```
///
/// and zero outside the inertial band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kolmogorov {
    cn2: f64,
    inner_scale: f64,
    outer_scale: f64,
}

impl Kolmogorov {
    pub fn new(cn2: f64, inner_scale: f64, outer_scale: f64) -> Result<Self, ChannelError> {
        validate_scales(cn2, inner_scale, outer_scale)?;
        Ok(Self {
            cn2,
            inner_scale,
            outer_scale,
        })
    }
}

impl TurbulenceModel for Kolmogorov {
    fn cn2(&self) -> f64 {
        self.cn2
    }

    fn inner_scale(&self) -> f64 {
        self.inner_scale
    }

    fn outer_scale(&self) -> f64 {
        self.outer_scale
    }

    fn psd_n(&self, kappa: f64) -> f64 {
        if kappa >= 1.0 / self.outer_scale && kappa < 1.0 / self.inner_scale {
            0.033 * self.cn2 * kappa.powf(-11.0 / 3.0)
        } else {
            0.0
        }
    }

    fn kappa_cutoff(&self) -> f64 {
        1.0 / self.inner_scale
    }
}

/// Tatarskii spectrum: Kolmogorov power law with a Gaussian inner-scale
/// rolloff at `km = 5.92 / l0`, truncated below `1/L0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tatarskii {
    cn2: f64,
    inner_scale: f64,
    outer_scale: f64,
}

impl Tatarskii {
    pub fn new(cn2: f64, inner_scale: f64, outer_scale: f64) -> Result<Self, ChannelError> {
        validate_scales(cn2, inner_scale, outer_scale)?;
        Ok(Self {
            cn2,
            inner_scale,
            outer_scale,
        })
    }
}

impl TurbulenceModel for Tatarskii {
    fn cn2(&self) -> f64 {
        self.cn2
    }

    fn inner_scale(&self) -> f64 {
        self.inner_scale
    }

    fn outer_scale(&self) -> f64 {
        self.outer_scale
    }

    fn psd_n(&self, kappa: f64) -> f64 {
        if kappa >= 1.0 / self.outer_scale {
            let km = 5.92 / self.inner_scale;
            0.033 * self.cn2 * (-(kappa / km).powi(2)).exp() * kappa.powf(-11.0 / 3.0)
        } else {
            0.0
        }
    }

    fn kappa_cutoff(&self) -> f64 {
        5.0 * 5.92 / self.inner_scale
    }
}
