//! Input field generators.

use std::f64::consts::PI;
use std::fmt;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::grid::RectGrid;

/// Produces the transmitted field at the channel entrance.
pub trait Source: Send + Sync + fmt::Debug {
    /// Complex field sampled on [`Source::grid`], shaped `(ny, nx)`.
    fn output(&self) -> Array2<Complex64>;

    fn grid(&self) -> &RectGrid;

    /// Optical wavenumber `k = 2 pi / lambda` in rad/m.
    fn wavenumber(&self) -> f64;
}

/// Lowest-order Gaussian beam,
///
/// ```text
/// u(r) = sqrt(2/pi) / w0 exp(-(1/w0^2 + i k / (2 F0)) r^2),
/// ```
///
/// normalised to unit power. `F0` is the phase-front radius at the
/// waist; `f64::INFINITY` gives a collimated beam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianSource {
    grid: RectGrid,
    wavelength: f64,
    waist_radius: f64,
    focal_distance: f64,
}

impl GaussianSource {
    pub fn new(
        grid: RectGrid,
        wavelength: f64,
        waist_radius: f64,
        focal_distance: f64,
    ) -> Result<Self, ChannelError> {
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(ChannelError::Config(format!(
                "wavelength must be finite and positive, got {wavelength}"
            )));
        }
        if !waist_radius.is_finite() || waist_radius <= 0.0 {
            return Err(ChannelError::Config(format!(
                "waist radius must be finite and positive, got {waist_radius}"
            )));
        }
        if focal_distance.is_nan() || focal_distance == 0.0 {
            return Err(ChannelError::Config(
                "focal distance must be nonzero (infinite for a collimated beam)".into(),
            ));
        }
        Ok(Self {
            grid,
            wavelength,
            waist_radius,
            focal_distance,
        })
    }

    /// Collimated beam, `F0 = infinity`.
    pub fn collimated(
        grid: RectGrid,
        wavelength: f64,
        waist_radius: f64,
    ) -> Result<Self, ChannelError> {
        Self::new(grid, wavelength, waist_radius, f64::INFINITY)
    }

    pub fn waist_radius(&self) -> f64 {
        self.waist_radius
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Transmitter curvature parameter `Theta_0 = 1 - L / F0`.
    pub fn theta0(&self, distance: f64) -> f64 {
        1.0 - distance / self.focal_distance
    }

    /// Transmitter Fresnel ratio `Lambda_0 = 2 L / (k w0^2)`.
    pub fn lambda0(&self, distance: f64) -> f64 {
        2.0 * distance / (self.wavenumber() * self.waist_radius * self.waist_radius)
    }

    /// Receiver curvature parameter
    /// `Theta = Theta_0 / (Theta_0^2 + Lambda_0^2)`.
    pub fn theta(&self, distance: f64) -> f64 {
        let t0 = self.theta0(distance);
        let l0 = self.lambda0(distance);
        t0 / (t0 * t0 + l0 * l0)
    }

    /// Receiver Fresnel ratio
    /// `Lambda = Lambda_0 / (Theta_0^2 + Lambda_0^2)`.
    pub fn lambda(&self, distance: f64) -> f64 {
        let t0 = self.theta0(distance);
        let l0 = self.lambda0(distance);
        l0 / (t0 * t0 + l0 * l0)
    }

    /// Vacuum beam radius at `distance`,
    /// `w = w0 sqrt(Theta_0^2 + Lambda_0^2)`.
    pub fn beam_radius(&self, distance: f64) -> f64 {
        let t0 = self.theta0(distance);
        let l0 = self.lambda0(distance);
        self.waist_radius * (t0 * t0 + l0 * l0).sqrt()
    }
}

impl Source for GaussianSource {
    fn output(&self) -> Array2<Complex64> {
        let amplitude = (2.0 / PI).sqrt() / self.waist_radius;
        let real_decay = 1.0 / (self.waist_radius * self.waist_radius);
        let curvature = self.wavenumber() / (2.0 * self.focal_distance);
        let rho2 = self.grid.rho2();
        rho2.mapv(|r2| {
            amplitude * (-Complex64::new(real_decay, curvature) * r2).exp()
        })
    }

    fn grid(&self) -> &RectGrid {
        &self.grid
    }

    fn wavenumber(&self) -> f64 {
        2.0 * PI / self.wavelength
    }
}

/// Superposition of tilted plane waves,
///
/// ```text
/// u(r) = mean_j exp(-i (k sin(a_j) x - phi_j)),
/// ```
///
/// one term per `(angle, phase)` pair. Useful as an idealised flat-top
/// input and for interference checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneSource {
    grid: RectGrid,
    wavelength: f64,
    angles: Vec<f64>,
    phases: Vec<f64>,
}

impl PlaneSource {
    pub fn new(
        grid: RectGrid,
        wavelength: f64,
        angles: Vec<f64>,
        phases: Vec<f64>,
    ) -> Result<Self, ChannelError> {
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(ChannelError::Config(format!(
                "wavelength must be finite and positive, got {wavelength}"
            )));
        }
        if angles.is_empty() {
            return Err(ChannelError::Config(
                "plane source needs at least one component".into(),
            ));
        }
        if angles.len() != phases.len() {
            return Err(ChannelError::Config(format!(
                "angle and phase lists must match, got {} angles and {} phases",
                angles.len(),
                phases.len()
            )));
        }
        Ok(Self {
            grid,
            wavelength,
            angles,
            phases,
        })
    }

    /// Single on-axis plane wave of unit amplitude.
    pub fn uniform(grid: RectGrid, wavelength: f64) -> Result<Self, ChannelError> {
        Self::new(grid, wavelength, vec![0.0], vec![0.0])
    }
}

impl Source for PlaneSource {
    fn output(&self) -> Array2<Complex64> {
        let k = self.wavenumber();
        let x = self.grid.x();
        let (ny, nx) = (self.grid.ny(), self.grid.nx());
        let count = self.angles.len() as f64;
        let mut row = vec![Complex64::new(0.0, 0.0); nx];
        for (angle, phase) in self.angles.iter().zip(&self.phases) {
            for (j, slot) in row.iter_mut().enumerate() {
                *slot += Complex64::from_polar(1.0, -(k * angle.sin() * x[[0, j]] - phase));
            }
        }
        Array2::from_shape_fn((ny, nx), |(_, j)| row[j] / count)
    }

    fn grid(&self) -> &RectGrid {
        &self.grid
    }

    fn wavenumber(&self) -> f64 {
        2.0 * PI / self.wavelength
    }
}
