//! Spectral backend trait and device abstraction.
//!
//! The [`SpectralBackend`] trait abstracts over execution environments so
//! that the physics code in `aeris-core` remains device-agnostic. Only the
//! centered transform pair lives behind the trait; elementwise array math is
//! ordinary `ndarray` code on the caller's side.

use ndarray::Array2;
use num_complex::Complex64;
use thiserror::Error;

/// Errors originating from spectral backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Cannot transform an empty array")]
    EmptyArray,
}

/// Describes the capabilities of a spectral backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: Option<usize>,
}

/// Abstraction over spectral transform backends.
///
/// Both transforms are *centered*: the zero coordinate (and zero frequency)
/// sits at the array origin index rather than at element `[0, 0]`, matching
/// the convention
///
/// ```text
/// fft2(x, δ)   = fftshift(FFT2(fftshift(x))) · δ²
/// ifft2(X, δf) = ifftshift(IFFT2(ifftshift(X))) · (N·δf)²
/// ```
///
/// where `FFT2` is the unnormalized discrete transform, `IFFT2` its
/// `1/N²`-normalized inverse and `N` the row count. With `δf = 1/(N·δ)` the
/// pair is an exact inverse and approximates the continuous Fourier integral
/// on the sampled domain.
pub trait SpectralBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Centered forward transform with `δ²` integral normalization.
    fn fft2(&self, field: &Array2<Complex64>, delta: f64) -> Result<Array2<Complex64>, ComputeError>;

    /// Centered inverse transform with `(N·δf)²` integral normalization.
    fn ifft2(
        &self,
        spectrum: &Array2<Complex64>,
        delta_f: f64,
    ) -> Result<Array2<Complex64>, ComputeError>;
}

/// Cyclic shift moving the zero-frequency bin to the array center.
///
/// Equal to [`ifftshift2`] for even dimensions; the two differ by one sample
/// along odd dimensions.
pub fn fftshift2(a: &Array2<Complex64>) -> Array2<Complex64> {
    let (nr, nc) = a.dim();
    roll2(a, nr - nr / 2, nc - nc / 2)
}

/// Inverse of [`fftshift2`]: moves the centered zero bin back to the origin.
pub fn ifftshift2(a: &Array2<Complex64>) -> Array2<Complex64> {
    let (nr, nc) = a.dim();
    roll2(a, nr / 2, nc / 2)
}

fn roll2(a: &Array2<Complex64>, dr: usize, dc: usize) -> Array2<Complex64> {
    let (nr, nc) = a.dim();
    Array2::from_shape_fn((nr, nc), |(i, j)| a[((i + dr) % nr, (j + dc) % nc)])
}
