//! Turbulent phase screen synthesis.
//!
//! A phase screen collapses the refractive-index fluctuations of a slab
//! of atmosphere into a single real phase map applied between vacuum
//! propagation steps. Three generators are provided, trading spectral
//! fidelity against cost:
//!
//! - [`FftScreen`]: filtered white noise on the full reciprocal grid,
//!   optionally augmented with subharmonic levels that restore the
//!   low-frequency power an FFT window cannot carry.
//! - [`SparseScreen`]: a few hundred plane-wave components sampled from a
//!   log-polar partition of the frequency plane, weighted so each annulus
//!   carries exactly its share of the phase variance.
//! - [`WindScreen`]: a sparse spectrum frozen for a whole trial and
//!   translated across the aperture between generations, for time-resolved
//!   runs under Taylor's hypothesis.
//!
//! Generators draw all randomness from a caller-owned [`StdRng`], so a
//! run is reproducible from its seed alone.

mod fft;
mod sparse;
mod wind;

pub use fft::FftScreen;
pub use sparse::SparseScreen;
pub use wind::WindScreen;

use std::sync::Arc;

use ndarray::Array2;
use rand::rngs::StdRng;

use crate::error::ChannelError;
use crate::grid::RectGrid;
use crate::turbulence::TurbulenceModel;

/// A source of random phase maps for one turbulent slab.
pub trait PhaseScreen: Send {
    /// Draw the next phase map in radians, shaped `(ny, nx)` on
    /// [`PhaseScreen::grid`].
    fn generate(&mut self, rng: &mut StdRng) -> Result<Array2<f64>, ChannelError>;

    /// Start a fresh statistical trial: drop cached state and redraw
    /// whatever the generator holds fixed within a trial.
    fn reset_trial(&mut self, _rng: &mut StdRng) {}

    /// Slab thickness `dz` in metres that the screen statistics integrate
    /// over.
    fn thickness(&self) -> f64;

    /// The turbulence spectrum behind the screen statistics.
    fn model(&self) -> Arc<dyn TurbulenceModel>;

    /// Spatial grid the generated maps are sampled on.
    fn grid(&self) -> &RectGrid;
}
