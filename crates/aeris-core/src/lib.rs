//! Split-step simulation of optical beams in atmospheric turbulence.
//!
//! A beam leaves a [`source::Source`], crosses a [`path::TurbulentPath`]
//! that alternates angular-spectrum vacuum hops with random phase
//! screens, and lands on an optional [`pupil::Pupil`]. The pieces are
//! assembled into a [`channel::Channel`], driven either in one shot or
//! step by step for access to intermediate fields.
//!
//! Modules:
//!
//! - [`grid`]: Cartesian sampling windows and the log-polar frequency
//!   partition.
//! - [`turbulence`]: refractive-index spectra and derived phase
//!   statistics.
//! - [`propagation`]: the angular-spectrum vacuum step.
//! - [`screens`]: FFT, sparse-spectrum and wind-driven phase screen
//!   generators.
//! - [`source`], [`pupil`], [`path`], [`channel`]: the channel parts.
//! - [`theory`]: closed-form link statistics for validation.
//! - [`error`]: error taxonomy.
//!
//! All spectral transforms go through an
//! [`aeris_compute::SpectralBackend`], shared across components by
//! `Arc`.

pub mod channel;
pub mod error;
pub mod grid;
pub mod path;
pub mod propagation;
pub mod pupil;
pub mod screens;
pub mod source;
pub mod theory;
pub mod turbulence;

pub use channel::Channel;
pub use error::{ChannelError, TheoryError};
pub use grid::{LogPolarGrid, RectGrid};
pub use path::{PathStep, PathStepper, SlabPlacement, TurbulentPath};
pub use propagation::propagate;
pub use pupil::{CirclePupil, Pupil};
pub use screens::{FftScreen, PhaseScreen, SparseScreen, WindScreen};
pub use source::{GaussianSource, PlaneSource, Source};
pub use turbulence::{Kolmogorov, ModifiedVonKarman, Tatarskii, TurbulenceModel};
