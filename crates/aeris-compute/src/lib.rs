//! # Aeris Compute
//!
//! Spectral backend abstraction for the aeris framework. This crate provides
//! a [`SpectralBackend`](backend::SpectralBackend) trait that isolates the
//! propagation and phase-screen code from the concrete FFT implementation.
//!
//! The trait is narrow: a centered forward/inverse 2-D Fourier pair with
//! the grid-spacing normalization used by the angular-spectrum method. Everything else in the framework is plain elementwise array math
//! and stays backend-independent.

pub mod backend;
pub mod cpu;

pub use backend::{ComputeError, DeviceInfo, SpectralBackend};
pub use cpu::CpuBackend;
