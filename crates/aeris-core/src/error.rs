//! Error types for channel assembly and simulation.

use aeris_compute::ComputeError;
use thiserror::Error;

/// Errors raised while building or driving an optical channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A constructor received parameters that cannot describe a valid
    /// component. Raised eagerly, never deferred to run time.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A wind-driven screen was asked to generate before its spectral
    /// realisation was drawn for the current trial.
    #[error("Wind screen spectrum not seeded: call seed_spectrum() before generate()")]
    SpectrumNotSeeded,

    /// The spectral backend failed.
    #[error("Compute backend failure: {0}")]
    Compute(#[from] ComputeError),
}

/// Errors raised by closed-form theory evaluations.
///
/// Asymptotic expressions are only quoted inside their validity region;
/// evaluating one outside it is an error rather than a silently wrong
/// number.
#[derive(Debug, Error)]
pub enum TheoryError {
    /// The requested expression is not valid for the given parameters.
    #[error("Outside validity region: {0}")]
    OutsideValidity(String),

    /// Parameters are not physically meaningful (negative lengths, zero
    /// wavenumber and so on).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
