//! Error types for the measurement engine.

use std::path::PathBuf;

use aeris_core::ChannelError;
use thiserror::Error;

/// Errors raised while declaring measures, driving trials or persisting
/// their buffers.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A measure or run declaration that can never produce valid
    /// records. Raised eagerly, never deferred to the trial loop.
    #[error("Invalid measurement configuration: {0}")]
    Config(String),

    /// The channel failed while a trial was being driven. The trial is
    /// discarded; no partial records reach any buffer.
    #[error("Channel failure during a trial: {0}")]
    Channel(#[from] ChannelError),

    /// An aggregate was requested over records that cannot support it.
    #[error("Results aggregation failed: {0}")]
    Aggregation(String),

    /// Reading or writing a results file failed at the I/O layer.
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A results file exists but its cells cannot be parsed back into
    /// records.
    #[error("Malformed results file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}
