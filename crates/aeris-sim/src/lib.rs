//! Trial-driving measurement engine for atmospheric optical channels.
//!
//! An [`aeris_core::Channel`] yields one random field realization per
//! traversal; statistics take thousands. This crate runs those trials:
//! [`Measure`]s declare what to extract (a stage of the pipeline and a
//! typed chain of operations), a [`Simulation`] drives the channel and
//! commits one record per measure per trial, and [`results`] reduces
//! the accumulated buffers to published link statistics.
//!
//! Modules:
//!
//! - [`measure`]: staged extraction chains and their record buffers.
//! - [`simulation`]: the trial loop with dedup, time-series passes,
//!   interrupts and checkpointing.
//! - [`results`]: scintillation, wandering, width and correlation
//!   statistics over the buffers.
//! - [`persist`]: CSV checkpoints, written incrementally and reloadable
//!   to resume a run.
//! - [`error`]: error taxonomy.

pub mod error;
pub mod measure;
pub mod persist;
pub mod results;
pub mod simulation;

pub use error::SimulationError;
pub use measure::{Measure, Op, Record, Stage};
pub use results::WidthEstimate;
pub use simulation::{RunOptions, RunSummary, Simulation};
