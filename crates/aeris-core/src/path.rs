//! Turbulent propagation paths.
//!
//! A path is an ordered set of phase screens at fixed positions along a
//! link of total length `L`, plus a total extinction budget. Driving a
//! field through the path alternates vacuum propagation and screen
//! application:
//!
//! - segment `i` propagates from the previous slab (or the transmitter)
//!   to `positions[i]`, applies screen `i` as `exp(-i phi)`, and
//! - a final segment propagates from the last slab to the receiver.
//!
//! Extinction is split across segments in proportion to their share of
//! the path, `10^(-loss_db (d_i / L) / 20)` in amplitude per segment, so
//! the product over a full traversal is exactly the configured total and
//! no segmentation choice changes the delivered power.

use std::fmt;
use std::sync::Arc;

use aeris_compute::SpectralBackend;
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::grid::RectGrid;
use crate::propagation::propagate;
use crate::screens::PhaseScreen;
use crate::turbulence::TurbulenceModel;

/// Where [`TurbulentPath::identical`] places each slab within its
/// segment of the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlabPlacement {
    /// Slab at the start of its segment; the first sits at the
    /// transmitter.
    Before,
    /// Slab at the midpoint of its segment.
    Middle,
    /// Slab at the end of its segment; the last sits at the receiver.
    After,
}

/// One completed step of a path traversal.
#[derive(Debug, Clone)]
pub struct PathStep {
    /// Slab index, or the screen count for the final vacuum step.
    pub index: usize,
    /// Absolute position along the path after this step, in metres.
    pub position: f64,
    /// The phase map applied in this step; `None` for the final step.
    pub screen: Option<Array2<f64>>,
}

/// Ordered phase screens along a link.
pub struct TurbulentPath {
    screens: Vec<Box<dyn PhaseScreen>>,
    positions: Vec<f64>,
    length: f64,
    total_loss_db: f64,
}

impl TurbulentPath {
    /// `positions` must be strictly increasing within `[0, length]` and
    /// matched one-to-one with `screens`, all sampled on the same grid.
    pub fn new(
        screens: Vec<Box<dyn PhaseScreen>>,
        positions: Vec<f64>,
        length: f64,
        total_loss_db: f64,
    ) -> Result<Self, ChannelError> {
        if screens.is_empty() {
            return Err(ChannelError::Config(
                "a path needs at least one phase screen".into(),
            ));
        }
        if screens.len() != positions.len() {
            return Err(ChannelError::Config(format!(
                "{} screens but {} positions",
                screens.len(),
                positions.len()
            )));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(ChannelError::Config(format!(
                "path length must be finite and positive, got {length}"
            )));
        }
        if !total_loss_db.is_finite() || total_loss_db < 0.0 {
            return Err(ChannelError::Config(format!(
                "total loss must be finite and non-negative, got {total_loss_db} dB"
            )));
        }
        for (i, &p) in positions.iter().enumerate() {
            if !(0.0..=length).contains(&p) {
                return Err(ChannelError::Config(format!(
                    "screen position {p} lies outside the path [0, {length}]"
                )));
            }
            if i > 0 && p <= positions[i - 1] {
                return Err(ChannelError::Config(
                    "screen positions must be strictly increasing".into(),
                ));
            }
        }
        let grid = *screens[0].grid();
        if screens.iter().any(|s| *s.grid() != grid) {
            return Err(ChannelError::Config(
                "all screens of a path must share one grid".into(),
            ));
        }
        Ok(Self {
            screens,
            positions,
            length,
            total_loss_db,
        })
    }

    /// Path of `count` statistically identical slabs spread evenly over
    /// `length`. The screen is cloned per slab so each keeps independent
    /// caches; its thickness conventionally equals `length / count`.
    pub fn identical<S>(
        screen: S,
        length: f64,
        count: usize,
        placement: SlabPlacement,
        total_loss_db: f64,
    ) -> Result<Self, ChannelError>
    where
        S: PhaseScreen + Clone + 'static,
    {
        if count == 0 {
            return Err(ChannelError::Config(
                "a path needs at least one phase screen".into(),
            ));
        }
        let thickness = length / count as f64;
        let offset = match placement {
            SlabPlacement::Before => 0.0,
            SlabPlacement::Middle => 0.5,
            SlabPlacement::After => 1.0,
        };
        let positions = (0..count)
            .map(|i| (i as f64 + offset) * thickness)
            .collect();
        let screens = (0..count)
            .map(|_| Box::new(screen.clone()) as Box<dyn PhaseScreen>)
            .collect();
        Self::new(screens, positions, length, total_loss_db)
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Link length in metres.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn total_loss_db(&self) -> f64 {
        self.total_loss_db
    }

    /// Grid the path's screens are sampled on.
    pub fn grid(&self) -> RectGrid {
        *self.screens[0].grid()
    }

    /// Turbulence spectrum of the first slab.
    pub fn model(&self) -> Arc<dyn TurbulenceModel> {
        self.screens[0].model()
    }

    /// Reset every screen for a fresh statistical trial.
    pub fn reset_trial(&mut self, rng: &mut StdRng) {
        for screen in &mut self.screens {
            screen.reset_trial(rng);
        }
    }

    /// Amplitude factor for a segment of the given length.
    fn loss_share(&self, distance: f64) -> f64 {
        if self.total_loss_db == 0.0 {
            1.0
        } else {
            10f64.powf(-self.total_loss_db * (distance / self.length) / 20.0)
        }
    }

    /// Begin a traversal of the path with the given input field.
    pub fn stepper<'a>(
        &'a mut self,
        backend: &'a dyn SpectralBackend,
        wavenumber: f64,
        input: Array2<Complex64>,
        rng: &'a mut StdRng,
    ) -> Result<PathStepper<'a>, ChannelError> {
        let grid = self.grid();
        if input.dim() != (grid.ny(), grid.nx()) {
            return Err(ChannelError::Config(format!(
                "input field shape {:?} does not match the {}x{} path grid",
                input.dim(),
                grid.ny(),
                grid.nx()
            )));
        }
        Ok(PathStepper {
            path: self,
            backend,
            rng,
            grid,
            wavenumber,
            field: input,
            previous_position: 0.0,
            next_index: 0,
        })
    }

    /// Drive a field through the whole path and return the receiver-plane
    /// output.
    pub fn output(
        &mut self,
        backend: &dyn SpectralBackend,
        wavenumber: f64,
        input: Array2<Complex64>,
        rng: &mut StdRng,
    ) -> Result<Array2<Complex64>, ChannelError> {
        let mut stepper = self.stepper(backend, wavenumber, input, rng)?;
        while stepper.advance()?.is_some() {}
        Ok(stepper.into_field())
    }
}

impl fmt::Debug for TurbulentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurbulentPath")
            .field("screens", &self.screens.len())
            .field("positions", &self.positions)
            .field("length", &self.length)
            .field("total_loss_db", &self.total_loss_db)
            .finish()
    }
}

/// Explicit traversal state: one [`advance`](PathStepper::advance) call
/// performs one vacuum-plus-screen step, the last performs the trailing
/// vacuum stretch to the receiver.
pub struct PathStepper<'a> {
    path: &'a mut TurbulentPath,
    backend: &'a dyn SpectralBackend,
    rng: &'a mut StdRng,
    grid: RectGrid,
    wavenumber: f64,
    field: Array2<Complex64>,
    previous_position: f64,
    next_index: usize,
}

impl PathStepper<'_> {
    pub fn has_next(&self) -> bool {
        self.next_index <= self.path.screens.len()
    }

    /// Field after the most recent step (the input before any step).
    pub fn field(&self) -> &Array2<Complex64> {
        &self.field
    }

    pub fn into_field(self) -> Array2<Complex64> {
        self.field
    }

    pub fn advance(&mut self) -> Result<Option<PathStep>, ChannelError> {
        let total = self.path.screens.len();
        if self.next_index > total {
            return Ok(None);
        }
        let index = self.next_index;
        let target = if index < total {
            self.path.positions[index]
        } else {
            self.path.length
        };
        let distance = target - self.previous_position;
        let mut field = propagate(
            self.backend,
            &self.field,
            &self.grid,
            self.wavenumber,
            distance,
        )?;
        let screen = if index < total {
            let phase = self.path.screens[index].generate(self.rng)?;
            for (f, ph) in field.iter_mut().zip(phase.iter()) {
                *f *= Complex64::from_polar(1.0, -ph);
            }
            Some(phase)
        } else {
            None
        };
        let share = self.path.loss_share(distance);
        if share != 1.0 {
            field.mapv_inplace(|v| v * share);
        }
        self.field = field;
        self.previous_position = target;
        self.next_index += 1;
        Ok(Some(PathStep {
            index,
            position: target,
            screen,
        }))
    }
}
