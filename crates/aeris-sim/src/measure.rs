//! Measure declarations: staged extraction chains with growing,
//! optionally bounded, per-trial record buffers.
//!
//! A [`Measure`] names a field stage of the channel pipeline, a chain of
//! extraction operations applied in order, and an accumulation buffer.
//! Chains are typed: every operation declares what kind of value it
//! consumes and produces, and an ill-typed chain is rejected when the
//! measure is declared rather than when the first trial runs.

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use aeris_core::grid::RectGrid;
use aeris_core::pupil::{CirclePupil, Pupil};

use crate::error::SimulationError;

/// Which field of a channel pass a measure observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The transmitted field, before it enters the path.
    Source,
    /// Every step along the path, one slot per screen step plus a final
    /// slot for the trailing vacuum segment.
    Propagation,
    /// The first phase screen drawn during the pass.
    PhaseScreen,
    /// The receiver-plane field, before any pupil.
    Atmosphere,
    /// The receiver-plane field masked by the channel pupil.
    Pupil,
}

/// One extraction operation in a measure chain.
///
/// Moments follow the beam-optics orientation: the vertical axis grows
/// upwards, so array rows above the origin carry positive `y`. All
/// moments are intensity-weighted sums scaled by the cell area, so for
/// a unit-power source `mean_x` is the beam centroid and `eta` the
/// transmittance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// `|u|^2` pointwise.
    Intensity,
    /// Transmittance `sum I delta^2`.
    Eta,
    /// First moment `sum I x delta^2`.
    MeanX,
    /// First moment `sum I y delta^2`, vertical axis up.
    MeanY,
    /// Second moment `sum I x^2 delta^2`.
    MeanX2,
    /// Mixed moment `sum I x y delta^2`, vertical axis up.
    MeanXy,
    /// Second moment `sum I y^2 delta^2`.
    MeanY2,
    /// Second moment along the instantaneous wander direction,
    /// `sum I (x cos a + y sin a)^2 delta^2` with `a` the centroid
    /// azimuth of the same intensity map.
    MeanX2Rotated,
    /// Intensity at the grid origin.
    OnAxis,
    /// Mask with a circular aperture. A tracked aperture recentres on
    /// the centroid of the field it masks; an untracked one sits on the
    /// axis.
    Aperture {
        radius: f64,
        #[serde(default)]
        tracked: bool,
    },
    /// Row-lag structure function of a phase screen, lags `1..=max_lag`
    /// in grid-pitch units.
    StructureFunction { max_lag: usize },
}

/// Value kind flowing through a chain, used for declaration-time
/// validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Field,
    Real,
    Scalar,
    Series,
}

/// One appended record: a scalar per trial, a series (path slots,
/// structure-function lags or time samples), or a time-by-slot matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Scalar(f64),
    Series(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl Record {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Record::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            Record::Series(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&[Vec<f64>]> {
        match self {
            Record::Matrix(v) => Some(v),
            _ => None,
        }
    }
}

/// A named, staged extraction chain with its accumulation buffer.
#[derive(Debug, Clone)]
pub struct Measure {
    name: String,
    stage: Stage,
    chain: Vec<Op>,
    labels: Option<Vec<String>>,
    max_size: Option<usize>,
    records: Vec<Record>,
}

impl Measure {
    /// Declare a measure. The chain is type-checked against the stage
    /// here; a chain that cannot run is never accepted.
    pub fn new(
        name: impl Into<String>,
        stage: Stage,
        chain: Vec<Op>,
    ) -> Result<Self, SimulationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SimulationError::Config(
                "a measure needs a non-empty name".into(),
            ));
        }
        for op in &chain {
            match op {
                Op::Aperture { radius, .. } if !(radius.is_finite() && *radius > 0.0) => {
                    return Err(SimulationError::Config(format!(
                        "aperture radius must be finite and positive, got {radius}"
                    )));
                }
                Op::StructureFunction { max_lag } if *max_lag == 0 => {
                    return Err(SimulationError::Config(
                        "structure function needs at least one lag".into(),
                    ));
                }
                _ => {}
            }
        }
        let kind = chain_kind(stage, &chain)?;
        if stage == Stage::Propagation && kind != Kind::Scalar {
            return Err(SimulationError::Config(
                "propagation measures must reduce each slot to a scalar".into(),
            ));
        }
        Ok(Self {
            name,
            stage,
            chain,
            labels: None,
            max_size: None,
            records: Vec::new(),
        })
    }

    /// Stop accumulating after `max_size` records.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Record a time series: every trial drives one channel pass per
    /// label, with wind screens advected between passes.
    pub fn with_time_labels(mut self, labels: Vec<String>) -> Result<Self, SimulationError> {
        if labels.is_empty() {
            return Err(SimulationError::Config(
                "a time-series measure needs at least one label".into(),
            ));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn chain(&self) -> &[Op] {
        &self.chain
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A bounded measure that has reached its cap. Unbounded measures
    /// are never complete.
    pub fn is_complete(&self) -> bool {
        self.max_size.is_some_and(|n| self.records.len() >= n)
    }

    pub(crate) fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub(crate) fn set_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }
}

/// Type-check a chain against its stage and return the kind of value it
/// yields.
fn chain_kind(stage: Stage, chain: &[Op]) -> Result<Kind, SimulationError> {
    let mut kind = match stage {
        Stage::PhaseScreen => Kind::Real,
        _ => Kind::Field,
    };
    for op in chain {
        kind = match (op, kind) {
            (Op::Intensity, Kind::Field) => Kind::Real,
            (Op::Aperture { .. }, Kind::Field) => Kind::Field,
            (
                Op::Eta
                | Op::MeanX
                | Op::MeanY
                | Op::MeanX2
                | Op::MeanXy
                | Op::MeanY2
                | Op::MeanX2Rotated
                | Op::OnAxis,
                Kind::Real,
            ) => Kind::Scalar,
            (Op::StructureFunction { .. }, Kind::Real) => Kind::Series,
            (op, kind) => {
                return Err(SimulationError::Config(format!(
                    "operation {op:?} cannot consume a {kind:?} value"
                )));
            }
        };
    }
    match kind {
        Kind::Scalar | Kind::Series => Ok(kind),
        _ => Err(SimulationError::Config(
            "a measure chain must end in a scalar or a series".into(),
        )),
    }
}

/// Field handed to a chain by the engine.
pub(crate) enum Staged<'a> {
    Field(&'a Array2<Complex64>),
    Screen(&'a Array2<f64>),
}

/// Result of a chain evaluation.
#[derive(Debug, Clone)]
pub(crate) enum ChainValue {
    Scalar(f64),
    Series(Vec<f64>),
}

enum Value {
    Field(Array2<Complex64>),
    Real(Array2<f64>),
    Scalar(f64),
    Series(Vec<f64>),
}

/// Run a validated chain over one staged field.
pub(crate) fn evaluate_chain(
    grid: &RectGrid,
    chain: &[Op],
    staged: Staged<'_>,
) -> Result<ChainValue, SimulationError> {
    let mut value = match staged {
        Staged::Field(u) => Value::Field(u.clone()),
        Staged::Screen(s) => Value::Real(s.clone()),
    };
    for op in chain {
        value = apply(op, value, grid)?;
    }
    match value {
        Value::Scalar(v) => Ok(ChainValue::Scalar(v)),
        Value::Series(v) => Ok(ChainValue::Series(v)),
        _ => Err(SimulationError::Config(
            "a measure chain must end in a scalar or a series".into(),
        )),
    }
}

fn apply(op: &Op, value: Value, grid: &RectGrid) -> Result<Value, SimulationError> {
    match (op, value) {
        (Op::Intensity, Value::Field(u)) => Ok(Value::Real(u.mapv(|v| v.norm_sqr()))),
        (Op::Aperture { radius, tracked }, Value::Field(u)) => {
            let (sx, sy) = if *tracked {
                let intensity = u.mapv(|v| v.norm_sqr());
                centroid(&intensity, grid)
            } else {
                (0.0, 0.0)
            };
            let pupil = CirclePupil::shifted(*grid, *radius, sx, sy)?;
            Ok(Value::Field(pupil.output(&u)))
        }
        (Op::Eta, Value::Real(i)) => {
            Ok(Value::Scalar(i.sum() * grid.delta() * grid.delta()))
        }
        (Op::MeanX, Value::Real(i)) => Ok(Value::Scalar(moment(&i, grid, |x, _| x))),
        (Op::MeanY, Value::Real(i)) => Ok(Value::Scalar(moment(&i, grid, |_, y| -y))),
        (Op::MeanX2, Value::Real(i)) => Ok(Value::Scalar(moment(&i, grid, |x, _| x * x))),
        (Op::MeanXy, Value::Real(i)) => Ok(Value::Scalar(moment(&i, grid, |x, y| -x * y))),
        (Op::MeanY2, Value::Real(i)) => Ok(Value::Scalar(moment(&i, grid, |_, y| y * y))),
        (Op::MeanX2Rotated, Value::Real(i)) => {
            let xc = moment(&i, grid, |x, _| x);
            let yc = moment(&i, grid, |_, y| -y);
            let r0 = (xc * xc + yc * yc).sqrt();
            let (cos_a, sin_a) = if r0 > 0.0 {
                (xc / r0, yc / r0)
            } else {
                (1.0, 0.0)
            };
            Ok(Value::Scalar(moment(&i, grid, |x, y| {
                let r = x * cos_a - y * sin_a;
                r * r
            })))
        }
        (Op::OnAxis, Value::Real(i)) => {
            let (row, col) = grid.origin_index();
            Ok(Value::Scalar(i[[row, col]]))
        }
        (Op::StructureFunction { max_lag }, Value::Real(s)) => {
            Ok(Value::Series(row_lag_sf(&s, *max_lag)))
        }
        (op, _) => Err(SimulationError::Config(format!(
            "operation {op:?} cannot consume the value produced so far"
        ))),
    }
}

/// Intensity-weighted coordinate sum scaled by the cell area.
fn moment(intensity: &Array2<f64>, grid: &RectGrid, f: impl Fn(f64, f64) -> f64) -> f64 {
    let x = grid.x();
    let y = grid.y();
    let mut acc = 0.0;
    for ((row, col), &v) in intensity.indexed_iter() {
        acc += v * f(x[[0, col]], y[[row, 0]]);
    }
    acc * grid.delta() * grid.delta()
}

/// Intensity centroid in beam coordinates, `(0, 0)` for a dark field.
fn centroid(intensity: &Array2<f64>, grid: &RectGrid) -> (f64, f64) {
    let power = intensity.sum() * grid.delta() * grid.delta();
    if power > 0.0 {
        (
            moment(intensity, grid, |x, _| x) / power,
            moment(intensity, grid, |_, y| -y) / power,
        )
    } else {
        (0.0, 0.0)
    }
}

/// Mean squared row difference at column lags `1..=max_lag`.
fn row_lag_sf(screen: &Array2<f64>, max_lag: usize) -> Vec<f64> {
    let (ny, nx) = screen.dim();
    let lags = max_lag.min(nx.saturating_sub(1));
    (1..=lags)
        .map(|lag| {
            let mut acc = 0.0;
            for i in 0..ny {
                for j in 0..nx - lag {
                    let d = screen[[i, j]] - screen[[i, j + lag]];
                    acc += d * d;
                }
            }
            acc / (ny * (nx - lag)) as f64
        })
        .collect()
}
