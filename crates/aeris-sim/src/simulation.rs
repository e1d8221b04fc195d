//! Trial-driving engine.
//!
//! A [`Simulation`] owns a channel and a set of [`Measure`]s and runs
//! statistical trials until every bounded measure has filled up, a trial
//! cap is reached, or an interrupt flag is raised. Each trial draws a
//! fresh turbulence realization; measures that share a time base share
//! the realization too, so cross-measure statistics stay consistent.
//!
//! Trials are atomic. All chains of a trial are evaluated into a pending
//! set first and committed together at the end, so a failed traversal
//! never leaves a measure with more records than its peers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;

use aeris_core::channel::Channel;
use aeris_core::grid::RectGrid;

use crate::error::SimulationError;
use crate::measure::{evaluate_chain, ChainValue, Measure, Op, Record, Stage, Staged};
use crate::persist;

/// Stopping, reporting and checkpointing knobs for [`Simulation::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cap on the number of trials this call may run.
    pub max_trials: Option<usize>,
    /// Log progress every this many trials.
    pub report_every: Option<usize>,
    /// Checkpoint results every this many trials. Requires `save_path`.
    pub save_every: Option<usize>,
    /// Results file written at checkpoints and when the run stops.
    pub save_path: Option<PathBuf>,
    /// Cooperative stop flag, checked before every trial. The results
    /// file is still flushed when the flag cuts a run short.
    pub interrupt: Option<Arc<AtomicBool>>,
}

/// What a [`Simulation::run`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Trials run by this call.
    pub trials: usize,
    /// Every bounded measure reached its cap.
    pub complete: bool,
    /// The interrupt flag cut the run short.
    pub interrupted: bool,
}

/// A channel plus the measures observing it.
#[derive(Debug)]
pub struct Simulation {
    channel: Channel,
    measures: Vec<Measure>,
    trials: usize,
}

/// Stages a pass has to capture for the group at hand. The arrival
/// field is always produced; the rest cost a clone each.
#[derive(Default)]
struct StageSet {
    source: bool,
    slots: bool,
    screen: bool,
    pupil: bool,
}

/// Fields captured from one channel pass.
struct PassFields {
    source: Option<Array2<Complex64>>,
    slots: Option<Vec<Array2<Complex64>>>,
    screen: Option<Array2<f64>>,
    arrival: Array2<Complex64>,
    pupil: Option<Array2<Complex64>>,
}

/// Per-member accumulator over the passes of a labeled group.
enum SeriesAcc {
    Scalars(Vec<f64>),
    Rows(Vec<Vec<f64>>),
}

impl SeriesAcc {
    fn into_record(self) -> Record {
        match self {
            SeriesAcc::Scalars(v) => Record::Series(v),
            SeriesAcc::Rows(v) => Record::Matrix(v),
        }
    }
}

impl Simulation {
    /// Wire measures to a channel. Measures are validated against the
    /// channel here: a pupil-stage measure needs a configured pupil and
    /// structure-function lags must fit the grid.
    pub fn new(channel: Channel, measures: Vec<Measure>) -> Result<Self, SimulationError> {
        if measures.is_empty() {
            return Err(SimulationError::Config(
                "a simulation needs at least one measure".into(),
            ));
        }
        for (i, measure) in measures.iter().enumerate() {
            if measures[..i].iter().any(|m| m.name() == measure.name()) {
                return Err(SimulationError::Config(format!(
                    "duplicate measure name {:?}",
                    measure.name()
                )));
            }
            if measure.stage() == Stage::Pupil && !channel.has_pupil() {
                return Err(SimulationError::Config(format!(
                    "measure {:?} observes the pupil but the channel has none",
                    measure.name()
                )));
            }
            for op in measure.chain() {
                if let Op::StructureFunction { max_lag } = op {
                    if *max_lag >= channel.grid().nx() {
                        return Err(SimulationError::Config(format!(
                            "measure {:?} asks for lag {} on a {}-column grid",
                            measure.name(),
                            max_lag,
                            channel.grid().nx()
                        )));
                    }
                }
            }
        }
        Ok(Self {
            channel,
            measures,
            trials: 0,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name() == name)
    }

    /// Trials committed over the lifetime of this simulation.
    pub fn trials(&self) -> usize {
        self.trials
    }

    /// There is at least one bounded measure and every bounded measure
    /// has reached its cap.
    pub fn is_complete(&self) -> bool {
        self.measures.iter().any(|m| m.max_size().is_some())
            && self
                .measures
                .iter()
                .all(|m| m.max_size().is_none() || m.is_complete())
    }

    /// Reload records from an earlier checkpoint so a run can resume
    /// where it stopped. Columns are matched to measures by name;
    /// columns with no matching measure are ignored.
    pub fn restore_from_csv(&mut self, path: &std::path::Path) -> Result<(), SimulationError> {
        let columns = persist::load_csv(path)?;
        persist::restore(&mut self.measures, &columns);
        Ok(())
    }

    /// Run trials until the simulation completes or an option stops it.
    /// The results file, when configured, is flushed on every exit from
    /// the trial loop.
    pub fn run(
        &mut self,
        rng: &mut StdRng,
        options: &RunOptions,
    ) -> Result<RunSummary, SimulationError> {
        if options.save_every.is_some() && options.save_path.is_none() {
            return Err(SimulationError::Config(
                "save_every needs a save_path to write to".into(),
            ));
        }
        if options.save_every == Some(0) || options.report_every == Some(0) {
            return Err(SimulationError::Config(
                "save_every and report_every must cover at least one trial".into(),
            ));
        }
        let bounded = self.measures.iter().any(|m| m.max_size().is_some());
        if !bounded && options.max_trials.is_none() && options.interrupt.is_none() {
            return Err(SimulationError::Config(
                "nothing stops this run: bound a measure, cap the trials or pass an interrupt flag"
                    .into(),
            ));
        }

        let mut trials = 0;
        let mut interrupted = false;
        loop {
            if self.is_complete() {
                break;
            }
            if options.max_trials.is_some_and(|cap| trials >= cap) {
                break;
            }
            if options
                .interrupt
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                interrupted = true;
                break;
            }
            self.run_trial(rng)?;
            trials += 1;
            self.trials += 1;
            if options.report_every.is_some_and(|every| trials % every == 0) {
                log::info!(
                    "trial {} ({} total): {} of {} measures complete",
                    trials,
                    self.trials,
                    self.measures.iter().filter(|m| m.is_complete()).count(),
                    self.measures.len()
                );
            }
            if let (Some(every), Some(path)) = (options.save_every, options.save_path.as_ref()) {
                if trials % every == 0 {
                    persist::save_csv(path, &self.measures)?;
                }
            }
        }
        if let Some(path) = options.save_path.as_ref() {
            persist::save_csv(path, &self.measures)?;
        }
        Ok(RunSummary {
            trials,
            complete: self.is_complete(),
            interrupted,
        })
    }

    /// One atomic trial: a fresh turbulence realization, one pass per
    /// time sample per group, and a single commit at the end.
    fn run_trial(&mut self, rng: &mut StdRng) -> Result<(), SimulationError> {
        self.channel.reset_trial(rng);
        let grid = *self.channel.grid();

        // Incomplete measures, grouped by time base. Measures with the
        // same label vector watch the same passes; the unlabeled group
        // goes first so single-shot statistics see the earliest wind
        // state of the trial.
        let members: Vec<usize> = (0..self.measures.len())
            .filter(|&i| !self.measures[i].is_complete())
            .collect();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for &i in &members {
            let labels = self.measures[i].labels();
            match groups
                .iter_mut()
                .find(|g| self.measures[g[0]].labels() == labels)
            {
                Some(group) => group.push(i),
                None => groups.push(vec![i]),
            }
        }
        groups.sort_by_key(|g| self.measures[g[0]].labels().is_some());

        let mut pending: Vec<(usize, Record)> = Vec::new();
        for group in &groups {
            let mut want = StageSet::default();
            for &i in group {
                match self.measures[i].stage() {
                    Stage::Source => want.source = true,
                    Stage::Propagation => want.slots = true,
                    Stage::PhaseScreen => want.screen = true,
                    Stage::Atmosphere => {}
                    Stage::Pupil => want.pupil = true,
                }
            }
            match self.measures[group[0]].labels().map(<[String]>::len) {
                None => {
                    let fields = drive_pass(&mut self.channel, rng, &want)?;
                    let mut cache: Vec<(Stage, Vec<Op>, ChainValue)> = Vec::new();
                    for &i in group {
                        let value = staged_value(
                            &grid,
                            self.measures[i].stage(),
                            self.measures[i].chain(),
                            &fields,
                            &mut cache,
                        )?;
                        let record = match value {
                            ChainValue::Scalar(v) => Record::Scalar(v),
                            ChainValue::Series(v) => Record::Series(v),
                        };
                        pending.push((i, record));
                    }
                }
                Some(samples) => {
                    let mut accs: Vec<SeriesAcc> = group
                        .iter()
                        .map(|&i| {
                            if yields_series(self.measures[i].stage(), self.measures[i].chain()) {
                                SeriesAcc::Rows(Vec::with_capacity(samples))
                            } else {
                                SeriesAcc::Scalars(Vec::with_capacity(samples))
                            }
                        })
                        .collect();
                    for _ in 0..samples {
                        let fields = drive_pass(&mut self.channel, rng, &want)?;
                        let mut cache: Vec<(Stage, Vec<Op>, ChainValue)> = Vec::new();
                        for (acc, &i) in accs.iter_mut().zip(group) {
                            let value = staged_value(
                                &grid,
                                self.measures[i].stage(),
                                self.measures[i].chain(),
                                &fields,
                                &mut cache,
                            )?;
                            match (acc, value) {
                                (SeriesAcc::Scalars(vs), ChainValue::Scalar(v)) => vs.push(v),
                                (SeriesAcc::Rows(rows), ChainValue::Series(row)) => {
                                    rows.push(row)
                                }
                                _ => {
                                    return Err(SimulationError::Aggregation(
                                        "a chain changed kind between passes".into(),
                                    ))
                                }
                            }
                        }
                    }
                    for (acc, &i) in accs.into_iter().zip(group) {
                        pending.push((i, acc.into_record()));
                    }
                }
            }
        }

        for (i, record) in pending {
            self.measures[i].push(record);
        }
        Ok(())
    }
}

/// A chain that yields one series per pass rather than one scalar.
fn yields_series(stage: Stage, chain: &[Op]) -> bool {
    stage == Stage::Propagation || matches!(chain.last(), Some(Op::StructureFunction { .. }))
}

/// One traversal of the channel, capturing the stages the group needs.
fn drive_pass(
    channel: &mut Channel,
    rng: &mut StdRng,
    want: &StageSet,
) -> Result<PassFields, SimulationError> {
    let mut source = None;
    let mut slots = if want.slots { Some(Vec::new()) } else { None };
    let mut screen = None;
    let arrival = {
        let mut stepper = channel.stepper(rng)?;
        if want.source {
            source = Some(stepper.field().clone());
        }
        while let Some(step) = stepper.advance()? {
            if want.screen && step.index == 0 {
                screen = step.screen;
            }
            if let Some(slots) = slots.as_mut() {
                slots.push(stepper.field().clone());
            }
        }
        stepper.into_field()
    };
    let pupil = if want.pupil {
        Some(channel.apply_pupil(&arrival)?)
    } else {
        None
    };
    Ok(PassFields {
        source,
        slots,
        screen,
        arrival,
        pupil,
    })
}

/// Evaluate one measure against the pass, reusing any identical chain
/// already computed for this pass.
fn staged_value(
    grid: &RectGrid,
    stage: Stage,
    chain: &[Op],
    fields: &PassFields,
    cache: &mut Vec<(Stage, Vec<Op>, ChainValue)>,
) -> Result<ChainValue, SimulationError> {
    if let Some((_, _, value)) = cache
        .iter()
        .find(|(s, c, _)| *s == stage && c.as_slice() == chain)
    {
        return Ok(value.clone());
    }
    let missing =
        |stage: Stage| SimulationError::Aggregation(format!("stage {stage:?} was not captured"));
    let value = match stage {
        Stage::Source => {
            let field = fields.source.as_ref().ok_or_else(|| missing(stage))?;
            evaluate_chain(grid, chain, Staged::Field(field))?
        }
        Stage::Propagation => {
            let slots = fields.slots.as_ref().ok_or_else(|| missing(stage))?;
            let mut series = Vec::with_capacity(slots.len());
            for slot in slots {
                match evaluate_chain(grid, chain, Staged::Field(slot))? {
                    ChainValue::Scalar(v) => series.push(v),
                    ChainValue::Series(_) => {
                        return Err(SimulationError::Aggregation(
                            "propagation chains reduce each slot to a scalar".into(),
                        ))
                    }
                }
            }
            ChainValue::Series(series)
        }
        Stage::PhaseScreen => {
            let screen = fields.screen.as_ref().ok_or_else(|| missing(stage))?;
            evaluate_chain(grid, chain, Staged::Screen(screen))?
        }
        Stage::Atmosphere => evaluate_chain(grid, chain, Staged::Field(&fields.arrival))?,
        Stage::Pupil => {
            let field = fields.pupil.as_ref().ok_or_else(|| missing(stage))?;
            evaluate_chain(grid, chain, Staged::Field(field))?
        }
    };
    cache.push((stage, chain.to_vec(), value.clone()));
    Ok(value)
}
