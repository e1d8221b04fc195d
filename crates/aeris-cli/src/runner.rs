//! Simulation runner: ties together channel parts, measures and the
//! trial engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use aeris_compute::{CpuBackend, SpectralBackend};
use aeris_core::channel::Channel;
use aeris_core::grid::{LogPolarGrid, RectGrid};
use aeris_core::path::TurbulentPath;
use aeris_core::pupil::CirclePupil;
use aeris_core::screens::{FftScreen, SparseScreen, WindScreen};
use aeris_core::source::{GaussianSource, PlaneSource, Source};
use aeris_core::theory;
use aeris_core::turbulence::{Kolmogorov, ModifiedVonKarman, Tatarskii, TurbulenceModel};
use aeris_sim::{Measure, RunOptions, RunSummary, Simulation};

use crate::config::{JobConfig, MeasureConfig, ScreenConfig, SourceConfig, TurbulenceConfig};

/// Outcome of a run: the engine summary plus where the records went.
pub struct RunOutput {
    pub summary: RunSummary,
    pub results_path: PathBuf,
}

/// Assemble the channel and measures from a parsed job without running
/// anything. Used by `validate` to surface semantic errors quietly.
pub fn build_simulation(job: &JobConfig) -> Result<Simulation> {
    assemble(job, Arc::new(CpuBackend::new()))
}

/// Run the job's trial loop and write its outputs under `out_dir`.
pub fn run_simulation(job: &JobConfig, out_dir: &Path, resume: bool) -> Result<RunOutput> {
    let backend: Arc<dyn SpectralBackend> = Arc::new(CpuBackend::new());
    println!("Backend: {}", backend.device_info().name);
    let mut simulation = assemble(job, backend)?;

    println!(
        "Grid: {res}x{res} points, {pitch:.3e} m pitch ({width:.3} m window)",
        res = job.grid.resolution,
        pitch = job.grid.pitch,
        width = job.grid.resolution as f64 * job.grid.pitch,
    );
    println!(
        "Turbulence: {} with Cn2={:.3e} m^(-2/3), l0={} m, L0={} m",
        job.turbulence.model, job.turbulence.cn2, job.turbulence.inner_scale,
        job.turbulence.outer_scale,
    );
    println!(
        "Path: {} x {} over {} m, {} dB extinction",
        job.path.screens,
        describe_screen(&job.path.screen),
        job.path.length,
        job.path.loss_db,
    );
    match &job.source {
        SourceConfig::Gaussian {
            wavelength,
            waist_radius,
            focal_distance,
        } => {
            let focus = match focal_distance {
                Some(f0) => format!("focused at {f0} m"),
                None => "collimated".into(),
            };
            println!(
                "Source: Gaussian beam, lambda={wavelength:.3e} m, w0={waist_radius} m, {focus}"
            );
        }
        SourceConfig::Plane { wavelength } => {
            println!("Source: plane wave, lambda={wavelength:.3e} m");
        }
    }
    println!(
        "Rytov variance: {:.4e}",
        simulation.channel().rytov_variance()
    );

    let results_path = out_dir.join(&job.output.results_file);
    if resume && results_path.exists() {
        simulation
            .restore_from_csv(&results_path)
            .with_context(|| format!("resuming from {}", results_path.display()))?;
        let restored: usize = simulation.measures().iter().map(Measure::len).sum();
        println!(
            "Resumed from {}: {restored} records across {} measures",
            results_path.display(),
            simulation.measures().len()
        );
    }

    let options = RunOptions {
        max_trials: job.run.max_trials,
        report_every: job.run.report_every,
        save_every: job.run.save_every,
        save_path: Some(results_path.clone()),
        interrupt: None,
    };
    let mut rng = match job.run.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let summary = simulation.run(&mut rng, &options)?;
    println!(
        "Ran {} trials ({} total), complete: {}",
        summary.trials,
        simulation.trials(),
        summary.complete
    );
    for measure in simulation.measures() {
        println!("  measure '{}': {} records", measure.name(), measure.len());
    }

    if job.output.save_summary {
        let report = RunReport {
            trials: summary.trials,
            complete: summary.complete,
            interrupted: summary.interrupted,
            rytov_variance: simulation.channel().rytov_variance(),
            measures: simulation
                .measures()
                .iter()
                .map(|m| MeasureReport {
                    name: m.name().to_string(),
                    records: m.len(),
                })
                .collect(),
        };
        write_summary_json(&report, &out_dir.join("summary.json"))?;
    }

    Ok(RunOutput {
        summary,
        results_path,
    })
}

/// Print the closed-form link statistics implied by a configuration.
pub fn print_theory(job: &JobConfig) -> Result<()> {
    let model = build_model(&job.turbulence)?;
    let wavelength = job.source.wavelength();
    let wavenumber = 2.0 * std::f64::consts::PI / wavelength;
    let length = job.path.length;
    let thickness = length / job.path.screens.max(1) as f64;

    let rytov2 = theory::rytov_variance(model.cn2(), wavenumber, length);
    println!("Link of {length} m at {wavelength:.3e} m:");
    println!("  Rytov variance:             {rytov2:.4e}");
    println!(
        "  plane coherence radius:     {:.4e} m",
        theory::coherence_radius_plane(model.cn2(), wavenumber, length)
    );
    println!(
        "  spherical coherence radius: {:.4e} m",
        theory::coherence_radius_spherical(model.cn2(), wavenumber, length)
    );
    let slab_variance =
        model.phase_band_variance(0.0, model.kappa_cutoff(), wavenumber, thickness);
    println!("  phase variance per {thickness} m slab: {slab_variance:.4e} rad^2");
    for separation in [job.grid.pitch, 10.0 * job.grid.pitch] {
        println!(
            "  D_phi({separation:.3e} m) per slab:   {:.4e} rad^2",
            model.sf_phi(separation, wavenumber, thickness)
        );
    }
    if let SourceConfig::Gaussian {
        wavelength,
        waist_radius,
        focal_distance,
    } = &job.source
    {
        let grid = RectGrid::new(job.grid.resolution, job.grid.pitch)?;
        let source = GaussianSource::new(
            grid,
            *wavelength,
            *waist_radius,
            focal_distance.unwrap_or(f64::INFINITY),
        )?;
        match theory::si_saturated(rytov2, source.theta(length)) {
            Ok(si) => println!("  saturated scintillation:    {si:.4e}"),
            Err(e) => println!("  saturated scintillation:    n/a ({e})"),
        }
    }
    Ok(())
}

fn assemble(job: &JobConfig, backend: Arc<dyn SpectralBackend>) -> Result<Simulation> {
    let grid =
        RectGrid::new(job.grid.resolution, job.grid.pitch).context("invalid [grid] section")?;
    let model = build_model(&job.turbulence)?;
    let wavenumber = 2.0 * std::f64::consts::PI / job.source.wavelength();
    let thickness = job.path.length / job.path.screens.max(1) as f64;

    let path = match &job.path.screen {
        ScreenConfig::Fft { subharmonics } => {
            let screen = FftScreen::new(
                grid,
                model,
                backend.clone(),
                wavenumber,
                thickness,
                *subharmonics,
            )?;
            TurbulentPath::identical(
                screen,
                job.path.length,
                job.path.screens,
                job.path.placement,
                job.path.loss_db,
            )?
        }
        ScreenConfig::Sparse {
            frequency_points,
            f_min,
            f_max,
        } => {
            let fgrid = LogPolarGrid::new(*frequency_points, *f_min, *f_max)?;
            let screen = SparseScreen::new(grid, fgrid, model, wavenumber, thickness)?;
            TurbulentPath::identical(
                screen,
                job.path.length,
                job.path.screens,
                job.path.placement,
                job.path.loss_db,
            )?
        }
        ScreenConfig::Wind {
            frequency_points,
            f_min,
            f_max,
            speed,
        } => {
            let fgrid = LogPolarGrid::new(*frequency_points, *f_min, *f_max)?;
            let screen = WindScreen::new(grid, fgrid, model, wavenumber, thickness, *speed)?;
            TurbulentPath::identical(
                screen,
                job.path.length,
                job.path.screens,
                job.path.placement,
                job.path.loss_db,
            )?
        }
    };

    let source: Box<dyn Source> = match &job.source {
        SourceConfig::Gaussian {
            wavelength,
            waist_radius,
            focal_distance,
        } => match focal_distance {
            Some(f0) => Box::new(GaussianSource::new(grid, *wavelength, *waist_radius, *f0)?),
            None => Box::new(GaussianSource::collimated(grid, *wavelength, *waist_radius)?),
        },
        SourceConfig::Plane { wavelength } => Box::new(PlaneSource::uniform(grid, *wavelength)?),
    };

    let mut channel = Channel::new(source, path, backend)?;
    if let Some(pupil) = &job.pupil {
        channel = channel.with_pupil(Box::new(CirclePupil::new(grid, pupil.radius)?))?;
    }

    Ok(Simulation::new(channel, build_measures(&job.measure)?)?)
}

fn build_model(config: &TurbulenceConfig) -> Result<Arc<dyn TurbulenceModel>> {
    let model: Arc<dyn TurbulenceModel> = match config.model.as_str() {
        "mvk" => Arc::new(ModifiedVonKarman::new(
            config.cn2,
            config.inner_scale,
            config.outer_scale,
        )?),
        "kolmogorov" => Arc::new(Kolmogorov::new(
            config.cn2,
            config.inner_scale,
            config.outer_scale,
        )?),
        "tatarskii" => Arc::new(Tatarskii::new(
            config.cn2,
            config.inner_scale,
            config.outer_scale,
        )?),
        other => anyhow::bail!(
            "Unknown turbulence model '{}'. Valid identifiers: mvk, kolmogorov, tatarskii",
            other
        ),
    };
    Ok(model)
}

fn describe_screen(config: &ScreenConfig) -> String {
    match config {
        ScreenConfig::Fft { subharmonics } => {
            format!("fft screens ({subharmonics} subharmonic levels)")
        }
        ScreenConfig::Sparse {
            frequency_points, ..
        } => format!("sparse screens ({frequency_points} frequency points)"),
        ScreenConfig::Wind {
            frequency_points,
            speed,
            ..
        } => format!("wind screens ({frequency_points} points, {speed} m/step)"),
    }
}

fn build_measures(configs: &[MeasureConfig]) -> Result<Vec<Measure>> {
    configs
        .iter()
        .map(|config| {
            let mut measure =
                Measure::new(config.name.clone(), config.stage, config.chain.clone())
                    .with_context(|| format!("measure '{}'", config.name))?;
            if let Some(cap) = config.max_size {
                measure = measure.with_max_size(cap);
            }
            if let Some(labels) = &config.labels {
                measure = measure
                    .with_time_labels(labels.clone())
                    .with_context(|| format!("measure '{}'", config.name))?;
            }
            Ok(measure)
        })
        .collect()
}

#[derive(Serialize)]
struct RunReport {
    trials: usize,
    complete: bool,
    interrupted: bool,
    rytov_variance: f64,
    measures: Vec<MeasureReport>,
}

#[derive(Serialize)]
struct MeasureReport {
    name: String,
    records: usize,
}

fn write_summary_json(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    println!("Summary written to: {}", path.display());
    Ok(())
}
