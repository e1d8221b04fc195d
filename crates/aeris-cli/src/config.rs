//! TOML configuration deserialisation for simulation jobs.

use serde::Deserialize;

use aeris_core::path::SlabPlacement;
use aeris_sim::{Op, Stage};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub grid: GridConfig,
    pub source: SourceConfig,
    pub turbulence: TurbulenceConfig,
    pub path: PathConfig,
    #[serde(default)]
    pub pupil: Option<PupilConfig>,
    #[serde(default)]
    pub measure: Vec<MeasureConfig>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Sampling window: `resolution x resolution` points, `pitch` metres
/// apart.
#[derive(Debug, Deserialize)]
pub struct GridConfig {
    pub resolution: usize,
    pub pitch: f64,
}

/// Transmitter: a Gaussian beam when a waist is given, otherwise a
/// uniform plane wave.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceConfig {
    Gaussian {
        /// Wavelength in metres.
        wavelength: f64,
        /// Waist radius `w0` in metres.
        waist_radius: f64,
        /// Phase-front radius at the waist; omit for a collimated beam.
        #[serde(default)]
        focal_distance: Option<f64>,
    },
    Plane {
        wavelength: f64,
    },
}

impl SourceConfig {
    pub fn wavelength(&self) -> f64 {
        match self {
            SourceConfig::Gaussian { wavelength, .. } => *wavelength,
            SourceConfig::Plane { wavelength } => *wavelength,
        }
    }
}

/// Refractive-index spectrum of the link.
#[derive(Debug, Deserialize)]
pub struct TurbulenceConfig {
    /// Spectrum identifier: "mvk", "kolmogorov" or "tatarskii".
    #[serde(default = "default_model")]
    pub model: String,
    /// Structure parameter in m^(-2/3).
    pub cn2: f64,
    /// Inner scale `l0` in metres.
    pub inner_scale: f64,
    /// Outer scale `L0` in metres.
    pub outer_scale: f64,
}

fn default_model() -> String {
    "mvk".into()
}

/// Link geometry and the synthesis method of its phase screens.
#[derive(Debug, Deserialize)]
pub struct PathConfig {
    /// Link length in metres.
    pub length: f64,
    /// Number of identical slabs the link is split into.
    pub screens: usize,
    /// Where each slab sits within its segment.
    #[serde(default = "default_placement")]
    pub placement: SlabPlacement,
    /// Total extinction budget in dB, spread over the segments.
    #[serde(default)]
    pub loss_db: f64,
    pub screen: ScreenConfig,
}

fn default_placement() -> SlabPlacement {
    SlabPlacement::Middle
}

/// Phase-screen synthesis method.
#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ScreenConfig {
    /// Full-grid spectral synthesis with subharmonic levels below the
    /// fundamental frequency bin.
    Fft {
        #[serde(default = "default_subharmonics")]
        subharmonics: usize,
    },
    /// Sparse plane-wave synthesis on a log-polar frequency partition.
    Sparse {
        #[serde(default = "default_frequency_points")]
        frequency_points: usize,
        #[serde(default = "default_f_min")]
        f_min: f64,
        #[serde(default = "default_f_max")]
        f_max: f64,
    },
    /// Sparse synthesis advected by a transverse wind between passes.
    Wind {
        #[serde(default = "default_frequency_points")]
        frequency_points: usize,
        #[serde(default = "default_f_min")]
        f_min: f64,
        #[serde(default = "default_f_max")]
        f_max: f64,
        /// Transverse drift per time sample, in metres.
        speed: f64,
    },
}

fn default_subharmonics() -> usize {
    3
}
fn default_frequency_points() -> usize {
    512
}
fn default_f_min() -> f64 {
    1e-2
}
fn default_f_max() -> f64 {
    1e3
}

/// Receiving aperture, absent by default.
#[derive(Debug, Deserialize)]
pub struct PupilConfig {
    /// Aperture radius in metres.
    pub radius: f64,
}

/// One declared measure: named extraction chain over a pipeline stage.
#[derive(Debug, Deserialize)]
pub struct MeasureConfig {
    pub name: String,
    pub stage: Stage,
    pub chain: Vec<Op>,
    /// Stop accumulating after this many records.
    #[serde(default)]
    pub max_size: Option<usize>,
    /// Time-sample labels; one channel pass per label per trial.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// Trial loop parameters.
#[derive(Debug, Default, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub max_trials: Option<usize>,
    #[serde(default)]
    pub report_every: Option<usize>,
    #[serde(default)]
    pub save_every: Option<usize>,
    /// Seed for the trial random stream; entropy-seeded when omitted.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Results file name inside the output directory.
    #[serde(default = "default_results_file")]
    pub results_file: String,
    /// Whether to also write a JSON run summary (default: false).
    #[serde(default)]
    pub save_summary: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            results_file: default_results_file(),
            save_summary: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_results_file() -> String {
    "results.csv".into()
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: JobConfig = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_full_job_parses() {
        let job: JobConfig = toml::from_str(
            r#"
            [grid]
            resolution = 256
            pitch = 1.5e-3

            [source]
            wavelength = 808e-9
            waist_radius = 0.02

            [turbulence]
            cn2 = 5e-14
            inner_scale = 6e-3
            outer_scale = 0.5

            [path]
            length = 1000.0
            screens = 10
            loss_db = 1.2

            [path.screen]
            method = "fft"
            subharmonics = 2

            [pupil]
            radius = 0.04

            [[measure]]
            name = "eta"
            stage = "pupil"
            chain = [{ op = "intensity" }, { op = "eta" }]
            max_size = 1000

            [[measure]]
            name = "pdt"
            stage = "atmosphere"
            chain = [
                { op = "aperture", radius = 0.01, tracked = true },
                { op = "intensity" },
                { op = "eta" },
            ]

            [run]
            max_trials = 500
            report_every = 50
            seed = 7

            [output]
            directory = "runs/strong"
            save_summary = true
            "#,
        )
        .unwrap();

        assert_eq!(job.grid.resolution, 256);
        assert!(matches!(
            job.source,
            SourceConfig::Gaussian {
                focal_distance: None,
                ..
            }
        ));
        assert_eq!(job.turbulence.model, "mvk");
        assert_eq!(job.path.placement, SlabPlacement::Middle);
        assert!(matches!(
            job.path.screen,
            ScreenConfig::Fft { subharmonics: 2 }
        ));
        assert_eq!(job.pupil.as_ref().unwrap().radius, 0.04);
        assert_eq!(job.measure.len(), 2);
        assert_eq!(job.measure[0].stage, Stage::Pupil);
        assert_eq!(job.measure[0].chain, vec![Op::Intensity, Op::Eta]);
        assert_eq!(
            job.measure[1].chain[0],
            Op::Aperture {
                radius: 0.01,
                tracked: true
            }
        );
        assert_eq!(job.run.seed, Some(7));
        assert_eq!(job.output.directory, "runs/strong");
        assert!(job.output.save_summary);
    }

    #[test]
    fn a_plane_wave_job_takes_the_defaults() {
        let job: JobConfig = toml::from_str(
            r#"
            [grid]
            resolution = 64
            pitch = 1e-3

            [source]
            wavelength = 1.55e-6

            [turbulence]
            cn2 = 1e-15
            inner_scale = 1e-3
            outer_scale = 80.0

            [path]
            length = 500.0
            screens = 4

            [path.screen]
            method = "wind"
            speed = 0.02
            "#,
        )
        .unwrap();

        assert!(matches!(job.source, SourceConfig::Plane { .. }));
        assert_eq!(job.path.loss_db, 0.0);
        assert!(matches!(
            job.path.screen,
            ScreenConfig::Wind {
                frequency_points: 512,
                speed,
                ..
            } if speed == 0.02
        ));
        assert!(job.pupil.is_none());
        assert!(job.measure.is_empty());
        assert_eq!(job.output.results_file, "results.csv");
    }
}
