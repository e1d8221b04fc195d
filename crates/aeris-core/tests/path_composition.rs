//! Multi-slab paths: extinction bookkeeping, vacuum limits and the
//! channel round trip.

use std::f64::consts::PI;
use std::sync::Arc;

use aeris_compute::{CpuBackend, SpectralBackend};
use aeris_core::grid::RectGrid;
use aeris_core::propagation::propagate;
use aeris_core::pupil::CirclePupil;
use aeris_core::screens::FftScreen;
use aeris_core::source::{GaussianSource, Source};
use aeris_core::turbulence::{ModifiedVonKarman, TurbulenceModel};
use aeris_core::{Channel, SlabPlacement, TurbulentPath};
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

const WAVELENGTH: f64 = 808e-9;
const WAVENUMBER: f64 = 2.0 * PI / WAVELENGTH;
const LENGTH: f64 = 600.0;

fn grid() -> RectGrid {
    RectGrid::new(64, 1.5e-3).unwrap()
}

fn model() -> Arc<dyn TurbulenceModel> {
    Arc::new(ModifiedVonKarman::new(5e-14, 6e-3, 0.5).unwrap())
}

fn slab(grid: RectGrid, backend: Arc<CpuBackend>, thickness: f64) -> FftScreen {
    FftScreen::new(grid, model(), backend, WAVENUMBER, thickness, 1).unwrap()
}

fn energy(field: &Array2<Complex64>, delta: f64) -> f64 {
    field.iter().map(|v| v.norm_sqr()).sum::<f64>() * delta * delta
}

/// Phase slabs only redistribute power, so the output energy is the
/// input energy scaled by the extinction, however the path is split.
#[test]
fn extinction_is_independent_of_segmentation() {
    let grid = grid();
    let backend = Arc::new(CpuBackend::new());
    let source = GaussianSource::collimated(grid, WAVELENGTH, 8e-3).unwrap();
    let input = source.output();
    let loss_db = 7.5;
    let expected = 10f64.powf(-loss_db / 10.0);

    for count in [1usize, 3, 6] {
        let screen = slab(grid, Arc::clone(&backend), LENGTH / count as f64);
        let mut path =
            TurbulentPath::identical(screen, LENGTH, count, SlabPlacement::Middle, loss_db)
                .unwrap();
        let mut rng = StdRng::seed_from_u64(100 + count as u64);
        let out = path
            .output(backend.as_ref(), WAVENUMBER, input.clone(), &mut rng)
            .unwrap();
        let ratio = energy(&out, grid.delta()) / energy(&input, grid.delta());
        eprintln!("{count} slabs: energy ratio = {ratio:.12}, expected = {expected:.12}");
        assert!((ratio - expected).abs() < 1e-9 * expected);
    }
}

#[test]
fn a_lossless_turbulent_path_conserves_energy() {
    let grid = grid();
    let backend = Arc::new(CpuBackend::new());
    let source = GaussianSource::collimated(grid, WAVELENGTH, 8e-3).unwrap();
    let input = source.output();

    let screen = slab(grid, Arc::clone(&backend), LENGTH / 4.0);
    let mut path =
        TurbulentPath::identical(screen, LENGTH, 4, SlabPlacement::Middle, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(200);
    let out = path
        .output(backend.as_ref(), WAVENUMBER, input.clone(), &mut rng)
        .unwrap();
    let ratio = energy(&out, grid.delta()) / energy(&input, grid.delta());
    eprintln!("lossless ratio = {ratio:.12}");
    assert!((ratio - 1.0).abs() < 1e-9);
}

/// With zero-thickness slabs every screen is identically zero and the
/// split path must agree with one direct vacuum transform.
#[test]
fn a_quiet_path_reduces_to_vacuum_diffraction() {
    let grid = grid();
    let backend = CpuBackend::new();
    let source = GaussianSource::collimated(grid, WAVELENGTH, 8e-3).unwrap();
    let input = source.output();

    let screen = slab(grid, Arc::new(CpuBackend::new()), 0.0);
    let mut path =
        TurbulentPath::identical(screen, LENGTH, 3, SlabPlacement::Middle, 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(300);
    let split = path
        .output(&backend, WAVENUMBER, input.clone(), &mut rng)
        .unwrap();
    let direct = propagate(&backend, &input, &grid, WAVENUMBER, LENGTH).unwrap();

    let peak = direct.iter().map(|v| v.norm()).fold(0.0, f64::max);
    let worst = split
        .iter()
        .zip(direct.iter())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max);
    eprintln!("worst field deviation = {:.3e} of peak {peak:.3e}", worst);
    assert!(worst < 1e-10 * peak);
}

#[test]
fn a_channel_run_masks_only_when_asked() {
    let grid = grid();
    let backend: Arc<dyn SpectralBackend> = Arc::new(CpuBackend::new());
    let source = GaussianSource::collimated(grid, WAVELENGTH, 8e-3).unwrap();
    let screen = slab(grid, Arc::new(CpuBackend::new()), LENGTH / 2.0);
    let path =
        TurbulentPath::identical(screen, LENGTH, 2, SlabPlacement::Middle, 0.0).unwrap();
    let pupil = CirclePupil::new(grid, 12e-3).unwrap();
    let mut channel = Channel::new(Box::new(source), path, backend)
        .unwrap()
        .with_pupil(Box::new(pupil))
        .unwrap();

    let mut rng = StdRng::seed_from_u64(400);
    let open = channel.run(&mut rng, false).unwrap();
    channel.reset_trial(&mut rng);
    let mut rng = StdRng::seed_from_u64(400);
    let masked = channel.run(&mut rng, true).unwrap();

    let e_open = energy(&open, grid.delta());
    let e_masked = energy(&masked, grid.delta());
    eprintln!("open = {e_open:.6e}, masked = {e_masked:.6e}");
    assert!(e_masked < e_open);
    assert!(e_masked > 0.0);

    // The cached output is always the unmasked arrival plane.
    let cached = channel.last_output().unwrap();
    let worst = cached
        .iter()
        .zip(open.iter())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max);
    assert!(worst < 1e-12);
}

#[test]
fn trial_resets_replay_under_the_same_seed() {
    let grid = grid();
    let backend = CpuBackend::new();
    let source = GaussianSource::collimated(grid, WAVELENGTH, 8e-3).unwrap();
    let input = source.output();
    let screen = slab(grid, Arc::new(CpuBackend::new()), LENGTH / 2.0);
    let mut path =
        TurbulentPath::identical(screen, LENGTH, 2, SlabPlacement::Middle, 3.0).unwrap();

    let mut rng = StdRng::seed_from_u64(500);
    let first = path
        .output(&backend, WAVENUMBER, input.clone(), &mut rng)
        .unwrap();

    let mut rng = StdRng::seed_from_u64(500);
    path.reset_trial(&mut rng);
    let mut rng = StdRng::seed_from_u64(500);
    let second = path
        .output(&backend, WAVENUMBER, input, &mut rng)
        .unwrap();

    assert_eq!(first, second);
}
