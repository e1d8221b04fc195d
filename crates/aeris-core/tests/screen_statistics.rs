//! Phase screen ensembles against closed-form turbulence statistics.

use std::f64::consts::PI;
use std::sync::Arc;

use aeris_compute::CpuBackend;
use aeris_core::grid::{LogPolarGrid, RectGrid};
use aeris_core::screens::{FftScreen, PhaseScreen, SparseScreen, WindScreen};
use aeris_core::turbulence::{ModifiedVonKarman, TurbulenceModel};
use approx::assert_relative_eq;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

const WAVELENGTH: f64 = 808e-9;
const WAVENUMBER: f64 = 2.0 * PI / WAVELENGTH;
const PITCH: f64 = 2e-3;
const THICKNESS: f64 = 200.0;

fn model() -> Arc<ModifiedVonKarman> {
    Arc::new(ModifiedVonKarman::new(5e-14, 6e-3, 0.5).unwrap())
}

/// Empirical structure function at integer column lags, averaged over
/// rows, columns and screens.
fn structure_function(screens: &[Array2<f64>], lag: usize) -> f64 {
    let mut acc = 0.0;
    let mut count = 0usize;
    for screen in screens {
        let (ny, nx) = screen.dim();
        for i in 0..ny {
            for j in 0..nx - lag {
                let d = screen[[i, j]] - screen[[i, j + lag]];
                acc += d * d;
                count += 1;
            }
        }
    }
    acc / count as f64
}

fn collect_screens<S: PhaseScreen>(screen: &mut S, rng: &mut StdRng, count: usize) -> Vec<Array2<f64>> {
    (0..count).map(|_| screen.generate(rng).unwrap()).collect()
}

#[test]
fn fft_screens_reproduce_the_von_karman_structure_function() {
    let grid = RectGrid::new(64, PITCH).unwrap();
    let model = model();
    let mut screen = FftScreen::new(
        grid,
        Arc::clone(&model) as Arc<dyn TurbulenceModel>,
        Arc::new(CpuBackend::new()),
        WAVENUMBER,
        THICKNESS,
        2,
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7001);
    let screens = collect_screens(&mut screen, &mut rng, 200);

    for lag in 1..=8usize {
        let r = lag as f64 * PITCH;
        let estimated = structure_function(&screens, lag);
        let closed = model.sf_phi(r, WAVENUMBER, THICKNESS);
        let rel = (estimated - closed) / closed;
        eprintln!("lag {lag}: D_est = {estimated:.4e}, D_mvk = {closed:.4e}, rel = {rel:+.3}");
        assert_relative_eq!(estimated, closed, max_relative = 0.10);
    }
}

#[test]
fn dropping_subharmonics_starves_the_large_separations() {
    let grid = RectGrid::new(64, PITCH).unwrap();
    let model = model();
    let mut screen = FftScreen::new(
        grid,
        Arc::clone(&model) as Arc<dyn TurbulenceModel>,
        Arc::new(CpuBackend::new()),
        WAVENUMBER,
        THICKNESS,
        0,
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7002);
    let screens = collect_screens(&mut screen, &mut rng, 200);

    let r = 8.0 * PITCH;
    let estimated = structure_function(&screens, 8);
    let closed = model.sf_phi(r, WAVENUMBER, THICKNESS);
    eprintln!("no subharmonics: D_est = {estimated:.4e}, D_mvk = {closed:.4e}");
    assert!(estimated < 0.9 * closed);
}

#[test]
fn sparse_screens_reproduce_the_von_karman_structure_function() {
    let grid = RectGrid::new(64, PITCH).unwrap();
    let fgrid = LogPolarGrid::new(128, 0.05, 800.0).unwrap();
    let model = model();
    let mut screen = SparseScreen::new(
        grid,
        fgrid,
        Arc::clone(&model) as Arc<dyn TurbulenceModel>,
        WAVENUMBER,
        THICKNESS,
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7003);
    let screens = collect_screens(&mut screen, &mut rng, 200);

    for lag in 1..=8usize {
        let r = lag as f64 * PITCH;
        let estimated = structure_function(&screens, lag);
        let closed = model.sf_phi(r, WAVENUMBER, THICKNESS);
        let rel = (estimated - closed) / closed;
        eprintln!("lag {lag}: D_est = {estimated:.4e}, D_mvk = {closed:.4e}, rel = {rel:+.3}");
        assert_relative_eq!(estimated, closed, max_relative = 0.10);
    }
}

#[test]
fn wind_screen_variance_matches_its_weights() {
    let grid = RectGrid::rectangular(8, 8, PITCH).unwrap();
    let fgrid = LogPolarGrid::new(48, 0.05, 800.0).unwrap();
    let mut screen = WindScreen::new(
        grid,
        fgrid,
        model() as Arc<dyn TurbulenceModel>,
        WAVENUMBER,
        THICKNESS,
        PITCH,
    )
    .unwrap();
    let expected = model().phase_band_variance(0.0, 2.0 * PI * 800.0, WAVENUMBER, THICKNESS);

    let mut rng = StdRng::seed_from_u64(7004);
    let mut acc = 0.0;
    let mut count = 0usize;
    for _ in 0..600 {
        screen.seed_spectrum(&mut rng);
        let out = screen.generate(&mut rng).unwrap();
        acc += out.iter().map(|v| v * v).sum::<f64>();
        count += out.len();
    }
    let estimated = acc / count as f64;
    eprintln!("wind variance: est = {estimated:.4e}, weights = {expected:.4e}");
    assert_relative_eq!(estimated, expected, max_relative = 0.15);
}

#[test]
fn the_two_halves_of_one_synthesis_are_uncorrelated() {
    let grid = RectGrid::new(32, PITCH).unwrap();
    let model = model();
    let mut screen = FftScreen::new(
        grid,
        Arc::clone(&model) as Arc<dyn TurbulenceModel>,
        Arc::new(CpuBackend::new()),
        WAVENUMBER,
        THICKNESS,
        0,
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7005);

    let mut cross = 0.0;
    let mut var = 0.0;
    for _ in 0..200 {
        let re = screen.generate(&mut rng).unwrap();
        let im = screen.generate(&mut rng).unwrap();
        cross += re
            .iter()
            .zip(im.iter())
            .map(|(a, b)| a * b)
            .sum::<f64>();
        var += re.iter().map(|v| v * v).sum::<f64>();
    }
    eprintln!("cross/var = {:.4}", cross / var);
    assert!((cross / var).abs() < 0.1);
}
