//! Assembled optical channels.

use std::fmt;
use std::sync::Arc;

use aeris_compute::SpectralBackend;
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;

use crate::error::ChannelError;
use crate::grid::RectGrid;
use crate::path::{PathStepper, TurbulentPath};
use crate::pupil::Pupil;
use crate::source::Source;
use crate::theory;

/// A transmitter, a turbulent path and an optional receiving aperture,
/// wired to one spectral backend.
///
/// Ownership is explicit: the channel owns its parts and hands out a
/// [`PathStepper`] when a caller wants the intermediate fields of a
/// traversal instead of just the receiver-plane output.
pub struct Channel {
    grid: RectGrid,
    source: Box<dyn Source>,
    path: TurbulentPath,
    pupil: Option<Box<dyn Pupil>>,
    backend: Arc<dyn SpectralBackend>,
    last_output: Option<Array2<Complex64>>,
}

impl Channel {
    pub fn new(
        source: Box<dyn Source>,
        path: TurbulentPath,
        backend: Arc<dyn SpectralBackend>,
    ) -> Result<Self, ChannelError> {
        let grid = *source.grid();
        if path.grid() != grid {
            return Err(ChannelError::Config(format!(
                "source grid {}x{} does not match the path grid {}x{}",
                grid.nx(),
                grid.ny(),
                path.grid().nx(),
                path.grid().ny()
            )));
        }
        Ok(Self {
            grid,
            source,
            path,
            pupil: None,
            backend,
            last_output: None,
        })
    }

    pub fn with_pupil(mut self, pupil: Box<dyn Pupil>) -> Result<Self, ChannelError> {
        if *pupil.grid() != self.grid {
            return Err(ChannelError::Config(
                "pupil grid does not match the channel grid".into(),
            ));
        }
        self.pupil = Some(pupil);
        Ok(self)
    }

    pub fn grid(&self) -> &RectGrid {
        &self.grid
    }

    pub fn wavenumber(&self) -> f64 {
        self.source.wavenumber()
    }

    pub fn path(&self) -> &TurbulentPath {
        &self.path
    }

    pub fn has_pupil(&self) -> bool {
        self.pupil.is_some()
    }

    /// The transmitted field, before any propagation.
    pub fn source_field(&self) -> Array2<Complex64> {
        self.source.output()
    }

    /// Receiver-plane field of the most recent [`run`](Channel::run),
    /// before any pupil.
    pub fn last_output(&self) -> Option<&Array2<Complex64>> {
        self.last_output.as_ref()
    }

    /// Mask `field` with the channel pupil.
    pub fn apply_pupil(
        &self,
        field: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>, ChannelError> {
        match &self.pupil {
            Some(p) => Ok(p.output(field)),
            None => Err(ChannelError::Config(
                "channel has no pupil configured".into(),
            )),
        }
    }

    /// Reset path state for a fresh statistical trial.
    pub fn reset_trial(&mut self, rng: &mut StdRng) {
        self.path.reset_trial(rng);
    }

    /// Plane-wave Rytov variance of this link,
    /// `1.23 Cn^2 k^(7/6) L^(11/6)`, from the first slab's spectrum.
    pub fn rytov_variance(&self) -> f64 {
        theory::rytov_variance(
            self.path.model().cn2(),
            self.wavenumber(),
            self.path.length(),
        )
    }

    /// One full traversal with a fresh source field. The pre-pupil output
    /// is retained; `through_pupil` additionally masks the returned field
    /// and requires a configured pupil.
    pub fn run(
        &mut self,
        rng: &mut StdRng,
        through_pupil: bool,
    ) -> Result<Array2<Complex64>, ChannelError> {
        if through_pupil && self.pupil.is_none() {
            return Err(ChannelError::Config(
                "channel has no pupil configured".into(),
            ));
        }
        let input = self.source.output();
        let wavenumber = self.source.wavenumber();
        let output = self
            .path
            .output(self.backend.as_ref(), wavenumber, input, rng)?;
        self.last_output = Some(output.clone());
        match (&self.pupil, through_pupil) {
            (Some(p), true) => Ok(p.output(&output)),
            _ => Ok(output),
        }
    }

    /// Begin a step-by-step traversal with a fresh source field.
    pub fn stepper<'a>(
        &'a mut self,
        rng: &'a mut StdRng,
    ) -> Result<PathStepper<'a>, ChannelError> {
        let input = self.source.output();
        let wavenumber = self.source.wavenumber();
        let Self { path, backend, .. } = self;
        path.stepper(&**backend, wavenumber, input, rng)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("grid", &self.grid)
            .field("source", &self.source)
            .field("path", &self.path)
            .field("pupil", &self.pupil)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::LogPolarGrid;
    use crate::path::SlabPlacement;
    use crate::pupil::CirclePupil;
    use crate::screens::SparseScreen;
    use crate::source::PlaneSource;
    use crate::turbulence::ModifiedVonKarman;
    use aeris_compute::CpuBackend;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    const WAVELENGTH: f64 = 808e-9;

    fn quiet_channel(loss_db: f64) -> Channel {
        let grid = RectGrid::new(16, 1e-3).unwrap();
        let model = Arc::new(ModifiedVonKarman::new(5e-14, 6e-3, 0.5).unwrap());
        let fgrid = LogPolarGrid::new(16, 0.05, 800.0).unwrap();
        let screen =
            SparseScreen::new(grid, fgrid, model, 2.0 * PI / WAVELENGTH, 0.0).unwrap();
        let path =
            TurbulentPath::identical(screen, 500.0, 2, SlabPlacement::Middle, loss_db).unwrap();
        let source = PlaneSource::uniform(grid, WAVELENGTH).unwrap();
        Channel::new(Box::new(source), path, Arc::new(CpuBackend::new())).unwrap()
    }

    #[test]
    fn a_quiet_path_only_attenuates() {
        let mut channel = quiet_channel(3.0);
        let mut rng = StdRng::seed_from_u64(1);
        let out = channel.run(&mut rng, false).unwrap();
        let expected = 10f64.powf(-3.0 / 20.0);
        for v in out.iter() {
            assert_relative_eq!(v.norm(), expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn the_pre_pupil_output_is_retained() {
        let grid = RectGrid::new(16, 1e-3).unwrap();
        let mut channel = quiet_channel(0.0)
            .with_pupil(Box::new(CirclePupil::new(grid, 3e-3).unwrap()))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let masked = channel.run(&mut rng, true).unwrap();
        assert_eq!(masked[[0, 0]], Complex64::new(0.0, 0.0));
        let retained = channel.last_output().unwrap();
        assert!(retained[[0, 0]].norm() > 0.9);
    }

    #[test]
    fn asking_for_a_missing_pupil_is_an_error() {
        let mut channel = quiet_channel(0.0);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(channel.run(&mut rng, true).is_err());
        assert!(channel
            .apply_pupil(&Array2::from_elem((16, 16), Complex64::new(1.0, 0.0)))
            .is_err());
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let grid = RectGrid::new(16, 1e-3).unwrap();
        let other = RectGrid::new(32, 1e-3).unwrap();
        let model = Arc::new(ModifiedVonKarman::new(5e-14, 6e-3, 0.5).unwrap());
        let fgrid = LogPolarGrid::new(16, 0.05, 800.0).unwrap();
        let screen =
            SparseScreen::new(grid, fgrid, model, 2.0 * PI / WAVELENGTH, 0.0).unwrap();
        let path =
            TurbulentPath::identical(screen, 500.0, 2, SlabPlacement::Middle, 0.0).unwrap();
        let source = PlaneSource::uniform(other, WAVELENGTH).unwrap();
        assert!(Channel::new(Box::new(source), path, Arc::new(CpuBackend::new())).is_err());

        let channel = quiet_channel(0.0);
        assert!(channel
            .with_pupil(Box::new(CirclePupil::new(other, 3e-3).unwrap()))
            .is_err());
    }

    #[test]
    fn rytov_variance_follows_the_link_formula() {
        let channel = quiet_channel(0.0);
        let k = 2.0 * PI / WAVELENGTH;
        let expected = 1.23 * 5e-14 * k.powf(7.0 / 6.0) * 500f64.powf(11.0 / 6.0);
        assert_relative_eq!(channel.rytov_variance(), expected, max_relative = 1e-12);
    }

    #[test]
    fn the_stepper_exposes_intermediate_fields() {
        let mut channel = quiet_channel(0.0);
        let mut rng = StdRng::seed_from_u64(5);
        let mut stepper = channel.stepper(&mut rng).unwrap();
        let mut steps = 0;
        while let Some(step) = stepper.advance().unwrap() {
            steps += 1;
            let _ = step.position;
            assert_eq!(stepper.field().dim(), (16, 16));
        }
        assert_eq!(steps, 3);
    }
}
