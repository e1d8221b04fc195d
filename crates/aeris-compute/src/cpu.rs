//! CPU spectral backend using rustfft, with Rayon across row batches.

use std::sync::{Arc, Mutex};

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::backend::{fftshift2, ifftshift2, ComputeError, DeviceInfo, SpectralBackend};

/// CPU backend that reuses planned transforms and runs the row pass of each
/// 2-D transform in parallel across threads.
pub struct CpuBackend {
    planner: Mutex<FftPlanner<f64>>,
    num_threads: usize,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
            num_threads: rayon::current_num_threads(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    fn plan(&self, len: usize, inverse: bool) -> Result<Arc<dyn Fft<f64>>, ComputeError> {
        let mut planner = self
            .planner
            .lock()
            .map_err(|_| ComputeError::DeviceError("FFT planner lock poisoned".into()))?;
        Ok(if inverse {
            planner.plan_fft_inverse(len)
        } else {
            planner.plan_fft_forward(len)
        })
    }

    /// Unnormalized 2-D DFT: a row pass followed by a column pass done as a
    /// second row pass over the transposed array.
    fn transform2(
        &self,
        a: &Array2<Complex64>,
        inverse: bool,
    ) -> Result<Array2<Complex64>, ComputeError> {
        let (nr, nc) = a.dim();
        if nr == 0 || nc == 0 {
            return Err(ComputeError::EmptyArray);
        }
        let mut rows = a.as_standard_layout().into_owned();
        Self::run_rows(&self.plan(nc, inverse)?, &mut rows)?;
        let mut cols = rows.t().as_standard_layout().into_owned();
        Self::run_rows(&self.plan(nr, inverse)?, &mut cols)?;
        Ok(cols.t().as_standard_layout().into_owned())
    }

    fn run_rows(plan: &Arc<dyn Fft<f64>>, a: &mut Array2<Complex64>) -> Result<(), ComputeError> {
        let len = a.ncols();
        let slice = a
            .as_slice_mut()
            .ok_or_else(|| ComputeError::DeviceError("non-contiguous transform buffer".into()))?;
        slice
            .par_chunks_exact_mut(len)
            .for_each(|row| plan.process(row));
        Ok(())
    }
}

impl SpectralBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            compute_units: Some(self.num_threads),
        }
    }

    fn fft2(
        &self,
        field: &Array2<Complex64>,
        delta: f64,
    ) -> Result<Array2<Complex64>, ComputeError> {
        let transformed = self.transform2(&fftshift2(field), false)?;
        let mut out = fftshift2(&transformed);
        let scale = delta * delta;
        out.mapv_inplace(|v| v * scale);
        Ok(out)
    }

    fn ifft2(
        &self,
        spectrum: &Array2<Complex64>,
        delta_f: f64,
    ) -> Result<Array2<Complex64>, ComputeError> {
        let transformed = self.transform2(&ifftshift2(spectrum), true)?;
        let mut out = ifftshift2(&transformed);
        let (nr, nc) = out.dim();
        // (N·δf)² on top of the 1/(nr·nc) inverse-DFT normalization.
        let scale = (nr as f64 * delta_f).powi(2) / (nr as f64 * nc as f64);
        out.mapv_inplace(|v| v * scale);
        Ok(out)
    }
}
