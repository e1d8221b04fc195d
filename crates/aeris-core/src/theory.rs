//! Closed-form link statistics.
//!
//! Reference expressions the simulation results are checked against:
//! Rytov variance, atmospheric coherence radii and the strong-fluctuation
//! scintillation asymptotics. The asymptotics are only quoted inside
//! their validity region and refuse to evaluate outside it.

use crate::error::TheoryError;

/// Plane-wave Rytov variance `1.23 Cn^2 k^(7/6) L^(11/6)`.
pub fn rytov_variance(cn2: f64, wavenumber: f64, length: f64) -> f64 {
    1.23 * cn2 * wavenumber.powf(7.0 / 6.0) * length.powf(11.0 / 6.0)
}

/// Plane-wave coherence radius `(0.423 k^2 Cn^2 L)^(-3/5)` for a uniform
/// `Cn^2` link.
pub fn coherence_radius_plane(cn2: f64, wavenumber: f64, length: f64) -> f64 {
    (0.423 * wavenumber * wavenumber * cn2 * length).powf(-3.0 / 5.0)
}

/// Spherical-wave coherence radius for a uniform `Cn^2` link; the path
/// weighting contributes the factor `3/8`.
pub fn coherence_radius_spherical(cn2: f64, wavenumber: f64, length: f64) -> f64 {
    (0.423 * wavenumber * wavenumber * cn2 * (3.0 / 8.0) * length).powf(-3.0 / 5.0)
}

/// Inner-scale frequency parameter `Ql = 10.89 L / (k l0^2)`.
pub fn inner_scale_parameter(length: f64, wavenumber: f64, inner_scale: f64) -> f64 {
    10.89 * length / (wavenumber * inner_scale * inner_scale)
}

/// Saturation-regime scintillation index for a Gaussian beam with
/// receiver parameter `Theta`, ignoring inner-scale effects:
///
/// ```text
/// SI = 1 + (0.86 + 1.87 (1 - Theta)) / (sigma_R^2)^(2/5).
/// ```
///
/// Valid for `sigma_R^2 >= 1`.
pub fn si_saturated(rytov2: f64, theta: f64) -> Result<f64, TheoryError> {
    if !rytov2.is_finite() || rytov2 <= 0.0 || !theta.is_finite() {
        return Err(TheoryError::InvalidParameter(format!(
            "sigma_R^2 = {rytov2}, Theta = {theta}"
        )));
    }
    if rytov2 < 1.0 {
        return Err(TheoryError::OutsideValidity(format!(
            "saturation asymptotic needs sigma_R^2 >= 1, got {rytov2}"
        )));
    }
    Ok(1.0 + (0.86 + 1.87 * (1.0 - theta)) / rytov2.powf(2.0 / 5.0))
}

/// Saturation-regime scintillation index including the inner-scale
/// parameter `Ql`:
///
/// ```text
/// SI = 1 + (2.39 + 5.26 (1 - Theta)) / (sigma_R^2 Ql^(7/6))^(1/6).
/// ```
///
/// Valid for `sigma_R^2 Ql^(7/6) >= 100`.
pub fn si_saturated_inner_scale(
    rytov2: f64,
    theta: f64,
    ql: f64,
) -> Result<f64, TheoryError> {
    if !rytov2.is_finite() || rytov2 <= 0.0 || !theta.is_finite() {
        return Err(TheoryError::InvalidParameter(format!(
            "sigma_R^2 = {rytov2}, Theta = {theta}"
        )));
    }
    if !ql.is_finite() || ql <= 0.0 {
        return Err(TheoryError::InvalidParameter(format!("Ql = {ql}")));
    }
    let strength = rytov2 * ql.powf(7.0 / 6.0);
    if strength < 100.0 {
        return Err(TheoryError::OutsideValidity(format!(
            "inner-scale asymptotic needs sigma_R^2 Ql^(7/6) >= 100, got {strength:.3}"
        )));
    }
    Ok(1.0 + (2.39 + 5.26 * (1.0 - theta)) / strength.powf(1.0 / 6.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    const WAVENUMBER: f64 = 2.0 * PI / 808e-9;

    #[test]
    fn rytov_variance_scales_with_length() {
        let one = rytov_variance(1e-15, WAVENUMBER, 1000.0);
        let two = rytov_variance(1e-15, WAVENUMBER, 2000.0);
        assert_relative_eq!(two / one, 2f64.powf(11.0 / 6.0), max_relative = 1e-12);
    }

    #[test]
    fn spherical_coherence_exceeds_plane_coherence() {
        let plane = coherence_radius_plane(1e-15, WAVENUMBER, 1000.0);
        let spherical = coherence_radius_spherical(1e-15, WAVENUMBER, 1000.0);
        assert_relative_eq!(
            spherical / plane,
            (3.0 / 8.0f64).powf(-3.0 / 5.0),
            max_relative = 1e-12,
        );
        assert!(spherical > plane);
    }

    #[test]
    fn saturated_si_decays_toward_unity() {
        let near = si_saturated(1.5, 1.0).unwrap();
        let deep = si_saturated(100.0, 1.0).unwrap();
        assert!(near > deep);
        assert!(deep > 1.0);
        assert_relative_eq!(
            si_saturated(4.0, 1.0).unwrap(),
            1.0 + 0.86 / 4f64.powf(0.4),
            max_relative = 1e-12,
        );
    }

    #[test]
    fn asymptotics_refuse_their_invalid_regions() {
        assert!(matches!(
            si_saturated(0.5, 1.0),
            Err(TheoryError::OutsideValidity(_))
        ));
        assert!(matches!(
            si_saturated(-1.0, 1.0),
            Err(TheoryError::InvalidParameter(_))
        ));
        assert!(matches!(
            si_saturated_inner_scale(1.0, 1.0, 1.0),
            Err(TheoryError::OutsideValidity(_))
        ));
        assert!(matches!(
            si_saturated_inner_scale(1.0, 1.0, -2.0),
            Err(TheoryError::InvalidParameter(_))
        ));
    }

    #[test]
    fn inner_scale_asymptotic_evaluates_in_regime() {
        let ql = inner_scale_parameter(2000.0, WAVENUMBER, 5e-3);
        let si = si_saturated_inner_scale(2.0, 0.4, ql).unwrap();
        assert!(si > 1.0);
        let strength = 2.0 * ql.powf(7.0 / 6.0);
        assert_relative_eq!(
            si,
            1.0 + (2.39 + 5.26 * 0.6) / strength.powf(1.0 / 6.0),
            max_relative = 1e-12,
        );
    }
}
