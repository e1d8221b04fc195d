//! Link statistics derived from accumulated records.
//!
//! Every function here consumes the record buffer of one or two
//! measures and reduces it to a published beam statistic: scintillation
//! index, wandering and width radii, or temporal correlations. They are
//! pure and total over well-formed buffers; mixed record kinds, ragged
//! series or too few trials surface as
//! [`SimulationError::Aggregation`].

use crate::error::SimulationError;
use crate::measure::Record;

/// A radius estimate with its standard error.
///
/// Radii are estimated as `sqrt(mean v)` over per-trial squared values
/// `v`, and the error follows by the delta method,
///
/// ```text
/// d width = (std(v) / sqrt(n)) / (2 width)
/// ```
///
/// with the sample standard deviation taken at `n - 1` degrees of
/// freedom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthEstimate {
    pub width: f64,
    pub std_error: f64,
    pub samples: usize,
}

/// Scintillation index `<I^2> / <I>^2 - 1` of scalar intensity records.
pub fn scintillation_index(records: &[Record]) -> Result<f64, SimulationError> {
    let values = scalars(records)?;
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return Err(SimulationError::Aggregation(
            "the mean intensity is zero".into(),
        ));
    }
    let mean_sq = values.iter().map(|v| v * v).sum::<f64>() / n;
    Ok(mean_sq / (mean * mean) - 1.0)
}

/// Scintillation index per path slot, from per-trial series records.
pub fn scintillation_profile(records: &[Record]) -> Result<Vec<f64>, SimulationError> {
    let rows = series_rows(records)?;
    let slots = rows[0].len();
    (0..slots)
        .map(|j| {
            let column: Vec<Record> =
                rows.iter().map(|row| Record::Scalar(row[j])).collect();
            scintillation_index(&column)
        })
        .collect()
}

/// Beam wandering radius `sqrt(<x^2>)` from per-trial centroid records.
pub fn beam_wandering(centroids: &[Record]) -> Result<WidthEstimate, SimulationError> {
    let values = scalars(centroids)?;
    width_from_squares(values.iter().map(|x| x * x).collect())
}

/// Long-term beam radius `sqrt(<4 x2>)` from per-trial second-moment
/// records.
pub fn long_term_width(second_moments: &[Record]) -> Result<WidthEstimate, SimulationError> {
    let values = scalars(second_moments)?;
    width_from_squares(values.iter().map(|x2| 4.0 * x2).collect())
}

/// Short-term beam radius with the wander subtracted per trial,
/// `sqrt(<4 x2 - 4 x^2>)`.
pub fn short_term_width(
    second_moments: &[Record],
    centroids: &[Record],
) -> Result<WidthEstimate, SimulationError> {
    let x2 = scalars(second_moments)?;
    let x = scalars(centroids)?;
    if x2.len() != x.len() {
        return Err(SimulationError::Aggregation(format!(
            "{} second moments against {} centroids",
            x2.len(),
            x.len()
        )));
    }
    width_from_squares(
        x2.iter()
            .zip(&x)
            .map(|(x2, x)| 4.0 * x2 - 4.0 * x * x)
            .collect(),
    )
}

/// Pearson correlation of each time sample against the first, from
/// per-trial time-series records. The zeroth entry is 1 by
/// construction.
pub fn time_coherence(records: &[Record]) -> Result<Vec<f64>, SimulationError> {
    let rows = series_rows(records)?;
    let samples = rows[0].len();
    let column = |j: usize| rows.iter().map(|row| row[j]).collect::<Vec<f64>>();
    let first = column(0);
    (0..samples).map(|j| pearson(&first, &column(j))).collect()
}

/// Wander correlation radius `2 sqrt(|<x(0) x(t)>|)` per time sample,
/// from per-trial centroid time series.
pub fn wander_correlation(records: &[Record]) -> Result<Vec<f64>, SimulationError> {
    let rows = series_rows(records)?;
    let samples = rows[0].len();
    let trials = rows.len() as f64;
    Ok((0..samples)
        .map(|j| {
            let mean = rows.iter().map(|row| row[0] * row[j]).sum::<f64>() / trials;
            2.0 * mean.abs().sqrt()
        })
        .collect())
}

/// Radius and delta-method error from per-trial squared values.
fn width_from_squares(values: Vec<f64>) -> Result<WidthEstimate, SimulationError> {
    let n = values.len();
    if n < 2 {
        return Err(SimulationError::Aggregation(format!(
            "a width estimate needs at least two trials, got {n}"
        )));
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if mean <= 0.0 {
        return Err(SimulationError::Aggregation(format!(
            "squared widths average to {mean}, no real radius"
        )));
    }
    let width = mean.sqrt();
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    let std_error = (var / n as f64).sqrt() / (2.0 * width);
    Ok(WidthEstimate {
        width,
        std_error,
        samples: n,
    })
}

fn pearson(a: &[f64], b: &[f64]) -> Result<f64, SimulationError> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return Err(SimulationError::Aggregation(
            "a time sample has zero variance across trials".into(),
        ));
    }
    Ok(cov / (var_a * var_b).sqrt())
}

fn scalars(records: &[Record]) -> Result<Vec<f64>, SimulationError> {
    if records.is_empty() {
        return Err(SimulationError::Aggregation("no records".into()));
    }
    records
        .iter()
        .map(|r| {
            r.as_scalar().ok_or_else(|| {
                SimulationError::Aggregation("expected scalar records".into())
            })
        })
        .collect()
}

fn series_rows(records: &[Record]) -> Result<Vec<&[f64]>, SimulationError> {
    if records.is_empty() {
        return Err(SimulationError::Aggregation("no records".into()));
    }
    let rows = records
        .iter()
        .map(|r| {
            r.as_series().ok_or_else(|| {
                SimulationError::Aggregation("expected series records".into())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let len = rows[0].len();
    if len == 0 || rows.iter().any(|row| row.len() != len) {
        return Err(SimulationError::Aggregation(
            "series records must share one non-empty length".into(),
        ));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar_records(values: &[f64]) -> Vec<Record> {
        values.iter().map(|&v| Record::Scalar(v)).collect()
    }

    fn series_records(rows: &[&[f64]]) -> Vec<Record> {
        rows.iter().map(|row| Record::Series(row.to_vec())).collect()
    }

    #[test]
    fn a_steady_intensity_does_not_scintillate() {
        let si = scintillation_index(&scalar_records(&[2.0, 2.0, 2.0])).unwrap();
        assert_relative_eq!(si, 0.0);
    }

    #[test]
    fn scintillation_index_by_hand() {
        // I = [1, 3]: <I^2> = 5, <I>^2 = 4.
        let si = scintillation_index(&scalar_records(&[1.0, 3.0])).unwrap();
        assert_relative_eq!(si, 0.25);
    }

    #[test]
    fn the_profile_is_a_per_slot_index() {
        let records = series_records(&[&[1.0, 2.0], &[1.0, 4.0]]);
        let profile = scintillation_profile(&records).unwrap();
        assert_eq!(profile.len(), 2);
        assert_relative_eq!(profile[0], 0.0);
        assert_relative_eq!(profile[1], 10.0 / 9.0 - 1.0);
    }

    #[test]
    fn wandering_radius_by_hand() {
        // x = [1, 3]: v = [1, 9], mean 5, std sqrt(32).
        let estimate = beam_wandering(&scalar_records(&[1.0, 3.0])).unwrap();
        assert_relative_eq!(estimate.width, 5f64.sqrt());
        assert_relative_eq!(
            estimate.std_error,
            (32f64 / 2.0).sqrt() / (2.0 * 5f64.sqrt())
        );
        assert_eq!(estimate.samples, 2);
    }

    #[test]
    fn long_term_radius_by_hand() {
        // x2 = [1, 9]: v = [4, 36], mean 20, std sqrt(512).
        let estimate = long_term_width(&scalar_records(&[1.0, 9.0])).unwrap();
        assert_relative_eq!(estimate.width, 20f64.sqrt());
        assert_relative_eq!(
            estimate.std_error,
            (512f64 / 2.0).sqrt() / (2.0 * 20f64.sqrt())
        );
    }

    #[test]
    fn short_term_subtracts_the_wander_per_trial() {
        let estimate = short_term_width(
            &scalar_records(&[2.0, 10.0]),
            &scalar_records(&[1.0, 3.0]),
        )
        .unwrap();
        // v = [8 - 4, 40 - 36] = [4, 4].
        assert_relative_eq!(estimate.width, 2.0);
        assert_relative_eq!(estimate.std_error, 0.0);
    }

    #[test]
    fn perfectly_coherent_series_correlate_to_one() {
        let records = series_records(&[&[1.0, 2.0], &[2.0, 4.0], &[3.0, 6.0]]);
        let tc = time_coherence(&records).unwrap();
        assert_relative_eq!(tc[0], 1.0);
        assert_relative_eq!(tc[1], 1.0);
    }

    #[test]
    fn anticorrelated_series_reach_minus_one() {
        let records = series_records(&[&[1.0, -1.0], &[2.0, -2.0], &[3.0, -3.0]]);
        let tc = time_coherence(&records).unwrap();
        assert_relative_eq!(tc[1], -1.0);
    }

    #[test]
    fn wander_correlation_by_hand() {
        let records = series_records(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let corr = wander_correlation(&records).unwrap();
        // <x0 x0> = 5, <x0 x1> = 7.
        assert_relative_eq!(corr[0], 2.0 * 5f64.sqrt());
        assert_relative_eq!(corr[1], 2.0 * 7f64.sqrt());
    }

    #[test]
    fn degenerate_buffers_are_reported() {
        assert!(scintillation_index(&[]).is_err());
        assert!(scintillation_index(&scalar_records(&[0.0, 0.0])).is_err());
        assert!(scintillation_index(&[Record::Series(vec![1.0])]).is_err());
        assert!(beam_wandering(&scalar_records(&[1.0])).is_err());
        assert!(beam_wandering(&scalar_records(&[0.0, 0.0])).is_err());
        assert!(short_term_width(
            &scalar_records(&[1.0, 2.0]),
            &scalar_records(&[1.0])
        )
        .is_err());
        assert!(time_coherence(&series_records(&[&[1.0, 5.0], &[1.0, 7.0]])).is_err());
        assert!(series_rows(&[
            Record::Series(vec![1.0, 2.0]),
            Record::Series(vec![1.0])
        ])
        .is_err());
    }
}
