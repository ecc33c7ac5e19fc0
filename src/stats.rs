//! Fit statistics and the Gaussian density.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{Error, Result};

/// Reduced chi-squared of a model against data with errors.
///
/// ```text
/// chi2     = sum_k ((model_k - data_k) / error_k)^2
/// chi2_red = chi2 / n
/// ```
///
/// `n` is the number of data points. The three slices must have the same,
/// non-zero length.
pub fn reduced_chi_sq(model: &[f64], data: &[f64], errors: &[f64]) -> Result<f64> {
    if model.len() != data.len() || data.len() != errors.len() {
        return Err(Error::invalid_input(format!(
            "model, data, and errors need the same length (got {}, {}, {})",
            model.len(),
            data.len(),
            errors.len()
        )));
    }
    if data.is_empty() {
        return Err(Error::invalid_input("reduced chi-squared of zero data points"));
    }
    let chi_sq: f64 = model
        .iter()
        .zip(data)
        .zip(errors)
        .map(|((m, d), e)| ((m - d) / e).powi(2))
        .sum();
    Ok(chi_sq / data.len() as f64)
}

/// Gaussian density at `x`, `A exp(-(x - mean)^2 / (2 sigma^2))`.
///
/// When `amplitude` is `None` the Gaussian is normalized to unit area,
/// `A = 1 / (sigma sqrt(2 pi))`.
pub fn gaussian(x: f64, mean: f64, sigma: f64, amplitude: Option<f64>) -> f64 {
    let amplitude =
        amplitude.unwrap_or_else(|| 1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt()));
    amplitude * (-(x - mean).powi(2) / (2.0 * sigma * sigma)).exp()
}

/// Parameters for [`fit_gaussian`].
#[derive(Debug, Clone)]
pub struct GaussianFitConfig {
    /// Histogram bin count. `None` uses `sqrt(n)` clamped to `[5, 100]`.
    pub bins: Option<usize>,
    /// Histogram half-width around the clipped mean, in clipped sigmas. Default 3.0.
    pub range_sigma: f64,
    /// Sigma-clip rejection threshold used to find the core. Default 3.0.
    pub clip_sigma: f64,
    /// Maximum sigma-clip iterations. Default 5.
    pub clip_iterations: usize,
}

impl Default for GaussianFitConfig {
    fn default() -> Self {
        Self {
            bins: None,
            range_sigma: 3.0,
            clip_sigma: 3.0,
            clip_iterations: 5,
        }
    }
}

/// A Gaussian fitted to a histogram of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub mean: f64,
    pub sigma: f64,
    /// Peak height, in samples per histogram bin.
    pub amplitude: f64,
    /// Width of the histogram bins the amplitude refers to.
    pub bin_width: f64,
    /// Number of samples inside the histogram range.
    pub n_used: usize,
}

/// Fit a Gaussian to the distribution of `samples`.
///
/// The core of the distribution is located by iterative sigma clipping and
/// histogrammed; a weighted least-squares parabola through the log of the bin
/// counts then gives the mean, width and height. Non-finite samples are
/// ignored. Fails when fewer than three bins are populated or the counts are
/// not peaked.
pub fn fit_gaussian(samples: &[f64], config: &GaussianFitConfig) -> Result<GaussianFit> {
    let mut values: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if values.len() < 3 {
        return Err(Error::invalid_input(format!(
            "need at least 3 finite samples for a Gaussian fit, got {}",
            values.len()
        )));
    }

    let (center, spread) = sigma_clipped_stats(&mut values, config.clip_sigma, config.clip_iterations);
    if !(spread > 0.0) {
        return Err(Error::invalid_input("samples have no spread"));
    }

    let lo = center - config.range_sigma * spread;
    let hi = center + config.range_sigma * spread;
    let in_range: Vec<f64> = samples
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v >= lo && *v <= hi)
        .collect();
    let nbins = config
        .bins
        .unwrap_or_else(|| ((in_range.len() as f64).sqrt().round() as usize).clamp(5, 100))
        .max(3);
    let bin_width = (hi - lo) / nbins as f64;

    let mut counts = vec![0usize; nbins];
    for v in &in_range {
        let bin = (((v - lo) / bin_width).floor() as usize).min(nbins - 1);
        counts[bin] += 1;
    }

    // Bin centres in units of the clipped spread keep the normal equations well conditioned.
    let populated: Vec<(f64, f64)> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .map(|(i, &c)| {
            let x = lo + (i as f64 + 0.5) * bin_width;
            ((x - center) / spread, c as f64)
        })
        .collect();
    if populated.len() < 3 {
        return Err(Error::invalid_input(format!(
            "only {} populated histogram bins; cannot fit a Gaussian",
            populated.len()
        )));
    }

    // ln(count) = c0 + c1 u + c2 u^2, weighted by sqrt(count) (Poisson error on the log).
    let mut a_mat = DMatrix::<f64>::zeros(populated.len(), 3);
    let mut b_vec = DVector::<f64>::zeros(populated.len());
    for (row, &(u, count)) in populated.iter().enumerate() {
        let w = count.sqrt();
        a_mat[(row, 0)] = w;
        a_mat[(row, 1)] = w * u;
        a_mat[(row, 2)] = w * u * u;
        b_vec[row] = w * count.ln();
    }
    let svd = a_mat.svd(true, true);
    let coeffs = svd
        .solve(&b_vec, 1e-12)
        .map_err(|e| Error::invalid_input(format!("Gaussian least-squares failed: {e}")))?;
    let (c0, c1, c2) = (coeffs[0], coeffs[1], coeffs[2]);
    if !(c2 < 0.0) {
        return Err(Error::invalid_input(
            "histogram is not peaked; cannot fit a Gaussian",
        ));
    }

    let mean_u = -c1 / (2.0 * c2);
    let sigma_u = (-1.0 / (2.0 * c2)).sqrt();
    let fit = GaussianFit {
        mean: center + mean_u * spread,
        sigma: sigma_u * spread,
        amplitude: (c0 - c1 * c1 / (4.0 * c2)).exp(),
        bin_width,
        n_used: in_range.len(),
    };
    debug!(
        "Gaussian fit: mean={:.4}, sigma={:.4}, amplitude={:.1} ({} samples, {} bins)",
        fit.mean, fit.sigma, fit.amplitude, fit.n_used, nbins
    );
    Ok(fit)
}

/// Iteratively sigma-clipped mean and standard deviation.
///
/// `values` is used as scratch space and ends up holding the surviving samples.
fn sigma_clipped_stats(values: &mut Vec<f64>, clip_sigma: f64, iterations: usize) -> (f64, f64) {
    let mut mean = 0.0;
    let mut sigma = 0.0;
    for _ in 0..iterations.max(1) {
        if values.is_empty() {
            break;
        }
        let n = values.len() as f64;
        mean = values.iter().sum::<f64>() / n;
        sigma = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if sigma < 1e-300 {
            break;
        }
        let lo = mean - clip_sigma * sigma;
        let hi = mean + clip_sigma * sigma;
        let before = values.len();
        values.retain(|&v| v >= lo && v <= hi);
        if values.len() == before {
            break;
        }
    }
    (mean, sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn chi_sq_of_perfect_model_is_zero() {
        let data = [1.0, 2.0, 3.0];
        assert_eq!(reduced_chi_sq(&data, &data, &[0.1, 0.1, 0.1]).unwrap(), 0.0);
    }

    #[test]
    fn chi_sq_divides_by_point_count() {
        let value = reduced_chi_sq(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], &[1.0, 1.0, 2.0]).unwrap();
        assert_relative_eq!(value, 2.0 / 3.0);
    }

    #[test]
    fn chi_sq_length_mismatch() {
        assert!(matches!(
            reduced_chi_sq(&[1.0, 2.0], &[1.0], &[1.0, 1.0]),
            Err(Error::InvalidInput(_))
        ));
        assert!(reduced_chi_sq(&[], &[], &[]).is_err());
    }

    #[test]
    fn normalized_gaussian_peak_and_area() {
        let sigma = 2.0;
        let peak = gaussian(1.0, 1.0, sigma, None);
        assert_relative_eq!(peak, 1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt()));

        let dx = 0.001;
        let area: f64 = (-20_000..20_000)
            .map(|i| gaussian(1.0 + i as f64 * dx, 1.0, sigma, None) * dx)
            .sum();
        assert_relative_eq!(area, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn explicit_amplitude_sets_peak() {
        assert_relative_eq!(gaussian(3.0, 3.0, 0.5, Some(7.0)), 7.0);
        assert_relative_eq!(gaussian(3.5, 3.0, 0.5, Some(7.0)), 7.0 * (-0.5f64).exp());
    }

    #[test]
    fn fit_recovers_normal_sample() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(100.0, 5.0).unwrap();
        let mut samples: Vec<f64> = (0..20_000).map(|_| normal.sample(&mut rng)).collect();
        // A few wild outliers should be clipped away.
        samples.extend([1e4, -1e4, 5e3, f64::NAN]);

        let fit = fit_gaussian(&samples, &GaussianFitConfig::default()).unwrap();
        assert!((fit.mean - 100.0).abs() < 0.3, "mean {}", fit.mean);
        assert!((fit.sigma - 5.0).abs() < 0.25, "sigma {}", fit.sigma);

        // Peak height agrees with the expected count per bin.
        let expected_peak = fit.n_used as f64 * fit.bin_width / (5.0 * (2.0 * std::f64::consts::PI).sqrt());
        assert!((fit.amplitude / expected_peak - 1.0).abs() < 0.1);
    }

    #[test]
    fn fit_rejects_degenerate_samples() {
        let config = GaussianFitConfig::default();
        assert!(fit_gaussian(&[1.0, 2.0], &config).is_err());
        assert!(fit_gaussian(&[4.0; 50], &config).is_err());
    }
}
