//! Magnitude and flux conversions.
//!
//! All conversions follow from the definition of the magnitude scale,
//!
//! ```text
//! m = -2.5 log10(F) + C
//! ```
//!
//! where `C` is the zeropoint of the magnitude system.

use std::f64::consts::LN_10;

use crate::error::{Error, Result};

/// Speed of light used for F_lambda to F_nu conversion, m/s.
const SPEED_OF_LIGHT_M_S: f64 = 3.0e8;

/// Angstrom to metre.
const ANGSTROM_M: f64 = 1.0e-10;

/// Flux corresponding to a magnitude, `F = 10^((C - m) / 2.5)`.
pub fn mag_to_flux(mag: f64, zeropoint: f64) -> f64 {
    10f64.powf((zeropoint - mag) / 2.5)
}

/// Magnitude corresponding to a flux with the given zeropoint.
///
/// Returns NaN for zero, negative or NaN flux.
pub fn flux_to_mag(flux: f64, zeropoint: f64) -> f64 {
    if !(flux > 0.0) {
        return f64::NAN;
    }
    -2.5 * flux.log10() + zeropoint
}

/// Fractional flux error corresponding to a magnitude error.
///
/// From `dm = -2.5 / ln(10) * dF / F`; the sign only says brighter means smaller
/// magnitudes and is dropped.
pub fn mag_errors_to_percent_flux_errors(mag_error: f64) -> f64 {
    mag_error * (LN_10 / 2.5)
}

/// Magnitude error corresponding to a fractional flux error.
pub fn percent_flux_errors_to_mag_errors(percent_flux_error: f64) -> f64 {
    (2.5 / LN_10) * percent_flux_error
}

/// Convert F_lambda (erg/s/cm^2/Angstrom) to F_nu (erg/s/cm^2/Hz).
///
/// `wavelengths` are in Angstrom and must pair one-to-one with `fls`.
pub fn fl_to_fv(fls: &[f64], wavelengths: &[f64]) -> Result<Vec<f64>> {
    if fls.len() != wavelengths.len() {
        return Err(Error::invalid_input(format!(
            "{} fluxes but {} wavelengths",
            fls.len(),
            wavelengths.len()
        )));
    }
    Ok(fls
        .iter()
        .zip(wavelengths)
        .map(|(&fl, &wavelength)| ANGSTROM_M * wavelength * wavelength * fl / SPEED_OF_LIGHT_M_S)
        .collect())
}
