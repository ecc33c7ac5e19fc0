//! Positions on the celestial sphere and the great-circle separation between them.

use nalgebra::Vector3;

use crate::error::{Error, Result};

pub const ARCSEC_PER_DEG: f64 = 3600.0;
pub const ARCSEC_PER_RAD: f64 = 180.0 * 3600.0 / std::f64::consts::PI;

/// A point on the celestial sphere, right ascension and declination in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyPosition {
    /// Build a validated position.
    ///
    /// RA must lie in `[0, 360]` and Dec in `[-90, 90]`, both finite.
    pub fn new(ra_deg: f64, dec_deg: f64) -> Result<Self> {
        if let Some(reason) = ra_problem(ra_deg).or_else(|| dec_problem(dec_deg)) {
            return Err(Error::invalid_input(reason));
        }
        Ok(Self { ra_deg, dec_deg })
    }

    /// Unit vector pointing to the position on the celestial sphere.
    pub fn uvec(&self) -> Vector3<f64> {
        radec_to_uvec(self.ra_deg.to_radians(), self.dec_deg.to_radians())
    }

    /// Great-circle separation to `other`, in arcseconds.
    pub fn separation_arcsec(&self, other: &SkyPosition) -> f64 {
        angular_separation_arcsec(self, other)
    }
}

/// Great-circle separation between two positions, in arcseconds.
///
/// Uses the Vincenty (atan2) form, which stays accurate for both tiny and
/// near-antipodal separations. Valid across the poles and the RA 0/360 seam.
pub fn angular_separation_arcsec(p: &SkyPosition, q: &SkyPosition) -> f64 {
    angular_separation_rad(
        p.ra_deg.to_radians(),
        p.dec_deg.to_radians(),
        q.ra_deg.to_radians(),
        q.dec_deg.to_radians(),
    ) * ARCSEC_PER_RAD
}

/// Great-circle separation in radians; all inputs in radians.
pub fn angular_separation_rad(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (sin_dra, cos_dra) = (ra2 - ra1).sin_cos();
    let (sin_d1, cos_d1) = dec1.sin_cos();
    let (sin_d2, cos_d2) = dec2.sin_cos();

    let t1 = cos_d2 * sin_dra;
    let t2 = cos_d1 * sin_d2 - sin_d1 * cos_d2 * cos_dra;
    let num = (t1 * t1 + t2 * t2).sqrt();
    let den = sin_d1 * sin_d2 + cos_d1 * cos_d2 * cos_dra;
    num.atan2(den)
}

pub(crate) fn radec_to_uvec(ra_rad: f64, dec_rad: f64) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra_rad.sin_cos();
    let (sin_dec, cos_dec) = dec_rad.sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

/// Describe why `ra_deg` is not a usable right ascension, if it isn't.
pub(crate) fn ra_problem(ra_deg: f64) -> Option<String> {
    if !ra_deg.is_finite() {
        Some(format!("right ascension {ra_deg} is not finite"))
    } else if !(0.0..=360.0).contains(&ra_deg) {
        Some(format!("right ascension {ra_deg} outside [0, 360]"))
    } else {
        None
    }
}

/// Describe why `dec_deg` is not a usable declination, if it isn't.
pub(crate) fn dec_problem(dec_deg: f64) -> Option<String> {
    if !dec_deg.is_finite() {
        Some(format!("declination {dec_deg} is not finite"))
    } else if !(-90.0..=90.0).contains(&dec_deg) {
        Some(format!("declination {dec_deg} outside [-90, 90]"))
    } else {
        None
    }
}
