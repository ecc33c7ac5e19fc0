//! Spatial index over sky positions for cone and nearest-neighbour searches.
//!
//! `SkyIndex` bins points with an equal-area spherical grid: latitude is
//! partitioned into `3 * nside` bins in `z = sin(dec)`, and longitude into
//! `4 * nside` bins in right ascension, for a total of `12 * nside^2` cells.
//! Each cell maps to a compact slice of point indices.
//!
//! Query flow:
//! 1. Compute the cells intersecting the cone around a direction.
//! 2. Scan only the points in those cells.
//! 3. Apply exact angular filtering on the angle between unit vectors.
//!
//! Nearest-neighbour lookups run cone queries with a growing radius until the
//! best candidate is provably the global nearest.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::skycoord::{angular_separation_arcsec, SkyPosition, ARCSEC_PER_DEG, ARCSEC_PER_RAD};

// Widens cone tests slightly so float rounding never drops a boundary point.
const RADIUS_PAD_REL: f64 = 1e-9;
const RADIUS_PAD_ABS: f64 = 1e-12;

/// Largest accepted `nside` (786,432 cells).
pub const MAX_NSIDE: u32 = 256;

#[derive(Debug, Clone)]
pub struct SkyIndex {
    nside: u32,
    n_lat: u32,
    n_lon: u32,
    positions: Vec<SkyPosition>,
    uvecs: Vec<Vector3<f64>>,
    cell_offsets: Vec<u32>,
    point_indices: Vec<u32>,
}

impl SkyIndex {
    /// Build an index over owned positions.
    ///
    /// `nside` controls resolution and must lie in `1..=MAX_NSIDE`.
    /// The number of sky cells is `12 * nside^2`.
    pub fn new(nside: u32, positions: Vec<SkyPosition>) -> Result<Self> {
        if nside == 0 || nside > MAX_NSIDE {
            return Err(Error::invalid_input(format!(
                "sky index nside must be in 1..={MAX_NSIDE}, got {nside}"
            )));
        }
        let n_lat = 3 * nside;
        let n_lon = 4 * nside;
        let n_cells = (n_lat as usize)
            .checked_mul(n_lon as usize)
            .ok_or_else(|| Error::invalid_input("sky index cell count overflows"))?;

        let mut bins: Vec<Vec<u32>> = vec![Vec::new(); n_cells];
        for (idx, pos) in positions.iter().enumerate() {
            let cell = Self::cell_for_radec(
                n_lat,
                n_lon,
                pos.ra_deg.to_radians(),
                pos.dec_deg.to_radians(),
            );
            bins[cell as usize].push(idx as u32);
        }

        let mut cell_offsets = Vec::with_capacity(n_cells + 1);
        let mut point_indices = Vec::with_capacity(positions.len());
        cell_offsets.push(0);
        for cell_bin in bins {
            point_indices.extend(cell_bin);
            cell_offsets.push(point_indices.len() as u32);
        }

        let uvecs = positions.iter().map(SkyPosition::uvec).collect();

        Ok(Self {
            nside,
            n_lat,
            n_lon,
            positions,
            uvecs,
            cell_offsets,
            point_indices,
        })
    }

    pub fn nside(&self) -> u32 {
        self.nside
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[SkyPosition] {
        &self.positions
    }

    /// Indices of all points within `radius_deg` of (`ra_deg`, `dec_deg`).
    ///
    /// The radius is inclusive, judged by [`angular_separation_arcsec`].
    /// Indices are sorted ascending.
    pub fn query_indices(&self, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> Vec<usize> {
        let center = SkyPosition { ra_deg, dec_deg };
        let limit_arcsec = radius_deg * ARCSEC_PER_DEG;
        let dir = crate::skycoord::radec_to_uvec(ra_deg.to_radians(), dec_deg.to_radians());
        let mut out = self.cone_candidates(dir, radius_deg.to_radians());
        out.retain(|&idx| angular_separation_arcsec(&center, &self.positions[idx]) <= limit_arcsec);
        out
    }

    /// Indices of all points within `radius_rad` of a (possibly non-unit) direction.
    ///
    /// `dir` is normalized internally; `radius_rad` is clamped to `[0, π]`.
    pub fn query_indices_from_uvec(&self, dir: Vector3<f64>, radius_rad: f64) -> Vec<usize> {
        let dir = normalize_or_fallback(dir);
        let radius = radius_rad.clamp(0.0, PI);
        let mut out = self.cone_candidates(dir, radius);
        out.retain(|&idx| vector_angle(&dir, &self.uvecs[idx]) <= radius);
        out
    }

    /// Sorted indices of every point within the cone plus a small pad.
    fn cone_candidates(&self, dir: Vector3<f64>, radius_rad: f64) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }
        let radius = (radius_rad.max(0.0) * (1.0 + RADIUS_PAD_REL) + RADIUS_PAD_ABS).min(PI);
        let dir = normalize_or_fallback(dir);

        let dec_center = dir.z.clamp(-1.0, 1.0).asin();
        let z_min = (dec_center - radius).max(-FRAC_PI_2).sin();
        let z_max = (dec_center + radius).min(FRAC_PI_2).sin();

        // Cones that reach a pole cover every longitude.
        let full_circle = dec_center.abs() + radius >= FRAC_PI_2;
        let lon_half_span = if full_circle {
            PI
        } else {
            (radius.sin() / dec_center.cos()).clamp(-1.0, 1.0).asin() + RADIUS_PAD_ABS
        };

        let mut phi = dir.y.atan2(dir.x);
        if phi < 0.0 {
            phi += TAU;
        }
        let lon_min = phi - lon_half_span;
        let lon_max = phi + lon_half_span;

        let mut out = Vec::new();
        for lat_bin in Self::z_bin_range(self.n_lat, z_min, z_max) {
            if lon_max - lon_min >= TAU {
                for lon_bin in 0..self.n_lon {
                    self.collect_cell_matches(lat_bin, lon_bin, dir, radius, &mut out);
                }
                continue;
            }
            self.for_each_wrapped_lon_bin(lon_min, lon_max, |lon_bin| {
                self.collect_cell_matches(lat_bin, lon_bin, dir, radius, &mut out);
            });
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    /// Nearest point to `pos`, with its separation in arcseconds.
    ///
    /// Equal separations resolve to the lowest index. Returns `None` only when
    /// the index is empty.
    pub fn nearest(&self, pos: &SkyPosition) -> Option<(usize, f64)> {
        if self.is_empty() {
            return None;
        }
        let mut radius = self.cell_size_rad();
        loop {
            let best = self.nearest_in_cone(pos, radius);
            if let Some((_, sep_arcsec)) = best {
                // Anything closer than `best` lies inside the cone already searched.
                if sep_arcsec / ARCSEC_PER_RAD <= radius {
                    return best;
                }
            }
            if radius >= PI {
                return best;
            }
            radius = (radius * 2.0).min(PI);
        }
    }

    /// Nearest point to `pos` among those no more than `max_sep_arcsec` away.
    ///
    /// Agrees with [`SkyIndex::nearest`] whenever the global nearest point lies
    /// within the limit, and returns `None` otherwise.
    pub fn nearest_within(&self, pos: &SkyPosition, max_sep_arcsec: f64) -> Option<(usize, f64)> {
        let radius = max_sep_arcsec / ARCSEC_PER_RAD;
        self.nearest_in_cone(pos, radius)
            .filter(|&(_, sep)| sep <= max_sep_arcsec)
    }

    fn nearest_in_cone(&self, pos: &SkyPosition, radius_rad: f64) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        // Candidates arrive in ascending index order, so strict `<` keeps the first on ties.
        for idx in self.cone_candidates(pos.uvec(), radius_rad) {
            let sep = angular_separation_arcsec(pos, &self.positions[idx]);
            match best {
                Some((_, best_sep)) if sep >= best_sep => {}
                _ => best = Some((idx, sep)),
            }
        }
        best
    }

    /// Approximate angular width of one cell, in radians.
    fn cell_size_rad(&self) -> f64 {
        let n_cells = (self.n_lat * self.n_lon) as f64;
        (4.0 * PI / n_cells).sqrt()
    }

    fn collect_cell_matches(
        &self,
        lat_bin: u32,
        lon_bin: u32,
        dir: Vector3<f64>,
        radius: f64,
        out: &mut Vec<usize>,
    ) {
        let cell = (lat_bin * self.n_lon + lon_bin) as usize;
        let start = self.cell_offsets[cell] as usize;
        let end = self.cell_offsets[cell + 1] as usize;

        for flat_idx in start..end {
            let idx = self.point_indices[flat_idx] as usize;
            if vector_angle(&dir, &self.uvecs[idx]) <= radius {
                out.push(idx);
            }
        }
    }

    fn for_each_wrapped_lon_bin<F>(&self, lon_min: f64, lon_max: f64, mut f: F)
    where
        F: FnMut(u32),
    {
        let start_bin = Self::phi_to_lon_bin(self.n_lon, wrap_angle(lon_min));
        let end_bin = Self::phi_to_lon_bin(self.n_lon, wrap_angle(lon_max));

        if start_bin <= end_bin {
            for lon_bin in start_bin..=end_bin {
                f(lon_bin);
            }
            return;
        }

        for lon_bin in start_bin..self.n_lon {
            f(lon_bin);
        }
        for lon_bin in 0..=end_bin {
            f(lon_bin);
        }
    }

    fn z_bin_range(n_lat: u32, z_min: f64, z_max: f64) -> std::ops::RangeInclusive<u32> {
        let start = Self::z_to_lat_bin(n_lat, z_min);
        let end = Self::z_to_lat_bin(n_lat, z_max);
        start..=end
    }

    fn cell_for_radec(n_lat: u32, n_lon: u32, ra_rad: f64, dec_rad: f64) -> u32 {
        let z = dec_rad.sin().clamp(-1.0, 1.0);
        let lat_bin = Self::z_to_lat_bin(n_lat, z);
        let lon_bin = Self::phi_to_lon_bin(n_lon, wrap_angle(ra_rad));
        lat_bin * n_lon + lon_bin
    }

    fn z_to_lat_bin(n_lat: u32, z: f64) -> u32 {
        let u = ((z.clamp(-1.0, 1.0) + 1.0) * 0.5).clamp(0.0, 1.0);
        ((u * n_lat as f64).floor() as u32).min(n_lat - 1)
    }

    fn phi_to_lon_bin(n_lon: u32, phi: f64) -> u32 {
        let u = (phi / TAU).clamp(0.0, 1.0);
        ((u * n_lon as f64).floor() as u32).min(n_lon - 1)
    }
}

fn wrap_angle(theta_rad: f64) -> f64 {
    let wrapped = theta_rad.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Angle between unit vectors; atan2 of `|a x b|` and `a . b` stays accurate at
/// arcsecond scales, unlike acos.
fn vector_angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

fn normalize_or_fallback(v: Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > 0.0 {
        v / n
    } else {
        Vector3::new(1.0, 0.0, 0.0)
    }
}
