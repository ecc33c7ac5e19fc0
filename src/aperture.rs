//! Aperture grids for photometry and sky-noise estimation.
//!
//! Pixel `(col, row)` of an image covers `[col, col + 1) x [row, row + 1)` and
//! has its centre at `(col + 0.5, row + 0.5)`. Pixel data is row-major,
//! `pixels[row * width + col]`.

use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use anyhow::{bail, Context};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::files::check_if_file;
use crate::fits::read_primary_header;
use crate::stats::{fit_gaussian, GaussianFit, GaussianFitConfig};

/// Largest grid [`aperture_grid`] will build.
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// Regular grid of aperture centres covering a `width` x `height` image.
///
/// Positions along each axis start at `spacing / 2` and step by `spacing`
/// while below the axis length. Points are ordered with x in the outer loop
/// and y in the inner loop. Grids of more than [`MAX_GRID_POINTS`] points are
/// rejected with `InvalidInput`.
pub fn aperture_grid(width: usize, height: usize, spacing: f64) -> Result<Vec<(f64, f64)>> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(Error::invalid_input(format!(
            "aperture spacing must be positive, got {spacing}"
        )));
    }
    let nx = axis_count(width, spacing);
    let ny = axis_count(height, spacing);
    if nx == 0.0 || ny == 0.0 {
        return Ok(Vec::new());
    }
    if nx * ny > MAX_GRID_POINTS as f64 {
        return Err(Error::invalid_input(format!(
            "spacing {spacing} gives a {nx:e} x {ny:e} grid, more than {MAX_GRID_POINTS} apertures"
        )));
    }
    let xs = axis_positions(nx as usize, spacing);
    let ys = axis_positions(ny as usize, spacing);
    Ok(xs
        .iter()
        .flat_map(|&x| ys.iter().map(move |&y| (x, y)))
        .collect())
}

/// Number of positions `spacing / 2 + i * spacing` below `length`.
fn axis_count(length: usize, spacing: f64) -> f64 {
    ((length as f64 - spacing / 2.0) / spacing).ceil().max(0.0)
}

fn axis_positions(count: usize, spacing: f64) -> Vec<f64> {
    let start = spacing / 2.0;
    (0..count).map(|i| start + i as f64 * spacing).collect()
}

/// Write `points` as a coordinates file, one `x y` line per point.
///
/// Refuses to replace an existing file unless `clobber` is set; without
/// `clobber` the file is created exclusively, so a file appearing concurrently
/// is never overwritten.
pub fn write_coords_file<P: AsRef<Path>>(
    path: P,
    points: &[(f64, f64)],
    clobber: bool,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut options = OpenOptions::new();
    options.write(true);
    if clobber {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => bail!(
            "The coords file {} already exists. Set clobber = true to overwrite it.",
            path.display()
        ),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to create coords file: {}", path.display()))
        }
    };
    let mut out = BufWriter::new(file);
    for (x, y) in points {
        writeln!(out, "{x} {y}")?;
    }
    out.flush()
        .with_context(|| format!("Failed to write coords file: {}", path.display()))?;
    info!("Wrote {} apertures to {}", points.len(), path.display());
    Ok(())
}

/// Lay an aperture grid over a FITS image and write it as a coords file.
///
/// The image size comes from `NAXIS1`/`NAXIS2` of the primary header. An
/// existing coords file is reported before the image is opened. Returns the
/// number of apertures written.
pub fn aperture_grid_for_image<P: AsRef<Path>, Q: AsRef<Path>>(
    fits_path: P,
    coords_path: Q,
    spacing: f64,
    clobber: bool,
) -> anyhow::Result<usize> {
    let coords_path = coords_path.as_ref();
    if !clobber && check_if_file(coords_path) {
        bail!(
            "The coords file {} already exists. Set clobber = true to overwrite it.",
            coords_path.display()
        );
    }
    let header = read_primary_header(fits_path)?;
    let (width, height) = header.image_dimensions()?;
    let points = aperture_grid(width, height, spacing)?;
    write_coords_file(coords_path, &points, clobber)?;
    Ok(points.len())
}

/// Summed pixel values inside one circular aperture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureSum {
    pub x: f64,
    pub y: f64,
    pub sum: f64,
    /// Pixels whose centres fall inside the aperture.
    pub n_pixels: usize,
}

/// Sum the pixels inside circular apertures of `radius` around `centers`.
///
/// Apertures that extend past the image edge are skipped, so the output may
/// be shorter than `centers`.
pub fn aperture_sums(
    pixels: &[f32],
    width: usize,
    height: usize,
    centers: &[(f64, f64)],
    radius: f64,
) -> Result<Vec<ApertureSum>> {
    check_pixels(pixels, width, height)?;
    if !(radius.is_finite() && radius > 0.0) {
        return Err(Error::invalid_input(format!(
            "aperture radius must be positive, got {radius}"
        )));
    }
    let r2 = radius * radius;

    let mut sums = Vec::with_capacity(centers.len());
    for &(x, y) in centers {
        if x - radius < 0.0 || y - radius < 0.0 || x + radius > width as f64 || y + radius > height as f64 {
            continue;
        }
        let col_lo = (x - radius).floor() as usize;
        let col_hi = ((x + radius).ceil() as usize).min(width);
        let row_lo = (y - radius).floor() as usize;
        let row_hi = ((y + radius).ceil() as usize).min(height);

        let mut sum = 0.0;
        let mut n_pixels = 0;
        for row in row_lo..row_hi {
            let dy = row as f64 + 0.5 - y;
            for col in col_lo..col_hi {
                let dx = col as f64 + 0.5 - x;
                if dx * dx + dy * dy <= r2 {
                    sum += pixels[row * width + col] as f64;
                    n_pixels += 1;
                }
            }
        }
        sums.push(ApertureSum { x, y, sum, n_pixels });
    }
    Ok(sums)
}

fn check_pixels(pixels: &[f32], width: usize, height: usize) -> Result<()> {
    if pixels.len() != width * height {
        return Err(Error::invalid_input(format!(
            "Pixel data length ({}) does not match width*height ({}x{}={})",
            pixels.len(),
            width,
            height,
            width * height
        )));
    }
    Ok(())
}

/// Configuration for [`estimate_sky_noise`].
#[derive(Debug, Clone)]
pub struct SkyNoiseConfig {
    /// Distance between neighbouring aperture centres, in pixels.
    /// Default: 20.0
    pub spacing: f64,

    /// Aperture radius in pixels.
    /// Default: 5.0
    pub radius: f64,

    /// Settings for the Gaussian fit to the aperture sums.
    pub fit: GaussianFitConfig,
}

impl Default for SkyNoiseConfig {
    fn default() -> Self {
        Self {
            spacing: 20.0,
            radius: 5.0,
            fit: GaussianFitConfig::default(),
        }
    }
}

/// Sky level and noise measured from a grid of apertures.
#[derive(Debug, Clone, Copy)]
pub struct SkyNoise {
    /// Gaussian fitted to the aperture sums. `fit.sigma` is the sky noise in
    /// one aperture.
    pub fit: GaussianFit,
    /// Apertures that fit inside the image.
    pub n_apertures: usize,
    /// Mean pixel count of those apertures.
    pub pixels_per_aperture: f64,
    /// `fit.sigma / sqrt(pixels_per_aperture)`; the per-pixel noise if pixels
    /// are uncorrelated.
    pub sigma_per_pixel: f64,
}

/// Estimate the sky noise of an image from the spread of aperture sums.
///
/// Apertures are placed on [`aperture_grid`] and summed with
/// [`aperture_sums`]. Sources landing in a few apertures fall in the wings of
/// the distribution and are clipped away before the Gaussian fit.
pub fn estimate_sky_noise(
    pixels: &[f32],
    width: usize,
    height: usize,
    config: &SkyNoiseConfig,
) -> Result<SkyNoise> {
    check_pixels(pixels, width, height)?;
    let centers = aperture_grid(width, height, config.spacing)?;
    let sums = aperture_sums(pixels, width, height, &centers, config.radius)?;
    if sums.is_empty() {
        return Err(Error::invalid_input(format!(
            "no aperture of radius {} fits in a {}x{} image",
            config.radius, width, height
        )));
    }

    let values: Vec<f64> = sums.iter().map(|s| s.sum).collect();
    let fit = fit_gaussian(&values, &config.fit)?;
    let pixels_per_aperture =
        sums.iter().map(|s| s.n_pixels as f64).sum::<f64>() / sums.len() as f64;

    debug!(
        "Sky noise from {} apertures: level={:.3}, sigma={:.3} per aperture",
        sums.len(),
        fit.mean,
        fit.sigma
    );
    Ok(SkyNoise {
        fit,
        n_apertures: sums.len(),
        pixels_per_aperture,
        sigma_per_pixel: fit.sigma / pixels_per_aperture.sqrt(),
    })
}
