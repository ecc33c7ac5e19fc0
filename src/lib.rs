//! # sinistra
//!
//! Astronomy helpers, centred on **symmetric cross-matching of sky catalogs**.
//!
//! Given two catalogs with right ascension and declination columns, the
//! cross-matcher pairs each record with its mutual nearest neighbour in the
//! other catalog, keeping pairs closer than a separation cutoff, and returns a
//! merged table with both records' columns side by side plus their separation.
//!
//! ## Features
//!
//! - **Symmetric matching**: a pair matches only if each record is the other's
//!   nearest neighbour, so every record appears in at most one match
//! - **Exact great-circle separations**: Vincenty's formula in `f64`, stable at
//!   tiny separations, across the RA seam, and at the poles
//! - **Spatial index**: equal-area latitude/longitude cells keep the
//!   nearest-neighbour search fast on large catalogs
//! - **Tables**: typed columns with missing-value placeholders, CSV I/O and
//!   [rkyv](https://docs.rs/rkyv) serialization
//! - **Photometry and statistics**: magnitude/flux conversions, reduced
//!   chi-squared, Gaussian density and histogram Gaussian fits
//! - **Aperture grids**: qphot-style coordinate files and sky-noise estimation
//!
//! ## Example
//!
//! ```no_run
//! use sinistra::{symmetric_match, CrossMatchConfig};
//! use sinistra::catalogs::{read_table_csv, write_table_csv};
//!
//! let a = read_table_csv("data/sdss.csv").unwrap();
//! let b = read_table_csv("data/2mass.csv").unwrap();
//!
//! let config = CrossMatchConfig {
//!     dec_col_b: "decl".to_string(),
//!     max_sep_arcsec: 1.5,
//!     ..Default::default()
//! };
//! let result = symmetric_match(&a, &b, &config).unwrap();
//! println!("{} matches", result.len());
//! write_table_csv(&result.table, "data/matched.csv").unwrap();
//! ```

pub mod aperture;
/// Catalog file formats; currently CSV
pub mod catalogs;
pub mod crossmatch;
pub mod error;
pub mod files;
pub mod fits;
pub mod photometry;
pub mod skycoord;
pub mod skyindex;
pub mod stats;
pub mod table;

pub use aperture::{estimate_sky_noise, SkyNoise, SkyNoiseConfig};
pub use crossmatch::{symmetric_match, CrossMatch, CrossMatchConfig, Match};
pub use error::{CatalogSide, Error, Result};
pub use skycoord::SkyPosition;
pub use stats::{fit_gaussian, GaussianFit, GaussianFitConfig};
pub use table::{Column, DataKind, Table, Value};
