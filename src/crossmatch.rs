//! Symmetric (mutual nearest-neighbour) cross-matching of two sky catalogs.
//!
//! A record `a` of catalog A and a record `b` of catalog B form a match when
//! `b` is the nearest B record to `a`, `a` is the nearest A record to `b`, and
//! their great-circle separation is strictly below the cutoff. Each record
//! takes part in at most one match.
//!
//! Nearest-neighbour ties (equal separations) go to the candidate with the
//! lowest row index, so results are reproducible.
//!
//! # Example
//!
//! ```
//! use sinistra::crossmatch::{symmetric_match, CrossMatchConfig};
//! use sinistra::table::{Column, DataKind, Table, Value};
//!
//! let schema = || vec![Column::new("ra", DataKind::Float), Column::new("dec", DataKind::Float)];
//! let a = Table::from_rows(schema(), vec![vec![Value::Float(10.0), Value::Float(0.0)]]).unwrap();
//! let b = Table::from_rows(schema(), vec![vec![Value::Float(10.0), Value::Float(0.00001)]]).unwrap();
//!
//! let result = symmetric_match(&a, &b, &CrossMatchConfig::default()).unwrap();
//! assert_eq!(result.len(), 1);
//! assert_eq!(result.table.column_names(), vec!["ra", "dec", "ra_2", "dec_2", "separation"]);
//! ```

use tracing::debug;

use crate::error::{CatalogSide, Error, Result};
use crate::skycoord::{dec_problem, ra_problem, SkyPosition};
use crate::skyindex::{SkyIndex, MAX_NSIDE};
use crate::table::{Column, DataKind, Table, Value};

/// Parameters controlling a cross-match.
#[derive(Debug, Clone)]
pub struct CrossMatchConfig {
    /// Right ascension column of catalog A (degrees). Default `"ra"`.
    pub ra_col_a: String,
    /// Declination column of catalog A (degrees). Default `"dec"`.
    pub dec_col_a: String,
    /// Right ascension column of catalog B (degrees). Default `"ra"`.
    pub ra_col_b: String,
    /// Declination column of catalog B (degrees). Default `"dec"`.
    pub dec_col_b: String,
    /// Matches must be strictly closer than this, in arcseconds. Default 3.0.
    pub max_sep_arcsec: f64,
    /// Name of the appended separation column (arcseconds). Default `"separation"`.
    pub separation_col: String,
    /// Resolution of the spatial index. `None` picks one from the catalog size;
    /// explicit values are clamped to `1..=MAX_NSIDE`. Has no effect on results.
    pub index_nside: Option<u32>,
}

impl Default for CrossMatchConfig {
    fn default() -> Self {
        Self {
            ra_col_a: "ra".to_string(),
            dec_col_a: "dec".to_string(),
            ra_col_b: "ra".to_string(),
            dec_col_b: "dec".to_string(),
            max_sep_arcsec: 3.0,
            separation_col: "separation".to_string(),
            index_nside: None,
        }
    }
}

/// One symmetric match: row indices into A and B plus their separation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub index_a: usize,
    pub index_b: usize,
    pub separation_arcsec: f64,
}

/// Result of [`symmetric_match`].
///
/// `table` always carries the full merged schema; it has zero rows when no
/// pair matched.
#[derive(Debug, Clone)]
pub struct CrossMatch {
    /// Matches in the row order of catalog A.
    pub matches: Vec<Match>,
    /// One merged row per match: A's columns, B's columns, then the separation.
    pub table: Table,
}

impl CrossMatch {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// `true` when no pair satisfied the match criteria.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Find mutual nearest neighbours between two catalogs and merge their rows.
///
/// Fails with `InvalidInput` for an empty catalog, a missing position column
/// or a bad cutoff, and with `InvalidCoordinate` for a non-numeric or
/// out-of-range position. All validation happens before matching starts.
pub fn symmetric_match(a: &Table, b: &Table, config: &CrossMatchConfig) -> Result<CrossMatch> {
    if a.is_empty() {
        return Err(Error::invalid_input("catalog A has no rows"));
    }
    if b.is_empty() {
        return Err(Error::invalid_input("catalog B has no rows"));
    }
    if !config.max_sep_arcsec.is_finite() || config.max_sep_arcsec < 0.0 {
        return Err(Error::invalid_input(format!(
            "max separation must be a finite, non-negative number of arcseconds, got {}",
            config.max_sep_arcsec
        )));
    }

    let pos_a = positions_from_table(a, &config.ra_col_a, &config.dec_col_a, CatalogSide::A)?;
    let pos_b = positions_from_table(b, &config.ra_col_b, &config.dec_col_b, CatalogSide::B)?;

    let nside = match config.index_nside {
        Some(nside) => nside.clamp(1, MAX_NSIDE),
        None => auto_nside(pos_a.len().max(pos_b.len())),
    };
    let matches = match_positions(&pos_a, &pos_b, config.max_sep_arcsec, nside)?;

    let mut table = Table::new(merged_schema(a, b, config))?;
    for m in &matches {
        let mut row = Vec::with_capacity(table.num_columns());
        row.extend_from_slice(&a.rows()[m.index_a]);
        row.extend_from_slice(&b.rows()[m.index_b]);
        row.push(Value::Float(m.separation_arcsec));
        table.push_row(row)?;
    }

    debug!(
        "Cross-matched {} x {} rows: {} symmetric matches under {} arcsec",
        a.len(),
        b.len(),
        matches.len(),
        config.max_sep_arcsec
    );

    Ok(CrossMatch { matches, table })
}

/// Symmetric matches between two position lists.
///
/// Nearest-neighbour searches are confined to the `max_sep_arcsec` cone: a
/// pair can only match when each is the other's nearest and both lie inside
/// the cutoff, so the confined search sees every pair the unrestricted
/// definition would accept.
pub fn match_positions(
    a: &[SkyPosition],
    b: &[SkyPosition],
    max_sep_arcsec: f64,
    nside: u32,
) -> Result<Vec<Match>> {
    let index_a = SkyIndex::new(nside, a.to_vec())?;
    let index_b = SkyIndex::new(nside, b.to_vec())?;

    // nearest_A(b), computed lazily per B record.
    let mut nearest_in_a: Vec<Option<Option<usize>>> = vec![None; b.len()];

    let mut matches = Vec::new();
    for (ia, pa) in a.iter().enumerate() {
        let Some((ib, sep)) = index_b.nearest_within(pa, max_sep_arcsec) else {
            continue;
        };
        if sep >= max_sep_arcsec {
            continue;
        }
        let back = *nearest_in_a[ib]
            .get_or_insert_with(|| index_a.nearest_within(&b[ib], max_sep_arcsec).map(|(i, _)| i));
        if back == Some(ia) {
            matches.push(Match {
                index_a: ia,
                index_b: ib,
                separation_arcsec: sep,
            });
        }
    }
    Ok(matches)
}

/// Unrestricted nearest neighbour in `to` for every position in `from`.
///
/// Returns `(index into to, separation in arcsec)` per input position.
pub fn nearest_neighbors(from: &[SkyPosition], to: &[SkyPosition]) -> Result<Vec<(usize, f64)>> {
    if to.is_empty() {
        return Err(Error::invalid_input(
            "nearest-neighbour search needs at least one candidate",
        ));
    }
    let index = SkyIndex::new(auto_nside(to.len()), to.to_vec())?;
    Ok(from
        .iter()
        .filter_map(|p| index.nearest(p))
        .collect())
}

/// Read and validate the sky positions of every row in `table`.
pub fn positions_from_table(
    table: &Table,
    ra_col: &str,
    dec_col: &str,
    side: CatalogSide,
) -> Result<Vec<SkyPosition>> {
    let ra_idx = table
        .column_index(ra_col)
        .ok_or_else(|| Error::invalid_input(format!("{side} has no column '{ra_col}'")))?;
    let dec_idx = table
        .column_index(dec_col)
        .ok_or_else(|| Error::invalid_input(format!("{side} has no column '{dec_col}'")))?;

    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row, values)| {
            let ra = coordinate(&values[ra_idx], side, row, ra_col, ra_problem)?;
            let dec = coordinate(&values[dec_idx], side, row, dec_col, dec_problem)?;
            Ok(SkyPosition {
                ra_deg: ra,
                dec_deg: dec,
            })
        })
        .collect()
}

fn coordinate(
    value: &Value,
    side: CatalogSide,
    row: usize,
    column: &str,
    problem: fn(f64) -> Option<String>,
) -> Result<f64> {
    let invalid = |reason: String| Error::InvalidCoordinate {
        catalog: side,
        row,
        column: column.to_string(),
        reason,
    };
    let v = value
        .as_f64()
        .ok_or_else(|| invalid(format!("non-numeric value '{value}'")))?;
    match problem(v) {
        Some(reason) => Err(invalid(reason)),
        None => Ok(v),
    }
}

/// Output schema of a cross-match between `a` and `b`.
///
/// A's columns keep their names. A B column whose name is already taken gets
/// the first free suffix among `_2`, `_3`, ...; the separation column is
/// appended last and disambiguated the same way.
pub fn merged_schema(a: &Table, b: &Table, config: &CrossMatchConfig) -> Vec<Column> {
    let mut columns: Vec<Column> = a.columns().to_vec();
    for col in b.columns() {
        let name = unique_name(&columns, &col.name);
        columns.push(Column::new(name, col.kind));
    }
    let sep_name = unique_name(&columns, &config.separation_col);
    columns.push(Column::new(sep_name, DataKind::Float));
    columns
}

fn unique_name(taken: &[Column], name: &str) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|c| c.name == candidate);
    if !is_taken(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{name}_{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Index resolution giving a handful of points per cell.
fn auto_nside(n_points: usize) -> u32 {
    ((n_points as f64 / 12.0).sqrt().ceil() as u32).clamp(1, MAX_NSIDE)
}
