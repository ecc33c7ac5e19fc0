//! CSV catalogs.
//!
//! The first record names the columns. Each column's [`DataKind`] is inferred
//! from its non-empty cells: integers if every cell parses as `i64`, floats if
//! every cell parses as `f64`, strings otherwise. Empty cells become the
//! placeholder for the inferred kind.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::table::{empty_value, Column, DataKind, Table, Value};

/// Load a table from a CSV file.
pub fn read_table_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Table> {
    let path = path.as_ref();
    let rdr = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV catalog: {}", path.display()))?;
    let table = table_from_reader(rdr)
        .with_context(|| format!("Failed to parse CSV catalog: {}", path.display()))?;
    info!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.num_columns(),
        path.display()
    );
    Ok(table)
}

/// Parse a table from in-memory CSV text.
pub fn parse_table_csv(data: &str) -> anyhow::Result<Table> {
    let rdr = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_reader(data.as_bytes());
    table_from_reader(rdr)
}

/// Write a table to a CSV file. Placeholder cells are written empty.
pub fn write_table_csv<P: AsRef<Path>>(table: &Table, path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut wtr = ::csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    wtr.write_record(table.column_names())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(format_cell))?;
    }
    wtr.flush()?;
    info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Text for one cell. Floats always carry a decimal point or exponent so the
/// column is inferred as `Float` again on reload.
fn format_cell(value: &Value) -> String {
    match value {
        v if v.is_empty_placeholder() => String::new(),
        Value::Float(v) => format!("{v:?}"),
        v => v.to_string(),
    }
}

fn table_from_reader<R: std::io::Read>(mut rdr: ::csv::Reader<R>) -> anyhow::Result<Table> {
    let names: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let records = rdr
        .records()
        .collect::<Result<Vec<::csv::StringRecord>, ::csv::Error>>()?;

    let kinds: Vec<DataKind> = (0..names.len())
        .map(|col| infer_kind(records.iter().map(|r| r.get(col).unwrap_or(""))))
        .collect();
    debug!("Inferred CSV column kinds: {:?}", kinds);

    let columns = names
        .iter()
        .zip(&kinds)
        .map(|(name, &kind)| Column::new(name.clone(), kind))
        .collect();
    let mut table = Table::new(columns)?;

    for (line, record) in records.iter().enumerate() {
        let row = kinds
            .iter()
            .enumerate()
            .map(|(col, &kind)| parse_cell(record.get(col).unwrap_or(""), kind))
            .collect::<anyhow::Result<Vec<Value>>>()
            .with_context(|| format!("Bad value in data row {}", line + 1))?;
        table.push_row(row)?;
    }
    Ok(table)
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> DataKind {
    let mut all_int = true;
    let mut all_float = true;
    let mut any_value = false;
    for cell in cells.filter(|c| !c.is_empty()) {
        any_value = true;
        all_int &= cell.parse::<i64>().is_ok();
        all_float &= cell.parse::<f64>().is_ok();
        if !all_float {
            break;
        }
    }
    if !any_value {
        DataKind::Str
    } else if all_int {
        DataKind::Int
    } else if all_float {
        DataKind::Float
    } else {
        DataKind::Str
    }
}

fn parse_cell(cell: &str, kind: DataKind) -> anyhow::Result<Value> {
    if cell.is_empty() {
        return Ok(empty_value(kind));
    }
    Ok(match kind {
        DataKind::Int => Value::Int(cell.parse()?),
        DataKind::Float => Value::Float(cell.parse()?),
        DataKind::Str => Value::Str(cell.to_string()),
    })
}
