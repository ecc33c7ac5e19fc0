//! Row-oriented tables with named, typed columns.
//!
//! A `Table` is the catalog container handed to the cross-matcher: an ordered
//! list of rows, each row one [`Value`] per column. Column names are unique.
//! Missing cells are filled with the per-kind placeholder from [`empty_value`].
//!
//! Tables serialize with [rkyv](https://docs.rs/rkyv) for fast reloading.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Placeholder stored in integer columns for missing values.
pub const EMPTY_INT: i64 = -999_999_999_999;

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum DataKind {
    Float,
    Int,
    Str,
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Str(String),
}

impl Value {
    /// Placeholder for a missing value of the given kind.
    pub fn empty(kind: DataKind) -> Self {
        empty_value(kind)
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Value::Float(_) => DataKind::Float,
            Value::Int(_) => DataKind::Int,
            Value::Str(_) => DataKind::Str,
        }
    }

    /// Numeric value as `f64`; `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this cell holds the missing-value placeholder for its kind.
    pub fn is_empty_placeholder(&self) -> bool {
        match self {
            Value::Float(v) => v.is_nan(),
            Value::Int(v) => *v == EMPTY_INT,
            Value::Str(s) => s.is_empty(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Placeholder used to fill missing cells.
///
/// - `Float`: NaN
/// - `Int`: `-999999999999`
/// - `Str`: the empty string
pub fn empty_value(kind: DataKind) -> Value {
    match kind {
        DataKind::Float => Value::Float(f64::NAN),
        DataKind::Int => Value::Int(EMPTY_INT),
        DataKind::Str => Value::Str(String::new()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: DataKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given schema.
    ///
    /// Fails with `InvalidInput` when two columns share a name.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::invalid_input(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a table and push every row in `rows`.
    pub fn from_rows(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a full row.
    ///
    /// Values must match their column's kind; integers are accepted in float
    /// columns and widened.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::invalid_input(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        let row = values
            .into_iter()
            .zip(&self.columns)
            .map(|(value, col)| coerce(value, col))
            .collect::<Result<Vec<Value>>>()?;
        self.rows.push(row);
        Ok(())
    }

    /// Append a row given as `(column name, value)` pairs.
    ///
    /// Columns not mentioned get the placeholder for their kind. Unknown
    /// column names are rejected.
    pub fn push_partial_row<I, S>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut row: Vec<Value> = self.columns.iter().map(|c| empty_value(c.kind)).collect();
        for (name, value) in cells {
            let name = name.as_ref();
            let idx = self
                .column_index(name)
                .ok_or_else(|| Error::invalid_input(format!("unknown column '{name}'")))?;
            row[idx] = coerce(value, &self.columns[idx])?;
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[Value]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    /// Cell at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// All values of a numeric column as `f64`.
    pub fn float_column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::invalid_input(format!("missing column '{name}'")))?;
        if self.columns[idx].kind == DataKind::Str {
            return Err(Error::invalid_input(format!(
                "column '{name}' holds strings, not numbers"
            )));
        }
        Ok(self
            .rows
            .iter()
            .map(|r| r[idx].as_f64().unwrap_or(f64::NAN))
            .collect())
    }
}

fn coerce(value: Value, col: &Column) -> Result<Value> {
    match (col.kind, value) {
        (DataKind::Float, Value::Int(v)) => Ok(Value::Float(v as f64)),
        (kind, value) if value.kind() == kind => Ok(value),
        (kind, value) => Err(Error::invalid_input(format!(
            "column '{}' expects {:?} values, got {:?}",
            col.name,
            kind,
            value.kind()
        ))),
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

impl Table {
    /// Serialize the table to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the table to a file using rkyv.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)?;
        info!("Saved table to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a table from an rkyv file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let table = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!(
            "Loaded table from {}: {} rows, {} columns",
            path.display(),
            table.len(),
            table.num_columns()
        );
        Ok(table)
    }
}
