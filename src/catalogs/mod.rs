//! Loading and saving catalogs as tables; currently CSV.

pub mod csv;

pub use self::csv::{parse_table_csv, read_table_csv, write_table_csv};
