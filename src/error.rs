//! Error taxonomy for input validation.
//!
//! Every error is raised while validating caller-supplied input, before any
//! computation starts. Nothing here is transient, so there is no retry logic.

use std::fmt;

use thiserror::Error;

/// Which side of a cross-match a catalog was passed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSide {
    A,
    B,
}

impl fmt::Display for CatalogSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSide::A => write!(f, "catalog A"),
            CatalogSide::B => write!(f, "catalog B"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Structurally bad input: empty catalog, missing column, length mismatch.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A right ascension or declination value that is non-numeric or out of range.
    #[error("invalid coordinate in {catalog}, row {row}, column '{column}': {reason}")]
    InvalidCoordinate {
        catalog: CatalogSide,
        row: usize,
        column: String,
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
