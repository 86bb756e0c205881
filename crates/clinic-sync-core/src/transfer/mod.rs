//! Bulk patient import and CSV export.
//!
//! File reading belongs to the host. Import consumes already-split rows;
//! export produces CSV text ready to be offered as a download.

mod export;
mod import;

pub use export::*;
pub use import::*;

use thiserror::Error;

/// Fixed column order shared by import and the patient export.
pub const PATIENT_COLUMNS: [&str; 8] = [
    "code",
    "name",
    "age",
    "gender",
    "phone",
    "address",
    "allergies",
    "chronicConditions",
];

/// Import errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("Import file has no data rows")]
    Empty,
}

pub type ImportResult<T> = Result<T, ImportError>;
