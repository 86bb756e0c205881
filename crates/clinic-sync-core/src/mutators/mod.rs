//! Mutations over a [`ClinicState`](crate::models::ClinicState).
//!
//! Every function here validates its input before touching state and
//! returns a [`MutationError`] on rejection. Callers run them against a
//! working copy and only adopt the copy on success, so a rejected mutation
//! leaves no partial effects.

mod records;
mod sale;
mod stock;
mod visit;

pub use records::*;
pub use sale::*;
pub use stock::*;
pub use visit::*;

use thiserror::Error;

/// Mutation rejections.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity {quantity} for medication {medication_id}")]
    InvalidQuantity { medication_id: String, quantity: u32 },

    #[error("Requested {requested} units of {medication_id} but only {available} in stock")]
    InsufficientStock {
        medication_id: String,
        requested: u32,
        available: u32,
    },

    #[error("Unknown medication: {0}")]
    UnknownMedication(String),

    #[error("Unknown patient: {0}")]
    UnknownPatient(String),

    #[error("Unknown visit: {0}")]
    UnknownVisit(String),

    #[error("Unknown sale: {0}")]
    UnknownSale(String),

    #[error("Unknown reference item: {0}")]
    UnknownReferenceItem(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub type MutationResult<T> = Result<T, MutationError>;

/// Reject NaN, infinities and negative amounts.
pub(crate) fn validate_amount(field: &'static str, value: f64) -> MutationResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MutationError::InvalidAmount { field, value })
    }
}
