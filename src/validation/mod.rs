//! Range validation

pub mod ranges;

pub use ranges::{RangeValidator, ValidatedRanges, ValidationOutcome};
