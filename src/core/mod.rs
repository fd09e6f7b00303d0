//! Core types and constants for the tag locator

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
