//! Positioning algorithms

pub mod multilateration;

pub use multilateration::{MultilaterationSolver, Solution, SolverError};
