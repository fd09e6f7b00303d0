//! Range-only position solver
//!
//! Minimizes `sum_i (||p - a_i|| - r_i)^2` with a Levenberg-Marquardt
//! iteration on the residual vector. Every call starts from the given point;
//! nothing is carried between calls.

use crate::core::Coordinate3D;
use crate::utils::config::SolverConfig;
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Solved point and its fit quality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    pub position: Coordinate3D,
    /// Sum of squared range errors at `position`
    pub residual: f64,
    pub iterations: usize,
}

/// Solver failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("need at least {required} ranges, got {available}")]
    InsufficientRanges { available: usize, required: usize },
    #[error("{ranges} ranges but {anchors} anchor positions")]
    MismatchedInputs { ranges: usize, anchors: usize },
    #[error("non-finite input at index {index}")]
    NonFiniteInput { index: usize },
    /// Iteration bound hit; `last` is the best point found so far
    #[error("did not converge after {} iterations (residual {:.4})", .last.iterations, .last.residual)]
    NonConvergence { last: Solution },
}

/// Levenberg-Marquardt multilateration
#[derive(Debug, Clone)]
pub struct MultilaterationSolver {
    /// Maximum accepted + rejected steps before giving up
    pub max_iterations: usize,
    /// Converged once a step moves the point less than this (meters)
    pub step_tolerance: f64,
    /// Converged once the gradient norm drops below this
    pub gradient_tolerance: f64,
    /// Starting damping factor
    pub initial_damping: f64,
}

impl Default for MultilaterationSolver {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;

impl MultilaterationSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            step_tolerance: config.step_tolerance_m,
            gradient_tolerance: config.gradient_tolerance,
            initial_damping: config.initial_damping,
        }
    }

    /// Solve starting from the origin
    pub fn solve(&self, ranges: &[f64], anchors: &[Coordinate3D]) -> Result<Solution, SolverError> {
        self.solve_from(ranges, anchors, Coordinate3D::zeros())
    }

    /// Solve from an explicit starting point
    pub fn solve_from(
        &self,
        ranges: &[f64],
        anchors: &[Coordinate3D],
        start: Coordinate3D,
    ) -> Result<Solution, SolverError> {
        self.check_inputs(ranges, anchors, &start)?;

        let mut estimate = start;
        let mut cost = sum_squared_residuals(ranges, anchors, &estimate);
        let mut damping = self.initial_damping;

        for iteration in 1..=self.max_iterations {
            let (jt_j, gradient) = normal_equations(ranges, anchors, &estimate);

            if gradient.norm() < self.gradient_tolerance {
                return Ok(Solution {
                    position: estimate,
                    residual: cost,
                    iterations: iteration,
                });
            }

            // (J^T J + lambda * (diag(J^T J) + I)) * step = -J^T r
            let mut augmented = jt_j;
            for i in 0..3 {
                augmented[(i, i)] += damping * (jt_j[(i, i)] + 1.0);
            }

            let step = match augmented.cholesky() {
                Some(cholesky) => cholesky.solve(&(-gradient)),
                None => {
                    damping = (damping * 10.0).min(MAX_DAMPING);
                    continue;
                }
            };

            let candidate = estimate + step;
            let candidate_cost = sum_squared_residuals(ranges, anchors, &candidate);

            if candidate_cost.is_finite() && candidate_cost <= cost {
                estimate = candidate;
                cost = candidate_cost;
                damping = (damping / 10.0).max(MIN_DAMPING);

                if step.norm() < self.step_tolerance {
                    return Ok(Solution {
                        position: estimate,
                        residual: cost,
                        iterations: iteration,
                    });
                }
            } else {
                damping = (damping * 10.0).min(MAX_DAMPING);
                if damping >= MAX_DAMPING {
                    // No descent direction left at any damping: a stationary point
                    return Ok(Solution {
                        position: estimate,
                        residual: cost,
                        iterations: iteration,
                    });
                }
            }
        }

        Err(SolverError::NonConvergence {
            last: Solution {
                position: estimate,
                residual: cost,
                iterations: self.max_iterations,
            },
        })
    }

    fn check_inputs(
        &self,
        ranges: &[f64],
        anchors: &[Coordinate3D],
        start: &Coordinate3D,
    ) -> Result<(), SolverError> {
        if ranges.len() != anchors.len() {
            return Err(SolverError::MismatchedInputs {
                ranges: ranges.len(),
                anchors: anchors.len(),
            });
        }

        if ranges.len() < crate::core::MIN_RANGES_FOR_FIX {
            return Err(SolverError::InsufficientRanges {
                available: ranges.len(),
                required: crate::core::MIN_RANGES_FOR_FIX,
            });
        }

        for (index, (range, anchor)) in ranges.iter().zip(anchors).enumerate() {
            if !range.is_finite() || !anchor.iter().all(|v| v.is_finite()) {
                return Err(SolverError::NonFiniteInput { index });
            }
        }

        if !start.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFiniteInput { index: ranges.len() });
        }

        Ok(())
    }
}

/// Sum of squared range errors at `point`
pub fn sum_squared_residuals(ranges: &[f64], anchors: &[Coordinate3D], point: &Coordinate3D) -> f64 {
    ranges
        .iter()
        .zip(anchors)
        .map(|(range, anchor)| {
            let error = (point - anchor).norm() - range;
            error * error
        })
        .sum()
}

/// `J^T J` and `J^T r` for residuals `r_i = ||p - a_i|| - range_i`.
///
/// A point sitting exactly on an anchor contributes a zero Jacobian row.
fn normal_equations(
    ranges: &[f64],
    anchors: &[Coordinate3D],
    point: &Coordinate3D,
) -> (Matrix3<f64>, Vector3<f64>) {
    let mut jt_j = Matrix3::zeros();
    let mut gradient = Vector3::zeros();

    for (range, anchor) in ranges.iter().zip(anchors) {
        let diff = point - anchor;
        let distance = diff.norm();
        if distance < 1e-12 {
            continue;
        }

        let unit = diff / distance;
        let residual = distance - range;
        jt_j += unit * unit.transpose();
        gradient += unit * residual;
    }

    (jt_j, gradient)
}
