//! Payload to position pipeline
//!
//! One read payload goes through decode, range validation against the
//! current anchor directory snapshot, and the solver. Every step is pure, so
//! the pipeline can run on whichever task received the read.

use crate::algorithms::multilateration::{MultilaterationSolver, SolverError};
use crate::core::PositionEstimate;
use crate::directory::AnchorDirectory;
use crate::processing::parser::{DecodeError, Telemetry, TelemetryParser};
use crate::utils::config::LocatorConfig;
use crate::validation::ranges::{RangeValidator, ValidationOutcome};
use log::{debug, warn};

/// Result of processing one payload
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// A solved position; check `converged` for confidence
    Position(PositionEstimate),
    /// Range report with zero records
    NoRanges,
    /// No anchor table loaded yet
    DirectoryUnavailable,
    InsufficientRanges { valid: usize, required: usize },
    /// Not a range report; handed to the host as is
    Forwarded { reason_code: u8, payload: Vec<u8> },
    /// The solver rejected its inputs
    SolveFailed(SolverError),
}

/// Decoder, validator and solver wired together
#[derive(Debug, Clone, Default)]
pub struct PositionPipeline {
    parser: TelemetryParser,
    validator: RangeValidator,
    solver: MultilaterationSolver,
}

impl PositionPipeline {
    pub fn new(validator: RangeValidator, solver: MultilaterationSolver) -> Self {
        Self {
            parser: TelemetryParser::new(),
            validator,
            solver,
        }
    }

    pub fn from_config(config: &LocatorConfig) -> Self {
        Self::new(
            RangeValidator::with_min_ranges(config.min_ranges),
            MultilaterationSolver::from_config(&config.solver),
        )
    }

    /// Process a payload read from the location characteristic
    pub fn process(
        &self,
        payload: &[u8],
        directory: Option<&AnchorDirectory>,
    ) -> Result<PipelineOutcome, DecodeError> {
        let ranges = match self.parser.parse_payload(payload)? {
            Telemetry::Ranges(ranges) => ranges,
            Telemetry::Forwarded { reason_code, payload } => {
                debug!("Forwarding {} byte payload with reason {}", payload.len(), reason_code);
                return Ok(PipelineOutcome::Forwarded { reason_code, payload });
            }
        };

        if ranges.is_empty() {
            return Ok(PipelineOutcome::NoRanges);
        }

        for range in &ranges {
            debug!("Range to {}: {:.3} m", range.anchor_id, range.range_m);
        }

        let validated = match self.validator.validate(&ranges, directory) {
            ValidationOutcome::Ready(validated) => validated,
            ValidationOutcome::DirectoryUnavailable => return Ok(PipelineOutcome::DirectoryUnavailable),
            ValidationOutcome::InsufficientRanges {
                valid,
                required,
                sentinel_count,
                unknown_anchor_count,
            } => {
                debug!(
                    "{} usable ranges ({} sentinels, {} unknown anchors)",
                    valid, sentinel_count, unknown_anchor_count
                );
                return Ok(PipelineOutcome::InsufficientRanges { valid, required });
            }
        };

        let estimate = match self.solver.solve(&validated.ranges(), &validated.anchor_positions) {
            Ok(solution) => PositionEstimate {
                position: solution.position,
                residual: solution.residual,
                iterations: solution.iterations,
                converged: true,
                anchor_count: validated.len(),
            },
            Err(SolverError::NonConvergence { last }) => {
                warn!(
                    "Solver stopped after {} iterations, reporting low-confidence fix",
                    last.iterations
                );
                PositionEstimate {
                    position: last.position,
                    residual: last.residual,
                    iterations: last.iterations,
                    converged: false,
                    anchor_count: validated.len(),
                }
            }
            Err(error) => {
                warn!("Solver rejected ranges: {}", error);
                return Ok(PipelineOutcome::SolveFailed(error));
            }
        };

        Ok(PipelineOutcome::Position(estimate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnchorId, Coordinate3D};

    fn anchor(last: u8) -> AnchorId {
        AnchorId::new([0xc0, 0x98, 0xe5, 0x42, 0, 0, 0, last])
    }

    fn directory() -> AnchorDirectory {
        AnchorDirectory::from_anchors([
            (anchor(1), Coordinate3D::new(0.0, 0.0, 0.0)),
            (anchor(2), Coordinate3D::new(10.0, 0.0, 0.0)),
            (anchor(3), Coordinate3D::new(0.0, 10.0, 0.0)),
        ])
    }

    fn report_for(truth: &Coordinate3D, directory: &AnchorDirectory) -> Vec<u8> {
        let mut ranges: Vec<(AnchorId, f64)> = directory
            .iter()
            .map(|(id, position)| (*id, (truth - position).norm()))
            .collect();
        ranges.sort_by_key(|(id, _)| *id.as_bytes());
        TelemetryParser::new().encode_range_report(&ranges)
    }

    #[test]
    fn test_solves_position() {
        let directory = directory();
        let truth = Coordinate3D::new(3.0, 4.0, 0.0);
        let payload = report_for(&truth, &directory);

        let outcome = PositionPipeline::default()
            .process(&payload, Some(&directory))
            .unwrap();
        match outcome {
            PipelineOutcome::Position(estimate) => {
                assert!(estimate.converged);
                assert_eq!(estimate.anchor_count, 3);
                assert!((estimate.position - truth).norm() < 0.01, "got {:?}", estimate.position);
            }
            other => panic!("expected a position, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_report() {
        let outcome = PositionPipeline::default().process(&[1, 0], None).unwrap();
        assert_eq!(outcome, PipelineOutcome::NoRanges);
    }

    #[test]
    fn test_waits_for_directory() {
        let payload = report_for(&Coordinate3D::new(1.0, 1.0, 0.0), &directory());
        let outcome = PositionPipeline::default().process(&payload, None).unwrap();
        assert_eq!(outcome, PipelineOutcome::DirectoryUnavailable);
    }

    #[test]
    fn test_sentinels_leave_too_few_ranges() {
        let payload = TelemetryParser::new().encode_range_report(&[
            (anchor(1), 5.0),
            (anchor(2), -1000.0),
            (anchor(3), 6.0),
        ]);

        let outcome = PositionPipeline::default()
            .process(&payload, Some(&directory()))
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::InsufficientRanges { valid: 2, required: 3 });
    }

    #[test]
    fn test_forwards_calibration_payload() {
        let outcome = PositionPipeline::default().process(&[2, 9, 9], None).unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Forwarded {
                reason_code: 2,
                payload: vec![2, 9, 9]
            }
        );
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let result = PositionPipeline::default().process(&[1, 2, 0, 0], Some(&directory()));
        assert!(matches!(result, Err(DecodeError::InsufficientData { .. })));
    }

    #[test]
    fn test_iteration_bound_gives_low_confidence_fix() {
        let directory = directory();
        let payload = report_for(&Coordinate3D::new(3.0, 4.0, 0.0), &directory);
        let solver = MultilaterationSolver {
            max_iterations: 1,
            ..MultilaterationSolver::new()
        };
        let pipeline = PositionPipeline::new(RangeValidator::new(), solver);

        match pipeline.process(&payload, Some(&directory)).unwrap() {
            PipelineOutcome::Position(estimate) => {
                assert!(estimate.is_low_confidence());
                assert_eq!(estimate.iterations, 1);
            }
            other => panic!("expected a low-confidence position, got {:?}", other),
        }
    }
}
