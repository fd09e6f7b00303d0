//! Range validation against the anchor directory
//!
//! Decides whether a decoded range report can be handed to the solver, and
//! if not, why not.

use crate::core::{AnchorId, Coordinate3D, RangeMeasurement, MIN_RANGES_FOR_FIX};
use crate::directory::AnchorDirectory;
use std::collections::HashMap;

/// Ranges and anchor coordinates aligned 1:1 for the solver
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRanges {
    pub measurements: Vec<RangeMeasurement>,
    pub anchor_positions: Vec<Coordinate3D>,
    /// Entries dropped as firmware error sentinels
    pub sentinel_count: usize,
    /// Entries dropped because the anchor is not in the directory
    pub unknown_anchor_count: usize,
}

impl ValidatedRanges {
    pub fn ranges(&self) -> Vec<f64> {
        self.measurements.iter().map(|m| m.range_m).collect()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

/// Outcome of validating one range report
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Solver may run
    Ready(ValidatedRanges),
    /// Too few usable ranges; not an error
    InsufficientRanges {
        valid: usize,
        required: usize,
        sentinel_count: usize,
        unknown_anchor_count: usize,
    },
    /// No anchor table loaded yet; positions are deferred
    DirectoryUnavailable,
}

/// Filters ranges to the ones the solver can use
#[derive(Debug, Clone)]
pub struct RangeValidator {
    min_ranges: usize,
}

impl RangeValidator {
    pub fn new() -> Self {
        Self {
            min_ranges: MIN_RANGES_FOR_FIX,
        }
    }

    /// Require more than the minimum of three ranges
    pub fn with_min_ranges(min_ranges: usize) -> Self {
        Self {
            min_ranges: min_ranges.max(MIN_RANGES_FOR_FIX),
        }
    }

    pub fn min_ranges(&self) -> usize {
        self.min_ranges
    }

    pub fn validate(
        &self,
        ranges: &[RangeMeasurement],
        directory: Option<&AnchorDirectory>,
    ) -> ValidationOutcome {
        let directory = match directory {
            Some(directory) if !directory.is_empty() => directory,
            _ => return ValidationOutcome::DirectoryUnavailable,
        };

        let mut sentinel_count = 0;
        let mut unknown_anchor_count = 0;

        // A repeated anchor overrides its earlier range, keeping first-seen order
        let mut order: Vec<AnchorId> = Vec::with_capacity(ranges.len());
        let mut latest: HashMap<AnchorId, (RangeMeasurement, Coordinate3D)> = HashMap::new();

        for measurement in ranges {
            if !measurement.valid {
                sentinel_count += 1;
                continue;
            }

            let Some(position) = directory.get(&measurement.anchor_id) else {
                unknown_anchor_count += 1;
                continue;
            };

            if latest
                .insert(measurement.anchor_id, (*measurement, *position))
                .is_none()
            {
                order.push(measurement.anchor_id);
            }
        }

        let (measurements, anchor_positions): (Vec<_>, Vec<_>) = order
            .iter()
            .filter_map(|id| latest.remove(id))
            .unzip();

        if measurements.len() < self.min_ranges {
            return ValidationOutcome::InsufficientRanges {
                valid: measurements.len(),
                required: self.min_ranges,
                sentinel_count,
                unknown_anchor_count,
            };
        }

        ValidationOutcome::Ready(ValidatedRanges {
            measurements,
            anchor_positions,
            sentinel_count,
            unknown_anchor_count,
        })
    }
}

impl Default for RangeValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(last: u8) -> AnchorId {
        AnchorId::new([0xc0, 0x98, 0xe5, 0x50, 0x50, 0x44, 0x50, last])
    }

    fn directory() -> AnchorDirectory {
        AnchorDirectory::from_anchors([
            (id(1), Coordinate3D::new(0.0, 0.0, 0.0)),
            (id(2), Coordinate3D::new(10.0, 0.0, 0.0)),
            (id(3), Coordinate3D::new(0.0, 10.0, 0.0)),
            (id(4), Coordinate3D::new(10.0, 10.0, 0.0)),
        ])
    }

    #[test]
    fn test_ready_with_aligned_positions() {
        let validator = RangeValidator::new();
        let ranges = vec![
            RangeMeasurement::new(id(3), 6.7),
            RangeMeasurement::new(id(1), 5.0),
            RangeMeasurement::new(id(2), 8.06),
        ];

        let ValidationOutcome::Ready(validated) = validator.validate(&ranges, Some(&directory()))
        else {
            panic!("Expected ready outcome");
        };

        assert_eq!(validated.len(), 3);
        assert_eq!(validated.ranges(), vec![6.7, 5.0, 8.06]);
        assert_eq!(validated.anchor_positions[0], Coordinate3D::new(0.0, 10.0, 0.0));
        assert_eq!(validated.anchor_positions[1], Coordinate3D::new(0.0, 0.0, 0.0));
        assert_eq!(validated.anchor_positions[2], Coordinate3D::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_sentinels_excluded_regardless_of_directory() {
        let validator = RangeValidator::new();
        let ranges = vec![
            RangeMeasurement::new(id(1), 5.0),
            RangeMeasurement::new(id(2), -1000.0),
            RangeMeasurement::new(id(3), -2_000_000.0),
            RangeMeasurement::new(id(4), 7.0),
        ];

        let outcome = validator.validate(&ranges, Some(&directory()));
        assert_eq!(
            outcome,
            ValidationOutcome::InsufficientRanges {
                valid: 2,
                required: 3,
                sentinel_count: 2,
                unknown_anchor_count: 0,
            }
        );
    }

    #[test]
    fn test_unknown_anchors_are_dropped() {
        let validator = RangeValidator::new();
        let ranges = vec![
            RangeMeasurement::new(id(1), 5.0),
            RangeMeasurement::new(id(2), 8.0),
            RangeMeasurement::new(id(3), 6.0),
            RangeMeasurement::new(id(0x99), 1.0),
        ];

        let ValidationOutcome::Ready(validated) = validator.validate(&ranges, Some(&directory()))
        else {
            panic!("Expected ready outcome");
        };
        assert_eq!(validated.len(), 3);
        assert_eq!(validated.unknown_anchor_count, 1);
        assert!(validated.measurements.iter().all(|m| m.anchor_id != id(0x99)));
    }

    #[test]
    fn test_missing_directory_is_distinct_from_invalid_ranges() {
        let validator = RangeValidator::new();
        let ranges = vec![RangeMeasurement::new(id(1), -1000.0)];

        assert_eq!(
            validator.validate(&ranges, None),
            ValidationOutcome::DirectoryUnavailable
        );
        assert_eq!(
            validator.validate(&ranges, Some(&AnchorDirectory::new())),
            ValidationOutcome::DirectoryUnavailable
        );
        assert!(matches!(
            validator.validate(&ranges, Some(&directory())),
            ValidationOutcome::InsufficientRanges { valid: 0, .. }
        ));
    }

    #[test]
    fn test_two_ranges_never_reach_solver() {
        let validator = RangeValidator::new();
        let ranges = vec![
            RangeMeasurement::new(id(1), 5.0),
            RangeMeasurement::new(id(2), 8.0),
        ];
        assert!(matches!(
            validator.validate(&ranges, Some(&directory())),
            ValidationOutcome::InsufficientRanges { valid: 2, required: 3, .. }
        ));
    }

    #[test]
    fn test_repeated_anchor_keeps_latest_range() {
        let validator = RangeValidator::new();
        let ranges = vec![
            RangeMeasurement::new(id(1), 5.0),
            RangeMeasurement::new(id(2), 8.0),
            RangeMeasurement::new(id(1), 5.5),
            RangeMeasurement::new(id(3), 6.0),
        ];

        let ValidationOutcome::Ready(validated) = validator.validate(&ranges, Some(&directory()))
        else {
            panic!("Expected ready outcome");
        };
        assert_eq!(validated.ranges(), vec![5.5, 8.0, 6.0]);
    }

    #[test]
    fn test_min_ranges_never_below_three() {
        assert_eq!(RangeValidator::with_min_ranges(1).min_ranges(), 3);
        assert_eq!(RangeValidator::with_min_ranges(5).min_ranges(), 5);
    }
}
