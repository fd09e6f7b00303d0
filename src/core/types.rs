//! Core data types for the positioning system

use crate::core::constants::{ANCHOR_ID_LEN, RANGE_ERROR_SENTINEL_M};
use nalgebra::Vector3;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Position in the anchors' shared frame (meters, arbitrary origin)
pub type Coordinate3D = Vector3<f64>;

/// 8-byte anchor hardware address.
///
/// Bytes are stored most significant first, which is also the rendering
/// order. On the wire the address is little-endian, so `from_wire` reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId([u8; ANCHOR_ID_LEN]);

/// Errors from parsing a rendered anchor identifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnchorIdError {
    #[error("anchor id must have {expected} octets, got {found}")]
    WrongLength { expected: usize, found: usize },
    #[error("invalid octet {octet:?} in anchor id")]
    InvalidOctet { octet: String },
}

impl AnchorId {
    /// Build from bytes already in most-significant-first order
    pub const fn new(bytes: [u8; ANCHOR_ID_LEN]) -> Self {
        AnchorId(bytes)
    }

    /// Build from the little-endian byte order used in telemetry payloads
    pub fn from_wire(wire: [u8; ANCHOR_ID_LEN]) -> Self {
        let mut bytes = wire;
        bytes.reverse();
        AnchorId(bytes)
    }

    /// Bytes in telemetry (little-endian) order
    pub fn to_wire(&self) -> [u8; ANCHOR_ID_LEN] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }

    pub fn as_bytes(&self) -> &[u8; ANCHOR_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for AnchorId {
    type Err = AnchorIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split(':').collect();
        if octets.len() != ANCHOR_ID_LEN {
            return Err(AnchorIdError::WrongLength {
                expected: ANCHOR_ID_LEN,
                found: octets.len(),
            });
        }

        let mut bytes = [0u8; ANCHOR_ID_LEN];
        for (slot, octet) in bytes.iter_mut().zip(octets) {
            if octet.len() != 2 {
                return Err(AnchorIdError::InvalidOctet { octet: octet.to_string() });
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| AnchorIdError::InvalidOctet { octet: octet.to_string() })?;
        }

        Ok(AnchorId(bytes))
    }
}

/// One decoded range between the tag and an anchor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMeasurement {
    pub anchor_id: AnchorId,
    /// Distance in meters
    pub range_m: f64,
    /// False for firmware error sentinels
    pub valid: bool,
}

impl RangeMeasurement {
    pub fn new(anchor_id: AnchorId, range_m: f64) -> Self {
        Self {
            anchor_id,
            range_m,
            valid: range_m.is_finite() && range_m > RANGE_ERROR_SENTINEL_M,
        }
    }
}

/// Solver output for one telemetry payload
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEstimate {
    pub position: Coordinate3D,
    /// Sum of squared range errors at `position`
    pub residual: f64,
    pub iterations: usize,
    /// False when the iteration bound was hit; the point is best effort
    pub converged: bool,
    pub anchor_count: usize,
}

impl PositionEstimate {
    pub fn is_low_confidence(&self) -> bool {
        !self.converged
    }
}

/// Paired tag identity handed over by the hosting shell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_id_renders_reversed_wire_order() {
        let wire = [0x1d, 0x50, 0x44, 0x50, 0x50, 0xe5, 0x98, 0xc0];
        let id = AnchorId::from_wire(wire);
        assert_eq!(id.to_string(), "c0:98:e5:50:50:44:50:1d");
        assert_eq!(id.to_wire(), wire);
    }

    #[test]
    fn test_anchor_id_parse() {
        let id: AnchorId = "C0:98:E5:50:50:44:50:0F".parse().unwrap();
        assert_eq!(id.to_string(), "c0:98:e5:50:50:44:50:0f");
        assert_eq!(id.as_bytes()[7], 0x0f);
    }

    #[test]
    fn test_anchor_id_parse_rejects_bad_input() {
        assert!(matches!(
            "c0:98:e5".parse::<AnchorId>(),
            Err(AnchorIdError::WrongLength { found: 3, .. })
        ));
        assert!(matches!(
            "c0:98:e5:50:50:44:50:zz".parse::<AnchorId>(),
            Err(AnchorIdError::InvalidOctet { .. })
        ));
        assert!(matches!(
            "c0:98:e5:50:50:44:50:1".parse::<AnchorId>(),
            Err(AnchorIdError::InvalidOctet { .. })
        ));
    }

    #[test]
    fn test_range_measurement_validity() {
        let id = AnchorId::new([0; 8]);
        assert!(RangeMeasurement::new(id, 3.2).valid);
        assert!(RangeMeasurement::new(id, -999.999).valid);
        assert!(!RangeMeasurement::new(id, -1000.0).valid);
        assert!(!RangeMeasurement::new(id, -2147483.648).valid);
    }
}
