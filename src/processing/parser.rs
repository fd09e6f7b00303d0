use crate::core::{
    AnchorId, RangeMeasurement, ANCHOR_ID_LEN, RANGE_HEADER_LEN, RANGE_RECORD_LEN,
    REASON_RANGES,
};
use thiserror::Error;

/// Decoded telemetry payload
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// Range report, one entry per record including error sentinels
    Ranges(Vec<RangeMeasurement>),
    /// Any other reason code, passed through untouched
    Forwarded { reason_code: u8, payload: Vec<u8> },
}

/// Errors that can occur while decoding a telemetry payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("empty telemetry payload")]
    EmptyPayload,
    #[error("range report missing record count")]
    MissingCount,
    #[error("insufficient data: {records} records need {required} bytes, got {available}")]
    InsufficientData {
        records: u8,
        required: usize,
        available: usize,
    },
}

/// Parser for the tag's location characteristic payload.
///
/// Layout: `[reason(1)] [count(1)] count * ([anchor_id(8)] [range_mm i32 LE (4)])`
#[derive(Debug, Clone, Copy)]
pub struct TelemetryParser;

impl TelemetryParser {
    pub fn new() -> Self {
        TelemetryParser
    }

    /// Parse a raw payload read from the location characteristic
    pub fn parse_payload(&self, data: &[u8]) -> Result<Telemetry, DecodeError> {
        let reason_code = *data.first().ok_or(DecodeError::EmptyPayload)?;

        if reason_code != REASON_RANGES {
            return Ok(Telemetry::Forwarded {
                reason_code,
                payload: data.to_vec(),
            });
        }

        self.parse_range_report(data).map(Telemetry::Ranges)
    }

    fn parse_range_report(&self, data: &[u8]) -> Result<Vec<RangeMeasurement>, DecodeError> {
        let count = *data.get(1).ok_or(DecodeError::MissingCount)?;
        let required = RANGE_HEADER_LEN + count as usize * RANGE_RECORD_LEN;

        if data.len() < required {
            return Err(DecodeError::InsufficientData {
                records: count,
                required,
                available: data.len(),
            });
        }

        let records = data[RANGE_HEADER_LEN..required].chunks_exact(RANGE_RECORD_LEN);
        let ranges = records
            .map(|record| {
                let mut wire_id = [0u8; ANCHOR_ID_LEN];
                wire_id.copy_from_slice(&record[..ANCHOR_ID_LEN]);

                let range_mm = i32::from_le_bytes([
                    record[ANCHOR_ID_LEN],
                    record[ANCHOR_ID_LEN + 1],
                    record[ANCHOR_ID_LEN + 2],
                    record[ANCHOR_ID_LEN + 3],
                ]);

                RangeMeasurement::new(AnchorId::from_wire(wire_id), range_mm as f64 / 1000.0)
            })
            .collect();

        Ok(ranges)
    }

    /// Build a range report payload, rounding each range to whole millimeters.
    /// At most 255 records are encoded.
    pub fn encode_range_report(&self, ranges: &[(AnchorId, f64)]) -> Vec<u8> {
        let count = ranges.len().min(u8::MAX as usize);
        let mut data = Vec::with_capacity(RANGE_HEADER_LEN + count * RANGE_RECORD_LEN);
        data.push(REASON_RANGES);
        data.push(count as u8);

        for (anchor_id, range_m) in &ranges[..count] {
            let range_mm = (range_m * 1000.0)
                .round()
                .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
            data.extend_from_slice(&anchor_id.to_wire());
            data.extend_from_slice(&range_mm.to_le_bytes());
        }

        data
    }
}

impl Default for TelemetryParser {
    fn default() -> Self {
        Self::new()
    }
}
