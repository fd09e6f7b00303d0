//! Wire-format constants and device identifiers

/// First payload byte of a range report
pub const REASON_RANGES: u8 = 0x01;

/// First payload byte of a calibration report
pub const REASON_CALIBRATION: u8 = 0x02;

/// Reason code plus record count
pub const RANGE_HEADER_LEN: usize = 2;

/// 8-byte anchor identifier followed by a 4-byte millimeter range
pub const RANGE_RECORD_LEN: usize = 12;

/// Length of an anchor hardware address in bytes
pub const ANCHOR_ID_LEN: usize = 8;

/// Ranges at or below this value (meters) are firmware error codes
pub const RANGE_ERROR_SENTINEL_M: f64 = -1000.0;

/// Fewest valid ranges the solver accepts
pub const MIN_RANGES_FOR_FIX: usize = 3;

/// Device type tag attached to outbound position reports
pub const DEVICE_TYPE_TAG: &str = "totternary_tag";

/// Substring of a link failure reason meaning the peripheral is gone
pub const PERIPHERAL_NOT_FOUND_SIGNATURE: &str = "not found";

/// GATT service exposed by the tag
pub const SERVICE_UUID: &str = "d68c3152-a23f-ee90-0c45-5231395e5d2e";
pub const LOCATION_CHAR_UUID: &str = "d68c3153-a23f-ee90-0c45-5231395e5d2e";
pub const RANGING_CHAR_UUID: &str = "d68c3154-a23f-ee90-0c45-5231395e5d2e";
pub const STATUS_CHAR_UUID: &str = "d68c3155-a23f-ee90-0c45-5231395e5d2e";
pub const CALIBRATION_CHAR_UUID: &str = "d68c3156-a23f-ee90-0c45-5231395e5d2e";
