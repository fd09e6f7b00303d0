//! Outbound report types

use crate::core::{DeviceIdentity, PositionEstimate, DEVICE_TYPE_TAG};
use crate::directory::DirectoryHandle;
use crate::utils::config::LocatorConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Report metadata expected by the telemetry sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub received_time: DateTime<Utc>,
    pub device_id: String,
    pub device_type: String,
}

/// Solved position as posted to the telemetry sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    #[serde(rename = "_meta")]
    pub meta: ReportMeta,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Only present for fixes where the solver hit its iteration bound
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub low_confidence: bool,
}

impl PositionReport {
    pub fn new(device: &DeviceIdentity, estimate: &PositionEstimate, received_time: DateTime<Utc>) -> Self {
        Self {
            meta: ReportMeta {
                received_time,
                device_id: device.id.clone(),
                device_type: DEVICE_TYPE_TAG.to_string(),
            },
            x: estimate.position.x,
            y: estimate.position.y,
            z: estimate.position.z,
            low_confidence: estimate.is_low_confidence(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// On-screen location line, e.g. `X: 1.23; Y: 4.56; Z: 7.89`
pub fn format_location(estimate: &PositionEstimate) -> String {
    let text = format!(
        "X: {:.2}; Y: {:.2}; Z: {:.2}",
        estimate.position.x, estimate.position.y, estimate.position.z
    );
    if estimate.is_low_confidence() {
        format!("{} (low confidence)", text)
    } else {
        text
    }
}

/// Everything a session needs from the hosting shell, built once at startup
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Paired tag
    pub device: DeviceIdentity,
    /// Shared anchor table, swapped by the refresh loop
    pub directory: DirectoryHandle,
    pub config: LocatorConfig,
}

impl SessionContext {
    pub fn new(device: DeviceIdentity, directory: DirectoryHandle, config: LocatorConfig) -> Self {
        Self {
            device,
            directory,
            config,
        }
    }
}
