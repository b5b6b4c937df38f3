use crate::devices::MonitoredDevice;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MONITORED_MACS: &str = "monitored_macs";

/// Settings bag exchanged wholesale with the device.
///
/// The device list is the only structured value; everything else is kept
/// as raw JSON so unknown keys survive a round trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitored_macs: Option<Vec<MonitoredDevice>>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl SettingsDocument {
    pub fn with_devices(devices: Vec<MonitoredDevice>) -> Self {
        Self {
            monitored_macs: Some(devices),
            values: Map::new(),
        }
    }

    /// Text form of a scalar value. Structured and null values have none.
    pub fn scalar(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn set_scalar(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), Value::String(value));
    }
}

/// Firmware details reported by the device's `/about` endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub version: String,
    pub variant: String,
    pub free_heap: u64,
    pub arduino_version: String,
    pub reset_reason: String,
}
