//! Declarative description of the device's scalar settings.
//!
//! The schema drives both the rendered form and the wire mapping: a
//! descriptor's key is the JSON key on the device and the form-control name.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "kebab-case")]
pub enum FieldKind {
    Text,
    /// Checkable field: exactly one of a fixed set of options.
    Choice(&'static [&'static str]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub help_text: Option<&'static str>,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub const fn text(key: &'static str) -> Self {
        Self {
            key,
            help_text: None,
            kind: FieldKind::Text,
        }
    }

    pub const fn with_help(self, help_text: &'static str) -> Self {
        Self {
            help_text: Some(help_text),
            ..self
        }
    }
}

/// Ordered sequence of descriptors; order is display order and keys are unique.
#[derive(Clone, Copy, Debug)]
pub struct FieldSchema(&'static [FieldDescriptor]);

impl FieldSchema {
    pub const fn new(fields: &'static [FieldDescriptor]) -> Self {
        Self(fields)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&'static FieldDescriptor> {
        self.0.iter().find(|field| field.key == key)
    }
}

const DEVICE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::text("admin_username"),
    FieldDescriptor::text("admin_password"),
    FieldDescriptor::text("mqtt_server").with_help(
        "Domain or IP address of MQTT broker. Optionally specify a port \
         with (example) mymqqtbroker.com:1884.",
    ),
    FieldDescriptor::text("mqtt_topic_pattern").with_help(
        "Pattern for MQTT topic. Example: dash_stadium/:event_type/:mac_addr. \
         See README for further details.",
    ),
    FieldDescriptor::text("mqtt_username"),
    FieldDescriptor::text("mqtt_password"),
    FieldDescriptor::text("ap_name"),
    FieldDescriptor::text("ap_password"),
    FieldDescriptor::text("debounce_threshold_ms"),
];

pub const SETTINGS_SCHEMA: FieldSchema = FieldSchema::new(DEVICE_FIELDS);
