use crate::settings::SettingsDocument;
use crate::store::{SettingsStore, StoreError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    static ref HARDWARE_ADDRESS: Regex =
        Regex::new(r"(?i)^([0-9a-f]{1,2}:){5}[0-9a-f]{1,2}$").expect("address grammar compiles");
}

/// `true` when `input` is six colon-separated groups of one or two hex digits.
pub fn is_hardware_address(input: &str) -> bool {
    HARDWARE_ADDRESS.is_match(input)
}

/// A monitored address with its display alias. On the wire: `[address, alias]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct MonitoredDevice {
    pub address: String,
    pub alias: String,
}

impl MonitoredDevice {
    pub fn new(address: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            alias: alias.into(),
        }
    }
}

impl From<(String, String)> for MonitoredDevice {
    fn from((address, alias): (String, String)) -> Self {
        Self { address, alias }
    }
}

impl From<MonitoredDevice> for (String, String) {
    fn from(device: MonitoredDevice) -> Self {
        (device.address, device.alias)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceRow {
    pub id: RowId,
    pub address: String,
    pub alias: String,
    /// Visible marker left by the last validation pass.
    pub invalid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} monitored device address(es) are not valid hardware addresses", .rows.len())]
pub struct ValidationError {
    pub rows: Vec<RowId>,
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Editable list of monitored devices.
///
/// Ids come from a counter that only grows, so iterating the map by id
/// yields rows in display order and removals never shift other rows.
#[derive(Clone, Debug, Default)]
pub struct DeviceListEditor {
    rows: BTreeMap<RowId, DeviceRow>,
    next_id: u64,
}

impl DeviceListEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> impl Iterator<Item = &DeviceRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn reset(&mut self, devices: &[MonitoredDevice]) {
        self.rows.clear();
        for device in devices {
            self.push(device.address.clone(), device.alias.clone());
        }
    }

    pub fn add_row(&mut self) -> RowId {
        self.push(String::new(), String::new())
    }

    pub fn remove_row(&mut self, id: RowId) -> bool {
        self.rows.remove(&id).is_some()
    }

    pub fn update_row(&mut self, id: RowId, address: String, alias: String) -> bool {
        match self.rows.get_mut(&id) {
            Some(row) => {
                row.address = address;
                row.alias = alias;
                true
            }
            None => false,
        }
    }

    /// Checks every address, marking the ones that fail. Values are never
    /// cleared and aliases are accepted as-is.
    pub fn validate(&mut self) -> Result<Vec<MonitoredDevice>, ValidationError> {
        let mut flagged = Vec::new();
        for row in self.rows.values_mut() {
            row.invalid = !is_hardware_address(&row.address);
            if row.invalid {
                flagged.push(row.id);
            }
        }
        if !flagged.is_empty() {
            return Err(ValidationError { rows: flagged });
        }
        Ok(self
            .rows
            .values()
            .map(|row| MonitoredDevice::new(row.address.clone(), row.alias.clone()))
            .collect())
    }

    /// Validates and, only when every row passes, stores the list on its own.
    pub async fn save(
        &mut self,
        store: &dyn SettingsStore,
    ) -> Result<Vec<MonitoredDevice>, SaveError> {
        let devices = self.validate().inspect_err(|err| {
            tracing::info!("Device list not saved: {err}");
        })?;
        let update = SettingsDocument::with_devices(devices.clone());
        store.update(&update).await?;
        tracing::info!("Saved {} monitored device(s)", devices.len());
        Ok(devices)
    }

    fn push(&mut self, address: String, alias: String) -> RowId {
        let id = RowId(self.next_id);
        self.next_id += 1;
        self.rows.insert(
            id,
            DeviceRow {
                id,
                address,
                alias,
                invalid: false,
            },
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingStore;

    fn sample() -> Vec<MonitoredDevice> {
        vec![
            MonitoredDevice::new("aa:bb:cc:dd:ee:ff", "porch"),
            MonitoredDevice::new("11:22:33:44:55:66", "gate"),
        ]
    }

    fn snapshot(editor: &DeviceListEditor) -> Vec<DeviceRow> {
        editor.rows().cloned().collect()
    }

    #[test]
    fn grammar_accepts_short_and_mixed_case_groups() {
        for ok in ["1:2:3:4:5:6", "1:22:3:4:5:66", "a1:02:3:44:05:6", "AA:bb:Cc:dD:ee:FF"] {
            assert!(is_hardware_address(ok), "{ok} should match");
        }
    }

    #[test]
    fn grammar_rejects_bad_digits_counts_and_delimiters() {
        for bad in [
            "",
            "zz:11:22:33:44:55",
            "g1:22:33:44:55:66",
            "11:22:33:44:55",
            "11:22:33:44:55:66:77",
            "111:22:33:44:55:66",
            "11-22-33-44-55-66",
            "11:22:33:44:55:",
            " 11:22:33:44:55:66",
        ] {
            assert!(!is_hardware_address(bad), "{bad:?} should not match");
        }
    }

    #[test]
    fn wire_form_is_a_pair() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"[["aa:bb:cc:dd:ee:ff","porch"],["11:22:33:44:55:66","gate"]]"#
        );
        let back: Vec<MonitoredDevice> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn reset_then_validate_preserves_order() {
        let mut editor = DeviceListEditor::new();
        editor.add_row();
        editor.reset(&sample());
        assert_eq!(editor.len(), 2);
        assert_eq!(editor.validate().unwrap(), sample());
    }

    #[test]
    fn add_then_remove_restores_rows() {
        let mut editor = DeviceListEditor::new();
        editor.reset(&sample());
        let before = snapshot(&editor);

        let id = editor.add_row();
        let added = editor.rows().last().unwrap();
        assert_eq!((added.address.as_str(), added.alias.as_str()), ("", ""));
        assert!(editor.remove_row(id));
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn remove_targets_the_row_not_a_position() {
        let mut editor = DeviceListEditor::new();
        editor.reset(&sample());
        let first = editor.rows().next().unwrap().id;
        let extra = editor.add_row();
        editor.update_row(extra, "1:2:3:4:5:6".into(), "shed".into());

        assert!(editor.remove_row(first));
        assert!(!editor.remove_row(first));
        let left: Vec<_> = editor.rows().map(|r| r.alias.as_str()).collect();
        assert_eq!(left, vec!["gate", "shed"]);
    }

    #[test]
    fn invalid_rows_are_marked_and_keep_their_value() {
        let mut editor = DeviceListEditor::new();
        editor.reset(&[
            MonitoredDevice::new("aa:bb:cc:dd:ee:ff", "porch"),
            MonitoredDevice::new("zz:11:22:33:44:55", "broken"),
            MonitoredDevice::new("11:22:33:44:55:66", ""),
        ]);
        let bad = editor.rows().nth(1).unwrap().id;

        let err = editor.validate().unwrap_err();
        assert_eq!(err.rows, vec![bad]);
        let marks: Vec<_> = editor.rows().map(|r| r.invalid).collect();
        assert_eq!(marks, vec![false, true, false]);
        assert_eq!(editor.rows().nth(1).unwrap().address, "zz:11:22:33:44:55");

        editor.update_row(bad, "1:2:3:4:5:6".into(), "fixed".into());
        assert_eq!(editor.validate().unwrap().len(), 3);
        assert!(editor.rows().all(|r| !r.invalid));
    }

    #[test]
    fn reset_clears_markers() {
        let mut editor = DeviceListEditor::new();
        editor.add_row();
        assert!(editor.validate().is_err());
        editor.reset(&sample());
        assert!(editor.rows().all(|r| !r.invalid));
    }

    #[test]
    fn duplicates_are_allowed() {
        let mut editor = DeviceListEditor::new();
        let twice = vec![sample()[0].clone(), sample()[0].clone()];
        editor.reset(&twice);
        assert_eq!(editor.validate().unwrap(), twice);
    }

    #[tokio::test]
    async fn save_sends_only_the_device_list() {
        let store = RecordingStore::default();
        let mut editor = DeviceListEditor::new();
        editor.reset(&sample());

        let saved = editor.save(&store).await.unwrap();
        assert_eq!(saved, sample());
        let updates = store.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(
            serde_json::to_value(&updates[0]).unwrap(),
            serde_json::json!({
                "monitored_macs": [["aa:bb:cc:dd:ee:ff", "porch"], ["11:22:33:44:55:66", "gate"]]
            })
        );
    }

    #[tokio::test]
    async fn one_invalid_row_blocks_the_save() {
        let store = RecordingStore::default();
        let mut editor = DeviceListEditor::new();
        editor.reset(&[
            sample()[0].clone(),
            MonitoredDevice::new("11:22:33:44:55", "short"),
            sample()[1].clone(),
        ]);

        let err = editor.save(&store).await.unwrap_err();
        assert!(matches!(err, SaveError::Validation(ref v) if v.rows.len() == 1));
        assert!(store.updates().await.is_empty());
        assert_eq!(editor.rows().filter(|r| r.invalid).count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let store = RecordingStore::failing();
        let mut editor = DeviceListEditor::new();
        editor.reset(&sample());
        let err = editor.save(&store).await.unwrap_err();
        assert!(matches!(err, SaveError::Store(_)));
    }
}
