//! Settings form state and its synchronisation with the device.

use crate::devices::{DeviceListEditor, RowId, ValidationError};
use crate::schema::{FieldDescriptor, FieldKind, FieldSchema};
use crate::settings::SettingsDocument;
use crate::store::{SettingsStore, StoreError};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// Selected option of a checkable field, if any.
    Choice(Option<String>),
}

impl FieldValue {
    fn empty(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::Choice(_) => FieldValue::Choice(None),
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            FieldValue::Text(text) => text,
            FieldValue::Choice(choice) => choice.as_deref().unwrap_or(""),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormField {
    pub descriptor: &'static FieldDescriptor,
    pub value: FieldValue,
}

/// Result of a combined submit.
#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub document: SettingsDocument,
    /// Rows that failed validation and were therefore left out of the update.
    pub flagged_rows: Vec<RowId>,
}

#[derive(Debug, thiserror::Error)]
#[error("{key} cannot be set to {value:?}")]
pub struct FieldError {
    pub key: String,
    pub value: String,
}

/// Everything the operator can edit: one value per schema field plus the
/// device list.
#[derive(Clone, Debug)]
pub struct FormState {
    schema: FieldSchema,
    fields: Vec<FormField>,
    pub devices: DeviceListEditor,
}

impl FormState {
    pub fn new(schema: FieldSchema) -> Self {
        let fields = schema
            .iter()
            .map(|descriptor| FormField {
                descriptor,
                value: FieldValue::empty(&descriptor.kind),
            })
            .collect();
        Self {
            schema,
            fields,
            devices: DeviceListEditor::new(),
        }
    }

    pub fn schema(&self) -> FieldSchema {
        self.schema
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Records an operator edit. Unknown keys and options outside a
    /// checkable field's set are rejected.
    pub fn set_field(&mut self, key: &str, value: String) -> Result<(), FieldError> {
        let new_value = match self.schema.get(key).map(|descriptor| descriptor.kind) {
            Some(FieldKind::Text) => FieldValue::Text(value),
            Some(FieldKind::Choice(options)) if options.contains(&value.as_str()) => {
                FieldValue::Choice(Some(value))
            }
            _ => {
                return Err(FieldError {
                    key: key.to_string(),
                    value,
                });
            }
        };
        // Fields are built from the schema, so the key is always present.
        if let Some(field) = self.fields.iter_mut().find(|f| f.descriptor.key == key) {
            field.value = new_value;
        }
        Ok(())
    }

    /// Copies every scalar the document carries into the form, then replaces
    /// the device rows if the document has a list. Absent keys keep their
    /// current value.
    pub fn apply(&mut self, document: &SettingsDocument) {
        for field in &mut self.fields {
            let Some(value) = document.scalar(field.descriptor.key) else {
                continue;
            };
            match field.descriptor.kind {
                FieldKind::Text => field.value = FieldValue::Text(value),
                FieldKind::Choice(options) => {
                    if options.contains(&value.as_str()) {
                        field.value = FieldValue::Choice(Some(value));
                    } else {
                        tracing::debug!(
                            "Ignoring {value:?} for {}: not one of its options",
                            field.descriptor.key
                        );
                    }
                }
            }
        }
        if let Some(devices) = &document.monitored_macs {
            self.devices.reset(devices);
        }
    }

    /// Fetches the device's settings and applies them. On failure the form
    /// is left exactly as it was.
    pub async fn load(&mut self, store: &dyn SettingsStore) -> Result<(), StoreError> {
        let document = store.fetch().await.inspect_err(|err| {
            tracing::warn!("Loading settings failed: {err}");
        })?;
        self.apply(&document);
        tracing::info!(
            "Loaded settings ({} keys, {} monitored devices)",
            document.values.len(),
            self.devices.len()
        );
        Ok(())
    }

    /// Scalar fields only; every field is present, empty ones as `""`.
    pub fn serialize(&self) -> SettingsDocument {
        let mut document = SettingsDocument::default();
        for field in &self.fields {
            document.set_scalar(field.descriptor.key, field.value.as_text().to_string());
        }
        document
    }

    /// Builds the single update sent on submit. The device list rides along
    /// when every row validates; otherwise it is left out and the flagged
    /// rows are reported.
    pub fn submission(&mut self) -> (SettingsDocument, Vec<RowId>) {
        let mut document = self.serialize();
        match self.devices.validate() {
            Ok(devices) => {
                document.monitored_macs = Some(devices);
                (document, Vec::new())
            }
            Err(ValidationError { rows }) => (document, rows),
        }
    }

    pub async fn submit(&mut self, store: &dyn SettingsStore) -> Result<SubmitOutcome, StoreError> {
        let (document, flagged_rows) = self.submission();
        if !flagged_rows.is_empty() {
            tracing::info!(
                "Submitting settings without device list: {} row(s) invalid",
                flagged_rows.len()
            );
        }
        store.update(&document).await?;
        Ok(SubmitOutcome {
            document,
            flagged_rows,
        })
    }
}
