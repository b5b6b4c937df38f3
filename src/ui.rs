use crate::devices::RowId;
use crate::events::EventLog;
use crate::form::{FieldValue, FormState};
use crate::schema::FieldKind;
use crate::settings::DeviceInfo;
use dioxus::core::NoOpMutations;
use dioxus::prelude::*;

#[derive(Clone, PartialEq)]
pub struct FieldRow {
    pub key: &'static str,
    pub help: Option<&'static str>,
    pub options: Option<&'static [&'static str]>,
    pub value: String,
}

#[derive(Clone, PartialEq)]
pub struct RowView {
    pub id: RowId,
    pub address: String,
    pub alias: String,
    pub address_class: &'static str,
}

#[derive(Props, Clone, PartialEq)]
pub struct PageView {
    pub device_url: String,
    pub firmware: Option<String>,
    pub fields: Vec<FieldRow>,
    pub rows: Vec<RowView>,
    pub events: String,
    pub event_capacity: usize,
}

impl PageView {
    pub fn build(
        form: &FormState,
        log: &EventLog,
        about: Option<&DeviceInfo>,
        device_url: &str,
    ) -> Self {
        let fields = form
            .fields()
            .iter()
            .map(|field| FieldRow {
                key: field.descriptor.key,
                help: field.descriptor.help_text,
                options: match field.descriptor.kind {
                    FieldKind::Text => None,
                    FieldKind::Choice(options) => Some(options),
                },
                value: match &field.value {
                    FieldValue::Text(text) => text.clone(),
                    FieldValue::Choice(choice) => choice.clone().unwrap_or_default(),
                },
            })
            .collect();
        let rows = form
            .devices
            .rows()
            .map(|row| RowView {
                id: row.id,
                address: row.address.clone(),
                alias: row.alias.clone(),
                address_class: if row.invalid {
                    "form-control error"
                } else {
                    "form-control"
                },
            })
            .collect();
        let firmware = about.map(|info| {
            if info.variant.is_empty() {
                format!("Firmware {}", info.version)
            } else {
                format!("Firmware {} ({})", info.version, info.variant)
            }
        });
        Self {
            device_url: device_url.to_string(),
            firmware,
            fields,
            rows,
            events: log.lines().map(String::as_str).collect::<Vec<_>>().join("\n"),
            event_capacity: log.capacity(),
        }
    }
}

pub fn render_html(page: PageView) -> String {
    let mut app = VirtualDom::new_with_props(App, page);
    // Build the tree before rendering to avoid SSR panics.
    let mut noop = NoOpMutations {};
    let _ = app.rebuild(&mut noop);
    dioxus_ssr::render(&mut app)
}

#[component]
fn App(props: PageView) -> Element {
    let styles = r#"
* { box-sizing: border-box; }
body, html { margin: 0; padding: 0; background: #0b0d13; }
.page { min-height: 100vh; display: flex; justify-content: center; padding: 36px 18px; color: #e9ecf5; font-family: "Inter", system-ui, -apple-system, sans-serif; }
.shell { width: min(900px, 100%); display: flex; flex-direction: column; gap: 12px; }
.header { display: flex; flex-direction: column; gap: 6px; }
.title { font-size: 26px; margin: 0; }
.subtitle { margin: 0; color: #9aa4bc; font-size: 15px; }
.tags { display: flex; gap: 8px; flex-wrap: wrap; }
.tag { padding: 8px 12px; border-radius: 999px; background: #10131c; border: 1px solid #1f2431; color: #c5cee3; font-size: 14px; }
.card { background: linear-gradient(145deg, #161a23, #0f1219); border: 1px solid #1f2230; border-radius: 16px; padding: 22px; }
.card-title { margin: 0 0 4px 0; font-size: 20px; }
.muted { color: #8f98ac; margin: 0 0 16px 0; font-size: 14px; }
.form-entry { display: flex; flex-direction: column; gap: 6px; margin-bottom: 12px; }
.field-label { display: flex; gap: 8px; align-items: center; color: #c5cee3; font-size: 14px; }
.field-help { display: inline-flex; width: 18px; height: 18px; border-radius: 50%; align-items: center; justify-content: center; background: #1f2431; color: #9aa4bc; font-size: 12px; cursor: help; }
.form-control { width: 100%; padding: 10px 12px; border-radius: 10px; border: 1px solid #262b38; background: #0f1118; color: #e9ecf5; }
.form-control.error { border-color: #ff4f64; box-shadow: 0 0 0 2px rgba(255,79,100,0.25); }
.choices { display: flex; gap: 12px; flex-wrap: wrap; }
.choice { display: flex; gap: 6px; align-items: center; }
table { width: 100%; border-collapse: collapse; margin-bottom: 10px; }
td { padding: 4px; }
.actions { display: flex; gap: 10px; flex-wrap: wrap; }
.pill-btn { padding: 8px 10px; border-radius: 10px; border: 1px solid #262b38; background: #0f1118; color: #dfe4f3; font-weight: 700; cursor: pointer; }
.primary { padding: 12px 16px; border-radius: 12px; border: none; background: linear-gradient(135deg, #ff5f7a, #ff3c5a); color: #0b0d12; font-weight: 800; cursor: pointer; }
.status { margin-top: 10px; color: #8f98ac; font-size: 14px; min-height: 18px; }
.wifi-events { max-height: 320px; overflow-y: auto; margin: 0; padding: 12px; background: #0f1118; border: 1px solid #1f2230; border-radius: 12px; font-size: 12px; color: #c5cee3; white-space: pre-wrap; }
"#;

    let script = r#"
(() => {
  const settingsForm = document.getElementById('settings');
  const settingsStatus = document.getElementById('settings-status');
  const reloadBtn = document.getElementById('reload-btn');
  const deviceTable = document.getElementById('monitored-devices');
  const deviceStatus = document.getElementById('devices-status');
  const addBtn = document.getElementById('add-device-btn');
  const saveBtn = document.getElementById('save-devices-btn');
  const eventLog = document.getElementById('wifi-events');
  const maxLines = Number(eventLog?.dataset.capacity || 500);

  async function send(method, url, body) {
    const opts = { method, headers: {} };
    if (body !== undefined) {
      opts.headers['Content-Type'] = 'application/json';
      opts.body = JSON.stringify(body);
    }
    const res = await fetch(url, opts);
    const text = await res.text();
    let data = null;
    try { data = text ? JSON.parse(text) : null; } catch (err) { data = text; }
    return { ok: res.ok, status: res.status, data };
  }

  function markFlagged(ids) {
    const flagged = new Set((ids || []).map(String));
    deviceTable.querySelectorAll('tr').forEach((tr) => {
      const input = tr.querySelector('input[name="address"]');
      if (input) input.classList.toggle('error', flagged.has(tr.dataset.row));
    });
  }

  function collectFields() {
    const values = {};
    settingsForm.querySelectorAll('input[data-field]').forEach((input) => {
      if (input.type === 'radio') {
        if (input.checked) values[input.name] = input.value;
      } else {
        values[input.name] = input.value;
      }
    });
    return values;
  }

  settingsForm?.addEventListener('submit', async (e) => {
    e.preventDefault();
    settingsStatus.textContent = 'Saving...';
    try {
      await flushEdits();
      const edit = await send('PUT', '/api/form/fields', collectFields());
      if (!edit.ok) throw new Error(edit.data);
      const res = await send('POST', '/api/form/submit');
      if (!res.ok) throw new Error(res.data);
      markFlagged(res.data.flagged_rows);
      settingsStatus.textContent = res.data.flagged_rows.length
        ? 'Settings saved; device list skipped until flagged rows are fixed'
        : 'Settings saved';
    } catch (err) {
      settingsStatus.textContent = `Save failed: ${err.message}`;
    }
  });

  reloadBtn?.addEventListener('click', async () => {
    settingsStatus.textContent = 'Loading from device...';
    const res = await send('POST', '/api/form/load');
    if (res.ok) {
      window.location.reload();
    } else {
      settingsStatus.textContent = `Load failed: ${res.data}`;
    }
  });

  // Row edits still in flight, keyed by row id.
  const pendingEdits = new Map();

  async function flushEdits() {
    await Promise.all([...pendingEdits.values()]);
  }

  function bindRow(tr) {
    const id = tr.dataset.row;
    const update = () => {
      const edit = send('PUT', `/api/devices/rows/${id}`, {
        address: tr.querySelector('input[name="address"]').value,
        alias: tr.querySelector('input[name="alias"]').value,
      }).catch(() => {});
      pendingEdits.set(id, edit);
      edit.finally(() => {
        if (pendingEdits.get(id) === edit) pendingEdits.delete(id);
      });
      return edit;
    };
    tr.querySelectorAll('input').forEach((input) => input.addEventListener('change', update));
    tr.querySelector('.remove-device')?.addEventListener('click', async () => {
      const res = await send('DELETE', `/api/devices/rows/${id}`);
      if (res.ok) tr.remove();
    });
  }

  function newRow(id) {
    const tr = document.createElement('tr');
    tr.dataset.row = id;
    ['address', 'alias'].forEach((name) => {
      const td = document.createElement('td');
      const input = document.createElement('input');
      input.name = name;
      input.className = 'form-control';
      td.appendChild(input);
      tr.appendChild(td);
    });
    const td = document.createElement('td');
    const btn = document.createElement('button');
    btn.type = 'button';
    btn.className = 'pill-btn remove-device';
    btn.textContent = 'Remove';
    td.appendChild(btn);
    tr.appendChild(td);
    return tr;
  }

  deviceTable?.querySelectorAll('tr').forEach(bindRow);

  addBtn?.addEventListener('click', async () => {
    const res = await send('POST', '/api/devices/rows');
    if (!res.ok) return;
    const tr = newRow(res.data.id);
    deviceTable.appendChild(tr);
    bindRow(tr);
  });

  saveBtn?.addEventListener('click', async () => {
    deviceStatus.textContent = 'Saving devices...';
    await flushEdits();
    const res = await send('POST', '/api/devices/save');
    if (res.ok) {
      markFlagged([]);
      deviceStatus.textContent = `Saved ${res.data.saved.length} device(s)`;
    } else if (res.status === 422) {
      markFlagged(res.data.flagged_rows);
      deviceStatus.textContent = res.data.error;
    } else {
      deviceStatus.textContent = `Save failed: ${res.data}`;
    }
  });

  const ws = new WebSocket(`ws://${window.location.host}/ws/events`);
  ws.onmessage = (e) => {
    const lines = eventLog.textContent ? eventLog.textContent.split('\n') : [];
    lines.push(e.data);
    eventLog.textContent = lines.slice(-maxLines).join('\n');
    eventLog.scrollTop = eventLog.scrollHeight;
  };
})();
"#;

    rsx! {
        div { class: "page",
            meta { name: "viewport", content: "width=device-width, initial-scale=1" }
            div { class: "shell",
                div { class: "header",
                    h1 { class: "title", "Dash Stadium" }
                    p { class: "subtitle", "Presence detector control panel" }
                    div { class: "tags",
                        div { class: "tag", "Device {props.device_url}" }
                        if let Some(firmware) = &props.firmware {
                            div { class: "tag", "{firmware}" }
                        }
                    }
                }
                div { class: "card",
                    h2 { class: "card-title", "Settings" }
                    p { class: "muted", "Values currently stored on the device." }
                    form { id: "settings",
                        for field in props.fields.iter() {
                            div { class: "form-entry",
                                div { class: "field-label",
                                    label { r#for: "{field.key}", "{field.key}" }
                                    if let Some(help) = field.help {
                                        span { class: "field-help", title: "{help}", "?" }
                                    }
                                }
                                if let Some(options) = field.options {
                                    div { class: "choices",
                                        for option in options.iter() {
                                            label { class: "choice",
                                                input {
                                                    r#type: "radio",
                                                    name: "{field.key}",
                                                    value: "{option}",
                                                    checked: field.value == *option,
                                                    "data-field": "true",
                                                }
                                                span { "{option}" }
                                            }
                                        }
                                    }
                                } else {
                                    input {
                                        r#type: "text",
                                        class: "form-control",
                                        id: "{field.key}",
                                        name: "{field.key}",
                                        value: "{field.value}",
                                        "data-field": "true",
                                    }
                                }
                            }
                        }
                        div { class: "actions",
                            button { r#type: "submit", class: "primary", "Save settings" }
                            button { id: "reload-btn", r#type: "button", class: "pill-btn", "Reload from device" }
                        }
                        div { id: "settings-status", class: "status" }
                    }
                }
                div { class: "card",
                    h2 { class: "card-title", "Monitored devices" }
                    p { class: "muted", "Hardware addresses to report, with a friendly alias." }
                    table {
                        tbody { id: "monitored-devices",
                            for row in props.rows.iter() {
                                tr { "data-row": "{row.id}",
                                    td {
                                        input { name: "address", class: "{row.address_class}", value: "{row.address}" }
                                    }
                                    td {
                                        input { name: "alias", class: "form-control", value: "{row.alias}" }
                                    }
                                    td {
                                        button { r#type: "button", class: "pill-btn remove-device", "Remove" }
                                    }
                                }
                            }
                        }
                    }
                    div { class: "actions",
                        button { id: "add-device-btn", r#type: "button", class: "pill-btn", "Add device" }
                        button { id: "save-devices-btn", r#type: "button", class: "primary", "Save devices" }
                    }
                    div { id: "devices-status", class: "status" }
                }
                div { class: "card",
                    h2 { class: "card-title", "Events" }
                    p { class: "muted", "Detections pushed by the device, newest last." }
                    pre {
                        id: "wifi-events",
                        class: "wifi-events",
                        "data-capacity": "{props.event_capacity}",
                        "{props.events}"
                    }
                }
            }
        }
        style { "{styles}" }
        script { "{script}" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::MonitoredDevice;
    use crate::schema::{FieldDescriptor, FieldSchema, SETTINGS_SCHEMA};

    #[test]
    fn renders_every_schema_field_with_help() {
        let form = FormState::new(SETTINGS_SCHEMA);
        let html = render_html(PageView::build(&form, &EventLog::new(10), None, "http://d"));
        for field in SETTINGS_SCHEMA.iter() {
            assert!(html.contains(&format!("name=\"{}\"", field.key)), "{}", field.key);
        }
        assert_eq!(html.matches("class=\"field-help\"").count(), 2);
        assert!(!html.contains("Firmware"));
    }

    #[test]
    fn saves_wait_for_pending_row_edits() {
        let html = render_html(PageView::build(
            &FormState::new(SETTINGS_SCHEMA),
            &EventLog::new(10),
            None,
            "http://d",
        ));
        assert!(html.contains("await Promise.all([...pendingEdits.values()])"));
        for call in ["'/api/devices/save'", "'/api/form/fields'"] {
            let at = html.find(call).unwrap();
            let flushed = html[..at].rfind("await flushEdits();").unwrap();
            let between = &html[flushed..at];
            assert_eq!(between.matches("addEventListener").count(), 0, "{call}");
        }
    }

    #[test]
    fn marks_invalid_rows() {
        let mut form = FormState::new(SETTINGS_SCHEMA);
        form.devices.reset(&[
            MonitoredDevice::new("aa:bb:cc:dd:ee:ff", "porch"),
            MonitoredDevice::new("nope", "broken"),
        ]);
        let _ = form.devices.validate();
        let page = PageView::build(&form, &EventLog::new(10), None, "http://d");
        let classes: Vec<_> = page.rows.iter().map(|r| r.address_class).collect();
        assert_eq!(classes, vec!["form-control", "form-control error"]);
    }

    #[test]
    fn checkable_fields_render_as_radios() {
        const FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
            key: "mode",
            help_text: None,
            kind: FieldKind::Choice(&["station", "access-point"]),
        }];
        let mut form = FormState::new(FieldSchema::new(FIELDS));
        form.set_field("mode", "station".into()).unwrap();
        let page = PageView::build(&form, &EventLog::new(10), None, "http://d");
        assert_eq!(page.fields[0].value, "station");
        let html = render_html(page);
        assert_eq!(html.matches("type=\"radio\"").count(), 2);
    }

    #[test]
    fn joins_event_lines() {
        let form = FormState::new(SETTINGS_SCHEMA);
        let mut log = EventLog::new(10);
        log.push("a".into());
        log.push("b".into());
        let about = DeviceInfo {
            version: "1.0.0".into(),
            variant: "esp07".into(),
            ..DeviceInfo::default()
        };
        let page = PageView::build(&form, &log, Some(&about), "http://d");
        assert_eq!(page.events, "a\nb");
        assert_eq!(page.event_capacity, 10);
        assert_eq!(page.firmware.as_deref(), Some("Firmware 1.0.0 (esp07)"));
    }
}
