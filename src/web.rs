use crate::config::PanelConfig;
use crate::devices::{DeviceRow, MonitoredDevice, RowId, SaveError};
use crate::events::EventMonitor;
use crate::form::{FormState, SubmitOutcome};
use crate::schema::FieldKind;
use crate::settings::DeviceInfo;
use crate::store::{SettingsStore, StoreError};
use crate::ui;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PanelConfig>,
    pub store: Arc<dyn SettingsStore>,
    pub form: Arc<RwLock<FormState>>,
    pub monitor: EventMonitor,
    pub about: Arc<RwLock<Option<DeviceInfo>>>,
}

impl AppState {
    /// Best-effort refresh of the form and the device details.
    pub async fn refresh_from_device(&self) {
        if let Err(err) = self.form.write().await.load(self.store.as_ref()).await {
            tracing::warn!("Initial settings load failed: {err}");
        }
        match self.store.about().await {
            Ok(info) => {
                tracing::info!("Device firmware {} ({})", info.version, info.variant);
                *self.about.write().await = Some(info);
            }
            Err(err) => tracing::warn!("Unable to read device details: {err}"),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/form", get(form_view))
        .route("/api/form/load", post(load_form))
        .route("/api/form/fields", put(update_fields))
        .route("/api/form/submit", post(submit_form))
        .route("/api/devices/rows", post(add_row))
        .route("/api/devices/rows/:id", put(update_row).delete(remove_row))
        .route("/api/devices/save", post(save_devices))
        .route("/api/events", get(events))
        .route("/ws/events", get(ws_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state.config.http_bind.parse()?;
    let router = router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Panel listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown())
        .await?;

    Ok(())
}

async fn graceful_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down http server");
}

/// Every page load fetches the device's current settings first. A failed
/// fetch is logged and the last known values are rendered instead.
async fn index(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(err) = state.form.write().await.load(state.store.as_ref()).await {
        tracing::warn!("Rendering cached settings: {err}");
    }
    let page = {
        let form = state.form.read().await;
        let log = state.monitor.log().read().await;
        let about = state.about.read().await;
        ui::PageView::build(&form, &log, about.as_ref(), &state.config.device_url)
    };
    Html(ui::render_html(page))
}

#[derive(Serialize)]
struct FieldView {
    key: &'static str,
    help_text: Option<&'static str>,
    kind: FieldKind,
    value: String,
}

#[derive(Serialize)]
struct FormView {
    fields: Vec<FieldView>,
    rows: Vec<DeviceRow>,
}

impl FormView {
    fn of(form: &FormState) -> Self {
        Self {
            fields: form
                .fields()
                .iter()
                .map(|field| FieldView {
                    key: field.descriptor.key,
                    help_text: field.descriptor.help_text,
                    kind: field.descriptor.kind,
                    value: field.value.as_text().to_string(),
                })
                .collect(),
            rows: form.devices.rows().cloned().collect(),
        }
    }
}

fn device_error(err: StoreError) -> (StatusCode, String) {
    tracing::warn!("Device exchange failed: {err}");
    (StatusCode::BAD_GATEWAY, err.to_string())
}

async fn form_view(State(state): State<AppState>) -> Json<FormView> {
    Json(FormView::of(&*state.form.read().await))
}

async fn load_form(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut form = state.form.write().await;
    form.load(state.store.as_ref()).await.map_err(device_error)?;
    Ok(Json(FormView::of(&form)))
}

async fn update_fields(
    State(state): State<AppState>,
    Json(body): Json<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut form = state.form.write().await;
    if let Some(key) = body.keys().find(|key| form.schema().get(key).is_none()) {
        return Err((StatusCode::BAD_REQUEST, format!("unknown setting {key:?}")));
    }
    let mut draft = form.clone();
    for (key, value) in body {
        draft
            .set_field(&key, value)
            .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    }
    *form = draft;
    Ok(Json(FormView::of(&form)))
}

async fn submit_form(
    State(state): State<AppState>,
) -> Result<Json<SubmitOutcome>, (StatusCode, String)> {
    let mut form = state.form.write().await;
    let outcome = form.submit(state.store.as_ref()).await.map_err(device_error)?;
    tracing::info!("Settings submitted");
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct RowCreated {
    id: RowId,
}

async fn add_row(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.form.write().await.devices.add_row();
    (StatusCode::CREATED, Json(RowCreated { id }))
}

#[derive(Deserialize)]
struct RowUpdate {
    #[serde(default)]
    address: String,
    #[serde(default)]
    alias: String,
}

async fn update_row(
    State(state): State<AppState>,
    Path(id): Path<RowId>,
    Json(body): Json<RowUpdate>,
) -> StatusCode {
    let mut form = state.form.write().await;
    if form.devices.update_row(id, body.address, body.alias) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn remove_row(State(state): State<AppState>, Path(id): Path<RowId>) -> StatusCode {
    if state.form.write().await.devices.remove_row(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Serialize)]
struct DevicesSaved {
    saved: Vec<MonitoredDevice>,
}

#[derive(Serialize)]
struct DevicesRejected {
    error: String,
    flagged_rows: Vec<RowId>,
}

async fn save_devices(State(state): State<AppState>) -> Response {
    let mut form = state.form.write().await;
    match form.devices.save(state.store.as_ref()).await {
        Ok(saved) => Json(DevicesSaved { saved }).into_response(),
        Err(SaveError::Validation(err)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(DevicesRejected {
                error: err.to_string(),
                flagged_rows: err.rows,
            }),
        )
            .into_response(),
        Err(SaveError::Store(err)) => device_error(err).into_response(),
    }
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.log().read().await.view())
}

async fn ws_events(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.monitor.subscribe();
    loop {
        let line = match rx.recv().await {
            Ok(line) => line,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Event relay lagged, skipped {skipped} line(s)");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if socket.send(Message::Text(line)).await.is_err() {
            break;
        }
    }
}
