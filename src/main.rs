mod config;
mod devices;
mod events;
mod form;
mod schema;
mod settings;
mod store;
mod ui;
mod web;

use crate::config::PanelConfig;
use crate::events::EventMonitor;
use crate::form::FormState;
use crate::schema::SETTINGS_SCHEMA;
use crate::store::HttpSettingsStore;
use crate::web::AppState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Arc::new(PanelConfig::from_env());

    tracing::info!(
        "Starting panel on {} (device: {}, events: {})",
        config.http_bind,
        config.device_url,
        config.events_url
    );

    let store = HttpSettingsStore::new(&config.device_url, config.request_timeout)?;
    let monitor = EventMonitor::new(config.event_log_capacity);

    let state = AppState {
        config: config.clone(),
        store: Arc::new(store),
        form: Arc::new(RwLock::new(FormState::new(SETTINGS_SCHEMA))),
        monitor: monitor.clone(),
        about: Arc::new(RwLock::new(None)),
    };

    let events_task = tokio::spawn(monitor.run(config.events_url.clone(), config.reconnect_delay));

    {
        let state = state.clone();
        tokio::spawn(async move { state.refresh_from_device().await });
    }

    web::serve(state).await?;

    events_task.abort();
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
