use crate::settings::{DeviceInfo, SettingsDocument};
use async_trait::async_trait;
use std::time::Duration;

/// Failures talking to the device. Every exchange is attempted once; what
/// to do about a failure is left to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("device unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("device answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("device sent malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The device's settings endpoint, reduced to "send JSON, receive JSON".
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    async fn fetch(&self) -> Result<SettingsDocument, StoreError>;
    async fn update(&self, document: &SettingsDocument) -> Result<(), StoreError>;
    async fn about(&self) -> Result<DeviceInfo, StoreError>;
}

pub struct HttpSettingsStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSettingsStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let res = self.client.get(self.url(path)).send().await?;
        let body = checked_body(res).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SettingsStore for HttpSettingsStore {
    async fn fetch(&self) -> Result<SettingsDocument, StoreError> {
        self.get_json("/settings").await
    }

    async fn update(&self, document: &SettingsDocument) -> Result<(), StoreError> {
        let res = self
            .client
            .put(self.url("/settings"))
            .json(document)
            .send()
            .await?;
        checked_body(res).await?;
        Ok(())
    }

    async fn about(&self) -> Result<DeviceInfo, StoreError> {
        self.get_json("/about").await
    }
}

async fn checked_body(res: reqwest::Response) -> Result<String, StoreError> {
    let status = res.status();
    let body = res.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
