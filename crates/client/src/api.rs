//! Persistence Service client
//!
//! The trait is what the controller talks to; `HttpApi` implements it
//! over the host's REST surface under `/api`.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;
use stackboard_protocol::{
    Deleted, Folder, FolderChanges, FolderId, Item, ItemChanges, ItemId, NewFolder, NewItem,
    SnapshotRecord,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

#[async_trait]
pub trait PersistenceApi: Send + Sync {
    async fn snapshot(&self) -> ClientResult<Vec<SnapshotRecord>>;
    async fn create_item(&self, new: &NewItem) -> ClientResult<Item>;
    async fn create_folder(&self, new: &NewFolder) -> ClientResult<Folder>;
    async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> ClientResult<Item>;
    async fn update_folder(&self, id: &FolderId, changes: &FolderChanges)
        -> ClientResult<Folder>;
    async fn delete_item(&self, id: &ItemId) -> ClientResult<()>;
    async fn delete_folder(&self, id: &FolderId) -> ClientResult<()>;
}

pub struct HttpApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        self.config.api_url(segments)
    }
}

/// Decode a success body or turn an error status into a `ClientError`
async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    tracing::debug!(%status, %message, "Request rejected");

    Err(match status {
        StatusCode::BAD_REQUEST => ClientError::Validation(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::Server {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl PersistenceApi for HttpApi {
    async fn snapshot(&self) -> ClientResult<Vec<SnapshotRecord>> {
        read_json(self.client.get(self.url(&["data"])?).send().await?).await
    }

    async fn create_item(&self, new: &NewItem) -> ClientResult<Item> {
        read_json(self.client.post(self.url(&["items"])?).json(new).send().await?).await
    }

    async fn create_folder(&self, new: &NewFolder) -> ClientResult<Folder> {
        read_json(self.client.post(self.url(&["folders"])?).json(new).send().await?).await
    }

    async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> ClientResult<Item> {
        let url = self.url(&["items", id.as_str()])?;
        read_json(self.client.put(url).json(changes).send().await?).await
    }

    async fn update_folder(
        &self,
        id: &FolderId,
        changes: &FolderChanges,
    ) -> ClientResult<Folder> {
        let url = self.url(&["folders", id.as_str()])?;
        read_json(self.client.put(url).json(changes).send().await?).await
    }

    async fn delete_item(&self, id: &ItemId) -> ClientResult<()> {
        let url = self.url(&["items", id.as_str()])?;
        let _: Deleted = read_json(self.client.delete(url).send().await?).await?;
        Ok(())
    }

    async fn delete_folder(&self, id: &FolderId) -> ClientResult<()> {
        let url = self.url(&["folders", id.as_str()])?;
        let _: Deleted = read_json(self.client.delete(url).send().await?).await?;
        Ok(())
    }
}
