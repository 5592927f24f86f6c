//! Document/file storage collaborator: list, fetch and upload the raw
//! document bytes that get handed to the annotation overlay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::domain::FileDescriptor;
use url::Url;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<FileDescriptor>>;
    async fn get(&self, name: &str) -> Result<Vec<u8>>;
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Blob-container style HTTP store: `GET /` lists descriptors, `GET /{name}`
/// downloads, `PUT /{name}` uploads.
pub struct HttpDocumentStore {
    http: Client,
    base_url: Url,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    fn blob_url(&self, name: &str) -> Result<Url> {
        self.base_url
            .join(name)
            .with_context(|| format!("invalid blob name '{name}'"))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn list(&self) -> Result<Vec<FileDescriptor>> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await
            .context("failed to list documents")?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.blob_url(name)?)
            .send()
            .await
            .with_context(|| format!("failed to download document '{name}'"))?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.http
            .put(self.blob_url(name)?)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("failed to upload document '{name}'"))?
            .error_for_status()?;
        Ok(())
    }
}
