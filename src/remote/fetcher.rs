//! JSON gateway implementation of [`RemoteFetcher`]
//!
//! Endpoints, relative to the configured base URL:
//! - `GET history/{user|chat|channel}/{id}?offset_id={cursor}&limit={n}`
//! - `GET media/{photo|document|profile_photo}/{blob_id}`

use super::client::{HttpClient, HttpClientConfig, RequestConfig};
use super::types::{HistoryPage, RemoteFetcher, WireHistory};
use crate::error::{Error, Result};
use crate::types::{MediaDescriptor, RecordId, SyncTarget};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Remote fetcher talking to an HTTP history gateway
#[derive(Debug)]
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Build the fetcher from client settings; a base URL is required
    pub fn from_config(config: HttpClientConfig) -> Result<Self> {
        if config.base_url.is_none() {
            return Err(Error::missing_field("remote.base_url"));
        }
        Ok(Self::new(HttpClient::with_config(config)?))
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        target: &SyncTarget,
        cursor: RecordId,
        limit: usize,
    ) -> Result<HistoryPage> {
        let path = format!("history/{}/{}", target.kind.tag(), target.id());
        let request = RequestConfig::new()
            .query("offset_id", cursor)
            .query("limit", limit);

        let wire: WireHistory = self.client.get_json(&path, request).await?;
        debug!(
            target_id = target.id(),
            cursor,
            messages = wire.messages.len(),
            "Fetched history page"
        );
        HistoryPage::try_from(wire)
    }

    /// Single attempt: a failed blob is skipped by the media retriever and
    /// picked up again on its next run
    async fn fetch_blob(&self, media: &MediaDescriptor) -> Result<Bytes> {
        let path = format!("media/{}/{}", media.kind.as_str(), media.blob_id);
        self.client
            .get_bytes(&path, RequestConfig::new().retries(0))
            .await
    }
}
