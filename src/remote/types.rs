//! Remote fetcher contract and gateway wire types

use crate::error::{Error, Result};
use crate::types::{Author, AuthorKind, MediaDescriptor, MediaKind, Record, RecordId, SyncTarget};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of history, newest record first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    /// Records strictly older than the requested cursor, descending identity
    pub records: Vec<Record>,
    /// Participants referenced by the page
    pub authors: Vec<Author>,
    /// Authoritative size of the whole remote history, if the remote knows it
    pub total_count: Option<usize>,
}

impl HistoryPage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Source of history pages and media blobs.
///
/// Implementations retry transient failures themselves; an error returned
/// from here is final for the call.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch up to `limit` records older than `cursor` (0 means newest)
    async fn fetch_page(
        &self,
        target: &SyncTarget,
        cursor: RecordId,
        limit: usize,
    ) -> Result<HistoryPage>;

    /// Download the bytes of one media blob
    async fn fetch_blob(&self, media: &MediaDescriptor) -> Result<Bytes>;
}

// ============================================================================
// Wire Types
// ============================================================================

/// JSON body of `GET /history/{kind}/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireHistory {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub users: Vec<WireUser>,
    #[serde(default)]
    pub chats: Vec<WireChat>,
    /// Total messages in the conversation
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: i64,
    /// Unix seconds
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub from_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_to_msg_id: Option<i64>,
    #[serde(default)]
    pub media: Option<WireMedia>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMedia {
    /// `photo` or `document`; anything else is ignored
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    #[serde(default)]
    pub ext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePhoto {
    pub id: i64,
    #[serde(default)]
    pub ext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo: Option<WirePhoto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireChat {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub photo: Option<WirePhoto>,
}

impl WireUser {
    /// "First Last", falling back to the username
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.username.clone().unwrap_or_default()
        } else {
            full
        }
    }
}

/// Reduce a gateway file extension to `.` plus letters, digits and inner
/// dots, so a blob's file name stays inside its media directory
pub fn safe_extension(ext: &str) -> String {
    let kept: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    let kept = kept.trim_matches('.');
    if kept.is_empty() {
        String::new()
    } else {
        format!(".{kept}")
    }
}

impl TryFrom<WireMessage> for Record {
    type Error = Error;

    fn try_from(wire: WireMessage) -> Result<Self> {
        // Zero is the "start from newest" cursor and can never name a record
        if wire.id <= 0 {
            return Err(Error::transient(format!(
                "Remote returned invalid message id {}",
                wire.id
            )));
        }

        let mut record = Record::new(wire.id, wire.date, wire.text);
        record.author_id = wire.from_id;
        record.reply_to = wire.reply_to_msg_id;
        record.media = wire.media.and_then(|m| {
            let kind = match m.kind.as_str() {
                "photo" => MediaKind::Photo,
                "document" => MediaKind::Document,
                _ => return None,
            };
            Some(MediaDescriptor::new(wire.id, kind, m.id, safe_extension(&m.ext)))
        });
        Ok(record)
    }
}

impl From<WireUser> for Author {
    fn from(wire: WireUser) -> Self {
        let mut author = Author::new(wire.id, AuthorKind::User, wire.display_name());
        if let Some(photo) = wire.photo {
            author = author.with_photo(photo.id, &safe_extension(&photo.ext));
        }
        author
    }
}

impl From<WireChat> for Author {
    fn from(wire: WireChat) -> Self {
        let mut author = Author::new(wire.id, AuthorKind::Group, wire.title);
        if let Some(photo) = wire.photo {
            author = author.with_photo(photo.id, &safe_extension(&photo.ext));
        }
        author
    }
}

impl TryFrom<WireHistory> for HistoryPage {
    type Error = Error;

    fn try_from(wire: WireHistory) -> Result<Self> {
        let records = wire
            .messages
            .into_iter()
            .map(Record::try_from)
            .collect::<Result<Vec<_>>>()?;

        let authors = wire
            .users
            .into_iter()
            .map(Author::from)
            .chain(wire.chats.into_iter().map(Author::from))
            .collect();

        Ok(Self {
            records,
            authors,
            total_count: wire.count,
        })
    }
}
