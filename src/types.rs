//! Common types used throughout the archiver
//!
//! This module contains the archive data model shared by the sync,
//! media and export engines: the target being archived, the records
//! mirrored from it, their authors and attached media.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Identity of a record as assigned by the remote side
pub type RecordId = i64;

/// Identity of an author (user or group)
pub type AuthorId = i64;

// ============================================================================
// Sync Target
// ============================================================================

/// Kind of remote entity being archived, carrying its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncTargetKind {
    /// One-to-one conversation with a user
    User { user_id: i64 },
    /// Small group chat
    Chat { chat_id: i64 },
    /// Channel or supergroup
    Channel { channel_id: i64 },
}

impl SyncTargetKind {
    /// Build a kind from its tag and identity
    pub fn from_tag(tag: &str, id: i64) -> Option<Self> {
        match tag {
            "user" => Some(Self::User { user_id: id }),
            "chat" => Some(Self::Chat { chat_id: id }),
            "channel" => Some(Self::Channel { channel_id: id }),
            _ => None,
        }
    }

    /// Numeric identity of the target
    pub fn id(&self) -> i64 {
        match self {
            Self::User { user_id } => *user_id,
            Self::Chat { chat_id } => *chat_id,
            Self::Channel { channel_id } => *channel_id,
        }
    }

    /// Discriminant tag, as used in paths and persisted metadata
    pub fn tag(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Chat { .. } => "chat",
            Self::Channel { .. } => "channel",
        }
    }
}

/// The remote entity whose history is being archived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Kind and identity
    pub kind: SyncTargetKind,
    /// Display name
    pub name: String,
}

impl SyncTarget {
    /// Create a new sync target
    pub fn new(kind: SyncTargetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Numeric identity, used to namespace persisted state
    pub fn id(&self) -> i64 {
        self.kind.id()
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.kind.tag(), self.id())
    }
}

// ============================================================================
// Media
// ============================================================================

/// Kind of binary attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
    ProfilePhoto,
}

impl MediaKind {
    /// Stable name used in the record store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Document => "document",
            Self::ProfilePhoto => "profile_photo",
        }
    }

    /// Parse the stable store name back
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "photo" => Some(Self::Photo),
            "document" => Some(Self::Document),
            "profile_photo" => Some(Self::ProfilePhoto),
            _ => None,
        }
    }
}

/// Reference to a remote binary blob attached to a record or an author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Record (or author, for profile photos) owning the blob
    pub owner_id: i64,
    /// Attachment kind
    pub kind: MediaKind,
    /// Remote identity of the blob
    pub blob_id: i64,
    /// File extension including the leading dot (e.g. ".jpg"), may be empty
    pub extension: String,
}

impl MediaDescriptor {
    /// Create a new media descriptor
    pub fn new(owner_id: i64, kind: MediaKind, blob_id: i64, extension: impl Into<String>) -> Self {
        Self {
            owner_id,
            kind,
            blob_id,
            extension: extension.into(),
        }
    }

    /// Deterministic local file name for this blob
    pub fn file_name(&self) -> String {
        format!("{}{}", self.blob_id, self.extension)
    }
}

// ============================================================================
// Records and Authors
// ============================================================================

/// A timestamped unit of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub author_id: Option<AuthorId>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<RecordId>,
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
}

impl Record {
    /// Create a plain text record
    pub fn new(id: RecordId, date: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id,
            date,
            author_id: None,
            text: text.into(),
            reply_to: None,
            media: None,
        }
    }

    /// Set the author
    #[must_use]
    pub fn with_author(mut self, author_id: AuthorId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    /// Mark as a reply to another record
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: RecordId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Attach media
    #[must_use]
    pub fn with_media(mut self, kind: MediaKind, blob_id: i64, extension: &str) -> Self {
        self.media = Some(MediaDescriptor::new(self.id, kind, blob_id, extension));
        self
    }

    /// Calendar day of the record, ignoring time of day
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// Whether an author is an individual or a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    #[default]
    User,
    Group,
}

impl AuthorKind {
    /// Stable name used in the record store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    /// Parse the stable store name back, defaulting to user
    pub fn parse(value: &str) -> Self {
        if value == "group" {
            Self::Group
        } else {
            Self::User
        }
    }
}

/// A participant entity (individual or group)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    #[serde(default)]
    pub kind: AuthorKind,
    pub display_name: String,
    #[serde(default)]
    pub photo: Option<MediaDescriptor>,
}

impl Author {
    /// Create an author without a profile photo
    pub fn new(id: AuthorId, kind: AuthorKind, display_name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            display_name: display_name.into(),
            photo: None,
        }
    }

    /// Attach a profile photo
    #[must_use]
    pub fn with_photo(mut self, blob_id: i64, extension: &str) -> Self {
        self.photo = Some(MediaDescriptor::new(
            self.id,
            MediaKind::ProfilePhoto,
            blob_id,
            extension,
        ));
        self
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
