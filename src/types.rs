use std::{fmt, path::PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Kind of change delivered by the file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
   Create,
   Update,
   Delete,
}

impl EventKind {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Create => "create",
         Self::Update => "update",
         Self::Delete => "delete",
      }
   }
}

impl fmt::Display for EventKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Where an event's bytes come from.
#[derive(Debug, Clone)]
pub enum ContentSource {
   /// Read lazily from the local file system.
   File(PathBuf),
   Bytes(Bytes),
   /// Delete events carry no content.
   None,
}

impl ContentSource {
   pub async fn load(&self) -> Result<Bytes> {
      match self {
         Self::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
         Self::Bytes(bytes) => Ok(bytes.clone()),
         Self::None => Ok(Bytes::new()),
      }
   }

   /// Size without reading the content, when cheaply known.
   pub async fn known_size(&self) -> Option<u64> {
      match self {
         Self::File(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
         Self::Bytes(bytes) => Some(bytes.len() as u64),
         Self::None => Some(0),
      }
   }
}

/// One change to one non-directory entry.
#[derive(Debug, Clone)]
pub struct SyncEvent {
   pub kind:      EventKind,
   /// Full store path, e.g. `/alice/files/reports/q1.md`.
   pub path:      String,
   pub file_name: String,
   /// Unix seconds. `None` on deletes where the store no longer knows it.
   pub mtime:     Option<i64>,
   pub content:   ContentSource,
}

impl SyncEvent {
   pub fn create(path: impl Into<String>, mtime: i64, content: ContentSource) -> Self {
      Self::with_kind(EventKind::Create, path.into(), Some(mtime), content)
   }

   pub fn update(path: impl Into<String>, mtime: i64, content: ContentSource) -> Self {
      Self::with_kind(EventKind::Update, path.into(), Some(mtime), content)
   }

   pub fn delete(path: impl Into<String>, mtime: Option<i64>) -> Self {
      Self::with_kind(EventKind::Delete, path.into(), mtime, ContentSource::None)
   }

   fn with_kind(kind: EventKind, path: String, mtime: Option<i64>, content: ContentSource) -> Self {
      let file_name = file_name_of(&path).to_string();
      Self { kind, path, file_name, mtime, content }
   }
}

/// Last segment of a store path.
pub fn file_name_of(path: &str) -> &str {
   let trimmed = path.trim_end_matches('/');
   trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// What became of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
   /// Not under any mapping, outside the files root, or skipped by policy.
   Ignored { reason: &'static str },
   Uploaded { dataset: String, identifier: String, replaced: Option<String> },
   Deleted { dataset: String, document_id: String },
   /// Delete target was not found remotely; treated as success.
   AlreadyAbsent { dataset: String, identifier: String },
   Failed { reason: String },
}

impl SyncOutcome {
   pub const fn is_failure(&self) -> bool {
      matches!(self, Self::Failed { .. })
   }

   pub const fn is_ignored(&self) -> bool {
      matches!(self, Self::Ignored { .. })
   }
}
