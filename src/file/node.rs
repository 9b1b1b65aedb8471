//! Bridge between the local data directory and store paths.
//!
//! The storage root plays the file store's data directory: a file at
//! `<root>/alice/files/reports/q1.md` is the store path
//! `/alice/files/reports/q1.md`.

use std::{
   fs::Metadata,
   path::{Component, Path, PathBuf},
   time::UNIX_EPOCH,
};

use crate::types::{ContentSource, EventKind, SyncEvent};

/// A non-directory entry seen on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
   pub local_path: PathBuf,
   pub store_path: String,
   pub name:       String,
   pub size:       u64,
   /// Unix seconds.
   pub mtime:      i64,
   pub mode:       u32,
}

impl FileNode {
   /// Builds a node for a regular file under `root`. Directories, non-UTF-8
   /// paths and paths outside the root yield `None`.
   pub fn from_metadata(root: &Path, local_path: &Path, meta: &Metadata) -> Option<Self> {
      if meta.is_dir() {
         return None;
      }
      let store_path = store_path(root, local_path)?;
      let name = crate::types::file_name_of(&store_path).to_string();
      Some(Self {
         local_path: local_path.to_path_buf(),
         store_path,
         name,
         size: meta.len(),
         mtime: mtime_of(meta),
         mode: mode_of(meta),
      })
   }

   /// Reads the node fresh from disk.
   pub async fn stat(root: &Path, local_path: &Path) -> Option<Self> {
      let meta = tokio::fs::metadata(local_path).await.ok()?;
      Self::from_metadata(root, local_path, &meta)
   }

   /// Whether any read permission bit is set.
   pub const fn is_readable(&self) -> bool {
      self.mode & 0o444 != 0
   }

   pub fn into_event(self, kind: EventKind) -> SyncEvent {
      match kind {
         EventKind::Create => {
            SyncEvent::create(self.store_path, self.mtime, ContentSource::File(self.local_path))
         },
         EventKind::Update => {
            SyncEvent::update(self.store_path, self.mtime, ContentSource::File(self.local_path))
         },
         EventKind::Delete => SyncEvent::delete(self.store_path, Some(self.mtime)),
      }
   }
}

/// Store path for `local` relative to `root`, e.g. `/alice/files/a.md`.
pub fn store_path(root: &Path, local: &Path) -> Option<String> {
   let relative = local.strip_prefix(root).ok()?;
   let mut out = String::new();
   for component in relative.components() {
      match component {
         Component::Normal(part) => {
            out.push('/');
            out.push_str(part.to_str()?);
         },
         Component::CurDir => {},
         _ => return None,
      }
   }
   if out.is_empty() { None } else { Some(out) }
}

/// Local directories that hold user files.
///
/// With a marker like `/files/` these are `<root>/files` and every
/// `<root>/<user>/files`. A bare `/` marker treats the root itself as the
/// only files directory.
pub fn files_roots(root: &Path, marker: &str) -> Vec<PathBuf> {
   let segment = marker.trim_matches('/');
   if segment.is_empty() {
      return vec![root.to_path_buf()];
   }

   let mut roots = Vec::new();
   let direct = root.join(segment);
   if direct.is_dir() {
      roots.push(direct);
   }
   let Ok(entries) = std::fs::read_dir(root) else {
      return roots;
   };
   let mut users: Vec<PathBuf> = entries
      .filter_map(|e| e.ok())
      .map(|e| e.path().join(segment))
      .filter(|p| p.is_dir())
      .collect();
   users.sort();
   roots.extend(users);
   roots
}

fn mtime_of(meta: &Metadata) -> i64 {
   meta
      .modified()
      .ok()
      .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
      .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(unix)]
fn mode_of(meta: &Metadata) -> u32 {
   use std::os::unix::fs::PermissionsExt;
   meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &Metadata) -> u32 {
   if meta.permissions().readonly() { 0o444 } else { 0o644 }
}
