//! File system watcher turning notify events into sync events.
//!
//! Raw notify events are classified per path and folded into a pending
//! batch; the watch loop flushes the batch once the tree goes quiet, so an
//! editor's create, write, write sequence becomes a single upload.

use std::{
   collections::{HashMap, HashSet},
   path::{Path, PathBuf},
};

use notify::{
   Config, Event, EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher,
   event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
};
use tokio::sync::mpsc;

use crate::{
   Result,
   file::{FileNode, store_path},
   types::{EventKind, SyncEvent},
};

/// Keeps the underlying watcher alive; dropping it stops delivery.
pub struct FileWatcher {
   _watcher: RecommendedWatcher,
}

impl FileWatcher {
   /// Starts watching `path`, forwarding events into the returned channel.
   pub fn new(path: &Path, recursive: bool) -> Result<(Self, mpsc::UnboundedReceiver<Event>)> {
      let (tx, rx) = mpsc::unbounded_channel();
      let mut watcher = RecommendedWatcher::new(
         move |res: notify::Result<Event>| match res {
            Ok(event) => {
               let _ = tx.send(event);
            },
            Err(e) => tracing::warn!("watch error: {e}"),
         },
         Config::default(),
      )?;

      let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
      watcher.watch(path, mode)?;
      tracing::debug!("watching {}", path.display());
      Ok((Self { _watcher: watcher }, rx))
   }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
   pub path: PathBuf,
   pub kind: EventKind,
}

impl Change {
   const fn new(path: PathBuf, kind: EventKind) -> Self {
      Self { path, kind }
   }
}

/// Maps one notify event onto per-path changes. Directory events and
/// metadata-only changes produce nothing. A rename destination may be
/// replacing an existing file (editors save through a temp file), so it
/// becomes an update rather than a create.
pub fn classify(event: &Event) -> Vec<Change> {
   let each = |kind: EventKind| -> Vec<Change> {
      event
         .paths
         .iter()
         .map(|p| Change::new(p.clone(), kind))
         .collect()
   };

   match event.kind {
      NotifyKind::Create(CreateKind::Folder) | NotifyKind::Remove(RemoveKind::Folder) => vec![],
      NotifyKind::Create(_) => each(EventKind::Create),
      NotifyKind::Remove(_) => each(EventKind::Delete),
      NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => each(EventKind::Delete),
      NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => each(EventKind::Update),
      NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
         Change::new(event.paths[0].clone(), EventKind::Delete),
         Change::new(event.paths[1].clone(), EventKind::Update),
      ],
      // Ambiguous renames are settled against the disk at flush time.
      NotifyKind::Modify(ModifyKind::Name(_)) => each(EventKind::Update),
      NotifyKind::Modify(ModifyKind::Metadata(_)) => vec![],
      NotifyKind::Modify(_) => each(EventKind::Update),
      _ => vec![],
   }
}

/// Folds a new change into a pending one for the same path. `None` means
/// the two cancel out.
pub const fn coalesce(pending: EventKind, next: EventKind) -> Option<EventKind> {
   use EventKind::{Create, Delete, Update};

   match (pending, next) {
      (Create, Delete) => None,
      (Create, Create | Update) => Some(Create),
      (Update, Delete) | (Delete, Delete) => Some(Delete),
      (Update, Create | Update) => Some(Update),
      // Replaced in place: the remote still holds the old document.
      (Delete, Create | Update) => Some(Update),
   }
}

/// Changes accumulated since the last flush, at most one per path.
#[derive(Debug, Default)]
pub struct ChangeBatch {
   pending:   HashMap<PathBuf, EventKind>,
   /// Paths created and removed again within this batch. The remote never
   /// saw them, so later deletes for them are dropped.
   transient: HashSet<PathBuf>,
}

impl ChangeBatch {
   pub fn push(&mut self, change: Change) {
      match self.pending.remove(&change.path) {
         None if change.kind == EventKind::Delete && self.transient.contains(&change.path) => {},
         None => {
            self.transient.remove(&change.path);
            self.pending.insert(change.path, change.kind);
         },
         Some(prev) => match coalesce(prev, change.kind) {
            Some(kind) => {
               self.pending.insert(change.path, kind);
            },
            None => {
               self.transient.insert(change.path);
            },
         },
      }
   }

   pub fn extend(&mut self, changes: impl IntoIterator<Item = Change>) {
      for change in changes {
         self.push(change);
      }
   }

   pub fn is_empty(&self) -> bool {
      self.pending.is_empty()
   }

   pub fn len(&self) -> usize {
      self.pending.len()
   }

   /// Takes every pending change, sorted by path.
   pub fn drain(&mut self) -> Vec<Change> {
      self.transient.clear();
      let mut changes: Vec<Change> = self
         .pending
         .drain()
         .map(|(path, kind)| Change::new(path, kind))
         .collect();
      changes.sort_by(|a, b| a.path.cmp(&b.path));
      changes
   }
}

/// Resolves a change against the current disk state.
///
/// Creates and updates need the file to still exist as a regular file;
/// an update whose file vanished becomes a delete. A delete whose path
/// exists again becomes an update.
pub async fn to_sync_event(root: &Path, change: Change) -> Option<SyncEvent> {
   let node = FileNode::stat(root, &change.path).await;
   let exists_as_dir = node.is_none() && tokio::fs::metadata(&change.path).await.is_ok();
   if exists_as_dir {
      return None;
   }

   match (change.kind, node) {
      (EventKind::Create, Some(node)) => Some(node.into_event(EventKind::Create)),
      (EventKind::Create, None) => None,
      (EventKind::Update | EventKind::Delete, Some(node)) => Some(node.into_event(EventKind::Update)),
      (EventKind::Update | EventKind::Delete, None) => {
         store_path(root, &change.path).map(|path| SyncEvent::delete(path, None))
      },
   }
}
