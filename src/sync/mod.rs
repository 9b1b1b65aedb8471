//! Synchronization engine.
//!
//! Every event is re-derived from scratch: resolve the owning dataset,
//! render the identifier, then create, replace or delete the remote
//! document. Remote failures end at this boundary as a logged
//! [`SyncOutcome::Failed`]; they never reach the event source.

pub mod dispatch;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;

pub use self::dispatch::Dispatcher;
use crate::{
   Result,
   config::{Config, ConfigStore},
   index::{CachedDocument, DocumentIndex},
   remote::{Endpoint, RemoteClient, RemoteDocumentRef, RemoteStore},
   types::{EventKind, SyncEvent, SyncOutcome},
};

/// Upper bound on remembered modification times.
const SEEN_CAPACITY: u64 = 100_000;
/// Document index changes buffered before a write.
const SAVE_INTERVAL: usize = 25;

/// Anything that can take a change event to completion.
#[async_trait]
pub trait SyncHandler: Send + Sync {
   async fn handle(&self, event: SyncEvent) -> SyncOutcome;

   /// Persists buffered state. Called once a run of events is done.
   async fn flush(&self) {}
}

/// Where a previous document reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
   Cache,
   Listing,
}

/// Engine for synchronizing file changes to the remote datasets
pub struct SyncEngine<R> {
   remote: R,
   config: Arc<ConfigStore>,
   index:  Option<Arc<DocumentIndex>>,
   seen:   Cache<String, i64>,
}

impl<R: RemoteStore> SyncEngine<R> {
   pub fn new(remote: R, config: Arc<ConfigStore>) -> Self {
      Self { remote, config, index: None, seen: Cache::new(SEEN_CAPACITY) }
   }

   /// Enables the persisted document id cache. The `document_cache`
   /// setting still gates its use per event.
   pub fn with_index(mut self, index: Arc<DocumentIndex>) -> Self {
      self.index = Some(index);
      self
   }

   pub const fn config(&self) -> &Arc<ConfigStore> {
      &self.config
   }

   pub const fn remote(&self) -> &R {
      &self.remote
   }

   /// Processes one event against a fresh configuration snapshot.
   pub async fn process(&self, event: SyncEvent) -> SyncOutcome {
      let cfg = self.config.snapshot();
      self.process_with(&cfg, event).await
   }

   /// Processes one event against the given snapshot.
   pub async fn process_with(&self, cfg: &Config, event: SyncEvent) -> SyncOutcome {
      let resolver = cfg.resolver();
      let Some(target) = resolver.resolve_store_path(&event.path, &cfg.files_marker) else {
         tracing::debug!(path = %event.path, "not under any mapping, ignoring");
         return SyncOutcome::Ignored { reason: "unmapped" };
      };
      let dataset = target.dataset_id.to_string();

      let client = match RemoteClient::new(&self.remote, cfg) {
         Ok(client) => client,
         Err(e) => {
            tracing::error!(path = %event.path, "cannot sync: {e}");
            return SyncOutcome::Failed { reason: e.to_string() };
         },
      };

      let kind = event.kind;
      let path = event.path.clone();
      let result = match kind {
         EventKind::Create => self.create(&client, cfg, &dataset, event).await,
         EventKind::Update => self.update(&client, cfg, &dataset, event).await,
         EventKind::Delete => self.delete(&client, cfg, &dataset, event).await,
      };

      match result {
         Ok(outcome) => outcome,
         Err(e) => {
            tracing::error!(%kind, %path, dataset, "sync failed: {e}");
            SyncOutcome::Failed { reason: e.to_string() }
         },
      }
   }

   async fn create(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      event: SyncEvent,
   ) -> Result<SyncOutcome> {
      if let Some(outcome) = oversized(cfg, &event).await {
         return Ok(outcome);
      }
      let mtime = event.mtime.unwrap_or_else(|| Utc::now().timestamp());
      let identifier = cfg.codec().encode(&event.path, &event.file_name, mtime);

      let content = event.content.load().await?;
      let doc = client.upload(dataset, &identifier, content).await?;
      tracing::info!(dataset, identifier, "uploaded");

      self
         .remember(client, cfg, dataset, &event.path, &identifier, mtime, doc)
         .await;
      Ok(SyncOutcome::Uploaded { dataset: dataset.to_string(), identifier, replaced: None })
   }

   /// Delete-then-create. The content is read before anything remote is
   /// touched. The old document is located by a timestamp tolerant match;
   /// failing to remove it does not stop the upload.
   async fn update(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      event: SyncEvent,
   ) -> Result<SyncOutcome> {
      if let Some(outcome) = oversized(cfg, &event).await {
         return Ok(outcome);
      }
      let mtime = event.mtime.unwrap_or_else(|| Utc::now().timestamp());
      let identifier = cfg.codec().encode(&event.path, &event.file_name, mtime);
      let content = event.content.load().await?;

      let previous = match self
         .locate(client, cfg, dataset, &event.path, &identifier)
         .await
      {
         Ok(found) => found,
         Err(e) => {
            tracing::warn!(dataset, path = %event.path, "lookup of previous document failed: {e}");
            None
         },
      };

      let mut replaced = None;
      if let Some((doc, source)) = previous {
         match self
            .remove_document(client, cfg, dataset, &event.path, &identifier, doc, source)
            .await
         {
            Ok(Some(id)) => replaced = Some(id),
            Ok(None) => {},
            Err(e) => {
               tracing::warn!(dataset, path = %event.path, "failed to delete previous document: {e}");
            },
         }
      } else {
         tracing::debug!(dataset, path = %event.path, "no previous document found");
      }

      let doc = client.upload(dataset, &identifier, content).await?;
      tracing::info!(dataset, identifier, replaced = replaced.as_deref(), "replaced");

      self
         .remember(client, cfg, dataset, &event.path, &identifier, mtime, doc)
         .await;
      Ok(SyncOutcome::Uploaded { dataset: dataset.to_string(), identifier, replaced })
   }

   async fn delete(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      event: SyncEvent,
   ) -> Result<SyncOutcome> {
      let mtime = match event.mtime {
         Some(mtime) => mtime,
         None => self.last_known_mtime(client, cfg, dataset, &event.path).await,
      };
      let identifier = cfg.codec().encode(&event.path, &event.file_name, mtime);

      let removed = match self
         .locate(client, cfg, dataset, &event.path, &identifier)
         .await?
      {
         Some((doc, source)) => {
            self
               .remove_document(client, cfg, dataset, &event.path, &identifier, doc, source)
               .await?
         },
         None => None,
      };

      self.forget(client, cfg, dataset, &event.path).await;
      match removed {
         Some(document_id) => {
            tracing::info!(dataset, identifier, document_id, "deleted");
            Ok(SyncOutcome::Deleted { dataset: dataset.to_string(), document_id })
         },
         None => {
            tracing::warn!(dataset, identifier, "document not found remotely, treating as deleted");
            Ok(SyncOutcome::AlreadyAbsent { dataset: dataset.to_string(), identifier })
         },
      }
   }

   /// Finds the remote document currently standing for `path`.
   async fn locate(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      path: &str,
      identifier: &str,
   ) -> Result<Option<(RemoteDocumentRef, Source)>> {
      if let Some(cached) = self.cached(client, cfg, dataset, path) {
         tracing::debug!(dataset, path, document_id = cached.id, "using cached document id");
         return Ok(Some((RemoteDocumentRef { id: cached.id, name: cached.name }, Source::Cache)));
      }
      Ok(client
         .resolve_document(dataset, identifier)
         .await?
         .map(|doc| (doc, Source::Listing)))
   }

   /// Deletes `doc`, returning the removed id. `None` means the remote no
   /// longer had it. A stale cached id falls back to name matching once.
   #[allow(clippy::too_many_arguments, reason = "internal helper shared by update and delete")]
   async fn remove_document(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      path: &str,
      identifier: &str,
      doc: RemoteDocumentRef,
      source: Source,
   ) -> Result<Option<String>> {
      match client.delete(dataset, &doc.id).await {
         Ok(()) => return Ok(Some(doc.id)),
         Err(e) if e.is_not_found() && source == Source::Listing => return Ok(None),
         Err(e) if e.is_not_found() => {
            tracing::debug!(dataset, path, document_id = doc.id, "cached document id is stale");
            self.forget(client, cfg, dataset, path).await;
         },
         Err(e) => return Err(e),
      }

      let Some(fallback) = client.resolve_document(dataset, identifier).await? else {
         return Ok(None);
      };
      match client.delete(dataset, &fallback.id).await {
         Ok(()) => Ok(Some(fallback.id)),
         Err(e) if e.is_not_found() => Ok(None),
         Err(e) => Err(e),
      }
   }

   /// The document index, when enabled and bound to the client's endpoint.
   fn index_for(&self, cfg: &Config, endpoint: &Endpoint) -> Option<&Arc<DocumentIndex>> {
      self
         .index
         .as_ref()
         .filter(|index| cfg.document_cache && index.serves(endpoint))
   }

   fn cached(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      path: &str,
   ) -> Option<CachedDocument> {
      self.index_for(cfg, client.endpoint())?.get(dataset, path)
   }

   async fn last_known_mtime(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      path: &str,
   ) -> i64 {
      if let Some(cached) = self.cached(client, cfg, dataset, path) {
         return cached.mtime;
      }
      self.seen.get(path).await.unwrap_or(0)
   }

   #[allow(clippy::too_many_arguments, reason = "internal helper")]
   async fn remember(
      &self,
      client: &RemoteClient<'_, R>,
      cfg: &Config,
      dataset: &str,
      path: &str,
      identifier: &str,
      mtime: i64,
      doc: Option<RemoteDocumentRef>,
   ) {
      self.seen.insert(path.to_string(), mtime).await;

      let Some(index) = self.index_for(cfg, client.endpoint()) else {
         return;
      };
      match doc {
         Some(doc) => {
            let name = if doc.name.is_empty() { identifier.to_string() } else { doc.name };
            index.record(dataset, path, CachedDocument { id: doc.id, name, mtime });
         },
         None => index.forget(dataset, path),
      }
      save_index(index, SAVE_INTERVAL).await;
   }

   async fn forget(&self, client: &RemoteClient<'_, R>, cfg: &Config, dataset: &str, path: &str) {
      self.seen.invalidate(path).await;
      if let Some(index) = self.index_for(cfg, client.endpoint()) {
         index.forget(dataset, path);
         save_index(index, SAVE_INTERVAL).await;
      }
   }
}

#[async_trait]
impl<R: RemoteStore> SyncHandler for SyncEngine<R> {
   async fn handle(&self, event: SyncEvent) -> SyncOutcome {
      self.process(event).await
   }

   async fn flush(&self) {
      if let Some(index) = &self.index {
         save_index(index, 1).await;
      }
   }
}

#[async_trait]
impl<H: SyncHandler + ?Sized> SyncHandler for Arc<H> {
   async fn handle(&self, event: SyncEvent) -> SyncOutcome {
      (**self).handle(event).await
   }

   async fn flush(&self) {
      (**self).flush().await;
   }
}

/// Writes the index off the runtime threads once `threshold` changes
/// have accumulated.
async fn save_index(index: &Arc<DocumentIndex>, threshold: usize) {
   let unsaved = index.unsaved();
   if unsaved == 0 || unsaved < threshold {
      return;
   }
   let index = Arc::clone(index);
   match tokio::task::spawn_blocking(move || index.save()).await {
      Ok(Ok(())) => tracing::debug!(changes = unsaved, "saved document index"),
      Ok(Err(e)) => tracing::warn!("failed to save document index: {e}"),
      Err(e) => tracing::warn!("document index save task failed: {e}"),
   }
}

async fn oversized(cfg: &Config, event: &SyncEvent) -> Option<SyncOutcome> {
   let size = event.content.known_size().await?;
   if cfg.max_file_size_bytes > 0 && size > cfg.max_file_size_bytes {
      tracing::warn!(
         path = %event.path,
         size,
         limit = cfg.max_file_size_bytes,
         "file exceeds upload size limit, skipping"
      );
      return Some(SyncOutcome::Ignored { reason: "too large" });
   }
   None
}
