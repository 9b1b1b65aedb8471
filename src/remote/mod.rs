//! Remote knowledge-base access.
//!
//! [`RemoteStore`] is a single-attempt transport; [`RemoteClient`] binds a
//! transport to one configuration snapshot and adds retries, pagination and
//! identifier lookup on top.

pub mod dify;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use self::{dify::DifyApi, retry::RetryPolicy};
use crate::{
   Error, Result,
   config::{Config, MAX_LIST_LIMIT},
   naming::MatchKey,
};

/// Document summary as reported by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocumentRef {
   pub id:   String,
   pub name: String,
}

/// One page of the document listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPage {
   #[serde(default, alias = "documents")]
   pub data:     Vec<RemoteDocumentRef>,
   #[serde(default)]
   pub has_more: bool,
   #[serde(default)]
   pub page:     u32,
   #[serde(default)]
   pub limit:    u32,
   #[serde(default)]
   pub total:    u64,
}

/// Dataset metadata used for connectivity checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
   pub id:             String,
   #[serde(default)]
   pub name:           String,
   #[serde(default)]
   pub document_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
   pub keyword: Option<String>,
   pub page:    u32,
   pub limit:   u32,
}

impl Default for ListQuery {
   fn default() -> Self {
      Self { keyword: None, page: 1, limit: 20 }
   }
}

impl ListQuery {
   pub fn page(page: u32, limit: u32) -> Self {
      Self { keyword: None, page, limit }.clamped()
   }

   /// Page is at least 1 and limit within `[1, 100]`.
   pub fn clamped(mut self) -> Self {
      self.page = self.page.max(1);
      self.limit = self.limit.clamp(1, MAX_LIST_LIMIT);
      self
   }
}

/// Upload payload: the file part plus processing options.
#[derive(Debug, Clone)]
pub struct UploadRequest {
   pub name:               String,
   pub content:            Bytes,
   pub indexing_technique: String,
   pub process_mode:       String,
}

/// Validated remote address and credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
   base_url: String,
   api_key:  String,
}

impl std::fmt::Debug for Endpoint {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Endpoint")
         .field("base_url", &self.base_url)
         .finish_non_exhaustive()
   }
}

impl Endpoint {
   /// Normalizes the base URL to end in `/v1`. Empty inputs are a
   /// configuration error.
   pub fn new(url: &str, api_key: &str) -> Result<Self> {
      let url = url.trim();
      let api_key = api_key.trim();
      if url.is_empty() {
         return Err(Error::NotConfigured("dify_url"));
      }
      if api_key.is_empty() {
         return Err(Error::NotConfigured("dify_api_key"));
      }

      let mut base_url = url.trim_end_matches('/').to_string();
      if !base_url.ends_with("/v1") {
         base_url.push_str("/v1");
      }
      Ok(Self { base_url, api_key: api_key.to_string() })
   }

   pub fn from_config(cfg: &Config) -> Result<Self> {
      Self::new(&cfg.dify_url, &cfg.dify_api_key)
   }

   pub fn base_url(&self) -> &str {
      &self.base_url
   }

   pub fn api_key(&self) -> &str {
      &self.api_key
   }

   pub fn url(&self, tail: &str) -> String {
      format!("{}/{}", self.base_url, tail.trim_start_matches('/'))
   }
}

/// Single-attempt remote transport.
#[async_trait]
pub trait RemoteStore: Send + Sync {
   /// Creates a document from file content. Returns the created document
   /// when the response carries one.
   async fn upload(
      &self,
      endpoint: &Endpoint,
      dataset: &str,
      request: &UploadRequest,
   ) -> Result<Option<RemoteDocumentRef>>;

   /// Deletes by id; a missing id is [`Error::RemoteNotFound`].
   async fn delete(&self, endpoint: &Endpoint, dataset: &str, document_id: &str) -> Result<()>;

   async fn list(&self, endpoint: &Endpoint, dataset: &str, query: &ListQuery)
   -> Result<DocumentPage>;

   async fn dataset(&self, endpoint: &Endpoint, dataset: &str) -> Result<DatasetInfo>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
   async fn upload(
      &self,
      endpoint: &Endpoint,
      dataset: &str,
      request: &UploadRequest,
   ) -> Result<Option<RemoteDocumentRef>> {
      (**self).upload(endpoint, dataset, request).await
   }

   async fn delete(&self, endpoint: &Endpoint, dataset: &str, document_id: &str) -> Result<()> {
      (**self).delete(endpoint, dataset, document_id).await
   }

   async fn list(
      &self,
      endpoint: &Endpoint,
      dataset: &str,
      query: &ListQuery,
   ) -> Result<DocumentPage> {
      (**self).list(endpoint, dataset, query).await
   }

   async fn dataset(&self, endpoint: &Endpoint, dataset: &str) -> Result<DatasetInfo> {
      (**self).dataset(endpoint, dataset).await
   }
}

/// Retrying client bound to one configuration snapshot.
pub struct RemoteClient<'a, R: ?Sized> {
   store:              &'a R,
   endpoint:           Endpoint,
   retry:              RetryPolicy,
   page_limit:         u32,
   indexing_technique: &'a str,
   process_mode:       &'a str,
}

impl<'a, R: RemoteStore + ?Sized> RemoteClient<'a, R> {
   /// Fails with [`Error::NotConfigured`] before any request when the URL
   /// or key is missing.
   pub fn new(store: &'a R, cfg: &'a Config) -> Result<Self> {
      Ok(Self {
         store,
         endpoint: Endpoint::from_config(cfg)?,
         retry: RetryPolicy::from_config(cfg),
         page_limit: cfg.effective_list_limit(),
         indexing_technique: &cfg.indexing_technique,
         process_mode: &cfg.process_mode,
      })
   }

   pub const fn endpoint(&self) -> &Endpoint {
      &self.endpoint
   }

   pub async fn upload(
      &self,
      dataset: &str,
      identifier: &str,
      content: Bytes,
   ) -> Result<Option<RemoteDocumentRef>> {
      let request = UploadRequest {
         name: identifier.to_string(),
         content,
         indexing_technique: self.indexing_technique.to_string(),
         process_mode: self.process_mode.to_string(),
      };
      let result = self
         .retry
         .run("upload", || self.store.upload(&self.endpoint, dataset, &request))
         .await;
      if let Err(e) = &result {
         tracing::error!(dataset, identifier, "upload failed: {e}");
      }
      result
   }

   pub async fn delete(&self, dataset: &str, document_id: &str) -> Result<()> {
      self
         .retry
         .run("delete", || self.store.delete(&self.endpoint, dataset, document_id))
         .await
   }

   pub async fn list(&self, dataset: &str, query: ListQuery) -> Result<DocumentPage> {
      let query = query.clamped();
      self
         .retry
         .run("list", || self.store.list(&self.endpoint, dataset, &query))
         .await
   }

   pub async fn dataset(&self, dataset: &str) -> Result<DatasetInfo> {
      self
         .retry
         .run("dataset", || self.store.dataset(&self.endpoint, dataset))
         .await
   }

   /// Walks every page and returns the first document named exactly
   /// `identifier`.
   pub async fn find_by_identifier(
      &self,
      dataset: &str,
      identifier: &str,
   ) -> Result<Option<RemoteDocumentRef>> {
      let mut found = None;
      self
         .for_each_page(dataset, |page| {
            found = page.iter().find(|d| d.name == identifier).cloned();
            found.is_none()
         })
         .await?;
      Ok(found)
   }

   /// Locates the document for a local file whose identifier may carry a
   /// different timestamp than the remote copy.
   ///
   /// An exact name wins outright. Otherwise candidates with an equal
   /// match key are collected; one whose timestamp-free shape also agrees
   /// is preferred, else the first candidate in listing order.
   pub async fn resolve_document(
      &self,
      dataset: &str,
      identifier: &str,
   ) -> Result<Option<RemoteDocumentRef>> {
      let key = MatchKey::of(identifier);
      let mut exact = None;
      let mut candidates: Vec<RemoteDocumentRef> = Vec::new();

      self
         .for_each_page(dataset, |page| {
            for doc in page {
               if doc.name == identifier {
                  exact = Some(doc.clone());
                  return false;
               }
               if key.matches(&doc.name) {
                  candidates.push(doc.clone());
               }
            }
            true
         })
         .await?;

      if exact.is_some() {
         return Ok(exact);
      }

      if candidates.len() > 1 {
         let names: Vec<&str> = candidates.iter().map(|d| d.name.as_str()).collect();
         tracing::warn!(
            dataset,
            identifier,
            "{} remote documents share the match key {:?}: {names:?}",
            candidates.len(),
            key.key
         );
         if let Some(idx) = candidates.iter().position(|d| key.same_shape(&d.name)) {
            return Ok(Some(candidates.swap_remove(idx)));
         }
      }
      Ok(candidates.into_iter().next())
   }

   /// Feeds pages to `visit` until it returns false or the listing ends.
   async fn for_each_page<F>(&self, dataset: &str, mut visit: F) -> Result<()>
   where
      F: FnMut(&[RemoteDocumentRef]) -> bool,
   {
      let mut page = 1;
      loop {
         let listing = self
            .list(dataset, ListQuery::page(page, self.page_limit))
            .await?;
         if !visit(&listing.data) || !listing.has_more || listing.data.is_empty() {
            return Ok(());
         }
         page += 1;
      }
   }
}
