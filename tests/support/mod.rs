#![allow(dead_code)]

use std::{
   collections::{BTreeMap, VecDeque},
   sync::Arc,
};

use difysync::{
   Error,
   config::{Config, ConfigStore},
   mapping::DirectoryMapping,
   remote::{
      DatasetInfo, DocumentPage, Endpoint, ListQuery, RemoteDocumentRef, RemoteStore, UploadRequest,
   },
   sync::SyncEngine,
};
use parking_lot::Mutex;

/// 2025-09-25 09:05:02 UTC
pub const MTIME: i64 = 1_758_791_102;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
   Upload,
   Delete,
   List,
   Dataset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
   Transient,
   NotFound,
   Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
   Upload { dataset: String, name: String, size: usize },
   Delete { dataset: String, id: String },
   List { dataset: String, page: u32, limit: u32 },
   Dataset { dataset: String },
}

impl Call {
   pub const fn op(&self) -> Op {
      match self {
         Self::Upload { .. } => Op::Upload,
         Self::Delete { .. } => Op::Delete,
         Self::List { .. } => Op::List,
         Self::Dataset { .. } => Op::Dataset,
      }
   }
}

#[derive(Default)]
struct State {
   datasets:        BTreeMap<String, Vec<RemoteDocumentRef>>,
   next_id:         u64,
   calls:           Vec<Call>,
   failures:        VecDeque<(Op, Failure)>,
   anonymous_reply: bool,
}

/// In-memory knowledge base recording every call it receives.
#[derive(Default)]
pub struct FakeRemote {
   state: Mutex<State>,
}

impl FakeRemote {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   /// Adds an existing document and returns its id.
   pub fn seed(&self, dataset: &str, name: &str) -> String {
      let mut state = self.state.lock();
      state.next_id += 1;
      let id = format!("doc-{}", state.next_id);
      state
         .datasets
         .entry(dataset.to_string())
         .or_default()
         .push(RemoteDocumentRef { id: id.clone(), name: name.to_string() });
      id
   }

   /// Removes a document behind the engine's back.
   pub fn drop_document(&self, dataset: &str, id: &str) {
      if let Some(docs) = self.state.lock().datasets.get_mut(dataset) {
         docs.retain(|d| d.id != id);
      }
   }

   pub fn documents(&self, dataset: &str) -> Vec<RemoteDocumentRef> {
      self
         .state
         .lock()
         .datasets
         .get(dataset)
         .cloned()
         .unwrap_or_default()
   }

   pub fn names(&self, dataset: &str) -> Vec<String> {
      self.documents(dataset).into_iter().map(|d| d.name).collect()
   }

   pub fn calls(&self) -> Vec<Call> {
      self.state.lock().calls.clone()
   }

   pub fn count(&self, op: Op) -> usize {
      self.state.lock().calls.iter().filter(|c| c.op() == op).count()
   }

   pub fn clear_calls(&self) {
      self.state.lock().calls.clear();
   }

   /// The next `times` calls of `op` fail with `failure`.
   pub fn fail(&self, op: Op, failure: Failure, times: usize) {
      let mut state = self.state.lock();
      for _ in 0..times {
         state.failures.push_back((op, failure));
      }
   }

   /// Upload responses omit the created document.
   pub fn anonymous_uploads(&self) {
      self.state.lock().anonymous_reply = true;
   }

   fn record(&self, call: Call) -> Result<(), Error> {
      let op = call.op();
      let mut state = self.state.lock();
      state.calls.push(call);
      let Some(idx) = state.failures.iter().position(|(o, _)| *o == op) else {
         return Ok(());
      };
      let (_, failure) = state.failures.remove(idx).unwrap();
      Err(match failure {
         Failure::Transient => {
            Error::RemoteTransient { op: "fake", reason: "HTTP 503: unavailable".to_string() }
         },
         Failure::NotFound => Error::RemoteNotFound { op: "fake", what: "injected".to_string() },
         Failure::Rejected => Error::RemoteRejected { op: "fake", status: 400, body: "bad".into() },
      })
   }
}

#[async_trait::async_trait]
impl RemoteStore for FakeRemote {
   async fn upload(
      &self,
      _endpoint: &Endpoint,
      dataset: &str,
      request: &UploadRequest,
   ) -> difysync::Result<Option<RemoteDocumentRef>> {
      self.record(Call::Upload {
         dataset: dataset.to_string(),
         name:    request.name.clone(),
         size:    request.content.len(),
      })?;
      let id = self.seed(dataset, &request.name);
      if self.state.lock().anonymous_reply {
         return Ok(None);
      }
      Ok(Some(RemoteDocumentRef { id, name: request.name.clone() }))
   }

   async fn delete(
      &self,
      _endpoint: &Endpoint,
      dataset: &str,
      document_id: &str,
   ) -> difysync::Result<()> {
      self.record(Call::Delete { dataset: dataset.to_string(), id: document_id.to_string() })?;
      let mut state = self.state.lock();
      let docs = state.datasets.entry(dataset.to_string()).or_default();
      match docs.iter().position(|d| d.id == document_id) {
         Some(idx) => {
            docs.remove(idx);
            Ok(())
         },
         None => Err(Error::RemoteNotFound { op: "delete", what: document_id.to_string() }),
      }
   }

   async fn list(
      &self,
      _endpoint: &Endpoint,
      dataset: &str,
      query: &ListQuery,
   ) -> difysync::Result<DocumentPage> {
      self.record(Call::List {
         dataset: dataset.to_string(),
         page:    query.page,
         limit:   query.limit,
      })?;
      let docs: Vec<RemoteDocumentRef> = self
         .documents(dataset)
         .into_iter()
         .filter(|d| query.keyword.as_deref().is_none_or(|k| d.name.contains(k)))
         .collect();

      let limit = query.limit as usize;
      let start = (query.page as usize - 1) * limit;
      let data: Vec<RemoteDocumentRef> = docs.iter().skip(start).take(limit).cloned().collect();
      Ok(DocumentPage {
         has_more: start + data.len() < docs.len(),
         data,
         page: query.page,
         limit: query.limit,
         total: docs.len() as u64,
      })
   }

   async fn dataset(&self, _endpoint: &Endpoint, dataset: &str) -> difysync::Result<DatasetInfo> {
      self.record(Call::Dataset { dataset: dataset.to_string() })?;
      match self.state.lock().datasets.get(dataset) {
         Some(docs) => Ok(DatasetInfo {
            id:             dataset.to_string(),
            name:           format!("kb {dataset}"),
            document_count: docs.len() as u64,
         }),
         None => Err(Error::RemoteNotFound { op: "dataset", what: dataset.to_string() }),
      }
   }
}

/// Configured for the fake remote with zero backoff.
pub fn config(mappings: &[(&str, &str)]) -> Config {
   Config {
      dify_url: "http://dify.test".to_string(),
      dify_api_key: "test-key".to_string(),
      retry_base_ms: 0,
      mappings: mappings
         .iter()
         .map(|(path, dataset)| DirectoryMapping::new(*path, *dataset))
         .collect(),
      ..Config::default()
   }
}

pub fn engine(remote: &Arc<FakeRemote>, cfg: Config) -> SyncEngine<Arc<FakeRemote>> {
   SyncEngine::new(Arc::clone(remote), Arc::new(ConfigStore::in_memory(cfg)))
}
