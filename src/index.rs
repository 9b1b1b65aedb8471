//! Persisted `(dataset, path) -> document` cache.
//!
//! Lets updates and deletes address a document by id without listing the
//! dataset. Entries are hints: a stale id falls back to name matching.

use std::{
   collections::BTreeMap,
   fs,
   path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
   Result,
   config::{self, write_atomic},
   remote::Endpoint,
};

/// Cached remote document for one local path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CachedDocument {
   pub id:    String,
   pub name:  String,
   /// Modification time the document was uploaded with.
   pub mtime: i64,
}

#[derive(Serialize, Deserialize, Default)]
struct IndexState {
   #[serde(default)]
   base_url: String,
   #[serde(default)]
   datasets: BTreeMap<String, BTreeMap<String, CachedDocument>>,
   /// Mutations since the last save.
   #[serde(skip)]
   unsaved:  usize,
}

pub struct DocumentIndex {
   path:    Option<PathBuf>,
   state:   Mutex<IndexState>,
   /// Serializes writers so an older snapshot never lands after a newer one.
   writing: Mutex<()>,
}

impl DocumentIndex {
   /// Loads the index from disk, creating an empty one if it doesn't exist.
   pub fn load(path: &Path) -> Result<Self> {
      let state = if path.exists() {
         let content = fs::read_to_string(path)?;
         serde_json::from_str(&content)?
      } else {
         IndexState::default()
      };
      Ok(Self {
         path:    Some(path.to_path_buf()),
         state:   Mutex::new(state),
         writing: Mutex::new(()),
      })
   }

   /// Loads the index belonging to `endpoint`. Each remote instance gets
   /// its own file so ids never leak across deployments.
   pub fn load_for(endpoint: &Endpoint) -> Result<Self> {
      let index = Self::load(&index_path(config::data_dir(), endpoint))?;
      index.state.lock().base_url = endpoint.base_url().to_string();
      Ok(index)
   }

   /// Whether ids in this index belong to `endpoint`. An index not tied
   /// to any endpoint serves all of them.
   pub fn serves(&self, endpoint: &Endpoint) -> bool {
      let state = self.state.lock();
      state.base_url.is_empty() || state.base_url == endpoint.base_url()
   }

   pub fn in_memory() -> Self {
      Self { path: None, state: Mutex::new(IndexState::default()), writing: Mutex::new(()) }
   }

   pub fn get(&self, dataset: &str, path: &str) -> Option<CachedDocument> {
      self
         .state
         .lock()
         .datasets
         .get(dataset)
         .and_then(|docs| docs.get(path))
         .cloned()
   }

   pub fn record(&self, dataset: &str, path: &str, doc: CachedDocument) {
      let mut state = self.state.lock();
      state
         .datasets
         .entry(dataset.to_string())
         .or_default()
         .insert(path.to_string(), doc);
      state.unsaved += 1;
   }

   pub fn forget(&self, dataset: &str, path: &str) {
      let mut state = self.state.lock();
      let Some(docs) = state.datasets.get_mut(dataset) else {
         return;
      };
      if docs.remove(path).is_some() {
         if docs.is_empty() {
            state.datasets.remove(dataset);
         }
         state.unsaved += 1;
      }
   }

   pub fn len(&self) -> usize {
      self.state.lock().datasets.values().map(BTreeMap::len).sum()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   /// Number of changes not yet on disk.
   pub fn unsaved(&self) -> usize {
      self.state.lock().unsaved
   }

   /// Saves the index to disk if it has unsaved changes. The state lock is
   /// only held while serializing; the write happens outside it.
   pub fn save(&self) -> Result<()> {
      let _writing = self.writing.lock();
      let (json, pending) = {
         let mut state = self.state.lock();
         if state.unsaved == 0 {
            return Ok(());
         }
         let json = match self.path {
            Some(_) => Some(serde_json::to_string(&*state)?),
            None => None,
         };
         (json, std::mem::take(&mut state.unsaved))
      };

      let (Some(path), Some(json)) = (&self.path, json) else {
         return Ok(());
      };
      write_atomic(path, &json).inspect_err(|_| self.state.lock().unsaved += pending)
   }
}

fn index_path(dir: &Path, endpoint: &Endpoint) -> PathBuf {
   let digest = Sha256::digest(endpoint.base_url().as_bytes());
   dir.join(format!("documents-{}.json", &hex::encode(digest)[..16]))
}
