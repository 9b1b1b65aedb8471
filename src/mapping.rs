//! Directory to dataset resolution.

use serde::{Deserialize, Serialize};

use crate::naming::relative_portion;

/// Association between a directory under the files root and a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMapping {
   #[serde(alias = "nextcloud_path", alias = "localPath")]
   pub local_path: String,
   #[serde(alias = "dify_kb_id", alias = "datasetId")]
   pub dataset_id: String,
}

impl DirectoryMapping {
   pub fn new(local_path: impl Into<String>, dataset_id: impl Into<String>) -> Self {
      Self { local_path: local_path.into(), dataset_id: dataset_id.into() }
   }

   /// Both halves present after trimming.
   pub fn is_usable(&self) -> bool {
      !self.local_path.trim().is_empty() && !self.dataset_id.trim().is_empty()
   }

   /// Prefix relative to the files root, without surrounding slashes.
   /// Empty for a root mapping. A full store path (`/alice/files/x`) loses
   /// its leading `/<user><marker>` only; anything else is already relative.
   pub fn relative_prefix(&self, marker: &str) -> &str {
      let raw = self.local_path.as_str();
      normalize(strip_user_root(raw, marker).unwrap_or(raw))
   }
}

/// Mapping table sorted most-specific first.
///
/// Built from one configuration snapshot and never mutated; a config change
/// produces a new resolver.
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
   entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
   prefix:  String,
   dataset: String,
   raw:     String,
}

/// A successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<'a> {
   pub dataset_id: &'a str,
   pub local_path: &'a str,
}

impl MappingResolver {
   /// `marker` lets configured prefixes be written as full store paths
   /// (`/alice/files/reports`); everything up to the marker is dropped.
   pub fn new(mappings: &[DirectoryMapping], marker: &str) -> Self {
      let mut entries: Vec<Entry> = mappings
         .iter()
         .filter(|m| !m.dataset_id.trim().is_empty())
         .map(|m| Entry {
            prefix:  m.relative_prefix(marker).to_string(),
            dataset: m.dataset_id.trim().to_string(),
            raw:     m.local_path.clone(),
         })
         .collect();

      // Stable: configuration order breaks ties.
      entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
      Self { entries }
   }

   /// Resolves a path relative to the files root.
   pub fn resolve(&self, relative: &str) -> Option<Resolved<'_>> {
      let path = normalize(relative);
      self
         .entries
         .iter()
         .find(|e| is_segment_prefix(&e.prefix, path))
         .map(|e| Resolved { dataset_id: &e.dataset, local_path: &e.raw })
   }

   /// Resolves a full store path; paths outside any files root are unmanaged.
   pub fn resolve_store_path(&self, path: &str, marker: &str) -> Option<Resolved<'_>> {
      self.resolve(relative_portion(path, marker)?)
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }
}

/// Convenience over [`MappingResolver::resolve`] for a one-off lookup.
pub fn resolve(relative: &str, mappings: &[DirectoryMapping]) -> Option<String> {
   MappingResolver::new(mappings, "")
      .resolve(relative)
      .map(|r| r.dataset_id.to_string())
}

/// `path` past a leading `/<user><marker>` segment pair.
fn strip_user_root<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
   if marker.is_empty() {
      return None;
   }
   let rest = path.trim().trim_start_matches('/');
   let after_user = &rest[rest.find('/')?..];
   after_user
      .strip_prefix(marker)
      .or_else(|| (after_user == marker.trim_end_matches('/')).then_some(""))
}

fn normalize(path: &str) -> &str {
   path.trim().trim_matches('/')
}

fn is_segment_prefix(prefix: &str, path: &str) -> bool {
   if prefix.is_empty() {
      return true;
   }
   match path.strip_prefix(prefix) {
      Some(rest) => rest.is_empty() || rest.starts_with('/'),
      None => false,
   }
}
