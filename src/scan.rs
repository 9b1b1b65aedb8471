//! Reconciliation scan.
//!
//! Replays every readable file under a directory as a create event through
//! the same handler live events use. Nothing is deduplicated against the
//! remote: each scan uploads every file again.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   config::Config,
   file,
   mapping::DirectoryMapping,
   sync::SyncHandler,
   types::{EventKind, SyncOutcome},
};

/// Progress of a running scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
   pub processed:    usize,
   pub total:        usize,
   pub current_file: Option<String>,
}

/// Callback trait for receiving scan progress updates.
pub trait ScanProgressCallback: Send {
   fn progress(&mut self, progress: ScanProgress);
}

impl<F: FnMut(ScanProgress) + Send> ScanProgressCallback for F {
   fn progress(&mut self, progress: ScanProgress) {
      self(progress);
   }
}

impl ScanProgressCallback for () {
   fn progress(&mut self, _progress: ScanProgress) {}
}

impl ScanProgressCallback for ProgressBar {
   fn progress(&mut self, progress: ScanProgress) {
      self.update(|state| {
         state.set_len(progress.total as u64);
         state.set_pos(progress.processed as u64);
      });
      if let Some(file) = &progress.current_file {
         let short = file.rsplit('/').next().unwrap_or(file);
         self.set_message(short.to_string());
      }
   }
}

/// Tally of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
   pub discovered: usize,
   pub uploaded:   usize,
   pub ignored:    usize,
   pub failed:     usize,
   pub cancelled:  bool,
}

impl ScanReport {
   fn record(&mut self, outcome: &SyncOutcome) {
      match outcome {
         SyncOutcome::Uploaded { .. } => self.uploaded += 1,
         SyncOutcome::Failed { .. } => self.failed += 1,
         SyncOutcome::Ignored { .. }
         | SyncOutcome::Deleted { .. }
         | SyncOutcome::AlreadyAbsent { .. } => self.ignored += 1,
      }
   }

   pub fn merge(&mut self, other: &Self) {
      self.discovered += other.discovered;
      self.uploaded += other.uploaded;
      self.ignored += other.ignored;
      self.failed += other.failed;
      self.cancelled |= other.cancelled;
   }

   /// Events that reached the handler.
   pub const fn processed(&self) -> usize {
      self.uploaded + self.ignored + self.failed
   }
}

/// Scan result for one configured mapping.
#[derive(Debug, Clone, Serialize)]
pub struct MappingScan {
   pub local_path:  String,
   pub dataset_id:  String,
   pub directories: Vec<PathBuf>,
   pub report:      ScanReport,
}

pub struct Scanner<'a, H: ?Sized> {
   handler:      &'a H,
   storage_root: &'a Path,
   cancel:       CancellationToken,
}

impl<'a, H: SyncHandler + ?Sized> Scanner<'a, H> {
   pub fn new(handler: &'a H, storage_root: &'a Path) -> Self {
      Self { handler, storage_root, cancel: CancellationToken::new() }
   }

   pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
      self.cancel = cancel;
      self
   }

   /// Enumerates `dir` and feeds one create event per readable file to the
   /// handler. Cancellation is honored between files, never mid-upload.
   pub async fn scan_and_sync(
      &self,
      dir: &Path,
      progress: &mut dyn ScanProgressCallback,
   ) -> Result<ScanReport> {
      self.scan_dir(dir, &[], progress).await
   }

   /// Like [`Self::scan_and_sync`], leaving out files under `skip`.
   async fn scan_dir(
      &self,
      dir: &Path,
      skip: &[PathBuf],
      progress: &mut dyn ScanProgressCallback,
   ) -> Result<ScanReport> {
      let root = self.storage_root.to_path_buf();
      let walk_dir = dir.to_path_buf();
      let mut nodes = tokio::task::spawn_blocking(move || file::discover(&root, &walk_dir))
         .await
         .map_err(std::io::Error::other)?;
      nodes.retain(|node| !skip.iter().any(|d| node.local_path.starts_with(d)));

      let total = nodes.len();
      let mut report = ScanReport { discovered: total, ..ScanReport::default() };
      tracing::info!(dir = %dir.display(), files = total, "scanning");

      for (processed, node) in nodes.into_iter().enumerate() {
         if self.cancel.is_cancelled() {
            tracing::info!(dir = %dir.display(), processed, total, "scan cancelled");
            report.cancelled = true;
            break;
         }
         progress.progress(ScanProgress {
            processed,
            total,
            current_file: Some(node.store_path.clone()),
         });

         let outcome = self.handler.handle(node.into_event(EventKind::Create)).await;
         report.record(&outcome);
      }

      self.handler.flush().await;
      progress.progress(ScanProgress { processed: report.processed(), total, current_file: None });
      Ok(report)
   }

   /// Scans every configured mapping, or only the one whose local path is
   /// `only`. Mappings without a local directory are logged and skipped.
   ///
   /// A directory nested under another mapping is scanned once, by the
   /// mapping that owns it. A repeated prefix is left to its first mapping.
   pub async fn scan_all(
      &self,
      cfg: &Config,
      only: Option<&str>,
      progress: &mut dyn ScanProgressCallback,
   ) -> Result<Vec<MappingScan>> {
      let marker = &cfg.files_marker;
      let mappings: Vec<&DirectoryMapping> =
         cfg.mappings.iter().filter(|m| !m.dataset_id.trim().is_empty()).collect();
      let all_dirs: Vec<Vec<PathBuf>> = mappings
         .iter()
         .map(|m| mapping_dirs(self.storage_root, cfg, m))
         .collect();
      let mut results = Vec::new();

      for (i, mapping) in mappings.iter().enumerate() {
         if only.is_some_and(|wanted| !same_mapping(mapping, wanted, marker)) {
            continue;
         }
         if self.cancel.is_cancelled() {
            break;
         }
         let prefix = mapping.relative_prefix(marker);
         if mappings[..i].iter().any(|m| m.relative_prefix(marker) == prefix) {
            tracing::warn!(
               local_path = mapping.local_path,
               dataset = mapping.dataset_id,
               "directory already mapped by an earlier entry, skipping"
            );
            continue;
         }

         let directories = all_dirs[i].clone();
         if directories.is_empty() {
            tracing::warn!(
               local_path = mapping.local_path,
               dataset = mapping.dataset_id,
               "mapped directory not found under {}",
               self.storage_root.display()
            );
            continue;
         }

         let nested: Vec<PathBuf> = all_dirs
            .iter()
            .flatten()
            .filter(|d| directories.iter().any(|own| d.starts_with(own) && *d != own))
            .cloned()
            .collect();
         let mut report = ScanReport::default();
         for dir in &directories {
            report.merge(&self.scan_dir(dir, &nested, progress).await?);
            if report.cancelled {
               break;
            }
         }
         tracing::info!(
            local_path = mapping.local_path,
            dataset = mapping.dataset_id,
            uploaded = report.uploaded,
            failed = report.failed,
            "mapping scan finished"
         );
         results.push(MappingScan {
            local_path: mapping.local_path.clone(),
            dataset_id: mapping.dataset_id.clone(),
            directories,
            report,
         });
      }

      Ok(results)
   }
}

/// Local directories holding `mapping`, one per user files root.
pub fn mapping_dirs(storage_root: &Path, cfg: &Config, mapping: &DirectoryMapping) -> Vec<PathBuf> {
   let prefix = mapping.relative_prefix(&cfg.files_marker);
   file::files_roots(storage_root, &cfg.files_marker)
      .into_iter()
      .map(|root| if prefix.is_empty() { root } else { root.join(prefix) })
      .filter(|dir| dir.is_dir())
      .collect()
}

fn same_mapping(mapping: &DirectoryMapping, wanted: &str, marker: &str) -> bool {
   let wanted = DirectoryMapping::new(wanted, "");
   mapping.relative_prefix(marker) == wanted.relative_prefix(marker)
}
