mod support;

use std::{fs, path::Path, sync::Arc};

use difysync::{
   config::Config,
   index::DocumentIndex,
   mapping::DirectoryMapping,
   scan::{ScanProgress, Scanner, mapping_dirs},
};
use support::{FakeRemote, Op, config, engine};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write(root: &Path, relative: &str, text: &str) {
   let path = root.join(relative);
   fs::create_dir_all(path.parent().unwrap()).unwrap();
   fs::write(path, text).unwrap();
}

/// Two users with a `reports` directory plus an unmapped `notes` one.
fn store() -> TempDir {
   let dir = TempDir::new().unwrap();
   write(dir.path(), "alice/files/reports/q1.md", "q1");
   write(dir.path(), "alice/files/reports/2025/q2.md", "q2");
   write(dir.path(), "bob/files/reports/summary.txt", "sum");
   write(dir.path(), "alice/files/notes/todo.txt", "todo");
   fs::create_dir_all(dir.path().join("alice/files/reports/empty")).unwrap();
   dir
}

fn scan_config(root: &Path, mappings: &[(&str, &str)]) -> Config {
   Config { storage_root: root.to_path_buf(), ..config(mappings) }
}

#[tokio::test]
async fn scan_uploads_every_file_of_every_user() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());

   let scanner = Scanner::new(&engine, dir.path());
   let results = scanner.scan_all(&cfg, None, &mut ()).await.unwrap();

   assert_eq!(results.len(), 1);
   let scan = &results[0];
   assert_eq!(scan.dataset_id, "kb_reports");
   assert_eq!(scan.directories.len(), 2);
   assert_eq!(scan.report.discovered, 3);
   assert_eq!(scan.report.uploaded, 3);
   assert!(!scan.report.cancelled);

   let mut names = remote.names("kb_reports");
   names.sort();
   assert_eq!(names.len(), 3);
   assert!(names[0].starts_with("📄q1.md 📁reports 📅"), "{names:?}");
   assert!(names[1].starts_with("📄q2.md 📁reports-2025 📅"), "{names:?}");
   assert!(names[2].starts_with("📄summary.txt 📁reports 📅"), "{names:?}");
}

#[tokio::test]
async fn rescanning_uploads_again() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());
   let scanner = Scanner::new(&engine, dir.path());

   scanner.scan_all(&cfg, None, &mut ()).await.unwrap();
   scanner.scan_all(&cfg, None, &mut ()).await.unwrap();

   assert_eq!(remote.count(Op::Upload), 6);
   assert_eq!(remote.count(Op::List), 0);
}

#[tokio::test]
async fn scan_can_be_limited_to_one_mapping() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports"), ("/notes", "kb_notes")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());
   let scanner = Scanner::new(&engine, dir.path());

   let results = scanner
      .scan_all(&cfg, Some("notes/"), &mut ())
      .await
      .unwrap();

   assert_eq!(results.len(), 1);
   assert_eq!(results[0].local_path, "/notes");
   assert_eq!(remote.count(Op::Upload), 1);
   assert!(remote.names("kb_reports").is_empty());
}

#[tokio::test]
async fn cancelled_scan_stops_before_uploading() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());

   let cancel = CancellationToken::new();
   cancel.cancel();
   let scanner = Scanner::new(&engine, dir.path()).with_cancel(cancel);
   let report = scanner
      .scan_and_sync(&dir.path().join("alice/files/reports"), &mut ())
      .await
      .unwrap();

   assert!(report.cancelled);
   assert_eq!(report.discovered, 2);
   assert_eq!(report.processed(), 0);
   assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn progress_reaches_total() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());
   let scanner = Scanner::new(&engine, dir.path());

   let mut seen: Vec<ScanProgress> = Vec::new();
   let mut callback = |p: ScanProgress| seen.push(p);
   scanner
      .scan_and_sync(&dir.path().join("alice/files/reports"), &mut callback)
      .await
      .unwrap();

   let last = seen.last().unwrap();
   assert_eq!((last.processed, last.total), (2, 2));
   assert!(last.current_file.is_none());
   assert_eq!(seen[0].current_file.as_deref(), Some("/alice/files/reports/2025/q2.md"));
}

#[tokio::test]
async fn upload_failures_are_counted_not_fatal() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports")]);
   let remote = FakeRemote::new();
   remote.fail(Op::Upload, support::Failure::Rejected, 1);
   let engine = engine(&remote, cfg.clone());
   let scanner = Scanner::new(&engine, dir.path());

   let results = scanner.scan_all(&cfg, None, &mut ()).await.unwrap();
   assert_eq!(results[0].report.failed, 1);
   assert_eq!(results[0].report.uploaded, 2);
}

#[test]
fn mapping_dirs_follow_files_roots() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[]);

   let reports = mapping_dirs(dir.path(), &cfg, &DirectoryMapping::new("/reports", "kb"));
   assert_eq!(reports, vec![
      dir.path().join("alice/files/reports"),
      dir.path().join("bob/files/reports"),
   ]);

   let full = mapping_dirs(dir.path(), &cfg, &DirectoryMapping::new("/alice/files/notes", "kb"));
   assert_eq!(full, vec![dir.path().join("alice/files/notes")]);

   let root = mapping_dirs(dir.path(), &cfg, &DirectoryMapping::new("/", "kb"));
   assert_eq!(root, vec![dir.path().join("alice/files"), dir.path().join("bob/files")]);

   assert!(mapping_dirs(dir.path(), &cfg, &DirectoryMapping::new("/missing", "kb")).is_empty());
}

#[tokio::test]
async fn nested_mappings_upload_each_file_once() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports"), ("/reports/2025", "kb_2025")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());
   let scanner = Scanner::new(&engine, dir.path());

   let results = scanner.scan_all(&cfg, None, &mut ()).await.unwrap();

   assert_eq!(results.len(), 2);
   assert_eq!(results[0].report.discovered, 2);
   assert_eq!(results[1].report.discovered, 1);
   assert_eq!(remote.count(Op::Upload), 3);
   assert_eq!(remote.names("kb_reports").len(), 2);
   assert_eq!(remote.names("kb_2025").len(), 1);
}

#[tokio::test]
async fn repeated_mapping_is_scanned_once() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports"), ("reports/", "kb_other")]);
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone());
   let scanner = Scanner::new(&engine, dir.path());

   let results = scanner.scan_all(&cfg, None, &mut ()).await.unwrap();

   assert_eq!(results.len(), 1);
   assert_eq!(remote.count(Op::Upload), 3);
   assert!(remote.names("kb_other").is_empty());
}

#[tokio::test]
async fn scan_leaves_document_index_on_disk() {
   let dir = store();
   let cfg = scan_config(dir.path(), &[("/reports", "kb_reports")]);
   let file = dir.path().join("index/documents.json");
   let index = Arc::new(DocumentIndex::load(&file).unwrap());
   let remote = FakeRemote::new();
   let engine = engine(&remote, cfg.clone()).with_index(Arc::clone(&index));
   let scanner = Scanner::new(&engine, dir.path());

   scanner.scan_all(&cfg, None, &mut ()).await.unwrap();

   assert_eq!(index.unsaved(), 0);
   assert_eq!(DocumentIndex::load(&file).unwrap().len(), 3);
}
