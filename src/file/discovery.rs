//! Recursive file discovery under a mapped directory.

use std::path::Path;

use walkdir::WalkDir;

use crate::file::FileNode;

/// Lists readable regular files below `dir`, depth first with entries
/// sorted by name. Unreadable entries are logged and skipped.
pub fn discover(root: &Path, dir: &Path) -> Vec<FileNode> {
   let mut nodes = Vec::new();

   for entry in WalkDir::new(dir)
      .follow_links(false)
      .sort_by_file_name()
   {
      let entry = match entry {
         Ok(entry) => entry,
         Err(e) => {
            tracing::warn!("skipping unreadable entry: {e}");
            continue;
         },
      };
      if !entry.file_type().is_file() {
         continue;
      }

      let meta = match entry.metadata() {
         Ok(meta) => meta,
         Err(e) => {
            tracing::warn!("failed to stat {}: {e}", entry.path().display());
            continue;
         },
      };
      let Some(node) = FileNode::from_metadata(root, entry.path(), &meta) else {
         tracing::warn!("skipping path outside storage root or not UTF-8: {}", entry.path().display());
         continue;
      };
      if !node.is_readable() {
         tracing::debug!(path = node.store_path, "skipping unreadable file");
         continue;
      }
      nodes.push(node);
   }

   nodes
}

#[cfg(test)]
mod tests {
   use std::fs;

   use tempfile::TempDir;

   use super::*;

   #[test]
   fn walks_nested_directories_in_name_order() {
      let dir = TempDir::new().unwrap();
      let files = dir.path().join("u/files");
      fs::create_dir_all(files.join("b/deeper")).unwrap();
      fs::write(files.join("z.md"), "z").unwrap();
      fs::write(files.join("a.md"), "a").unwrap();
      fs::write(files.join("b/deeper/c.md"), "c").unwrap();

      let paths: Vec<String> = discover(dir.path(), &files)
         .into_iter()
         .map(|n| n.store_path)
         .collect();
      assert_eq!(paths, vec!["/u/files/a.md", "/u/files/b/deeper/c.md", "/u/files/z.md"]);
   }

   #[cfg(unix)]
   #[test]
   fn skips_files_without_read_bits() {
      use std::os::unix::fs::PermissionsExt;

      let dir = TempDir::new().unwrap();
      let secret = dir.path().join("secret.md");
      fs::write(&secret, "x").unwrap();
      fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
      fs::write(dir.path().join("open.md"), "x").unwrap();

      let names: Vec<String> = discover(dir.path(), dir.path())
         .into_iter()
         .map(|n| n.name)
         .collect();
      assert_eq!(names, vec!["open.md"]);
   }

   #[test]
   fn missing_directory_is_empty() {
      let dir = TempDir::new().unwrap();
      assert!(discover(dir.path(), &dir.path().join("absent")).is_empty());
   }
}
