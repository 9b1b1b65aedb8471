//! Timestamp-tolerant identifier matching.
//!
//! Updates and deletes have to find a document uploaded under an older
//! modification time, so names are compared on a key with the time
//! component removed.

use std::sync::LazyLock;

use regex::Regex;

static STAMP_RE: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"(?:📅|[ _])?\d{4}-\d{2}-\d{2}[ _]\d{6}").unwrap());

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"📅\d{4}-\d{2}-\d{2}").unwrap());

static LEGACY_RE: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"_\d{8}-\d{6}(\.[^./ ]*)?$").unwrap());

/// Returns the comparison key of a document name.
///
/// Names starting with the file marker compare on the file name segment
/// only (text between the marker and the first directory or time marker).
/// Other names compare with every timestamp token removed.
pub fn match_key(name: &str) -> String {
   if let Some(rest) = name.strip_prefix('📄') {
      let end = rest.find(['📁', '📅']).unwrap_or(rest.len());
      return rest[..end].trim().to_string();
   }
   timestamp_free(name)
}

/// Removes timestamp tokens and normalizes spacing.
pub fn timestamp_free(name: &str) -> String {
   let stripped = LEGACY_RE.replace(name, "$1");
   let stripped = STAMP_RE.replace_all(&stripped, "");
   let stripped = DATE_RE.replace_all(&stripped, "");
   stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Exact equality of the timestamp-free keys.
pub fn is_same_document(a: &str, b: &str) -> bool {
   match_key(a) == match_key(b)
}

/// Precomputed keys for one local identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
   /// Primary key; equality decides a match.
   pub key:   String,
   /// Full name without timestamps, used to rank several matches.
   pub shape: String,
}

impl MatchKey {
   pub fn of(identifier: &str) -> Self {
      Self { key: match_key(identifier), shape: timestamp_free(identifier) }
   }

   pub fn matches(&self, remote_name: &str) -> bool {
      match_key(remote_name) == self.key
   }

   pub fn same_shape(&self, remote_name: &str) -> bool {
      timestamp_free(remote_name) == self.shape
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn decorated_compares_file_segment() {
      assert_eq!(match_key("📄q1.md 📁reports 📅2025-09-25 090502 .md"), "q1.md");
      assert_eq!(match_key("📄q1.md📁reports 📅2025-09-25 090502"), "q1.md");
      assert_eq!(match_key("📄q1.md 📅2025-09-25 090502 .md"), "q1.md");
      assert!(is_same_document(
         "📄q1.md 📁reports 📅2025-09-25 090502 .md",
         "📄q1.md 📁reports 📅2024-01-01 000000 .md"
      ));
   }

   #[test]
   fn legacy_suffix_is_stripped() {
      assert_eq!(match_key("report_20240101-120000.pdf"), "report.pdf");
      assert_eq!(match_key("report_20240101-120000"), "report");
      assert!(is_same_document("report_20240101-120000.pdf", "report_20250202-000001.pdf"));
   }

   #[test]
   fn undecorated_layouts_strip_timestamps() {
      assert_eq!(match_key("q1.md (reports) 2025-09-25 090502.md"), "q1.md (reports).md");
      assert_eq!(match_key("(reports) q1.md 2025-09-25 090502.md"), "(reports) q1.md.md");
      assert_eq!(match_key("reports-q1_2025-09-25_090502.md"), "reports-q1.md");
      assert_eq!(match_key("📁reports 📄q1.md 📅2025-09-25 090502 .md"), "📁reports 📄q1.md .md");
      assert_eq!(match_key("📅2025-09-25 📁reports 📄q1.md"), "📁reports 📄q1.md");
   }

   #[test]
   fn different_files_do_not_match() {
      assert!(!is_same_document(
         "📄q1.md 📁reports 📅2025-09-25 090502 .md",
         "📄q2.md 📁reports 📅2025-09-25 090502 .md"
      ));
      assert!(!is_same_document("a_20240101-120000.txt", "b_20240101-120000.txt"));
      assert!(!is_same_document("plain.txt", "plain.md"));
   }

   #[test]
   fn shape_keeps_directory() {
      let key = MatchKey::of("📄q1.md 📁reports 📅2025-09-25 090502 .md");
      assert!(key.matches("📄q1.md 📁archive 📅2020-01-01 000000 .md"));
      assert!(!key.same_shape("📄q1.md 📁archive 📅2020-01-01 000000 .md"));
      assert!(key.same_shape("📄q1.md 📁reports 📅2020-01-01 000000 .md"));
   }
}
