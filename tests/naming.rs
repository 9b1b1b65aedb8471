mod support;

use difysync::naming::{
   self, IdentifierCodec, MAX_IDENTIFIER_LEN, MatchKey, NamingScheme, TimestampZone,
   is_same_document, sanitize,
};
use proptest::prelude::*;
use support::MTIME;

#[test]
fn store_path_renders_pattern1() {
   let id = naming::encode("/alice/files/reports/q1.md", "q1.md", MTIME, NamingScheme::Pattern1);
   assert_eq!(id, "📄q1.md 📁reports 📅2025-09-25 090502 .md");
}

#[test]
fn newer_upload_still_matches_older_name() {
   let old = naming::encode("/alice/files/reports/q1.md", "q1.md", MTIME, NamingScheme::Pattern1);
   let new = naming::encode(
      "/alice/files/reports/q1.md",
      "q1.md",
      MTIME + 3600,
      NamingScheme::Pattern1,
   );
   assert_ne!(old, new);
   assert!(is_same_document(&old, &new));
   assert!(MatchKey::of(&new).same_shape(&old));
}

#[test]
fn every_scheme_matches_across_timestamps() {
   for scheme in NamingScheme::ALL {
      let a = naming::encode("/bob/files/a/b/notes.txt", "notes.txt", MTIME, scheme);
      let b = naming::encode("/bob/files/a/b/notes.txt", "notes.txt", MTIME + 86_400 * 3, scheme);
      assert!(is_same_document(&a, &b), "{scheme}: {a:?} vs {b:?}");

      let other = naming::encode("/bob/files/a/b/other.txt", "other.txt", MTIME, scheme);
      assert!(!is_same_document(&a, &other), "{scheme}: {a:?} vs {other:?}");
   }
}

#[test]
fn custom_marker_sets_directory() {
   let codec = IdentifierCodec::new(NamingScheme::Pattern3, "/data/", TimestampZone::Utc);
   assert_eq!(
      codec.encode("/srv/data/team/plan.md", "plan.md", MTIME),
      "plan.md (team) 2025-09-25 090502.md"
   );
}

#[test]
fn hostile_file_name_is_sanitized() {
   let id = naming::encode("/u/files/x/a<b>:c?.md", "a<b>:c?.md", MTIME, NamingScheme::Pattern4);
   assert!(!id.contains(['<', '>', ':', '?']));
   assert!(id.starts_with("(x) a-b--c-.md"));
}

fn path_strategy() -> impl Strategy<Value = (String, String)> {
   (
      prop::collection::vec("[a-zA-Z0-9 _.-]{1,12}", 0..4),
      "[a-zA-Z0-9 _<>|:-]{1,40}(\\.[a-z]{1,4})?",
   )
      .prop_map(|(dirs, name)| {
         let mut path = String::from("/user/files/");
         for dir in &dirs {
            path.push_str(dir);
            path.push('/');
         }
         path.push_str(&name);
         (path, name)
      })
}

fn scheme_strategy() -> impl Strategy<Value = NamingScheme> {
   prop::sample::select(NamingScheme::ALL.to_vec())
}

proptest! {
   #[test]
   fn encoding_is_deterministic(
      (path, name) in path_strategy(),
      mtime in 0i64..4_102_444_800,
      scheme in scheme_strategy(),
   ) {
      let a = naming::encode(&path, &name, mtime, scheme);
      let b = naming::encode(&path, &name, mtime, scheme);
      prop_assert_eq!(a, b);
   }

   #[test]
   fn identifiers_are_bounded_and_clean(
      (path, name) in path_strategy(),
      mtime in 0i64..4_102_444_800,
      scheme in scheme_strategy(),
   ) {
      let id = naming::encode(&path, &name, mtime, scheme);
      prop_assert!(!id.is_empty());
      prop_assert!(id.len() <= MAX_IDENTIFIER_LEN);
      prop_assert!(!id.contains(['<', '>', ':', '"', '\\', '|', '?', '*']));
      prop_assert!(!id.contains("  "));
   }

   #[test]
   fn sanitize_is_idempotent(raw in "\\PC{0,200}") {
      let once = sanitize(&raw);
      prop_assert_eq!(sanitize(&once), once);
   }
}
