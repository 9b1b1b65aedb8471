//! Remote document naming.
//!
//! The remote knowledge base has no notion of a file path, so every document
//! carries an identifier derived from the file's location, name and
//! modification time. Encoding is a pure function: the same inputs always
//! render the same identifier, which is what lets updates and deletes find
//! the document again without any stored state.

pub mod matcher;

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

pub use self::matcher::{MatchKey, is_same_document, match_key, timestamp_free};

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 150;

/// Used when sanitization leaves nothing behind; the remote rejects empty names.
pub const PLACEHOLDER_NAME: &str = "unnamed-file";

/// Default marker separating a user prefix from the files root.
pub const DEFAULT_FILES_MARKER: &str = "/files/";

const FILE_MARK: &str = "📄";
const DIR_MARK: &str = "📁";
const TIME_MARK: &str = "📅";

/// Identifier layout. See [`IdentifierCodec::encode`] for the exact shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NamingScheme {
   /// `📄name 📁dir 📅YYYY-MM-DD HHMMSS .ext`
   #[default]
   Pattern1,
   /// `📁dir 📄name 📅YYYY-MM-DD HHMMSS .ext`
   Pattern2,
   /// `name (dir) YYYY-MM-DD HHMMSS.ext`
   Pattern3,
   /// `(dir) name YYYY-MM-DD HHMMSS.ext`
   Pattern4,
   /// `📄name📁dir 📅YYYY-MM-DD HHMMSS`
   Improved,
   /// `📅YYYY-MM-DD 📁dir 📄name`
   Emoji,
   /// `dir-stem_YYYY-MM-DD_HHMMSS.ext`
   PathSeparator,
}

impl NamingScheme {
   pub const ALL: [Self; 7] = [
      Self::Pattern1,
      Self::Pattern2,
      Self::Pattern3,
      Self::Pattern4,
      Self::Improved,
      Self::Emoji,
      Self::PathSeparator,
   ];

   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Pattern1 => "pattern1",
         Self::Pattern2 => "pattern2",
         Self::Pattern3 => "pattern3",
         Self::Pattern4 => "pattern4",
         Self::Improved => "improved",
         Self::Emoji => "emoji",
         Self::PathSeparator => "path_separator",
      }
   }

   /// Parses a scheme name. `original` is accepted as an alias of `pattern1`.
   pub fn parse(name: &str) -> Option<Self> {
      match name {
         "original" => Some(Self::Pattern1),
         other => Self::ALL.into_iter().find(|s| s.as_str() == other),
      }
   }

   /// Parses a scheme name, falling back to the default layout for unknown
   /// names so a bad setting never stops synchronization.
   pub fn parse_lenient(name: &str) -> Self {
      Self::parse(name).unwrap_or_else(|| {
         tracing::warn!("unknown naming pattern {name:?}, using {}", Self::default());
         Self::default()
      })
   }

   /// Whether the scheme starts with the file marker, so the file name
   /// segment can be cut out directly.
   pub const fn is_decorated(self) -> bool {
      matches!(self, Self::Pattern1 | Self::Improved)
   }
}

impl fmt::Display for NamingScheme {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

impl From<String> for NamingScheme {
   fn from(value: String) -> Self {
      Self::parse_lenient(&value)
   }
}

impl From<NamingScheme> for String {
   fn from(value: NamingScheme) -> Self {
      value.as_str().to_string()
   }
}

/// Time zone used to render modification times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampZone {
   #[default]
   Utc,
   Local,
}

/// Identifier encoder bound to one configuration snapshot.
#[derive(Debug, Clone)]
pub struct IdentifierCodec<'a> {
   pub scheme: NamingScheme,
   pub marker: &'a str,
   pub zone:   TimestampZone,
}

impl Default for IdentifierCodec<'_> {
   fn default() -> Self {
      Self {
         scheme: NamingScheme::default(),
         marker: DEFAULT_FILES_MARKER,
         zone:   TimestampZone::default(),
      }
   }
}

struct Parts<'a> {
   name:  &'a str,
   stem:  &'a str,
   ext:   &'a str,
   dir:   Option<&'a str>,
   stamp: String,
   date:  String,
   under: String,
}

impl<'a> IdentifierCodec<'a> {
   pub const fn new(scheme: NamingScheme, marker: &'a str, zone: TimestampZone) -> Self {
      Self { scheme, marker, zone }
   }

   /// Renders the sanitized identifier for a file.
   ///
   /// `path` is the full store path (e.g. `/alice/files/reports/q1.md`);
   /// only the part after the files marker contributes a directory. Files
   /// directly under the files root, and paths without the marker, use the
   /// simplified form of each layout.
   pub fn encode(&self, path: &str, file_name: &str, mtime: i64) -> String {
      sanitize(&self.compose(path, file_name, mtime))
   }

   fn compose(&self, path: &str, file_name: &str, mtime: i64) -> String {
      let p = self.parts(path, file_name, mtime);
      let Parts { name, stem, ext, stamp, date, under, .. } = &p;

      match (self.scheme, p.dir) {
         (NamingScheme::Pattern1, Some(dir)) => {
            format!("{FILE_MARK}{name} {DIR_MARK}{dir} {TIME_MARK}{stamp} {ext}")
         },
         (NamingScheme::Pattern2, Some(dir)) => {
            format!("{DIR_MARK}{dir} {FILE_MARK}{name} {TIME_MARK}{stamp} {ext}")
         },
         (NamingScheme::Pattern1 | NamingScheme::Pattern2, None) => {
            format!("{FILE_MARK}{name} {TIME_MARK}{stamp} {ext}")
         },
         (NamingScheme::Pattern3, Some(dir)) => format!("{name} ({dir})  {stamp}{ext}"),
         (NamingScheme::Pattern4, Some(dir)) => format!("({dir}) {name} {stamp}{ext}"),
         (NamingScheme::Pattern3 | NamingScheme::Pattern4, None) => format!("{name} {stamp}{ext}"),
         (NamingScheme::Improved, Some(dir)) => {
            format!("{FILE_MARK}{name}{DIR_MARK}{dir} {TIME_MARK}{stamp}")
         },
         (NamingScheme::Improved, None) => format!("{FILE_MARK}{name} {TIME_MARK}{stamp}"),
         (NamingScheme::Emoji, Some(dir)) => {
            format!("{TIME_MARK}{date} {DIR_MARK}{dir} {FILE_MARK}{name}")
         },
         (NamingScheme::Emoji, None) => format!("{TIME_MARK}{date} {FILE_MARK}{name}"),
         (NamingScheme::PathSeparator, Some(dir)) => format!("{dir}/{stem}_{under}{ext}"),
         (NamingScheme::PathSeparator, None) => format!("{stem}_{under}{ext}"),
      }
   }

   fn parts<'p>(&self, path: &'p str, file_name: &'p str, mtime: i64) -> Parts<'p> {
      let (stem, ext) = split_extension(file_name);
      let dir = relative_portion(path, self.marker).and_then(directory_component);

      let (stamp, date, under) = match self.zone {
         TimestampZone::Utc => render_times(&to_datetime(mtime)),
         TimestampZone::Local => render_times(&to_datetime(mtime).with_timezone(&Local)),
      };

      Parts { name: file_name, stem, ext, dir, stamp, date, under }
   }
}

/// Encodes with the default marker and UTC timestamps.
pub fn encode(path: &str, file_name: &str, mtime: i64, scheme: NamingScheme) -> String {
   IdentifierCodec { scheme, ..IdentifierCodec::default() }.encode(path, file_name, mtime)
}

/// Returns the part of `path` after the first occurrence of `marker`.
pub fn relative_portion<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
   if marker.is_empty() {
      return Some(path);
   }
   path
      .find(marker)
      .map(|idx| &path[idx + marker.len()..])
}

fn directory_component(relative: &str) -> Option<&str> {
   let relative = relative.trim_start_matches('/');
   let (dir, _) = relative.rsplit_once('/')?;
   let dir = dir.trim_matches('/');
   (!dir.is_empty()).then_some(dir)
}

/// Splits `name.ext` into (`name`, `.ext`). Names without a usable extension
/// yield an empty extension.
fn split_extension(file_name: &str) -> (&str, &str) {
   match file_name.rfind('.') {
      Some(idx) if idx + 1 < file_name.len() => file_name.split_at(idx),
      _ => (file_name, ""),
   }
}

fn to_datetime(mtime: i64) -> DateTime<Utc> {
   DateTime::from_timestamp(mtime, 0).unwrap_or_default()
}

fn render_times<Tz>(at: &DateTime<Tz>) -> (String, String, String)
where
   Tz: chrono::TimeZone,
   Tz::Offset: fmt::Display,
{
   (
      at.format("%Y-%m-%d %H%M%S").to_string(),
      at.format("%Y-%m-%d").to_string(),
      at.format("%Y-%m-%d_%H%M%S").to_string(),
   )
}

/// Makes a raw identifier safe for the remote.
///
/// Whitespace runs collapse to one space, `<>:"/\|?*` and control characters
/// become `-`, DEL is dropped, the result is cut to [`MAX_IDENTIFIER_LEN`]
/// bytes on a char boundary and trimmed. Decorative emoji pass through.
pub fn sanitize(raw: &str) -> String {
   let mut out = String::with_capacity(raw.len());
   let mut in_space = false;

   for ch in raw.chars() {
      if ch == '\x7F' {
         continue;
      }
      if ch.is_ascii_whitespace() || ch == '\x0B' {
         if !in_space {
            out.push(' ');
            in_space = true;
         }
         continue;
      }
      in_space = false;

      match ch {
         '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => out.push('-'),
         c if (c as u32) < 0x20 => out.push('-'),
         c => out.push(c),
      }
   }

   if out.len() > MAX_IDENTIFIER_LEN {
      let mut cut = MAX_IDENTIFIER_LEN;
      while !out.is_char_boundary(cut) {
         cut -= 1;
      }
      out.truncate(cut);
   }

   let trimmed = out
      .trim_end_matches(['.', ' '])
      .trim_start_matches(' ');

   if trimmed.is_empty() {
      PLACEHOLDER_NAME.to_string()
   } else {
      trimmed.to_string()
   }
}
