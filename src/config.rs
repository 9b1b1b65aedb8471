//! Configuration management for remote credentials, mappings and sync tuning.
//!
//! Layering follows defaults, then the TOML file, then `DIFYSYNC_*`
//! environment variables. Readers take an [`Arc`] snapshot once per
//! operation; writers swap the whole value, so an in-flight sync never sees
//! a half-updated mapping table.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::{Arc, OnceLock},
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
   error::{ConfigError, Result},
   mapping::{DirectoryMapping, MappingResolver},
   naming::{DEFAULT_FILES_MARKER, IdentifierCodec, NamingScheme, TimestampZone},
};

/// Page size ceiling accepted by the remote list endpoint.
pub const MAX_LIST_LIMIT: u32 = 100;
/// Upload size accepted by a stock Dify deployment.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 15 * 1024 * 1024;

const ENV_PREFIX: &str = "DIFYSYNC_";

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub dify_url:       String,
   pub dify_api_key:   String,
   pub naming_pattern: NamingScheme,

   /// Local directory acting as the file store's data directory.
   pub storage_root: PathBuf,
   pub files_marker: String,
   pub time_zone:    TimestampZone,

   pub max_retries:         u32,
   pub retry_base_ms:       u64,
   pub request_timeout_ms:  u64,
   pub list_page_limit:     u32,
   pub max_file_size_bytes: u64,
   pub indexing_technique:  String,
   pub process_mode:        String,

   pub scan_on_start:  bool,
   pub document_cache: bool,
   pub worker_idle_ms: u64,

   /// Kept last so TOML output lists plain keys before the tables.
   pub mappings: Vec<DirectoryMapping>,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         dify_url:            String::new(),
         dify_api_key:        String::new(),
         naming_pattern:      NamingScheme::default(),
         storage_root:        PathBuf::from("."),
         files_marker:        DEFAULT_FILES_MARKER.to_string(),
         time_zone:           TimestampZone::default(),
         max_retries:         3,
         retry_base_ms:       1000,
         request_timeout_ms:  30_000,
         list_page_limit:     MAX_LIST_LIMIT,
         max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
         indexing_technique:  "high_quality".to_string(),
         process_mode:        "automatic".to_string(),
         scan_on_start:       true,
         document_cache:      true,
         worker_idle_ms:      5000,
         mappings:            Vec::new(),
      }
   }
}

impl Config {
   /// Loads the layered configuration, falling back to defaults when the
   /// file cannot be parsed.
   pub fn load(path: &Path) -> Self {
      Self::load_from(path)
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   pub fn load_from(path: &Path) -> Result<Self> {
      let mut cfg: Self = Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed(ENV_PREFIX).lowercase(true))
         .extract()
         .map_err(|e| ConfigError::Load { path: path.to_path_buf(), reason: Box::new(e) })?;
      cfg.drop_unusable_mappings();
      Ok(cfg)
   }

   pub fn from_toml(text: &str) -> Result<Self> {
      let mut cfg: Self = Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::string(text))
         .extract()
         .map_err(|e| ConfigError::Load { path: PathBuf::new(), reason: Box::new(e) })?;
      cfg.drop_unusable_mappings();
      Ok(cfg)
   }

   pub fn to_toml(&self) -> Result<String> {
      Ok(toml::to_string_pretty(self).map_err(ConfigError::Serialize)?)
   }

   /// Removes mappings with an empty path or dataset.
   pub fn drop_unusable_mappings(&mut self) {
      self.mappings.retain(|m| {
         let usable = m.is_usable();
         if !usable {
            tracing::warn!("ignoring incomplete mapping {:?} -> {:?}", m.local_path, m.dataset_id);
         }
         usable
      });
   }

   pub fn is_remote_configured(&self) -> bool {
      !self.dify_url.trim().is_empty() && !self.dify_api_key.trim().is_empty()
   }

   pub fn codec(&self) -> IdentifierCodec<'_> {
      IdentifierCodec::new(self.naming_pattern, &self.files_marker, self.time_zone)
   }

   pub fn resolver(&self) -> MappingResolver {
      MappingResolver::new(&self.mappings, &self.files_marker)
   }

   pub fn effective_list_limit(&self) -> u32 {
      self.list_page_limit.clamp(1, MAX_LIST_LIMIT)
   }

   pub fn effective_max_retries(&self) -> u32 {
      self.max_retries.max(1)
   }

   pub const fn retry_base(&self) -> Duration {
      Duration::from_millis(self.retry_base_ms)
   }

   pub const fn request_timeout(&self) -> Duration {
      Duration::from_millis(self.request_timeout_ms)
   }

   pub const fn worker_idle(&self) -> Duration {
      Duration::from_millis(self.worker_idle_ms)
   }
}

/// Shared, swappable configuration.
#[derive(Debug)]
pub struct ConfigStore {
   path:    Option<PathBuf>,
   current: RwLock<Arc<Config>>,
}

impl ConfigStore {
   /// Opens the store backed by `path`, creating a default file if missing.
   pub fn open(path: impl Into<PathBuf>) -> Self {
      let path = path.into();
      ensure_config_file(&path);
      let cfg = Config::load(&path);
      Self { path: Some(path), current: RwLock::new(Arc::new(cfg)) }
   }

   /// Store with no file behind it; saves only swap the in-memory value.
   pub fn in_memory(cfg: Config) -> Self {
      Self { path: None, current: RwLock::new(Arc::new(cfg)) }
   }

   pub fn path(&self) -> Option<&Path> {
      self.path.as_deref()
   }

   /// One consistent view of the configuration.
   pub fn snapshot(&self) -> Arc<Config> {
      Arc::clone(&self.current.read())
   }

   pub fn replace(&self, cfg: Config) {
      *self.current.write() = Arc::new(cfg);
   }

   /// Persists `cfg` and makes it current.
   pub fn save(&self, mut cfg: Config) -> Result<()> {
      cfg.drop_unusable_mappings();
      if let Some(path) = &self.path {
         write_atomic(path, &cfg.to_toml()?)?;
      }
      self.replace(cfg);
      Ok(())
   }

   /// Re-reads the backing file. Returns whether the value changed. A file
   /// that fails to parse leaves the current value in place.
   pub fn reload(&self) -> Result<bool> {
      let Some(path) = &self.path else {
         return Ok(false);
      };
      let fresh = Config::load_from(path)?;
      let changed = *self.snapshot() != fresh;
      if changed {
         self.replace(fresh);
      }
      Ok(changed)
   }
}

pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
   }
   let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
   fs::write(&tmp, content)?;
   if let Err(e) = fs::rename(&tmp, path) {
      let _ = fs::remove_file(&tmp);
      return Err(e.into());
   }
   Ok(())
}

fn ensure_config_file(path: &Path) {
   if path.exists() {
      return;
   }
   if let Some(parent) = path.parent() {
      let _ = fs::create_dir_all(parent);
   }
   if let Ok(toml) = Config::default().to_toml() {
      let _ = fs::write(path, toml);
   }
}

/// Returns the base directory for difysync data and configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".difysync"))
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

macro_rules! define_paths {
   ($($fn_name:ident: $path:literal),* $(,)?) => {
      $(
         pub fn $fn_name() -> &'static PathBuf {
            static ONCE: OnceLock<PathBuf> = OnceLock::new();
            ONCE.get_or_init(|| base_dir().join($path))
         }
      )*
   };
}

define_paths! {
   config_file_path: "config.toml",
   data_dir: "data",
}
