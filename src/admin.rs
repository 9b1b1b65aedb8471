//! Administrative operations: settings read/write and on-demand scans.
//!
//! Every operation answers with an [`AdminResponse`] instead of an error so
//! callers can print it as-is.

use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{
   config::ConfigStore,
   error::ConfigError,
   mapping::DirectoryMapping,
   naming::NamingScheme,
   scan::{ScanProgressCallback, ScanReport, Scanner},
   sync::SyncHandler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
   Success,
   Error,
}

/// Structured answer of an administrative operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminResponse {
   pub status:  Status,
   pub message: String,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub data:    Option<Value>,
}

impl AdminResponse {
   pub fn success(message: impl Into<String>, data: Value) -> Self {
      Self { status: Status::Success, message: message.into(), data: Some(data) }
   }

   pub fn error(message: impl Into<String>) -> Self {
      Self { status: Status::Error, message: message.into(), data: None }
   }

   pub fn is_success(&self) -> bool {
      self.status == Status::Success
   }

   pub const fn exit_code(&self) -> i32 {
      match self.status {
         Status::Success => 0,
         Status::Error => 1,
      }
   }
}

/// Partial settings update. `None` leaves a value unchanged.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
   pub dify_url:       Option<String>,
   pub dify_api_key:   Option<String>,
   pub naming_pattern: Option<String>,
   /// Replaces the mapping table when set.
   pub mappings:       Option<Vec<DirectoryMapping>>,
}

/// Parses a `PATH=DATASET` mapping argument.
pub fn parse_mapping_arg(arg: &str) -> Result<DirectoryMapping, ConfigError> {
   let (path, dataset) = arg
      .split_once('=')
      .ok_or_else(|| ConfigError::MappingArgument(arg.to_string()))?;
   let mapping = DirectoryMapping::new(path.trim(), dataset.trim());
   if mapping.is_usable() {
      Ok(mapping)
   } else {
      Err(ConfigError::MappingArgument(arg.to_string()))
   }
}

/// Current settings. The API key is masked to its last four characters.
pub fn get_settings(store: &ConfigStore) -> AdminResponse {
   let cfg = store.snapshot();
   let patterns: Vec<&str> = NamingScheme::ALL.iter().map(|s| s.as_str()).collect();
   AdminResponse::success(
      "ok",
      json!({
         "dify_url": cfg.dify_url,
         "dify_api_key": mask_key(&cfg.dify_api_key),
         "naming_pattern": cfg.naming_pattern,
         "directory_mappings": cfg.mappings,
         "naming_patterns": patterns,
         "config_path": store.path(),
      }),
   )
}

/// Applies `update`, drops incomplete mappings and persists the result.
/// Syncs started afterwards see the new values.
pub fn save_settings(store: &ConfigStore, update: SettingsUpdate) -> AdminResponse {
   let mut cfg = (*store.snapshot()).clone();

   if let Some(url) = update.dify_url {
      cfg.dify_url = url.trim().to_string();
   }
   if let Some(key) = update.dify_api_key {
      cfg.dify_api_key = key.trim().to_string();
   }
   if let Some(name) = update.naming_pattern {
      match NamingScheme::parse(name.trim()) {
         Some(scheme) => cfg.naming_pattern = scheme,
         None => return AdminResponse::error(ConfigError::UnknownPattern(name).to_string()),
      }
   }
   if let Some(mappings) = update.mappings {
      cfg.mappings = mappings;
   }
   cfg.drop_unusable_mappings();
   let mappings_count = cfg.mappings.len();

   match store.save(cfg) {
      Ok(()) => {
         tracing::info!(mappings = mappings_count, "configuration saved");
         AdminResponse::success("configuration saved", json!({ "mappings_count": mappings_count }))
      },
      Err(e) => {
         tracing::error!("failed to save configuration: {e}");
         AdminResponse::error(e.to_string())
      },
   }
}

/// Reconciles every mapping, or the one whose local path is `only`.
pub async fn scan<H: SyncHandler + ?Sized>(
   handler: &H,
   store: &ConfigStore,
   only: Option<&str>,
   cancel: CancellationToken,
   progress: &mut dyn ScanProgressCallback,
) -> AdminResponse {
   let cfg = store.snapshot();
   if !cfg.is_remote_configured() {
      return AdminResponse::error("dify_url and dify_api_key must be configured");
   }
   if cfg.mappings.is_empty() {
      return AdminResponse::error("no directory mappings configured");
   }

   let scanner = Scanner::new(handler, &cfg.storage_root).with_cancel(cancel);
   let results = match scanner.scan_all(&cfg, only, progress).await {
      Ok(results) => results,
      Err(e) => {
         tracing::error!("scan failed: {e}");
         return AdminResponse::error(e.to_string());
      },
   };
   if let (Some(path), true) = (only, results.is_empty()) {
      return AdminResponse::error(format!("no scannable mapping for {path:?}"));
   }

   let mut totals = ScanReport::default();
   for result in &results {
      totals.merge(&result.report);
   }
   let message = if totals.cancelled { "scan cancelled" } else { "scan finished" };
   AdminResponse::success(message, json!({ "totals": totals, "mappings": results }))
}

fn mask_key(key: &str) -> String {
   if key.is_empty() {
      return String::new();
   }
   let chars: Vec<char> = key.chars().collect();
   if chars.len() <= 4 {
      return "****".to_string();
   }
   let tail: String = chars[chars.len() - 4..].iter().collect();
   format!("****{tail}")
}
