use std::{io, path::PathBuf};

use thiserror::Error;

/// Main error type for the difysync application.
///
/// Remote failures are split by kind so callers can decide between retrying,
/// treating the failure as a benign miss, and giving up, without inspecting
/// error strings.
#[derive(Debug, Error)]
pub enum Error {
   /// Remote URL or API key is missing. Fatal for the attempted operation.
   #[error("not configured: {0}")]
   NotConfigured(&'static str),

   /// Network failure, timeout, rate limit or 5xx response.
   #[error("remote transient error during {op}: {reason}")]
   RemoteTransient { op: &'static str, reason: String },

   /// The remote object addressed by the request does not exist.
   #[error("remote object not found during {op}: {what}")]
   RemoteNotFound { op: &'static str, what: String },

   /// The remote refused the request (4xx other than 404/408/429).
   #[error("remote rejected {op} with HTTP {status}: {body}")]
   RemoteRejected { op: &'static str, status: u16, body: String },

   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// HTTP client error that is not attributable to the remote service.
   #[error("http error: {0}")]
   Http(#[from] HttpError),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// File watcher error.
   #[error("watch error: {0}")]
   Watch(#[from] notify::Error),

   /// Error already reported to the user (e.g., JSON output emitted).
   #[error("{message}")]
   Reported { message: String, exit_code: i32 },
}

impl Error {
   /// True for failures worth another attempt with backoff.
   pub const fn is_retryable(&self) -> bool {
      matches!(self, Self::RemoteTransient { .. })
   }

   pub const fn is_not_found(&self) -> bool {
      matches!(self, Self::RemoteNotFound { .. })
   }

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Reported { exit_code, .. } => *exit_code,
         Self::NotConfigured(_) | Self::Config(_) => 2,
         Self::RemoteTransient { .. } => 11,
         Self::RemoteRejected { .. } | Self::RemoteNotFound { .. } => 12,
         _ => 1,
      }
   }
}

/// Errors that can occur while loading or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Figment could not merge or extract the layered configuration.
   #[error("failed to load {path}: {reason}")]
   Load {
      path:   PathBuf,
      #[source]
      reason: Box<figment::Error>,
   },

   /// Failed to render the configuration as TOML.
   #[error("failed to serialize config: {0}")]
   Serialize(#[from] toml::ser::Error),

   /// Naming pattern outside the supported set.
   #[error("unknown naming pattern {0:?}")]
   UnknownPattern(String),

   /// `--map` argument not in `PATH=DATASET` form.
   #[error("invalid mapping argument {0:?}, expected PATH=DATASET")]
   MappingArgument(String),
}

/// Errors that can occur during HTTP operations.
#[derive(Debug, Error)]
pub enum HttpError {
   /// HTTP client could not be built or the request could not be formed.
   #[error("request failed: {0}")]
   Request(#[from] reqwest::Error),

   /// Received a body the client could not interpret.
   #[error("unexpected response during {op}: {reason}")]
   Decode { op: &'static str, reason: String },
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
