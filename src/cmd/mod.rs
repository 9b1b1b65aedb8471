//! CLI command implementations for difysync.
//!
//! Each module corresponds to one subcommand. Shared wiring (config store,
//! engine construction, response printing) lives here.

pub mod check;
pub mod config;
pub mod docs;
pub mod name;
pub mod scan;
pub mod watch;

use std::{path::PathBuf, sync::Arc};

use crate::{
   Error, Result,
   admin::AdminResponse,
   config::{self as settings, ConfigStore},
   index::DocumentIndex,
   remote::{DifyApi, Endpoint},
   sync::SyncEngine,
};

/// Opens the configuration at `path`, or the default location.
pub fn open_config(path: Option<PathBuf>) -> Arc<ConfigStore> {
   let path = path.unwrap_or_else(|| settings::config_file_path().clone());
   Arc::new(ConfigStore::open(path))
}

/// Engine over the Dify transport. The document index is attached when
/// enabled and the endpoint is configured.
pub fn build_engine(store: Arc<ConfigStore>) -> Result<SyncEngine<DifyApi>> {
   let cfg = store.snapshot();
   let engine = SyncEngine::new(DifyApi::new(cfg.request_timeout())?, store);
   if !cfg.document_cache {
      return Ok(engine);
   }

   let Ok(endpoint) = Endpoint::from_config(&cfg) else {
      return Ok(engine);
   };
   match DocumentIndex::load_for(&endpoint) {
      Ok(index) => Ok(engine.with_index(Arc::new(index))),
      Err(e) => {
         tracing::warn!("document index unavailable, falling back to name matching: {e}");
         Ok(engine)
      },
   }
}

/// Prints `response` as JSON; an error response becomes a reported failure.
pub fn emit(response: &AdminResponse) -> Result<()> {
   println!("{}", serde_json::to_string_pretty(response)?);
   if response.is_success() {
      Ok(())
   } else {
      Err(Error::Reported { message: response.message.clone(), exit_code: response.exit_code() })
   }
}
