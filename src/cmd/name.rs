//! Identifier preview for a store path.

use std::path::PathBuf;

use chrono::Utc;
use console::style;

use crate::{
   Result,
   error::ConfigError,
   naming::{IdentifierCodec, NamingScheme},
   types::file_name_of,
};

pub fn execute(
   config_path: Option<PathBuf>,
   path: &str,
   mtime: Option<i64>,
   pattern: Option<&str>,
) -> Result<()> {
   let cfg = super::open_config(config_path).snapshot();
   let scheme = match pattern {
      Some(name) => {
         NamingScheme::parse(name).ok_or_else(|| ConfigError::UnknownPattern(name.to_string()))?
      },
      None => cfg.naming_pattern,
   };

   let mtime = mtime.unwrap_or_else(|| Utc::now().timestamp());
   let codec = IdentifierCodec::new(scheme, &cfg.files_marker, cfg.time_zone);
   println!("{}", codec.encode(path, file_name_of(path), mtime));

   match cfg.resolver().resolve_store_path(path, &cfg.files_marker) {
      Some(target) => eprintln!(
         "{} {} (mapping {})",
         style("dataset").dim(),
         target.dataset_id,
         target.local_path
      ),
      None => eprintln!("{}", style("not under any mapping").yellow()),
   }
   Ok(())
}
