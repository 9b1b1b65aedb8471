//! Config get/save commands.

use std::path::PathBuf;

use crate::{
   Result,
   admin::{self, SettingsUpdate},
};

/// Arguments of `config save`.
#[derive(Debug, Default)]
pub struct SaveArgs {
   pub url:            Option<String>,
   pub api_key:        Option<String>,
   pub pattern:        Option<String>,
   /// `PATH=DATASET` pairs added to (or replacing) existing mappings.
   pub map:            Vec<String>,
   pub clear_mappings: bool,
}

pub fn get(config_path: Option<PathBuf>) -> Result<()> {
   let store = super::open_config(config_path);
   super::emit(&admin::get_settings(&store))
}

pub fn save(config_path: Option<PathBuf>, args: SaveArgs) -> Result<()> {
   let store = super::open_config(config_path);

   let mappings = if args.clear_mappings || !args.map.is_empty() {
      let mut mappings = if args.clear_mappings {
         Vec::new()
      } else {
         store.snapshot().mappings.clone()
      };
      for arg in &args.map {
         let mapping = match admin::parse_mapping_arg(arg) {
            Ok(mapping) => mapping,
            Err(e) => return super::emit(&admin::AdminResponse::error(e.to_string())),
         };
         mappings.retain(|m| m.local_path != mapping.local_path);
         mappings.push(mapping);
      }
      Some(mappings)
   } else {
      None
   };

   let update = SettingsUpdate {
      dify_url: args.url,
      dify_api_key: args.api_key,
      naming_pattern: args.pattern,
      mappings,
   };
   super::emit(&admin::save_settings(&store, update))
}
