//! On-demand reconciliation of one or all mappings.

use std::{path::PathBuf, sync::Arc};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{Result, admin};

pub async fn execute(config_path: Option<PathBuf>, mapping: Option<String>, quiet: bool) -> Result<()> {
   let store = super::open_config(config_path);
   let engine = super::build_engine(Arc::clone(&store))?;

   let cancel = CancellationToken::new();
   let on_interrupt = cancel.clone();
   tokio::spawn(async move {
      if signal::ctrl_c().await.is_ok() {
         tracing::warn!("interrupt received, stopping after the current file");
         on_interrupt.cancel();
      }
   });

   let response = if quiet {
      admin::scan(&engine, &store, mapping.as_deref(), cancel, &mut ()).await
   } else {
      let mut pb = ProgressBar::new(0);
      pb.set_style(
         ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("█▓░"),
      );
      pb.set_message("...");
      let response = admin::scan(&engine, &store, mapping.as_deref(), cancel, &mut pb).await;
      pb.finish_and_clear();
      response
   };

   super::emit(&response)
}
