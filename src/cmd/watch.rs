//! Watch command.
//!
//! Reconciles every mapping once (when enabled), then follows changes under
//! the storage root until Ctrl+C. Edits to the configuration file are
//! picked up without a restart.

use std::{
   ffi::OsStr,
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};

use console::style;
use tokio::{
   signal,
   sync::mpsc,
   time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
   Result, admin,
   file::{ChangeBatch, FileWatcher, watcher},
   sync::{Dispatcher, SyncHandler},
};

/// Quiet period before pending changes are flushed.
const DEBOUNCE: Duration = Duration::from_millis(250);
/// Upper bound on how long a change may wait under a steady event stream.
const MAX_BATCH_DELAY: Duration = Duration::from_secs(2);

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
   let store = super::open_config(config_path);
   let cfg = store.snapshot();
   if !cfg.is_remote_configured() {
      tracing::warn!("dify_url or dify_api_key is empty; events will fail until configured");
   }

   let root = std::fs::canonicalize(&cfg.storage_root)?;
   let engine = Arc::new(super::build_engine(Arc::clone(&store))?);
   let dispatcher = Arc::new(Dispatcher::new(engine, cfg.worker_idle()));
   let cancel = CancellationToken::new();

   let (_files_watcher, mut file_rx) = FileWatcher::new(&root, true)?;
   let (_config_tx, mut config_rx) = mpsc::unbounded_channel::<notify::Event>();
   let config_name = store.path().and_then(Path::file_name).map(OsStr::to_os_string);
   let _config_watcher = match store.path().and_then(Path::parent) {
      Some(dir) => match FileWatcher::new(dir, false) {
         Ok((watcher, rx)) => {
            config_rx = rx;
            Some(watcher)
         },
         Err(e) => {
            tracing::warn!("config file changes will not be picked up: {e}");
            None
         },
      },
      None => None,
   };

   let scan_task = cfg.scan_on_start.then(|| {
      let dispatcher = Arc::clone(&dispatcher);
      let store = Arc::clone(&store);
      let cancel = cancel.clone();
      tokio::spawn(async move {
         let mut progress = ();
         let response = admin::scan(&*dispatcher, &store, None, cancel, &mut progress).await;
         if response.is_success() {
            tracing::info!("startup scan: {}", response.message);
         } else {
            tracing::warn!("startup scan skipped: {}", response.message);
         }
      })
   });

   println!("{} {}", style("Watching").green(), root.display());
   println!("{}", style("Press Ctrl+C to stop").dim());

   let shutdown = signal::ctrl_c();
   tokio::pin!(shutdown);

   let mut batch = ChangeBatch::default();
   let mut first_pending: Option<Instant> = None;
   let mut last_event = Instant::now();

   loop {
      let flush_at = first_pending.map(|first| (last_event + DEBOUNCE).min(first + MAX_BATCH_DELAY));

      tokio::select! {
         _ = &mut shutdown => {
            println!("\n{}", style("Shutting down...").yellow());
            break;
         }
         event = file_rx.recv() => {
            let Some(event) = event else {
               tracing::error!("file watcher stopped");
               break;
            };
            let changes = watcher::classify(&event);
            if changes.is_empty() {
               continue;
            }
            batch.extend(changes);
            last_event = Instant::now();
            first_pending.get_or_insert(last_event);
         }
         Some(event) = config_rx.recv() => {
            let touches_config = config_name
               .as_deref()
               .is_some_and(|name| event.paths.iter().any(|p| p.file_name() == Some(name)));
            if touches_config && !event.kind.is_access() {
               match store.reload() {
                  Ok(true) => tracing::info!("configuration reloaded"),
                  Ok(false) => {},
                  Err(e) => tracing::warn!("keeping previous configuration: {e}"),
               }
            }
         }
         () = time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
            first_pending = None;
            flush(&root, &mut batch, &*dispatcher).await;
         }
      }
   }

   cancel.cancel();
   if let Some(task) = scan_task {
      let _ = task.await;
   }
   flush(&root, &mut batch, &*dispatcher).await;
   dispatcher.close().await;

   println!("{}", style("Stopped").green());
   Ok(())
}

async fn flush<H: SyncHandler + 'static>(
   root: &Path,
   batch: &mut ChangeBatch,
   dispatcher: &Dispatcher<H>,
) {
   for change in batch.drain() {
      if let Some(event) = watcher::to_sync_event(root, change).await {
         tracing::debug!(kind = %event.kind, path = %event.path, "queued");
         dispatcher.dispatch(event);
      }
   }
}
