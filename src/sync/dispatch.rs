//! Per-path event serialization.
//!
//! Each store path gets its own FIFO worker so events for one path are
//! applied in submission order while unrelated paths proceed in parallel.
//! Workers retire after sitting idle, so the worker table only holds
//! paths with recent activity.

use std::{
   collections::HashMap,
   sync::{
      Arc,
      atomic::{AtomicU64, Ordering},
   },
   time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
   sync::{mpsc, oneshot},
   time,
};
use tokio_util::task::TaskTracker;

use super::SyncHandler;
use crate::types::{SyncEvent, SyncOutcome};

struct Job {
   event: SyncEvent,
   reply: Option<oneshot::Sender<SyncOutcome>>,
}

struct Slot {
   worker: u64,
   tx:     mpsc::UnboundedSender<Job>,
}

type Queues = Arc<Mutex<HashMap<String, Slot>>>;

pub struct Dispatcher<H> {
   handler: Arc<H>,
   queues:  Queues,
   idle:    Duration,
   tracker: TaskTracker,
   spawned: AtomicU64,
}

impl<H: SyncHandler + 'static> Dispatcher<H> {
   pub fn new(handler: Arc<H>, idle: Duration) -> Self {
      Self {
         handler,
         queues: Arc::default(),
         idle,
         tracker: TaskTracker::new(),
         spawned: AtomicU64::new(0),
      }
   }

   pub const fn handler(&self) -> &Arc<H> {
      &self.handler
   }

   /// Queues `event` behind any pending events for the same path. The
   /// receiver yields the outcome once the event has been applied.
   pub fn submit(&self, event: SyncEvent) -> oneshot::Receiver<SyncOutcome> {
      let (tx, rx) = oneshot::channel();
      self.enqueue(Job { event, reply: Some(tx) });
      rx
   }

   /// Queues `event` without waiting for its outcome.
   pub fn dispatch(&self, event: SyncEvent) {
      self.enqueue(Job { event, reply: None });
   }

   /// Paths that currently own a worker.
   pub fn active_workers(&self) -> usize {
      self.queues.lock().len()
   }

   /// Stops accepting work, waits for queued events to drain, then
   /// flushes the handler.
   pub async fn close(&self) {
      self.queues.lock().clear();
      self.tracker.close();
      self.tracker.wait().await;
      self.handler.flush().await;
   }

   fn enqueue(&self, job: Job) {
      let key = job.event.path.clone();
      let mut queues = self.queues.lock();

      let job = match queues.get(&key) {
         Some(slot) => match slot.tx.send(job) {
            Ok(()) => return,
            Err(mpsc::error::SendError(job)) => job,
         },
         None => job,
      };

      let (tx, rx) = mpsc::unbounded_channel();
      if tx.send(job).is_err() {
         return;
      }
      let id = self.spawned.fetch_add(1, Ordering::Relaxed);
      queues.insert(key.clone(), Slot { worker: id, tx });
      drop(queues);

      tracing::trace!(path = key, "starting worker");
      self.tracker.spawn(worker(
         key,
         id,
         rx,
         Arc::clone(&self.handler),
         Arc::clone(&self.queues),
         self.idle,
      ));
   }
}

async fn worker<H: SyncHandler>(
   key: String,
   id: u64,
   mut rx: mpsc::UnboundedReceiver<Job>,
   handler: Arc<H>,
   queues: Queues,
   idle: Duration,
) {
   loop {
      let job = match time::timeout(idle, rx.recv()).await {
         Ok(Some(job)) => job,
         Ok(None) => break,
         Err(_) => {
            // Retire under the table lock so no submitter can slip a job
            // into a queue nobody drains.
            let next = {
               let mut queues = queues.lock();
               match rx.try_recv() {
                  Ok(job) => Some(job),
                  Err(_) => {
                     if queues.get(&key).is_some_and(|slot| slot.worker == id) {
                        queues.remove(&key);
                     }
                     None
                  },
               }
            };
            match next {
               Some(job) => job,
               None => break,
            }
         },
      };

      let outcome = handler.handle(job.event).await;
      if let Some(reply) = job.reply {
         let _ = reply.send(outcome);
      }
   }
   tracing::trace!(path = key, "worker retired");
}

#[async_trait]
impl<H: SyncHandler + 'static> SyncHandler for Dispatcher<H> {
   /// Routes through the path's queue and waits for the outcome.
   async fn handle(&self, event: SyncEvent) -> SyncOutcome {
      self
         .submit(event)
         .await
         .unwrap_or_else(|_| SyncOutcome::Failed { reason: "dispatcher closed".to_string() })
   }

   async fn flush(&self) {
      self.handler.flush().await;
   }
}
