//! Message queue and worker pool.
//!
//! Messages travel over a bounded queue to `workers` consumer tasks, each
//! running [`EntityIndexer::handle`] on the blocking thread pool. Sweeps are
//! produced by [`IndexingDispatcher::sweep`], which calls `iterate` and
//! enqueues batch after batch.
//!
//! Delivery is at least once. A failing message is delivered again up to
//! `max_redeliveries` times and then dead-lettered. Because workers finish
//! sweep batches out of order, the sweep checkpoint only moves past a batch
//! once it and every batch before it were handled; a restart after a crash
//! or a dead letter repeats work instead of skipping it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use media_indexing::{
    EntityIndexer, EntityIndexingMessage, IndexCheckpoint, IndexerOffset, IndexingError,
};
use media_storage::Storage;

use crate::config::DispatcherConfig;
use crate::indexers::IndexerRegistry;
use crate::SchedulerError;

/// Completion report of one sweep batch.
struct Completion {
    seq: u64,
    handled: bool,
}

/// Routes the outcome of a sweep batch back to its producer.
struct Ticket {
    seq: u64,
    reply: mpsc::UnboundedSender<Completion>,
}

struct Delivery {
    message: EntityIndexingMessage,
    ticket: Option<Ticket>,
}

/// Producer side of the queue, cheap to clone.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<Delivery>,
    counters: Arc<Counters>,
}

impl DispatchQueue {
    /// Enqueue an incremental message, waiting while the queue is full.
    pub async fn enqueue(&self, message: EntityIndexingMessage) -> Result<(), SchedulerError> {
        self.send(Delivery {
            message,
            ticket: None,
        })
        .await
    }

    /// Cancel safe: nothing is enqueued or counted unless a slot was reserved.
    async fn send(&self, delivery: Delivery) -> Result<(), SchedulerError> {
        let permit = self
            .sender
            .reserve()
            .await
            .map_err(|_| SchedulerError::QueueClosed)?;
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        permit.send(delivery);
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    handled: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
    /// Messages enqueued and not yet handled or dead-lettered
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Counters {
    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            handled: self.handled.load(Ordering::SeqCst),
            redelivered: self.redelivered.load(Ordering::SeqCst),
            dead_lettered: self.dead_lettered.load(Ordering::SeqCst),
        }
    }
}

/// Lifetime totals of a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub handled: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub indexer: String,
    /// Batches enqueued by this run
    pub batches: usize,
    /// Ids of batches that were handled
    pub processed: u64,
    /// Batches that failed every delivery
    pub dead_lettered: usize,
    /// Started from a stored checkpoint
    pub resumed: bool,
    /// Every batch was handled and the checkpoint was cleared
    pub completed: bool,
    pub cancelled: bool,
}

impl SweepSummary {
    fn new(indexer: &str) -> Self {
        Self {
            indexer: indexer.to_string(),
            ..Default::default()
        }
    }
}

struct PendingBatch {
    offset: Option<IndexerOffset>,
    ids: usize,
    handled: Option<bool>,
}

/// Tracks in-flight sweep batches and the offset that is safe to persist.
#[derive(Default)]
struct Watermark {
    next_seq: u64,
    pending: BTreeMap<u64, PendingBatch>,
}

/// Contiguous batches that became safe to checkpoint.
struct Advance {
    offset: Option<IndexerOffset>,
    ids: u64,
}

impl Watermark {
    fn push(&mut self, offset: Option<IndexerOffset>, ids: usize) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            seq,
            PendingBatch {
                offset,
                ids,
                handled: None,
            },
        );
        seq
    }

    /// Forget a batch that never reached the queue.
    fn discard(&mut self, seq: u64) {
        self.pending.remove(&seq);
    }

    fn complete(&mut self, seq: u64, handled: bool) -> Option<Advance> {
        if let Some(batch) = self.pending.get_mut(&seq) {
            batch.handled = Some(handled);
        }

        let mut advance: Option<Advance> = None;
        // A dead-lettered batch stays at the head and blocks the watermark
        while let Some(entry) = self.pending.first_entry() {
            if entry.get().handled != Some(true) {
                break;
            }
            let batch = entry.remove();
            let step = advance.get_or_insert(Advance {
                offset: None,
                ids: 0,
            });
            step.offset = batch.offset;
            step.ids += batch.ids as u64;
        }
        advance
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Bounded queue plus a pool of consumer tasks.
pub struct IndexingDispatcher {
    storage: Arc<Storage>,
    indexers: Arc<IndexerRegistry>,
    config: DispatcherConfig,
    queue: DispatchQueue,
    counters: Arc<Counters>,
    stop: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    /// One sweep per indexer at a time
    sweep_locks: BTreeMap<String, Mutex<()>>,
}

impl IndexingDispatcher {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(storage: Arc<Storage>, indexers: IndexerRegistry, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let sweep_locks = indexers
            .names()
            .into_iter()
            .map(|name| (name.to_string(), Mutex::new(())))
            .collect();
        let indexers = Arc::new(indexers);
        let counters = Arc::new(Counters::default());
        let stop = CancellationToken::new();

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    receiver.clone(),
                    indexers.clone(),
                    config.clone(),
                    counters.clone(),
                    stop.clone(),
                ))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            indexers = ?indexers.names(),
            "Dispatcher started"
        );

        Self {
            storage,
            indexers,
            config,
            queue: DispatchQueue {
                sender,
                counters: counters.clone(),
            },
            counters,
            stop,
            workers: std::sync::Mutex::new(workers),
            sweep_locks,
        }
    }

    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    pub fn indexers(&self) -> &IndexerRegistry {
        &self.indexers
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn enqueue(&self, message: EntityIndexingMessage) -> Result<(), SchedulerError> {
        self.queue.enqueue(message).await
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Messages enqueued and not yet handled or dead-lettered.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every enqueued message was handled or dead-lettered.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Run one full sweep of `name`, resuming from its checkpoint.
    ///
    /// A sweep of an indexer that is already being swept waits for the
    /// running one to finish and then starts over. Returns once every enqueued batch was handled or dead-lettered. On
    /// cancellation no further batches are produced, in-flight ones are
    /// awaited and the checkpoint keeps the last safe offset.
    pub async fn sweep(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<SweepSummary, SchedulerError> {
        let indexer = self.indexers.get(name)?;
        let Some(lock) = self.sweep_locks.get(name) else {
            return Err(SchedulerError::UnknownIndexer(name.to_string()));
        };
        let _running = lock.lock().await;
        let mut summary = SweepSummary::new(name);

        let stored = {
            let storage = self.storage.clone();
            let indexer_name = name.to_string();
            blocking(move || IndexCheckpoint::load(&storage, &indexer_name)).await?
        };
        summary.resumed = stored.as_ref().is_some_and(|c| c.offset.is_some());
        let mut checkpoint = stored.unwrap_or_else(|| IndexCheckpoint::new(name));
        let mut offset = checkpoint.offset.clone();

        info!(indexer = %name, resumed = summary.resumed, "Sweep started");

        let (reply, mut completions) = mpsc::unbounded_channel();
        let mut watermark = Watermark::default();
        let mut sent = 0usize;
        let mut received = 0usize;

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let message = {
                let indexer = indexer.clone();
                let from = offset.clone();
                blocking(move || indexer.iterate(from)).await?
            };
            let Some(message) = message else {
                break;
            };

            let next = message.offset().cloned();
            let seq = watermark.push(next.clone(), message.ids().len());
            let delivery = Delivery {
                message,
                ticket: Some(Ticket {
                    seq,
                    reply: reply.clone(),
                }),
            };

            tokio::select! {
                result = self.queue.send(delivery) => result?,
                _ = cancel.cancelled() => {
                    watermark.discard(seq);
                    summary.cancelled = true;
                    break;
                }
            }
            sent += 1;
            summary.batches += 1;

            while let Ok(completion) = completions.try_recv() {
                received += 1;
                self.record(completion, &mut watermark, &mut checkpoint, &mut summary)
                    .await?;
            }

            if next.is_none() {
                warn!(indexer = %name, "Sweep batch without offset, stopping");
                break;
            }
            offset = next;
        }
        drop(reply);

        while received < sent {
            let Some(completion) = completions.recv().await else {
                break;
            };
            received += 1;
            self.record(completion, &mut watermark, &mut checkpoint, &mut summary)
                .await?;
        }

        summary.completed = !summary.cancelled
            && summary.dead_lettered == 0
            && received == sent
            && watermark.is_drained();
        if summary.completed {
            let storage = self.storage.clone();
            let indexer_name = name.to_string();
            blocking(move || IndexCheckpoint::clear(&storage, &indexer_name)).await?;
        }

        info!(
            indexer = %name,
            batches = summary.batches,
            processed = summary.processed,
            dead_lettered = summary.dead_lettered,
            completed = summary.completed,
            cancelled = summary.cancelled,
            "Sweep finished"
        );
        Ok(summary)
    }

    /// Sweep every registered indexer in name order.
    pub async fn sweep_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<SweepSummary>, SchedulerError> {
        let names: Vec<String> = self.indexers.names().into_iter().map(String::from).collect();
        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            if cancel.is_cancelled() {
                break;
            }
            summaries.push(self.sweep(&name, cancel).await?);
        }
        Ok(summaries)
    }

    /// Let the workers drain the queue, then wait for them to exit.
    ///
    /// Stop every producer holding a [`DispatchQueue`] first; messages
    /// enqueued after the queue ran dry are dropped.
    pub async fn shutdown(&self) -> DispatchStats {
        self.stop.cancel();
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker task failed");
            }
        }
        let stats = self.counters.snapshot();
        info!(
            handled = stats.handled,
            redelivered = stats.redelivered,
            dead_lettered = stats.dead_lettered,
            "Dispatcher stopped"
        );
        stats
    }

    async fn record(
        &self,
        completion: Completion,
        watermark: &mut Watermark,
        checkpoint: &mut IndexCheckpoint,
        summary: &mut SweepSummary,
    ) -> Result<(), SchedulerError> {
        if !completion.handled {
            summary.dead_lettered += 1;
        }
        let Some(advance) = watermark.complete(completion.seq, completion.handled) else {
            return Ok(());
        };

        summary.processed += advance.ids;
        checkpoint.update(advance.offset, advance.ids);
        let storage = self.storage.clone();
        let snapshot = checkpoint.clone();
        blocking(move || snapshot.save(&storage)).await?;
        debug!(
            indexer = %checkpoint.indexer,
            processed = checkpoint.processed_count,
            "Checkpoint advanced"
        );
        Ok(())
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    indexers: Arc<IndexerRegistry>,
    config: DispatcherConfig,
    counters: Arc<Counters>,
    stop: CancellationToken,
) {
    loop {
        let delivery = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                delivery = receiver.recv() => delivery,
                _ = stop.cancelled() => None,
            }
        };
        let Some(delivery) = delivery else {
            break;
        };

        let Delivery { message, ticket } = delivery;
        let handled = deliver(worker_id, message, &indexers, &config, &counters).await;
        if let Some(ticket) = ticket {
            let _ = ticket.reply.send(Completion {
                seq: ticket.seq,
                handled,
            });
        }
        counters.finish_one();
    }
    debug!(worker_id, "Worker stopped");
}

/// Handle one message with redelivery. Returns whether it was handled.
async fn deliver(
    worker_id: usize,
    message: EntityIndexingMessage,
    indexers: &IndexerRegistry,
    config: &DispatcherConfig,
    counters: &Counters,
) -> bool {
    let indexer = match indexers.get(message.indexer()) {
        Ok(indexer) => indexer,
        Err(e) => {
            error!(worker_id, error = %e, "Dead-lettering message for unregistered indexer");
            counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
            return false;
        }
    };

    let message = Arc::new(message);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = {
            let indexer = indexer.clone();
            let message = message.clone();
            tokio::task::spawn_blocking(move || indexer.handle(&message)).await
        };

        let (error, retryable) = match outcome {
            Ok(Ok(())) => {
                counters.handled.fetch_add(1, Ordering::SeqCst);
                debug!(
                    worker_id,
                    indexer = %message.indexer(),
                    count = message.ids().len(),
                    "Message handled"
                );
                return true;
            }
            Ok(Err(e)) => {
                let retryable = is_redeliverable(&e);
                (e.to_string(), retryable)
            }
            Err(e) => (format!("handler panicked: {}", e), true),
        };

        if !retryable || attempt > config.max_redeliveries {
            error!(
                worker_id,
                indexer = %message.indexer(),
                count = message.ids().len(),
                attempts = attempt,
                error = %error,
                "Message dead-lettered"
            );
            counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
            return false;
        }

        counters.redelivered.fetch_add(1, Ordering::SeqCst);
        warn!(
            worker_id,
            indexer = %message.indexer(),
            attempt,
            error = %error,
            retry_in_ms = config.redelivery_delay_ms,
            "Redelivering message"
        );
        tokio::time::sleep(Duration::from_millis(config.redelivery_delay_ms)).await;
    }
}

/// Path and entity errors fail identically on every delivery.
fn is_redeliverable(error: &IndexingError) -> bool {
    !matches!(
        error,
        IndexingError::Path(_) | IndexingError::UnknownEntity(_)
    )
}

async fn blocking<T, F>(f: F) -> Result<T, SchedulerError>
where
    F: FnOnce() -> Result<T, IndexingError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
