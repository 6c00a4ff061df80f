//! Tasks feeding incremental messages into the dispatcher.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use media_indexing::{ChangeFeed, IndexerEvents, SearchIndexer, SEARCH_INDEXER_NAME};

use crate::dispatcher::IndexingDispatcher;

/// One task per indexer, turning change events of its entity type into
/// messages.
///
/// Subscriptions are taken before this returns, so events published
/// afterwards are never missed. A listener that falls behind the feed
/// requests a full sweep of its indexer, which covers every record the
/// dropped events would have named. The returned handles include the
/// tasks running those sweeps.
pub fn spawn_change_listeners(
    feed: &ChangeFeed,
    dispatcher: &Arc<IndexingDispatcher>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for indexer in dispatcher.indexers().iter() {
        let indexer = indexer.clone();
        let mut subscription = feed.subscribe_entity(indexer.entity());
        let queue = dispatcher.queue();
        let (catch_up, sweeper) =
            spawn_catch_up(dispatcher.clone(), indexer.name().to_string(), cancel.clone());
        handles.push(sweeper);
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            info!(indexer = %indexer.name(), entity = %subscription.entity(), "Change listener started");
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = subscription.recv() => event,
                };
                match event {
                    Ok(event) => {
                        let Some(message) = indexer.update(&event) else {
                            continue;
                        };
                        debug!(
                            indexer = %indexer.name(),
                            count = message.ids().len(),
                            "Enqueueing change"
                        );
                        if queue.enqueue(message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(indexer = %indexer.name(), missed, "Change listener lagged, requesting sweep");
                        catch_up.notify_one();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(indexer = %indexer.name(), "Change listener stopped");
        }));
    }
    handles
}

/// Chain media completions into search document refreshes.
///
/// Lost completions trigger a full search sweep, like lagging change
/// listeners do. Returns the listener and the task running those sweeps.
pub fn spawn_completion_listener(
    events: &IndexerEvents,
    search: Arc<SearchIndexer>,
    dispatcher: &Arc<IndexingDispatcher>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut receiver = events.subscribe();
    let queue = dispatcher.queue();
    let (catch_up, sweeper) = spawn_catch_up(
        dispatcher.clone(),
        SEARCH_INDEXER_NAME.to_string(),
        cancel.clone(),
    );
    let listener = tokio::spawn(async move {
        info!("Completion listener started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = receiver.recv() => event,
            };
            match event {
                Ok(event) => {
                    let Some(message) = search.on_media_indexed(&event) else {
                        continue;
                    };
                    if queue.enqueue(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Completion listener lagged, requesting search sweep");
                    catch_up.notify_one();
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Completion listener stopped");
    });
    vec![sweeper, listener]
}

/// Sweep `name` whenever the returned handle is notified. Requests arriving
/// while a sweep runs collapse into a single follow-up sweep.
fn spawn_catch_up(
    dispatcher: Arc<IndexingDispatcher>,
    name: String,
    cancel: CancellationToken,
) -> (Arc<Notify>, JoinHandle<()>) {
    let requests = Arc::new(Notify::new());
    let notified = requests.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notified.notified() => {}
            }
            match dispatcher.sweep(&name, &cancel).await {
                Ok(summary) => info!(
                    indexer = %name,
                    processed = summary.processed,
                    completed = summary.completed,
                    "Catch-up sweep finished"
                ),
                Err(e) => warn!(indexer = %name, error = %e, "Catch-up sweep failed"),
            }
        }
    });
    (requests, handle)
}
