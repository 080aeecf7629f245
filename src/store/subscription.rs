// Live query subscriptions. Each handle owns its listener task; dropping the
// handle cancels it.
use futures::Stream;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{Document, DynDocumentStore, Query, StoreError};

const SNAPSHOT_BUFFER: usize = 16;

/// Full result set of a query at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn decode_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        self.documents.iter().map(Document::decode).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct Subscription {
    snapshots: mpsc::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next snapshot, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        self.snapshots.poll_recv(cx)
    }
}

/// Subscribe to a query. The first snapshot is delivered immediately; a new
/// one follows every committed change to the queried collection.
pub async fn subscribe(store: DynDocumentStore, query: Query) -> Result<Subscription, StoreError> {
    // Listen before the initial read so nothing slips between the two
    let mut changes = store.changes();
    let initial = store.query(&query).await?;

    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
    // Fresh channel, capacity is available
    let _ = tx.try_send(Snapshot { documents: initial });

    let task = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) if event.collection != query.collection => continue,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Subscription lagged, re-reading");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }

            match store.query(&query).await {
                Ok(documents) => {
                    if tx.send(Snapshot { documents }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(collection = %query.collection, "Subscription read failed: {}", e);
                }
            }
        }
    });

    Ok(Subscription {
        snapshots: rx,
        task,
    })
}
