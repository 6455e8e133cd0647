//! Alert stream client.
//!
//! Opens a live query on the alert collection and yields records as they are
//! added. The feed backend (a hosted document store in production) sits
//! behind [`AlertFeed`]; reconnects are the backend's business, so a
//! feed-side error comes out of [`AlertSubscription::next`] as
//! [`CoreError::StreamInterrupted`] and the subscription stays usable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::alert::AlertRecord;
use crate::error::{CoreError, Result};

pub const DEFAULT_COLLECTION: &str = "alerts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change { kind: ChangeKind, record: AlertRecord },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// `collection` where `timestamp > since`, ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    pub collection: String,
    pub since: DateTime<Utc>,
    pub order: SortOrder,
}

impl FeedQuery {
    pub fn recent(collection: impl Into<String>, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            collection: collection.into(),
            since: now - window,
            order: SortOrder::Descending,
        }
    }

    pub fn matches(&self, record: &AlertRecord) -> bool {
        record.timestamp.is_some_and(|at| at > self.since)
    }
}

/// A live query handle from the backend. Dropping it unsubscribes.
pub struct FeedSubscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<FeedMessage>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FeedSubscription {
    pub fn new(id: Uuid, rx: mpsc::UnboundedReceiver<FeedMessage>) -> Self {
        Self {
            id,
            rx,
            on_cancel: None,
        }
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(cancel) = self.on_cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Backend that serves live queries.
pub trait AlertFeed: Send + Sync {
    fn subscribe(&self, query: FeedQuery) -> Result<FeedSubscription>;
}

#[derive(Clone)]
pub struct AlertStreamClient {
    feed: Arc<dyn AlertFeed>,
    collection: String,
}

impl AlertStreamClient {
    pub fn new(feed: Arc<dyn AlertFeed>) -> Self {
        Self {
            feed,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Subscribe to alerts newer than `now - window`.
    pub fn open(&self, window: Duration, now: DateTime<Utc>) -> Result<AlertSubscription> {
        let query = FeedQuery::recent(&self.collection, window, now);
        let inner = self.feed.subscribe(query)?;
        tracing::debug!(subscription = %inner.id(), collection = %self.collection, "alert stream opened");
        Ok(AlertSubscription { inner: Some(inner) })
    }
}

#[derive(Debug)]
pub struct AlertSubscription {
    inner: Option<FeedSubscription>,
}

impl AlertSubscription {
    pub fn id(&self) -> Option<Uuid> {
        self.inner.as_ref().map(FeedSubscription::id)
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Next added record. Modified and removed changes are skipped. `None`
    /// once the feed ends or after [`close`](Self::close).
    ///
    /// Cancel safe: dropping the future loses no record.
    pub async fn next(&mut self) -> Option<Result<AlertRecord>> {
        let inner = self.inner.as_mut()?;
        loop {
            match inner.rx.recv().await? {
                FeedMessage::Change {
                    kind: ChangeKind::Added,
                    record,
                } => return Some(Ok(record)),
                FeedMessage::Change { kind, record } => {
                    tracing::trace!(alert_id = %record.id, ?kind, "ignoring change");
                }
                FeedMessage::Error(message) => {
                    return Some(Err(CoreError::stream_interrupted(message)));
                }
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            tracing::debug!(subscription = %inner.id(), "alert stream closed");
        }
    }
}

#[derive(Default)]
struct MemoryFeedState {
    docs: Vec<AlertRecord>,
    subscribers: HashMap<Uuid, (FeedQuery, mpsc::UnboundedSender<FeedMessage>)>,
    queries: Vec<FeedQuery>,
    total: usize,
    refuse: Option<String>,
}

impl MemoryFeedState {
    fn broadcast(&mut self, kind: ChangeKind, record: &AlertRecord) {
        self.subscribers.retain(|_, (query, tx)| {
            if !query.matches(record) {
                return !tx.is_closed();
            }
            tx.send(FeedMessage::Change {
                kind,
                record: record.clone(),
            })
            .is_ok()
        });
    }
}

/// In-process document collection with live queries.
///
/// A new subscription first receives every stored document matching its
/// query as `Added`, newest first, the way a hosted store replays its
/// snapshot.
#[derive(Clone, Default)]
pub struct MemoryFeed {
    state: Arc<Mutex<MemoryFeedState>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryFeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a new document and push it to matching subscribers.
    pub fn publish(&self, record: AlertRecord) {
        self.publish_change(ChangeKind::Added, record);
    }

    pub fn publish_change(&self, kind: ChangeKind, record: AlertRecord) {
        let mut state = self.lock();
        state.docs.retain(|doc| doc.id != record.id);
        if kind != ChangeKind::Removed {
            state.docs.push(record.clone());
        }
        state.broadcast(kind, &record);
    }

    /// Push an error to every live subscriber.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.lock();
        state
            .subscribers
            .retain(|_, (_, tx)| tx.send(FeedMessage::Error(message.clone())).is_ok());
    }

    /// Close every live subscription from the feed side.
    pub fn end_streams(&self) {
        self.lock().subscribers.clear();
    }

    /// Make new subscriptions fail with `message` until cleared with `None`.
    pub fn refuse_subscriptions(&self, message: Option<&str>) {
        self.lock().refuse = message.map(str::to_string);
    }

    pub fn open_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.lock().total
    }

    pub fn queries(&self) -> Vec<FeedQuery> {
        self.lock().queries.clone()
    }
}

impl AlertFeed for MemoryFeed {
    fn subscribe(&self, query: FeedQuery) -> Result<FeedSubscription> {
        let mut state = self.lock();
        if let Some(message) = &state.refuse {
            return Err(CoreError::stream_interrupted(message.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut snapshot: Vec<&AlertRecord> =
            state.docs.iter().filter(|doc| query.matches(doc)).collect();
        snapshot.sort_by_key(|doc| doc.timestamp);
        if query.order == SortOrder::Descending {
            snapshot.reverse();
        }
        for doc in snapshot {
            // The receiver is still in hand, so this cannot fail.
            let _ = tx.send(FeedMessage::Change {
                kind: ChangeKind::Added,
                record: doc.clone(),
            });
        }

        let id = Uuid::new_v4();
        state.queries.push(query.clone());
        state.subscribers.insert(id, (query, tx));
        state.total += 1;

        let shared = Arc::downgrade(&self.state);
        Ok(FeedSubscription::new(id, rx).on_cancel(move || {
            if let Some(shared) = shared.upgrade() {
                shared
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .subscribers
                    .remove(&id);
            }
        }))
    }
}
