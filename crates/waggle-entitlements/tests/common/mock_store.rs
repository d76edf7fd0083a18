//! In-memory document store with live listeners

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use waggle_entitlements::{DocumentPath, StoreError, SubscriptionFeed, SubscriptionStore};
use waggle_types::UserId;

type DocKey = (DocumentPath, UserId);
type FeedSender = mpsc::Sender<Result<Option<Value>, StoreError>>;

/// In-memory subscription store for testing
#[derive(Default, Clone)]
pub struct MockSubscriptionStore {
    docs: Arc<DashMap<DocKey, Value>>,
    listeners: Arc<DashMap<DocKey, Vec<FeedSender>>>,
    read_failures: Arc<DashMap<DocumentPath, StoreError>>,
    listen_failures: Arc<DashMap<DocumentPath, StoreError>>,
    hold_initial: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    listens: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockSubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a document and notify open listeners
    pub fn set(&self, path: DocumentPath, uid: &str, doc: Value) {
        let key = (path, UserId::from(uid));
        self.docs.insert(key.clone(), doc.clone());
        self.notify(&key, Ok(Some(doc)));
    }

    /// Delete a document and notify open listeners
    pub fn remove(&self, path: DocumentPath, uid: &str) {
        let key = (path, UserId::from(uid));
        self.docs.remove(&key);
        self.notify(&key, Ok(None));
    }

    /// Deliver a listener error without touching the document
    pub fn push_error(&self, path: DocumentPath, uid: &str, err: StoreError) {
        self.notify(&(path, UserId::from(uid)), Err(err));
    }

    /// Send the current document state to open listeners
    pub fn emit_current(&self, path: DocumentPath, uid: &str) {
        let key = (path, UserId::from(uid));
        let current = self.docs.get(&key).map(|doc| doc.value().clone());
        self.notify(&key, Ok(current));
    }

    /// Drop every listener sender for a document, ending their feeds
    pub fn close_listeners(&self, path: DocumentPath, uid: &str) {
        self.listeners.remove(&(path, UserId::from(uid)));
    }

    /// Make one-shot reads of `path` fail
    pub fn fail_reads(&self, path: DocumentPath, err: StoreError) {
        self.read_failures.insert(path, err);
    }

    /// Make listening on `path` fail
    pub fn fail_listen(&self, path: DocumentPath, err: StoreError) {
        self.listen_failures.insert(path, err);
    }

    /// Do not send the current state when a listener opens
    pub fn hold_initial(&self) {
        self.hold_initial.store(true, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn listen_count(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    /// Listeners whose receiver is still alive
    pub fn open_listeners(&self, path: DocumentPath, uid: &str) -> usize {
        self.listeners
            .get(&(path, UserId::from(uid)))
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn notify(&self, key: &DocKey, message: Result<Option<Value>, StoreError>) {
        if let Some(mut senders) = self.listeners.get_mut(key) {
            senders.retain(|tx| !tx.is_closed());
            for tx in senders.iter() {
                let _ = tx.try_send(message.clone());
            }
        }
    }
}

#[async_trait]
impl SubscriptionStore for MockSubscriptionStore {
    async fn read(&self, path: DocumentPath, user_id: &UserId) -> Result<Option<Value>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.read_failures.get(&path) {
            return Err(err.value().clone());
        }
        Ok(self
            .docs
            .get(&(path, user_id.clone()))
            .map(|doc| doc.value().clone()))
    }

    async fn listen(&self, path: DocumentPath, user_id: &UserId) -> Result<SubscriptionFeed, StoreError> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.listen_failures.get(&path) {
            return Err(err.value().clone());
        }

        let key = (path, user_id.clone());
        let (tx, rx) = mpsc::channel(32);
        if !self.hold_initial.load(Ordering::SeqCst) {
            let current = self.docs.get(&key).map(|doc| doc.value().clone());
            let _ = tx.try_send(Ok(current));
        }
        self.listeners.entry(key).or_default().push(tx);
        Ok(rx)
    }
}
