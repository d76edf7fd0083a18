//! Scripted remote status API

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use waggle_entitlements::{RemoteError, SubscriptionStatusApi};
use waggle_types::UserId;

/// Remote API returning queued responses in order.
///
/// Once the queue is empty every call answers `{ "subscription": null }`.
#[derive(Default, Clone)]
pub struct MockStatusApi {
    responses: Arc<Mutex<VecDeque<Result<Value, RemoteError>>>>,
    calls: Arc<AtomicUsize>,
    held: Arc<AtomicBool>,
    gate: Arc<Notify>,
}

#[allow(dead_code)]
impl MockStatusApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response
    pub fn respond(&self, response: Result<Value, RemoteError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Park calls until [`release`](Self::release)
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let one parked call through
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionStatusApi for MockStatusApi {
    async fn get_subscription_status(&self, _user_id: &UserId) -> Result<Value, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "subscription": null })))
    }
}
