//! Write-behind sync of the cart to its server mirror.
//!
//! Every cart mutation while signed in enqueues a [`SyncIntent`]; a
//! background worker delivers them in order. Delivery is a wholesale
//! replace (or clear), so intents are idempotent and trailing intents
//! for the same customer coalesce instead of piling up. Transient
//! failures keep the intent queued and back off; permanent failures
//! drop the intent and record why.

use std::collections::VecDeque;
use std::sync::Arc;

use shopconnect_core::UserId;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, CartStore};
use crate::config::SyncPolicy;
use crate::types::CartLine;

/// One queued mirror write.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncIntent {
    /// Replace the customer's mirror with this snapshot.
    Replace {
        customer: UserId,
        lines: Vec<CartLine>,
    },
    /// Empty the customer's mirror.
    Clear { customer: UserId },
}

impl SyncIntent {
    #[must_use]
    pub const fn customer(&self) -> UserId {
        match self {
            Self::Replace { customer, .. } | Self::Clear { customer } => *customer,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Clear { .. } => "clear",
        }
    }
}

#[derive(Default)]
struct OutboxState {
    queue: VecDeque<SyncIntent>,
    attempts: u32,
    last_error: Option<String>,
}

/// FIFO of pending mirror writes, shared between the cart handle and
/// the sync worker.
#[derive(Default)]
pub struct Outbox {
    state: Mutex<OutboxState>,
    wake: Notify,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an intent.
    ///
    /// When the most recent queued intent is for the same customer it
    /// is overwritten in place: the newer snapshot supersedes it. The
    /// head of the queue is never overwritten, because the worker may
    /// be delivering it right now.
    pub async fn push(&self, intent: SyncIntent) {
        let mut state = self.state.lock().await;
        if state.queue.len() >= 2 {
            if let Some(last) = state.queue.back_mut() {
                if last.customer() == intent.customer() {
                    *last = intent;
                    return;
                }
            }
        }
        state.queue.push_back(intent);
        drop(state);
        self.wake.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.queue.is_empty()
    }

    /// Delivery attempts made for the current head intent.
    pub async fn attempts(&self) -> u32 {
        self.state.lock().await.attempts
    }

    /// The error from the most recent failed delivery, if any.
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    async fn peek(&self) -> Option<SyncIntent> {
        self.state.lock().await.queue.front().cloned()
    }

    /// Pop the head after delivering `delivered`. When another drainer
    /// raced us and already popped it, leave the queue alone; the
    /// duplicate delivery was an idempotent replace.
    async fn commit_head(&self, delivered: &SyncIntent) {
        let mut state = self.state.lock().await;
        if state.queue.front() == Some(delivered) {
            state.queue.pop_front();
        }
        state.attempts = 0;
        state.last_error = None;
    }

    async fn discard_head(&self, failed: &SyncIntent, error: String) {
        let mut state = self.state.lock().await;
        if state.queue.front() == Some(failed) {
            state.queue.pop_front();
        }
        state.attempts = 0;
        state.last_error = Some(error);
    }

    async fn record_retry(&self, error: String) -> u32 {
        let mut state = self.state.lock().await;
        state.attempts += 1;
        state.last_error = Some(error);
        state.attempts
    }

    async fn wait_for_work(&self) {
        self.wake.notified().await;
    }
}

async fn deliver(store: &dyn CartStore, intent: &SyncIntent) -> Result<(), BackendError> {
    match intent {
        SyncIntent::Replace { customer, lines } => store.replace_cart_rows(*customer, lines).await,
        SyncIntent::Clear { customer } => store.clear_cart_rows(*customer).await,
    }
}

/// Deliver queued intents until the queue is empty or a transient
/// failure stops progress. Permanent failures drop the intent and move
/// on. Returns how many intents were delivered.
///
/// Safe to call while the worker is running: a delivery both drainers
/// perform is an idempotent replace, and only one of them pops it.
///
/// # Errors
///
/// The transient error that stopped the drain; the failed intent stays
/// queued.
pub async fn drain_once(outbox: &Outbox, store: &dyn CartStore) -> Result<usize, BackendError> {
    let mut delivered = 0;
    while let Some(intent) = outbox.peek().await {
        match deliver(store, &intent).await {
            Ok(()) => {
                outbox.commit_head(&intent).await;
                delivered += 1;
            }
            Err(e) if e.is_transient() => {
                outbox.record_retry(e.to_string()).await;
                return Err(e);
            }
            Err(e) => {
                error!(kind = intent.kind(), error = %e, "dropping undeliverable sync intent");
                outbox.discard_head(&intent, e.to_string()).await;
            }
        }
    }
    Ok(delivered)
}

/// Spawn the background delivery loop. The task runs until aborted.
pub fn spawn_sync_worker(
    outbox: Arc<Outbox>,
    store: Arc<dyn CartStore>,
    policy: SyncPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("cart sync worker started");
        loop {
            let Some(intent) = outbox.peek().await else {
                outbox.wait_for_work().await;
                continue;
            };

            match deliver(store.as_ref(), &intent).await {
                Ok(()) => {
                    debug!(
                        kind = intent.kind(),
                        customer = %intent.customer(),
                        "cart mirror updated"
                    );
                    outbox.commit_head(&intent).await;
                }
                Err(e) if e.is_transient() => {
                    let attempt = outbox.record_retry(e.to_string()).await;
                    let delay = policy.delay_for(attempt, e.retry_after());
                    warn!(
                        kind = intent.kind(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "cart sync failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        kind = intent.kind(),
                        customer = %intent.customer(),
                        error = %e,
                        "cart sync failed permanently, dropping intent"
                    );
                    outbox.discard_head(&intent, e.to_string()).await;
                }
            }
        }
    })
}
