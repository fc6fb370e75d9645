//! Background persistence worker
//!
//! The controller loop never awaits the store. Records are serialized on submit and parked in a
//! pending map keyed by entity and id, so a record submitted again before the worker reaches it
//! replaces the older blob. The worker writes each entry with exponential backoff; a write that
//! still fails after the last attempt is logged, alerted and dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ecosys_common::{
    EcosysError, EntityType, Notification, NotificationKind, NotificationSink, PersistentStore,
    Result, StoreError,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Retry settings for the worker
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to 32× the base
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_backoff * (1u32 << attempt.saturating_sub(1).min(5))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(200),
        }
    }
}

type PendingKey = (EntityType, String);

/// Totals reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub written: u64,
    pub failed: u64,
}

/// State shared between the submit side and the worker
#[derive(Default)]
struct Backlog {
    pending: Mutex<BTreeMap<PendingKey, Vec<u8>>>,
    in_flight: AtomicBool,
    written: AtomicU64,
    failed: AtomicU64,
}

impl Backlog {
    fn next(&self) -> Option<(PendingKey, Vec<u8>)> {
        let entry = self.pending.lock().pop_first();
        self.in_flight.store(entry.is_some(), Ordering::SeqCst);
        entry
    }

    /// Count everything not yet written as failed
    fn abandon(&self) -> u64 {
        let queued = std::mem::take(&mut *self.pending.lock()).len() as u64;
        let abandoned = queued + u64::from(self.in_flight.swap(false, Ordering::SeqCst));
        self.failed.fetch_add(abandoned, Ordering::SeqCst);
        abandoned
    }

    fn stats(&self) -> PersistStats {
        PersistStats {
            written: self.written.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Handle to the persistence worker
pub struct Persister {
    backlog: Arc<Backlog>,
    wake: mpsc::Sender<()>,
    worker: JoinHandle<()>,
    notifier: Arc<dyn NotificationSink>,
    warn_backlog: usize,
}

impl Persister {
    /// Spawn the worker on the current runtime.
    ///
    /// `warn_backlog` is the number of distinct pending records above which a warning is logged.
    pub fn spawn(
        store: Arc<dyn PersistentStore>,
        notifier: Arc<dyn NotificationSink>,
        policy: RetryPolicy,
        warn_backlog: usize,
    ) -> Self {
        let backlog = Arc::new(Backlog::default());
        let (wake, rx) = mpsc::channel(1);
        let worker = tokio::spawn(run_worker(
            store,
            notifier.clone(),
            policy,
            backlog.clone(),
            rx,
        ));
        Self {
            backlog,
            wake,
            worker,
            notifier,
            warn_backlog: warn_backlog.max(1),
        }
    }

    /// Serialize `value` and park it for the worker; never waits on the store
    pub fn submit<T: Serialize + ?Sized>(
        &self,
        entity: EntityType,
        id: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let blob = serde_json::to_vec(value)?;
        let backlog = {
            let mut pending = self.backlog.pending.lock();
            pending.insert((entity, id.into()), blob);
            pending.len()
        };
        if backlog == self.warn_backlog + 1 {
            warn!(backlog, "Persistence backlog growing");
        }

        match self.wake.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(EcosysError::Persistence(
                StoreError::Unavailable("persistence worker stopped".to_string()),
            )),
        }
    }

    /// Records waiting for the worker
    pub fn backlog(&self) -> usize {
        self.backlog.pending.lock().len()
    }

    /// Stop accepting writes and let the worker drain for at most `grace`.
    ///
    /// Records still unwritten when the grace period ends are counted as failed and alerted.
    pub async fn close(self, grace: Duration) -> PersistStats {
        let Persister {
            backlog,
            wake,
            mut worker,
            notifier,
            ..
        } = self;
        drop(wake);

        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Persistence worker panicked: {}", e);
                backlog.abandon();
            }
            Err(_) => {
                worker.abort();
                let abandoned = backlog.abandon();
                error!(
                    abandoned,
                    grace_ms = grace.as_millis() as u64,
                    "Persistence did not drain in time"
                );
                notifier.notify(Notification::new(
                    NotificationKind::PersistenceFailure,
                    serde_json::json!({
                        "abandoned": abandoned,
                        "error": "shutdown grace period elapsed",
                    }),
                ));
            }
        }
        backlog.stats()
    }
}

async fn run_worker(
    store: Arc<dyn PersistentStore>,
    notifier: Arc<dyn NotificationSink>,
    policy: RetryPolicy,
    backlog: Arc<Backlog>,
    mut wake: mpsc::Receiver<()>,
) {
    loop {
        while let Some(((entity, id), blob)) = backlog.next() {
            write_entry(store.as_ref(), notifier.as_ref(), &policy, &backlog, entity, &id, blob)
                .await;
        }
        // Buffered wake-ups are delivered before the closed signal, so nothing is left behind
        if wake.recv().await.is_none() {
            break;
        }
    }

    let stats = backlog.stats();
    info!(written = stats.written, failed = stats.failed, "Persistence worker stopped");
}

async fn write_entry(
    store: &dyn PersistentStore,
    notifier: &dyn NotificationSink,
    policy: &RetryPolicy,
    backlog: &Backlog,
    entity: EntityType,
    id: &str,
    blob: Vec<u8>,
) {
    match write_with_retry(store, policy, entity, id, blob).await {
        Ok(attempts) => {
            backlog.written.fetch_add(1, Ordering::SeqCst);
            debug!(%entity, id, attempts, "Persisted");
        }
        Err(e) => {
            backlog.failed.fetch_add(1, Ordering::SeqCst);
            error!(
                %entity,
                id,
                max_attempts = policy.max_attempts,
                error = %e,
                "Giving up on write"
            );
            notifier.notify(Notification::new(
                NotificationKind::PersistenceFailure,
                serde_json::json!({
                    "entity": entity.as_str(),
                    "id": id,
                    "error": e.to_string(),
                }),
            ));
        }
    }
    backlog.in_flight.store(false, Ordering::SeqCst);
}

/// Returns the number of attempts used
async fn write_with_retry(
    store: &dyn PersistentStore,
    policy: &RetryPolicy,
    entity: EntityType,
    id: &str,
    blob: Vec<u8>,
) -> std::result::Result<u32, StoreError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match store.save(entity, id, blob.clone()).await {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt >= policy.max_attempts.max(1) => return Err(e),
            Err(e) => {
                let delay = policy.delay(attempt);
                warn!(
                    %entity,
                    id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Write failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
