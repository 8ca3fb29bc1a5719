//! The offline write queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use syncdeck_types::{
    current_timestamp_ms, NewQueueItem, QueueEvent, QueueItem, QueueStatus, SyncReport,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::storage::{MemoryStorage, QueueStorage};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Longest timer period the queue will arm, roughly 30 years. Longer
/// configured intervals would overflow the clock.
const MAX_TIMER_PERIOD: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// Durable queue of writes that are delivered when connectivity allows.
///
/// `enqueue` persists and returns immediately; delivery happens in sync
/// passes that run on enqueue, on reconnect and on the auto-sync timer.
/// Outcomes are only observable through [`subscribe`](Self::subscribe).
///
/// Cloning is cheap; clones share one queue.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use syncdeck_queue::{FileStorage, HttpDispatcher, WriteQueue};
/// use syncdeck_types::NewQueueItem;
///
/// #[tokio::main]
/// async fn main() {
///     let dispatcher = HttpDispatcher::builder()
///         .base_url("https://api.example.com")
///         .endpoint("kpi_update", "/api/kpis")
///         .build();
///
///     let queue = WriteQueue::builder(Arc::new(dispatcher))
///         .storage(Arc::new(FileStorage::new("queue.json")))
///         .build();
///     let _auto_sync = queue.start();
///
///     queue.enqueue(NewQueueItem::new("kpi_update", json!({"mrr": 1200})).priority(5));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WriteQueue {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    items: Mutex<Vec<QueueItem>>,
    storage: Arc<dyn QueueStorage>,
    dispatcher: Arc<dyn Dispatcher>,
    max_retries: u32,
    sync_interval: Duration,
    reconnect_delay: Duration,
    online: AtomicBool,
    /// Id of the sync pass currently holding the queue, if any.
    active_pass: Mutex<Option<u64>>,
    next_pass: AtomicU64,
    last_sync: Mutex<Option<u64>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<QueueEvent>,
}

enum Attempt {
    Retry(u32),
    Dropped(QueueItem),
}

impl WriteQueue {
    /// Start configuring a queue that delivers through `dispatcher`.
    pub fn builder(dispatcher: Arc<dyn Dispatcher>) -> WriteQueueBuilder {
        WriteQueueBuilder::new(dispatcher)
    }

    /// Accept a write: assign an id, persist, and kick off a sync if online.
    ///
    /// Never fails and never waits on the network. A sync is only triggered
    /// when called inside a tokio runtime.
    pub fn enqueue(&self, item: NewQueueItem) -> QueueItem {
        let item = item.into_item(Uuid::new_v4().to_string(), current_timestamp_ms());

        {
            let mut items = self.inner.items.lock();
            items.push(item.clone());
            self.inner.persist(&items);
        }

        debug!(id = %item.id, kind = %item.kind, priority = item.priority, "item enqueued");
        self.inner.emit(QueueEvent::ItemAdded { item: item.clone() });

        if self.inner.is_online() && !self.inner.is_syncing() {
            self.spawn_sync();
        }
        item
    }

    /// Run one sync pass.
    ///
    /// A no-op when offline, already syncing, or empty. Items are dispatched
    /// highest priority first; equal priorities keep enqueue order. The pass
    /// stops early if the queue goes offline.
    pub async fn sync(&self) -> SyncReport {
        let inner = &*self.inner;

        if !inner.is_online() {
            debug!("offline, sync skipped");
            return SyncReport::default();
        }
        let Some(pass) = inner.begin_pass() else {
            debug!("sync already in progress");
            return SyncReport::default();
        };

        let mut batch = inner.items.lock().clone();
        if batch.is_empty() {
            return SyncReport::default();
        }
        batch.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!(pending = batch.len(), "sync started");
        inner.emit(QueueEvent::SyncStart {
            pending: batch.len(),
        });

        let mut report = SyncReport::default();
        for item in batch {
            if !inner.is_online() || !pass.is_current() {
                info!("connection lost, sync interrupted");
                break;
            }
            if !inner.contains(&item.id) {
                continue;
            }

            match inner.dispatcher.dispatch(&item).await {
                Ok(()) => {
                    report.synced += 1;
                    let removed = inner.remove(&item.id);
                    debug!(id = %item.id, kind = %item.kind, "item synced");
                    let id = item.id.clone();
                    inner.emit(QueueEvent::ItemSynced { item });
                    if removed {
                        inner.emit(QueueEvent::ItemRemoved { id });
                    }
                }
                Err(error) => {
                    report.failed += 1;
                    match inner.record_failure(&item.id) {
                        Some(Attempt::Retry(retry_count)) => {
                            debug!(id = %item.id, %error, retry_count, "item sync failed, will retry");
                        }
                        Some(Attempt::Dropped(item)) => {
                            report.dropped += 1;
                            warn!(
                                id = %item.id,
                                kind = %item.kind,
                                %error,
                                retries = item.retry_count,
                                "item dropped after exhausting retries"
                            );
                            let id = item.id.clone();
                            inner.emit(QueueEvent::ItemFailed {
                                item,
                                error: error.to_string(),
                            });
                            inner.emit(QueueEvent::ItemRemoved { id });
                        }
                        None => {}
                    }
                }
            }
        }

        *inner.last_sync.lock() = Some(current_timestamp_ms());
        info!(
            synced = report.synced,
            failed = report.failed,
            dropped = report.dropped,
            "sync complete"
        );
        inner.emit(QueueEvent::SyncComplete { report });
        report
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.inner.items.lock().len(),
            is_syncing: self.inner.is_syncing(),
            is_online: self.inner.is_online(),
            last_sync: *self.inner.last_sync.lock(),
        }
    }

    /// Snapshot of the queued items in enqueue order.
    pub fn pending(&self) -> Vec<QueueItem> {
        self.inner.items.lock().clone()
    }

    /// Drop every queued item without dispatching it.
    pub fn clear(&self) {
        let removed = {
            let mut items = self.inner.items.lock();
            let removed = items.len();
            items.clear();
            self.inner.persist(&items);
            removed
        };
        info!(removed, "queue cleared");
        self.inner.emit(QueueEvent::Cleared);
    }

    pub fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    /// Feed a connectivity change into the queue.
    ///
    /// Going online schedules one sync pass after the reconnect delay; a
    /// quick flap restarts that delay rather than adding a second pass.
    /// Going offline releases the sync flag so a stalled pass cannot block
    /// later ones.
    pub fn set_online(&self, online: bool) {
        if self.inner.online.swap(online, Ordering::AcqRel) == online {
            return;
        }
        if let Some(task) = self.inner.reconnect.lock().take() {
            task.abort();
        }

        if online {
            info!("connection restored");
            self.inner.emit(QueueEvent::Online);
            self.schedule_reconnect_sync();
        } else {
            info!("connection lost");
            *self.inner.active_pass.lock() = None;
            self.inner.emit(QueueEvent::Offline);
        }
    }

    /// Receive queue lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Start the auto-sync timer.
    ///
    /// Every `sync_interval` a pass runs if the queue is online, idle and
    /// non-empty. Must be called within a tokio runtime.
    ///
    /// Returns a handle that can be used to stop the timer.
    pub fn start(&self) -> SyncHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.sync_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        if inner.is_online() && !inner.is_syncing() && inner.len() > 0 {
                            WriteQueue { inner }.sync().await;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("auto-sync stopped");
        });

        info!(interval_ms = period.as_millis() as u64, "auto-sync started");
        SyncHandle { stop_tx }
    }

    fn spawn_sync(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, sync deferred");
            return;
        };
        let queue = self.clone();
        runtime.spawn(async move {
            queue.sync().await;
        });
    }

    fn schedule_reconnect_sync(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, reconnect sync deferred");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.reconnect_delay;

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                WriteQueue { inner }.sync().await;
            }
        });
        *self.inner.reconnect.lock() = Some(task);
    }

    #[cfg(feature = "inspect")]
    pub fn inspect(&self) -> crate::inspect::QueueInspection {
        crate::inspect::QueueInspection {
            items: self.pending(),
            status: self.status(),
            max_retries: self.inner.max_retries,
            sync_interval_ms: self.inner.sync_interval.as_millis() as u64,
            reconnect_delay_ms: self.inner.reconnect_delay.as_millis() as u64,
            reconnect_pending: self
                .inner
                .reconnect
                .lock()
                .as_ref()
                .is_some_and(|task| !task.is_finished()),
        }
    }
}

impl Inner {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn is_syncing(&self) -> bool {
        self.active_pass.lock().is_some()
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn contains(&self, id: &str) -> bool {
        self.items.lock().iter().any(|item| item.id == id)
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn persist(&self, items: &[QueueItem]) {
        if let Err(error) = self.storage.save(items) {
            warn!(%error, pending = items.len(), "failed to persist queue");
        }
    }

    fn begin_pass(&self) -> Option<PassGuard<'_>> {
        let mut active = self.active_pass.lock();
        if active.is_some() {
            return None;
        }
        let pass = self.next_pass.fetch_add(1, Ordering::Relaxed);
        *active = Some(pass);
        Some(PassGuard { inner: self, pass })
    }

    fn remove(&self, id: &str) -> bool {
        let mut items = self.items.lock();
        let Some(index) = items.iter().position(|item| item.id == id) else {
            return false;
        };
        items.remove(index);
        self.persist(&items);
        true
    }

    /// Bump the retry count, dropping the item once it reaches the limit.
    fn record_failure(&self, id: &str) -> Option<Attempt> {
        let mut items = self.items.lock();
        let index = items.iter().position(|item| item.id == id)?;

        items[index].retry_count += 1;
        let attempt = if items[index].retry_count >= self.max_retries {
            Attempt::Dropped(items.remove(index))
        } else {
            Attempt::Retry(items[index].retry_count)
        };
        self.persist(&items);
        Some(attempt)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.reconnect.get_mut().take() {
            task.abort();
        }
    }
}

/// Holds the queue's sync flag for the duration of one pass.
struct PassGuard<'a> {
    inner: &'a Inner,
    pass: u64,
}

impl PassGuard<'_> {
    /// False once going offline has released the flag.
    fn is_current(&self) -> bool {
        *self.inner.active_pass.lock() == Some(self.pass)
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.inner.active_pass.lock();
        if *active == Some(self.pass) {
            *active = None;
        }
    }
}

/// Builder for configuring a WriteQueue.
#[derive(Debug)]
pub struct WriteQueueBuilder {
    dispatcher: Arc<dyn Dispatcher>,
    storage: Option<Arc<dyn QueueStorage>>,
    max_retries: u32,
    sync_interval: Duration,
    reconnect_delay: Duration,
    online: bool,
    event_capacity: usize,
}

impl WriteQueueBuilder {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            storage: None,
            max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            online: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Where the queue is persisted. Defaults to in-memory storage.
    pub fn storage(mut self, storage: Arc<dyn QueueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Failed attempts after which an item is dropped (default: 3).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Period of the auto-sync timer (default: 30 seconds).
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Delay between coming back online and the reconnect sync (default: 1 second).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Initial connectivity (default: online).
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the queue, restoring whatever the storage holds.
    ///
    /// An unreadable store yields an empty queue.
    pub fn build(self) -> WriteQueue {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        let items = match storage.load() {
            Ok(items) => items,
            Err(error) => {
                warn!(%error, "persisted queue unreadable, starting empty");
                Vec::new()
            }
        };
        if !items.is_empty() {
            info!(pending = items.len(), "restored persisted queue");
        }

        let (events, _) = broadcast::channel(self.event_capacity);

        WriteQueue {
            inner: Arc::new(Inner {
                items: Mutex::new(items),
                storage,
                dispatcher: self.dispatcher,
                max_retries: self.max_retries,
                sync_interval: self
                    .sync_interval
                    .clamp(Duration::from_millis(1), MAX_TIMER_PERIOD),
                reconnect_delay: self.reconnect_delay,
                online: AtomicBool::new(self.online),
                active_pass: Mutex::new(None),
                next_pass: AtomicU64::new(0),
                last_sync: Mutex::new(None),
                reconnect: Mutex::new(None),
                events,
            }),
        }
    }
}

/// Handle for controlling the auto-sync timer.
///
/// Drop this handle to stop the timer, or call `stop()` explicitly.
#[derive(Debug)]
pub struct SyncHandle {
    stop_tx: watch::Sender<bool>,
}

impl SyncHandle {
    /// Stop the auto-sync timer.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }
}
