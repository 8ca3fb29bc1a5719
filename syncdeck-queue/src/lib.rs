//! # syncdeck-queue
//!
//! Durable offline write queue for syncdeck.
//!
//! Writes are accepted immediately, persisted after every change and
//! delivered in priority order whenever the queue is online.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use syncdeck_queue::{FileStorage, HttpDispatcher, WriteQueue};
//! use syncdeck_types::{NewQueueItem, QueueEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = HttpDispatcher::builder()
//!         .base_url("https://api.example.com")
//!         .endpoint("goal_update", "/api/goals")
//!         .build();
//!
//!     let queue = WriteQueue::builder(Arc::new(dispatcher))
//!         .storage(Arc::new(FileStorage::new("queue.json")))
//!         .build();
//!
//!     let mut events = queue.subscribe();
//!     let _auto_sync = queue.start();
//!
//!     queue.enqueue(NewQueueItem::new("goal_update", json!({"goal": "hire", "done": true})));
//!
//!     while let Ok(event) = events.recv().await {
//!         if let QueueEvent::SyncComplete { report } = event {
//!             println!("synced {} item(s)", report.synced);
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Priority ordering**: higher `priority` is dispatched first in a pass
//! - **Retry budget**: items are dropped after `max_retries` failed attempts
//! - **Connectivity aware**: [`WriteQueue::set_online`] gates and triggers syncs
//! - **Pluggable**: bring your own [`QueueStorage`] or [`Dispatcher`]

mod dispatch;
mod error;
#[cfg(feature = "inspect")]
pub mod inspect;
mod queue;
mod storage;

pub use dispatch::{Dispatcher, HttpDispatcher, HttpDispatcherBuilder};
pub use error::QueueError;
pub use queue::{
    SyncHandle, WriteQueue, WriteQueueBuilder, DEFAULT_MAX_RETRIES, DEFAULT_RECONNECT_DELAY,
    DEFAULT_SYNC_INTERVAL,
};
pub use storage::{FileStorage, MemoryStorage, QueueStorage, DEFAULT_QUEUE_FILE};

// Re-export types for convenience
pub use syncdeck_types::{NewQueueItem, QueueEvent, QueueItem, QueueStatus, SyncReport};
