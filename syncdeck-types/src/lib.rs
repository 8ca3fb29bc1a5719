//! # syncdeck-types
//!
//! Core types shared by the syncdeck read and write paths.
//!
//! ## Contents
//!
//! - **Source configuration**: [`SourceConfig`] with its [`Auth`], [`PollingConfig`],
//!   [`RetryConfig`] and [`CacheConfig`] parts
//! - **Fetch results**: [`FetchOptions`], [`FetchResponse`] and the per-source
//!   [`SourceState`]
//! - **Write queue**: [`QueueItem`], [`NewQueueItem`], [`QueueStatus`], [`SyncReport`]
//! - **Events**: [`SourceEvent`] and [`QueueEvent`]
//!
//! Everything that crosses a file or process boundary derives serde, so
//! source configurations can be loaded from settings files and queue items
//! persisted as a JSON array.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use syncdeck_types::{CacheConfig, PollingConfig, SourceConfig, SourceKind};
//!
//! let config = SourceConfig::new("signups", SourceKind::Rest)
//!     .endpoint("https://api.example.com/signups")
//!     .param("range", "30d")
//!     .polling(PollingConfig::every(Duration::from_secs(60)))
//!     .cache(CacheConfig::ttl(Duration::from_secs(30)));
//!
//! assert_eq!(config.polling.interval(), Some(Duration::from_secs(60)));
//! ```

mod event;
mod fetch;
mod queue;
mod source;

pub use event::*;
pub use fetch::*;
pub use queue::*;
pub use source::*;

/// Current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
