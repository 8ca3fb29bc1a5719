//! # syncdeck
//!
//! Client-side data sync core: cached, polled reads from named data sources
//! and a durable offline write queue, wired together by [`SyncContext`].
//!
//! ```text
//! ┌──────────────────────────── SyncContext ────────────────────────────┐
//! │                                                                     │
//! │  SourceRegistry ── fetch ──▶ cache ─▶ transport ─▶ transform        │
//! │        │                      (TTL)   (rest/graphql/ws)             │
//! │        └── events: data-update / data-error                         │
//! │                                                                     │
//! │  WriteQueue ── enqueue ──▶ storage ─▶ sync pass ─▶ dispatcher       │
//! │        │                   (JSON)    (priority)   (HTTP POST)       │
//! │        └── events: itemAdded / syncStart / itemFailed / ...         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`settings`]**: layered file + environment configuration
//! - **[`context`]**: explicit construction and teardown of both halves
//! - **[`transforms`]**: named transforms available to configured sources
//! - **[`duration`]**: `"30s"`-style duration parsing for settings

pub mod context;
pub mod duration;
pub mod settings;
pub mod transforms;

pub use context::SyncContext;
pub use settings::{QueueSettings, Settings};

pub use syncdeck_queue as queue;
pub use syncdeck_sources as sources;
pub use syncdeck_types as types;
