//! Read-only snapshot of queue internals for debugging.

use serde::Serialize;
use syncdeck_types::{QueueItem, QueueStatus};

#[derive(Debug, Clone, Serialize)]
pub struct QueueInspection {
    pub items: Vec<QueueItem>,
    pub status: QueueStatus,
    pub max_retries: u32,
    pub sync_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    /// A reconnect sync is scheduled but has not run yet.
    pub reconnect_pending: bool,
}
