//! Notifications emitted by the source registry and the write queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{QueueItem, SyncReport};

/// Read-path notification, scoped to a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SourceEvent {
    DataUpdate {
        source_id: String,
        data: Value,
        timestamp: u64,
    },
    DataError {
        source_id: String,
        error: String,
        timestamp: u64,
    },
}

impl SourceEvent {
    pub fn source_id(&self) -> &str {
        match self {
            Self::DataUpdate { source_id, .. } | Self::DataError { source_id, .. } => source_id,
        }
    }

    /// Scope the event belongs to, `datasource-<id>`.
    pub fn scope(&self) -> String {
        format!("datasource-{}", self.source_id())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DataUpdate { .. } => "data-update",
            Self::DataError { .. } => "data-error",
        }
    }
}

/// Write-path notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum QueueEvent {
    ItemAdded { item: QueueItem },
    ItemRemoved { id: String },
    SyncStart { pending: usize },
    ItemSynced { item: QueueItem },
    /// The item exhausted its retries and was dropped.
    ItemFailed { item: QueueItem, error: String },
    SyncComplete { report: SyncReport },
    Online,
    Offline,
    Cleared,
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => "itemAdded",
            Self::ItemRemoved { .. } => "itemRemoved",
            Self::SyncStart { .. } => "syncStart",
            Self::ItemSynced { .. } => "itemSynced",
            Self::ItemFailed { .. } => "itemFailed",
            Self::SyncComplete { .. } => "syncComplete",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Cleared => "cleared",
        }
    }
}
