//! Write queue items and status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pending write operation.
///
/// Serialized with camelCase keys; the persisted queue is a JSON array of
/// these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    /// Selects the target endpoint.
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    /// Unix timestamp in milliseconds when the item was enqueued.
    pub timestamp: u64,
    #[serde(default)]
    pub retry_count: u32,
    /// Higher priorities are dispatched first within a sync pass.
    #[serde(default)]
    pub priority: i32,
}

/// A write operation before it has been accepted by the queue.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use syncdeck_types::NewQueueItem;
///
/// let item = NewQueueItem::new("kpi_update", json!({"kpi": "mrr", "value": 42}))
///     .priority(5);
/// assert_eq!(item.priority, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    pub kind: String,
    pub payload: Value,
    pub priority: i32,
}

impl NewQueueItem {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            priority: 0,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Accept the item under `id` at `timestamp`.
    pub fn into_item(self, id: String, timestamp: u64) -> QueueItem {
        QueueItem {
            id,
            kind: self.kind,
            payload: self.payload,
            timestamp,
            retry_count: 0,
            priority: self.priority,
        }
    }
}

/// Queue status for sync indicators.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub is_syncing: bool,
    pub is_online: bool,
    /// Unix timestamp in milliseconds of the last completed sync pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<u64>,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Items delivered and removed.
    pub synced: usize,
    /// Failed attempts this pass (dropped items included).
    pub failed: usize,
    /// Items removed after exhausting their retries.
    pub dropped: usize,
}

impl SyncReport {
    /// True when the pass touched no items.
    pub fn is_empty(&self) -> bool {
        self.synced == 0 && self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn persisted_shape_uses_camel_case_keys() {
        let item = NewQueueItem::new("goal_update", json!({"goal": 1}))
            .priority(2)
            .into_item("abc".into(), 1_700_000_000_000);

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "abc",
                "type": "goal_update",
                "payload": {"goal": 1},
                "timestamp": 1_700_000_000_000u64,
                "retryCount": 0,
                "priority": 2
            })
        );
    }

    #[test]
    fn array_survives_serialization() {
        let items = vec![
            NewQueueItem::new("a", json!(null)).into_item("1".into(), 10),
            NewQueueItem::new("b", json!({"nested": [1, 2, 3]}))
                .priority(-1)
                .into_item("2".into(), 11),
        ];

        let json = serde_json::to_string(&items).unwrap();
        let parsed: Vec<QueueItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, items);
    }

    #[test]
    fn missing_optional_fields_default() {
        let item: QueueItem = serde_json::from_str(
            r#"{"id": "x", "type": "t", "payload": {}, "timestamp": 5}"#,
        )
        .unwrap();
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.priority, 0);
    }
}
