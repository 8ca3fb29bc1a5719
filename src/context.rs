//! Application container owning the registry and the write queue.

use std::sync::Arc;

use syncdeck_queue::{
    Dispatcher, FileStorage, HttpDispatcher, QueueStorage, SyncHandle, WriteQueue,
};
use syncdeck_sources::{SourceRegistry, SourceRegistryBuilder};
use tracing::info;

use crate::settings::Settings;
use crate::transforms::register_builtin;

/// The read and write paths wired up from [`Settings`].
///
/// Construct with [`SyncContext::init`] inside a tokio runtime and tear down
/// with [`SyncContext::dispose`].
#[derive(Debug)]
pub struct SyncContext {
    registry: SourceRegistry,
    queue: WriteQueue,
    auto_sync: Option<SyncHandle>,
}

impl SyncContext {
    /// Build the registry with the configured sources, and the queue with file
    /// storage and an HTTP dispatcher, then start auto-sync.
    pub fn init(settings: &Settings) -> Self {
        let queue = &settings.queue;

        let mut dispatcher = HttpDispatcher::builder()
            .base_url(queue.base_url.clone())
            .endpoints(queue.endpoints.clone())
            .timeout(queue.request_timeout);
        if let Some(token) = &queue.token {
            dispatcher = dispatcher.token(token.clone());
        }

        let storage = FileStorage::new(&queue.storage_path);
        info!(path = %storage.path().display(), "queue storage");

        Self::init_with(
            settings,
            register_builtin(SourceRegistry::builder()),
            Arc::new(dispatcher.build()),
            Arc::new(storage),
        )
    }

    /// Like [`init`](Self::init) with the registry builder, dispatcher and
    /// storage supplied by the caller.
    pub fn init_with(
        settings: &Settings,
        registry: SourceRegistryBuilder,
        dispatcher: Arc<dyn Dispatcher>,
        storage: Arc<dyn QueueStorage>,
    ) -> Self {
        let registry = settings
            .sources
            .iter()
            .cloned()
            .fold(registry, SourceRegistryBuilder::source)
            .build();

        let queue_settings = &settings.queue;
        let queue = WriteQueue::builder(dispatcher)
            .storage(storage)
            .max_retries(queue_settings.max_retries)
            .sync_interval(queue_settings.sync_interval)
            .reconnect_delay(queue_settings.reconnect_delay)
            .online(queue_settings.start_online)
            .build();
        let auto_sync = queue.start();

        info!(
            sources = settings.sources.len(),
            pending = queue.status().pending,
            "sync context initialised"
        );

        Self {
            registry,
            queue,
            auto_sync: Some(auto_sync),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Stop auto-sync and dispose the registry. Queued items stay persisted.
    pub fn dispose(mut self) {
        if let Some(handle) = self.auto_sync.take() {
            handle.stop();
        }
        self.registry.dispose();
        info!("sync context disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use syncdeck_queue::{MemoryStorage, NewQueueItem, QueueError, QueueItem};
    use syncdeck_types::{FetchOptions, PollingConfig, SourceConfig, SourceKind};

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait::async_trait]
    impl Dispatcher for Unreachable {
        async fn dispatch(&self, _item: &QueueItem) -> Result<(), QueueError> {
            Err(QueueError::Connection("unreachable".into()))
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.sources = vec![
            SourceConfig::new("targets", SourceKind::Static).body(json!([1, 2, 3])),
            SourceConfig::new("target_count", SourceKind::Static)
                .body(json!([1, 2, 3]))
                .transform("count")
                .polling(PollingConfig::every(Duration::from_secs(5))),
        ];
        settings.queue.start_online = false;
        settings
    }

    #[tokio::test]
    async fn init_registers_sources_with_builtin_transforms() {
        let context = SyncContext::init_with(
            &settings(),
            register_builtin(SourceRegistry::builder()),
            Arc::new(Unreachable),
            Arc::new(MemoryStorage::new()),
        );

        assert_eq!(
            context.registry().source_ids(),
            vec!["target_count".to_string(), "targets".to_string()]
        );
        let response = context
            .registry()
            .fetch("target_count", FetchOptions::default())
            .await;
        assert_eq!(response.data, Some(json!(3)));

        context.dispose();
    }

    #[tokio::test]
    async fn dispose_keeps_queued_writes_persisted() {
        let storage = MemoryStorage::new();
        let context = SyncContext::init_with(
            &settings(),
            SourceRegistry::builder(),
            Arc::new(Unreachable),
            Arc::new(storage.clone()),
        );
        assert!(!context.queue().is_online());

        context
            .queue()
            .enqueue(NewQueueItem::new("kpi_update", json!({"mrr": 1})));
        let registry = context.registry().clone();
        context.dispose();

        assert!(registry.is_disposed());
        let reloaded = WriteQueue::builder(Arc::new(Unreachable))
            .storage(Arc::new(storage))
            .online(false)
            .build();
        assert_eq!(reloaded.pending().len(), 1);
    }
}
