/// Application context and dependency wiring
use crate::{
    config::ServerConfig,
    db,
    error::PublishResult,
    extensions::{DeferredSaveQueue, ExtensionStore},
    operators::OperatorStore,
    publishing::{LockRegistry, PublishCoordinator, PublishQueue, PublishingState},
    reader::PublicContentReader,
    snapshot::{SnapshotStore, StaticContentGenerator},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub content_db: SqlitePool,
    pub locks: Arc<LockRegistry>,
    pub publishing_state: Arc<PublishingState>,
    pub publish_queue: Arc<PublishQueue>,
    pub operators: OperatorStore,
    pub extensions: Arc<ExtensionStore>,
    pub snapshots: SnapshotStore,
    pub coordinator: Arc<PublishCoordinator>,
    pub reader: PublicContentReader,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> PublishResult<Self> {
        config.validate()?;

        let content_db = db::create_pool(
            &config.storage.content_db,
            db::DatabaseOptions::default(),
        )
        .await?;
        db::run_migrations(&content_db).await?;
        db::test_connection(&content_db).await?;

        Ok(Self::from_pool(config, content_db))
    }

    /// Wire services over an existing pool (used directly by tests)
    pub fn from_pool(config: ServerConfig, content_db: SqlitePool) -> Self {
        let locks = Arc::new(LockRegistry::new());
        let publishing_state = Arc::new(PublishingState::new());
        let publish_queue = Arc::new(PublishQueue::new(config.publishing.clone()));

        let deferred = Arc::new(DeferredSaveQueue::new());
        let extensions = Arc::new(ExtensionStore::new(
            content_db.clone(),
            Arc::clone(&locks),
            deferred,
        ));

        let operators = OperatorStore::new(content_db.clone());
        let snapshots = SnapshotStore::new(content_db.clone());
        let generator =
            StaticContentGenerator::new(content_db.clone(), Arc::clone(&extensions));

        let coordinator = Arc::new(PublishCoordinator::new(
            operators.clone(),
            generator,
            snapshots.clone(),
            Arc::clone(&locks),
            Arc::clone(&publishing_state),
        ));

        let reader = PublicContentReader::new(
            content_db.clone(),
            snapshots.clone(),
            operators.clone(),
            Arc::clone(&extensions),
        );

        Self {
            config: Arc::new(config),
            content_db,
            locks,
            publishing_state,
            publish_queue,
            operators,
            extensions,
            snapshots,
            coordinator,
            reader,
        }
    }

    /// Queue-wrapped publish: the entry point UI surfaces call.
    ///
    /// `None` means the attempt was rejected (already in flight, retry
    /// budget exhausted) or failed; the queue records the user-facing
    /// message either way.
    pub async fn publish_operator(
        &self,
        operator_id: &str,
    ) -> Option<crate::snapshot::Snapshot> {
        let coordinator = Arc::clone(&self.coordinator);
        let id = operator_id.to_string();
        let result = self
            .publish_queue
            .run(operator_id, "publish", move || async move {
                coordinator.publish(&id).await
            })
            .await;

        // Saves that arrived while the operator was locked sat in the
        // deferred queue; write them out now that the lock is gone. An
        // active editing surface keeps its own buffering until it
        // deactivates.
        if !self.extensions.deferred().is_active() {
            if let Err(e) = self.extensions.flush_deferred().await {
                warn!("Deferred save flush after publish failed: {}", e);
            }
        }

        result
    }
}
