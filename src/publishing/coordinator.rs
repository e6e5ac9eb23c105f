/// Publish coordinator
///
/// Orchestrates one publish attempt: validate, lock, generate, commit the
/// snapshot, then commit the primary record. Step ordering is the core
/// correctness property: the snapshot commit strictly precedes flipping
/// `published`, so a visible operator always has a snapshot. Lock and
/// publishing-state cleanup run on every exit path.
use crate::{
    error::{PublishError, PublishResult},
    models::Operator,
    operators::OperatorStore,
    publishing::{LockRegistry, PublishingState},
    snapshot::{compute_seo, Snapshot, SnapshotStore, StaticContentGenerator},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// End-to-end publish orchestration
#[derive(Clone)]
pub struct PublishCoordinator {
    operators: OperatorStore,
    generator: StaticContentGenerator,
    snapshots: SnapshotStore,
    locks: Arc<LockRegistry>,
    state: Arc<PublishingState>,
}

/// Releases the lock and publishing state when dropped.
///
/// Cleanup must survive cancellation: the queue races the publish future
/// against a timeout and drops it at its current await point when the
/// timeout fires, so ordinary code after the `.await` never runs on that
/// path. A leaked lock would park every extension save for the operator.
struct PublishGuard {
    operator_id: String,
    locks: Arc<LockRegistry>,
    state: Arc<PublishingState>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        self.locks.unlock(&self.operator_id);
        self.state.clear_publishing(&self.operator_id);
    }
}

impl PublishCoordinator {
    /// Create a new coordinator
    pub fn new(
        operators: OperatorStore,
        generator: StaticContentGenerator,
        snapshots: SnapshotStore,
        locks: Arc<LockRegistry>,
        state: Arc<PublishingState>,
    ) -> Self {
        Self {
            operators,
            generator,
            snapshots,
            locks,
            state,
        }
    }

    /// Publish an operator.
    ///
    /// Validation failures occur before any side effect. Once the locked
    /// section is entered, the lock and publishing state are released on
    /// every outcome. No retry happens here; retry policy lives in the
    /// publishing queue.
    pub async fn publish(&self, operator_id: &str) -> PublishResult<Snapshot> {
        let operator = self.operators.get(operator_id).await?.ok_or_else(|| {
            PublishError::NotFound(format!("Operator {} not found", operator_id))
        })?;

        validate_for_publish(&operator)?;

        self.state.set_publishing(operator_id);
        self.locks.lock(operator_id);
        let guard = PublishGuard {
            operator_id: operator_id.to_string(),
            locks: Arc::clone(&self.locks),
            state: Arc::clone(&self.state),
        };
        info!("Publishing operator {} ({})", operator_id, operator.slug);

        let result = self.publish_locked(&operator).await;
        drop(guard);

        match &result {
            Ok(_) => info!("Published operator {} ({})", operator_id, operator.slug),
            Err(e) => error!("Publish failed for operator {}: {}", operator_id, e),
        }

        result
    }

    async fn publish_locked(&self, operator: &Operator) -> PublishResult<Snapshot> {
        // Generating
        let snapshot = self
            .generator
            .generate(&operator.id)
            .await?
            .ok_or_else(|| {
                PublishError::Generation(format!(
                    "No content could be generated for operator {}",
                    operator.id
                ))
            })?;

        // CommittingSnapshot: if this write fails the primary record is
        // untouched and `published` stays false.
        let seo = compute_seo(&snapshot);
        let content_data = serde_json::to_value(&snapshot)
            .map_err(|e| PublishError::Generation(format!("Snapshot serialization: {}", e)))?;
        let seo_data = serde_json::to_value(&seo)
            .map_err(|e| PublishError::Generation(format!("SEO serialization: {}", e)))?;

        self.snapshots
            .upsert(
                &operator.slug,
                &operator.id,
                &content_data,
                &seo_data,
                Utc::now(),
            )
            .await
            .map_err(|e| PublishError::Commit(format!("snapshot write failed: {}", e)))?;

        // CommittingRecord
        if let Err(e) = self.operators.mark_published(&operator.id).await {
            // The snapshot row is now ahead of the record. For a first-time
            // publish the operator is still a draft, and a snapshot with no
            // published record behind it would be served to the public, so
            // remove it. A previously published operator keeps the fresh
            // snapshot; its record already says published.
            if !operator.published {
                if let Err(cleanup_err) = self.snapshots.delete_by_slug(&operator.slug).await {
                    warn!(
                        "Could not remove orphaned snapshot for {}: {}",
                        operator.slug, cleanup_err
                    );
                }
            }
            return Err(PublishError::Commit(format!(
                "record update failed: {}",
                e
            )));
        }

        Ok(snapshot)
    }
}

/// Required-field validation, checked before any side effect
fn validate_for_publish(operator: &Operator) -> PublishResult<()> {
    if operator.name.trim().is_empty() {
        return Err(PublishError::Validation(
            "Operator name is required before publishing".to_string(),
        ));
    }
    if operator.description.trim().is_empty() {
        return Err(PublishError::Validation(
            "Operator description is required before publishing".to_string(),
        ));
    }
    Ok(())
}
