/// Extension store: fetch/save for an operator's extension record sets
///
/// Bonuses, payment methods, and features are wholly owned ordered lists
/// and are replaced atomically inside a transaction. Security is a
/// single-row upsert. FAQs are diff-upserted against their stable IDs so a
/// concurrent reader never observes a transiently empty list, and FAQ
/// saves are deduplicated per operator: a save arriving while one is in
/// flight awaits the same shared future instead of issuing a second write.
use crate::{
    error::{PublishError, PublishResult},
    extensions::deferred::{DeferredSaveQueue, FlushReport},
    models::{is_temp_id, Bonus, Faq, Feature, PaymentMethod, Security},
    publishing::LockRegistry,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

type SharedSave = Shared<BoxFuture<'static, Result<(), String>>>;

/// Fetch/save operations for an operator's extension tables
#[derive(Clone)]
pub struct ExtensionStore {
    db: SqlitePool,
    locks: Arc<LockRegistry>,
    deferred: Arc<DeferredSaveQueue>,
    faq_saves_in_flight: Arc<Mutex<HashMap<String, SharedSave>>>,
}

impl ExtensionStore {
    /// Create a new extension store
    pub fn new(db: SqlitePool, locks: Arc<LockRegistry>, deferred: Arc<DeferredSaveQueue>) -> Self {
        Self {
            db,
            locks,
            deferred,
            faq_saves_in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The deferred queue used while an editing surface is active
    pub fn deferred(&self) -> &Arc<DeferredSaveQueue> {
        &self.deferred
    }

    /// Mark the editing surface active or inactive. Deactivating flushes
    /// any buffered saves and reports the aggregate outcome.
    pub async fn set_editing_active(&self, active: bool) -> PublishResult<FlushReport> {
        self.deferred.set_active(active);
        if active {
            return Ok(FlushReport::default());
        }
        self.flush_deferred().await
    }

    /// Write out every buffered slot concurrently.
    ///
    /// Slots whose operator is still locked for publishing are put back
    /// into the queue instead of being written while the lock is held.
    pub async fn flush_deferred(&self) -> PublishResult<FlushReport> {
        let pending = self.deferred.take_all();
        if pending.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut writes: Vec<BoxFuture<'_, (&'static str, PublishResult<()>)>> = Vec::new();

        for (id, rows) in pending.bonuses {
            if self.locks.is_locked(&id) {
                debug!("Operator {} still locked, keeping bonuses buffered", id);
                self.deferred.buffer_bonuses(&id, rows);
                continue;
            }
            writes.push(
                async move { ("bonuses", self.write_bonuses(&id, rows).await) }.boxed(),
            );
        }
        for (id, rows) in pending.payment_methods {
            if self.locks.is_locked(&id) {
                debug!(
                    "Operator {} still locked, keeping payment methods buffered",
                    id
                );
                self.deferred.buffer_payment_methods(&id, rows);
                continue;
            }
            writes.push(
                async move {
                    (
                        "payment_methods",
                        self.write_payment_methods(&id, rows).await,
                    )
                }
                .boxed(),
            );
        }
        for (id, rows) in pending.features {
            if self.locks.is_locked(&id) {
                debug!("Operator {} still locked, keeping features buffered", id);
                self.deferred.buffer_features(&id, rows);
                continue;
            }
            writes.push(
                async move { ("features", self.write_features(&id, rows).await) }.boxed(),
            );
        }
        for (id, row) in pending.security {
            if self.locks.is_locked(&id) {
                debug!("Operator {} still locked, keeping security buffered", id);
                self.deferred.buffer_security(&id, row);
                continue;
            }
            writes.push(
                async move { ("security", self.write_security(&id, row).await) }.boxed(),
            );
        }
        for (id, rows) in pending.faqs {
            if self.locks.is_locked(&id) {
                debug!("Operator {} still locked, keeping FAQs buffered", id);
                self.deferred.buffer_faqs(&id, rows);
                continue;
            }
            writes.push(async move { ("faqs", self.write_faqs(&id, rows).await) }.boxed());
        }

        if writes.is_empty() {
            return Ok(FlushReport::default());
        }

        let outcomes = futures::future::join_all(writes).await;

        let mut report = FlushReport {
            attempted: outcomes.len(),
            ..FlushReport::default()
        };
        for (label, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!("Deferred {} save failed: {}", label, e);
                    report.failed.push(format!("{}: {}", label, e));
                }
            }
        }
        info!(
            "Flushed deferred saves: {}/{} succeeded",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Whether a save should be buffered instead of written
    fn should_defer(&self, operator_id: &str) -> bool {
        self.deferred.is_active() || self.locks.is_locked(operator_id)
    }

    // ---- Bonuses ----

    /// Fetch bonuses in display order
    pub async fn fetch_bonuses(&self, operator_id: &str) -> PublishResult<Vec<Bonus>> {
        let rows = sqlx::query_as::<_, Bonus>(
            "SELECT id, operator_id, title, description, bonus_type, value, promo_code, order_number
             FROM operator_bonuses
             WHERE operator_id = ?1
             ORDER BY order_number ASC",
        )
        .bind(operator_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Save bonuses, replacing the operator's list
    pub async fn save_bonuses(&self, operator_id: &str, rows: Vec<Bonus>) -> PublishResult<()> {
        if is_temp_id(operator_id) {
            debug!("Skipping bonuses save for temporary operator {}", operator_id);
            return Ok(());
        }
        if self.should_defer(operator_id) {
            info!("Deferring bonuses save for {}", operator_id);
            self.deferred.buffer_bonuses(operator_id, rows);
            return Ok(());
        }
        self.write_bonuses(operator_id, rows).await
    }

    async fn write_bonuses(&self, operator_id: &str, rows: Vec<Bonus>) -> PublishResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM operator_bonuses WHERE operator_id = ?1")
            .bind(operator_id)
            .execute(&mut *tx)
            .await?;

        for bonus in rows {
            sqlx::query(
                "INSERT INTO operator_bonuses
                 (id, operator_id, title, description, bonus_type, value, promo_code, order_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(row_id(&bonus.id))
            .bind(operator_id)
            .bind(&bonus.title)
            .bind(&bonus.description)
            .bind(&bonus.bonus_type)
            .bind(&bonus.value)
            .bind(&bonus.promo_code)
            .bind(bonus.order_number)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ---- Payment methods ----

    /// Fetch payment methods
    pub async fn fetch_payment_methods(
        &self,
        operator_id: &str,
    ) -> PublishResult<Vec<PaymentMethod>> {
        let rows = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, operator_id, method_name, min_amount, max_amount,
                    fee_percentage, fee_fixed, fee_level, processing_time
             FROM operator_payment_methods
             WHERE operator_id = ?1
             ORDER BY method_name ASC",
        )
        .bind(operator_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Save payment methods, replacing the operator's list
    pub async fn save_payment_methods(
        &self,
        operator_id: &str,
        rows: Vec<PaymentMethod>,
    ) -> PublishResult<()> {
        if is_temp_id(operator_id) {
            debug!(
                "Skipping payment methods save for temporary operator {}",
                operator_id
            );
            return Ok(());
        }
        if self.should_defer(operator_id) {
            info!("Deferring payment methods save for {}", operator_id);
            self.deferred.buffer_payment_methods(operator_id, rows);
            return Ok(());
        }
        self.write_payment_methods(operator_id, rows).await
    }

    async fn write_payment_methods(
        &self,
        operator_id: &str,
        rows: Vec<PaymentMethod>,
    ) -> PublishResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM operator_payment_methods WHERE operator_id = ?1")
            .bind(operator_id)
            .execute(&mut *tx)
            .await?;

        for method in rows {
            sqlx::query(
                "INSERT INTO operator_payment_methods
                 (id, operator_id, method_name, min_amount, max_amount,
                  fee_percentage, fee_fixed, fee_level, processing_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(row_id(&method.id))
            .bind(operator_id)
            .bind(&method.method_name)
            .bind(method.min_amount)
            .bind(method.max_amount)
            .bind(method.fee_percentage)
            .bind(method.fee_fixed)
            .bind(&method.fee_level)
            .bind(&method.processing_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ---- Features ----

    /// Fetch features
    pub async fn fetch_features(&self, operator_id: &str) -> PublishResult<Vec<Feature>> {
        let rows = sqlx::query_as::<_, Feature>(
            "SELECT id, operator_id, label, available, highlighted
             FROM operator_features
             WHERE operator_id = ?1
             ORDER BY label ASC",
        )
        .bind(operator_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Save features, replacing the operator's list
    pub async fn save_features(&self, operator_id: &str, rows: Vec<Feature>) -> PublishResult<()> {
        if is_temp_id(operator_id) {
            debug!(
                "Skipping features save for temporary operator {}",
                operator_id
            );
            return Ok(());
        }
        if self.should_defer(operator_id) {
            info!("Deferring features save for {}", operator_id);
            self.deferred.buffer_features(operator_id, rows);
            return Ok(());
        }
        self.write_features(operator_id, rows).await
    }

    async fn write_features(&self, operator_id: &str, rows: Vec<Feature>) -> PublishResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM operator_features WHERE operator_id = ?1")
            .bind(operator_id)
            .execute(&mut *tx)
            .await?;

        for feature in rows {
            sqlx::query(
                "INSERT INTO operator_features (id, operator_id, label, available, highlighted)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(row_id(&feature.id))
            .bind(operator_id)
            .bind(&feature.label)
            .bind(feature.available)
            .bind(feature.highlighted)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ---- Security ----

    /// Fetch the security row, if one exists
    pub async fn fetch_security(&self, operator_id: &str) -> PublishResult<Option<Security>> {
        let row = sqlx::query_as::<_, Security>(
            "SELECT id, operator_id, ssl_enabled, ssl_provider, license_number,
                    license_authority, compliance_certifications, provably_fair,
                    provably_fair_description, complaints_platform, audit_info
             FROM operator_security
             WHERE operator_id = ?1",
        )
        .bind(operator_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Save the security row (single-row upsert keyed by operator ID)
    pub async fn save_security(&self, operator_id: &str, row: Security) -> PublishResult<()> {
        if is_temp_id(operator_id) {
            debug!(
                "Skipping security save for temporary operator {}",
                operator_id
            );
            return Ok(());
        }
        if self.should_defer(operator_id) {
            info!("Deferring security save for {}", operator_id);
            self.deferred.buffer_security(operator_id, row);
            return Ok(());
        }
        self.write_security(operator_id, row).await
    }

    async fn write_security(&self, operator_id: &str, row: Security) -> PublishResult<()> {
        sqlx::query(
            "INSERT INTO operator_security
             (id, operator_id, ssl_enabled, ssl_provider, license_number, license_authority,
              compliance_certifications, provably_fair, provably_fair_description,
              complaints_platform, audit_info)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(operator_id) DO UPDATE SET
                ssl_enabled = excluded.ssl_enabled,
                ssl_provider = excluded.ssl_provider,
                license_number = excluded.license_number,
                license_authority = excluded.license_authority,
                compliance_certifications = excluded.compliance_certifications,
                provably_fair = excluded.provably_fair,
                provably_fair_description = excluded.provably_fair_description,
                complaints_platform = excluded.complaints_platform,
                audit_info = excluded.audit_info",
        )
        .bind(row_id(&row.id))
        .bind(operator_id)
        .bind(row.ssl_enabled)
        .bind(&row.ssl_provider)
        .bind(&row.license_number)
        .bind(&row.license_authority)
        .bind(&row.compliance_certifications)
        .bind(row.provably_fair)
        .bind(&row.provably_fair_description)
        .bind(&row.complaints_platform)
        .bind(&row.audit_info)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    // ---- FAQs ----

    /// Fetch FAQs in display order
    pub async fn fetch_faqs(&self, operator_id: &str) -> PublishResult<Vec<Faq>> {
        let rows = sqlx::query_as::<_, Faq>(
            "SELECT id, operator_id, question, answer, order_number
             FROM operator_faqs
             WHERE operator_id = ?1
             ORDER BY order_number ASC",
        )
        .bind(operator_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Save FAQs via diff-based upsert.
    ///
    /// A save arriving while one is already in flight for the same operator
    /// awaits the in-flight write instead of starting a second one.
    pub async fn save_faqs(&self, operator_id: &str, rows: Vec<Faq>) -> PublishResult<()> {
        if is_temp_id(operator_id) {
            debug!("Skipping FAQs save for temporary operator {}", operator_id);
            return Ok(());
        }
        if self.should_defer(operator_id) {
            info!("Deferring FAQs save for {}", operator_id);
            self.deferred.buffer_faqs(operator_id, rows);
            return Ok(());
        }

        let key = format!("faqs-{}", operator_id);
        let save = {
            let mut in_flight = match self.faq_saves_in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(existing) = in_flight.get(&key) {
                debug!("Joining in-flight FAQs save for {}", operator_id);
                existing.clone()
            } else {
                let db = self.db.clone();
                let id = operator_id.to_string();
                let save = async move {
                    Self::write_faqs_with(&db, &id, rows)
                        .await
                        .map_err(|e| e.to_string())
                }
                .boxed()
                .shared();
                in_flight.insert(key.clone(), save.clone());
                save
            }
        };

        let result = save.clone().await;
        self.release_faq_save(&key, &save);

        result.map_err(PublishError::Internal)
    }

    /// Drop the dedup entry only while it still refers to the awaited
    /// future. Originator and joiners all call this after waking; a late
    /// waker must not evict a newer in-flight save registered under the
    /// same key by a subsequent caller.
    fn release_faq_save(&self, key: &str, save: &SharedSave) {
        let mut in_flight = match self.faq_saves_in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if in_flight
            .get(key)
            .map_or(false, |current| current.ptr_eq(save))
        {
            in_flight.remove(key);
        }
    }

    async fn write_faqs(&self, operator_id: &str, rows: Vec<Faq>) -> PublishResult<()> {
        Self::write_faqs_with(&self.db, operator_id, rows).await
    }

    /// Diff existing vs incoming FAQ IDs and upsert/delete accordingly.
    /// There is deliberately no delete-all step: untouched rows stay put.
    async fn write_faqs_with(
        db: &SqlitePool,
        operator_id: &str,
        rows: Vec<Faq>,
    ) -> PublishResult<()> {
        let existing_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM operator_faqs WHERE operator_id = ?1")
                .bind(operator_id)
                .fetch_all(db)
                .await?;
        let existing: HashSet<String> = existing_ids.into_iter().collect();

        let mut incoming: HashSet<String> = HashSet::new();
        let mut tx = db.begin().await?;

        for faq in rows {
            let id = row_id(&faq.id);
            incoming.insert(id.clone());
            sqlx::query(
                "INSERT INTO operator_faqs (id, operator_id, question, answer, order_number)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    question = excluded.question,
                    answer = excluded.answer,
                    order_number = excluded.order_number",
            )
            .bind(&id)
            .bind(operator_id)
            .bind(&faq.question)
            .bind(&faq.answer)
            .bind(faq.order_number)
            .execute(&mut *tx)
            .await?;
        }

        for stale_id in existing.difference(&incoming) {
            sqlx::query("DELETE FROM operator_faqs WHERE id = ?1 AND operator_id = ?2")
                .bind(stale_id)
                .bind(operator_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Use the row's ID if set, otherwise mint one
fn row_id(id: &str) -> String {
    if id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ExtensionStore {
        let pool = SqlitePool::connect_lazy("sqlite::memory:").expect("pool");
        ExtensionStore::new(
            pool,
            Arc::new(LockRegistry::new()),
            Arc::new(DeferredSaveQueue::new()),
        )
    }

    fn shared_save() -> SharedSave {
        async { Ok::<(), String>(()) }.boxed().shared()
    }

    #[tokio::test]
    async fn test_release_ignores_stale_faq_save() {
        let store = test_store();
        let key = "faqs-op-1";

        let stale = shared_save();
        store
            .faq_saves_in_flight
            .lock()
            .unwrap()
            .insert(key.to_string(), stale.clone());

        // A newer save replaces the entry before the stale waiter wakes
        let newer = shared_save();
        store
            .faq_saves_in_flight
            .lock()
            .unwrap()
            .insert(key.to_string(), newer.clone());

        store.release_faq_save(key, &stale);
        assert!(
            store.faq_saves_in_flight.lock().unwrap().contains_key(key),
            "stale release must not evict the newer in-flight save"
        );

        store.release_faq_save(key, &newer);
        assert!(!store.faq_saves_in_flight.lock().unwrap().contains_key(key));
    }
}
