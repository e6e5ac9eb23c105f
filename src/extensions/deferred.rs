/// Deferred-save queue for extension writes
///
/// While an editing surface is active, or while an operator is locked for
/// publishing, incoming extension saves are buffered here instead of being
/// written immediately. Slots are keyed by operator and type; the last
/// buffered payload per slot wins, and buffering for one operator never
/// displaces another's. Deactivating the surface flushes whichever slots
/// are populated. This keeps extension writes from landing mid-snapshot
/// generation.
use crate::models::{Bonus, Faq, Feature, PaymentMethod, Security};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Buffered payloads, one slot per (operator, type) pair
#[derive(Debug, Default)]
pub struct PendingSaves {
    pub bonuses: HashMap<String, Vec<Bonus>>,
    pub payment_methods: HashMap<String, Vec<PaymentMethod>>,
    pub features: HashMap<String, Vec<Feature>>,
    pub security: HashMap<String, Security>,
    pub faqs: HashMap<String, Vec<Faq>>,
}

impl PendingSaves {
    /// Number of populated slots
    pub fn len(&self) -> usize {
        self.bonuses.len()
            + self.payment_methods.len()
            + self.features.len()
            + self.security.len()
            + self.faqs.len()
    }

    /// Whether no slots are populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate outcome of flushing the queue
#[derive(Debug, Default)]
pub struct FlushReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
}

impl FlushReport {
    /// Whether every flushed slot was written
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-operator, per-type buffering of extension saves
#[derive(Debug, Default)]
pub struct DeferredSaveQueue {
    active: AtomicBool,
    pending: Mutex<PendingSaves>,
}

impl DeferredSaveQueue {
    /// Create an inactive queue with empty slots
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an editing surface has marked itself active
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the editing surface active or inactive. The caller flushes the
    /// queue after deactivating.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        debug!("Deferred save queue active = {}", active);
    }

    /// Buffer a bonuses save, replacing the operator's previously buffered
    /// payload
    pub fn buffer_bonuses(&self, operator_id: &str, rows: Vec<Bonus>) {
        self.with_pending(|p| {
            p.bonuses.insert(operator_id.to_string(), rows);
        });
    }

    /// Buffer a payment-methods save
    pub fn buffer_payment_methods(&self, operator_id: &str, rows: Vec<PaymentMethod>) {
        self.with_pending(|p| {
            p.payment_methods.insert(operator_id.to_string(), rows);
        });
    }

    /// Buffer a features save
    pub fn buffer_features(&self, operator_id: &str, rows: Vec<Feature>) {
        self.with_pending(|p| {
            p.features.insert(operator_id.to_string(), rows);
        });
    }

    /// Buffer a security save
    pub fn buffer_security(&self, operator_id: &str, row: Security) {
        self.with_pending(|p| {
            p.security.insert(operator_id.to_string(), row);
        });
    }

    /// Buffer a FAQs save
    pub fn buffer_faqs(&self, operator_id: &str, rows: Vec<Faq>) {
        self.with_pending(|p| {
            p.faqs.insert(operator_id.to_string(), rows);
        });
    }

    /// Drain all slots, leaving the queue empty
    pub fn take_all(&self) -> PendingSaves {
        self.with_pending(std::mem::take)
    }

    /// Number of populated slots
    pub fn pending_count(&self) -> usize {
        self.with_pending(|p| p.len())
    }

    fn with_pending<R>(&self, f: impl FnOnce(&mut PendingSaves) -> R) -> R {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut pending)
    }
}
