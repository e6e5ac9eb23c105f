/// Process-wide "currently publishing" state
///
/// Readers (e.g. the record-detail view) consult this to pause their own
/// refetching while their subject operator is mid-publish, so they never
/// observe a half-committed snapshot. Tracked as a set of in-flight IDs;
/// the per-ID predicate is what readers pause on, so publishes of
/// unrelated operators never mask each other.
use std::collections::HashSet;
use std::sync::RwLock;

/// Set of operator IDs with a publish currently in flight
#[derive(Debug, Default)]
pub struct PublishingState {
    publishing: RwLock<HashSet<String>>,
}

impl PublishingState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a publish for this operator is in flight
    pub fn set_publishing(&self, operator_id: &str) {
        match self.publishing.write() {
            Ok(mut set) => {
                set.insert(operator_id.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(operator_id.to_string());
            }
        }
    }

    /// Record that the publish for this operator has finished
    pub fn clear_publishing(&self, operator_id: &str) {
        match self.publishing.write() {
            Ok(mut set) => {
                set.remove(operator_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(operator_id);
            }
        }
    }

    /// Whether a publish for this operator is in flight
    pub fn is_publishing(&self, operator_id: &str) -> bool {
        match self.publishing.read() {
            Ok(set) => set.contains(operator_id),
            Err(poisoned) => poisoned.into_inner().contains(operator_id),
        }
    }

    /// Whether any publish is in flight
    pub fn is_any_publishing(&self) -> bool {
        match self.publishing.read() {
            Ok(set) => !set.is_empty(),
            Err(poisoned) => !poisoned.into_inner().is_empty(),
        }
    }

    /// IDs of all operators with a publish in flight
    pub fn publishing_ids(&self) -> Vec<String> {
        match self.publishing.read() {
            Ok(set) => set.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let state = PublishingState::new();
        assert!(!state.is_publishing("op-1"));
        assert!(!state.is_any_publishing());

        state.set_publishing("op-1");
        assert!(state.is_publishing("op-1"));
        assert!(state.is_any_publishing());

        state.clear_publishing("op-1");
        assert!(!state.is_publishing("op-1"));
        assert!(!state.is_any_publishing());
    }

    #[test]
    fn test_concurrent_publishes_do_not_mask_each_other() {
        let state = PublishingState::new();
        state.set_publishing("op-1");
        state.set_publishing("op-2");

        // Both remain visible; clearing one leaves the other
        assert!(state.is_publishing("op-1"));
        assert!(state.is_publishing("op-2"));

        state.clear_publishing("op-2");
        assert!(state.is_publishing("op-1"));
        assert!(!state.is_publishing("op-2"));
    }
}
