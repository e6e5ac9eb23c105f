/// Extension record sets owned by an operator: bonuses, payment methods,
/// features, security info, and FAQs
pub mod deferred;
pub mod store;

pub use deferred::{DeferredSaveQueue, FlushReport};
pub use store::ExtensionStore;
