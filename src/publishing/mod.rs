/// Publishing pipeline: concurrency guards, retry queue, and the coordinator
pub mod coordinator;
pub mod locks;
pub mod queue;
pub mod state;

pub use coordinator::PublishCoordinator;
pub use locks::LockRegistry;
pub use queue::{FailureKind, PublishQueue};
pub use state::PublishingState;
