/// Snapshot generation: denormalized public views and derived SEO data
pub mod generator;
pub mod seo;
pub mod store;

pub use generator::{Snapshot, StaticContentGenerator};
pub use seo::{compute_seo, SeoData};
pub use store::SnapshotStore;
