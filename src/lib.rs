/// Operator content publishing service
///
/// Takes draft operator records plus their extension tables and atomically
/// promotes them into immutable published snapshots served to public
/// pages, with per-operator locking, bounded retries, deferred extension
/// writes, and snapshot-or-fallback reads.
pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod extensions;
pub mod models;
pub mod operators;
pub mod publishing;
pub mod reader;
pub mod server;
pub mod snapshot;
