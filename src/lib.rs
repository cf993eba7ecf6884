#[cfg(feature = "reqwest")]
pub mod client;

// # Storage Explorer: a column browser over prefix-keyed object storage
//
// Buckets hold flat object keys; this crate fabricates folders on top of them
// (including empty ones, through a placeholder object) and performs uploads,
// renames, moves and deletes as batches of independent remote calls while
// keeping a local column view consistent.
//
// Feature flags (`tokio`, `reqwest`) enable the explorer engine with its
// in-process store, and the REST backend respectively.

/// Batch sizes, deadlines and limits. Loadable from JSON and the environment.
pub mod config;

/// Typed errors surfaced by the explorer.
pub mod error;

/// View and sort preferences persisted per project.
pub mod preferences;

/// The `ObjectStore` trait and its backends.
pub mod store;

/// The explorer engine. Enabled with the `tokio` feature.
#[cfg(feature = "tokio")]
pub mod explorer;

pub use config::ExplorerConfig;
pub use error::{ExplorerError, Result};
#[cfg(feature = "tokio")]
pub use explorer::StorageExplorer;
pub use store::ObjectStore;
