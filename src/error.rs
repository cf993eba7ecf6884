use thiserror::Error;

/// Errors surfaced by [`crate::explorer::StorageExplorer`].
///
/// Validation errors (`NameConflict`, `InvalidName`) are raised before any
/// remote call is issued. Per-object failures inside a batch never show up
/// here; they are collected in the operation's report instead.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("The name {0} already exists in the current directory. Please use a different name.")]
    NameConflict(String),
    #[error("{0}")]
    InvalidName(String),
    #[error("No bucket is selected")]
    NoBucketSelected,
    #[error("Column {0} does not exist")]
    ColumnOutOfRange(usize),
    #[error("Another operation is already working on {0}")]
    PathBusy(String),
    #[error("Folder {path} is nested deeper than {limit} levels")]
    TraversalTooDeep { path: String, limit: usize },
    #[error("Failed to retrieve all files within folder {path}: {message}")]
    Traversal { path: String, message: String },
    #[error("The listing was aborted by a newer navigation")]
    Aborted,
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

pub type Result<T, E = ExplorerError> = std::result::Result<T, E>;
