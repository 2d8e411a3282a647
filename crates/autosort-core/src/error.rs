//! Error types for autosort-core

use thiserror::Error;

use crate::item::ItemId;

/// Result type alias for autosort operations
pub type Result<T> = std::result::Result<T, AutosortError>;

/// Main error type for autosort operations
#[derive(Error, Debug)]
pub enum AutosortError {
    /// A store collaborator rejected a read
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A position write was rejected for one item
    #[error("Failed to move item {id} to index {index}: {source}")]
    StoreWrite {
        id: ItemId,
        index: usize,
        #[source]
        source: StoreError,
    },

    /// Preferences failed validation
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A per-folder sort task panicked or was aborted. `folder` is 0 when
    /// the failed task cannot be traced back to its folder.
    #[error("Sort task for folder {folder} failed: {reason}")]
    Task { folder: ItemId, reason: String },
}

/// Errors reported by the bookmark and annotation store collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Item {0} is not a folder")]
    NotAFolder(ItemId),

    #[error("Index {index} out of range for item {id}")]
    InvalidIndex { id: ItemId, index: usize },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Preference validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unknown sort key index {0}")]
    UnknownSortKey(usize),

    #[error("Interval must be greater than zero: {0}")]
    ZeroInterval(&'static str),

    #[error("Invalid preferences: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}
