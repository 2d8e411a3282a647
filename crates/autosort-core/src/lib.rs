//! Autosort Core - keeps a bookmark tree continuously sorted
//!
//! - **Item**: typed tree nodes (bookmark, separator, folder, feed folder, query bookmark)
//! - **Collate**: natural-order, accent-folding string comparison
//! - **Comparator**: multi-key sibling ordering compiled from [`SortCriteria`]
//! - **Exclusion**: per-folder `donotsort` / `recursive` flags and folder enumeration
//! - **Executor**: sorts one folder group by group, writing back only on change
//! - **Scheduler**: debounces change notifications into single sort passes
//! - **Store**: traits for the bookmark and annotation stores, plus in-memory versions
//! - **Config**: user preferences and scheduler timing
//!
//! # Data flow
//!
//! ```text
//! store events → Scheduler (dirty) → tick → ExclusionResolver → SortExecutor × N
//! ```

pub mod collate;
pub mod comparator;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod executor;
pub mod item;
pub mod load;
pub mod memory;
pub mod scheduler;
pub mod store;

pub use collate::{CollationKey, Collator};
pub use comparator::{domain_reversed, Comparator, SortCriteria, SortKey};
pub use config::{InstallState, PreferenceFile, Preferences, SchedulerConfig, TypePriorities};
pub use error::{AutosortError, ConfigError, Result, StoreError};
pub use exclusion::{ExclusionResolver, FolderExclusion, SortableFolders};
pub use executor::{sort_children, SortExecutor, SortResult};
pub use item::{Children, Entry, Item, ItemId, ItemKind};
pub use load::ItemLoader;
pub use memory::{MemoryAnnotationStore, MemoryBookmarkStore, NewNode, Snapshot, TreeNode};
pub use scheduler::{PassReport, Scheduler, SchedulerState};
pub use store::{
    AnnotationStore, BookmarkStore, NodeRecord, NodeType, RootKind, StoreEvent,
    DESCRIPTION_ANNOTATION, DO_NOT_SORT_ANNOTATION, FEED_ANNOTATION, QUERY_ANNOTATION,
    RECURSIVE_ANNOTATION,
};
