//! Per-folder sort and write-back.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::comparator::Comparator;
use crate::config::TypePriorities;
use crate::error::{AutosortError, Result};
use crate::exclusion::ExclusionResolver;
use crate::item::{Children, ItemId};
use crate::load::ItemLoader;
use crate::store::{AnnotationStore, BookmarkStore};

/// Outcome of sorting one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortResult {
    pub folder: ItemId,
    /// At least one child changed position.
    pub moved: bool,
    /// Positions successfully written.
    pub written: usize,
    pub failed_writes: usize,
    /// The folder was no longer sortable when the task ran.
    pub skipped: bool,
}

impl SortResult {
    fn skipped(folder: ItemId) -> Self {
        Self {
            folder,
            skipped: true,
            ..Default::default()
        }
    }
}

/// Sorts a single folder's direct children with a fixed comparator.
#[derive(Clone)]
pub struct SortExecutor {
    store: Arc<dyn BookmarkStore>,
    annotations: Arc<dyn AnnotationStore>,
    comparator: Arc<Comparator>,
    priorities: TypePriorities,
}

impl SortExecutor {
    pub fn new(
        store: Arc<dyn BookmarkStore>,
        annotations: Arc<dyn AnnotationStore>,
        comparator: Arc<Comparator>,
        priorities: TypePriorities,
    ) -> Self {
        Self {
            store,
            annotations,
            comparator,
            priorities,
        }
    }

    /// Sort `folder` and persist the new positions if anything moved.
    ///
    /// Exclusion flags are checked again here since they may have changed
    /// after the folder was enumerated.
    pub fn sort_folder(&self, folder: ItemId) -> Result<SortResult> {
        let resolver = ExclusionResolver::new(self.store.as_ref(), self.annotations.as_ref());
        if !self.store.exists(folder) || !resolver.is_sortable(folder) {
            debug!("Skipping folder {}", folder);
            return Ok(SortResult::skipped(folder));
        }

        let loader = ItemLoader::new(self.store.as_ref(), self.annotations.as_ref(), self.priorities);
        let mut children = loader.children(folder)?;
        sort_children(&self.comparator, &mut children);

        let mut result = SortResult {
            folder,
            moved: children.has_move(),
            ..Default::default()
        };
        if !result.moved {
            return Ok(result);
        }

        let mut order: Vec<_> = children.items().collect();
        order.sort_by_key(|item| item.index);
        for item in order {
            match self.store.set_index(item.id, item.index) {
                Ok(()) => result.written += 1,
                Err(source) => {
                    let err = AutosortError::StoreWrite {
                        id: item.id,
                        index: item.index,
                        source,
                    };
                    warn!("{}", err);
                    result.failed_writes += 1;
                }
            }
        }
        debug!(
            "Sorted folder {}: {} written, {} failed",
            folder, result.written, result.failed_writes
        );
        Ok(result)
    }
}

/// Stable-sort each group and renumber it after the groups before it.
///
/// Group `k` starts right after the separator closing group `k - 1`, so
/// separators keep their positions.
pub fn sort_children(comparator: &Comparator, children: &mut Children) {
    let mut offset = 0;
    for group in &mut children.groups {
        comparator.sort(group);
        for (rank, item) in group.iter_mut().enumerate() {
            item.set_index(offset + rank);
        }
        offset += group.len() + 1;
    }
}
