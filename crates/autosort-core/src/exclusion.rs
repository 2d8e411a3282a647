//! Folder exclusion flags and sortable-folder enumeration.
//!
//! A folder is excluded by its `donotsort` annotation. Adding `recursive`
//! on top excludes the whole subtree, and only that combination stops
//! enumeration from descending. Annotation read failures count as "flag
//! absent".

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::item::ItemId;
use crate::store::{
    AnnotationStore, BookmarkStore, NodeType, RootKind, DO_NOT_SORT_ANNOTATION, FEED_ANNOTATION,
    RECURSIVE_ANNOTATION,
};

/// One row of the folder exclusion editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderExclusion {
    pub id: ItemId,
    pub title: String,
    pub excluded: bool,
    pub recursively_excluded: bool,
}

/// Answers exclusion questions against a pair of stores.
#[derive(Clone, Copy)]
pub struct ExclusionResolver<'a> {
    store: &'a dyn BookmarkStore,
    annotations: &'a dyn AnnotationStore,
}

impl<'a> ExclusionResolver<'a> {
    pub fn new(store: &'a dyn BookmarkStore, annotations: &'a dyn AnnotationStore) -> Self {
        Self { store, annotations }
    }

    fn flag(&self, id: ItemId, name: &str) -> bool {
        match self.annotations.has(id, name) {
            Ok(present) => present,
            Err(e) => {
                debug!("Treating unreadable annotation {} on {} as absent: {}", name, id, e);
                false
            }
        }
    }

    pub fn has_do_not_sort(&self, id: ItemId) -> bool {
        self.flag(id, DO_NOT_SORT_ANNOTATION)
    }

    pub fn has_recursive(&self, id: ItemId) -> bool {
        self.flag(id, RECURSIVE_ANNOTATION)
    }

    pub fn is_feed_folder(&self, id: ItemId) -> bool {
        self.flag(id, FEED_ANNOTATION)
    }

    /// Both `donotsort` and `recursive` are set on `id`.
    pub fn is_recursively_excluded(&self, id: ItemId) -> bool {
        self.has_do_not_sort(id) && self.has_recursive(id)
    }

    /// Whether `id` or any of its ancestors is recursively excluded.
    pub fn has_ancestor_excluded(&self, id: ItemId) -> bool {
        let mut current = Some(id);
        while let Some(folder) = current {
            if self.is_recursively_excluded(folder) {
                return true;
            }
            current = match self.store.parent_of(folder) {
                Ok(parent) => parent,
                Err(e) => {
                    debug!("Stopping ancestor walk at {}: {}", folder, e);
                    None
                }
            };
        }
        false
    }

    pub fn is_sortable(&self, folder: ItemId) -> bool {
        !self.store.is_root(folder)
            && !self.has_do_not_sort(folder)
            && !self.has_ancestor_excluded(folder)
    }

    /// Lazily enumerate sortable folders under `root` (inclusive), in pre-order.
    pub fn sortable_folders(&self, root: ItemId) -> SortableFolders<'a> {
        let stack = if self.has_ancestor_excluded(root) {
            Vec::new()
        } else {
            vec![root]
        };
        SortableFolders {
            resolver: *self,
            stack,
        }
    }

    /// Direct child folders of `parent`, feed folders omitted.
    fn child_folder_ids(&self, parent: ItemId) -> Result<Vec<(ItemId, String)>, StoreError> {
        Ok(self
            .store
            .children(parent)?
            .into_iter()
            .filter(|r| r.node_type == NodeType::Folder && !self.is_feed_folder(r.id))
            .map(|r| (r.id, r.title.unwrap_or_default()))
            .collect())
    }

    fn describe(&self, id: ItemId, title: String) -> FolderExclusion {
        FolderExclusion {
            id,
            title,
            excluded: self.has_do_not_sort(id),
            recursively_excluded: self.has_recursive(id),
        }
    }

    pub fn child_folders(&self, parent: ItemId) -> Result<Vec<FolderExclusion>, StoreError> {
        Ok(self
            .child_folder_ids(parent)?
            .into_iter()
            .map(|(id, title)| self.describe(id, title))
            .collect())
    }

    pub fn root_folders(&self) -> Vec<FolderExclusion> {
        RootKind::ALL
            .iter()
            .map(|kind| self.describe(self.store.root_folder(*kind), kind.display_name().to_string()))
            .collect()
    }

    /// Include (`true`) or exclude (`false`) a folder.
    pub fn set_sortable(&self, id: ItemId, sortable: bool) -> Result<(), StoreError> {
        if !self.store.exists(id) {
            return Err(StoreError::NotFound(id));
        }
        if sortable {
            self.annotations.remove(id, DO_NOT_SORT_ANNOTATION)
        } else {
            self.annotations.set(id, DO_NOT_SORT_ANNOTATION, "true")
        }
    }

    pub fn set_recursive(&self, id: ItemId, recursive: bool) -> Result<(), StoreError> {
        if !self.store.exists(id) {
            return Err(StoreError::NotFound(id));
        }
        if recursive {
            self.annotations.set(id, RECURSIVE_ANNOTATION, "true")
        } else {
            self.annotations.remove(id, RECURSIVE_ANNOTATION)
        }
    }
}

/// Pre-order iterator returned by [`ExclusionResolver::sortable_folders`].
///
/// Folders excluded only by `donotsort` are not yielded but their children
/// still are.
pub struct SortableFolders<'a> {
    resolver: ExclusionResolver<'a>,
    stack: Vec<ItemId>,
}

impl Iterator for SortableFolders<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        while let Some(folder) = self.stack.pop() {
            if self.resolver.is_recursively_excluded(folder) {
                continue;
            }

            match self.resolver.child_folder_ids(folder) {
                Ok(children) => self
                    .stack
                    .extend(children.into_iter().rev().map(|(id, _)| id)),
                Err(e) => debug!("Not descending into {}: {}", folder, e),
            }

            if !self.resolver.store.is_root(folder) && !self.resolver.has_do_not_sort(folder) {
                return Some(folder);
            }
        }
        None
    }
}
