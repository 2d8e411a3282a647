//! Capability interfaces for the bookmark and annotation stores.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::item::ItemId;

/// Excludes a folder from sorting.
pub const DO_NOT_SORT_ANNOTATION: &str = "autosortbookmarks/donotsort";
/// Combined with [`DO_NOT_SORT_ANNOTATION`], excludes the whole subtree.
pub const RECURSIVE_ANNOTATION: &str = "autosortbookmarks/recursive";
pub const DESCRIPTION_ANNOTATION: &str = "bookmarkProperties/description";
/// Marks a folder as a feed folder.
pub const FEED_ANNOTATION: &str = "livemark/feedURI";
/// Marks a bookmark as a saved-query bookmark.
pub const QUERY_ANNOTATION: &str = "Places/SmartBookmark";

/// Node type as reported by the bookmark store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    #[default]
    Bookmark,
    Folder,
    Separator,
    /// Bookmark whose URL is a saved query.
    Query,
}

/// Raw child record returned by [`BookmarkStore::children`].
///
/// `None` marks a field the store could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: ItemId,
    pub parent_id: ItemId,
    pub index: usize,
    pub node_type: NodeType,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date_added: Option<i64>,
    pub last_modified: Option<i64>,
    pub last_visited: Option<i64>,
    pub access_count: Option<i64>,
}

impl NodeRecord {
    pub fn separator(id: ItemId, parent_id: ItemId, index: usize) -> Self {
        Self {
            id,
            parent_id,
            index,
            node_type: NodeType::Separator,
            title: None,
            url: None,
            date_added: None,
            last_modified: None,
            last_visited: None,
            access_count: None,
        }
    }
}

/// Top-level containers shown to the folder exclusion editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    Menu,
    Toolbar,
    Unsorted,
}

impl RootKind {
    pub const ALL: [RootKind; 3] = [RootKind::Menu, RootKind::Toolbar, RootKind::Unsorted];

    pub fn display_name(&self) -> &'static str {
        match self {
            RootKind::Menu => "Bookmarks Menu",
            RootKind::Toolbar => "Bookmarks Toolbar",
            RootKind::Unsorted => "Unsorted Bookmarks",
        }
    }
}

/// Change notifications published by the bookmark store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    Created { id: ItemId, parent_id: ItemId },
    Changed { id: ItemId },
    Moved { id: ItemId, parent_id: ItemId, index: usize },
    Removed { id: ItemId, parent_id: ItemId },
    ChildrenReordered { parent_id: ItemId },
    ImportBegan,
    ImportEnded,
}

impl StoreEvent {
    /// Whether the event brackets a bulk import rather than a tree change.
    pub fn is_import_marker(&self) -> bool {
        matches!(self, StoreEvent::ImportBegan | StoreEvent::ImportEnded)
    }
}

/// The bookmark store the sorter reads from and writes positions to.
pub trait BookmarkStore: Send + Sync {
    /// Direct children of `folder`, in store order.
    fn children(&self, folder: ItemId) -> Result<Vec<NodeRecord>, StoreError>;

    /// Move an item to `index` among its siblings.
    fn set_index(&self, id: ItemId, index: usize) -> Result<(), StoreError>;

    /// Parent folder of `id`, `None` for the tree root.
    fn parent_of(&self, id: ItemId) -> Result<Option<ItemId>, StoreError>;

    /// The designated root container holding the top-level folders.
    fn places_root(&self) -> ItemId;

    /// Identifier of a top-level container.
    fn root_folder(&self, kind: RootKind) -> ItemId;

    /// Whether an item with this id exists.
    fn exists(&self, id: ItemId) -> bool;

    /// Keyword assigned to a bookmark, if any.
    fn keyword_for(&self, id: ItemId) -> Result<Option<String>, StoreError>;

    /// Whether `id` is the designated root container.
    fn is_root(&self, id: ItemId) -> bool {
        id == self.places_root()
    }
}

/// Named per-item annotations (exclusion flags, feed and query markers).
pub trait AnnotationStore: Send + Sync {
    fn get(&self, id: ItemId, name: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, id: ItemId, name: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, id: ItemId, name: &str) -> Result<(), StoreError>;

    fn has(&self, id: ItemId, name: &str) -> Result<bool, StoreError> {
        Ok(self.get(id, name)?.is_some())
    }
}
