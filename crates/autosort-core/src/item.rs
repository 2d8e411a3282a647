//! Bookmark tree items.
//!
//! Items are built from store records right before a read or a sort and are
//! never cached across passes; the store stays the source of truth.

use serde::{Deserialize, Serialize};

/// Store-assigned item identifier.
pub type ItemId = i64;

/// Content shared by every non-separator item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub title: String,
    pub url: String,
    pub description: String,
    pub keyword: String,
    pub date_added: i64,
    pub last_modified: i64,
    pub last_visited: i64,
    pub access_count: i64,
    /// Orders item kinds relative to each other before any content key.
    pub type_priority: i32,
    /// Set when a mandatory field could not be read from the store.
    pub corrupted: bool,
}

/// Closed set of item kinds, each carrying its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Separator,
    Bookmark(Entry),
    Folder(Entry),
    /// Folder whose children come from a feed; never traversed.
    FeedFolder(Entry),
    /// Virtual bookmark backed by a saved query; never traversed.
    QueryBookmark(Entry),
}

impl ItemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Separator => "separator",
            ItemKind::Bookmark(_) => "bookmark",
            ItemKind::Folder(_) => "folder",
            ItemKind::FeedFolder(_) => "feed-folder",
            ItemKind::QueryBookmark(_) => "query-bookmark",
        }
    }
}

/// One node of the bookmark tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub parent_id: ItemId,
    /// Position among siblings, separators included.
    pub index: usize,
    /// Position captured when the item was loaded.
    pub previous_index: usize,
    pub kind: ItemKind,
}

impl Item {
    pub fn new(id: ItemId, parent_id: ItemId, index: usize, kind: ItemKind) -> Self {
        Self {
            id,
            parent_id,
            index,
            previous_index: index,
            kind,
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match &self.kind {
            ItemKind::Separator => None,
            ItemKind::Bookmark(entry)
            | ItemKind::Folder(entry)
            | ItemKind::FeedFolder(entry)
            | ItemKind::QueryBookmark(entry) => Some(entry),
        }
    }

    pub fn title(&self) -> &str {
        self.entry().map(|e| e.title.as_str()).unwrap_or("")
    }

    pub fn is_separator(&self) -> bool {
        matches!(self.kind, ItemKind::Separator)
    }

    /// True only for plain folders; feed folders sort as their own kind.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder(_))
    }

    pub fn is_corrupted(&self) -> bool {
        self.entry().map(|e| e.corrupted).unwrap_or(false)
    }

    /// Assign a new position, keeping the loaded one in `previous_index`.
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn has_moved(&self) -> bool {
        self.index != self.previous_index
    }
}

/// Direct children of one folder, split into groups at separators.
///
/// A group is a maximal run of non-separator siblings; `groups.len()` is
/// always `separators.len() + 1`, empty groups included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children {
    pub folder: ItemId,
    pub groups: Vec<Vec<Item>>,
    pub separators: Vec<Item>,
}

impl Children {
    /// Partition children given in store order.
    pub fn partition(folder: ItemId, items: impl IntoIterator<Item = Item>) -> Self {
        let mut groups = vec![Vec::new()];
        let mut separators = Vec::new();

        for item in items {
            if item.is_separator() {
                separators.push(item);
                groups.push(Vec::new());
            } else if let Some(group) = groups.last_mut() {
                group.push(item);
            }
        }

        Self {
            folder,
            groups,
            separators,
        }
    }

    /// Iterate over every non-separator child, group by group.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.groups.iter().flatten()
    }

    pub fn has_move(&self) -> bool {
        self.items().any(Item::has_moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(id: ItemId, index: usize, title: &str) -> Item {
        Item::new(
            id,
            1,
            index,
            ItemKind::Bookmark(Entry {
                title: title.into(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn set_index_keeps_previous() {
        let mut item = bookmark(10, 2, "a");
        assert!(!item.has_moved());
        item.set_index(0);
        assert_eq!(item.previous_index, 2);
        assert!(item.has_moved());
        item.set_index(2);
        assert!(!item.has_moved());
    }

    #[test]
    fn partition_splits_at_separators() {
        let items = vec![
            bookmark(10, 0, "b"),
            bookmark(11, 1, "a"),
            Item::new(12, 1, 2, ItemKind::Separator),
            Item::new(13, 1, 3, ItemKind::Separator),
            bookmark(14, 4, "c"),
        ];
        let children = Children::partition(1, items);
        assert_eq!(children.groups.len(), 3);
        assert_eq!(children.separators.len(), 2);
        assert_eq!(children.groups[0].len(), 2);
        assert!(children.groups[1].is_empty());
        assert_eq!(children.groups[2][0].id, 14);
    }

    #[test]
    fn only_plain_folders_are_folders() {
        let folder = Item::new(1, 0, 0, ItemKind::Folder(Entry::default()));
        let feed = Item::new(2, 0, 1, ItemKind::FeedFolder(Entry::default()));
        assert!(folder.is_folder());
        assert!(!feed.is_folder());
        assert_eq!(feed.kind.name(), "feed-folder");
    }
}
