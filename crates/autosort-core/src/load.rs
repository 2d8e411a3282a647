//! Builds [`Item`]s from raw store records.

use tracing::{debug, warn};

use crate::config::TypePriorities;
use crate::error::StoreError;
use crate::item::{Children, Entry, Item, ItemId, ItemKind};
use crate::store::{
    AnnotationStore, BookmarkStore, NodeRecord, NodeType, DESCRIPTION_ANNOTATION,
    FEED_ANNOTATION, QUERY_ANNOTATION,
};

/// Fields a kind cannot do without.
#[derive(Debug, Clone, Copy)]
enum Required {
    /// Query bookmarks
    Title,
    /// Folders and feed folders
    Dated,
    /// Plain bookmarks
    All,
}

impl Required {
    fn missing_in(self, r: &NodeRecord) -> bool {
        let title = r.title.is_none();
        let dates = r.date_added.is_none() || r.last_modified.is_none();
        let visits = r.url.is_none() || r.last_visited.is_none() || r.access_count.is_none();
        match self {
            Required::Title => title,
            Required::Dated => title || dates,
            Required::All => title || dates || visits,
        }
    }
}

/// Reads one folder's children into typed items.
pub struct ItemLoader<'a> {
    store: &'a dyn BookmarkStore,
    annotations: &'a dyn AnnotationStore,
    priorities: TypePriorities,
}

impl<'a> ItemLoader<'a> {
    pub fn new(
        store: &'a dyn BookmarkStore,
        annotations: &'a dyn AnnotationStore,
        priorities: TypePriorities,
    ) -> Self {
        Self {
            store,
            annotations,
            priorities: priorities.effective(),
        }
    }

    /// Direct children of `folder`, partitioned at separators.
    pub fn children(&self, folder: ItemId) -> Result<Children, StoreError> {
        let records = self.store.children(folder)?;
        Ok(Children::partition(
            folder,
            records.iter().map(|r| self.item(r)),
        ))
    }

    pub fn item(&self, record: &NodeRecord) -> Item {
        let kind = match record.node_type {
            NodeType::Separator => ItemKind::Separator,
            NodeType::Folder => {
                if self.marker(record.id, FEED_ANNOTATION) {
                    ItemKind::FeedFolder(self.entry(
                        record,
                        self.priorities.feed_folder,
                        Required::Dated,
                    ))
                } else {
                    ItemKind::Folder(self.entry(record, self.priorities.folder, Required::Dated))
                }
            }
            NodeType::Bookmark | NodeType::Query => {
                if self.marker(record.id, QUERY_ANNOTATION) {
                    ItemKind::QueryBookmark(self.entry(
                        record,
                        self.priorities.query_bookmark,
                        Required::Title,
                    ))
                } else {
                    ItemKind::Bookmark(self.entry(record, self.priorities.bookmark, Required::All))
                }
            }
        };
        let item = Item::new(record.id, record.parent_id, record.index, kind);
        if item.is_corrupted() {
            warn!(
                "Corrupted {} found. ID: {} - Title: {}",
                item.kind.name(),
                item.id,
                item.title()
            );
        }
        item
    }

    fn marker(&self, id: ItemId, name: &str) -> bool {
        self.annotations.has(id, name).unwrap_or_else(|e| {
            debug!("Treating unreadable annotation {} on {} as absent: {}", name, id, e);
            false
        })
    }

    fn entry(&self, record: &NodeRecord, type_priority: i32, required: Required) -> Entry {
        Entry {
            title: record.title.clone().unwrap_or_default(),
            url: record.url.clone().unwrap_or_default(),
            description: self.description(record.id),
            keyword: self.keyword(record.id),
            date_added: record.date_added.unwrap_or(0),
            last_modified: record.last_modified.unwrap_or(0),
            last_visited: record.last_visited.unwrap_or(0),
            access_count: record.access_count.unwrap_or(0),
            type_priority,
            corrupted: required.missing_in(record),
        }
    }

    fn description(&self, id: ItemId) -> String {
        match self.annotations.get(id, DESCRIPTION_ANNOTATION) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                debug!("No description for {}: {}", id, e);
                String::new()
            }
        }
    }

    fn keyword(&self, id: ItemId) -> String {
        match self.store.keyword_for(id) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                debug!("No keyword for {}: {}", id, e);
                String::new()
            }
        }
    }
}
