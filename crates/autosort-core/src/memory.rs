//! In-memory bookmark and annotation stores.
//!
//! Used by the CLI (loaded from a JSON snapshot) and by tests. Every
//! successful position write publishes a [`StoreEvent::Moved`] on the
//! broadcast channel returned by [`MemoryBookmarkStore::subscribe`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::item::ItemId;
use crate::store::{AnnotationStore, BookmarkStore, NodeRecord, NodeType, RootKind, StoreEvent};

const EVENT_CAPACITY: usize = 1024;

/// A node to insert into a [`MemoryBookmarkStore`].
///
/// `None` fields are reported as unreadable by [`BookmarkStore::children`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNode {
    pub node_type: NodeType,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date_added: Option<i64>,
    pub last_modified: Option<i64>,
    pub last_visited: Option<i64>,
    pub access_count: Option<i64>,
    pub keyword: Option<String>,
}

impl NewNode {
    pub fn folder(title: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::Folder,
            title: Some(title.into()),
            date_added: Some(0),
            last_modified: Some(0),
            ..Default::default()
        }
    }

    pub fn bookmark(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::Bookmark,
            title: Some(title.into()),
            url: Some(url.into()),
            date_added: Some(0),
            last_modified: Some(0),
            last_visited: Some(0),
            access_count: Some(0),
            keyword: None,
        }
    }

    pub fn separator() -> Self {
        Self {
            node_type: NodeType::Separator,
            ..Default::default()
        }
    }
}

/// Serializable tree used to load and dump a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    /// A bookmark without a URL loads as corrupted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub date_added: i64,
    pub last_modified: i64,
    pub last_visited: i64,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn to_new_node(&self) -> NewNode {
        NewNode {
            node_type: self.node_type,
            title: Some(self.title.clone()),
            url: self.url.clone(),
            date_added: Some(self.date_added),
            last_modified: Some(self.last_modified),
            last_visited: Some(self.last_visited),
            access_count: Some(self.access_count),
            keyword: self.keyword.clone(),
        }
    }
}

/// The three top-level containers and everything under them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub menu: TreeNode,
    pub toolbar: TreeNode,
    pub unsorted: TreeNode,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<ItemId>,
    fields: NewNode,
    children: Vec<ItemId>,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<ItemId, Node>,
    next_id: ItemId,
    places_root: ItemId,
    roots: [ItemId; 3],
    writes: usize,
}

impl Tree {
    fn node(&self, id: ItemId) -> Result<&Node, StoreError> {
        self.nodes.get(&id).ok_or(StoreError::NotFound(id))
    }

    fn position(&self, id: ItemId) -> Result<(ItemId, usize), StoreError> {
        let parent = self.node(id)?.parent.ok_or(StoreError::NotFound(id))?;
        let index = self
            .node(parent)?
            .children
            .iter()
            .position(|c| *c == id)
            .ok_or(StoreError::NotFound(id))?;
        Ok((parent, index))
    }

    fn insert(&mut self, parent: ItemId, fields: NewNode) -> Result<ItemId, StoreError> {
        let parent_node = self.node(parent)?;
        if parent_node.fields.node_type != NodeType::Folder {
            return Err(StoreError::NotAFolder(parent));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                fields,
                children: Vec::new(),
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        Ok(id)
    }
}

/// Bookmark store kept entirely in memory.
pub struct MemoryBookmarkStore {
    tree: RwLock<Tree>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryBookmarkStore {
    /// Create an empty store with a root container and the three top-level folders.
    pub fn new() -> Self {
        let places_root: ItemId = 1;
        let mut nodes = HashMap::new();
        nodes.insert(
            places_root,
            Node {
                parent: None,
                fields: NewNode::folder(""),
                children: Vec::new(),
            },
        );
        let mut tree = Tree {
            nodes,
            next_id: places_root + 1,
            places_root,
            roots: [0; 3],
            writes: 0,
        };
        for (slot, kind) in RootKind::ALL.iter().enumerate() {
            // The root container is a folder, so this cannot fail.
            if let Ok(id) = tree.insert(places_root, NewNode::folder(kind.display_name())) {
                tree.roots[slot] = id;
            }
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tree: RwLock::new(tree),
            events,
        }
    }

    /// Build a store from a snapshot, recording node annotations in `annotations`.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        annotations: &dyn AnnotationStore,
    ) -> Result<Self, StoreError> {
        let store = Self::new();
        for (kind, root) in [
            (RootKind::Menu, &snapshot.menu),
            (RootKind::Toolbar, &snapshot.toolbar),
            (RootKind::Unsorted, &snapshot.unsorted),
        ] {
            let id = store.root_folder(kind);
            for (name, value) in &root.annotations {
                annotations.set(id, name, value)?;
            }
            for child in &root.children {
                store.insert_tree(id, child, annotations)?;
            }
        }
        Ok(store)
    }

    /// Dump the tree, reading node annotations from `annotations`.
    pub fn to_snapshot(&self, annotations: &MemoryAnnotationStore) -> Result<Snapshot, StoreError> {
        let tree = self.read()?;
        let dump = |kind: RootKind| {
            let id = tree.roots[kind_slot(kind)];
            dump_node(&tree, id, annotations)
        };
        Ok(Snapshot {
            menu: dump(RootKind::Menu)?,
            toolbar: dump(RootKind::Toolbar)?,
            unsorted: dump(RootKind::Unsorted)?,
        })
    }

    /// Insert `node` and its descendants under `parent`.
    pub fn insert_tree(
        &self,
        parent: ItemId,
        node: &TreeNode,
        annotations: &dyn AnnotationStore,
    ) -> Result<ItemId, StoreError> {
        let id = self.insert(parent, node.to_new_node())?;
        for (name, value) in &node.annotations {
            annotations.set(id, name, value)?;
        }
        for child in &node.children {
            self.insert_tree(id, child, annotations)?;
        }
        Ok(id)
    }

    /// Append a node to the end of `parent`.
    pub fn insert(&self, parent: ItemId, node: NewNode) -> Result<ItemId, StoreError> {
        let id = self.write()?.insert(parent, node)?;
        self.publish(StoreEvent::Created { id, parent_id: parent });
        Ok(id)
    }

    pub fn add_folder(&self, parent: ItemId, title: &str) -> Result<ItemId, StoreError> {
        self.insert(parent, NewNode::folder(title))
    }

    pub fn add_bookmark(&self, parent: ItemId, title: &str, url: &str) -> Result<ItemId, StoreError> {
        self.insert(parent, NewNode::bookmark(title, url))
    }

    pub fn add_separator(&self, parent: ItemId) -> Result<ItemId, StoreError> {
        self.insert(parent, NewNode::separator())
    }

    /// Remove an item and its subtree.
    pub fn remove(&self, id: ItemId) -> Result<(), StoreError> {
        let parent = {
            let mut tree = self.write()?;
            let (parent, index) = tree.position(id)?;
            if let Some(p) = tree.nodes.get_mut(&parent) {
                p.children.remove(index);
            }
            let mut pending = vec![id];
            while let Some(next) = pending.pop() {
                if let Some(node) = tree.nodes.remove(&next) {
                    pending.extend(node.children);
                }
            }
            parent
        };
        self.publish(StoreEvent::Removed { id, parent_id: parent });
        Ok(())
    }

    pub fn set_title(&self, id: ItemId, title: &str) -> Result<(), StoreError> {
        {
            let mut tree = self.write()?;
            let node = tree.nodes.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            node.fields.title = Some(title.to_string());
        }
        self.publish(StoreEvent::Changed { id });
        Ok(())
    }

    pub fn set_keyword(&self, id: ItemId, keyword: &str) -> Result<(), StoreError> {
        let mut tree = self.write()?;
        let node = tree.nodes.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        node.fields.keyword = Some(keyword.to_string());
        Ok(())
    }

    pub fn begin_import(&self) {
        self.publish(StoreEvent::ImportBegan);
    }

    pub fn end_import(&self) {
        self.publish(StoreEvent::ImportEnded);
    }

    /// Receive change notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Number of successful position writes so far.
    pub fn write_count(&self) -> usize {
        self.read().map(|t| t.writes).unwrap_or(0)
    }

    /// Titles of the direct children of `folder`; separators show as `---`.
    pub fn child_titles(&self, folder: ItemId) -> Result<Vec<String>, StoreError> {
        let tree = self.read()?;
        tree.node(folder)?
            .children
            .iter()
            .map(|id| {
                let node = tree.node(*id)?;
                Ok(match node.fields.node_type {
                    NodeType::Separator => "---".to_string(),
                    _ => node.fields.title.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Render the subtree under `root` as an indented tree.
    pub fn format_tree(&self, root: ItemId) -> Result<String, StoreError> {
        let tree = self.read()?;
        let mut output = String::new();
        let title = tree.node(root)?.fields.title.clone().unwrap_or_default();
        output.push_str(&format!("{}\n", title));
        format_children(&tree, root, "", &mut output)?;
        Ok(output)
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tree>, StoreError> {
        self.tree
            .read()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tree>, StoreError> {
        self.tree
            .write()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))
    }
}

impl Default for MemoryBookmarkStore {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_slot(kind: RootKind) -> usize {
    match kind {
        RootKind::Menu => 0,
        RootKind::Toolbar => 1,
        RootKind::Unsorted => 2,
    }
}

fn dump_node(
    tree: &Tree,
    id: ItemId,
    annotations: &MemoryAnnotationStore,
) -> Result<TreeNode, StoreError> {
    let node = tree.node(id)?;
    let f = &node.fields;
    Ok(TreeNode {
        node_type: f.node_type,
        title: f.title.clone().unwrap_or_default(),
        url: f.url.clone(),
        date_added: f.date_added.unwrap_or(0),
        last_modified: f.last_modified.unwrap_or(0),
        last_visited: f.last_visited.unwrap_or(0),
        access_count: f.access_count.unwrap_or(0),
        keyword: f.keyword.clone(),
        annotations: annotations.annotations_for(id)?,
        children: node
            .children
            .iter()
            .map(|c| dump_node(tree, *c, annotations))
            .collect::<Result<_, _>>()?,
    })
}

fn format_children(
    tree: &Tree,
    id: ItemId,
    prefix: &str,
    output: &mut String,
) -> Result<(), StoreError> {
    let children = &tree.node(id)?.children;
    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let node = tree.node(*child)?;
        let connector = if is_last { "└── " } else { "├── " };
        let label = match node.fields.node_type {
            NodeType::Separator => "────────".to_string(),
            NodeType::Folder => format!("{}/", node.fields.title.as_deref().unwrap_or("")),
            _ => node.fields.title.clone().unwrap_or_default(),
        };
        output.push_str(&format!("{}{}{}\n", prefix, connector, label));

        if node.fields.node_type == NodeType::Folder {
            let child_prefix = if is_last {
                format!("{}    ", prefix)
            } else {
                format!("{}│   ", prefix)
            };
            format_children(tree, *child, &child_prefix, output)?;
        }
    }
    Ok(())
}

impl BookmarkStore for MemoryBookmarkStore {
    fn children(&self, folder: ItemId) -> Result<Vec<NodeRecord>, StoreError> {
        let tree = self.read()?;
        let node = tree.node(folder)?;
        if node.fields.node_type != NodeType::Folder {
            return Err(StoreError::NotAFolder(folder));
        }
        node.children
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let f = &tree.node(*id)?.fields;
                Ok(NodeRecord {
                    id: *id,
                    parent_id: folder,
                    index,
                    node_type: f.node_type,
                    title: f.title.clone(),
                    url: f.url.clone(),
                    date_added: f.date_added,
                    last_modified: f.last_modified,
                    last_visited: f.last_visited,
                    access_count: f.access_count,
                })
            })
            .collect()
    }

    fn set_index(&self, id: ItemId, index: usize) -> Result<(), StoreError> {
        let parent = {
            let mut tree = self.write()?;
            let (parent, current) = tree.position(id)?;
            let siblings = &mut tree
                .nodes
                .get_mut(&parent)
                .ok_or(StoreError::NotFound(parent))?
                .children;
            if index >= siblings.len() {
                return Err(StoreError::InvalidIndex { id, index });
            }
            siblings.remove(current);
            siblings.insert(index, id);
            tree.writes += 1;
            parent
        };
        self.publish(StoreEvent::Moved {
            id,
            parent_id: parent,
            index,
        });
        Ok(())
    }

    fn parent_of(&self, id: ItemId) -> Result<Option<ItemId>, StoreError> {
        Ok(self.read()?.node(id)?.parent)
    }

    fn places_root(&self) -> ItemId {
        self.read().map(|t| t.places_root).unwrap_or(1)
    }

    fn root_folder(&self, kind: RootKind) -> ItemId {
        self.read()
            .map(|t| t.roots[kind_slot(kind)])
            .unwrap_or_default()
    }

    fn exists(&self, id: ItemId) -> bool {
        self.read().map(|t| t.nodes.contains_key(&id)).unwrap_or(false)
    }

    fn keyword_for(&self, id: ItemId) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.node(id)?.fields.keyword.clone())
    }
}

/// Annotation store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    entries: RwLock<HashMap<ItemId, BTreeMap<String, String>>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every annotation recorded for `id`.
    pub fn annotations_for(&self, id: ItemId) -> Result<BTreeMap<String, String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(entries.get(&id).cloned().unwrap_or_default())
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn get(&self, id: ItemId, name: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(entries.get(&id).and_then(|m| m.get(name)).cloned())
    }

    fn set(&self, id: ItemId, name: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))?;
        entries
            .entry(id)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, id: ItemId, name: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))?;
        if let Some(m) = entries.get_mut(&id) {
            m.remove(name);
            if m.is_empty() {
                entries.remove(&id);
            }
        }
        Ok(())
    }
}
