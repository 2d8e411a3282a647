//! Shared test stores

use std::sync::Mutex;

use autosort_core::{
    AnnotationStore, BookmarkStore, ItemId, MemoryBookmarkStore, NodeRecord, RootKind, StoreError,
};

type Hook = Box<dyn FnOnce() + Send>;

/// In-memory store that runs a one-shot hook on the next `children` read.
///
/// A pass always starts by reading children, so the hook fires while the
/// scheduler is `Sorting`. Reads of one chosen folder can also be made to
/// fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct HookedStore {
    pub inner: MemoryBookmarkStore,
    hook: Mutex<Option<Hook>>,
    unreadable: Mutex<Option<ItemId>>,
}

#[allow(dead_code)]
impl HookedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_next_read(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Make `children` fail for `folder`, or for nothing with `None`.
    pub fn fail_reads_of(&self, folder: Option<ItemId>) {
        *self.unreadable.lock().unwrap() = folder;
    }
}

impl BookmarkStore for HookedStore {
    fn children(&self, folder: ItemId) -> Result<Vec<NodeRecord>, StoreError> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        if *self.unreadable.lock().unwrap() == Some(folder) {
            return Err(StoreError::Storage(format!("folder {} unreadable", folder)));
        }
        self.inner.children(folder)
    }

    fn set_index(&self, id: ItemId, index: usize) -> Result<(), StoreError> {
        self.inner.set_index(id, index)
    }

    fn parent_of(&self, id: ItemId) -> Result<Option<ItemId>, StoreError> {
        self.inner.parent_of(id)
    }

    fn places_root(&self) -> ItemId {
        self.inner.places_root()
    }

    fn root_folder(&self, kind: RootKind) -> ItemId {
        self.inner.root_folder(kind)
    }

    fn exists(&self, id: ItemId) -> bool {
        self.inner.exists(id)
    }

    fn keyword_for(&self, id: ItemId) -> Result<Option<String>, StoreError> {
        self.inner.keyword_for(id)
    }
}

/// Annotation store whose every call fails.
#[allow(dead_code)]
pub struct FailingAnnotations;

impl AnnotationStore for FailingAnnotations {
    fn get(&self, _id: ItemId, _name: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Storage("annotations down".into()))
    }

    fn set(&self, _id: ItemId, _name: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Storage("annotations down".into()))
    }

    fn remove(&self, _id: ItemId, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::Storage("annotations down".into()))
    }
}

/// Load a JSON snapshot fixture from `test_fixtures/`.
#[allow(dead_code)]
pub fn load_fixture(name: &str) -> String {
    let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}
