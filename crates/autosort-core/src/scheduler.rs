//! Debounced change scheduler.
//!
//! Change notifications only raise a dirty flag. A periodic tick turns a
//! dirty flag into one full pass over every sortable folder, and a pass
//! never overlaps another. Changes that arrive while a pass runs leave the
//! flag raised for the next tick.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::comparator::Comparator;
use crate::config::{Preferences, SchedulerConfig, TypePriorities};
use crate::error::{AutosortError, Result, StoreError};
use crate::exclusion::{ExclusionResolver, FolderExclusion};
use crate::executor::SortExecutor;
use crate::item::ItemId;
use crate::store::{AnnotationStore, BookmarkStore, RootKind, StoreEvent};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    /// A change was seen and no pass is running yet.
    SortPending,
    Sorting,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::SortPending => write!(f, "sort-pending"),
            SchedulerState::Sorting => write!(f, "sorting"),
        }
    }
}

/// Summary of one full pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Folders handed to the executor.
    pub folders: usize,
    /// Folders whose children changed position.
    pub moved: usize,
    /// Folders that were no longer sortable when their task ran.
    pub skipped: usize,
    /// Positions written across all folders.
    pub written: usize,
    pub failures: Vec<AutosortError>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Comparator and priorities swapped together when preferences change.
#[derive(Clone)]
struct SortSettings {
    comparator: Arc<Comparator>,
    priorities: TypePriorities,
}

struct Inner {
    store: Arc<dyn BookmarkStore>,
    annotations: Arc<dyn AnnotationStore>,
    settings: RwLock<SortSettings>,
    config: SchedulerConfig,
    dirty: AtomicBool,
    sorting: AtomicBool,
    importing: AtomicBool,
    auto_sort: AtomicBool,
    listening: AtomicBool,
    passes: AtomicU64,
}

/// Shared handle to the scheduler context.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn BookmarkStore>,
        annotations: Arc<dyn AnnotationStore>,
        preferences: &Preferences,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let comparator = Comparator::build(preferences.criteria()?);
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                annotations,
                settings: RwLock::new(SortSettings {
                    comparator: Arc::new(comparator),
                    priorities: preferences.priorities,
                }),
                config,
                dirty: AtomicBool::new(false),
                sorting: AtomicBool::new(false),
                importing: AtomicBool::new(false),
                auto_sort: AtomicBool::new(preferences.auto_sort),
                listening: AtomicBool::new(false),
                passes: AtomicU64::new(0),
            }),
        })
    }

    pub fn state(&self) -> SchedulerState {
        if self.inner.sorting.load(Ordering::SeqCst) {
            SchedulerState::Sorting
        } else if self.inner.dirty.load(Ordering::SeqCst) {
            SchedulerState::SortPending
        } else {
            SchedulerState::Idle
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Number of passes completed so far.
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub fn is_importing(&self) -> bool {
        self.inner.importing.load(Ordering::SeqCst)
    }

    pub fn is_auto_sort(&self) -> bool {
        self.inner.auto_sort.load(Ordering::SeqCst)
    }

    /// Whether the change listener has been attached.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    /// Request a full pass on the next tick.
    pub fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
    }

    pub fn set_importing(&self, importing: bool) {
        self.inner.importing.store(importing, Ordering::SeqCst);
    }

    /// Apply one store notification.
    pub fn handle_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::ImportBegan => {
                info!("Import began");
                self.set_importing(true);
            }
            StoreEvent::ImportEnded => {
                info!("Import ended");
                self.set_importing(false);
            }
            other => {
                if self.is_importing() {
                    return;
                }
                debug!("Change: {:?}", other);
                self.note_change();
            }
        }
    }

    /// Record a tree change if auto-sort is on.
    fn note_change(&self) {
        if self.is_auto_sort() {
            self.mark_dirty();
        }
    }

    pub fn set_auto_sort(&self, enabled: bool) {
        self.inner.auto_sort.store(enabled, Ordering::SeqCst);
        if enabled {
            self.mark_dirty();
        }
    }

    /// Rebuild the comparator and swap it in for the next pass.
    pub fn set_preferences(&self, preferences: &Preferences) -> Result<()> {
        let comparator = Comparator::build(preferences.criteria()?);
        {
            let mut settings = self
                .inner
                .settings
                .write()
                .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))?;
            *settings = SortSettings {
                comparator: Arc::new(comparator),
                priorities: preferences.priorities,
            };
        }
        info!("Sort criteria updated");
        self.set_auto_sort(preferences.auto_sort);
        Ok(())
    }

    fn settings(&self) -> Result<SortSettings> {
        let settings = self
            .inner
            .settings
            .read()
            .map_err(|e| StoreError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(settings.clone())
    }

    fn resolver(&self) -> ExclusionResolver<'_> {
        ExclusionResolver::new(self.inner.store.as_ref(), self.inner.annotations.as_ref())
    }

    pub fn child_folders(&self, parent: ItemId) -> Result<Vec<FolderExclusion>> {
        Ok(self.resolver().child_folders(parent)?)
    }

    pub fn root_folders(&self) -> Vec<FolderExclusion> {
        self.resolver().root_folders()
    }

    pub fn set_sortable(&self, folder: ItemId, sortable: bool) -> Result<()> {
        self.resolver().set_sortable(folder, sortable)?;
        self.note_change();
        Ok(())
    }

    pub fn set_recursive(&self, folder: ItemId, recursive: bool) -> Result<()> {
        self.resolver().set_recursive(folder, recursive)?;
        self.note_change();
        Ok(())
    }

    /// Run one pass if the tree is dirty and no pass is running.
    pub async fn tick(&self) -> Option<PassReport> {
        if !self.inner.dirty.load(Ordering::SeqCst) {
            return None;
        }
        if self
            .inner
            .sorting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Pass already running");
            return None;
        }
        self.inner.dirty.store(false, Ordering::SeqCst);

        let report = self.run_pass().await;

        self.inner.passes.fetch_add(1, Ordering::SeqCst);
        self.inner.sorting.store(false, Ordering::SeqCst);
        Some(report)
    }

    /// Force a full pass now.
    ///
    /// If a pass is already running this returns `None` and the next tick
    /// picks the request up.
    pub async fn sort_now(&self) -> Option<PassReport> {
        self.mark_dirty();
        self.tick().await
    }

    async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::default();
        let settings = match self.settings() {
            Ok(settings) => settings,
            Err(e) => {
                error!("Cannot read sort settings: {}", e);
                report.failures.push(e);
                return report;
            }
        };

        let store = self.inner.store.clone();
        let annotations = self.inner.annotations.clone();
        let enumerated = tokio::task::spawn_blocking(move || {
            let resolver = ExclusionResolver::new(store.as_ref(), annotations.as_ref());
            RootKind::ALL
                .iter()
                .flat_map(|kind| resolver.sortable_folders(store.root_folder(*kind)))
                .collect::<Vec<ItemId>>()
        })
        .await;
        let folders = match enumerated {
            Ok(folders) => folders,
            Err(e) => {
                error!("Folder enumeration failed: {}", e);
                report.failures.push(AutosortError::Task {
                    folder: self.inner.store.places_root(),
                    reason: e.to_string(),
                });
                return report;
            }
        };
        debug!("Sorting {} folders", folders.len());

        let executor = SortExecutor::new(
            self.inner.store.clone(),
            self.inner.annotations.clone(),
            settings.comparator,
            settings.priorities,
        );
        let mut tasks = JoinSet::new();
        for folder in folders {
            let executor = executor.clone();
            tasks.spawn_blocking(move || (folder, executor.sort_folder(folder)));
        }

        report.folders = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(result))) => {
                    if result.skipped {
                        report.skipped += 1;
                    }
                    if result.moved {
                        report.moved += 1;
                    }
                    report.written += result.written;
                }
                Ok((folder, Err(e))) => {
                    warn!("Failed to sort folder {}: {}", folder, e);
                    report.failures.push(e);
                }
                Err(e) => {
                    error!("Sort task failed: {}", e);
                    report.failures.push(AutosortError::Task {
                        folder: 0,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Pass complete: {} folders, {} moved, {} skipped, {} failures",
            report.folders,
            report.moved,
            report.skipped,
            report.failures.len()
        );
        report
    }

    /// Tick on the debounce interval until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.inner.config.debounce_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopped after {} passes", self.pass_count());
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Apply queued import markers and drop every other queued event.
    ///
    /// Returns `false` once the channel is closed.
    fn drain_import_markers(&self, events: &mut broadcast::Receiver<StoreEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(event) if event.is_import_marker() => self.handle_event(&event),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => return false,
            }
        }
    }

    /// Spawn the change listener.
    ///
    /// Import markers are applied right away. Other notifications are
    /// dropped until no pass is running, polled every
    /// `listener_retry_ms`, including those the pass's own writes queued.
    /// From then on every notification is applied.
    pub fn attach_listener(&self, mut events: broadcast::Receiver<StoreEvent>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let retry = self.inner.config.listener_retry_interval();

        tokio::spawn(async move {
            let mut waited = false;
            while scheduler.inner.sorting.load(Ordering::SeqCst) {
                waited = true;
                if !scheduler.drain_import_markers(&mut events) {
                    return;
                }
                tokio::time::sleep(retry).await;
            }
            // The pass may have written after the last drain
            if waited && !scheduler.drain_import_markers(&mut events) {
                return;
            }

            scheduler.inner.listening.store(true, Ordering::SeqCst);
            info!("All listeners active");

            loop {
                match events.recv().await {
                    Ok(event) => scheduler.handle_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Change listener lagged, {} notifications dropped", missed);
                        if !scheduler.is_importing() {
                            scheduler.note_change();
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            scheduler.inner.listening.store(false, Ordering::SeqCst);
            debug!("Change listener detached");
        })
    }
}
