//! Change scheduler integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use autosort_core::{
    AutosortError, BookmarkStore, MemoryAnnotationStore, MemoryBookmarkStore, Preferences, RootKind, Scheduler,
    SchedulerConfig, SchedulerState, StoreError, StoreEvent,
};
use common::{FailingAnnotations, HookedStore};
use tokio::sync::oneshot;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        debounce_ms: 20,
        listener_retry_ms: 10,
    }
}

fn memory_scheduler() -> (Arc<MemoryBookmarkStore>, Scheduler) {
    let store = Arc::new(MemoryBookmarkStore::new());
    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(MemoryAnnotationStore::new()),
        &Preferences::default(),
        fast_config(),
    )
    .unwrap();
    (store, scheduler)
}

fn hooked_scheduler() -> (Arc<HookedStore>, Scheduler) {
    let store = Arc::new(HookedStore::new());
    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(MemoryAnnotationStore::new()),
        &Preferences::default(),
        fast_config(),
    )
    .unwrap();
    (store, scheduler)
}

/// Let spawned tasks drain whatever is ready.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

// === Coalescing ===

#[tokio::test]
async fn test_many_signals_one_pass() {
    let (_, scheduler) = memory_scheduler();
    for id in 0..50 {
        scheduler.handle_event(&StoreEvent::Changed { id });
    }
    assert_eq!(scheduler.state(), SchedulerState::SortPending);

    assert!(scheduler.tick().await.is_some());
    assert!(scheduler.tick().await.is_none());
    assert_eq!(scheduler.pass_count(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_signal_during_pass_runs_exactly_one_more() {
    let (store, scheduler) = hooked_scheduler();
    let during = scheduler.clone();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let seen_in_hook = seen.clone();
    store.on_next_read(move || {
        *seen_in_hook.lock().unwrap() = Some(during.state());
        during.handle_event(&StoreEvent::Changed { id: 1 });
    });

    assert!(scheduler.sort_now().await.is_some());
    assert_eq!(*seen.lock().unwrap(), Some(SchedulerState::Sorting));
    assert_eq!(scheduler.state(), SchedulerState::SortPending);

    assert!(scheduler.tick().await.is_some());
    assert!(scheduler.tick().await.is_none());
    assert_eq!(scheduler.pass_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tick_during_pass_does_nothing() {
    let (store, scheduler) = hooked_scheduler();
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    store.on_next_read(move || {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    });

    let running = scheduler.clone();
    let pass = tokio::spawn(async move { running.sort_now().await });
    entered_rx.await.unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Sorting);
    scheduler.mark_dirty();
    assert!(scheduler.tick().await.is_none());
    assert!(scheduler.sort_now().await.is_none());

    release_tx.send(()).unwrap();
    assert!(pass.await.unwrap().is_some());
    assert_eq!(scheduler.pass_count(), 1);
    // The rejected requests are still pending
    assert_eq!(scheduler.state(), SchedulerState::SortPending);
}

// === Listener ===

#[tokio::test]
async fn test_listener_marks_dirty_on_change() {
    let (store, scheduler) = memory_scheduler();
    let listener = scheduler.attach_listener(store.subscribe());
    settle().await;
    assert!(scheduler.is_listening());

    let menu = store.root_folder(RootKind::Menu);
    store.add_bookmark(menu, "a", "https://a.test").unwrap();
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::SortPending);

    listener.abort();
}

#[tokio::test]
async fn test_import_suppresses_signals() {
    let (store, scheduler) = memory_scheduler();
    let listener = scheduler.attach_listener(store.subscribe());
    settle().await;

    let menu = store.root_folder(RootKind::Menu);
    store.begin_import();
    for i in 0..5 {
        store
            .add_bookmark(menu, &format!("imported {}", i), "https://import.test")
            .unwrap();
    }
    settle().await;
    assert!(scheduler.is_importing());
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    store.end_import();
    settle().await;
    assert!(!scheduler.is_importing());
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    listener.abort();
}

#[tokio::test]
async fn test_auto_sort_off_ignores_listener_signals() {
    let (store, scheduler) = memory_scheduler();
    scheduler.set_auto_sort(false);
    let listener = scheduler.attach_listener(store.subscribe());
    settle().await;

    let menu = store.root_folder(RootKind::Menu);
    store.add_bookmark(menu, "a", "https://a.test").unwrap();
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    listener.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_waits_for_running_pass() {
    let (store, scheduler) = hooked_scheduler();
    let menu = store.inner.root_folder(RootKind::Menu);
    let a = store.inner.add_bookmark(menu, "a", "https://a.test").unwrap();

    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    store.on_next_read(move || {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    });

    let running = scheduler.clone();
    let pass = tokio::spawn(async move { running.sort_now().await });
    entered_rx.await.unwrap();

    let listener = scheduler.attach_listener(store.inner.subscribe());
    store.inner.begin_import();
    store.inner.end_import();
    store.inner.begin_import();
    store.inner.set_title(a, "renamed").unwrap();
    settle().await;

    // Import markers are honored before attachment, other changes are not
    assert!(scheduler.is_importing());
    assert!(!scheduler.is_listening());
    assert_eq!(scheduler.state(), SchedulerState::Sorting);

    release_tx.send(()).unwrap();
    pass.await.unwrap();
    settle().await;
    assert!(scheduler.is_listening());
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    listener.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_ignores_writes_of_running_pass() {
    let (store, scheduler) = hooked_scheduler();
    let menu = store.inner.root_folder(RootKind::Menu);
    store.inner.add_bookmark(menu, "b", "https://b.test").unwrap();
    store.inner.add_bookmark(menu, "a", "https://a.test").unwrap();

    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    store.on_next_read(move || {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    });

    let running = scheduler.clone();
    let pass = tokio::spawn(async move { running.sort_now().await });
    entered_rx.await.unwrap();

    let listener = scheduler.attach_listener(store.inner.subscribe());
    release_tx.send(()).unwrap();
    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.written, 2);
    settle().await;

    assert!(scheduler.is_listening());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(store.inner.child_titles(menu).unwrap(), vec!["a", "b"]);

    // Changes after attachment still count
    store.inner.add_bookmark(menu, "c", "https://c.test").unwrap();
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::SortPending);

    listener.abort();
}

#[tokio::test]
async fn test_lagged_listener_keeps_running() {
    let (store, scheduler) = memory_scheduler();
    let receiver = store.subscribe();
    let menu = store.root_folder(RootKind::Menu);
    let a = store.add_bookmark(menu, "a", "https://a.test").unwrap();
    // Overflow the channel before the listener ever reads
    for i in 0..1100 {
        store.set_title(a, &format!("title {}", i)).unwrap();
    }

    let listener = scheduler.attach_listener(receiver);
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::SortPending);
    assert!(scheduler.is_listening());
    assert!(!listener.is_finished());
    listener.abort();
}

// === Failures ===

#[tokio::test]
async fn test_folder_failure_stays_in_its_task() {
    let (store, scheduler) = hooked_scheduler();
    let menu = store.inner.root_folder(RootKind::Menu);
    let toolbar = store.inner.root_folder(RootKind::Toolbar);
    let broken = store.inner.add_folder(menu, "Broken").unwrap();
    store.inner.add_bookmark(broken, "y", "https://y.test").unwrap();
    store.inner.add_bookmark(broken, "x", "https://x.test").unwrap();
    store.inner.add_bookmark(menu, "b", "https://b.test").unwrap();
    store.inner.add_bookmark(menu, "a", "https://a.test").unwrap();
    store.inner.add_bookmark(toolbar, "d", "https://d.test").unwrap();
    store.inner.add_bookmark(toolbar, "c", "https://c.test").unwrap();
    store.fail_reads_of(Some(broken));

    let report = scheduler.sort_now().await.unwrap();
    assert_eq!(report.folders, 4);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        AutosortError::Store(StoreError::Storage(_))
    ));
    assert_eq!(
        store.inner.child_titles(menu).unwrap(),
        vec!["Broken", "a", "b"]
    );
    assert_eq!(store.inner.child_titles(toolbar).unwrap(), vec!["c", "d"]);
    assert_eq!(store.inner.child_titles(broken).unwrap(), vec!["y", "x"]);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    store.fail_reads_of(None);
    let report = scheduler.sort_now().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(store.inner.child_titles(broken).unwrap(), vec!["x", "y"]);
    assert_eq!(scheduler.pass_count(), 2);
}

#[tokio::test]
async fn test_unreadable_annotations_count_as_absent() {
    let store = Arc::new(MemoryBookmarkStore::new());
    let menu = store.root_folder(RootKind::Menu);
    let folder = store.add_folder(menu, "Folder").unwrap();
    store.add_bookmark(folder, "y", "https://y.test").unwrap();
    store.add_bookmark(folder, "x", "https://x.test").unwrap();
    store.add_bookmark(menu, "b", "https://b.test").unwrap();
    store.add_bookmark(menu, "a", "https://a.test").unwrap();

    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(FailingAnnotations),
        &Preferences::default(),
        fast_config(),
    )
    .unwrap();

    let report = scheduler.sort_now().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.folders, 4);
    assert_eq!(store.child_titles(menu).unwrap(), vec!["Folder", "a", "b"]);
    assert_eq!(store.child_titles(folder).unwrap(), vec!["x", "y"]);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

// === Loop ===

#[tokio::test]
async fn test_run_until_sorts_and_stops() {
    let (store, scheduler) = memory_scheduler();
    let menu = store.root_folder(RootKind::Menu);
    store.add_bookmark(menu, "b", "https://b.test").unwrap();
    store.add_bookmark(menu, "a", "https://a.test").unwrap();
    scheduler.mark_dirty();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let looping = scheduler.clone();
    let handle = tokio::spawn(async move {
        looping
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(store.child_titles(menu).unwrap(), vec!["a", "b"]);
    assert!(scheduler.pass_count() >= 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}
