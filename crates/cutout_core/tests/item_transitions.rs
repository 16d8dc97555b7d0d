use std::sync::Once;

use cutout_core::{Collection, CollectionError, ItemState, SourceFile};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(cutout_logging::initialize_for_tests);
}

fn collection_with(names: &[&str]) -> Collection {
    let mut collection = Collection::new();
    let report = collection.add_sources(
        names
            .iter()
            .map(|name| SourceFile::new(*name, name.as_bytes().to_vec())),
    );
    assert_eq!(report.added.len(), names.len());
    collection
}

#[test]
fn new_items_start_pending() {
    init_logging();
    let collection = collection_with(&["a.png", "b.jpg"]);
    let states: Vec<_> = collection.iter().map(|item| item.state()).collect();
    assert_eq!(states, vec![ItemState::Pending, ItemState::Pending]);
    assert!(collection.iter().all(|item| item.result_bytes().is_none()));
    assert_eq!(collection.ids(), vec![1, 2]);
}

#[test]
fn pending_to_processing_to_done() {
    init_logging();
    let mut collection = collection_with(&["cat.jpg"]);

    let input = collection.begin_processing(1).unwrap();
    assert_eq!(&input[..], b"cat.jpg");
    assert_eq!(collection.get(1).unwrap().state(), ItemState::Processing);
    assert_eq!(collection.get(1).unwrap().progress(), 0);

    assert_eq!(collection.record_progress(1, 40), Some(40));
    collection.complete(1, b"cut".to_vec().into()).unwrap();

    let item = collection.get(1).unwrap();
    assert_eq!(item.state(), ItemState::Done);
    assert_eq!(item.progress(), 100);
    assert_eq!(item.result_bytes().map(|b| &b[..]), Some(&b"cut"[..]));
    assert!(item.error_info().is_none());
}

#[test]
fn processing_to_error_keeps_result_absent() {
    init_logging();
    let mut collection = collection_with(&["cat.jpg"]);
    collection.begin_processing(1).unwrap();
    collection.fail(1, "model crashed").unwrap();

    let item = collection.get(1).unwrap();
    assert_eq!(item.state(), ItemState::Error);
    assert_eq!(item.error_info(), Some("model crashed"));
    assert!(item.result_bytes().is_none());
}

#[test]
fn progress_is_clamped_and_monotonic() {
    init_logging();
    let mut collection = collection_with(&["cat.jpg"]);
    assert_eq!(collection.record_progress(1, 10), None);

    collection.begin_processing(1).unwrap();
    assert_eq!(collection.record_progress(1, 60), Some(60));
    assert_eq!(collection.record_progress(1, 30), Some(60));
    assert_eq!(collection.record_progress(1, 250), Some(100));
}

#[test]
fn only_the_scheduler_path_leaves_pending() {
    init_logging();
    let mut collection = collection_with(&["cat.jpg"]);

    let err = collection.complete(1, b"x".to_vec().into()).unwrap_err();
    assert_eq!(
        err,
        CollectionError::InvalidTransition {
            id: 1,
            from: ItemState::Pending,
            action: "complete",
        }
    );
    assert!(collection.fail(1, "nope").is_err());
    assert_eq!(collection.get(1).unwrap().state(), ItemState::Pending);
    // No handle was acquired for the rejected result.
    assert_eq!(collection.resource_stats().acquired, 1);
}

#[test]
fn processing_item_cannot_begin_twice() {
    init_logging();
    let mut collection = collection_with(&["cat.jpg"]);
    collection.begin_processing(1).unwrap();
    assert!(matches!(
        collection.begin_processing(1),
        Err(CollectionError::InvalidTransition { .. })
    ));
    assert!(collection.request_rerun(1).is_err());
}

#[test]
fn done_items_are_not_runnable_until_rerun_requested() {
    init_logging();
    let mut collection = collection_with(&["a.png", "b.png"]);
    collection.begin_processing(1).unwrap();
    collection.complete(1, b"r".to_vec().into()).unwrap();

    assert_eq!(collection.next_runnable(None), Some(2));

    assert_eq!(collection.request_rerun(1), Ok(true));
    assert_eq!(collection.request_rerun(1), Ok(false));
    assert_eq!(collection.next_runnable(None), Some(1));
    // The old result stays visible until a new run picks the item up.
    assert!(collection.get(1).unwrap().result_bytes().is_some());
}

#[test]
fn scan_cursor_only_looks_forward() {
    init_logging();
    let collection = collection_with(&["a.png", "b.png", "c.png"]);

    assert_eq!(collection.next_runnable(None), Some(1));
    assert_eq!(collection.next_runnable(Some(1)), Some(2));
    assert_eq!(collection.next_runnable(Some(3)), None);
}

#[test]
fn rerun_of_done_item_swaps_result_without_leaking() {
    init_logging();
    let mut collection = collection_with(&["a.png"]);
    collection.begin_processing(1).unwrap();
    collection.complete(1, b"first".to_vec().into()).unwrap();
    let first_handle = collection.get(1).unwrap().result_handle().cloned().unwrap();

    collection.request_rerun(1).unwrap();
    collection.begin_processing(1).unwrap();
    assert!(collection.get(1).unwrap().result_bytes().is_none());
    // Superseded result is still live while the re-run is in flight.
    assert!(collection.resolve(&first_handle).is_some());

    collection.complete(1, b"second".to_vec().into()).unwrap();
    assert!(collection.resolve(&first_handle).is_none());
    let stats = collection.resource_stats();
    assert_eq!(stats.acquired, 3);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.live, 2);
}

#[test]
fn failed_rerun_releases_superseded_result() {
    init_logging();
    let mut collection = collection_with(&["a.png"]);
    collection.begin_processing(1).unwrap();
    collection.complete(1, b"first".to_vec().into()).unwrap();
    collection.request_rerun(1).unwrap();
    collection.begin_processing(1).unwrap();
    collection.fail(1, "boom").unwrap();

    let item = collection.get(1).unwrap();
    assert_eq!(item.state(), ItemState::Error);
    assert!(item.result_bytes().is_none());
    assert_eq!(collection.resource_stats().live, 1);
}

#[test]
fn rerun_after_error_clears_error_info() {
    init_logging();
    let mut collection = collection_with(&["a.png"]);
    collection.begin_processing(1).unwrap();
    collection.fail(1, "boom").unwrap();

    collection.begin_processing(1).unwrap();
    assert!(collection.get(1).unwrap().error_info().is_none());
    collection.complete(1, b"ok".to_vec().into()).unwrap();
    assert_eq!(collection.get(1).unwrap().state(), ItemState::Done);
}

#[test]
fn abandoned_item_returns_to_previous_state() {
    init_logging();
    let mut collection = collection_with(&["a.png", "b.png"]);
    collection.begin_processing(1).unwrap();
    collection.abandon_processing(1);
    assert_eq!(collection.get(1).unwrap().state(), ItemState::Pending);

    collection.begin_processing(2).unwrap();
    collection.complete(2, b"r".to_vec().into()).unwrap();
    collection.request_rerun(2).unwrap();
    collection.begin_processing(2).unwrap();
    collection.abandon_processing(2);

    let item = collection.get(2).unwrap();
    assert_eq!(item.state(), ItemState::Done);
    assert_eq!(item.result_bytes().map(|b| &b[..]), Some(&b"r"[..]));
    assert!(item.rerun_requested());
}

#[test]
fn abandoned_retry_of_failed_item_keeps_its_error() {
    init_logging();
    let mut collection = collection_with(&["a.png"]);
    collection.begin_processing(1).unwrap();
    collection.fail(1, "boom").unwrap();

    collection.begin_processing(1).unwrap();
    assert_eq!(collection.get(1).unwrap().error_info(), None);
    collection.abandon_processing(1);

    let item = collection.get(1).unwrap();
    assert_eq!(item.state(), ItemState::Error);
    assert_eq!(item.error_info(), Some("boom"));
    assert!(item.is_runnable());

    // A retry that settles does not bring the old message back.
    collection.begin_processing(1).unwrap();
    collection.complete(1, b"r".to_vec().into()).unwrap();
    assert_eq!(collection.get(1).unwrap().error_info(), None);
    assert!(!collection.get(1).unwrap().rerun_requested());
}

#[test]
fn keep_original_never_changes_state() {
    init_logging();
    let mut collection = collection_with(&["a.png"]);
    collection.set_keep_original(1, true).unwrap();
    assert_eq!(collection.get(1).unwrap().state(), ItemState::Pending);

    collection.begin_processing(1).unwrap();
    collection.set_keep_original(1, false).unwrap();
    assert_eq!(collection.get(1).unwrap().state(), ItemState::Processing);

    assert_eq!(
        collection.set_keep_original(9, true),
        Err(CollectionError::UnknownItem(9))
    );
}
