//! End-to-end behaviour of the catalog and cover cache as a view would see it.

mod helpers;

use std::{cell::RefCell, rc::Rc, sync::Arc};

use folio_core::{
    CatalogEvent, CatalogModel, CoverCache, CoverState, FetchError, Resolution, SortKeys,
    TreePath,
    folio_state::{Album, Artist, CacheKey, CoverImage, CoverRequest},
};
use helpers::{FakeBackend, png, scratch_is_empty};
use tempfile::TempDir;

fn names(model: &CatalogModel) -> Vec<String> {
    model.filtered().map(|a| a.name.to_string()).collect()
}

#[test]
fn test_sort_by_name_then_reverse() {
    let mut model = CatalogModel::new(SortKeys::default(), 50).unwrap();
    model.add(Arc::new(Artist::new("Bowie"))).unwrap();
    model.add(Arc::new(Artist::new("Abba"))).unwrap();

    model.sort(Some("name"), false).unwrap();
    model.finish_rebuild();
    assert_eq!(names(&model), vec!["Abba", "Bowie"]);

    model.sort(None, true).unwrap();
    model.finish_rebuild();
    assert_eq!(names(&model), vec!["Bowie", "Abba"]);
    assert_eq!(model.filtered_position_of("Abba"), Some(1));
}

#[test]
fn test_rebuild_announces_rows_in_filtered_positions() {
    let mut model = CatalogModel::new(SortKeys::default(), 1).unwrap();
    for name in ["Can", "Abba", "Bowie"] {
        model.add(Arc::new(Artist::new(name))).unwrap();
    }
    model.set_visible("Bowie", false);

    let events = Rc::new(RefCell::new(vec![]));
    let sink = events.clone();
    model
        .events()
        .subscribe(move |event: &CatalogEvent| sink.borrow_mut().push(event.clone()));

    model.sort(None, true).unwrap();
    model.finish_rebuild();
    assert_eq!(names(&model), vec!["Can", "Abba"]);

    let rows: Vec<_> = events
        .borrow()
        .iter()
        .filter(|event| matches!(event, CatalogEvent::Cleared | CatalogEvent::RowInserted(_)))
        .cloned()
        .collect();
    assert_eq!(
        rows,
        vec![
            CatalogEvent::Cleared,
            CatalogEvent::RowInserted(TreePath::group(0)),
            CatalogEvent::RowInserted(TreePath::group(1)),
        ]
    );
}

#[test]
fn test_materialize_before_any_item_source() {
    let mut model = CatalogModel::new(SortKeys::default(), 50).unwrap();
    model.add(Arc::new(Artist::new("Bowie"))).unwrap();
    assert!(!model.item_added(Arc::new(Album::new("Low", "Bowie"))));

    assert_eq!(model.materialize_children("Bowie", None).unwrap(), 0);
    assert_eq!(model.children("Bowie").unwrap().len(), 0);
    assert_eq!(model.child_count(0), 0);
}

#[test]
fn test_back_to_back_remote_resolves_fetch_once() {
    let scratch = TempDir::new().unwrap();
    let mut cache = CoverCache::new(FakeBackend::new(), 32, scratch.path());
    let key = CacheKey::artist("Bowie");
    let uri = "https://covers.example/bowie";

    let first = cache.resolve(&key, CoverRequest::RemoteUri(uri.into()));
    let second = cache.resolve(&key, CoverRequest::RemoteUri(uri.into()));
    assert!(matches!(first, Resolution::Pending));
    assert!(matches!(second, Resolution::Pending));
    assert_eq!(cache.backend().fetched.len(), 1);

    cache.backend_mut().complete_next(Ok(png(40, 40)));
    let updates = cache.update();
    assert_eq!(updates.len(), 1);

    let image = cache.get(&key);
    assert!(Arc::ptr_eq(updates[0].image.as_ref().unwrap(), &image));
    assert!(Arc::ptr_eq(&cache.get(&key), &image));
    assert!(scratch_is_empty(&scratch));
}

#[test]
fn test_failed_resolve_leaves_previous_cover_and_no_files() {
    let scratch = TempDir::new().unwrap();
    let mut cache = CoverCache::new(FakeBackend::new(), 32, scratch.path());
    let key = CacheKey::album("Bowie", "Low");

    // Nothing resolved yet: failure leaves the placeholder.
    cache.resolve(&key, CoverRequest::RemoteUri("https://covers.example/a".into()));
    cache
        .backend_mut()
        .complete_next(Err(FetchError::Backend("connection reset".into())));
    let updates = cache.update();
    assert!(updates[0].image.is_none());
    assert!(Arc::ptr_eq(&cache.get(&key), &cache.get_unknown()));

    cache.resolve(&key, CoverRequest::RemoteUri("https://covers.example/b".into()));
    cache.backend_mut().complete_next(Ok(png(16, 16)));
    cache.update();
    let resolved = cache.get(&key);
    assert!(!CoverImage::is_unknown(&resolved));

    // The store refuses the next one; the cover still changes and nothing is left over.
    cache.backend_mut().fail_store = true;
    cache.resolve(&key, CoverRequest::RemoteUri("https://covers.example/c".into()));
    cache.backend_mut().complete_next(Ok(png(64, 64)));
    cache.update();
    assert_eq!(cache.state(&key), CoverState::Resolved);
    let unstored = cache.get(&key);
    assert!(!Arc::ptr_eq(&unstored, &resolved));
    assert!(scratch_is_empty(&scratch));

    // Undecodable bytes fail and keep whatever was shown.
    cache.resolve(&key, CoverRequest::RemoteUri("https://covers.example/d".into()));
    cache.backend_mut().complete_next(Ok(b"<html>".to_vec()));
    cache.update();
    assert_eq!(cache.state(&key), CoverState::Failed);
    assert!(Arc::ptr_eq(&cache.get(&key), &unstored));
    assert!(scratch_is_empty(&scratch));
}
