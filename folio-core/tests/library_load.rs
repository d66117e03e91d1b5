//! Loading raw entries into a library, and keeping it current afterwards.

mod helpers;

use std::{cell::RefCell, rc::Rc, sync::Arc};

use folio_core::{
    CatalogError, Config, Entity, Library, LibraryEvent, LoadPass, TreePath,
    folio_state::{Album, AlbumId, CacheKey, CoverImage, CoverSource, RawEntry},
};
use helpers::{FakeBackend, entry, entry_with_album_cover, entry_with_artist_cover, library, png};
use tempfile::TempDir;

fn record(library: &Library<FakeBackend>) -> Rc<RefCell<Vec<LibraryEvent>>> {
    let events = Rc::new(RefCell::new(vec![]));
    let sink = events.clone();
    library
        .events()
        .subscribe(move |event: &LibraryEvent| sink.borrow_mut().push(event.clone()));
    events
}

fn filtered_names(library: &Library<FakeBackend>) -> Vec<String> {
    library
        .model()
        .filtered()
        .map(|artist| artist.name.to_string())
        .collect()
}

#[test]
fn test_120_entries_load_in_three_chunks() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 50);
    let events = record(&library);

    let entries: Vec<RawEntry> = (0..120)
        .map(|i| entry(&format!("Album {i}"), &format!("Artist {}", i % 12)))
        .collect();
    library.start_load(entries);
    assert_eq!(library.progress(), Some(0.0));
    library.run_until_loaded();
    assert_eq!(library.progress(), None);

    let entity_progress: Vec<f32> = events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            LibraryEvent::LoadProgress {
                pass: LoadPass::Entities,
                fraction,
                ..
            } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert_eq!(
        entity_progress,
        vec![50.0 / 120.0, 100.0 / 120.0, 1.0]
    );

    let finished: Vec<_> = events
        .borrow()
        .iter()
        .filter(|event| matches!(event, LibraryEvent::LoadFinished { .. }))
        .cloned()
        .collect();
    assert_eq!(
        finished,
        vec![LibraryEvent::LoadFinished {
            artists: 12,
            albums: 120,
            failures: 0
        }]
    );

    let overall: Vec<f32> = events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            LibraryEvent::LoadProgress { overall, .. } => Some(*overall),
            _ => None,
        })
        .collect();
    assert!(overall.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(overall.last(), Some(&1.0));

    assert_eq!(library.model().filtered_len(), 12);
    assert_eq!(library.albums().len(), 120);
    assert_eq!(library.model().get("Artist 3").unwrap().album_count, 10);
}

#[test]
fn test_bad_entries_do_not_abort_the_load() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 2);

    library.start_load(vec![
        entry("Low", "Bowie"),
        entry("Arrival", ""),
        entry("Low", "Bowie"),
        entry("", "Abba"),
        entry("Arrival", "Abba"),
    ]);
    library.run_until_loaded();

    let failed: Vec<usize> = library.failures().iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![1, 2, 3]);
    assert_eq!(filtered_names(&library), vec!["Abba", "Bowie"]);
    assert_eq!(library.albums().len(), 2);
}

#[test]
fn test_new_load_replaces_load_in_progress() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 1);
    let events = record(&library);

    library.start_load(vec![entry("Low", "Bowie"), entry("Heroes", "Bowie")]);
    library.tick();
    library.start_load(vec![entry("Arrival", "Abba")]);
    library.run_until_loaded();

    assert_eq!(filtered_names(&library), vec!["Abba"]);
    let finished = events
        .borrow()
        .iter()
        .filter(|event| matches!(event, LibraryEvent::LoadFinished { .. }))
        .count();
    assert_eq!(finished, 1);
}

#[test]
fn test_artist_covers_resolve_after_load() {
    let scratch = TempDir::new().unwrap();
    let covers = TempDir::new().unwrap();
    let local = covers.path().join("abba.png");
    std::fs::write(&local, png(64, 64)).unwrap();

    let mut library = library(&scratch, 50);
    let remote = CoverSource::RemoteUri("https://covers.example/bowie".into());
    library.start_load(vec![
        entry_with_artist_cover("Low", "Bowie", remote.clone()),
        entry_with_artist_cover("Heroes", "Bowie", remote),
        entry_with_artist_cover("Arrival", "Abba", CoverSource::LocalPath(local)),
        entry("Tago Mago", "Can"),
    ]);
    library.run_until_loaded();

    // Local covers are ready straight away.
    let abba = library.model().cover_of("Abba").unwrap();
    assert_eq!(abba.bitmap().unwrap().display.dimensions(), (32, 32));
    assert!(CoverImage::is_unknown(&library.model().cover_of("Bowie").unwrap()));
    assert!(CoverImage::is_unknown(&library.model().cover_of("Can").unwrap()));

    assert_eq!(library.covers().backend().fetched, vec!["https://covers.example/bowie"]);
    assert!(!library.is_idle());
    library
        .covers_mut()
        .backend_mut()
        .complete_next(Ok(png(100, 50)));
    library.tick();

    let bowie = library.model().cover_of("Bowie").unwrap();
    assert!(Arc::ptr_eq(&bowie, &library.covers().get(&CacheKey::artist("Bowie"))));
    assert_eq!(bowie.bitmap().unwrap().display.dimensions(), (32, 16));
    assert!(library.is_idle());
}

#[test]
fn test_expanding_resolves_album_covers() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 50);
    library.start_load(vec![
        entry_with_album_cover(
            "Low",
            "Bowie",
            CoverSource::RemoteUri("https://covers.example/low".into()),
        ),
        entry("Heroes", "Bowie"),
    ]);
    library.run_until_loaded();
    assert!(library.covers().backend().fetched.is_empty());

    assert_eq!(library.expand("Bowie").unwrap(), 2);
    assert_eq!(library.expand("Bowie").unwrap(), 2);
    assert_eq!(library.covers().backend().fetched.len(), 1);

    library
        .covers_mut()
        .backend_mut()
        .complete_next(Ok(png(8, 8)));
    library.tick();

    let low = library
        .model()
        .path_of_album(&AlbumId {
            artist: "Bowie".into(),
            name: "Low".into(),
        })
        .unwrap();
    let cover = library.model().cover_at(low).unwrap();
    assert!(!CoverImage::is_unknown(&cover));

    assert!(matches!(
        library.expand("Nobody"),
        Err(CatalogError::UnknownNode(_))
    ));
}

#[test]
fn test_album_changes_keep_artists_in_step() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 50);
    library.start_load(vec![entry("Low", "Bowie")]);
    library.run_until_loaded();
    library.expand("Bowie").unwrap();

    library.add_album(Album::new("Arrival", "Abba")).unwrap();
    library.add_album(Album::new("Heroes", "Bowie")).unwrap();
    assert_eq!(filtered_names(&library), vec!["Abba", "Bowie"]);
    assert_eq!(library.model().child_count(1), 2);
    assert!(matches!(
        library.add_album(Album::new("Heroes", "Bowie")),
        Err(CatalogError::DuplicateKey(_))
    ));

    let low = AlbumId {
        artist: "Bowie".into(),
        name: "Low".into(),
    };
    library.remove_album(&low).unwrap();
    assert_eq!(library.model().child_count(1), 1);
    assert!(matches!(
        library.remove_album(&low),
        Err(CatalogError::NotFound(_))
    ));

    library
        .remove_album(&AlbumId {
            artist: "Abba".into(),
            name: "Arrival".into(),
        })
        .unwrap();
    assert_eq!(filtered_names(&library), vec!["Bowie"]);
    assert!(!library.model().contains("Abba"));
    assert!(matches!(
        library.model().entity_at(TreePath::item(0, 0)),
        Some(Entity::Album(_))
    ));
}

#[test]
fn test_album_counts_follow_album_changes() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 50);
    library.start_load(vec![
        entry("Low", "Bowie"),
        entry("Arrival", "Abba"),
        entry("Waterloo", "Abba"),
    ]);
    library.run_until_loaded();

    library.add_album(Album::new("Heroes", "Bowie")).unwrap();
    library.add_album(Album::new("Lodger", "Bowie")).unwrap();
    assert_eq!(library.model().get("Bowie").unwrap().album_count, 3);

    library.sort(Some("album_count"), false).unwrap();
    library.run_until_loaded();
    assert_eq!(filtered_names(&library), vec!["Abba", "Bowie"]);

    for name in ["Heroes", "Lodger"] {
        library
            .remove_album(&AlbumId {
                artist: "Bowie".into(),
                name: name.into(),
            })
            .unwrap();
    }
    assert_eq!(library.model().get("Bowie").unwrap().album_count, 1);
    assert_eq!(filtered_names(&library), vec!["Bowie", "Abba"]);
}

#[test]
fn test_artist_returns_with_its_cover_and_sort_name() {
    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 50);
    library.start_load(vec![RawEntry {
        artist_sort_name: Some("Bowie, David".into()),
        ..entry_with_artist_cover(
            "Low",
            "Bowie",
            CoverSource::RemoteUri("https://covers.example/bowie".into()),
        )
    }]);
    library.run_until_loaded();
    library
        .covers_mut()
        .backend_mut()
        .complete_next(Ok(png(64, 64)));
    library.tick();
    let cover = library.covers().get(&CacheKey::artist("Bowie"));
    assert!(!CoverImage::is_unknown(&cover));

    library
        .remove_album(&AlbumId {
            artist: "Bowie".into(),
            name: "Low".into(),
        })
        .unwrap();
    assert!(!library.model().contains("Bowie"));

    library.add_album(Album::new("Heroes", "Bowie")).unwrap();
    let bowie = library.model().get("Bowie").unwrap();
    assert_eq!(bowie.effective_sort_name(), "Bowie, David");
    assert_eq!(bowie.album_count, 1);
    assert!(Arc::ptr_eq(&library.model().cover_of("Bowie").unwrap(), &cover));
    assert_eq!(library.covers().backend().fetched.len(), 1);
}

#[test]
fn test_entries_from_json() {
    let entries: Vec<RawEntry> = serde_json::from_str(
        r#"[
            {"album": "Low", "artist": "Bowie", "year": 1977},
            {"album": "Arrival", "artist": "ABBA", "artist_sort_name": "Abba",
             "album_cover": {"remote_uri": "https://covers.example/arrival"}}
        ]"#,
    )
    .unwrap();
    assert_eq!(entries[0].year, Some(1977));
    assert_eq!(entries[0].album_cover, CoverSource::None);
    assert_eq!(
        entries[1].album_cover,
        CoverSource::RemoteUri("https://covers.example/arrival".into())
    );

    let scratch = TempDir::new().unwrap();
    let mut library = library(&scratch, 50);
    library.start_load(entries);
    library.run_until_loaded();
    assert_eq!(
        library.model().get("ABBA").unwrap().effective_sort_name(),
        "Abba"
    );
}

#[test]
fn test_unknown_sort_key_in_config() {
    let mut config = Config::default();
    config.general.sort_key = "loudness".to_string();
    assert!(matches!(
        Library::from_config(&config, FakeBackend::new()),
        Err(CatalogError::UnknownSortKey(_))
    ));
}
