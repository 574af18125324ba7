//! Main test module for Photosync
//!
//! This module includes all test suites:
//! - Integration tests syncing a directory library into a directory bucket
//! - Property-based tests for merge, key and walk invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::photosync::*;

    fn metadata(file_name: &str) -> MediaMetadata {
        MediaMetadata {
            date: "2022-02-02T02:02:02Z".to_string(),
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_library_empty_bucket() {
        let source = MemorySource::new();
        let bucket = MemoryBucket::new();
        let report = SynchronizerBuilder::new()
            .build(&source, &bucket)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.actions(), 0);
        assert_eq!(report.unchanged, 0);
    }

    #[test]
    fn test_empty_library_hides_everything() {
        let source = MemorySource::new();
        let bucket = MemoryBucket::new();
        bucket.insert("a/x.00000000.jpg", b"x");
        bucket.insert("b/y.00000000.jpg", b"y");

        let report = SynchronizerBuilder::new()
            .build(&source, &bucket)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.hidden, 2);
        assert!(bucket.keys().is_empty());
        assert_eq!(bucket.hidden_keys().len(), 2);
    }

    #[test]
    fn test_empty_albums_and_containers() {
        let mut source = MemorySource::new();
        let root = source.root_id();
        let outer = source.add_container(root, "Outer").unwrap();
        source.add_container(outer, "Nothing here").unwrap();
        source.add_container(root, "Lonely").unwrap();
        let album = source.add_album(root, "Album").unwrap();
        source.add_item(album, metadata("a.jpg"), b"a").unwrap();

        let keys: Vec<_> = SourceWalk::new(&source)
            .map(|image| image.unwrap().key)
            .collect();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].has_prefix("Album/a."));
    }

    #[test]
    fn test_items_directly_under_root_album() {
        let mut source = MemorySource::new();
        let root = source.root_id();
        source.add_item(root, metadata("loose.jpg"), b"l").unwrap();

        let keys: Vec<_> = SourceWalk::new(&source)
            .map(|image| image.unwrap().key.into_string())
            .collect();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("loose."));
        assert!(!keys[0].contains('/'));
    }

    #[test]
    fn test_unicode_and_spaces_in_names() {
        let mut source = MemorySource::new();
        let root = source.root_id();
        let album = source.add_album(root, "Été 2021").unwrap();
        source.add_item(album, metadata("plage à Nice.jpg"), b"p").unwrap();

        let bucket = MemoryBucket::new();
        SynchronizerBuilder::new()
            .build(&source, &bucket)
            .unwrap()
            .run()
            .unwrap();

        let keys = bucket.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("Été 2021/plage à Nice."));
        assert!(keys[0].ends_with(".jpg"));
    }

    #[test]
    fn test_duplicate_items_fail_fast() {
        let mut source = MemorySource::new();
        let album = source.add_album(source.root_id(), "Dupes").unwrap();
        source.add_item(album, metadata("same.jpg"), b"one").unwrap();
        source.add_item(album, metadata("same.jpg"), b"two").unwrap();

        let bucket = MemoryBucket::new();
        let result = SynchronizerBuilder::new()
            .build(&source, &bucket)
            .unwrap()
            .run();

        match result {
            Err(e @ SyncError::OutOfOrder { .. }) => assert!(e.is_data_integrity()),
            other => panic!("expected OutOfOrder, got {:?}", other),
        }
        assert_eq!(bucket.upload_count(), 0);
    }

    #[test]
    fn test_paged_listing_matches_unpaged() {
        let mut source = MemorySource::new();
        let album = source.add_album(source.root_id(), "Many").unwrap();
        for i in 0..25 {
            let name = format!("img{:03}.jpg", i);
            source.add_item(album, metadata(&name), name.as_bytes()).unwrap();
        }

        let bucket = MemoryBucket::with_page_size(4);
        let sync = SynchronizerBuilder::new().build(&source, &bucket).unwrap();
        assert_eq!(sync.run().unwrap().uploaded, 25);

        let report = sync.run().unwrap();
        assert_eq!(report.actions(), 0);
        assert_eq!(report.unchanged, 25);
    }

    #[test]
    fn test_moved_album_rekeys_items() {
        let mut before = MemorySource::new();
        let album = before.add_album(before.root_id(), "Inbox").unwrap();
        before.add_item(album, metadata("a.jpg"), b"a").unwrap();

        let mut after = MemorySource::new();
        let sorted = after.add_container(after.root_id(), "Sorted").unwrap();
        let album = after.add_album(sorted, "Inbox").unwrap();
        after.add_item(album, metadata("a.jpg"), b"a").unwrap();

        let bucket = MemoryBucket::new();
        SynchronizerBuilder::new().build(&before, &bucket).unwrap().run().unwrap();
        let report = SynchronizerBuilder::new().build(&after, &bucket).unwrap().run().unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.hidden, 1);
        assert!(bucket.keys()[0].starts_with("Sorted/Inbox/a."));
        assert!(bucket.hidden_keys()[0].starts_with("Inbox/a."));
    }
}
