//! Property-based testing for Photosync
//!
//! Uses proptest to check the merge laws, key layout, and walk ordering
//! across randomly generated inputs.

use ::photosync::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Which input(s) a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    LeftOnly,
    RightOnly,
    Shared,
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::LeftOnly), Just(Side::RightOnly), Just(Side::Shared)]
}

/// Keys split into disjoint left-only, right-only and shared sets
fn partition_strategy() -> impl Strategy<Value = BTreeMap<u32, Side>> {
    prop::collection::btree_map(0u32..10_000, side_strategy(), 0..200)
}

/// Folder names that stress separator ordering, never `.` or `..`
fn name_strategy() -> impl Strategy<Value = String> {
    "[ab\\- ][ab.\\- ]{0,2}"
}

/// A two-level library: folder -> album -> file names
fn library_strategy() -> impl Strategy<Value = BTreeMap<(String, String), BTreeSet<String>>> {
    prop::collection::btree_map(
        (name_strategy(), name_strategy()),
        prop::collection::btree_set("[a-c]{1,3}\\.(jpg|png|mov)", 1..5),
        1..12,
    )
}

fn build_library(layout: &BTreeMap<(String, String), BTreeSet<String>>) -> MemorySource {
    let mut source = MemorySource::new();
    let root = source.root_id();
    let mut folders = BTreeMap::new();
    for ((folder, album), files) in layout {
        let folder_id = *folders
            .entry(folder.clone())
            .or_insert_with(|| source.add_container(root, folder).unwrap());
        let album_id = source.add_album(folder_id, album).unwrap();
        for file in files {
            let metadata = MediaMetadata {
                date: "2018-03-03T03:03:03Z".to_string(),
                file_name: file.clone(),
                ..Default::default()
            };
            source.add_item(album_id, metadata, file.as_bytes()).unwrap();
        }
    }
    source
}

fn walk_keys(source: &MemorySource) -> Vec<String> {
    SourceWalk::new(source)
        .map(|image| image.unwrap().key.into_string())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every key in the union shows up exactly once, with the right shape, in order
    #[test]
    fn merge_pairs_every_key_once(partition in partition_strategy()) {
        let left: Vec<u32> = partition
            .iter()
            .filter(|(_, side)| **side != Side::RightOnly)
            .map(|(key, _)| *key)
            .collect();
        let right: Vec<u32> = partition
            .iter()
            .filter(|(_, side)| **side != Side::LeftOnly)
            .map(|(key, _)| *key)
            .collect();

        let pairs: Vec<Aligned<u32, u32>> = ordered_merge(left, right)
            .collect::<Result<_>>()
            .unwrap();
        prop_assert_eq!(pairs.len(), partition.len());

        for (pair, (key, side)) in pairs.iter().zip(partition.iter()) {
            let expected = match side {
                Side::LeftOnly => Aligned::Left(*key),
                Side::RightOnly => Aligned::Right(*key),
                Side::Shared => Aligned::Both(*key, *key),
            };
            prop_assert_eq!(pair, &expected);
        }
    }

    /// Swapping two adjacent keys on either side makes the merge fail
    #[test]
    fn merge_rejects_unsorted_input(
        keys in prop::collection::btree_set(0u32..1_000, 2..50),
        index in any::<prop::sample::Index>(),
        on_left in any::<bool>(),
    ) {
        let mut unsorted: Vec<u32> = keys.into_iter().collect();
        let i = index.index(unsorted.len() - 1);
        unsorted.swap(i, i + 1);

        let (left, right) = if on_left {
            (unsorted, Vec::new())
        } else {
            (Vec::new(), unsorted)
        };
        let results: Vec<_> = ordered_merge(left, right).collect();

        let last = results.last().unwrap();
        let is_out_of_order = matches!(last, Err(SyncError::OutOfOrder { .. }));
        prop_assert!(is_out_of_order);
        prop_assert!(results[..results.len() - 1].iter().all(|r| r.is_ok()));
    }

    /// Keys are prefix + stem + 8 hex chars + extension
    #[test]
    fn projected_key_layout(
        prefix in "([a-z]{1,5}/){0,3}",
        stem in "[A-Za-z0-9_]{1,10}",
        extension in "[a-z]{1,4}",
        caption in ".{0,20}",
        keywords in "[a-z; ]{0,20}",
    ) {
        let metadata = MediaMetadata {
            caption,
            date: "2019-01-01".to_string(),
            file_name: format!("{}.{}", stem, extension),
            keywords,
            title: String::new(),
        };
        let key = project(&prefix, &metadata).into_string();
        let expected_start = format!("{}{}.", prefix, stem);
        let expected_end = format!(".{}", extension);

        prop_assert!(key.starts_with(&expected_start));
        prop_assert!(key.ends_with(&expected_end));
        let fingerprint = &key[expected_start.len()..key.len() - expected_end.len()];
        prop_assert_eq!(fingerprint.len(), 8);
        prop_assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        prop_assert_eq!(fingerprint, metadata.fingerprint());
        prop_assert_eq!(project(&prefix, &metadata).into_string(), key);
    }

    /// The walk yields strictly increasing keys, whatever the folder names
    #[test]
    fn walk_is_strictly_sorted(layout in library_strategy()) {
        let source = build_library(&layout);
        let keys = walk_keys(&source);

        let expected: usize = layout.values().map(|files| files.len()).sum();
        prop_assert_eq!(keys.len(), expected);
        prop_assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    /// After one run the bucket mirrors the library and a second run does nothing
    #[test]
    fn sync_converges(
        layout in library_strategy(),
        stale in prop::collection::btree_set("[a-z]{1,4}/[a-z]{1,4}\\.00000000\\.jpg", 0..10),
    ) {
        let source = build_library(&layout);
        let bucket = MemoryBucket::with_page_size(3);
        for key in &stale {
            bucket.insert(key, b"stale");
        }

        let sync = SynchronizerBuilder::new().build(&source, &bucket).unwrap();
        let first = sync.run().unwrap();
        prop_assert_eq!(first.hidden, stale.len());
        prop_assert_eq!(bucket.keys(), walk_keys(&source));

        let second = sync.run().unwrap();
        prop_assert_eq!(second.actions(), 0);
        prop_assert_eq!(second.unchanged, bucket.keys().len());
    }
}
