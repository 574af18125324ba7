//! Integration tests for Photosync
//!
//! Syncs a real directory tree into a directory bucket and checks what ends
//! up on disk across several runs.

use ::photosync::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A library directory and a bucket directory
pub struct SyncHarness {
    pub library: TempDir,
    pub bucket_dir: TempDir,
}

impl SyncHarness {
    pub fn new() -> Self {
        Self {
            library: TempDir::new().unwrap(),
            bucket_dir: TempDir::new().unwrap(),
        }
    }

    /// Add a photo with a sidecar carrying a fixed date and the given caption
    pub fn add_photo(&self, relative: &str, content: &[u8], caption: &str) {
        let path = self.library.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        write_sidecar(&path, caption);
    }

    pub fn remove_photo(&self, relative: &str) {
        let path = self.library.path().join(relative);
        fs::remove_file(&path).unwrap();
        let _ = fs::remove_file(format!("{}.json", path.display()));
    }

    pub fn bucket(&self) -> LocalBucket {
        LocalBucket::open(self.bucket_dir.path()).unwrap()
    }

    pub fn sync(&self, prefix: &str) -> Result<SyncReport> {
        let source = LocalSource::open(self.library.path())?;
        SynchronizerBuilder::new()
            .prefix(prefix)
            .build(source, self.bucket())?
            .run()
    }

    pub fn bucket_keys(&self) -> Vec<String> {
        self.bucket()
            .list_objects("")
            .unwrap()
            .map(|object| object.unwrap().key.into_string())
            .collect()
    }

    pub fn source_keys(&self) -> Vec<String> {
        let source = LocalSource::open(self.library.path()).unwrap();
        SourceWalk::new(&source)
            .map(|image| image.unwrap().key.into_string())
            .collect()
    }
}

fn write_sidecar(media_path: &Path, caption: &str) {
    let sidecar = serde_json::json!({
        "caption": caption,
        "title": "",
        "keywords": "",
        "date": "2020-05-17T09:30:00Z",
    });
    fs::write(format!("{}.json", media_path.display()), sidecar.to_string()).unwrap();
}

fn expected_key(prefix: &str, file_name: &str, caption: &str) -> String {
    project(
        prefix,
        &MediaMetadata {
            caption: caption.to_string(),
            date: "2020-05-17T09:30:00Z".to_string(),
            file_name: file_name.to_string(),
            keywords: String::new(),
            title: String::new(),
        },
    )
    .into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_first_backup_copies_everything() {
        let harness = SyncHarness::new();
        harness.add_photo("Travel/2019/lake.jpg", b"lake bytes", "Lake");
        harness.add_photo("Travel/2020/city.png", b"city bytes", "");
        harness.add_photo("Family/cake.jpg", b"cake", "Birthday");

        let report = harness.sync("").unwrap();
        assert_eq!(report.uploaded, 3);
        assert_eq!(report.hidden, 0);
        assert_eq!(report.bytes_uploaded, 24);

        assert_eq!(harness.bucket_keys(), harness.source_keys());

        let key = expected_key("Travel/2019/", "lake.jpg", "Lake");
        let bucket = harness.bucket();
        let stored = fs::read(harness.bucket_dir.path().join("objects").join(&key)).unwrap();
        assert_eq!(stored, b"lake bytes");

        let attributes = bucket.attributes(&SyncKey::new(key)).unwrap();
        assert_eq!(attributes["caption"], "Lake");
        assert_eq!(attributes["file_name"], "lake.jpg");
        assert_eq!(attributes["date"], "2020-05-17T09:30:00Z");

        assert!(logs_contain("Sync finished: 3 uploaded, 0 hidden, 0 unchanged"));
    }

    #[test]
    #[traced_test]
    fn test_rerun_is_idempotent() {
        let harness = SyncHarness::new();
        harness.add_photo("Album/a.jpg", b"a", "");
        harness.add_photo("Album/b.jpg", b"b", "");

        harness.sync("").unwrap();
        let report = harness.sync("").unwrap();
        assert_eq!(report.actions(), 0);
        assert_eq!(report.unchanged, 2);
        assert!(logs_contain("Sync finished: 0 uploaded, 0 hidden, 2 unchanged"));
    }

    #[test]
    fn test_caption_edit_replaces_object() {
        let harness = SyncHarness::new();
        harness.add_photo("Album/a.jpg", b"a", "before");
        harness.sync("").unwrap();

        write_sidecar(&harness.library.path().join("Album/a.jpg"), "after");
        let report = harness.sync("").unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.hidden, 1);

        let old_key = SyncKey::new(expected_key("Album/", "a.jpg", "before"));
        let new_key = expected_key("Album/", "a.jpg", "after");
        assert_eq!(harness.bucket_keys(), vec![new_key]);
        assert!(harness.bucket().is_hidden(&old_key).unwrap());
    }

    #[test]
    fn test_removed_photo_is_hidden_not_deleted() {
        let harness = SyncHarness::new();
        harness.add_photo("Album/keep.jpg", b"keep", "");
        harness.add_photo("Album/drop.jpg", b"drop", "");
        harness.sync("").unwrap();

        harness.remove_photo("Album/drop.jpg");
        let report = harness.sync("").unwrap();
        assert_eq!(report.hidden, 1);
        assert_eq!(report.uploaded, 0);

        let dropped = SyncKey::new(expected_key("Album/", "drop.jpg", ""));
        assert!(harness.bucket().is_hidden(&dropped).unwrap());
        assert_eq!(harness.bucket_keys(), vec![expected_key("Album/", "keep.jpg", "")]);

        // The hidden version keeps its bytes
        let hidden_dir = harness.bucket_dir.path().join("hidden").join("Album");
        let versions: Vec<_> = fs::read_dir(hidden_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().map_or(true, |ext| ext != "json"))
            .collect();
        assert_eq!(versions.len(), 1);
        assert_eq!(fs::read(&versions[0]).unwrap(), b"drop");
    }

    #[test]
    fn test_scoped_backup_leaves_other_folders_alone() {
        let harness = SyncHarness::new();
        harness.add_photo("Travel/2019/a.jpg", b"a", "");
        harness.add_photo("Family/b.jpg", b"b", "");
        harness.sync("").unwrap();

        harness.remove_photo("Family/b.jpg");
        harness.add_photo("Travel/2019/c.jpg", b"c", "");

        let report = harness.sync("Travel/").unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.hidden, 0);
        assert!(harness
            .bucket_keys()
            .iter()
            .any(|key| key.starts_with("Family/b.")));
    }

    #[test]
    fn test_folder_names_sharing_a_prefix() {
        let harness = SyncHarness::new();
        harness.add_photo("A/x.jpg", b"x", "");
        harness.add_photo("A.b/y.jpg", b"y", "");
        harness.add_photo("A-c/z.jpg", b"z", "");

        let keys = harness.source_keys();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        assert_eq!(harness.sync("").unwrap().uploaded, 3);
        assert_eq!(harness.sync("").unwrap().actions(), 0);
    }

    #[test]
    fn test_mixed_folder_is_rejected() {
        let harness = SyncHarness::new();
        harness.add_photo("Mixed/photo.jpg", b"p", "");
        harness.add_photo("Mixed/Sub/other.jpg", b"o", "");

        let err = harness.sync("").unwrap_err();
        assert!(matches!(err, SyncError::StructureViolation { ref node } if node == "Mixed"));
        assert!(harness.bucket_keys().is_empty());
    }

    #[test]
    fn test_photo_without_sidecar_uses_mtime() {
        let harness = SyncHarness::new();
        let path = harness.library.path().join("Album/bare.jpg");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"bare").unwrap();

        harness.sync("").unwrap();
        let keys = harness.bucket_keys();
        assert_eq!(keys.len(), 1);

        let attributes = harness.bucket().attributes(&SyncKey::new(keys[0].clone())).unwrap();
        let date = &attributes["date"];
        assert!(chrono::DateTime::parse_from_rfc3339(date).is_ok(), "bad date {}", date);
        assert_eq!(attributes["caption"], "");
    }

    #[test]
    fn test_plan_reports_without_writing() {
        let harness = SyncHarness::new();
        harness.add_photo("Album/a.jpg", b"a", "");

        let source = LocalSource::open(harness.library.path()).unwrap();
        let sync = SynchronizerBuilder::new()
            .dry_run(true)
            .build(source, harness.bucket())
            .unwrap();

        let actions: Vec<_> = sync.plan().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], SyncAction::Upload { .. }));

        let report = sync.run().unwrap();
        assert_eq!(report.uploaded, 1);
        assert!(harness.bucket_keys().is_empty());
    }
}
