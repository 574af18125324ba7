//! Filesystem-backed library and bucket
//!
//! These let the sync run entirely on local disks: a directory tree of
//! photos as the library, and a directory acting as an object-storage
//! bucket.
//!
//! ## Library layout
//!
//! ```text
//! library/
//! ├── Travel/                  # container: holds only directories
//! │   └── 2019/                # album: holds only media files
//! │       ├── IMG_0001.JPG
//! │       └── IMG_0001.JPG.json  # optional sidecar metadata
//! └── Family/
//! ```
//!
//! Entries whose names start with `.` are ignored. A directory holding both
//! sub-directories and media files is a structure violation. Sidecars carry
//! `caption`, `title`, `keywords` and `date`; a missing `date` falls back to
//! the file's modification time.
//!
//! ## Bucket layout
//!
//! ```text
//! bucket/
//! ├── objects/<key>            # visible objects
//! ├── metadata/<key>.json      # attributes of visible objects
//! ├── hidden/<key>.<stamp>     # hidden versions, never erased
//! └── staging/                 # in-flight uploads
//! ```

use crate::error::{Result, SyncError};
use crate::projection::{MediaMetadata, SyncKey};
use crate::source::{verify_content, ContentLocator, DeclaredContent, MediaItem, TreeNode, TreeSource};
use crate::target::{ObjectListing, TargetObject, TargetStore};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Extension of sidecar metadata files
const SIDECAR_EXTENSION: &str = ".json";

/// Media files downloaded as video renditions rather than archived originals
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v"];

/// Suffix format of hidden versions, `<name>.<stamp>`
const HIDE_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Optional metadata stored next to a media file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Sidecar {
    caption: String,
    title: String,
    keywords: String,
    date: Option<String>,
}

/// Entries of one library directory
#[derive(Debug, Default)]
struct DirScan {
    dirs: Vec<String>,
    files: Vec<String>,
}

/// A directory tree viewed as a photo library
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    /// Open a library rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SyncError::ObjectNotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// Root directory of the library
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn scan(&self, relative: &str) -> Result<DirScan> {
        let mut scan = DirScan::default();
        for entry in fs::read_dir(self.root.join(relative))? {
            let entry = entry?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|raw| SyncError::UnsupportedNode(format!("non-UTF-8 name {:?}", raw)))?;
            if name.starts_with('.') {
                continue;
            }

            let metadata = fs::metadata(entry.path())?;
            if metadata.is_dir() {
                scan.dirs.push(name);
            } else if metadata.is_file() {
                if !name.ends_with(SIDECAR_EXTENSION) {
                    scan.files.push(name);
                }
            } else {
                trace!("Skipping special file {:?}", entry.path());
            }
        }
        Ok(scan)
    }

    fn node(&self, relative: String, name: String) -> Result<TreeNode> {
        let scan = self.scan(&relative)?;
        Ok(TreeNode {
            id: relative,
            name,
            has_children: !scan.dirs.is_empty(),
            has_album: !scan.files.is_empty(),
        })
    }

    fn item(&self, relative: String, file_name: String) -> Result<MediaItem> {
        let path = self.root.join(&relative);
        let file_metadata = fs::metadata(&path)?;
        let sidecar = read_sidecar(&path);

        let date = match sidecar.date {
            Some(date) => date,
            None => DateTime::<Utc>::from(file_metadata.modified()?)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        let content = local_locator(&file_name, file_metadata.len());
        Ok(MediaItem {
            id: relative,
            content,
            metadata: MediaMetadata {
                caption: sidecar.caption,
                date,
                file_name,
                keywords: sidecar.keywords,
                title: sidecar.title,
            },
        })
    }
}

/// A file on disk is its own original; videos count as their largest rendition
fn local_locator(file_name: &str, size: u64) -> ContentLocator {
    let declared = DeclaredContent { size, md5: None };
    let is_video = file_name
        .rsplit_once('.')
        .is_some_and(|(_, extension)| VIDEO_EXTENSIONS.iter().any(|v| extension.eq_ignore_ascii_case(v)));
    if is_video {
        ContentLocator::LargestVideo(declared)
    } else {
        ContentLocator::Archived(declared)
    }
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn read_sidecar(media_path: &Path) -> Sidecar {
    let mut sidecar_path = media_path.as_os_str().to_owned();
    sidecar_path.push(SIDECAR_EXTENSION);
    let sidecar_path = PathBuf::from(sidecar_path);
    if !sidecar_path.exists() {
        return Sidecar::default();
    }

    let parsed = fs::read_to_string(&sidecar_path)
        .map_err(SyncError::from)
        .and_then(|text| serde_json::from_str::<Sidecar>(&text).map_err(SyncError::from));
    match parsed {
        Ok(sidecar) => sidecar,
        Err(e) => {
            warn!("Ignoring unreadable sidecar {:?}: {}", sidecar_path, e);
            Sidecar::default()
        }
    }
}

impl TreeSource for LocalSource {
    fn root(&self) -> Result<TreeNode> {
        self.node(String::new(), String::new())
    }

    fn list_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        self.scan(&node.id)?
            .dirs
            .into_iter()
            .map(|name| self.node(join_relative(&node.id, &name), name))
            .collect()
    }

    fn list_album_items(&self, node: &TreeNode) -> Result<Vec<MediaItem>> {
        self.scan(&node.id)?
            .files
            .into_iter()
            .map(|name| self.item(join_relative(&node.id, &name), name))
            .collect()
    }

    fn fetch_content(&self, item: &MediaItem) -> Result<Vec<u8>> {
        let content = fs::read(self.root.join(&item.id))?;
        verify_content(item, &content)?;
        Ok(content)
    }
}

/// A directory used as an object-storage bucket
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    /// Open a bucket directory, creating its layout if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["objects", "metadata", "hidden", "staging"] {
            fs::create_dir_all(root.join(dir))?;
        }
        info!("Opened bucket at {:?}", root);
        Ok(Self { root })
    }

    /// Root directory of the bucket
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Attributes stored with a visible object
    pub fn attributes(&self, key: &SyncKey) -> Result<BTreeMap<String, String>> {
        let path = self.metadata_path(key);
        if !path.exists() {
            return Err(SyncError::ObjectNotFound(key.to_string()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Whether at least one hidden version of `key` exists
    pub fn is_hidden(&self, key: &SyncKey) -> Result<bool> {
        let path = self.root.join("hidden").join(key.as_str());
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Ok(false);
        };
        if !dir.is_dir() {
            return Ok(false);
        }
        let version_prefix = format!("{}.", name.to_string_lossy());
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let entry_name = entry.file_name();
            let entry_name = entry_name.to_string_lossy();
            let is_version = entry_name
                .strip_prefix(&version_prefix)
                .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, HIDE_STAMP_FORMAT).is_ok());
            if is_version {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Write `content` under `staging/` and rename it onto `destination`
    fn atomic_write(&self, staging_name: &str, content: &[u8], destination: &Path) -> Result<()> {
        let staged = self.root.join("staging").join(staging_name);
        fs::write(&staged, content)?;
        if let Err(e) = fs::rename(&staged, destination) {
            let _ = fs::remove_file(&staged);
            return Err(e.into());
        }
        Ok(())
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn object_path(&self, key: &SyncKey) -> PathBuf {
        self.objects_dir().join(key.as_str())
    }

    fn metadata_path(&self, key: &SyncKey) -> PathBuf {
        self.root
            .join("metadata")
            .join(format!("{}{}", key, SIDECAR_EXTENSION))
    }

    fn collect_keys(&self, prefix: &str) -> Result<Vec<TargetObject>> {
        let objects_dir = self.objects_dir();
        let start_dir = match prefix.rfind('/') {
            Some(index) => objects_dir.join(&prefix[..index]),
            None => objects_dir.clone(),
        };
        if !start_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(&start_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&objects_dir)
                .map_err(|e| SyncError::internal(e.to_string()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| SyncError::InvalidKey(relative.display().to_string()))?
                .join("/");
            if key.starts_with(prefix) {
                objects.push(TargetObject {
                    key: SyncKey::new(key),
                    size: entry.metadata()?.len(),
                });
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

impl TargetStore for LocalBucket {
    fn list_objects<'a>(&'a self, prefix: &str) -> Result<ObjectListing<'a>> {
        let objects = self.collect_keys(prefix)?;
        debug!("Listed {} objects under {:?}", objects.len(), prefix);
        Ok(Box::new(objects.into_iter().map(Ok::<_, SyncError>)))
    }

    fn hide(&self, key: &SyncKey) -> Result<()> {
        ensure_path_safe(key)?;
        let object_path = self.object_path(key);
        if !object_path.is_file() {
            if self.is_hidden(key)? {
                return Ok(());
            }
            return Err(SyncError::ObjectNotFound(key.to_string()));
        }

        let stamp = Utc::now().format(HIDE_STAMP_FORMAT);
        let hidden_path = self.root.join("hidden").join(format!("{}.{}", key, stamp));
        if let Some(parent) = hidden_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&object_path, &hidden_path)?;

        let metadata_path = self.metadata_path(key);
        if metadata_path.exists() {
            let mut hidden_metadata = hidden_path.into_os_string();
            hidden_metadata.push(SIDECAR_EXTENSION);
            fs::rename(&metadata_path, PathBuf::from(hidden_metadata))?;
        }

        prune_empty_parents(&object_path, &self.objects_dir())?;
        prune_empty_parents(&metadata_path, &self.root.join("metadata"))?;
        debug!("Hid {}", key);
        Ok(())
    }

    fn upload(&self, key: &SyncKey, content: &[u8], attributes: &BTreeMap<String, String>) -> Result<()> {
        ensure_path_safe(key)?;
        let object_path = self.object_path(key);
        let metadata_path = self.metadata_path(key);
        for path in [&object_path, &metadata_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        // Object before attributes
        let staging_name = format!("{:x}", md5::compute(key.as_str()));
        self.atomic_write(&staging_name, content, &object_path)?;
        self.atomic_write(
            &format!("{}{}", staging_name, SIDECAR_EXTENSION),
            serde_json::to_string_pretty(attributes)?.as_bytes(),
            &metadata_path,
        )?;

        debug!("Uploaded {} ({} bytes)", key, content.len());
        Ok(())
    }
}

/// Reject keys that would resolve outside the bucket directory
fn ensure_path_safe(key: &SyncKey) -> Result<()> {
    let key = key.as_str();
    let escapes = key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == "..")
        || key.contains('\0');
    if escapes {
        return Err(SyncError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Remove now-empty directories between `path` and `stop`, exclusive
fn prune_empty_parents(path: &Path, stop: &Path) -> Result<()> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        if fs::read_dir(dir)?.next().is_some() {
            break;
        }
        fs::remove_dir(dir)?;
        trace!("Removed empty directory {:?}", dir);
        current = dir.parent();
    }
    Ok(())
}
